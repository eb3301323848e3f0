//! bzip2 expansion of downloaded archives.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bzip2::read::MultiBzDecoder;
use nwp_common::UnitId;
use tracing::{debug, instrument};

use crate::error::{UnitError, UnitResult};
use crate::layout::{partial_path, Artifact, StagingLayout};
use crate::outcome::StageStatus;

/// Read/write granularity; memory use does not depend on the archive size.
pub const CHUNK_SIZE: usize = 100 * 1024;

/// Expand a unit's archive into its raw grid file and delete the archive.
#[instrument(skip(layout), fields(unit = %unit))]
pub async fn decompress(layout: &StagingLayout, unit: &UnitId) -> UnitResult<StageStatus> {
    if layout.is_done_past(unit, Artifact::RawGrid) {
        return Ok(StageStatus::AlreadyDone);
    }

    let archive = layout.path(unit, Artifact::Archive);
    if !archive.is_file() {
        return Err(UnitError::MissingInput(archive));
    }
    let output = layout.path(unit, Artifact::RawGrid);

    let (src, dst) = (archive.clone(), output.clone());
    let written = tokio::task::spawn_blocking(move || decompress_file(&src, &dst))
        .await
        .map_err(|e| UnitError::Io(std::io::Error::other(e.to_string())))??;

    tokio::fs::remove_file(&archive).await?;
    debug!(path = %output.display(), bytes = written, "Archive expanded");
    Ok(StageStatus::Completed)
}

/// Stream-decompress `archive` to `output` through a `.partial` sibling.
///
/// Returns the number of bytes written. The archive itself is never touched.
pub fn decompress_file(archive: &Path, output: &Path) -> UnitResult<u64> {
    let temp = partial_path(output);
    let result = expand(archive, &temp);

    match result {
        Ok(written) => {
            std::fs::rename(&temp, output)?;
            Ok(written)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&temp);
            Err(e)
        }
    }
}

fn expand(archive: &Path, temp: &Path) -> UnitResult<u64> {
    let decode_err = |reason: String| UnitError::Decode {
        path: PathBuf::from(archive),
        reason,
    };

    let input = File::open(archive)?;
    let mut decoder = MultiBzDecoder::new(BufReader::with_capacity(CHUNK_SIZE, input));
    let mut out = BufWriter::with_capacity(CHUNK_SIZE, File::create(temp)?);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = decoder.read(&mut buf).map_err(|e| decode_err(e.to_string()))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        written += n as u64;
    }
    out.flush()?;

    if written == 0 {
        return Err(decode_err("archive expanded to zero bytes".to_string()));
    }
    Ok(written)
}
