//! Retrieval of compressed archives from the remote source.

use std::time::Duration;

use futures::StreamExt;
use nwp_common::UnitId;
use reqwest::{Client, Response, StatusCode};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, UnitError, UnitResult};
use crate::layout::{ensure_parent, partial_path, remove_if_exists, Artifact, StagingLayout};
use crate::outcome::StageStatus;

/// Fetches one archive per unit with a single GET.
///
/// There is no retry inside a pass: an unpublished or failed file is picked
/// up again by the next pass over the same run.
pub struct Retriever {
    client: Client,
    layout: StagingLayout,
    request_delay: Duration,
}

impl Retriever {
    pub fn new(config: &PipelineConfig, layout: StagingLayout) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| PipelineError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            layout,
            request_delay: config.source.request_delay(),
        })
    }

    #[instrument(skip(self), fields(unit = %unit))]
    pub async fn fetch(&self, unit: &UnitId) -> UnitResult<StageStatus> {
        if self.layout.is_done_past(unit, Artifact::Archive) {
            return Ok(StageStatus::AlreadyDone);
        }

        let url = self.layout.archive_url(unit);
        let result = self.download(&url, unit).await;

        // Throttle regardless of outcome.
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        result.map(|()| StageStatus::Completed)
    }

    async fn download(&self, url: &str, unit: &UnitId) -> UnitResult<()> {
        debug!(url = %url, "Requesting archive");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UnitError::Network(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(UnitError::NotYetPublished {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let final_path = self.layout.path(unit, Artifact::Archive);
        let temp_path = partial_path(&final_path);
        ensure_parent(&final_path).await?;

        if let Err(e) = stream_to_file(response, &temp_path).await {
            let _ = remove_if_exists(&temp_path).await;
            return Err(e);
        }

        fs::rename(&temp_path, &final_path).await?;
        debug!(path = %final_path.display(), "Archive stored");
        Ok(())
    }
}

async fn stream_to_file(response: Response, path: &std::path::Path) -> UnitResult<()> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UnitError::Network(format!("error reading body: {}", e)))?;
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
