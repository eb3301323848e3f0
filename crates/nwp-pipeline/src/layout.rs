//! Deterministic staging-directory layout.
//!
//! Every artifact path is a pure function of the staging root, the source
//! naming parameters and the unit. Run state is never stored anywhere else:
//! whether a stage still has work to do is answered by checking which of
//! these paths exist.
//!
//! ```text
//! root/grib/{run}/{model}_{grid_kind}_{level_kind}_{run}_{lead}_{VAR}.grib2.bz2
//! root/grib/{run}/{model}_{grid_kind}_{level_kind}_{run}_{lead}_{VAR}.grib2
//! root/grib/{run}/{model}_regular-lat-lon_{level_kind}_{run}_{lead}_{VAR}.grib2
//! root/tif/{run}/{run}_{lead}_{VAR}.tif
//! root/txt/{run}/{run}_{lead}_{VAR}.tif      clipped, awaiting value scaling
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use nwp_common::{DerivedProduct, LeadTime, ModelRun, UnitId, Variable};

use crate::config::{PipelineConfig, SourceConfig};

const REGULAR_GRID_KIND: &str = "regular-lat-lon";

/// Per-unit artifacts in stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
    Archive,
    RawGrid,
    Regridded,
    Raster,
}

impl Artifact {
    pub const ALL: [Artifact; 4] = [
        Artifact::Archive,
        Artifact::RawGrid,
        Artifact::Regridded,
        Artifact::Raster,
    ];
}

#[derive(Debug, Clone)]
pub struct StagingLayout {
    root: PathBuf,
    source: SourceConfig,
    derived: Vec<DerivedProduct>,
    keep_components: bool,
}

impl StagingLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        source: SourceConfig,
        derived: Vec<DerivedProduct>,
        keep_components: bool,
    ) -> Self {
        Self {
            root: root.into(),
            source,
            derived,
            keep_components,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.root_dir.clone(),
            config.source.clone(),
            config.derived.clone(),
            config.keep_components,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn grib_dir(&self, run: ModelRun) -> PathBuf {
        self.root.join("grib").join(run.to_string())
    }

    pub fn tif_dir(&self, run: ModelRun) -> PathBuf {
        self.root.join("tif").join(run.to_string())
    }

    pub fn txt_dir(&self, run: ModelRun) -> PathBuf {
        self.root.join("txt").join(run.to_string())
    }

    /// Remote file name, shared by the archive path and the download URL.
    pub fn archive_name(&self, unit: &UnitId) -> String {
        format!("{}.bz2", self.native_grid_name(unit))
    }

    fn native_grid_name(&self, unit: &UnitId) -> String {
        self.grid_name(unit, &self.source.grid_kind)
    }

    fn grid_name(&self, unit: &UnitId, grid_kind: &str) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}.grib2",
            self.source.model,
            grid_kind,
            self.source.level_kind,
            unit.run,
            unit.lead,
            unit.variable.code()
        )
    }

    /// Full remote URL of a unit's archive.
    pub fn archive_url(&self, unit: &UnitId) -> String {
        format!(
            "{}/{}/{}/{}",
            self.source.root_url.trim_end_matches('/'),
            unit.run.cycle_str(),
            unit.variable.dir_name(),
            self.archive_name(unit)
        )
    }

    pub fn path(&self, unit: &UnitId, artifact: Artifact) -> PathBuf {
        match artifact {
            Artifact::Archive => self.grib_dir(unit.run).join(self.archive_name(unit)),
            Artifact::RawGrid => self.grib_dir(unit.run).join(self.native_grid_name(unit)),
            Artifact::Regridded => self
                .grib_dir(unit.run)
                .join(self.grid_name(unit, REGULAR_GRID_KIND)),
            Artifact::Raster => self
                .tif_dir(unit.run)
                .join(format!("{}_{}_{}.tif", unit.run, unit.lead, unit.variable.code())),
        }
    }

    pub fn derived_raster(&self, run: ModelRun, lead: LeadTime, product: DerivedProduct) -> PathBuf {
        self.tif_dir(run)
            .join(format!("{}_{}_{}.tif", run, lead, product.code()))
    }

    /// Clipped field waiting for its values to be post-processed.
    pub fn staged_raster(&self, unit: &UnitId) -> PathBuf {
        self.txt_dir(unit.run).join(format!(
            "{}_{}_{}.tif",
            unit.run,
            unit.lead,
            unit.variable.code()
        ))
    }

    /// True when `artifact` or any later artifact of the unit exists.
    ///
    /// A component raster that was consumed by a derived product and then
    /// deleted still counts as done once the derived raster exists.
    pub fn is_done_past(&self, unit: &UnitId, artifact: Artifact) -> bool {
        let produced = Artifact::ALL
            .iter()
            .filter(|a| **a >= artifact)
            .any(|a| self.path(unit, *a).is_file());

        produced || self.consumed_by_derived(unit)
    }

    fn consumed_by_derived(&self, unit: &UnitId) -> bool {
        if self.keep_components {
            return false;
        }
        self.derived
            .iter()
            .filter(|p| p.consumes(unit.variable))
            .any(|p| self.derived_raster(unit.run, unit.lead, *p).is_file())
    }

    /// First input raster of a derived product that does not exist yet.
    pub fn missing_component(
        &self,
        run: ModelRun,
        lead: LeadTime,
        product: DerivedProduct,
    ) -> Option<PathBuf> {
        self.component_rasters(run, lead, product)
            .into_iter()
            .map(|(_, path)| path)
            .find(|path| !path.is_file())
    }

    pub fn component_rasters(
        &self,
        run: ModelRun,
        lead: LeadTime,
        product: DerivedProduct,
    ) -> Vec<(Variable, PathBuf)> {
        product
            .components()
            .iter()
            .map(|v| (*v, self.path(&UnitId::new(run, lead, *v), Artifact::Raster)))
            .collect()
    }
}

/// `.partial` sibling used for write-then-rename.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(".partial");
    path.with_file_name(name)
}

/// Remove a file, ignoring "not found".
pub async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create the parent directory of `path` if it is missing.
pub async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => tokio::fs::create_dir_all(parent).await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(root: &Path, keep_components: bool) -> StagingLayout {
        StagingLayout::new(
            root,
            SourceConfig::default(),
            vec![DerivedProduct::WindSpeed10m],
            keep_components,
        )
    }

    fn unit(variable: Variable) -> UnitId {
        UnitId::new("2018112000".parse().unwrap(), LeadTime::new(6), variable)
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_paths() {
        let layout = layout(Path::new("/data"), false);
        let unit = unit(Variable::T2m);

        assert_eq!(
            layout.path(&unit, Artifact::Archive),
            PathBuf::from("/data/grib/2018112000/icon_global_icosahedral_single-level_2018112000_006_T_2M.grib2.bz2")
        );
        assert_eq!(
            layout.path(&unit, Artifact::RawGrid),
            PathBuf::from("/data/grib/2018112000/icon_global_icosahedral_single-level_2018112000_006_T_2M.grib2")
        );
        assert_eq!(
            layout.path(&unit, Artifact::Regridded),
            PathBuf::from("/data/grib/2018112000/icon_global_regular-lat-lon_single-level_2018112000_006_T_2M.grib2")
        );
        assert_eq!(
            layout.path(&unit, Artifact::Raster),
            PathBuf::from("/data/tif/2018112000/2018112000_006_T_2M.tif")
        );
    }

    #[test]
    fn test_staged_raster_lives_under_txt() {
        let layout = layout(Path::new("/data"), false);
        assert_eq!(
            layout.staged_raster(&unit(Variable::TotPrec)),
            PathBuf::from("/data/txt/2018112000/2018112000_006_TOT_PREC.tif")
        );
    }

    #[test]
    fn test_archive_url() {
        let layout = layout(Path::new("/data"), false);
        assert_eq!(
            layout.archive_url(&unit(Variable::TotPrec)),
            "https://opendata.dwd.de/weather/nwp/icon/grib/00/tot_prec/icon_global_icosahedral_single-level_2018112000_006_TOT_PREC.grib2.bz2"
        );
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/a/b/file.tif")),
            PathBuf::from("/a/b/file.tif.partial")
        );
    }

    #[test]
    fn test_later_artifact_implies_done() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path(), false);
        let unit = unit(Variable::T2m);

        assert!(!layout.is_done_past(&unit, Artifact::Archive));

        touch(&layout.path(&unit, Artifact::Regridded));
        assert!(layout.is_done_past(&unit, Artifact::Archive));
        assert!(layout.is_done_past(&unit, Artifact::RawGrid));
        assert!(layout.is_done_past(&unit, Artifact::Regridded));
        assert!(!layout.is_done_past(&unit, Artifact::Raster));
    }

    #[test]
    fn test_derived_raster_marks_components_done() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path(), false);
        let u = unit(Variable::U10m);

        touch(&layout.derived_raster(u.run, u.lead, DerivedProduct::WindSpeed10m));
        assert!(layout.is_done_past(&u, Artifact::Archive));
        assert!(layout.is_done_past(&u, Artifact::Raster));
        assert!(!layout.is_done_past(&unit(Variable::T2m), Artifact::Archive));
    }

    #[test]
    fn test_kept_components_need_their_own_raster() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path(), true);
        let u = unit(Variable::U10m);

        touch(&layout.derived_raster(u.run, u.lead, DerivedProduct::WindSpeed10m));
        assert!(!layout.is_done_past(&u, Artifact::Raster));
    }

    #[test]
    fn test_missing_component_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path(), false);
        let u = unit(Variable::U10m);
        let v = unit(Variable::V10m);
        let product = DerivedProduct::WindSpeed10m;

        assert_eq!(
            layout.missing_component(u.run, u.lead, product),
            Some(layout.path(&u, Artifact::Raster))
        );

        touch(&layout.path(&u, Artifact::Raster));
        assert_eq!(
            layout.missing_component(u.run, u.lead, product),
            Some(layout.path(&v, Artifact::Raster))
        );

        touch(&layout.path(&v, Artifact::Raster));
        assert_eq!(layout.missing_component(u.run, u.lead, product), None);
    }
}
