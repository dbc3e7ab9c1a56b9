//! Index of the simulated spectra by date and solar zenith angle
//!
//! Model output files carry their operating point in the file name, e.g.
//! `epanomi_2025-04-22_sza_015p0.out` for the 22nd of April 2025 at 15.0deg.
//! The [ModelCatalog] scans a directory tree once and resolves, for a given
//! date and angle, the closest model run within an angular tolerance.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::NaiveDate;
use regex::Regex;

pub mod model;
pub use model::{DirectColumn, ModelFileError, ModelQuantity, ModelReader, ModelSpectrum};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("model directory {0:?} not found")]
    Root(PathBuf),
    #[error("angle tolerance must be a finite non-negative number of degree, found {0}")]
    Tolerance(f64),
    #[error("invalid model file name regex")]
    Regex(#[from] regex::Error),
    #[error("invalid glob pattern")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to scan model directory")]
    Glob(#[from] glob::GlobError),
    #[error("{0} doesn't match the expected angle tag pattern NNNpN")]
    AngleTag(String),
    #[error("no model files for {0}")]
    NoModelForDate(NaiveDate),
    #[error(
        "no model SZA within {tolerance}deg of {requested:.2}deg on {date} (closest is {closest:.2}deg)"
    )]
    AngleOutOfTolerance {
        date: NaiveDate,
        requested: f64,
        closest: f64,
        tolerance: f64,
    },
}
type Result<T> = std::result::Result<T, CatalogError>;

/// Solar zenith angle encoded as integer degrees and tenths, e.g. `083p0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleTag(f64);
impl AngleTag {
    /// Rounds `degrees` to the nearest tenth
    pub fn from_degrees(degrees: f64) -> Self {
        Self((degrees * 10.).round() / 10.)
    }
    pub fn degrees(&self) -> f64 {
        self.0
    }
}
impl FromStr for AngleTag {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let (deg, tenth) = s
            .split_once(['p', 'P'])
            .ok_or_else(|| CatalogError::AngleTag(s.to_string()))?;
        if deg.is_empty() || deg.len() > 3 || tenth.len() != 1 {
            return Err(CatalogError::AngleTag(s.to_string()));
        }
        let deg: u32 = deg
            .parse()
            .map_err(|_| CatalogError::AngleTag(s.to_string()))?;
        let tenth: u32 = tenth
            .parse()
            .map_err(|_| CatalogError::AngleTag(s.to_string()))?;
        Ok(Self(deg as f64 + 0.1 * tenth as f64))
    }
}
impl fmt::Display for AngleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tenths = (self.0 * 10.).round() as u32;
        write!(f, "{:03}p{}", tenths / 10, tenths % 10)
    }
}

/// A model run: the date and angle of the simulation and its output file
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalogEntry {
    pub date: NaiveDate,
    pub angle_deg: f64,
    pub path: PathBuf,
}
impl ModelCatalogEntry {
    /// Parses the date and angle out of a model file name
    pub fn from_path(path: PathBuf, re: &Regex) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let caps = re.captures(name)?;
        let date = NaiveDate::parse_from_str(&caps["date"], "%Y-%m-%d").ok()?;
        let angle: AngleTag = format!("{}p{}", &caps["deg"], &caps["tenth"]).parse().ok()?;
        Some(Self {
            date,
            angle_deg: angle.degrees(),
            path,
        })
    }
}
impl fmt::Display for ModelCatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sza {} -> {:?}",
            self.date,
            AngleTag::from_degrees(self.angle_deg),
            self.path
        )
    }
}

/// Default model file name pattern: ISO date and `sza_NNNpN` tag
pub const FILE_NAME_PATTERN: &str =
    r"(?i)(?P<date>\d{4}-\d{2}-\d{2}).*?sza_(?P<deg>\d{1,3})p(?P<tenth>\d)";

/// [ModelCatalog] builder
#[derive(Debug, Clone)]
pub struct ModelCatalogBuilder {
    root: PathBuf,
    angle_tolerance: f64,
    extension: String,
    file_name_regex: String,
}
impl ModelCatalogBuilder {
    /// Model file extension (case insensitive), default: `out`
    pub fn extension<S: Into<String>>(self, extension: S) -> Self {
        Self {
            extension: extension.into(),
            ..self
        }
    }
    /// Regular expression with the named groups `date`, `deg` and `tenth`
    pub fn file_name_regex<S: Into<String>>(self, file_name_regex: S) -> Self {
        Self {
            file_name_regex: file_name_regex.into(),
            ..self
        }
    }
    /// Scans the model directory tree and builds the catalog
    pub fn build(self) -> Result<ModelCatalog> {
        if !self.angle_tolerance.is_finite() || self.angle_tolerance < 0. {
            return Err(CatalogError::Tolerance(self.angle_tolerance));
        }
        if !self.root.is_dir() {
            return Err(CatalogError::Root(self.root));
        }
        let re = Regex::new(&self.file_name_regex)?;
        let pattern = self
            .root
            .join("**")
            .join(format!("*.{}", self.extension));
        let options = glob::MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };
        let paths = glob::glob_with(&pattern.to_string_lossy(), options)?
            .collect::<std::result::Result<Vec<PathBuf>, glob::GlobError>>()?;
        log::info!("Found {} model files under {:?}", paths.len(), self.root);

        let mut index: BTreeMap<NaiveDate, Vec<ModelCatalogEntry>> = BTreeMap::new();
        let mut skipped = vec![];
        for path in paths.into_iter().filter(|p| p.is_file()) {
            match ModelCatalogEntry::from_path(path.clone(), &re) {
                Some(entry) => index.entry(entry.date).or_default().push(entry),
                None => {
                    log::warn!("could not parse date/SZA from {:?}, skipping", path);
                    skipped.push(path);
                }
            }
        }
        for entries in index.values_mut() {
            entries.sort_by(|a, b| {
                a.angle_deg
                    .total_cmp(&b.angle_deg)
                    .then_with(|| a.path.cmp(&b.path))
            });
        }
        let catalog = ModelCatalog {
            builder: self,
            index,
            skipped,
        };
        log::info!(
            "Indexed {} model files for {} dates ({} skipped)",
            catalog.len(),
            catalog.index.len(),
            catalog.skipped.len()
        );
        Ok(catalog)
    }
}

/// Read-only index of the model runs
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    builder: ModelCatalogBuilder,
    index: BTreeMap<NaiveDate, Vec<ModelCatalogEntry>>,
    skipped: Vec<PathBuf>,
}
impl ModelCatalog {
    /// Creates a catalog builder for the model files below `root`
    pub fn builder<P: AsRef<Path>>(root: P, angle_tolerance: f64) -> ModelCatalogBuilder {
        ModelCatalogBuilder {
            root: root.as_ref().to_path_buf(),
            angle_tolerance,
            extension: String::from("out"),
            file_name_regex: String::from(FILE_NAME_PATTERN),
        }
    }
    /// Scans again the same directory tree with the same settings
    pub fn rebuild(&self) -> Result<Self> {
        self.builder.clone().build()
    }
    pub fn root(&self) -> &Path {
        &self.builder.root
    }
    pub fn angle_tolerance(&self) -> f64 {
        self.builder.angle_tolerance
    }
    /// Files that were found but could not be indexed
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }
    /// Number of indexed model files
    pub fn len(&self) -> usize {
        self.index.values().map(|entries| entries.len()).sum()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
    /// Dates with at least one model run
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.index.keys().copied()
    }
    /// Model runs of a given date, sorted by angle
    pub fn entries(&self, date: NaiveDate) -> &[ModelCatalogEntry] {
        self.index.get(&date).map(Vec::as_slice).unwrap_or_default()
    }
    /// Returns the model run of `date` with the angle closest to `angle_deg`
    ///
    /// On exact ties the smaller angle is returned. The closest run is rejected
    /// if it is farther than the catalog tolerance.
    pub fn resolve(&self, date: NaiveDate, angle_deg: f64) -> Result<&ModelCatalogEntry> {
        let entries = self
            .index
            .get(&date)
            .filter(|entries| !entries.is_empty())
            .ok_or(CatalogError::NoModelForDate(date))?;
        let mut best = &entries[0];
        let mut best_delta = (best.angle_deg - angle_deg).abs();
        for entry in &entries[1..] {
            let delta = (entry.angle_deg - angle_deg).abs();
            if delta < best_delta {
                best = entry;
                best_delta = delta;
            }
        }
        let tolerance = self.angle_tolerance();
        if !(best_delta <= tolerance) {
            return Err(CatalogError::AngleOutOfTolerance {
                date,
                requested: angle_deg,
                closest: best.angle_deg,
                tolerance,
            });
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 10).unwrap()
    }

    fn catalog_with(angles: &[&str], tolerance: f64) -> (tempfile::TempDir, ModelCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let day_dir = dir.path().join("2025-05-10");
        fs::create_dir_all(&day_dir).unwrap();
        for tag in angles {
            fs::write(
                day_dir.join(format!("epanomi_2025-05-10_sza_{tag}.out")),
                "400 1 1 1\n500 1 1 1\n",
            )
            .unwrap();
        }
        let catalog = ModelCatalog::builder(dir.path(), tolerance).build().unwrap();
        (dir, catalog)
    }

    #[test]
    fn angle_tags() {
        assert_eq!("083p0".parse::<AngleTag>().unwrap().degrees(), 83.);
        assert!(("015p5".parse::<AngleTag>().unwrap().degrees() - 15.5).abs() < 1e-12);
        assert!("83.0".parse::<AngleTag>().is_err());
        assert!("083p05".parse::<AngleTag>().is_err());
        assert_eq!(AngleTag::from_degrees(40.).to_string(), "040p0");
        assert_eq!(AngleTag::from_degrees(7.46).to_string(), "007p5");
    }

    #[test]
    fn scans_and_skips_unparseable_names() {
        let (dir, catalog) = catalog_with(&["039p5", "040p5"], 1.);
        fs::write(dir.path().join("notes.OUT"), "x").unwrap();
        fs::write(dir.path().join("helmos_2025-05-11_sza_010p0.OUT"), "x").unwrap();
        let catalog = catalog.rebuild().unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.skipped().len(), 1);
        assert_eq!(catalog.dates().count(), 2);
    }

    #[test]
    fn exact_angle_is_returned() {
        let (_dir, catalog) = catalog_with(&["010p0", "020p0", "030p0"], 0.5);
        assert_eq!(catalog.resolve(day(), 20.).unwrap().angle_deg, 20.);
    }

    #[test]
    fn closest_angle_wins_and_ties_go_to_the_smaller() {
        let (_dir, catalog) = catalog_with(&["040p5", "039p5"], 1.);
        assert_eq!(catalog.resolve(day(), 40.).unwrap().angle_deg, 39.5);
        assert_eq!(catalog.resolve(day(), 40.2).unwrap().angle_deg, 40.5);
    }

    #[test]
    fn tolerance_is_enforced() {
        let (_dir, catalog) = catalog_with(&["010p0", "085p0"], 0.5);
        assert!(matches!(
            catalog.resolve(day(), 50.),
            Err(CatalogError::AngleOutOfTolerance { closest, .. }) if closest == 85.
        ));
        assert!(matches!(
            catalog.resolve(day().succ_opt().unwrap(), 10.),
            Err(CatalogError::NoModelForDate(_))
        ));
    }

    #[test]
    fn bad_configuration() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelCatalog::builder(dir.path(), -1.).build(),
            Err(CatalogError::Tolerance(_))
        ));
        assert!(matches!(
            ModelCatalog::builder(dir.path().join("missing"), 0.5).build(),
            Err(CatalogError::Root(_))
        ));
    }
}
