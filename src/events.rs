//! External event timestamps
//!
//! In event-driven matching, the instants to reconcile come from an external
//! provider, typically the AERONET almucantar inversions of the site
//! (`YYYYMMDD_YYYYMMDD_<site>.lev15` or `.ssa` files).

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("failed to read event file {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("failed to parse event file {1:?}")]
    Csv(#[source] csv::Error, PathBuf),
    #[error("no Date(dd:mm:yyyy)/Time(hh:mm:ss) header in event file {0:?}")]
    NoHeader(PathBuf),
    #[error("event directory {0:?} not found")]
    Root(PathBuf),
    #[error("invalid glob pattern")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to scan event directory")]
    Glob(#[from] glob::GlobError),
    #[error("no event file for {0}")]
    NoEventFile(NaiveDate),
    #[error("no event time found for {0}")]
    NoEvents(NaiveDate),
}
type Result<T> = std::result::Result<T, EventError>;

/// Provider of the event instants of a given day
pub trait EventSource {
    /// Returns the sorted and deduplicated events of `date`
    fn events(&self, date: NaiveDate) -> Result<Vec<NaiveDateTime>>;
}

/// Event lists held in memory
#[derive(Debug, Clone, Default)]
pub struct EventList(BTreeMap<NaiveDate, Vec<NaiveDateTime>>);
impl From<Vec<NaiveDateTime>> for EventList {
    fn from(events: Vec<NaiveDateTime>) -> Self {
        let mut map: BTreeMap<NaiveDate, Vec<NaiveDateTime>> = BTreeMap::new();
        for event in events {
            map.entry(event.date()).or_default().push(event);
        }
        for events in map.values_mut() {
            events.sort();
            events.dedup();
        }
        Self(map)
    }
}
impl EventSource for EventList {
    fn events(&self, date: NaiveDate) -> Result<Vec<NaiveDateTime>> {
        self.0.get(&date).cloned().ok_or(EventError::NoEventFile(date))
    }
}

/// AERONET inversion files indexed by date
#[derive(Debug, Clone, Default)]
pub struct AeronetInversions {
    files: BTreeMap<NaiveDate, PathBuf>,
}
impl AeronetInversions {
    /// Indexes the `.lev15` and `.ssa` files of `dir`, optionally restricted to a `site`
    pub fn scan<P: AsRef<Path>>(dir: P, site: Option<&str>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(EventError::Root(dir.to_path_buf()));
        }
        let pattern = dir.join("*.*");
        let mut files = BTreeMap::new();
        for path in glob::glob(&pattern.to_string_lossy())? {
            let path = path?;
            let is_inversion = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    ext.eq_ignore_ascii_case("lev15") || ext.eq_ignore_ascii_case("ssa")
                });
            if !is_inversion {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if site.is_some_and(|site| !stem.ends_with(&format!("_{site}"))) {
                continue;
            }
            match stem
                .get(..8)
                .and_then(|ymd| NaiveDate::parse_from_str(ymd, "%Y%m%d").ok())
            {
                Some(date) => {
                    if let Some(previous) = files.insert(date, path.clone()) {
                        log::warn!("{:?} supersedes {:?} for {}", path, previous, date);
                    }
                }
                None => log::warn!("could not parse the date of {:?}, skipping", path),
            }
        }
        log::info!("Found {} inversion files in {:?}", files.len(), dir);
        Ok(Self { files })
    }
    /// Dates with an inversion file
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.files.keys().copied()
    }
    pub fn len(&self) -> usize {
        self.files.len()
    }
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
impl EventSource for AeronetInversions {
    fn events(&self, date: NaiveDate) -> Result<Vec<NaiveDateTime>> {
        let path = self.files.get(&date).ok_or(EventError::NoEventFile(date))?;
        let events = read_inversion_times(path)?;
        if events.is_empty() {
            log::warn!("no inversion time found in {:?}", path);
            return Err(EventError::NoEvents(date));
        }
        Ok(events)
    }
}

/// Reads the instants of the inversions in an AERONET file
///
/// The data table starts at the first line holding both `Date(dd:mm:yyyy)`
/// and `Time(hh:mm:ss)`. Rows with unparseable instants are dropped.
pub fn read_inversion_times<P: AsRef<Path>>(path: P) -> Result<Vec<NaiveDateTime>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| EventError::Io(e, path.into()))?;
    let offset = contents
        .lines()
        .position(|line| line.contains("Date(dd:mm:yyyy)") && line.contains("Time(hh:mm:ss)"))
        .ok_or_else(|| EventError::NoHeader(path.into()))?;
    let table = contents.lines().skip(offset).collect::<Vec<_>>().join("\n");
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(table.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| EventError::Csv(e, path.into()))?
        .clone();
    let column = |prefix: &str| headers.iter().position(|h| h.trim().starts_with(prefix));
    let (Some(date), Some(time)) = (column("Date"), column("Time")) else {
        return Err(EventError::NoHeader(path.into()));
    };
    let mut events: Vec<NaiveDateTime> = rdr
        .records()
        .filter_map(|record| record.ok())
        .filter_map(|record| {
            let instant = format!("{} {}", record.get(date)?.trim(), record.get(time)?.trim());
            NaiveDateTime::parse_from_str(&instant, "%d:%m:%Y %H:%M:%S").ok()
        })
        .collect();
    events.sort();
    events.dedup();
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEV15: &str = "\
AERONET Version 3; Inversion
Thessaloniki
Level 1.5 Almucantar Retrievals
Site,Date(dd:mm:yyyy),Time(hh:mm:ss),Day_of_Year,AOD_Extinction-Total[440nm]
Thessaloniki,22:04:2025,15:10:05,112,0.21
Thessaloniki,22:04:2025,07:45:12,112,0.19
Thessaloniki,22:04:2025,N/A,112,0.19
Thessaloniki,22:04:2025,07:45:12,112,0.19
";

    #[test]
    fn reads_inversion_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20250422_20250422_Thessaloniki.lev15");
        fs::write(&path, LEV15).unwrap();
        let events = read_inversion_times(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].to_string(), "2025-04-22 07:45:12");
        assert_eq!(events[1].to_string(), "2025-04-22 15:10:05");
    }

    #[test]
    fn missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20250422_20250422_Thessaloniki.ssa");
        fs::write(&path, "Date,Time\n22:04:2025,15:10:05\n").unwrap();
        assert!(matches!(
            read_inversion_times(&path),
            Err(EventError::NoHeader(_))
        ));
    }

    #[test]
    fn scans_by_site_and_date() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "20250422_20250422_Thessaloniki.lev15",
            "20250423_20250423_Thessaloniki.SSA",
            "20250423_20250423_Athens.lev15",
            "notes_Thessaloniki.lev15",
            "20250424_20250424_Thessaloniki.txt",
        ] {
            fs::write(dir.path().join(name), LEV15).unwrap();
        }
        let inversions = AeronetInversions::scan(dir.path(), Some("Thessaloniki")).unwrap();
        assert_eq!(inversions.len(), 2);
        let date = NaiveDate::from_ymd_opt(2025, 4, 22).unwrap();
        assert_eq!(inversions.events(date).unwrap().len(), 2);
        let date = NaiveDate::from_ymd_opt(2025, 4, 25).unwrap();
        assert!(matches!(
            inversions.events(date),
            Err(EventError::NoEventFile(_))
        ));
    }

    #[test]
    fn header_without_rows() {
        let dir = tempfile::tempdir().unwrap();
        let header: String = LEV15.lines().take(4).map(|line| format!("{line}\n")).collect();
        fs::write(dir.path().join("20250422_20250422_Thessaloniki.lev15"), header).unwrap();
        let inversions = AeronetInversions::scan(dir.path(), None).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 4, 22).unwrap();
        assert!(matches!(
            inversions.events(date),
            Err(EventError::NoEvents(d)) if d == date
        ));
    }

    #[test]
    fn in_memory_events() {
        let t = |h, m| {
            NaiveDate::from_ymd_opt(2025, 5, 10)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };
        let events = EventList::from(vec![t(12, 0), t(9, 30), t(12, 0)]);
        let date = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();
        assert_eq!(events.events(date).unwrap(), vec![t(9, 30), t(12, 0)]);
    }
}
