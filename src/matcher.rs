//! Pairing of measurements with model spectra
//!
//! Three strategies are available:
//!  - direct: every measurement row is paired with the model run of the same
//!    date whose solar zenith angle is the closest to the row angle,
//!  - event-driven: each external event is first paired with the measurement
//!    row closest in time, and that row is then paired with a model run,
//!  - minimum zenith: the row of the day with the sun highest in the sky,
//!    within a time window, is paired with a model run.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::{Path, PathBuf},
};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::{
    catalog::{DirectColumn, ModelCatalog, ModelCatalogEntry, ModelQuantity, ModelReader},
    frame::SpectralFrame,
    measurements::Measurement,
};

/// A measurement and the model spectrum it is compared to
///
/// Only the [Matcher] creates pairs, always within the angle tolerance of the
/// catalog and, for events, within the time tolerance.
#[derive(Debug, Clone)]
pub struct MatchedPair<'a> {
    pub measurement: &'a Measurement,
    pub model: SpectralFrame,
    /// Instant the pair is anchored to: the event or the measurement itself
    pub anchor: NaiveDateTime,
    /// Measurement timestamp minus anchor
    pub time_delta: Duration,
    /// Absolute difference between the measurement and the model angles
    pub angle_delta: f64,
    pub model_path: PathBuf,
}

/// A measurement row that could not be paired
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub timestamp: NaiveDateTime,
    pub reason: String,
}

/// Direct matching results
#[derive(Debug, Default)]
pub struct DirectMatches<'a> {
    pub pairs: Vec<MatchedPair<'a>>,
    pub skipped: Vec<SkippedRow>,
}

/// What became of an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventStatus {
    Matched { row: usize, time_delta: Duration },
    NoRowsOnDay,
    OutOfTimeTolerance { nearest: Duration },
    Duplicate { row: usize },
    ModelUnavailable(String),
}
impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Matched { row, time_delta } => {
                write!(f, "matched row #{} ({}s)", row, time_delta.num_seconds())
            }
            EventStatus::NoRowsOnDay => write!(f, "no measurement on that day"),
            EventStatus::OutOfTimeTolerance { nearest } => {
                write!(f, "nearest measurement is {}s away", nearest.num_seconds())
            }
            EventStatus::Duplicate { row } => write!(f, "row #{} already matched", row),
            EventStatus::ModelUnavailable(reason) => write!(f, "no model: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventOutcome {
    pub event: NaiveDateTime,
    pub status: EventStatus,
}

/// Event-driven matching results
#[derive(Debug, Default)]
pub struct EventMatches<'a> {
    pub pairs: Vec<MatchedPair<'a>>,
    pub outcomes: Vec<EventOutcome>,
}
impl EventMatches<'_> {
    /// Absolute gap to the nearest row of the events out of tolerance
    pub fn nearest_rejected(&self) -> Option<Duration> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome.status {
                EventStatus::OutOfTimeTolerance { nearest } => Some(nearest.abs()),
                _ => None,
            })
            .min()
    }
}

/// Time of day interval, bounds included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZenithWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}
impl ZenithWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        (self.start..=self.end).contains(&timestamp.time())
    }
}
impl Default for ZenithWindow {
    /// 10:00 to 10:30
    fn default() -> Self {
        Self {
            start: NaiveTime::MIN + Duration::hours(10),
            end: NaiveTime::MIN + Duration::minutes(10 * 60 + 30),
        }
    }
}
impl fmt::Display for ZenithWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M:%S"), self.end.format("%H:%M:%S"))
    }
}

/// Minimum zenith angle matching result
#[derive(Debug, Default)]
pub struct ZenithMatch<'a> {
    pub pair: Option<MatchedPair<'a>>,
    pub skipped: Option<SkippedRow>,
    /// Whether the row was selected within the time window
    pub in_window: bool,
}

/// Model spectra parsed during one matcher call
type ModelCache<'c> = HashMap<&'c Path, std::result::Result<SpectralFrame, String>>;

/// Measurement to model matcher
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'c> {
    catalog: &'c ModelCatalog,
    reader: ModelReader,
    quantity: ModelQuantity,
    column: DirectColumn,
}
impl<'c> Matcher<'c> {
    pub fn new(catalog: &'c ModelCatalog) -> Self {
        Self {
            catalog,
            reader: ModelReader::default(),
            quantity: ModelQuantity::DirectNormal,
            column: DirectColumn::Horizontal,
        }
    }
    /// Model files reader
    pub fn reader(self, reader: ModelReader) -> Self {
        Self { reader, ..self }
    }
    /// Model quantity compared to the measurements, default: [ModelQuantity::DirectNormal]
    pub fn quantity(self, quantity: ModelQuantity) -> Self {
        Self { quantity, ..self }
    }
    /// Meaning of the direct column of the model files, default: [DirectColumn::Horizontal]
    pub fn direct_column(self, column: DirectColumn) -> Self {
        Self { column, ..self }
    }
    /// Pairs every row with the closest-angle model run of its date
    pub fn match_direct<'a>(&self, rows: &'a [Measurement]) -> DirectMatches<'a> {
        let mut cache = ModelCache::new();
        let mut matches = DirectMatches::default();
        for row in rows {
            match self.pair(row, row.timestamp(), &mut cache) {
                Ok(pair) => matches.pairs.push(pair),
                Err(reason) => {
                    log::warn!("{}: {}", row.timestamp(), reason);
                    matches.skipped.push(SkippedRow {
                        timestamp: row.timestamp(),
                        reason,
                    });
                }
            }
        }
        matches
    }
    /// Pairs the `events` of `date` with the closest rows in time, and then with a model run
    ///
    /// A row is accepted if it is within `time_tolerance` of the event (bound
    /// included). On equal gaps, the earliest row is selected. A row can only
    /// be paired with a single event, the earliest one. Events of another day
    /// than `date` are reported as [EventStatus::NoRowsOnDay].
    pub fn match_events<'a>(
        &self,
        date: NaiveDate,
        events: &[NaiveDateTime],
        rows: &'a [Measurement],
        time_tolerance: Duration,
    ) -> EventMatches<'a> {
        let mut events = events.to_vec();
        events.sort();
        let rows: Vec<&Measurement> = rows.iter().filter(|row| row.date() == date).collect();

        let mut cache = ModelCache::new();
        let mut used: HashSet<usize> = HashSet::new();
        let mut matches = EventMatches::default();
        for event in events {
            let nearest = rows
                .iter()
                .filter(|_| event.date() == date)
                .map(|row| (*row, row.timestamp() - event))
                .reduce(|best, candidate| {
                    if candidate.1.abs() < best.1.abs() {
                        candidate
                    } else {
                        best
                    }
                });
            let status = match nearest {
                None => EventStatus::NoRowsOnDay,
                Some((_, gap)) if gap.abs() > time_tolerance => {
                    EventStatus::OutOfTimeTolerance { nearest: gap }
                }
                Some((row, _)) if used.contains(&row.id()) => {
                    EventStatus::Duplicate { row: row.id() }
                }
                Some((row, gap)) => match self.pair(row, event, &mut cache) {
                    Ok(pair) => {
                        used.insert(row.id());
                        matches.pairs.push(pair);
                        EventStatus::Matched {
                            row: row.id(),
                            time_delta: gap,
                        }
                    }
                    Err(reason) => EventStatus::ModelUnavailable(reason),
                },
            };
            log::debug!("event {}: {}", event, status);
            matches.outcomes.push(EventOutcome { event, status });
        }
        matches
    }
    /// Pairs the row of `date` with the smallest solar zenith angle with a model run
    ///
    /// The row is searched within the time `window` of the day first, bounds
    /// included, and over the whole day if the window holds no row. On equal
    /// angles, the earliest row is selected.
    pub fn match_minimum_zenith<'a>(
        &self,
        date: NaiveDate,
        rows: &'a [Measurement],
        window: ZenithWindow,
    ) -> ZenithMatch<'a> {
        let day = || rows.iter().filter(|row| row.date() == date);
        let (row, in_window) =
            match lowest_sun(day().filter(|row| window.contains(row.timestamp()))) {
                Some(row) => (Some(row), true),
                None => {
                    log::info!("{}: no measurement in {}, using the whole day", date, window);
                    (lowest_sun(day()), false)
                }
            };
        let mut matches = ZenithMatch {
            in_window,
            ..Default::default()
        };
        let Some(row) = row else {
            return matches;
        };
        let mut cache = ModelCache::new();
        match self.pair(row, row.timestamp(), &mut cache) {
            Ok(pair) => matches.pair = Some(pair),
            Err(reason) => {
                log::warn!("{}: {}", row.timestamp(), reason);
                matches.skipped = Some(SkippedRow {
                    timestamp: row.timestamp(),
                    reason,
                });
            }
        }
        matches
    }
    fn pair<'a>(
        &self,
        row: &'a Measurement,
        anchor: NaiveDateTime,
        cache: &mut ModelCache<'c>,
    ) -> std::result::Result<MatchedPair<'a>, String> {
        let entry = self
            .catalog
            .resolve(row.date(), row.angle_deg())
            .map_err(|e| e.to_string())?;
        let model = cache
            .entry(entry.path.as_path())
            .or_insert_with(|| self.model_frame(entry))
            .clone()?;
        Ok(MatchedPair {
            measurement: row,
            model,
            anchor,
            time_delta: row.timestamp() - anchor,
            angle_delta: (entry.angle_deg - row.angle_deg()).abs(),
            model_path: entry.path.clone(),
        })
    }
    fn model_frame(&self, entry: &ModelCatalogEntry) -> std::result::Result<SpectralFrame, String> {
        log::debug!("parsing {:?}", entry.path);
        self.reader
            .read(&entry.path)
            .and_then(|spectrum| {
                spectrum.frame(self.quantity, self.column, entry.date, entry.angle_deg)
            })
            .map_err(|e| {
                let reason = match std::error::Error::source(&e) {
                    Some(cause) => format!("{}: {}", e, cause),
                    None => e.to_string(),
                };
                log::warn!("{}", reason);
                reason
            })
    }
}

/// Row with the smallest solar zenith angle, the earliest on ties
fn lowest_sun<'a, I>(rows: I) -> Option<&'a Measurement>
where
    I: Iterator<Item = &'a Measurement>,
{
    rows.reduce(|best, candidate| {
        if candidate.angle_deg() < best.angle_deg() {
            candidate
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::MeasurementSeries;
    use std::fs;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 10).unwrap()
    }
    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }
    fn catalog(tags: &[&str], tolerance: f64) -> (tempfile::TempDir, ModelCatalog) {
        let dir = tempfile::tempdir().unwrap();
        for tag in tags {
            fs::write(
                dir.path().join(format!("model_2025-05-10_sza_{tag}.out")),
                "350 500 100 10\n700 800 100 10\n1100 400 100 10\n",
            )
            .unwrap();
        }
        let catalog = ModelCatalog::builder(dir.path(), tolerance).build().unwrap();
        (dir, catalog)
    }
    fn series(rows: &[(NaiveDateTime, f64)]) -> MeasurementSeries {
        MeasurementSeries::from_frames(
            rows.iter()
                .map(|(t, angle)| {
                    let wavelengths = vec![350., 700., 1100.];
                    SpectralFrame::new(*t, *angle, "ms711", wavelengths, vec![0.5, 0.8, 0.4])
                        .unwrap()
                })
                .collect(),
        )
    }

    #[test]
    fn direct_selects_closest_angle() {
        let (_dir, catalog) = catalog(&["039p5", "040p5"], 1.);
        let series = series(&[(at(10, 0), 40.), (at(11, 0), 70.)]);
        let matches = Matcher::new(&catalog)
            .quantity(ModelQuantity::DirectHorizontal)
            .match_direct(series.rows());
        assert_eq!(matches.pairs.len(), 1);
        assert_eq!(matches.skipped.len(), 1);
        let pair = &matches.pairs[0];
        assert!(pair.model_path.to_string_lossy().contains("039p5"));
        assert_eq!(pair.model.angle_deg(), 39.5);
        assert_eq!(pair.angle_delta, 0.5);
        assert_eq!(pair.time_delta, Duration::zero());
    }

    #[test]
    fn event_picks_closest_row_within_tolerance() {
        let (_dir, catalog) = catalog(&["040p0"], 1.);
        let series = series(&[(at(10, 10), 40.), (at(10, 19), 40.2)]);
        let matcher = Matcher::new(&catalog);

        let matches = matcher.match_events(day(), &[at(10, 15)], series.rows(), Duration::minutes(5));
        assert_eq!(matches.pairs.len(), 1);
        assert_eq!(matches.pairs[0].measurement.timestamp(), at(10, 19));
        assert_eq!(matches.pairs[0].time_delta, Duration::minutes(4));
        assert_eq!(matches.pairs[0].anchor, at(10, 15));

        let matches = matcher.match_events(day(), &[at(10, 15)], series.rows(), Duration::minutes(3));
        assert!(matches.pairs.is_empty());
        assert_eq!(
            matches.outcomes[0].status,
            EventStatus::OutOfTimeTolerance {
                nearest: Duration::minutes(4)
            }
        );
        assert_eq!(matches.nearest_rejected(), Some(Duration::minutes(4)));
    }

    #[test]
    fn time_tolerance_is_inclusive_and_ties_go_to_the_earliest_row() {
        let (_dir, catalog) = catalog(&["040p0"], 1.);
        let series = series(&[(at(10, 10), 40.), (at(10, 20), 40.)]);
        let matches = Matcher::new(&catalog).match_events(
            day(),
            &[at(10, 15)],
            series.rows(),
            Duration::minutes(5),
        );
        assert_eq!(matches.pairs.len(), 1);
        assert_eq!(matches.pairs[0].measurement.timestamp(), at(10, 10));
        assert_eq!(matches.pairs[0].time_delta, Duration::minutes(-5));
    }

    #[test]
    fn events_sharing_a_row_are_deduplicated() {
        let (_dir, catalog) = catalog(&["040p0"], 1.);
        let series = series(&[(at(10, 10), 40.)]);
        let matches = Matcher::new(&catalog).match_events(
            day(),
            &[at(10, 12), at(10, 8), at(12, 0)],
            series.rows(),
            Duration::minutes(5),
        );
        assert_eq!(matches.pairs.len(), 1);
        assert_eq!(matches.pairs[0].anchor, at(10, 8));
        let statuses: Vec<_> = matches.outcomes.iter().map(|o| &o.status).collect();
        assert!(matches!(statuses[0], EventStatus::Matched { .. }));
        assert!(matches!(statuses[1], EventStatus::Duplicate { .. }));
        assert!(matches!(
            statuses[2],
            EventStatus::OutOfTimeTolerance { .. }
        ));
    }

    #[test]
    fn events_without_rows_or_model() {
        let (_dir, catalog) = catalog(&["010p0"], 0.5);
        let series = series(&[(at(10, 10), 40.)]);
        let matcher = Matcher::new(&catalog);
        let matches = matcher.match_events(day(), &[at(10, 10)], series.rows(), Duration::minutes(5));
        assert!(matches!(
            matches.outcomes[0].status,
            EventStatus::ModelUnavailable(_)
        ));
        let matches = matcher.match_events(day(), &[at(10, 10)], &[], Duration::minutes(5));
        assert_eq!(matches.outcomes[0].status, EventStatus::NoRowsOnDay);
    }

    #[test]
    fn events_of_another_day_get_an_outcome() {
        let (_dir, catalog) = catalog(&["040p0"], 1.);
        let series = series(&[(at(10, 10), 40.)]);
        let next_day = day().succ_opt().unwrap().and_hms_opt(10, 10, 0).unwrap();
        let matches = Matcher::new(&catalog).match_events(
            day(),
            &[next_day, at(10, 11)],
            series.rows(),
            Duration::minutes(5),
        );
        assert_eq!(matches.outcomes.len(), 2);
        assert!(matches!(
            matches.outcomes[0].status,
            EventStatus::Matched { .. }
        ));
        assert_eq!(matches.outcomes[1].event, next_day);
        assert_eq!(matches.outcomes[1].status, EventStatus::NoRowsOnDay);
    }

    #[test]
    fn model_normal_irradiance_uses_the_model_angle() {
        let (_dir, catalog) = catalog(&["060p0"], 0.5);
        let series = series(&[(at(10, 0), 60.4)]);
        let matches = Matcher::new(&catalog)
            .quantity(ModelQuantity::DirectNormal)
            .direct_column(DirectColumn::Horizontal)
            .match_direct(series.rows());
        let model = &matches.pairs[0].model;
        assert_eq!(model.angle_deg(), 60.);
        // 500 / cos(60°), not 500 / cos(60.4°)
        assert!((model.values()[0] - 1000.).abs() < 1e-9);
    }

    #[test]
    fn minimum_zenith_within_window() {
        let (_dir, catalog) = catalog(&["030p0", "035p0"], 0.5);
        let series = series(&[
            (at(9, 50), 30.),
            (at(10, 5), 35.2),
            (at(10, 20), 35.),
            (at(10, 30), 35.),
            (at(10, 40), 31.),
        ]);
        let matches =
            Matcher::new(&catalog).match_minimum_zenith(day(), series.rows(), ZenithWindow::default());
        assert!(matches.in_window);
        let pair = matches.pair.unwrap();
        assert_eq!(pair.measurement.timestamp(), at(10, 20));
        assert_eq!(pair.anchor, at(10, 20));
        assert_eq!(pair.time_delta, Duration::zero());
        assert_eq!(pair.model.angle_deg(), 35.);
    }

    #[test]
    fn minimum_zenith_falls_back_to_the_whole_day() {
        let (_dir, catalog) = catalog(&["030p0"], 0.5);
        let series = series(&[(at(9, 0), 45.), (at(12, 0), 30.2), (at(14, 0), 41.)]);
        let matcher = Matcher::new(&catalog);
        let matches = matcher.match_minimum_zenith(day(), series.rows(), ZenithWindow::default());
        assert!(!matches.in_window);
        assert_eq!(matches.pair.unwrap().measurement.timestamp(), at(12, 0));

        let window = ZenithWindow::new(
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        );
        let matches = matcher.match_minimum_zenith(day(), series.rows(), window);
        assert!(matches.in_window);
        assert!(matches.pair.is_none());
        assert_eq!(matches.skipped.unwrap().timestamp, at(14, 0));

        let matches = matcher.match_minimum_zenith(day(), &[], window);
        assert!(matches.pair.is_none() && matches.skipped.is_none());
    }
}
