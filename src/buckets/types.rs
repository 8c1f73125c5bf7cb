//! Core types for the bucketing engine

use crate::error::AnalyticsError;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canonical label format for a period anchor
pub const LABEL_FORMAT: &str = "%Y-%m-%d";

/// Identifies one counter stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub subject: String,
    pub metric: String,
}

impl MetricKey {
    pub fn new(subject: impl Into<String>, metric: impl Into<String>) -> Self {
        MetricKey {
            subject: subject.into(),
            metric: metric.into(),
        }
    }
}

impl<S: Into<String>, M: Into<String>> From<(S, M)> for MetricKey {
    fn from((subject, metric): (S, M)) -> Self {
        MetricKey::new(subject, metric)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.metric)
    }
}

/// Time-bucket resolution of a stored view or a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    /// Default number of periods returned when the caller does not choose.
    pub fn default_limit(&self) -> u32 {
        match self {
            Granularity::Day => 30,
            Granularity::Week | Granularity::Month => 10,
        }
    }

    /// Start of the period containing `date`.
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => closest_monday(date),
            Granularity::Month => first_of_month(date),
        }
    }

    /// Anchor of the coarse storage key that holds this granularity's fields
    /// for `date`: the month for daily data, the year for weekly and monthly.
    pub fn storage_anchor(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => first_of_month(date),
            Granularity::Week | Granularity::Month => first_of_year(date),
        }
    }

    /// `n` periods after `anchor`. `None` past the end of the calendar.
    pub fn step(&self, anchor: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            Granularity::Day => anchor.checked_add_days(Days::new(u64::from(n))),
            Granularity::Week => anchor.checked_add_days(Days::new(u64::from(n) * 7)),
            Granularity::Month => anchor.checked_add_months(Months::new(n)),
        }
    }

    /// Last calendar day covered by the period anchored at `anchor`.
    pub fn period_end(&self, anchor: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => anchor,
            Granularity::Week => anchor.checked_add_days(Days::new(6)).unwrap_or(anchor),
            Granularity::Month => anchor
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .unwrap_or(anchor),
        }
    }
}

impl FromStr for Granularity {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            _ => Err(AnalyticsError::invalid_argument(
                "Allowed values for group_by are day, week or month.",
            )),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The Monday on or before `date` (ISO weeks). Never rounds forward.
///
/// Clamps to `date` itself when that Monday precedes the calendar.
pub fn closest_monday(date: NaiveDate) -> NaiveDate {
    let days_after_monday = date.weekday().number_from_monday() - 1;
    date.checked_sub_days(Days::new(u64::from(days_after_monday)))
        .unwrap_or(date)
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn first_of_year(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

/// One instance of a granularity, anchored at its start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub granularity: Granularity,
    pub anchor: NaiveDate,
}

impl Period {
    /// The period of `granularity` that contains `date`.
    pub fn containing(granularity: Granularity, date: NaiveDate) -> Self {
        Period {
            granularity,
            anchor: granularity.period_start(date),
        }
    }

    /// Canonical identity used to join series: `YYYY-MM-DD` of the anchor.
    pub fn label(&self) -> String {
        self.anchor.format(LABEL_FORMAT).to_string()
    }

    pub fn end(&self) -> NaiveDate {
        self.granularity.period_end(self.anchor)
    }
}

/// Persisted slot for one metric/subject/period.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketAddress {
    pub storage_key: String,
    pub field: String,
}

/// A single value or an ordered list, normalized at the API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn is_many(&self) -> bool {
        matches!(self, OneOrMany::Many(_))
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl From<&str> for OneOrMany<String> {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<String> for OneOrMany<String> {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<String>> for OneOrMany<String> {
    fn from(values: Vec<String>) -> Self {
        OneOrMany::Many(values)
    }
}

impl From<Vec<&str>> for OneOrMany<String> {
    fn from(values: Vec<&str>) -> Self {
        OneOrMany::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for OneOrMany<String> {
    fn from(values: &[&str]) -> Self {
        OneOrMany::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

/// Dense, zero-filled, ordered count series.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeSeries {
    points: Vec<(Period, i64)>,
}

impl TimeSeries {
    pub fn new(points: Vec<(Period, i64)>) -> Self {
        debug_assert!(
            points.windows(2).all(|w| w[0].0.anchor < w[1].0.anchor),
            "Invariant violated: series periods must be strictly increasing"
        );
        TimeSeries { points }
    }

    /// Ordered period list.
    pub fn periods(&self) -> Vec<Period> {
        self.points.iter().map(|(p, _)| *p).collect()
    }

    /// Ordered anchor dates.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|(p, _)| p.anchor).collect()
    }

    pub fn counts(&self) -> Vec<i64> {
        self.points.iter().map(|(_, c)| *c).collect()
    }

    pub fn points(&self) -> &[(Period, i64)] {
        &self.points
    }

    /// Label → count map.
    pub fn values(&self) -> BTreeMap<String, i64> {
        self.points.iter().map(|(p, c)| (p.label(), *c)).collect()
    }

    /// Count for the period labelled `label`; zero if it is not in the series.
    pub fn get(&self, label: &str) -> i64 {
        self.points
            .iter()
            .find(|(p, _)| p.label() == label)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.points.iter().map(|(_, c)| c).sum()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_closest_monday() {
        assert_eq!(closest_monday(date(2012, 4, 1)), date(2012, 3, 26));
        assert_eq!(closest_monday(date(2012, 4, 2)), date(2012, 4, 2));
        assert_eq!(closest_monday(date(2012, 4, 7)), date(2012, 4, 2));
        assert_eq!(closest_monday(date(2012, 4, 9)), date(2012, 4, 9));
    }

    #[test]
    fn test_closest_monday_clamps_at_calendar_start() {
        let first = NaiveDate::MIN;
        assert_eq!(closest_monday(first), first);
        assert_eq!(Granularity::Week.period_start(first), first);
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!("day".parse::<Granularity>().unwrap(), Granularity::Day);
        assert_eq!("WEEK".parse::<Granularity>().unwrap(), Granularity::Week);
        assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!(matches!(
            "year".parse::<Granularity>(),
            Err(AnalyticsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_period_containing() {
        let d = date(2012, 4, 7);
        assert_eq!(Period::containing(Granularity::Day, d).anchor, d);
        assert_eq!(Period::containing(Granularity::Week, d).anchor, date(2012, 4, 2));
        assert_eq!(Period::containing(Granularity::Month, d).anchor, date(2012, 4, 1));
    }

    #[test]
    fn test_period_end() {
        assert_eq!(Granularity::Month.period_end(date(2012, 2, 1)), date(2012, 2, 29));
        assert_eq!(Granularity::Week.period_end(date(2011, 12, 26)), date(2012, 1, 1));
        assert_eq!(Granularity::Day.period_end(date(2012, 2, 1)), date(2012, 2, 1));
    }

    #[test]
    fn test_step() {
        let jan = date(2011, 12, 1);
        assert_eq!(Granularity::Month.step(jan, 1), Some(date(2012, 1, 1)));
        assert_eq!(Granularity::Month.step(jan, 3), Some(date(2012, 3, 1)));
        assert_eq!(Granularity::Week.step(jan, 2), Some(date(2011, 12, 15)));
    }

    #[test]
    fn test_storage_anchor() {
        let d = date(2012, 4, 7);
        assert_eq!(Granularity::Day.storage_anchor(d), date(2012, 4, 1));
        assert_eq!(Granularity::Week.storage_anchor(d), date(2012, 1, 1));
        assert_eq!(Granularity::Month.storage_anchor(d), date(2012, 1, 1));
    }

    #[test]
    fn test_one_or_many() {
        let one: OneOrMany<String> = "a".into();
        assert!(!one.is_many());
        assert_eq!(one.into_vec(), vec!["a".to_string()]);

        let many: OneOrMany<String> = vec!["a", "b"].into();
        assert!(many.is_many());
        assert_eq!(many.into_vec().len(), 2);
    }

    #[test]
    fn test_series_accessors() {
        let series = TimeSeries::new(vec![
            (Period::containing(Granularity::Day, date(2012, 1, 1)), 2),
            (Period::containing(Granularity::Day, date(2012, 1, 2)), 0),
            (Period::containing(Granularity::Day, date(2012, 1, 3)), 5),
        ]);

        assert_eq!(series.len(), 3);
        assert_eq!(series.total(), 7);
        assert_eq!(series.get("2012-01-03"), 5);
        assert_eq!(series.get("2013-01-01"), 0);
        assert_eq!(series.values().get("2012-01-02"), Some(&0));
        assert_eq!(series.counts(), vec![2, 0, 5]);
    }
}
