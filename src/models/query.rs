use chrono::NaiveDate;
use serde::Deserialize;

/// `GET /citas` query string. Everything is optional here so that missing
/// values surface as validation errors instead of extractor rejections.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub cedula: Option<String>,
}

/// Calendar-day window, `start` inclusive and `end_exclusive` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end_exclusive: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end_exclusive
    }
}
