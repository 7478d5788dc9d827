use crate::models::appointment::{Appointment, AppointmentDraft, ArrivalTime, RESERVED_FIELDS};
use crate::models::query::{DateRange, RangeQuery};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

// ASCII only; `\d` would also admit other Unicode digits.
static CEDULA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{10}$").expect("cedula pattern compiles"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no appointments were submitted")]
    EmptyBatch,
    #[error("each appointment needs an arrival time")]
    MissingArrivalTime,
    #[error("cedula must have exactly 10 digits")]
    InvalidCedula,
    #[error("arrival time is not a valid ISO-8601 timestamp: {0}")]
    InvalidArrivalTime(String),
    #[error("appointment id must not be empty")]
    EmptyId,
    #[error("an appointment with id {0} already exists")]
    DuplicateId(String),
    #[error("an appointment already exists at {0}")]
    SlotTaken(String),
    #[error("startDate and endDate are required")]
    MissingDateRange,
    #[error("invalid date {0}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// A draft whose fields passed the per-record checks.
#[derive(Debug)]
pub struct ValidDraft {
    pub id: Option<String>,
    pub cedula: String,
    pub arrival_time: ArrivalTime,
    pub extra: Map<String, Value>,
}

pub fn is_valid_cedula(cedula: &str) -> bool {
    CEDULA_PATTERN.is_match(cedula)
}

/// Per-record checks that need no stored data. Every record must pass
/// presence and cedula checks before any arrival time is parsed.
pub fn validate_fields(drafts: Vec<AppointmentDraft>) -> Result<Vec<ValidDraft>, ValidationError> {
    if drafts.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    for draft in &drafts {
        if draft.arrival_time.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(ValidationError::MissingArrivalTime);
        }
        if !draft.cedula.as_deref().is_some_and(is_valid_cedula) {
            return Err(ValidationError::InvalidCedula);
        }
    }

    drafts
        .into_iter()
        .map(|draft| {
            let raw = draft.arrival_time.unwrap_or_default();
            let arrival_time =
                ArrivalTime::parse(&raw).ok_or(ValidationError::InvalidArrivalTime(raw))?;

            if draft.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
                return Err(ValidationError::EmptyId);
            }

            let mut extra = draft.extra;
            for key in RESERVED_FIELDS {
                extra.remove(key);
            }

            Ok(ValidDraft {
                id: draft.id,
                cedula: draft.cedula.unwrap_or_default(),
                arrival_time,
                extra,
            })
        })
        .collect()
}

/// Checks a batch against the stored list and against itself: ids must be new
/// and no arrival may hit a slot held by an active appointment.
pub fn check_conflicts(
    drafts: &[ValidDraft],
    existing: &[Appointment],
) -> Result<(), ValidationError> {
    let mut seen_ids: HashSet<&str> = existing.iter().map(|a| a.id.as_str()).collect();
    for id in drafts.iter().filter_map(|d| d.id.as_deref()) {
        if !seen_ids.insert(id) {
            return Err(ValidationError::DuplicateId(id.to_string()));
        }
    }

    for (i, draft) in drafts.iter().enumerate() {
        let taken = existing
            .iter()
            .filter(|a| a.is_active())
            .any(|a| a.arrival_time.same_slot(&draft.arrival_time))
            || drafts[..i]
                .iter()
                .any(|earlier| earlier.arrival_time.same_slot(&draft.arrival_time));

        if taken {
            return Err(ValidationError::SlotTaken(
                draft.arrival_time.as_str().to_string(),
            ));
        }
    }

    Ok(())
}

/// Turns query parameters into a whole-day window and an optional cedula
/// filter. An empty `cedula` counts as absent.
pub fn parse_range(query: &RangeQuery) -> Result<(DateRange, Option<String>), ValidationError> {
    let (Some(start), Some(end)) = (query.start_date.as_deref(), query.end_date.as_deref()) else {
        return Err(ValidationError::MissingDateRange);
    };

    let cedula = match query.cedula.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(c) if is_valid_cedula(c) => Some(c.to_string()),
        Some(_) => return Err(ValidationError::InvalidCedula),
    };

    let start = parse_day(start)?;
    let end = parse_day(end)?;
    let end_exclusive = end
        .succ_opt()
        .ok_or_else(|| ValidationError::InvalidDate(end.to_string()))?;

    Ok((
        DateRange {
            start,
            end_exclusive,
        },
        cedula,
    ))
}

/// Only the part before `T` matters, so full timestamps are accepted too.
fn parse_day(raw: &str) -> Result<NaiveDate, ValidationError> {
    let day = raw.split('T').next().unwrap_or_default().trim();
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(value: Value) -> AppointmentDraft {
        serde_json::from_value(value).unwrap()
    }

    fn stored(id: &str, arrival: &str, status: &str) -> Appointment {
        serde_json::from_value(json!({
            "id": id,
            "cedula": "0912345678",
            "arrivalTime": arrival,
            "status": status
        }))
        .unwrap()
    }

    #[test]
    fn cedula_must_be_ten_ascii_digits() {
        assert!(is_valid_cedula("0912345678"));
        assert!(!is_valid_cedula("091234567"));
        assert!(!is_valid_cedula("09123456789"));
        assert!(!is_valid_cedula("09123456a8"));
        assert!(!is_valid_cedula("٠١٢٣٤٥٦٧٨٩"));
    }

    #[test]
    fn missing_arrival_is_reported_before_bad_cedula() {
        let err = validate_fields(vec![draft(json!({"cedula": "12"}))]).unwrap_err();
        assert_eq!(err, ValidationError::MissingArrivalTime);

        let err = validate_fields(vec![draft(json!({"arrivalTime": "2024-05-01", "cedula": "12"}))])
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidCedula);

        let err = validate_fields(vec![]).unwrap_err();
        assert_eq!(err, ValidationError::EmptyBatch);
    }

    #[test]
    fn reserved_fields_are_dropped() {
        let valid = validate_fields(vec![draft(json!({
            "arrivalTime": "2024-05-01T10:00:00Z",
            "cedula": "0912345678",
            "status": "cancelled",
            "image": "../../etc/passwd",
            "motivo": "renovación"
        }))])
        .unwrap();

        assert!(!valid[0].extra.contains_key("status"));
        assert!(!valid[0].extra.contains_key("image"));
        assert_eq!(valid[0].extra.get("motivo"), Some(&json!("renovación")));
    }

    #[test]
    fn unparseable_arrival_is_rejected() {
        let err = validate_fields(vec![draft(json!({
            "arrivalTime": "next monday",
            "cedula": "0912345678"
        }))])
        .unwrap_err();
        assert_eq!(err, ValidationError::InvalidArrivalTime("next monday".into()));
    }

    #[test]
    fn only_active_appointments_hold_a_slot() {
        let existing = vec![
            stored("a", "2024-05-01T09:00:00Z", "active"),
            stored("b", "2024-05-01T10:00:00Z", "cancelled"),
        ];

        let clash = validate_fields(vec![draft(json!({
            "arrivalTime": "2024-05-01T09:00:00Z",
            "cedula": "1712345678"
        }))])
        .unwrap();
        assert_eq!(
            check_conflicts(&clash, &existing),
            Err(ValidationError::SlotTaken("2024-05-01T09:00:00Z".into()))
        );

        let freed = validate_fields(vec![draft(json!({
            "arrivalTime": "2024-05-01T10:00:00Z",
            "cedula": "1712345678"
        }))])
        .unwrap();
        assert_eq!(check_conflicts(&freed, &existing), Ok(()));
    }

    #[test]
    fn batch_conflicts_with_itself() {
        let batch = validate_fields(vec![
            draft(json!({"arrivalTime": "2024-05-01T09:00", "cedula": "1712345678"})),
            draft(json!({"arrivalTime": "2024-05-01T09:00:00", "cedula": "0912345678"})),
        ])
        .unwrap();
        assert!(matches!(
            check_conflicts(&batch, &[]),
            Err(ValidationError::SlotTaken(_))
        ));
    }

    #[test]
    fn client_ids_must_be_unique() {
        let existing = vec![stored("cita-1", "2024-05-01T09:00:00Z", "cancelled")];
        let batch = validate_fields(vec![draft(json!({
            "id": "cita-1",
            "arrivalTime": "2024-05-02T09:00:00Z",
            "cedula": "1712345678"
        }))])
        .unwrap();
        assert_eq!(
            check_conflicts(&batch, &existing),
            Err(ValidationError::DuplicateId("cita-1".into()))
        );
    }

    #[test]
    fn range_includes_whole_end_day() {
        let (range, cedula) = parse_range(&RangeQuery {
            start_date: Some("2024-05-01T00:00:00.000Z".into()),
            end_date: Some("2024-05-01".into()),
            cedula: Some("".into()),
        })
        .unwrap();

        assert!(cedula.is_none());
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 4, 30).unwrap()));
    }

    #[test]
    fn range_rejects_missing_or_bad_input() {
        assert_eq!(
            parse_range(&RangeQuery::default()),
            Err(ValidationError::MissingDateRange)
        );
        assert_eq!(
            parse_range(&RangeQuery {
                start_date: Some("01/05/2024".into()),
                end_date: Some("2024-05-02".into()),
                cedula: None,
            }),
            Err(ValidationError::InvalidDate("01/05/2024".into()))
        );
        assert_eq!(
            parse_range(&RangeQuery {
                start_date: Some("2024-05-01".into()),
                end_date: Some("2024-05-02".into()),
                cedula: Some("123".into()),
            }),
            Err(ValidationError::InvalidCedula)
        );
    }
}
