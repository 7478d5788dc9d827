use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Fields the server owns. Clients may send them but they are dropped on save.
pub const RESERVED_FIELDS: [&str; 5] = ["status", "image", "imageUrl", "revision", "createdAt"];

/// Naive forms accepted after RFC 3339 fails. `%.f` also matches no fraction.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Active,
    Cancelled,
}

/// Scheduled arrival, kept exactly as the client wrote it.
///
/// The calendar date is taken from the written wall-clock value, so
/// `2024-05-01T23:30:00-05:00` belongs to May 1st even though it is May 2nd in UTC.
///
/// Stored records whose text is not a recognized timestamp are kept verbatim
/// with no wall-clock value: they have no date and hold no slot.
#[derive(Debug, Clone)]
pub struct ArrivalTime {
    raw: String,
    wall: Option<NaiveDateTime>,
    instant: Option<DateTime<FixedOffset>>,
}

impl ArrivalTime {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();

        if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(ArrivalTime {
                raw: raw.to_string(),
                wall: Some(instant.naive_local()),
                instant: Some(instant),
            });
        }

        for format in NAIVE_FORMATS {
            if let Ok(wall) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Some(ArrivalTime {
                    raw: raw.to_string(),
                    wall: Some(wall),
                    instant: None,
                });
            }
        }

        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .map(|date| ArrivalTime {
                raw: raw.to_string(),
                wall: Some(date.and_time(NaiveTime::MIN)),
                instant: None,
            })
    }

    /// Falls back to an unscheduled value instead of failing.
    pub fn parse_lenient(raw: String) -> Self {
        ArrivalTime::parse(&raw).unwrap_or(ArrivalTime {
            raw,
            wall: None,
            instant: None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_scheduled(&self) -> bool {
        self.wall.is_some()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.wall.map(|wall| wall.date())
    }

    /// Two arrivals occupy the same slot when they name the same instant, or,
    /// if either lacks an offset, the same wall-clock date-time.
    pub fn same_slot(&self, other: &ArrivalTime) -> bool {
        match (self.instant, other.instant) {
            (Some(a), Some(b)) => a == b,
            _ => matches!((self.wall, other.wall), (Some(a), Some(b)) if a == b),
        }
    }
}

impl Serialize for ArrivalTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// Lenient on purpose: older files hold whatever the client sent.
impl<'de> Deserialize<'de> for ArrivalTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(ArrivalTime::parse_lenient(raw))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

/// Accepts `"123"` or `123`; older files and some clients send numbers.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}

/// A persisted booking.
///
/// Records written before ids were assigned load with an empty `id`; the store
/// fills it in (see `AppointmentStore::load`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub cedula: String,
    pub arrival_time: ArrivalTime,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub revision: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Any other client fields, stored and echoed untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Appointment {
    pub fn is_active(&self) -> bool {
        self.status == AppointmentStatus::Active
    }

    /// Marks the appointment cancelled. Returns `false` if it already was.
    pub fn cancel(&mut self) -> bool {
        if self.status == AppointmentStatus::Cancelled {
            return false;
        }
        self.status = AppointmentStatus::Cancelled;
        self.revision += 1;
        true
    }
}

/// One record as submitted by a client, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDraft {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub cedula: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// JSON body of a save request: a single record or a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SavePayload {
    Many(Vec<AppointmentDraft>),
    One(AppointmentDraft),
}

impl SavePayload {
    pub fn into_drafts(self) -> Vec<AppointmentDraft> {
        match self {
            SavePayload::Many(drafts) => drafts,
            SavePayload::One(draft) => vec![draft],
        }
    }
}

/// Query result row: the stored record plus a download link for its upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub image_url: Option<String>,
}
