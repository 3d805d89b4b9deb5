//! `YYYYMMDD` date handling for the storage and wire boundary.
//!
//! Internally every date is a `chrono::NaiveDate`. Files and API payloads
//! carry 8-digit `YYYYMMDD` strings; readers also accept ISO `YYYY-MM-DD`
//! so that files written by older tooling still load.

use chrono::NaiveDate;

/// Canonical storage format.
pub const COMPACT_FORMAT: &str = "%Y%m%d";

const ISO_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYYMMDD` (or `YYYY-MM-DD`) date string.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, COMPACT_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, ISO_FORMAT))
        .ok()
}

/// Format a date as `YYYYMMDD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(COMPACT_FORMAT).to_string()
}

/// Serde adapter for `NaiveDate` fields stored as `YYYYMMDD`.
pub mod yyyymmdd {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        // Upstream dumps sometimes carry dates as bare integers.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        super::parse_date(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid date '{raw}' (expected YYYYMMDD)")))
    }
}

/// Serde adapter for optional `YYYYMMDD` fields.
pub mod yyyymmdd_opt {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => serializer.serialize_some(&super::format_date(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => super::parse_date(s)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid date '{s}' (expected YYYYMMDD)"))),
        }
    }
}
