//! Deserializers for search-index documents.
//!
//! The indexing pipeline copies database rows into the index verbatim, which
//! turns integers into decimal strings and flags into `"0"`/`"1"`. These
//! helpers accept either the string or the native JSON form.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error;
use serde::{Deserialize, Deserializer};

/// Timestamp layout used by the indexing pipeline.
pub const INDEX_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Deserialize)]
#[serde(untagged)]
enum Integer {
    Number(i64),
    Text(String),
}

impl Integer {
    fn parse<E: Error>(self) -> Result<i64, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid integer {:?}", s))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(i64),
    Text(String),
}

pub fn id<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: From<i64>,
{
    Integer::deserialize(deserializer)?.parse().map(T::from)
}

pub fn int<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Integer::deserialize(deserializer)?.parse::<D::Error>()?;
    i32::try_from(value).map_err(|_| D::Error::custom(format!("{} does not fit in i32", value)))
}

pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Number(n) => Ok(n != 0),
        Flag::Text(s) => match s.trim() {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(D::Error::custom(format!("invalid flag {:?}", other))),
        },
    }
}

/// Empty strings and `null` become `None`; otherwise the value must be in
/// [`INDEX_TIME_FORMAT`] (taken as UTC) or RFC 3339.
pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Ok(None);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, INDEX_TIME_FORMAT) {
        return Ok(Some(naive.and_utc()));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| D::Error::custom(format!("cannot parse time {:?}: {}", raw, e)))
}
