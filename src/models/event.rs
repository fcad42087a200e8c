use std::{fmt::Display, str::FromStr};

use axum::response::sse::Event;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;

/// Kinds of data the notification hub can recompute and push
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Analytics,
    Media,
    Posts,
    Projects,
    Comments,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        DataType::Analytics,
        DataType::Media,
        DataType::Posts,
        DataType::Projects,
        DataType::Comments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Analytics => "analytics",
            DataType::Media => "media",
            DataType::Posts => "posts",
            DataType::Projects => "projects",
            DataType::Comments => "comments",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|data_type| data_type.as_str() == s)
            .ok_or_else(|| AppError::UnknownDataType(s.to_string()))
    }
}

/// Last payload computed for a data type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub payload: Value,
    pub computed_at: DateTime<Utc>,
}

/// Formats a timestamp the way browsers print `Date.toISOString()`
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One server-sent event.
///
/// Rendered as `event: <name>\n` (named events only) followed by
/// `data: <json>\n\n`. serde_json never emits raw newlines, so the data
/// always fits on a single `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub name: Option<&'static str>,
    pub data: Value,
}

impl SseEvent {
    pub const HEARTBEAT: &'static str = "heartbeat";

    /// Default (unnamed) event carrying `{type, timestamp, ...fields}`
    pub fn message(kind: &str, at: DateTime<Utc>, fields: Value) -> Self {
        let mut data = json!({
            "type": kind,
            "timestamp": iso_timestamp(at),
        });
        if let (Some(object), Value::Object(extra)) = (data.as_object_mut(), fields) {
            for (key, value) in extra {
                if key != "type" && key != "timestamp" {
                    object.insert(key, value);
                }
            }
        }
        Self { name: None, data }
    }

    /// First event written to every new connection
    pub fn connected(at: DateTime<Utc>) -> Self {
        Self::message("connected", at, Value::Null)
    }

    /// Fresh snapshot for one data type
    pub fn update(data_type: DataType, entry: &SnapshotEntry) -> Self {
        Self::message(
            "update",
            entry.computed_at,
            json!({
                "dataType": data_type,
                "data": entry.payload,
            }),
        )
    }

    pub fn heartbeat(at: DateTime<Utc>) -> Self {
        Self {
            name: Some(Self::HEARTBEAT),
            data: json!({ "timestamp": iso_timestamp(at) }),
        }
    }

    /// Builds the wire event; the name line must precede the data line
    pub fn to_event(&self) -> Result<Event, axum::Error> {
        let event = match self.name {
            Some(name) => Event::default().event(name),
            None => Event::default(),
        };
        event.json_data(&self.data)
    }
}

/// Renders events exactly as an SSE response body writes them
#[cfg(test)]
pub(crate) async fn render_event(event: Event) -> String {
    use axum::response::{sse::Sse, IntoResponse};

    let stream = futures::stream::iter([Ok::<_, std::convert::Infallible>(event)]);
    let body = Sse::new(stream).into_response().into_body();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
