// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Message definitions for the measurement feed
//!
//! This module defines the types exchanged with the transport:
//! - Message and payload (decoded JSON or retained raw bytes)
//! - Raw scan batches (`[current, i_1..i_n, q_1..q_n]` per point)
//! - Scan timing and beam current records

use crate::error::{FeedError, Result};
use chrono::NaiveDateTime;
use serde_json::Value;
use std::fmt;

/// Timestamp format used by the instrument for `starttime` / `endtime`
pub const SCAN_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Decode UTF-8, skipping invalid sequences instead of replacing them
fn utf8_ignoring_invalid(mut bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                text.push_str(valid);
                return text;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                // valid_up_to marks a well-formed prefix
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(len) => bytes = &rest[len..],
                    // truncated sequence at the end
                    None => return text,
                }
            }
        }
    }
}

/// Message body as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body decoded as JSON
    Json(Value),
    /// Body that could not be decoded, kept verbatim
    Raw(Vec<u8>),
}

impl Payload {
    /// Decode a transport body.
    ///
    /// The body is read as UTF-8 with invalid sequences dropped and parsed
    /// as JSON. Anything that fails to parse is retained as raw bytes.
    pub fn decode(bytes: &[u8]) -> Self {
        let text = utf8_ignoring_invalid(bytes);
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(bytes.to_vec()),
        }
    }

    /// Decoded JSON, if any
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    /// Check whether the body was decoded
    pub fn is_json(&self) -> bool {
        matches!(self, Payload::Json(_))
    }

    /// Look up a top-level field of a JSON object payload
    pub fn field(&self, name: &'static str) -> Result<&Value> {
        match self {
            Payload::Json(Value::Object(map)) => map.get(name).ok_or(FeedError::MissingField(name)),
            Payload::Json(other) => Err(FeedError::MalformedPayload(format!(
                "expected JSON object, got {}",
                json_kind(other)
            ))),
            Payload::Raw(bytes) => Err(FeedError::MalformedPayload(format!(
                "undecoded body ({} bytes)",
                bytes.len()
            ))),
        }
    }

    /// Look up a string field
    pub fn str_field(&self, name: &'static str) -> Result<&str> {
        self.field(name)?
            .as_str()
            .ok_or_else(|| FeedError::InvalidField {
                field: name,
                reason: "expected string".to_string(),
            })
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A message from the feed: topic plus payload
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Full topic, including the base prefix
    pub topic: String,
    /// Decoded body
    pub payload: Payload,
}

impl Message {
    /// Create a message from an already decoded payload
    pub fn new(topic: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Create a message from a raw transport body
    pub fn from_bytes(topic: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            topic: topic.into(),
            payload: Payload::decode(bytes),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Json(value) => write!(f, "{}: {}", self.topic, value),
            Payload::Raw(bytes) => write!(f, "{}: <{} raw bytes>", self.topic, bytes.len()),
        }
    }
}

/// One measurement point of a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPoint {
    /// Field current (x axis)
    pub current: f64,
    /// In-phase samples, one per iteration
    pub i: Vec<f64>,
    /// Quadrature samples, one per iteration
    pub q: Vec<f64>,
}

impl ScanPoint {
    /// Split a wire row `[current, i_1..i_n, q_1..q_n]`
    pub fn from_row(row: &[f64]) -> Result<Self> {
        if row.len() < 3 || row.len() % 2 == 0 {
            return Err(FeedError::MalformedPayload(format!(
                "scan point needs 1 + 2n values with n >= 1, got {}",
                row.len()
            )));
        }
        let n = (row.len() - 1) / 2;
        Ok(Self {
            current: row[0],
            i: row[1..=n].to_vec(),
            q: row[n + 1..].to_vec(),
        })
    }

    /// Number of repeated iterations held by this point
    pub fn iterations(&self) -> usize {
        self.i.len()
    }
}

/// Raw samples of one scan message
#[derive(Debug, Clone, PartialEq)]
pub struct RawScanBatch {
    points: Vec<ScanPoint>,
    iterations: usize,
}

impl RawScanBatch {
    /// Build from points; every point must hold the same iteration count
    pub fn new(points: Vec<ScanPoint>) -> Result<Self> {
        let iterations = points
            .first()
            .map(ScanPoint::iterations)
            .ok_or_else(|| FeedError::MalformedPayload("scan contains no points".to_string()))?;

        for (index, point) in points.iter().enumerate() {
            if point.iterations() != iterations || point.q.len() != iterations {
                return Err(FeedError::IterationMismatch {
                    point: index,
                    expected: iterations,
                    actual: point.iterations(),
                });
            }
        }

        if iterations == 0 {
            return Err(FeedError::MalformedPayload(
                "scan points carry no iterations".to_string(),
            ));
        }

        Ok(Self { points, iterations })
    }

    /// Build from wire rows
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let points = rows
            .iter()
            .map(|row| ScanPoint::from_row(row.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(points)
    }

    /// Parse the JSON array of rows
    pub fn from_value(value: &Value) -> Result<Self> {
        let rows = value
            .as_array()
            .ok_or_else(|| FeedError::MalformedPayload("scan payload is not an array".to_string()))?;

        let mut parsed = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let values = row.as_array().ok_or_else(|| {
                FeedError::MalformedPayload(format!("scan point {} is not an array", index))
            })?;
            let numbers = values
                .iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| {
                        FeedError::MalformedPayload(format!(
                            "scan point {} holds a non-numeric value",
                            index
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            parsed.push(ScanPoint::from_row(&numbers)?);
        }

        Self::new(parsed)
    }

    /// Extract the batch from a message payload (`payload` field)
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        Self::from_value(payload.field("payload")?)
    }

    /// Points in scan order
    pub fn points(&self) -> &[ScanPoint] {
        &self.points
    }

    /// Iterations per point (`n`)
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if empty (never true for a validated batch)
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Field currents in scan order
    pub fn currents(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.current).collect()
    }
}

/// Parse an instrument timestamp
pub fn parse_scan_time(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, SCAN_TIME_FORMAT).map_err(|_| {
        FeedError::InvalidTimestamp {
            value: value.to_string(),
        }
    })
}

/// Start and end of a finished scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ScanTiming {
    /// Extract from a `done` payload (`starttime`, `endtime`)
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        Ok(Self {
            start: parse_scan_time(payload.str_field("starttime")?)?,
            end: parse_scan_time(payload.str_field("endtime")?)?,
        })
    }

    /// Elapsed scan time
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Elapsed scan time in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 1000.0
    }
}

/// Electron-beam current estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamCurrentEstimate(pub f64);

impl BeamCurrentEstimate {
    /// Extract the `current` field; accepts a numeric string or a number
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        let field = payload.field("current")?;
        let value = match field {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value
            .filter(|v| v.is_finite())
            .map(BeamCurrentEstimate)
            .ok_or_else(|| FeedError::InvalidField {
                field: "current",
                reason: format!("not a number: {}", field),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json_and_raw() {
        let payload = Payload::decode(br#"{"current": "1.5"}"#);
        assert!(payload.is_json());

        let payload = Payload::decode(b"not json at all");
        assert_eq!(payload, Payload::Raw(b"not json at all".to_vec()));
        assert!(payload.as_json().is_none());
    }

    #[test]
    fn test_decode_drops_invalid_utf8() {
        let mut body = br#"{"current": "1.5"}"#.to_vec();
        body.push(0xff);
        let payload = Payload::decode(&body);
        assert_eq!(payload, Payload::Json(json!({"current": "1.5"})));

        // stray byte inside a string value, truncated sequence at the end
        let mut body = b"{\"name\": \"ab".to_vec();
        body.push(0xc3);
        body.extend_from_slice(b"\xffc\"}\xe2\x82");
        assert_eq!(Payload::decode(&body), Payload::Json(json!({"name": "abc"})));

        // multi-byte characters survive
        let payload = Payload::decode("{\"unit\": \"\u{b5}A\"}".as_bytes());
        assert_eq!(payload, Payload::Json(json!({"unit": "\u{b5}A"})));
    }

    #[test]
    fn test_field_on_raw_payload_is_malformed() {
        let payload = Payload::Raw(vec![0xff, 0x00]);
        assert!(matches!(
            payload.field("payload"),
            Err(FeedError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_field_missing() {
        let payload = Payload::Json(json!({"other": 1}));
        assert!(matches!(
            payload.field("payload"),
            Err(FeedError::MissingField("payload"))
        ));
    }

    #[test]
    fn test_scan_point_split() {
        let point = ScanPoint::from_row(&[2.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(point.current, 2.0);
        assert_eq!(point.i, vec![1.0, 2.0, 3.0]);
        assert_eq!(point.q, vec![4.0, 5.0, 6.0]);
        assert_eq!(point.iterations(), 3);
    }

    #[test]
    fn test_scan_point_rejects_bad_lengths() {
        assert!(ScanPoint::from_row(&[1.0]).is_err());
        assert!(ScanPoint::from_row(&[1.0, 2.0]).is_err());
        assert!(ScanPoint::from_row(&[1.0, 2.0, 3.0, 4.0]).is_err());
    }

    #[test]
    fn test_batch_from_payload() {
        let payload = Payload::Json(json!({"payload": [[1.0, 10, 12], [2.0, 20, 22]]}));
        let batch = RawScanBatch::from_payload(&payload).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.iterations(), 1);
        assert_eq!(batch.currents(), vec![1.0, 2.0]);
        assert_eq!(batch.points()[1].q, vec![22.0]);
    }

    #[test]
    fn test_batch_rejects_mixed_iterations() {
        let rows = vec![vec![1.0, 1.0, 2.0], vec![2.0, 1.0, 2.0, 3.0, 4.0]];
        let err = RawScanBatch::from_rows(&rows).unwrap_err();
        assert!(matches!(
            err,
            FeedError::IterationMismatch {
                point: 1,
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_batch_rejects_empty_and_non_numeric() {
        let empty: Vec<Vec<f64>> = Vec::new();
        assert!(RawScanBatch::from_rows(&empty).is_err());
        assert!(RawScanBatch::from_value(&json!([[1.0, "x", 2.0]])).is_err());
        assert!(RawScanBatch::from_value(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_scan_timing() {
        let payload = Payload::Json(json!({
            "starttime": "2024-03-01_12:00:00",
            "endtime": "2024-03-01_12:01:15"
        }));
        let timing = ScanTiming::from_payload(&payload).unwrap();
        assert_eq!(timing.duration_secs(), 75.0);
    }

    #[test]
    fn test_scan_timing_rejects_bad_format() {
        let payload = Payload::Json(json!({
            "starttime": "2024-03-01 12:00:00",
            "endtime": "2024-03-01_12:01:15"
        }));
        assert!(matches!(
            ScanTiming::from_payload(&payload),
            Err(FeedError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_beam_current_string_and_number() {
        let est = BeamCurrentEstimate::from_payload(&Payload::Json(json!({"current": "12.5"})));
        assert_eq!(est.unwrap().0, 12.5);
        let est = BeamCurrentEstimate::from_payload(&Payload::Json(json!({"current": 3})));
        assert_eq!(est.unwrap().0, 3.0);
        let est = BeamCurrentEstimate::from_payload(&Payload::Json(json!({"current": "abc"})));
        assert!(est.is_err());
    }

    #[test]
    fn test_message_display() {
        let msg = Message::from_bytes("base/egun", b"\x00\x01");
        assert_eq!(format!("{}", msg), "base/egun: <2 raw bytes>");
    }
}
