//! Reduction of the backend's payload wrappers to one canonical record
//!
//! The backend is inconsistent about how it wraps a record: sometimes the
//! record is sent bare, sometimes under a `data` key, and sometimes under a
//! `data` key as a list of records. [`Envelope`] names those three shapes and
//! [`normalize`] collapses them.

use serde_json::Value;

/// A raw payload as received on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// No payload at all (`null`)
    Empty,
    /// `{"data": [T, ...]}`
    List(Vec<Value>),
    /// `{"data": T}` where `T` is not a list
    Wrapped(Value),
    /// Anything else, taken to be the record itself
    Bare(Value),
}

impl Envelope {
    /// Classify a decoded JSON document. A `data` key always wins over
    /// treating the wrapper itself as the record.
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Null => Envelope::Empty,
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(items)) => Envelope::List(items),
                Some(inner) => Envelope::Wrapped(inner),
                None => Envelope::Bare(Value::Object(map)),
            },
            other => Envelope::Bare(other),
        }
    }

    /// The record carried by this envelope, picking the first list entry
    pub fn into_first(self) -> Option<Value> {
        match self {
            Envelope::Empty => None,
            Envelope::List(items) => items.into_iter().next(),
            Envelope::Wrapped(inner) => Some(inner),
            Envelope::Bare(record) => Some(record),
        }
    }

    /// The record carried by this envelope, picking the last list entry
    pub fn into_latest(self) -> Option<Value> {
        match self {
            Envelope::List(items) => items.into_iter().last(),
            other => other.into_first(),
        }
    }
}

/// Normalize a pushed message. `None` stands for a null record.
pub fn normalize(value: Value) -> Option<Value> {
    Envelope::classify(value).into_first().and_then(non_null)
}

/// Normalize a polled response, where list envelopes are append-only and the
/// newest entry is last.
pub fn normalize_latest(value: Value) -> Option<Value> {
    Envelope::classify(value).into_latest().and_then(non_null)
}

fn non_null(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        other => Some(other),
    }
}
