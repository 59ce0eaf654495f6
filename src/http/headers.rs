//! Header and status storage for a pending response.
//!
//! # Responsibilities
//! - Keep every value set for a header name, in the order it was set
//! - Hold the status code that will be sent downstream
//!
//! # Design Decisions
//! - Names match case-insensitively; the first spelling seen is kept
//! - Values are not validated here; the transport rejects bad ones at drain time

use axum::http::StatusCode;

/// Status code plus an insertion-ordered multimap of header values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet {
    status: StatusCode,
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderSet {
    /// Create an empty set with status 200.
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            entries: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Append `value` to the sequence stored under `name`.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name.to_string(), vec![value])),
        }
    }

    /// Drop any values stored under `name` and store `value` alone.
    ///
    /// The name keeps its original position.
    pub fn replace(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => *values = vec![value],
            None => self.entries.push((name.to_string(), vec![value])),
        }
    }

    /// All values stored under `name`, oldest first.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// The most recently set value under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).last().map(String::as_str)
    }

    /// Iterate `(name, values)` pairs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HeaderSet {
    fn default() -> Self {
        Self::new()
    }
}
