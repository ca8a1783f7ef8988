//! Query parameter construction
//!
//! Tools accept many optional filters. `QueryParams` collects the ones that
//! are set and renders each value the way the EHR API expects: booleans in
//! lowercase, dates as ISO 8601, times as 12-hour clock with AM/PM.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

/// A single rendered query parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamValue(String);

impl ParamValue {
    /// Borrow the rendered value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self(if value { "true" } else { "false" }.to_string())
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        Self(value.format("%Y-%m-%d").to_string())
    }
}

impl From<NaiveTime> for ParamValue {
    fn from(value: NaiveTime) -> Self {
        Self(value.format("%I:%M %p").to_string())
    }
}

macro_rules! impl_numeric_param {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

impl_numeric_param!(i32, i64, u32, u64, usize, f64);

/// Ordered set of query parameters for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing an earlier value for the same key
    pub fn set(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key.into(), value.into());
        self
    }

    /// Set a parameter only when a value is present
    pub fn set_opt<V: Into<ParamValue>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Look up a rendered value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Rendered key/value pairs in insertion order
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Number of parameters set
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no parameters are set
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn insert(&mut self, key: String, value: ParamValue) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value.0,
            None => self.pairs.push((key, value.0)),
        }
    }
}
