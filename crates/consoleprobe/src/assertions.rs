//! Response assertions

use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker whose presence means the console reported an error
pub const ERROR_MARKER: &str = "Error:";

/// Check applied to a command response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// Response contains `value`
    Contains {
        /// Required substring
        value: String,
    },

    /// Response does not contain `value`
    NotContains {
        /// Forbidden substring
        value: String,
    },

    /// Response matches `pattern` somewhere
    Regex {
        /// Regular expression
        pattern: String,
    },

    /// Response has at least `value` characters
    MinLength {
        /// Minimum number of characters
        value: usize,
    },

    /// Response does not contain [`ERROR_MARKER`]
    NoError,
}

impl Assertion {
    /// Evaluate against `response`
    ///
    /// Only an invalid regular expression is an error.
    pub fn check(&self, response: &str) -> Result<bool> {
        Ok(match self {
            Self::Contains { value } => response.contains(value.as_str()),
            Self::NotContains { value } => !response.contains(value.as_str()),
            Self::Regex { pattern } => Regex::new(pattern)?.is_match(response),
            Self::MinLength { value } => response.chars().count() >= *value,
            Self::NoError => !response.contains(ERROR_MARKER),
        })
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains { value } => write!(f, "contains '{}'", value),
            Self::NotContains { value } => write!(f, "does not contain '{}'", value),
            Self::Regex { pattern } => write!(f, "matches /{}/", pattern),
            Self::MinLength { value } => write!(f, "length >= {}", value),
            Self::NoError => f.write_str("no error"),
        }
    }
}
