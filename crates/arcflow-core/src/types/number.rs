//! Numeric value representation for arcflow.
//!
//! The `Number` enum represents numeric values that can be either integers
//! or floating point numbers, so the data plane can carry both uniformly
//! while preserving type information.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    // Integer value (64-bit signed integer).
    Integer(i64),
    // Floating-point value (64-bit float).
    Float(f64),
}

impl Number {
    /// Converts the number to an `f64` value.
    ///
    /// Integers are converted to floats; values beyond 2^53 lose precision.
    ///
    /// # Examples
    ///
    /// ```
    /// use arcflow_core::types::Number;
    ///
    /// assert_eq!(Number::Integer(42).as_f64(), 42.0);
    /// assert_eq!(Number::Float(2.5).as_f64(), 2.5);
    /// ```
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    /// Returns the integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Integer(i) => Some(*i),
            Number::Float(_) => None,
        }
    }

    /// True when the number is an integer variant.
    pub fn is_integer(&self) -> bool {
        matches!(self, Number::Integer(_))
    }
}

impl From<i64> for Number {
    /// Creates a `Number::Integer` from an `i64`.
    fn from(value: i64) -> Self {
        Number::Integer(value)
    }
}

impl From<i32> for Number {
    /// Creates a `Number::Integer` from an `i32`.
    fn from(value: i32) -> Self {
        Number::Integer(value as i64)
    }
}

impl From<u32> for Number {
    /// Creates a `Number::Integer` from a `u32`.
    fn from(value: u32) -> Self {
        Number::Integer(value as i64)
    }
}

impl From<f64> for Number {
    /// Creates a `Number::Float` from an `f64`.
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}
