//! Natural keys.
//!
//! A [`Key`] is an immutable, ordered tuple of [`Scalar`] values that names
//! the same real-world entity in every dataset. Keys are totally ordered
//! (lexicographically, component by component), which is what the chunked
//! loader relies on to merge two sorted streams.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One component of a natural key.
///
/// Ordering is by variant first (`Null < Bool < Int < Text`), then by value.
/// Floating point values are not representable: they have no total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Scalar {
    /// Convert a JSON value into a key component.
    ///
    /// Returns `None` for floats, arrays and objects.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Self::Int),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// The JSON form of this component.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Immutable natural key of an element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Vec<Scalar>);

impl Key {
    /// Build a key from its components.
    #[must_use]
    pub fn new(parts: Vec<Scalar>) -> Self {
        Self(parts)
    }

    /// Key components in order.
    #[must_use]
    pub fn parts(&self) -> &[Scalar] {
        &self.0
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty tuple.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Scalar>> for Key {
    fn from(parts: Vec<Scalar>) -> Self {
        Self(parts)
    }
}

impl From<Scalar> for Key {
    fn from(part: Scalar) -> Self {
        Self(vec![part])
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(vec![Scalar::from(s)])
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Self(vec![Scalar::Int(i)])
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Self(vec![Scalar::from(i)])
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, ")")
    }
}
