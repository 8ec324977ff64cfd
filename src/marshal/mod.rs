//! Conversion between host values and [`Value`].
//!
//! Anything in the serde data model goes in through [`to_value`] and comes
//! back out through [`from_value`]. The conversion refuses shapes JSON has no
//! place for (raw byte buffers, maps keyed by non-strings) instead of
//! coercing them.
//!
//! ```
//! use jqhost::{from_value, to_value};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! let value = to_value(&Point { x: 1, y: -2 }).unwrap();
//! assert_eq!(value.to_json(), r#"{"x":1,"y":-2}"#);
//! assert_eq!(from_value::<Point>(value).unwrap(), Point { x: 1, y: -2 });
//! ```

mod de;
mod ser;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::jq::Value;

/// Error converting between a host value and [`Value`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarshalError {
    /// The host value has a shape with no JSON counterpart.
    ///
    /// `path` locates the offending part: `$` for the value itself, then
    /// `.key` and `[index]` segments, e.g. `$.items[2]`. Variables are
    /// rooted at their name instead, e.g. `$foo[2]`.
    #[error("unsupported type {type_name} at {path}")]
    UnsupportedType { type_name: String, path: String },

    /// The value does not fit the requested host type, or a `Serialize`
    /// impl reported its own error.
    #[error("{0}")]
    Custom(String),
}

impl MarshalError {
    pub(crate) fn unsupported(type_name: impl Into<String>, path: &str) -> Self {
        MarshalError::UnsupportedType {
            type_name: type_name.into(),
            path: path.to_string(),
        }
    }

    /// Re-root an `UnsupportedType` path at `root` (e.g. `$foo`).
    pub(crate) fn rooted_at(self, root: &str) -> Self {
        match self {
            MarshalError::UnsupportedType { type_name, path } => {
                let rest = path.strip_prefix('$').unwrap_or(&path);
                MarshalError::UnsupportedType {
                    type_name,
                    path: format!("{}{}", root, rest),
                }
            }
            other => other,
        }
    }
}

impl serde::ser::Error for MarshalError {
    fn custom<T: core::fmt::Display>(msg: T) -> Self {
        MarshalError::Custom(msg.to_string())
    }
}

impl serde::de::Error for MarshalError {
    fn custom<T: core::fmt::Display>(msg: T) -> Self {
        MarshalError::Custom(msg.to_string())
    }
}

/// Convert a host value into a [`Value`].
///
/// Integers and floats both become [`Value::Number`]; unit, `None` and unit
/// structs become `null`; enums use serde's externally tagged form
/// (`"Variant"` or `{"Variant": ...}`).
///
/// # Errors
///
/// [`MarshalError::UnsupportedType`] for byte buffers and for maps whose
/// keys are not strings.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, MarshalError> {
    value.serialize(ser::ValueSerializer::root())
}

/// Convert a [`Value`] into a host value.
///
/// Numbers without a fractional part are offered to the target type as
/// integers, so `from_value::<serde_json::Value>` yields `2` rather than
/// `2.0` for the number two.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, MarshalError> {
    T::deserialize(value)
}
