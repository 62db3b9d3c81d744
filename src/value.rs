//! Typed experiment values and conversion from raw variables.
use std::num::ParseIntError;
use std::str::ParseBoolError;

use derive_more::From;
use serde::Serialize;

use crate::experiment::VariableType;

/// A typed experiment value.
///
/// Callers pass a default `ExperimentValue` with every request. Its variant determines the
/// [`Shape`] a variable must be convertible to, and the value itself is returned whenever no
/// experiment matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, From)]
#[serde(untagged)]
pub enum ExperimentValue {
    /// A string. `STRING` and `JSON` variables resolve to this variant.
    String(String),
    /// An 8-bit integer.
    Int8(i8),
    /// A 16-bit integer.
    Int16(i16),
    /// A 32-bit integer.
    Int32(i32),
    /// A 64-bit integer.
    Int64(i64),
    /// A boolean.
    Boolean(bool),
}

impl From<&str> for ExperimentValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl ExperimentValue {
    /// The shape a variable must be convertible to in order to replace this value.
    pub fn shape(&self) -> Shape {
        match self {
            ExperimentValue::String(_) => Shape::String,
            ExperimentValue::Int8(_) => Shape::Int(IntWidth::W8),
            ExperimentValue::Int16(_) => Shape::Int(IntWidth::W16),
            ExperimentValue::Int32(_) => Shape::Int(IntWidth::W32),
            ExperimentValue::Int64(_) => Shape::Int(IntWidth::W64),
            ExperimentValue::Boolean(_) => Shape::Bool,
        }
    }

    /// Return the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExperimentValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Return the value as `i64` if it is an integer of any width.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            ExperimentValue::Int8(i) => Some(i.into()),
            ExperimentValue::Int16(i) => Some(i.into()),
            ExperimentValue::Int32(i) => Some(i.into()),
            ExperimentValue::Int64(i) => Some(i),
            _ => None,
        }
    }

    /// Return the value as `bool` if it is a boolean.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ExperimentValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// Expected shape of a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Matches `STRING` and `JSON` variables.
    String,
    /// Matches `INTEGER` variables that fit in the given width.
    Int(IntWidth),
    /// Matches `BOOLEAN` variables.
    Bool,
}

/// Bit width of an integer [`Shape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    #[allow(missing_docs)]
    W8,
    #[allow(missing_docs)]
    W16,
    #[allow(missing_docs)]
    W32,
    #[allow(missing_docs)]
    W64,
}

impl VariableType {
    /// Shape a variable of this type converts to when no default is available.
    pub(crate) fn natural_shape(self) -> Option<Shape> {
        match self {
            VariableType::String | VariableType::Json => Some(Shape::String),
            VariableType::Integer => Some(Shape::Int(IntWidth::W64)),
            VariableType::Boolean => Some(Shape::Bool),
            VariableType::Unknown => None,
        }
    }
}

/// Reasons a variable cannot be converted to the requested shape.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CastError {
    /// Declared type and requested shape are incompatible.
    #[error("variable of type {declared:?} cannot be converted to {shape:?}")]
    TypeMismatch {
        /// Declared type of the variable.
        declared: VariableType,
        /// Requested shape.
        shape: Shape,
    },
    /// The value is not a base-10 integer within the requested width.
    #[error("invalid integer value")]
    InvalidInteger(#[from] ParseIntError),
    /// The value is neither `"true"` nor `"false"`.
    #[error("invalid boolean value")]
    InvalidBoolean(#[from] ParseBoolError),
}

/// Convert a raw variable value to `shape`.
///
/// `JSON` values are returned unparsed. Malformed numbers and booleans are reported as errors,
/// never as silent defaults.
///
/// ```
/// # use abtesting::{cast, ExperimentValue, IntWidth, Shape, VariableType};
/// assert_eq!(
///     cast("42", VariableType::Integer, Shape::Int(IntWidth::W32)),
///     Ok(ExperimentValue::Int32(42))
/// );
/// assert!(cast("300", VariableType::Integer, Shape::Int(IntWidth::W8)).is_err());
/// ```
pub fn cast(raw: &str, declared: VariableType, shape: Shape) -> Result<ExperimentValue, CastError> {
    let value: ExperimentValue = match (declared, shape) {
        (VariableType::String | VariableType::Json, Shape::String) => raw.to_owned().into(),
        (VariableType::Integer, Shape::Int(width)) => match width {
            IntWidth::W8 => raw.parse::<i8>()?.into(),
            IntWidth::W16 => raw.parse::<i16>()?.into(),
            IntWidth::W32 => raw.parse::<i32>()?.into(),
            IntWidth::W64 => raw.parse::<i64>()?.into(),
        },
        (VariableType::Boolean, Shape::Bool) => raw.parse::<bool>()?.into(),
        (declared, shape) => return Err(CastError::TypeMismatch { declared, shape }),
    };
    Ok(value)
}
