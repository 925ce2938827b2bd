//! Structured attribute records carried by source operations.
//!
//! Attributes that the op kind fixes statically are strongly typed fields on
//! the op payload. The discardable dictionary on [`crate::op::Operation`]
//! uses the loosely typed [`Attribute`] value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Padding value used to square off ragged rows in a dense integer table.
pub const PADDING_SENTINEL: i64 = -1;

/// A dense integer table with an explicit shape (row-major values).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DenseIntElements {
    pub shape: Vec<i64>,
    pub values: Vec<i64>,
}

impl DenseIntElements {
    pub fn new(shape: Vec<i64>, values: Vec<i64>) -> Self {
        Self { shape, values }
    }

    /// A rank-1 table.
    pub fn vector(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len() as i64],
            values,
        }
    }

    /// A rank-2 table built from rows. Shorter rows are padded with
    /// [`PADDING_SENTINEL`] up to the longest row.
    pub fn from_rows(rows: &[Vec<i64>]) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * width);
        for row in rows {
            values.extend_from_slice(row);
            values.extend(std::iter::repeat(PADDING_SENTINEL).take(width - row.len()));
        }
        Self {
            shape: vec![rows.len() as i64, width as i64],
            values,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// A loosely typed attribute value, used for discardable metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Attribute>),
    DenseInt(DenseIntElements),
    Dict(BTreeMap<String, Attribute>),
}

impl Attribute {
    /// Shorthand for an array of integer scalars.
    pub fn ints(values: &[i64]) -> Self {
        Attribute::Array(values.iter().copied().map(Attribute::Int).collect())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Attribute::String(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the attribute's variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Attribute::Bool(_) => "bool",
            Attribute::Int(_) => "int",
            Attribute::Float(_) => "float",
            Attribute::String(_) => "string",
            Attribute::Array(_) => "array",
            Attribute::DenseInt(_) => "dense",
            Attribute::Dict(_) => "dict",
        }
    }
}

/// Literal payload of a constant op, in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementsData {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ElementsData {
    pub fn len(&self) -> usize {
        match self {
            ElementsData::Bool(v) => v.len(),
            ElementsData::Int(v) => v.len(),
            ElementsData::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Convolution dimension numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvDimensionNumbers {
    pub input_batch_dimension: i64,
    pub input_feature_dimension: i64,
    pub input_spatial_dimensions: Vec<i64>,
    pub kernel_input_feature_dimension: i64,
    pub kernel_output_feature_dimension: i64,
    pub kernel_spatial_dimensions: Vec<i64>,
    pub output_batch_dimension: i64,
    pub output_feature_dimension: i64,
    pub output_spatial_dimensions: Vec<i64>,
}

/// Dot-general dimension numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DotDimensionNumbers {
    pub lhs_batching_dimensions: Vec<i64>,
    pub rhs_batching_dimensions: Vec<i64>,
    pub lhs_contracting_dimensions: Vec<i64>,
    pub rhs_contracting_dimensions: Vec<i64>,
}

/// One `(output tuple path, operand, operand tuple path)` aliasing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputOperandAlias {
    pub output_tuple_indices: Vec<i64>,
    pub operand_index: i64,
    pub operand_tuple_indices: Vec<i64>,
}

/// Comparison direction of a compare op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonDirection {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

/// Source location of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
