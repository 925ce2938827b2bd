//! The source type universe: ranked tensors, tuples and tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of a ranked tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    I1,
    I8,
    I16,
    I32,
    I64,
    UI8,
    UI16,
    UI32,
    UI64,
    F16,
    BF16,
    F32,
    F64,
    Complex64,
    Complex128,
}

impl ElementType {
    /// Whether this is a signless/unsigned integer type (including `i1`).
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ElementType::I1
                | ElementType::I8
                | ElementType::I16
                | ElementType::I32
                | ElementType::I64
                | ElementType::UI8
                | ElementType::UI16
                | ElementType::UI32
                | ElementType::UI64
        )
    }

    /// Whether this is a real floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            ElementType::F16 | ElementType::BF16 | ElementType::F32 | ElementType::F64
        )
    }

    /// Whether this is a complex type.
    pub fn is_complex(&self) -> bool {
        matches!(self, ElementType::Complex64 | ElementType::Complex128)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementType::I1 => "i1",
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::UI8 => "ui8",
            ElementType::UI16 => "ui16",
            ElementType::UI32 => "ui32",
            ElementType::UI64 => "ui64",
            ElementType::F16 => "f16",
            ElementType::BF16 => "bf16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::Complex64 => "complex<f32>",
            ElementType::Complex128 => "complex<f64>",
        };
        write!(f, "{s}")
    }
}

/// A statically shaped tensor type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorType {
    pub element: ElementType,
    pub shape: Vec<i64>,
}

impl TensorType {
    pub fn new(element: ElementType, shape: &[i64]) -> Self {
        Self {
            element,
            shape: shape.to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total element count (1 for a scalar), or `None` if it overflows.
    pub fn num_elements(&self) -> Option<i64> {
        self.shape.iter().try_fold(1i64, |acc, &d| acc.checked_mul(d))
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<")?;
        for dim in &self.shape {
            write!(f, "{dim}x")?;
        }
        write!(f, "{}>", self.element)
    }
}

/// The type of an SSA value in a source module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Tensor(TensorType),
    Tuple(Vec<Type>),
    Token,
}

impl Type {
    pub fn tensor(element: ElementType, shape: &[i64]) -> Self {
        Type::Tensor(TensorType::new(element, shape))
    }

    pub fn scalar(element: ElementType) -> Self {
        Type::tensor(element, &[])
    }

    pub fn f32(shape: &[i64]) -> Self {
        Type::tensor(ElementType::F32, shape)
    }

    pub fn i32(shape: &[i64]) -> Self {
        Type::tensor(ElementType::I32, shape)
    }

    pub fn pred(shape: &[i64]) -> Self {
        Type::tensor(ElementType::I1, shape)
    }

    pub fn tuple(elements: Vec<Type>) -> Self {
        Type::Tuple(elements)
    }

    pub fn token() -> Self {
        Type::Token
    }

    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Type::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Type::Tuple(_))
    }

    /// Rank of a tensor type; `None` for tuples and tokens.
    pub fn rank(&self) -> Option<usize> {
        self.as_tensor().map(TensorType::rank)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Tensor(t) => write!(f, "{t}"),
            Type::Tuple(elements) => {
                write!(f, "tuple<")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ">")
            }
            Type::Token => write!(f, "!token"),
        }
    }
}
