//! Target shapes and physical layouts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of a target array shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    Bf16,
    F32,
    F64,
    C64,
    C128,
    Tuple,
    Token,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Pred => "pred",
            PrimitiveType::S8 => "s8",
            PrimitiveType::S16 => "s16",
            PrimitiveType::S32 => "s32",
            PrimitiveType::S64 => "s64",
            PrimitiveType::U8 => "u8",
            PrimitiveType::U16 => "u16",
            PrimitiveType::U32 => "u32",
            PrimitiveType::U64 => "u64",
            PrimitiveType::F16 => "f16",
            PrimitiveType::Bf16 => "bf16",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
            PrimitiveType::C64 => "c64",
            PrimitiveType::C128 => "c128",
            PrimitiveType::Tuple => "tuple",
            PrimitiveType::Token => "token",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Physical dimension ordering, listed from most minor to most major.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    pub minor_to_major: Vec<i64>,
}

impl Layout {
    pub fn new(minor_to_major: Vec<i64>) -> Self {
        Self { minor_to_major }
    }

    /// The default row-major layout: the last dimension is the most minor.
    pub fn descending(rank: usize) -> Self {
        Self {
            minor_to_major: (0..rank as i64).rev().collect(),
        }
    }

    /// Whether `minor_to_major` is a permutation of `0..rank`.
    pub fn is_valid_for_rank(&self, rank: usize) -> bool {
        if self.minor_to_major.len() != rank {
            return false;
        }
        let mut seen = vec![false; rank];
        for &dim in &self.minor_to_major {
            match usize::try_from(dim).ok().filter(|d| *d < rank) {
                Some(d) if !seen[d] => seen[d] = true,
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, dim) in self.minor_to_major.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "}}")
    }
}

/// A target shape: an array, a tuple of shapes, or a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub element_type: PrimitiveType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tuple_shapes: Vec<Shape>,
}

impl Shape {
    pub fn array(element_type: PrimitiveType, dimensions: &[i64]) -> Self {
        Self {
            element_type,
            dimensions: dimensions.to_vec(),
            layout: None,
            tuple_shapes: Vec::new(),
        }
    }

    pub fn scalar(element_type: PrimitiveType) -> Self {
        Self::array(element_type, &[])
    }

    pub fn tuple(elements: Vec<Shape>) -> Self {
        Self {
            element_type: PrimitiveType::Tuple,
            dimensions: Vec::new(),
            layout: None,
            tuple_shapes: elements,
        }
    }

    pub fn token() -> Self {
        Self {
            element_type: PrimitiveType::Token,
            dimensions: Vec::new(),
            layout: None,
            tuple_shapes: Vec::new(),
        }
    }

    pub fn is_tuple(&self) -> bool {
        self.element_type == PrimitiveType::Tuple
    }

    pub fn is_token(&self) -> bool {
        self.element_type == PrimitiveType::Token
    }

    pub fn is_array(&self) -> bool {
        !self.is_tuple() && !self.is_token()
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Number of non-tuple leaves; an empty tuple has none.
    pub fn leaf_count(&self) -> usize {
        if self.is_tuple() {
            self.tuple_shapes.iter().map(Shape::leaf_count).sum()
        } else {
            1
        }
    }

    /// Replace the layout of an array shape.
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Assign the default descending layout to every array leaf that has none.
    pub fn with_default_layout(mut self) -> Self {
        self.fill_default_layout();
        self
    }

    fn fill_default_layout(&mut self) {
        if self.is_tuple() {
            for element in &mut self.tuple_shapes {
                element.fill_default_layout();
            }
        } else if self.is_array() && self.layout.is_none() {
            self.layout = Some(Layout::descending(self.rank()));
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tuple() {
            write!(f, "(")?;
            for (i, element) in self.tuple_shapes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{element}")?;
            }
            return write!(f, ")");
        }
        write!(f, "{}[", self.element_type)?;
        for (i, dim) in self.dimensions.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")?;
        match &self.layout {
            Some(layout) if self.rank() > 0 => write!(f, "{layout}"),
            _ => Ok(()),
        }
    }
}

/// Parameter and result shapes of a computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramShape {
    pub parameters: Vec<Shape>,
    pub parameter_names: Vec<String>,
    pub result: Shape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descending_layout() {
        assert_eq!(Layout::descending(3).minor_to_major, vec![2, 1, 0]);
        assert!(Layout::descending(0).minor_to_major.is_empty());
    }

    #[test]
    fn layout_validity() {
        assert!(Layout::new(vec![0, 1]).is_valid_for_rank(2));
        assert!(!Layout::new(vec![0, 0]).is_valid_for_rank(2));
        assert!(!Layout::new(vec![0, 2]).is_valid_for_rank(2));
        assert!(!Layout::new(vec![-1, 0]).is_valid_for_rank(2));
        assert!(!Layout::new(vec![0]).is_valid_for_rank(2));
    }

    #[test]
    fn default_layout_fills_tuple_leaves() {
        let shape = Shape::tuple(vec![
            Shape::array(PrimitiveType::F32, &[2, 3]),
            Shape::array(PrimitiveType::S32, &[4]).with_layout(Layout::new(vec![0])),
            Shape::token(),
        ])
        .with_default_layout();
        assert_eq!(
            shape.tuple_shapes[0].layout,
            Some(Layout::new(vec![1, 0]))
        );
        assert_eq!(shape.tuple_shapes[1].layout, Some(Layout::new(vec![0])));
        assert_eq!(shape.tuple_shapes[2].layout, None);
        assert_eq!(shape.layout, None);
    }

    #[test]
    fn display_forms() {
        let array = Shape::array(PrimitiveType::F32, &[2, 3]).with_default_layout();
        assert_eq!(array.to_string(), "f32[2,3]{1,0}");
        let scalar = Shape::scalar(PrimitiveType::Pred).with_default_layout();
        assert_eq!(scalar.to_string(), "pred[]");
        let tuple = Shape::tuple(vec![scalar, Shape::token()]);
        assert_eq!(tuple.to_string(), "(pred[], token[])");
    }

    #[test]
    fn leaf_counts() {
        let nested = Shape::tuple(vec![
            Shape::scalar(PrimitiveType::F32),
            Shape::tuple(vec![
                Shape::scalar(PrimitiveType::F32),
                Shape::scalar(PrimitiveType::S8),
            ]),
        ]);
        assert_eq!(nested.leaf_count(), 3);
        assert_eq!(Shape::tuple(vec![]).leaf_count(), 0);
    }
}
