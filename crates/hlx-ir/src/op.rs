//! Operation kinds and the Operation struct.
//!
//! Every supported operation kind is one variant of [`OpKind`], carrying its
//! own typed attribute payload and, where the op has them, nested regions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attr::{
    Attribute, ComparisonDirection, ConvDimensionNumbers, DenseIntElements, DotDimensionNumbers,
    ElementsData, Location, OutputOperandAlias,
};
use crate::block::Block;
use crate::types::Type;

/// SSA value identifier, unique within one function (nested regions included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Elementwise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Abs,
    Negate,
    Exp,
    Log,
    Sqrt,
    Rsqrt,
    Tanh,
    Logistic,
    Floor,
    Ceil,
    Sign,
    Cosine,
    Sine,
    Not,
    Copy,
}

/// Elementwise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Maximum,
    Minimum,
    Power,
    And,
    Or,
    Xor,
    Atan2,
    ShiftLeft,
    ShiftRightArithmetic,
    ShiftRightLogical,
}

/// Attributes of a convolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolutionAttrs {
    pub window_strides: Option<Vec<i64>>,
    /// `[spatial_dims x 2]` table of (low, high) padding.
    pub padding: Option<DenseIntElements>,
    pub lhs_dilation: Option<Vec<i64>>,
    pub rhs_dilation: Option<Vec<i64>>,
    pub dimension_numbers: ConvDimensionNumbers,
    pub feature_group_count: i64,
    pub batch_group_count: i64,
}

/// Attributes of a custom call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCallAttrs {
    pub call_target_name: String,
    #[serde(default)]
    pub has_side_effect: bool,
    #[serde(default)]
    pub backend_config: String,
    /// Symbolic API version name, e.g. `API_VERSION_ORIGINAL`.
    pub api_version: String,
    /// Symbolic schedule name, e.g. `SCHEDULE_NONE`.
    pub schedule: String,
    /// One minor-to-major integer array per operand.
    #[serde(default)]
    pub operand_layouts: Option<Vec<Attribute>>,
    /// One minor-to-major integer array per result.
    #[serde(default)]
    pub result_layouts: Option<Vec<Attribute>>,
    #[serde(default)]
    pub output_operand_aliases: Vec<OutputOperandAlias>,
}

impl CustomCallAttrs {
    pub fn new(call_target_name: impl Into<String>) -> Self {
        Self {
            call_target_name: call_target_name.into(),
            has_side_effect: false,
            backend_config: String::new(),
            api_version: "API_VERSION_ORIGINAL".into(),
            schedule: "SCHEDULE_NONE".into(),
            operand_layouts: None,
            result_layouts: None,
            output_operand_aliases: Vec::new(),
        }
    }
}

/// The kind of an operation, with its typed attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    // Values
    Constant {
        value: ElementsData,
    },
    Iota {
        dimension: i64,
    },

    // Elementwise
    Unary(UnaryOp),
    Binary(BinaryOp),
    Compare {
        direction: ComparisonDirection,
    },
    Select,
    Clamp,
    Convert,
    BitcastConvert,

    // Shape manipulation
    Bitcast,
    Reshape,
    BroadcastInDim {
        broadcast_dimensions: Vec<i64>,
    },
    Transpose {
        permutation: Vec<i64>,
    },
    Reverse {
        dimensions: Vec<i64>,
    },
    Slice {
        start_indices: Vec<i64>,
        limit_indices: Vec<i64>,
        strides: Vec<i64>,
    },
    DynamicSlice {
        slice_sizes: Vec<i64>,
    },
    DynamicUpdateSlice,
    Concatenate {
        dimension: i64,
    },
    Pad {
        edge_padding_low: Vec<i64>,
        edge_padding_high: Vec<i64>,
        interior_padding: Vec<i64>,
    },
    Tuple,
    GetTupleElement {
        index: u32,
    },

    // Linear algebra
    Dot,
    DotGeneral {
        dimension_numbers: DotDimensionNumbers,
    },
    Convolution(Box<ConvolutionAttrs>),
    Fft {
        /// Symbolic name: `FFT`, `IFFT`, `RFFT` or `IRFFT`.
        fft_type: String,
        fft_length: Vec<i64>,
    },
    TriangularSolve {
        left_side: bool,
        lower: bool,
        unit_diagonal: bool,
        /// Symbolic name: `NO_TRANSPOSE`, `TRANSPOSE` or `ADJOINT`.
        transpose_a: String,
    },

    // Region-carrying
    Reduce {
        dimensions: Vec<i64>,
        body: Block,
    },
    Sort {
        dimension: i64,
        is_stable: bool,
        comparator: Block,
    },
    While {
        cond: Block,
        body: Block,
    },
    If {
        true_branch: Block,
        false_branch: Block,
    },

    // Collectives
    AllReduce {
        replica_groups: DenseIntElements,
        channel_id: Option<i64>,
        reducer: Block,
    },
    AllGather {
        all_gather_dimension: i64,
        replica_groups: DenseIntElements,
        channel_id: Option<i64>,
    },
    CollectivePermute {
        source_target_pairs: Option<DenseIntElements>,
        channel_id: Option<i64>,
    },
    ReplicaId,

    // Effects and calls
    AfterAll,
    CustomCall(Box<CustomCallAttrs>),
    Call {
        callee: String,
    },
}

impl OpKind {
    /// The op's name as printed in the source dialect.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Constant { .. } => "constant",
            OpKind::Iota { .. } => "iota",
            OpKind::Unary(op) => match op {
                UnaryOp::Abs => "abs",
                UnaryOp::Negate => "negate",
                UnaryOp::Exp => "exponential",
                UnaryOp::Log => "log",
                UnaryOp::Sqrt => "sqrt",
                UnaryOp::Rsqrt => "rsqrt",
                UnaryOp::Tanh => "tanh",
                UnaryOp::Logistic => "logistic",
                UnaryOp::Floor => "floor",
                UnaryOp::Ceil => "ceil",
                UnaryOp::Sign => "sign",
                UnaryOp::Cosine => "cosine",
                UnaryOp::Sine => "sine",
                UnaryOp::Not => "not",
                UnaryOp::Copy => "copy",
            },
            OpKind::Binary(op) => match op {
                BinaryOp::Add => "add",
                BinaryOp::Subtract => "subtract",
                BinaryOp::Multiply => "multiply",
                BinaryOp::Divide => "divide",
                BinaryOp::Remainder => "remainder",
                BinaryOp::Maximum => "maximum",
                BinaryOp::Minimum => "minimum",
                BinaryOp::Power => "power",
                BinaryOp::And => "and",
                BinaryOp::Or => "or",
                BinaryOp::Xor => "xor",
                BinaryOp::Atan2 => "atan2",
                BinaryOp::ShiftLeft => "shift_left",
                BinaryOp::ShiftRightArithmetic => "shift_right_arithmetic",
                BinaryOp::ShiftRightLogical => "shift_right_logical",
            },
            OpKind::Compare { .. } => "compare",
            OpKind::Select => "select",
            OpKind::Clamp => "clamp",
            OpKind::Convert => "convert",
            OpKind::BitcastConvert => "bitcast_convert",
            OpKind::Bitcast => "bitcast",
            OpKind::Reshape => "reshape",
            OpKind::BroadcastInDim { .. } => "broadcast_in_dim",
            OpKind::Transpose { .. } => "transpose",
            OpKind::Reverse { .. } => "reverse",
            OpKind::Slice { .. } => "slice",
            OpKind::DynamicSlice { .. } => "dynamic_slice",
            OpKind::DynamicUpdateSlice => "dynamic_update_slice",
            OpKind::Concatenate { .. } => "concatenate",
            OpKind::Pad { .. } => "pad",
            OpKind::Tuple => "tuple",
            OpKind::GetTupleElement { .. } => "get_tuple_element",
            OpKind::Dot => "dot",
            OpKind::DotGeneral { .. } => "dot_general",
            OpKind::Convolution(_) => "convolution",
            OpKind::Fft { .. } => "fft",
            OpKind::TriangularSolve { .. } => "triangular_solve",
            OpKind::Reduce { .. } => "reduce",
            OpKind::Sort { .. } => "sort",
            OpKind::While { .. } => "while",
            OpKind::If { .. } => "if",
            OpKind::AllReduce { .. } => "all_reduce",
            OpKind::AllGather { .. } => "all_gather",
            OpKind::CollectivePermute { .. } => "collective_permute",
            OpKind::ReplicaId => "replica_id",
            OpKind::AfterAll => "after_all",
            OpKind::CustomCall(_) => "custom_call",
            OpKind::Call { .. } => "call",
        }
    }

    /// Nested regions owned by this op, in declaration order.
    pub fn regions(&self) -> Vec<&Block> {
        match self {
            OpKind::Reduce { body, .. } => vec![body],
            OpKind::Sort { comparator, .. } => vec![comparator],
            OpKind::While { cond, body } => vec![cond, body],
            OpKind::If {
                true_branch,
                false_branch,
            } => vec![true_branch, false_branch],
            OpKind::AllReduce { reducer, .. } => vec![reducer],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One operation in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub result_types: Vec<Type>,
    /// Discardable metadata (`sharding`, `frontend_attributes`, layout hints).
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Operation {
    pub fn new(
        kind: OpKind,
        operands: Vec<ValueId>,
        results: Vec<ValueId>,
        result_types: Vec<Type>,
    ) -> Self {
        Self {
            kind,
            operands,
            results,
            result_types,
            attributes: BTreeMap::new(),
            location: None,
        }
    }

    /// Attach a discardable attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Attribute) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Attach a source location.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}
