//! Target instructions: opcode, shape, operand references and the flat
//! attribute record of the program encoding.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attrs::{
    ComparisonDirection, ConvolutionDimensionNumbers, CustomCallApiVersion, CustomCallSchedule,
    DotDimensionNumbers, FftType, OutputOperandAliasing, PaddingDimension, ReplicaGroup,
    SliceDimension, TriangularSolveOptions, Window,
};
use crate::program::ComputationId;
use crate::shape::Shape;
use crate::sharding::OpSharding;

/// Instruction identifier, unique within its computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrId(pub i64);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Parameter,
    Constant,
    Iota,
    Abs,
    Negate,
    Exponential,
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
    Compare,
    Select,
    Clamp,
    Convert,
    BitcastConvert,
    Bitcast,
    Reshape,
    Broadcast,
    Transpose,
    Reverse,
    Slice,
    DynamicSlice,
    DynamicUpdateSlice,
    Concatenate,
    Pad,
    Tuple,
    GetTupleElement,
    Dot,
    Convolution,
    Fft,
    TriangularSolve,
    Reduce,
    Sort,
    While,
    Conditional,
    AllReduce,
    AllGather,
    CollectivePermute,
    ReplicaId,
    AfterAll,
    CustomCall,
    Call,
}

impl Opcode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::Parameter => "parameter",
            Opcode::Constant => "constant",
            Opcode::Iota => "iota",
            Opcode::Abs => "abs",
            Opcode::Negate => "negate",
            Opcode::Exponential => "exponential",
            Opcode::Log => "log",
            Opcode::Sqrt => "sqrt",
            Opcode::Rsqrt => "rsqrt",
            Opcode::Tanh => "tanh",
            Opcode::Logistic => "logistic",
            Opcode::Floor => "floor",
            Opcode::Ceil => "ceil",
            Opcode::Sign => "sign",
            Opcode::Cosine => "cosine",
            Opcode::Sine => "sine",
            Opcode::Not => "not",
            Opcode::Copy => "copy",
            Opcode::Add => "add",
            Opcode::Subtract => "subtract",
            Opcode::Multiply => "multiply",
            Opcode::Divide => "divide",
            Opcode::Remainder => "remainder",
            Opcode::Maximum => "maximum",
            Opcode::Minimum => "minimum",
            Opcode::Power => "power",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Atan2 => "atan2",
            Opcode::ShiftLeft => "shift-left",
            Opcode::ShiftRightArithmetic => "shift-right-arithmetic",
            Opcode::ShiftRightLogical => "shift-right-logical",
            Opcode::Compare => "compare",
            Opcode::Select => "select",
            Opcode::Clamp => "clamp",
            Opcode::Convert => "convert",
            Opcode::BitcastConvert => "bitcast-convert",
            Opcode::Bitcast => "bitcast",
            Opcode::Reshape => "reshape",
            Opcode::Broadcast => "broadcast",
            Opcode::Transpose => "transpose",
            Opcode::Reverse => "reverse",
            Opcode::Slice => "slice",
            Opcode::DynamicSlice => "dynamic-slice",
            Opcode::DynamicUpdateSlice => "dynamic-update-slice",
            Opcode::Concatenate => "concatenate",
            Opcode::Pad => "pad",
            Opcode::Tuple => "tuple",
            Opcode::GetTupleElement => "get-tuple-element",
            Opcode::Dot => "dot",
            Opcode::Convolution => "convolution",
            Opcode::Fft => "fft",
            Opcode::TriangularSolve => "triangular-solve",
            Opcode::Reduce => "reduce",
            Opcode::Sort => "sort",
            Opcode::While => "while",
            Opcode::Conditional => "conditional",
            Opcode::AllReduce => "all-reduce",
            Opcode::AllGather => "all-gather",
            Opcode::CollectivePermute => "collective-permute",
            Opcode::ReplicaId => "replica-id",
            Opcode::AfterAll => "after-all",
            Opcode::CustomCall => "custom-call",
            Opcode::Call => "call",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Literal payload of a constant, in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Pred(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Literal {
    pub fn len(&self) -> usize {
        match self {
            Literal::Pred(v) => v.len(),
            Literal::Int(v) => v.len(),
            Literal::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Provenance of an instruction in the source module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpMetadata {
    pub op_type: String,
    pub op_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line: Option<u32>,
}

/// Opcode-specific fields of an instruction. Unused fields stay at their
/// defaults and are omitted from the encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal: Option<Literal>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuple_index: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slice_dimensions: Vec<SliceDimension>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dynamic_slice_sizes: Vec<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub padding_config: Vec<PaddingDimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<Window>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convolution_dimension_numbers: Option<ConvolutionDimensionNumbers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dot_dimension_numbers: Option<DotDimensionNumbers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_group_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_group_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_direction: Option<ComparisonDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fft_type: Option<FftType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fft_length: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triangular_solve_options: Option<TriangularSolveOptions>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_stable: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub custom_call_target: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub custom_call_has_side_effect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_call_schedule: Option<CustomCallSchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_call_api_version: Option<CustomCallApiVersion>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operand_shapes_with_layout: Vec<Shape>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_operand_aliasing: Vec<OutputOperandAliasing>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub backend_config: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replica_groups: Vec<ReplicaGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_target_pairs: Vec<(i64, i64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharding: Option<OpSharding>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub frontend_attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OpMetadata>,
}

/// One instruction of a computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: InstrId,
    pub name: String,
    pub opcode: Opcode,
    pub shape: Shape,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operand_ids: Vec<InstrId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub called_computation_ids: Vec<ComputationId>,
    #[serde(flatten)]
    pub attrs: InstructionAttrs,
}

impl Instruction {
    /// A fresh instruction. Id, name and operands are assigned when it is
    /// appended to a builder.
    pub fn new(opcode: Opcode, shape: Shape) -> Self {
        Self {
            id: InstrId(0),
            name: String::new(),
            opcode,
            shape,
            operand_ids: Vec::new(),
            called_computation_ids: Vec::new(),
            attrs: InstructionAttrs::default(),
        }
    }

    pub fn with_attrs(mut self, attrs: InstructionAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_called(mut self, computations: Vec<ComputationId>) -> Self {
        self.called_computation_ids = computations;
        self
    }
}
