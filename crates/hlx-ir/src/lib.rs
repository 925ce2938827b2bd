//! Source op module model for the hlx lowering pipeline.
//!
//! A module is a set of functions; each function body is a single block of
//! typed operations. Operations are a closed enum ([`op::OpKind`]) whose
//! variants carry strongly typed attribute records and nested regions.

pub mod attr;
pub mod block;
pub mod builder;
pub mod module;
pub mod op;
pub mod types;

pub use attr::{
    Attribute, ComparisonDirection, ConvDimensionNumbers, DenseIntElements, DotDimensionNumbers,
    ElementsData, Location, OutputOperandAlias, PADDING_SENTINEL,
};
pub use block::{Block, BlockArgument, Terminator};
pub use builder::{BlockBuilder, FunctionBuilder};
pub use module::{Function, Module, ModuleError, ENTRY_FUNCTION};
pub use op::{BinaryOp, ConvolutionAttrs, CustomCallAttrs, OpKind, Operation, UnaryOp, ValueId};
pub use types::{ElementType, TensorType, Type};
