//! Target program model for the hlx lowering pipeline.
//!
//! A [`Program`] is a flat, protocol-encoded container: a list of named
//! computations, each a flat list of instructions with shapes, layouts and
//! opcode-specific attributes. Programs are assembled through the
//! append-only [`builder`] API and can be written as JSON, as the binary
//! `.hlxp` container ([`wire`]) or as text (`Display`).

pub mod attrs;
pub mod builder;
pub mod instruction;
mod printer;
pub mod program;
pub mod shape;
pub mod sharding;
pub mod wire;

pub use builder::{BuildError, ComputationBuilder, ProgramBuilder, ProgramValue};
pub use instruction::{InstrId, Instruction, InstructionAttrs, Literal, OpMetadata, Opcode};
pub use program::{Computation, ComputationId, Program};
pub use shape::{Layout, PrimitiveType, ProgramShape, Shape};
pub use sharding::{OpSharding, ShardingError, ShardingType};
pub use wire::{Features, ProgramFile, Section, WireError};
