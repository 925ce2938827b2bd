//! Computations and the program container.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::instruction::{InstrId, Instruction, Opcode};
use crate::shape::ProgramShape;

/// Computation identifier, unique within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputationId(pub i64);

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A flat list of instructions with a designated root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computation {
    pub id: ComputationId,
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub root_id: InstrId,
    pub program_shape: ProgramShape,
}

impl Computation {
    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.id == id)
    }

    pub fn root(&self) -> Option<&Instruction> {
        self.instruction(self.root_id)
    }

    /// Parameter instructions ordered by parameter number.
    pub fn parameters(&self) -> Vec<&Instruction> {
        let mut params: Vec<&Instruction> = self
            .instructions
            .iter()
            .filter(|i| i.opcode == Opcode::Parameter)
            .collect();
        params.sort_by_key(|i| i.attrs.parameter_number);
        params
    }

    pub fn count(&self, opcode: Opcode) -> usize {
        self.instructions.iter().filter(|i| i.opcode == opcode).count()
    }
}

/// A complete target program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub entry_computation_id: ComputationId,
    /// Callees precede their callers; the entry computation is last.
    pub computations: Vec<Computation>,
}

impl Program {
    pub fn entry(&self) -> Option<&Computation> {
        self.computation(self.entry_computation_id)
    }

    pub fn computation(&self, id: ComputationId) -> Option<&Computation> {
        self.computations.iter().find(|c| c.id == id)
    }

    pub fn computation_by_name(&self, name: &str) -> Option<&Computation> {
        self.computations.iter().find(|c| c.name == name)
    }

    pub fn instruction_count(&self) -> usize {
        self.computations.iter().map(|c| c.instructions.len()).sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
