//! Append-only construction of computations and programs.
//!
//! A [`ComputationBuilder`] hands out [`ProgramValue`] handles for the
//! instructions it holds. Handles are tied to the builder that created them;
//! passing one to another builder is an error rather than a silent
//! reference into the wrong computation.
//!
//! # Example
//!
//! ```rust
//! use hlx_program::builder::{ComputationBuilder, ProgramBuilder};
//! use hlx_program::instruction::{Instruction, Opcode};
//! use hlx_program::shape::{PrimitiveType, Shape};
//!
//! let f32 = Shape::array(PrimitiveType::F32, &[4]);
//! let mut comp = ComputationBuilder::new("main");
//! let x = comp.parameter(0, f32.clone(), "x").unwrap();
//! let y = comp.parameter(1, f32.clone(), "y").unwrap();
//! let sum = comp.add(Instruction::new(Opcode::Add, f32), &[x, y]).unwrap();
//!
//! let mut program = ProgramBuilder::new("demo");
//! let entry = program.add_computation(comp.build(sum).unwrap()).unwrap();
//! let program = program.finish(entry).unwrap();
//! assert_eq!(program.entry().unwrap().instructions.len(), 3);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

use crate::instruction::{InstrId, Instruction, InstructionAttrs, Opcode};
use crate::program::{Computation, ComputationId, Program};
use crate::shape::{ProgramShape, Shape};

static NEXT_BUILDER: AtomicU32 = AtomicU32::new(0);

/// Errors raised by the program builders.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("value {0} belongs to a different computation builder")]
    ForeignValue(InstrId),

    #[error("unknown instruction {0}")]
    UnknownValue(InstrId),

    #[error("duplicate parameter number {0}")]
    DuplicateParameter(i64),

    #[error("parameter numbers are not contiguous: {0} is missing")]
    MissingParameter(i64),

    #[error("instruction {0} does not have a tuple shape")]
    NotATuple(InstrId),

    #[error("tuple index {index} out of range for a tuple of {len} elements")]
    TupleIndexOutOfRange { index: usize, len: usize },

    #[error("duplicate computation name: {0}")]
    DuplicateComputation(String),

    #[error("unknown computation {0}")]
    UnknownComputation(ComputationId),
}

/// Handle to an instruction inside one [`ComputationBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramValue {
    builder: u32,
    id: InstrId,
}

impl ProgramValue {
    pub fn id(&self) -> InstrId {
        self.id
    }
}

/// Builds one computation.
#[derive(Debug)]
pub struct ComputationBuilder {
    token: u32,
    name: String,
    instructions: Vec<Instruction>,
    /// Parameter number -> instruction.
    parameters: BTreeMap<i64, InstrId>,
}

impl ComputationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            token: NEXT_BUILDER.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            instructions: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Declare parameter `number`.
    pub fn parameter(
        &mut self,
        number: i64,
        shape: Shape,
        name: &str,
    ) -> Result<ProgramValue, BuildError> {
        if self.parameters.contains_key(&number) {
            return Err(BuildError::DuplicateParameter(number));
        }
        let mut instr = Instruction::new(Opcode::Parameter, shape).with_attrs(InstructionAttrs {
            parameter_number: Some(number),
            ..Default::default()
        });
        instr.name = name.to_string();
        let value = self.push(instr, Vec::new());
        self.parameters.insert(number, value.id);
        Ok(value)
    }

    /// Append an instruction with the given operands. Array shapes without a
    /// layout get the default descending layout; unnamed instructions are
    /// named `<opcode>.<id>`.
    pub fn add(
        &mut self,
        instr: Instruction,
        operands: &[ProgramValue],
    ) -> Result<ProgramValue, BuildError> {
        let operand_ids = operands
            .iter()
            .map(|v| self.check(*v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.push(instr, operand_ids))
    }

    /// Append a tuple of `elements`.
    pub fn tuple(&mut self, elements: &[ProgramValue]) -> Result<ProgramValue, BuildError> {
        let shapes = elements
            .iter()
            .map(|v| self.shape_of(*v).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        self.add(Instruction::new(Opcode::Tuple, Shape::tuple(shapes)), elements)
    }

    /// Append a `get-tuple-element` extracting element `index` of `tuple`.
    pub fn get_tuple_element(
        &mut self,
        tuple: ProgramValue,
        index: usize,
    ) -> Result<ProgramValue, BuildError> {
        let shape = self.shape_of(tuple)?;
        if !shape.is_tuple() {
            return Err(BuildError::NotATuple(tuple.id));
        }
        let element = shape
            .tuple_shapes
            .get(index)
            .cloned()
            .ok_or(BuildError::TupleIndexOutOfRange {
                index,
                len: shape.tuple_shapes.len(),
            })?;
        let instr = Instruction::new(Opcode::GetTupleElement, element).with_attrs(
            InstructionAttrs {
                tuple_index: Some(index as i64),
                ..Default::default()
            },
        );
        self.add(instr, &[tuple])
    }

    pub fn shape_of(&self, value: ProgramValue) -> Result<&Shape, BuildError> {
        Ok(&self.instruction(value)?.shape)
    }

    pub fn instruction(&self, value: ProgramValue) -> Result<&Instruction, BuildError> {
        let id = self.check(value)?;
        Ok(&self.instructions[id.0 as usize])
    }

    /// Mutable access for attaching attributes after emission.
    pub fn instruction_mut(&mut self, value: ProgramValue) -> Result<&mut Instruction, BuildError> {
        let id = self.check(value)?;
        Ok(&mut self.instructions[id.0 as usize])
    }

    /// Finish the computation with `root` as its result. Parameter numbers
    /// must be contiguous from zero. The id is assigned when the computation
    /// is added to a [`ProgramBuilder`].
    pub fn build(self, root: ProgramValue) -> Result<Computation, BuildError> {
        let root_id = self.check(root)?;
        let mut parameters = Vec::with_capacity(self.parameters.len());
        let mut parameter_names = Vec::with_capacity(self.parameters.len());
        for (expected, (&number, id)) in self.parameters.iter().enumerate() {
            if number != expected as i64 {
                return Err(BuildError::MissingParameter(expected as i64));
            }
            let instr = &self.instructions[id.0 as usize];
            parameters.push(instr.shape.clone());
            parameter_names.push(instr.name.clone());
        }
        let result = self.instructions[root_id.0 as usize].shape.clone();
        Ok(Computation {
            id: ComputationId(0),
            name: self.name,
            instructions: self.instructions,
            root_id,
            program_shape: ProgramShape {
                parameters,
                parameter_names,
                result,
            },
        })
    }

    fn check(&self, value: ProgramValue) -> Result<InstrId, BuildError> {
        if value.builder != self.token {
            return Err(BuildError::ForeignValue(value.id));
        }
        if value.id.0 < 0 || value.id.0 as usize >= self.instructions.len() {
            return Err(BuildError::UnknownValue(value.id));
        }
        Ok(value.id)
    }

    fn push(&mut self, mut instr: Instruction, operand_ids: Vec<InstrId>) -> ProgramValue {
        let id = InstrId(self.instructions.len() as i64);
        instr.id = id;
        instr.operand_ids = operand_ids;
        instr.shape = instr.shape.with_default_layout();
        if instr.name.is_empty() {
            instr.name = format!("{}.{}", instr.opcode, id);
        }
        self.instructions.push(instr);
        ProgramValue {
            builder: self.token,
            id,
        }
    }
}

/// Collects finished computations into a [`Program`].
#[derive(Debug)]
pub struct ProgramBuilder {
    name: String,
    computations: Vec<Computation>,
    names: HashSet<String>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            computations: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// `base` if no computation uses it yet, otherwise `base.1`, `base.2`, ...
    pub fn unique_name(&self, base: &str) -> String {
        if !self.names.contains(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}.{n}"))
            .find(|candidate| !self.names.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Add a finished computation and assign its id.
    pub fn add_computation(
        &mut self,
        mut computation: Computation,
    ) -> Result<ComputationId, BuildError> {
        if !self.names.insert(computation.name.clone()) {
            return Err(BuildError::DuplicateComputation(computation.name));
        }
        let id = ComputationId(self.computations.len() as i64);
        computation.id = id;
        self.computations.push(computation);
        Ok(id)
    }

    pub fn computation(&self, id: ComputationId) -> Option<&Computation> {
        self.computations.iter().find(|c| c.id == id)
    }

    /// Id of the computation called `name`, if one was added.
    pub fn computation_id(&self, name: &str) -> Option<ComputationId> {
        self.computations
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    pub fn len(&self) -> usize {
        self.computations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.computations.is_empty()
    }

    /// Finish the program. Every called computation, and the entry, must
    /// have been added.
    pub fn finish(self, entry: ComputationId) -> Result<Program, BuildError> {
        let known = |id: &ComputationId| self.computations.iter().any(|c| c.id == *id);
        if !known(&entry) {
            return Err(BuildError::UnknownComputation(entry));
        }
        for computation in &self.computations {
            for instr in &computation.instructions {
                if let Some(missing) = instr.called_computation_ids.iter().find(|id| !known(id)) {
                    return Err(BuildError::UnknownComputation(*missing));
                }
            }
        }
        Ok(Program {
            name: self.name,
            entry_computation_id: entry,
            computations: self.computations,
        })
    }
}
