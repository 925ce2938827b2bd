//! Builder adapter: the sequencing layer between the block converter and
//! the append-only [`ComputationBuilder`].
//!
//! A [`BlockContext`] owns the value scope of one block and turns each
//! source operation into exactly one primary instruction. On the way it
//! assigns result layouts, fills the bitcast backend config, attaches op
//! metadata, sharding and frontend attributes, and expands multi-result
//! instructions into `get-tuple-element`s so every source result maps to one
//! [`ProgramValue`].

use std::collections::HashMap;

use hlx_ir::{OpKind, Operation, ValueId};
use hlx_program::attrs::BitcastBackendConfig;
use hlx_program::{
    ComputationBuilder, Instruction, InstructionAttrs, Layout, OpMetadata, OpSharding, Opcode,
    ProgramValue, Shape,
};
use log::warn;

use crate::attrs::{
    convert_frontend_attributes, convert_layout, convert_sharding,
    convert_sharding_strict,
};
use crate::error::LowerError;
use crate::options::ConversionOptions;
use crate::types::convert_type;

/// Lowering state for one block.
pub struct BlockContext<'a> {
    builder: &'a mut ComputationBuilder,
    options: &'a ConversionOptions,
    /// Source function the block belongs to, for op metadata.
    function: &'a str,
    scope: HashMap<ValueId, ProgramValue>,
    ops_emitted: usize,
}

impl<'a> BlockContext<'a> {
    pub fn new(
        builder: &'a mut ComputationBuilder,
        options: &'a ConversionOptions,
        function: &'a str,
    ) -> Self {
        Self {
            builder,
            options,
            function,
            scope: HashMap::new(),
            ops_emitted: 0,
        }
    }

    pub fn function(&self) -> &'a str {
        self.function
    }

    pub fn options(&self) -> &'a ConversionOptions {
        self.options
    }

    pub fn builder(&mut self) -> &mut ComputationBuilder {
        &mut *self.builder
    }

    pub fn bind(&mut self, value: ValueId, program_value: ProgramValue) {
        self.scope.insert(value, program_value);
    }

    /// Look up a value defined earlier in this block.
    pub fn lookup(&self, value: ValueId) -> Result<ProgramValue, LowerError> {
        self.scope
            .get(&value)
            .copied()
            .ok_or(LowerError::UndefinedValue(value))
    }

    pub fn operands(&self, op: &Operation) -> Result<Vec<ProgramValue>, LowerError> {
        op.operands.iter().map(|v| self.lookup(*v)).collect()
    }

    pub fn shape_of(&self, value: ProgramValue) -> Result<&Shape, LowerError> {
        Ok(self.builder.shape_of(value)?)
    }

    /// Target shape of result `index`, with its layout assigned.
    pub fn result_shape(&self, op: &Operation, index: usize) -> Result<Shape, LowerError> {
        let ty = op
            .result_types
            .get(index)
            .ok_or_else(|| LowerError::arity("result types", index + 1, op.result_types.len()))?;
        let shape = convert_type(ty);
        if !self.options.propagate_layouts {
            return Ok(shape.with_default_layout());
        }
        if let (Some(attr), true) = (op.attribute("minor_to_major"), shape.is_array()) {
            let layout = convert_layout("minor_to_major", attr, shape.rank())?;
            return Ok(shape.with_layout(layout));
        }
        self.options.represent(shape)
    }

    /// Shape of the primary instruction for `op`: the single result's shape,
    /// or a tuple of all result shapes when there are zero or several.
    pub fn op_shape(&self, op: &Operation) -> Result<Shape, LowerError> {
        if op.result_types.len() == 1 {
            return self.result_shape(op, 0);
        }
        let shapes = (0..op.result_types.len())
            .map(|i| self.result_shape(op, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Shape::tuple(shapes))
    }

    /// Emit `opcode` for `op` with the shape from [`Self::op_shape`].
    pub fn emit(
        &mut self,
        op: &Operation,
        opcode: Opcode,
        attrs: InstructionAttrs,
        operands: &[ProgramValue],
    ) -> Result<Vec<ProgramValue>, LowerError> {
        let shape = self.op_shape(op)?;
        self.emit_instruction(op, Instruction::new(opcode, shape).with_attrs(attrs), operands)
    }

    /// Append the primary instruction for `op`, then bind and return one
    /// value per source result.
    pub fn emit_instruction(
        &mut self,
        op: &Operation,
        mut instr: Instruction,
        operands: &[ProgramValue],
    ) -> Result<Vec<ProgramValue>, LowerError> {
        if op.results.len() != op.result_types.len() {
            return Err(LowerError::arity(
                "result types",
                op.results.len(),
                op.result_types.len(),
            ));
        }
        let index = self.ops_emitted;
        self.ops_emitted += 1;

        self.attach_metadata(op, index, &mut instr);
        self.attach_sharding(op, &mut instr)?;
        if let Some(attr) = op.attribute("frontend_attributes") {
            instr.attrs.frontend_attributes = convert_frontend_attributes(attr)?;
        }
        if matches!(op.kind, OpKind::Bitcast) && self.options.bitcast_backend_config() {
            let operand = operands
                .first()
                .ok_or_else(|| LowerError::arity("bitcast operands", 1, 0))?;
            let source_rank = self.shape_of(*operand)?.rank();
            instr.attrs.backend_config = bitcast_config(op, source_rank, &instr.shape)?;
        }

        let value = self.builder.add(instr, operands)?;
        let values = match op.results.len() {
            0 => Vec::new(),
            1 => vec![value],
            n => (0..n)
                .map(|i| self.builder.get_tuple_element(value, i))
                .collect::<Result<Vec<_>, _>>()?,
        };
        for (result, program_value) in op.results.iter().zip(&values) {
            self.bind(*result, *program_value);
        }
        Ok(values)
    }

    fn attach_metadata(&self, op: &Operation, index: usize, instr: &mut Instruction) {
        let kind = op.kind.name();
        let (source_file, source_line) = match &op.location {
            Some(location) => (location.file.clone(), Some(location.line)),
            None => (String::new(), None),
        };
        instr.attrs.metadata = Some(OpMetadata {
            op_type: kind.to_string(),
            op_name: format!("{}/{kind}.{index}", self.function),
            source_file,
            source_line,
        });
    }

    fn attach_sharding(&self, op: &Operation, instr: &mut Instruction) -> Result<(), LowerError> {
        let Some(attr) = op.attribute("sharding") else {
            return Ok(());
        };
        let text = attr.as_str().ok_or_else(|| {
            LowerError::malformed(
                "sharding",
                format!("expected a string, found {}", attr.kind_name()),
            )
        })?;
        instr.attrs.sharding = resolve_sharding(self.options, "sharding", text)?;
        Ok(())
    }
}

/// Decode a sharding string under the configured strictness; a lenient
/// failure drops the sharding.
pub(crate) fn resolve_sharding(
    options: &ConversionOptions,
    name: &str,
    text: &str,
) -> Result<Option<OpSharding>, LowerError> {
    if options.strict_sharding {
        return convert_sharding_strict(name, text).map(Some);
    }
    let sharding = convert_sharding(text);
    if sharding.is_none() {
        warn!("dropping unparseable {name} `{text}`");
    }
    Ok(sharding)
}

fn bitcast_config(op: &Operation, source_rank: usize, result: &Shape) -> Result<String, LowerError> {
    let layout = |name: &str, rank: usize| -> Result<Vec<i64>, LowerError> {
        match op.attribute(name) {
            Some(attr) => Ok(convert_layout(name, attr, rank)?.minor_to_major),
            None => Ok(Layout::descending(rank).minor_to_major),
        }
    };
    let config = BitcastBackendConfig {
        source_layout: layout("source_layout", source_rank)?,
        result_layout: layout("result_layout", result.rank())?,
    };
    serde_json::to_string(&config)
        .map_err(|e| LowerError::malformed("backend_config", e.to_string()))
}
