//! Construction API for building source modules programmatically.
//!
//! `FunctionBuilder` allocates value ids and records value types so that
//! convenience constructors can derive result types. Nested regions are
//! built with [`BlockBuilder::region`], sharing the function's id space.
//!
//! # Example
//!
//! ```rust
//! use hlx_ir::builder::FunctionBuilder;
//! use hlx_ir::op::BinaryOp;
//! use hlx_ir::types::Type;
//!
//! let main = FunctionBuilder::new("main").build(|b| {
//!     let x = b.argument(Type::f32(&[2, 2]));
//!     let y = b.argument(Type::f32(&[2, 2]));
//!     let sum = b.binary(BinaryOp::Add, x, y);
//!     vec![sum]
//! });
//! assert_eq!(main.body.operations.len(), 1);
//! assert_eq!(main.result_types, vec![Type::f32(&[2, 2])]);
//! ```

use std::collections::HashMap;

use crate::attr::{Attribute, ComparisonDirection, ElementsData, Location};
use crate::block::{Block, BlockArgument, Terminator};
use crate::module::Function;
use crate::op::{BinaryOp, OpKind, Operation, UnaryOp, ValueId};
use crate::types::Type;

/// Id allocator and type table shared by all blocks of one function.
#[derive(Debug, Default)]
struct ValueTable {
    next: u32,
    types: HashMap<ValueId, Type>,
}

impl ValueTable {
    fn fresh(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.next);
        self.next += 1;
        self.types.insert(id, ty);
        id
    }
}

/// Builds one function.
pub struct FunctionBuilder {
    name: String,
    table: ValueTable,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: ValueTable::default(),
        }
    }

    /// Build the function body. The closure returns the values to return;
    /// the function's result types are taken from them.
    pub fn build(mut self, f: impl FnOnce(&mut BlockBuilder<'_>) -> Vec<ValueId>) -> Function {
        let mut block = BlockBuilder::new(&mut self.table);
        let returns = f(&mut block);
        let body = block.finish(returns);
        let result_types = body
            .returns()
            .iter()
            .map(|v| self.table.types[v].clone())
            .collect();
        Function::new(self.name, body, result_types)
    }
}

/// Builds one block. Obtained from [`FunctionBuilder::build`] or
/// [`BlockBuilder::region`].
pub struct BlockBuilder<'a> {
    table: &'a mut ValueTable,
    arguments: Vec<BlockArgument>,
    operations: Vec<Operation>,
}

impl<'a> BlockBuilder<'a> {
    fn new(table: &'a mut ValueTable) -> Self {
        Self {
            table,
            arguments: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Append a block argument.
    pub fn argument(&mut self, ty: Type) -> ValueId {
        let value = self.table.fresh(ty.clone());
        self.arguments.push(BlockArgument { value, ty });
        value
    }

    /// Append an operation and return its result values.
    pub fn op(&mut self, kind: OpKind, operands: &[ValueId], result_types: Vec<Type>) -> Vec<ValueId> {
        let results: Vec<ValueId> = result_types
            .iter()
            .map(|ty| self.table.fresh(ty.clone()))
            .collect();
        self.operations.push(Operation::new(
            kind,
            operands.to_vec(),
            results.clone(),
            result_types,
        ));
        results
    }

    /// Append a single-result operation.
    pub fn op1(&mut self, kind: OpKind, operands: &[ValueId], ty: Type) -> ValueId {
        self.op(kind, operands, vec![ty])[0]
    }

    /// Set a discardable attribute on the most recently added operation.
    pub fn annotate(&mut self, name: impl Into<String>, value: Attribute) {
        if let Some(op) = self.operations.last_mut() {
            op.attributes.insert(name.into(), value);
        }
    }

    /// Set the location of the most recently added operation.
    pub fn locate(&mut self, location: Location) {
        if let Some(op) = self.operations.last_mut() {
            op.location = Some(location);
        }
    }

    /// Build a nested region sharing this function's value ids.
    pub fn region(&mut self, f: impl FnOnce(&mut BlockBuilder<'_>) -> Vec<ValueId>) -> Block {
        let mut child = BlockBuilder::new(&mut *self.table);
        let returns = f(&mut child);
        child.finish(returns)
    }

    pub fn type_of(&self, value: ValueId) -> Option<&Type> {
        self.table.types.get(&value)
    }

    /// Finish the block with a return of `returns`.
    pub fn finish(self, returns: Vec<ValueId>) -> Block {
        Block::new(self.arguments, self.operations, Terminator::new(returns))
    }

    // === Convenience constructors ===
    //
    // These derive result types from operand types and panic if an operand
    // was not produced by this function's builder.

    pub fn constant(&mut self, ty: Type, value: ElementsData) -> ValueId {
        self.op1(OpKind::Constant { value }, &[], ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ValueId) -> ValueId {
        let ty = self.table.types[&operand].clone();
        self.op1(OpKind::Unary(op), &[operand], ty)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.table.types[&lhs].clone();
        self.op1(OpKind::Binary(op), &[lhs, rhs], ty)
    }

    pub fn compare(&mut self, direction: ComparisonDirection, lhs: ValueId, rhs: ValueId) -> ValueId {
        let shape = self.table.types[&lhs]
            .as_tensor()
            .map(|t| t.shape.clone())
            .unwrap_or_default();
        self.op1(OpKind::Compare { direction }, &[lhs, rhs], Type::pred(&shape))
    }

    pub fn tuple(&mut self, elements: &[ValueId]) -> ValueId {
        let ty = Type::tuple(
            elements
                .iter()
                .map(|v| self.table.types[v].clone())
                .collect(),
        );
        self.op1(OpKind::Tuple, elements, ty)
    }

    /// Panics if `tuple` is not tuple-typed or `index` is out of range.
    pub fn get_tuple_element(&mut self, tuple: ValueId, index: u32) -> ValueId {
        let ty = match &self.table.types[&tuple] {
            Type::Tuple(elements) => elements[index as usize].clone(),
            other => panic!("get_tuple_element on non-tuple type {other}"),
        };
        self.op1(OpKind::GetTupleElement { index }, &[tuple], ty)
    }

    pub fn call(&mut self, callee: &str, operands: &[ValueId], result_types: Vec<Type>) -> Vec<ValueId> {
        self.op(
            OpKind::Call {
                callee: callee.into(),
            },
            operands,
            result_types,
        )
    }
}
