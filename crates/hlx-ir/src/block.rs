//! Blocks: an ordered list of operations with typed arguments and a terminator.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::attr::Location;
use crate::op::{OpKind, Operation, ValueId};
use crate::types::Type;

/// A typed block argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockArgument {
    pub value: ValueId,
    pub ty: Type,
}

/// The `return` terminating a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terminator {
    pub operands: Vec<ValueId>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Terminator {
    pub fn new(operands: Vec<ValueId>) -> Self {
        Self {
            operands,
            location: None,
        }
    }
}

/// A single-block region body.
///
/// Operations are stored in execution order; an operand may only refer to a
/// block argument or to a result of an earlier operation of the same block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub arguments: Vec<BlockArgument>,
    pub operations: Vec<Operation>,
    pub terminator: Terminator,
}

impl Block {
    pub fn new(
        arguments: Vec<BlockArgument>,
        operations: Vec<Operation>,
        terminator: Terminator,
    ) -> Self {
        Self {
            arguments,
            operations,
            terminator,
        }
    }

    pub fn argument_types(&self) -> Vec<&Type> {
        self.arguments.iter().map(|a| &a.ty).collect()
    }

    pub fn returns(&self) -> &[ValueId] {
        &self.terminator.operands
    }

    /// Names of all functions called from this block, nested regions included.
    pub fn callees(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_callees(&mut out);
        out
    }

    fn collect_callees<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        for op in &self.operations {
            if let OpKind::Call { callee } = &op.kind {
                out.insert(callee.as_str());
            }
            for region in op.kind.regions() {
                region.collect_callees(out);
            }
        }
    }
}
