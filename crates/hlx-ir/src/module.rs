//! Functions and the module container.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::Block;
use crate::types::Type;

/// Name of the function treated as the module's entry computation.
pub const ENTRY_FUNCTION: &str = "main";

/// Errors raised while assembling or loading a module.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("duplicate function: {0}")]
    DuplicateFunction(String),

    #[error("function {function} declares {declared} result(s) but returns {returned}")]
    ResultCountMismatch {
        function: String,
        declared: usize,
        returned: usize,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A function: a named computation with a single-block body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub body: Block,
    pub result_types: Vec<Type>,
    /// Per-argument sharding strings (shorter than the argument list is fine).
    #[serde(default)]
    pub arg_shardings: Vec<Option<String>>,
    /// Per-result sharding strings.
    #[serde(default)]
    pub result_shardings: Vec<Option<String>>,
}

impl Function {
    pub fn new(name: impl Into<String>, body: Block, result_types: Vec<Type>) -> Self {
        Self {
            name: name.into(),
            body,
            result_types,
            arg_shardings: Vec::new(),
            result_shardings: Vec::new(),
        }
    }

    /// Set the sharding string of argument `index`.
    pub fn with_arg_sharding(mut self, index: usize, sharding: impl Into<String>) -> Self {
        set_slot(&mut self.arg_shardings, index, sharding.into());
        self
    }

    /// Set the sharding string of result `index`.
    pub fn with_result_sharding(mut self, index: usize, sharding: impl Into<String>) -> Self {
        set_slot(&mut self.result_shardings, index, sharding.into());
        self
    }

    pub fn arg_sharding(&self, index: usize) -> Option<&str> {
        self.arg_shardings.get(index).and_then(|s| s.as_deref())
    }

    pub fn result_sharding(&self, index: usize) -> Option<&str> {
        self.result_shardings.get(index).and_then(|s| s.as_deref())
    }

    pub fn argument_types(&self) -> Vec<&Type> {
        self.body.argument_types()
    }
}

fn set_slot(slots: &mut Vec<Option<String>>, index: usize, value: String) {
    if slots.len() <= index {
        slots.resize(index + 1, None);
    }
    slots[index] = Some(value);
}

/// A source module: a set of uniquely named functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    /// Add a function. Fails if the name is taken or the body returns a
    /// different number of values than the function declares.
    pub fn add_function(&mut self, function: Function) -> Result<(), ModuleError> {
        if self.function(&function.name).is_some() {
            return Err(ModuleError::DuplicateFunction(function.name));
        }
        let returned = function.body.returns().len();
        if returned != function.result_types.len() {
            return Err(ModuleError::ResultCountMismatch {
                function: function.name,
                declared: function.result_types.len(),
                returned,
            });
        }
        self.functions.push(function);
        Ok(())
    }

    /// Builder-style [`Module::add_function`].
    pub fn with_function(mut self, function: Function) -> Result<Self, ModuleError> {
        self.add_function(function)?;
        Ok(self)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// The entry computation, the function named [`ENTRY_FUNCTION`].
    pub fn entry(&self) -> Option<&Function> {
        self.function(ENTRY_FUNCTION)
    }

    pub fn from_json(json: &str) -> Result<Self, ModuleError> {
        let module: Module = serde_json::from_str(json)?;
        Ok(module)
    }

    pub fn to_json(&self) -> Result<String, ModuleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
