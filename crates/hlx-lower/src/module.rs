//! Whole-module conversion.
//!
//! The entry function `main` becomes the entry computation. Functions it
//! reaches through `call` are converted on demand, depth first, into their
//! own computations, each exactly once. Callees are added to the program
//! before their callers, so the entry computation always comes last.

use std::collections::HashMap;

use hlx_ir::{Function, Module, Type};
use hlx_program::{
    ComputationBuilder, ComputationId, OpSharding, Program, ProgramBuilder, ProgramValue, Shape,
};
use log::debug;

use crate::block::lower_block;
use crate::context::resolve_sharding;
use crate::error::LowerError;
use crate::options::ConversionOptions;
use crate::types::convert_type;

/// Convert `module` into a new program.
///
/// With `use_tuple_args` the entry computation takes one tuple parameter
/// holding all arguments. With `return_tuple` its root is always a tuple,
/// even for a single result.
pub fn convert_module(
    module: &Module,
    use_tuple_args: bool,
    return_tuple: bool,
    options: &ConversionOptions,
) -> Result<Program, LowerError> {
    let mut program = ProgramBuilder::new(module.name.clone());
    let entry = convert_module_into(module, &mut program, use_tuple_args, return_tuple, options)?;
    Ok(program.finish(entry)?)
}

/// Convert `module` into an existing program builder and return the id of
/// its entry computation. On error the builder holds partial state and
/// should be discarded.
pub fn convert_module_into(
    module: &Module,
    program: &mut ProgramBuilder,
    use_tuple_args: bool,
    return_tuple: bool,
    options: &ConversionOptions,
) -> Result<ComputationId, LowerError> {
    let main = module.entry().ok_or(LowerError::NoEntry)?;
    let mut session = Lowering::new(module, options);
    session.lower_entry(program, main, use_tuple_args, return_tuple)
}

/// State shared by every computation of one conversion.
pub(crate) struct Lowering<'m> {
    pub(crate) module: &'m Module,
    pub(crate) options: &'m ConversionOptions,
    /// Converted callees by function name.
    converted: HashMap<String, ComputationId>,
    /// Functions currently being converted, outermost first.
    in_progress: Vec<String>,
    regions: usize,
}

impl<'m> Lowering<'m> {
    pub(crate) fn new(module: &'m Module, options: &'m ConversionOptions) -> Self {
        Self {
            module,
            options,
            converted: HashMap::new(),
            in_progress: Vec::new(),
            regions: 0,
        }
    }

    /// Sequence number for the next nested-region computation.
    pub(crate) fn next_region(&mut self) -> usize {
        let n = self.regions;
        self.regions += 1;
        n
    }

    /// The computation for function `name`, converting it on first use.
    pub(crate) fn callee(
        &mut self,
        program: &mut ProgramBuilder,
        caller: &str,
        name: &str,
    ) -> Result<ComputationId, LowerError> {
        if let Some(id) = self.converted.get(name) {
            return Ok(*id);
        }
        if self.in_progress.iter().any(|f| f == name) {
            let mut chain = self.in_progress.clone();
            chain.push(name.to_string());
            return Err(LowerError::CallCycle { chain });
        }
        if let Some(id) = program.computation_id(name) {
            self.converted.insert(name.to_string(), id);
            return Ok(id);
        }
        let module = self.module;
        let function = module
            .function(name)
            .ok_or_else(|| LowerError::MissingCallee {
                caller: caller.to_string(),
                callee: name.to_string(),
            })?;

        self.in_progress.push(name.to_string());
        let id = self.lower_callee(program, function);
        self.in_progress.pop();
        let id = id?;
        self.converted.insert(name.to_string(), id);
        Ok(id)
    }

    fn lower_callee(
        &mut self,
        program: &mut ProgramBuilder,
        function: &'m Function,
    ) -> Result<ComputationId, LowerError> {
        let mut comp = ComputationBuilder::new(program.unique_name(&function.name));
        let mut params = Vec::with_capacity(function.body.arguments.len());
        for (i, arg) in function.body.arguments.iter().enumerate() {
            let param = comp.parameter(i as i64, self.parameter_shape(&arg.ty)?, &format!("Arg_{i}"))?;
            comp.instruction_mut(param)?.attrs.sharding = self.arg_sharding(function, i)?;
            params.push(param);
        }
        let outputs = lower_block(self, program, &mut comp, &function.name, &function.body, &params)?;
        let root = match outputs.as_slice() {
            [single] => *single,
            _ => comp.tuple(&outputs)?,
        };
        finish(program, comp, root)
    }

    fn lower_entry(
        &mut self,
        program: &mut ProgramBuilder,
        main: &'m Function,
        use_tuple_args: bool,
        return_tuple: bool,
    ) -> Result<ComputationId, LowerError> {
        self.in_progress.push(main.name.clone());
        let mut comp = ComputationBuilder::new(program.unique_name(&main.name));
        let arguments = &main.body.arguments;

        let shardings = (0..arguments.len())
            .map(|i| self.arg_sharding(main, i))
            .collect::<Result<Vec<_>, _>>()?;
        let shapes = arguments
            .iter()
            .map(|arg| self.parameter_shape(&arg.ty))
            .collect::<Result<Vec<_>, _>>()?;

        let inputs: Vec<ProgramValue> = if use_tuple_args {
            let param = comp.parameter(0, Shape::tuple(shapes), "arg_tuple")?;
            comp.instruction_mut(param)?.attrs.sharding = tuple_sharding(shardings);
            (0..arguments.len())
                .map(|i| comp.get_tuple_element(param, i))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut params = Vec::with_capacity(arguments.len());
            for (i, (shape, sharding)) in shapes.into_iter().zip(shardings).enumerate() {
                let param = comp.parameter(i as i64, shape, &format!("Arg_{i}"))?;
                comp.instruction_mut(param)?.attrs.sharding = sharding;
                params.push(param);
            }
            params
        };

        let outputs = lower_block(self, program, &mut comp, &main.name, &main.body, &inputs)?;
        let result_shardings = (0..outputs.len())
            .map(|i| self.result_sharding(main, i))
            .collect::<Result<Vec<_>, _>>()?;
        let root = match outputs.as_slice() {
            [single] if !return_tuple => {
                if let Some(sharding) = result_shardings.into_iter().next().flatten() {
                    comp.instruction_mut(*single)?.attrs.sharding = Some(sharding);
                }
                *single
            }
            _ => {
                let root = comp.tuple(&outputs)?;
                comp.instruction_mut(root)?.attrs.sharding = tuple_sharding(result_shardings);
                root
            }
        };

        if self.options.propagate_layouts && self.options.shape_representation_fn.is_some() {
            let shape = comp.shape_of(root)?.clone();
            comp.instruction_mut(root)?.shape = self.options.represent(shape)?;
        }

        let id = finish(program, comp, root)?;
        self.in_progress.pop();
        Ok(id)
    }

    fn parameter_shape(&self, ty: &Type) -> Result<Shape, LowerError> {
        let shape = convert_type(ty);
        if self.options.propagate_layouts {
            self.options.represent(shape)
        } else {
            Ok(shape)
        }
    }

    fn arg_sharding(&self, function: &Function, index: usize) -> Result<Option<OpSharding>, LowerError> {
        match function.arg_sharding(index) {
            Some(text) => resolve_sharding(self.options, &format!("argument {index} sharding"), text),
            None => Ok(None),
        }
    }

    fn result_sharding(
        &self,
        function: &Function,
        index: usize,
    ) -> Result<Option<OpSharding>, LowerError> {
        match function.result_sharding(index) {
            Some(text) => resolve_sharding(self.options, &format!("result {index} sharding"), text),
            None => Ok(None),
        }
    }
}

/// One tuple sharding covering all elements when any element is sharded;
/// unsharded elements are replicated.
fn tuple_sharding(elements: Vec<Option<OpSharding>>) -> Option<OpSharding> {
    if elements.iter().all(Option::is_none) {
        return None;
    }
    Some(OpSharding::tuple(
        elements
            .into_iter()
            .map(|s| s.unwrap_or_else(OpSharding::replicated))
            .collect(),
    ))
}

/// Build `comp` with `root` and add it to the program.
pub(crate) fn finish(
    program: &mut ProgramBuilder,
    comp: ComputationBuilder,
    root: ProgramValue,
) -> Result<ComputationId, LowerError> {
    let computation = comp.build(root)?;
    debug!(
        "lowered computation `{}` ({} instructions)",
        computation.name,
        computation.instructions.len()
    );
    Ok(program.add_computation(computation)?)
}
