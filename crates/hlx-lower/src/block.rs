//! Block conversion: lower one region body into a computation under
//! construction.
//!
//! Operations are lowered in order through one exhaustive `match` over
//! [`OpKind`]. Operand lookup is scoped to the block being lowered; a nested
//! region only sees its own arguments. Regions become sub-computations named
//! `<function>.<op>.<n>`.

use hlx_ir::{BinaryOp, Block, Module, OpKind, Operation, UnaryOp};
use hlx_program::attrs::{PaddingDimension, SliceDimension, TriangularSolveOptions};
use hlx_program::{
    ComputationBuilder, ComputationId, Instruction, InstructionAttrs, Layout, Opcode,
    ProgramBuilder, ProgramValue, Shape,
};
use log::trace;

use crate::attrs::{
    convert_comparison_direction, convert_conv_dimension_numbers, convert_custom_call_api_version,
    convert_custom_call_schedule, convert_dot_dimension_numbers, convert_fft_type, convert_layout,
    convert_literal, convert_nx2, convert_output_operand_aliasing, convert_replica_groups,
    convert_transpose, convert_window, make_dot_dimension_numbers,
};
use crate::context::BlockContext;
use crate::error::LowerError;
use crate::module::{finish, Lowering};
use crate::options::ConversionOptions;
use crate::types::convert_type;

/// Lower `block` into `comp`, binding its arguments to `inputs`, and return
/// the values of its terminator in order.
///
/// Calls are resolved against `module`; callees are added to `program` on
/// first use, and callees already present in `program` under their function
/// name are reused.
pub fn convert_block(
    module: &Module,
    block: &Block,
    program: &mut ProgramBuilder,
    comp: &mut ComputationBuilder,
    inputs: &[ProgramValue],
    options: &ConversionOptions,
) -> Result<Vec<ProgramValue>, LowerError> {
    let mut session = Lowering::new(module, options);
    let function = comp.name().to_string();
    lower_block(&mut session, program, comp, &function, block, inputs)
}

pub(crate) fn lower_block(
    session: &mut Lowering<'_>,
    program: &mut ProgramBuilder,
    comp: &mut ComputationBuilder,
    function: &str,
    block: &Block,
    inputs: &[ProgramValue],
) -> Result<Vec<ProgramValue>, LowerError> {
    if block.arguments.len() != inputs.len() {
        return Err(LowerError::arity(
            "block arguments",
            block.arguments.len(),
            inputs.len(),
        ));
    }
    let options = session.options;
    let mut ctx = BlockContext::new(comp, options, function);
    for (arg, input) in block.arguments.iter().zip(inputs) {
        ctx.bind(arg.value, *input);
    }
    for op in &block.operations {
        trace!("lowering {} in `{function}`", op.kind);
        lower_op(session, program, &mut ctx, op)
            .map_err(|e| e.in_op(op.kind.name(), op.location.clone()))?;
    }
    block
        .returns()
        .iter()
        .map(|v| ctx.lookup(*v))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.in_op("return", block.terminator.location.clone()))
}

fn lower_op(
    session: &mut Lowering<'_>,
    program: &mut ProgramBuilder,
    ctx: &mut BlockContext<'_>,
    op: &Operation,
) -> Result<(), LowerError> {
    let operands = ctx.operands(op)?;
    let function = ctx.function();
    match &op.kind {
        OpKind::Constant { value } => {
            expect_operands(op, 0)?;
            expect_results(op, 1)?;
            let tensor = op.result_types[0]
                .as_tensor()
                .ok_or_else(|| LowerError::Unsupported(format!("constant of type {}", op.result_types[0])))?;
            let literal = convert_literal(value, tensor)?;
            ctx.emit(
                op,
                Opcode::Constant,
                InstructionAttrs {
                    literal: Some(literal),
                    ..Default::default()
                },
                &[],
            )?;
        }
        OpKind::Iota { dimension } => {
            expect_operands(op, 0)?;
            expect_results(op, 1)?;
            let rank = op.result_types[0].rank().unwrap_or(0);
            if *dimension < 0 || *dimension as usize >= rank {
                return Err(LowerError::malformed(
                    "iota_dimension",
                    format!("{dimension} is out of range for rank {rank}"),
                ));
            }
            ctx.emit(op, Opcode::Iota, dims(vec![*dimension]), &[])?;
        }
        OpKind::Unary(unary) => {
            expect_operands(op, 1)?;
            ctx.emit(op, unary_opcode(*unary), InstructionAttrs::default(), &operands)?;
        }
        OpKind::Binary(binary) => {
            expect_operands(op, 2)?;
            ctx.emit(op, binary_opcode(*binary), InstructionAttrs::default(), &operands)?;
        }
        OpKind::Compare { direction } => {
            expect_operands(op, 2)?;
            let attrs = InstructionAttrs {
                comparison_direction: Some(convert_comparison_direction(*direction)),
                ..Default::default()
            };
            ctx.emit(op, Opcode::Compare, attrs, &operands)?;
        }
        OpKind::Select => {
            expect_operands(op, 3)?;
            ctx.emit(op, Opcode::Select, InstructionAttrs::default(), &operands)?;
        }
        OpKind::Clamp => {
            expect_operands(op, 3)?;
            ctx.emit(op, Opcode::Clamp, InstructionAttrs::default(), &operands)?;
        }
        OpKind::Convert => {
            expect_operands(op, 1)?;
            ctx.emit(op, Opcode::Convert, InstructionAttrs::default(), &operands)?;
        }
        OpKind::BitcastConvert => {
            expect_operands(op, 1)?;
            ctx.emit(op, Opcode::BitcastConvert, InstructionAttrs::default(), &operands)?;
        }
        OpKind::Bitcast => {
            expect_operands(op, 1)?;
            ctx.emit(op, Opcode::Bitcast, InstructionAttrs::default(), &operands)?;
        }
        OpKind::Reshape => {
            expect_operands(op, 1)?;
            ctx.emit(op, Opcode::Reshape, InstructionAttrs::default(), &operands)?;
        }
        OpKind::BroadcastInDim {
            broadcast_dimensions,
        } => {
            expect_operands(op, 1)?;
            let rank = ctx.shape_of(operands[0])?.rank();
            if broadcast_dimensions.len() != rank {
                return Err(LowerError::malformed(
                    "broadcast_dimensions",
                    format!(
                        "{} entries for an operand of rank {rank}",
                        broadcast_dimensions.len()
                    ),
                ));
            }
            ctx.emit(op, Opcode::Broadcast, dims(broadcast_dimensions.clone()), &operands)?;
        }
        OpKind::Transpose { permutation } => {
            expect_operands(op, 1)?;
            let rank = ctx.shape_of(operands[0])?.rank();
            if !Layout::new(permutation.clone()).is_valid_for_rank(rank) {
                return Err(LowerError::malformed(
                    "permutation",
                    format!("{permutation:?} is not a permutation of 0..{rank}"),
                ));
            }
            ctx.emit(op, Opcode::Transpose, dims(permutation.clone()), &operands)?;
        }
        OpKind::Reverse { dimensions } => {
            expect_operands(op, 1)?;
            ctx.emit(op, Opcode::Reverse, dims(dimensions.clone()), &operands)?;
        }
        OpKind::Slice {
            start_indices,
            limit_indices,
            strides,
        } => {
            expect_operands(op, 1)?;
            let n = start_indices.len();
            if limit_indices.len() != n || strides.len() != n {
                return Err(LowerError::malformed(
                    "slice",
                    format!(
                        "start/limit/stride lengths differ ({n}, {}, {})",
                        limit_indices.len(),
                        strides.len()
                    ),
                ));
            }
            let slice_dimensions = (0..n)
                .map(|i| SliceDimension {
                    start: start_indices[i],
                    limit: limit_indices[i],
                    stride: strides[i],
                })
                .collect();
            let attrs = InstructionAttrs {
                slice_dimensions,
                ..Default::default()
            };
            ctx.emit(op, Opcode::Slice, attrs, &operands)?;
        }
        OpKind::DynamicSlice { slice_sizes } => {
            at_least(op, 1)?;
            let attrs = InstructionAttrs {
                dynamic_slice_sizes: slice_sizes.clone(),
                ..Default::default()
            };
            ctx.emit(op, Opcode::DynamicSlice, attrs, &operands)?;
        }
        OpKind::DynamicUpdateSlice => {
            at_least(op, 2)?;
            ctx.emit(op, Opcode::DynamicUpdateSlice, InstructionAttrs::default(), &operands)?;
        }
        OpKind::Concatenate { dimension } => {
            at_least(op, 1)?;
            ctx.emit(op, Opcode::Concatenate, dims(vec![*dimension]), &operands)?;
        }
        OpKind::Pad {
            edge_padding_low,
            edge_padding_high,
            interior_padding,
        } => {
            expect_operands(op, 2)?;
            let n = edge_padding_low.len();
            if edge_padding_high.len() != n || interior_padding.len() != n {
                return Err(LowerError::malformed(
                    "padding",
                    format!(
                        "low/high/interior lengths differ ({n}, {}, {})",
                        edge_padding_high.len(),
                        interior_padding.len()
                    ),
                ));
            }
            let padding_config = (0..n)
                .map(|i| PaddingDimension {
                    edge_padding_low: edge_padding_low[i],
                    edge_padding_high: edge_padding_high[i],
                    interior_padding: interior_padding[i],
                })
                .collect();
            let attrs = InstructionAttrs {
                padding_config,
                ..Default::default()
            };
            ctx.emit(op, Opcode::Pad, attrs, &operands)?;
        }
        OpKind::Tuple => {
            ctx.emit(op, Opcode::Tuple, InstructionAttrs::default(), &operands)?;
        }
        OpKind::GetTupleElement { index } => {
            expect_operands(op, 1)?;
            let shape = ctx.shape_of(operands[0])?;
            if !shape.is_tuple() || *index as usize >= shape.tuple_shapes.len() {
                return Err(LowerError::malformed(
                    "index",
                    format!("index {index} does not select an element of {shape}"),
                ));
            }
            let attrs = InstructionAttrs {
                tuple_index: Some(i64::from(*index)),
                ..Default::default()
            };
            ctx.emit(op, Opcode::GetTupleElement, attrs, &operands)?;
        }
        OpKind::Dot => {
            expect_operands(op, 2)?;
            let lhs_rank = ctx.shape_of(operands[0])?.rank();
            let rhs_rank = ctx.shape_of(operands[1])?.rank();
            if !(1..=2).contains(&lhs_rank) || !(1..=2).contains(&rhs_rank) {
                return Err(LowerError::Unsupported(format!(
                    "dot of rank-{lhs_rank} and rank-{rhs_rank} operands"
                )));
            }
            let attrs = InstructionAttrs {
                dot_dimension_numbers: Some(make_dot_dimension_numbers(
                    &[],
                    &[],
                    &[lhs_rank as i64 - 1],
                    &[0],
                )),
                ..Default::default()
            };
            ctx.emit(op, Opcode::Dot, attrs, &operands)?;
        }
        OpKind::DotGeneral { dimension_numbers } => {
            expect_operands(op, 2)?;
            let attrs = InstructionAttrs {
                dot_dimension_numbers: Some(convert_dot_dimension_numbers(dimension_numbers)),
                ..Default::default()
            };
            ctx.emit(op, Opcode::Dot, attrs, &operands)?;
        }
        OpKind::Convolution(conv) => {
            expect_operands(op, 2)?;
            let kernel_dims = ctx.shape_of(operands[1])?.dimensions.clone();
            let attrs = InstructionAttrs {
                window: Some(convert_window(conv, &kernel_dims)?),
                convolution_dimension_numbers: Some(convert_conv_dimension_numbers(
                    &conv.dimension_numbers,
                )),
                feature_group_count: Some(conv.feature_group_count),
                batch_group_count: Some(conv.batch_group_count),
                ..Default::default()
            };
            ctx.emit(op, Opcode::Convolution, attrs, &operands)?;
        }
        OpKind::Fft {
            fft_type,
            fft_length,
        } => {
            expect_operands(op, 1)?;
            let attrs = InstructionAttrs {
                fft_type: Some(convert_fft_type(fft_type)?),
                fft_length: fft_length.clone(),
                ..Default::default()
            };
            ctx.emit(op, Opcode::Fft, attrs, &operands)?;
        }
        OpKind::TriangularSolve {
            left_side,
            lower,
            unit_diagonal,
            transpose_a,
        } => {
            expect_operands(op, 2)?;
            let attrs = InstructionAttrs {
                triangular_solve_options: Some(TriangularSolveOptions {
                    left_side: *left_side,
                    lower: *lower,
                    unit_diagonal: *unit_diagonal,
                    transpose_a: convert_transpose(transpose_a)?,
                }),
                ..Default::default()
            };
            ctx.emit(op, Opcode::TriangularSolve, attrs, &operands)?;
        }
        OpKind::Reduce { dimensions, body } => {
            // One input and one init value per result.
            if op.results.is_empty() {
                return Err(LowerError::arity("results (minimum)", 1, 0));
            }
            expect_operands(op, 2 * op.results.len())?;
            expect_region(body, "reduce body", operands.len(), op.results.len())?;
            let id = lower_region(session, program, function, op, body, RegionArgs::Separate)?;
            let instr = Instruction::new(Opcode::Reduce, ctx.op_shape(op)?)
                .with_attrs(dims(dimensions.clone()))
                .with_called(vec![id]);
            ctx.emit_instruction(op, instr, &operands)?;
        }
        OpKind::Sort {
            dimension,
            is_stable,
            comparator,
        } => {
            at_least(op, 1)?;
            expect_region(comparator, "sort comparator", 2 * operands.len(), 1)?;
            let id = lower_region(session, program, function, op, comparator, RegionArgs::Separate)?;
            let attrs = InstructionAttrs {
                dimensions: vec![*dimension],
                is_stable: *is_stable,
                ..Default::default()
            };
            let instr = Instruction::new(Opcode::Sort, ctx.op_shape(op)?)
                .with_attrs(attrs)
                .with_called(vec![id]);
            ctx.emit_instruction(op, instr, &operands)?;
        }
        OpKind::While { cond, body } => {
            let n = operands.len();
            expect_region(cond, "while condition", n, 1)?;
            expect_region(body, "while body", n, n)?;
            let packing = RegionArgs::Packed {
                unwrap_single: true,
            };
            let cond_id = lower_region(session, program, function, op, cond, packing)?;
            let body_id = lower_region(session, program, function, op, body, packing)?;
            let state = match operands.as_slice() {
                [single] => *single,
                _ => ctx.builder().tuple(&operands)?,
            };
            let instr = Instruction::new(Opcode::While, ctx.op_shape(op)?)
                .with_called(vec![cond_id, body_id]);
            ctx.emit_instruction(op, instr, &[state])?;
        }
        OpKind::If {
            true_branch,
            false_branch,
        } => {
            at_least(op, 1)?;
            let (pred, args) = (operands[0], &operands[1..]);
            let packing = RegionArgs::Packed {
                unwrap_single: false,
            };
            let mut branches = Vec::with_capacity(2);
            for (name, branch) in [("true branch", true_branch), ("false branch", false_branch)] {
                expect_region(branch, name, args.len(), op.results.len())?;
                branches.push(lower_region(session, program, function, op, branch, packing)?);
            }
            let packed = ctx.builder().tuple(args)?;
            let instr =
                Instruction::new(Opcode::Conditional, ctx.op_shape(op)?).with_called(branches);
            ctx.emit_instruction(op, instr, &[pred, packed, packed])?;
        }
        OpKind::AllReduce {
            replica_groups,
            channel_id,
            reducer,
        } => {
            at_least(op, 1)?;
            expect_region(reducer, "all-reduce reducer", 2, 1)?;
            let id = lower_region(session, program, function, op, reducer, RegionArgs::Separate)?;
            let attrs = InstructionAttrs {
                replica_groups: convert_replica_groups(replica_groups)?,
                channel_id: *channel_id,
                ..Default::default()
            };
            let instr = Instruction::new(Opcode::AllReduce, ctx.op_shape(op)?)
                .with_attrs(attrs)
                .with_called(vec![id]);
            ctx.emit_instruction(op, instr, &operands)?;
        }
        OpKind::AllGather {
            all_gather_dimension,
            replica_groups,
            channel_id,
        } => {
            expect_operands(op, 1)?;
            let attrs = InstructionAttrs {
                dimensions: vec![*all_gather_dimension],
                replica_groups: convert_replica_groups(replica_groups)?,
                channel_id: *channel_id,
                ..Default::default()
            };
            ctx.emit(op, Opcode::AllGather, attrs, &operands)?;
        }
        OpKind::CollectivePermute {
            source_target_pairs,
            channel_id,
        } => {
            expect_operands(op, 1)?;
            let attrs = InstructionAttrs {
                source_target_pairs: convert_nx2(
                    "source_target_pairs",
                    source_target_pairs.as_ref(),
                )?,
                channel_id: *channel_id,
                ..Default::default()
            };
            ctx.emit(op, Opcode::CollectivePermute, attrs, &operands)?;
        }
        OpKind::ReplicaId => {
            expect_operands(op, 0)?;
            ctx.emit(op, Opcode::ReplicaId, InstructionAttrs::default(), &[])?;
        }
        OpKind::AfterAll => {
            ctx.emit(op, Opcode::AfterAll, InstructionAttrs::default(), &operands)?;
        }
        OpKind::CustomCall(call) => {
            let mut attrs = InstructionAttrs {
                custom_call_target: call.call_target_name.clone(),
                custom_call_has_side_effect: call.has_side_effect,
                backend_config: call.backend_config.clone(),
                custom_call_api_version: Some(convert_custom_call_api_version(&call.api_version)?),
                custom_call_schedule: Some(convert_custom_call_schedule(&call.schedule)?),
                output_operand_aliasing: convert_output_operand_aliasing(
                    &call.output_operand_aliases,
                ),
                ..Default::default()
            };
            if let Some(layouts) = &call.operand_layouts {
                if layouts.len() != operands.len() {
                    return Err(LowerError::arity(
                        "custom call operand layouts",
                        operands.len(),
                        layouts.len(),
                    ));
                }
                attrs.operand_shapes_with_layout = layouts
                    .iter()
                    .zip(&operands)
                    .map(|(layout, operand)| {
                        let shape = ctx.shape_of(*operand)?.clone();
                        let layout = convert_layout("operand_layouts", layout, shape.rank())?;
                        Ok(shape.with_layout(layout))
                    })
                    .collect::<Result<Vec<_>, LowerError>>()?;
            }
            let mut shape = ctx.op_shape(op)?;
            if let Some(layouts) = &call.result_layouts {
                if layouts.len() != op.result_types.len() {
                    return Err(LowerError::arity(
                        "custom call result layouts",
                        op.result_types.len(),
                        layouts.len(),
                    ));
                }
                if let [layout] = layouts.as_slice() {
                    let layout = convert_layout("result_layouts", layout, shape.rank())?;
                    shape = shape.with_layout(layout);
                } else {
                    for (element, layout) in shape.tuple_shapes.iter_mut().zip(layouts) {
                        element.layout =
                            Some(convert_layout("result_layouts", layout, element.rank())?);
                    }
                }
            }
            let instr = Instruction::new(Opcode::CustomCall, shape).with_attrs(attrs);
            ctx.emit_instruction(op, instr, &operands)?;
        }
        OpKind::Call { callee } => {
            if let Some(target) = session.module.function(callee) {
                if target.body.arguments.len() != operands.len() {
                    return Err(LowerError::arity(
                        format!("arguments to `{callee}`"),
                        target.body.arguments.len(),
                        operands.len(),
                    ));
                }
                if target.result_types.len() != op.results.len() {
                    return Err(LowerError::arity(
                        format!("results of `{callee}`"),
                        target.result_types.len(),
                        op.results.len(),
                    ));
                }
            }
            let id = session.callee(program, function, callee)?;
            let instr = Instruction::new(Opcode::Call, ctx.op_shape(op)?).with_called(vec![id]);
            ctx.emit_instruction(op, instr, &operands)?;
        }
    }
    Ok(())
}

/// How a region's arguments arrive in its computation.
#[derive(Debug, Clone, Copy)]
enum RegionArgs {
    /// One parameter per argument.
    Separate,
    /// One tuple parameter destructured into the arguments. With
    /// `unwrap_single`, a lone argument is passed as is.
    Packed { unwrap_single: bool },
}

fn lower_region(
    session: &mut Lowering<'_>,
    program: &mut ProgramBuilder,
    function: &str,
    op: &Operation,
    region: &Block,
    args: RegionArgs,
) -> Result<ComputationId, LowerError> {
    let n = session.next_region();
    let name = program.unique_name(&format!("{function}.{}.{n}", op.kind.name()));
    let mut comp = ComputationBuilder::new(name);
    let mut shapes: Vec<Shape> = region
        .arguments
        .iter()
        .map(|arg| convert_type(&arg.ty))
        .collect();

    let inputs = match args {
        RegionArgs::Separate => shapes
            .into_iter()
            .enumerate()
            .map(|(i, shape)| comp.parameter(i as i64, shape, &format!("arg.{i}")))
            .collect::<Result<Vec<_>, _>>()?,
        RegionArgs::Packed {
            unwrap_single: true,
        } if shapes.len() == 1 => vec![comp.parameter(0, shapes.swap_remove(0), "state")?],
        RegionArgs::Packed { .. } => {
            let count = shapes.len();
            let state = comp.parameter(0, Shape::tuple(shapes), "state")?;
            (0..count)
                .map(|i| comp.get_tuple_element(state, i))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let outputs = lower_block(session, program, &mut comp, function, region, &inputs)?;
    let root = match outputs.as_slice() {
        [single] => *single,
        _ => comp.tuple(&outputs)?,
    };
    finish(program, comp, root)
}

fn expect_operands(op: &Operation, n: usize) -> Result<(), LowerError> {
    if op.operands.len() != n {
        return Err(LowerError::arity("operands", n, op.operands.len()));
    }
    Ok(())
}

fn at_least(op: &Operation, n: usize) -> Result<(), LowerError> {
    if op.operands.len() < n {
        return Err(LowerError::arity(
            "operands (minimum)",
            n,
            op.operands.len(),
        ));
    }
    Ok(())
}

fn expect_results(op: &Operation, n: usize) -> Result<(), LowerError> {
    if op.results.len() != n {
        return Err(LowerError::arity("results", n, op.results.len()));
    }
    if op.result_types.len() != n {
        return Err(LowerError::arity("result types", n, op.result_types.len()));
    }
    Ok(())
}

fn expect_region(
    region: &Block,
    what: &str,
    arguments: usize,
    results: usize,
) -> Result<(), LowerError> {
    if region.arguments.len() != arguments {
        return Err(LowerError::arity(
            format!("{what} arguments"),
            arguments,
            region.arguments.len(),
        ));
    }
    if region.returns().len() != results {
        return Err(LowerError::arity(
            format!("{what} results"),
            results,
            region.returns().len(),
        ));
    }
    Ok(())
}

fn dims(dimensions: Vec<i64>) -> InstructionAttrs {
    InstructionAttrs {
        dimensions,
        ..Default::default()
    }
}

fn unary_opcode(op: UnaryOp) -> Opcode {
    match op {
        UnaryOp::Abs => Opcode::Abs,
        UnaryOp::Negate => Opcode::Negate,
        UnaryOp::Exp => Opcode::Exponential,
        UnaryOp::Log => Opcode::Log,
        UnaryOp::Sqrt => Opcode::Sqrt,
        UnaryOp::Rsqrt => Opcode::Rsqrt,
        UnaryOp::Tanh => Opcode::Tanh,
        UnaryOp::Logistic => Opcode::Logistic,
        UnaryOp::Floor => Opcode::Floor,
        UnaryOp::Ceil => Opcode::Ceil,
        UnaryOp::Sign => Opcode::Sign,
        UnaryOp::Cosine => Opcode::Cosine,
        UnaryOp::Sine => Opcode::Sine,
        UnaryOp::Not => Opcode::Not,
        UnaryOp::Copy => Opcode::Copy,
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Subtract => Opcode::Subtract,
        BinaryOp::Multiply => Opcode::Multiply,
        BinaryOp::Divide => Opcode::Divide,
        BinaryOp::Remainder => Opcode::Remainder,
        BinaryOp::Maximum => Opcode::Maximum,
        BinaryOp::Minimum => Opcode::Minimum,
        BinaryOp::Power => Opcode::Power,
        BinaryOp::And => Opcode::And,
        BinaryOp::Or => Opcode::Or,
        BinaryOp::Xor => Opcode::Xor,
        BinaryOp::Atan2 => Opcode::Atan2,
        BinaryOp::ShiftLeft => Opcode::ShiftLeft,
        BinaryOp::ShiftRightArithmetic => Opcode::ShiftRightArithmetic,
        BinaryOp::ShiftRightLogical => Opcode::ShiftRightLogical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlx_ir::{
        Attribute, BlockBuilder, ComparisonDirection, ConvDimensionNumbers, ConvolutionAttrs,
        CustomCallAttrs, DenseIntElements, DotDimensionNumbers, ElementType, ElementsData,
        FunctionBuilder, Function, Location, Type, ValueId,
    };
    use hlx_program::{Computation, InstrId, PrimitiveType};

    fn module_with(functions: Vec<Function>) -> Module {
        let mut module = Module::new("m");
        for f in functions {
            module.add_function(f).unwrap();
        }
        module
    }

    /// Lower `main`'s body standalone, one parameter per argument, and
    /// build the result with its outputs tupled.
    fn lower_main(
        module: &Module,
        options: &ConversionOptions,
    ) -> Result<(ProgramBuilder, Computation), LowerError> {
        let main = module.entry().unwrap();
        let mut program = ProgramBuilder::new("p");
        let mut comp = ComputationBuilder::new("main");
        let params: Vec<ProgramValue> = main
            .body
            .arguments
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                comp.parameter(i as i64, convert_type(&arg.ty), &format!("p{i}"))
                    .unwrap()
            })
            .collect();
        let outputs = convert_block(module, &main.body, &mut program, &mut comp, &params, options)?;
        let root = match outputs.as_slice() {
            [single] => *single,
            _ => comp.tuple(&outputs).unwrap(),
        };
        Ok((program, comp.build(root).unwrap()))
    }

    fn lower(main: Function) -> Result<(ProgramBuilder, Computation), LowerError> {
        lower_main(&module_with(vec![main]), &ConversionOptions::default())
    }

    fn operand<'c>(comp: &'c Computation, instr: &hlx_program::Instruction, i: usize) -> &'c hlx_program::Instruction {
        comp.instruction(instr.operand_ids[i]).unwrap()
    }

    #[test]
    fn results_map_one_to_one() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[]));
            let pair = b.op(
                OpKind::CustomCall(Box::new(CustomCallAttrs::new("split"))),
                &[x],
                vec![Type::f32(&[]), Type::i32(&[])],
            );
            b.op(OpKind::AfterAll, &[], vec![]);
            let t = b.tuple(&[pair[0], pair[1]]);
            vec![pair[0], pair[1], t]
        });
        let (_, comp) = lower(main).unwrap();
        // parameter, custom-call, 2 get-tuple-element, after-all, tuple, root tuple
        assert_eq!(comp.instructions.len(), 7);
        assert_eq!(comp.count(Opcode::GetTupleElement), 2);
        let root = comp.root().unwrap();
        assert_eq!(root.operand_ids.len(), 3);
        assert_eq!(operand(&comp, root, 2).opcode, Opcode::Tuple);
    }

    #[test]
    fn forward_reference_is_rejected() {
        let mut main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[]));
            let y = b.unary(UnaryOp::Negate, x);
            let z = b.unary(UnaryOp::Abs, y);
            vec![z]
        });
        let later = main.body.operations[1].results[0];
        main.body.operations[0].operands = vec![later];
        let err = lower(main).unwrap_err();
        assert!(matches!(err.root_cause(), LowerError::UndefinedValue(v) if *v == later));
        assert!(err.to_string().starts_with("in negate: "));
    }

    #[test]
    fn regions_do_not_see_enclosing_values() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[]));
            let init = b.constant(Type::f32(&[]), ElementsData::Float(vec![0.0]));
            let body = b.region(|r| {
                let a = r.argument(Type::f32(&[]));
                let _c = r.argument(Type::f32(&[]));
                vec![r.binary(BinaryOp::Add, a, x)]
            });
            vec![b.op1(
                OpKind::Reduce {
                    dimensions: vec![],
                    body,
                },
                &[x, init],
                Type::f32(&[]),
            )]
        });
        let err = lower(main).unwrap_err();
        assert!(matches!(err.root_cause(), LowerError::UndefinedValue(ValueId(0))));
        assert!(err.to_string().starts_with("in reduce: in add: "));
    }

    #[test]
    fn reduce_becomes_named_sub_computation() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[8]));
            let init = b.constant(Type::f32(&[]), ElementsData::Float(vec![0.0]));
            let body = b.region(|r| {
                let a = r.argument(Type::f32(&[]));
                let c = r.argument(Type::f32(&[]));
                vec![r.binary(BinaryOp::Add, a, c)]
            });
            vec![b.op1(
                OpKind::Reduce {
                    dimensions: vec![0],
                    body,
                },
                &[x, init],
                Type::f32(&[]),
            )]
        });
        let (program, comp) = lower(main).unwrap();
        let reduce = comp.root().unwrap();
        assert_eq!(reduce.opcode, Opcode::Reduce);
        assert_eq!(reduce.attrs.dimensions, vec![0]);
        let body = program.computation(reduce.called_computation_ids[0]).unwrap();
        assert_eq!(body.name, "main.reduce.0");
        assert_eq!(body.parameters().len(), 2);
        assert_eq!(body.root().unwrap().opcode, Opcode::Add);
    }

    #[test]
    fn reduce_needs_init_per_input() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[8]));
            let body = b.region(|r| vec![r.argument(Type::f32(&[]))]);
            vec![b.op1(
                OpKind::Reduce {
                    dimensions: vec![0],
                    body,
                },
                &[x],
                Type::f32(&[]),
            )]
        });
        let err = lower(main).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            LowerError::ArityMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn while_state_is_tupled() {
        let main = FunctionBuilder::new("main").build(|b| {
            let i = b.argument(Type::i32(&[]));
            let acc = b.argument(Type::f32(&[]));
            let cond = b.region(|r| {
                let i = r.argument(Type::i32(&[]));
                let _acc = r.argument(Type::f32(&[]));
                vec![r.compare(ComparisonDirection::Lt, i, i)]
            });
            let body = b.region(|r| {
                let i = r.argument(Type::i32(&[]));
                let acc = r.argument(Type::f32(&[]));
                vec![i, acc]
            });
            b.op(
                OpKind::While { cond, body },
                &[i, acc],
                vec![Type::i32(&[]), Type::f32(&[])],
            )
        });
        let (program, comp) = lower(main).unwrap();
        let root = comp.root().unwrap();
        let gte = operand(&comp, root, 1);
        assert_eq!(gte.opcode, Opcode::GetTupleElement);
        let while_instr = operand(&comp, gte, 0);
        assert_eq!(while_instr.opcode, Opcode::While);
        assert_eq!(operand(&comp, while_instr, 0).opcode, Opcode::Tuple);

        let cond = program.computation(while_instr.called_computation_ids[0]).unwrap();
        assert_eq!(cond.name, "main.while.0");
        assert!(cond.parameters()[0].shape.is_tuple());
        assert_eq!(cond.root().unwrap().opcode, Opcode::Compare);
        let body = program.computation(while_instr.called_computation_ids[1]).unwrap();
        assert_eq!(body.name, "main.while.1");
        assert_eq!(body.root().unwrap().opcode, Opcode::Tuple);
    }

    #[test]
    fn single_operand_while_passes_value() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[]));
            let cond = b.region(|r| {
                let v = r.argument(Type::f32(&[]));
                vec![r.compare(ComparisonDirection::Gt, v, v)]
            });
            let body = b.region(|r| {
                let v = r.argument(Type::f32(&[]));
                vec![r.unary(UnaryOp::Negate, v)]
            });
            vec![b.op1(OpKind::While { cond, body }, &[x], Type::f32(&[]))]
        });
        let (program, comp) = lower(main).unwrap();
        let while_instr = comp.root().unwrap();
        assert_eq!(while_instr.opcode, Opcode::While);
        assert_eq!(while_instr.operand_ids, vec![InstrId(0)]);
        let body = program.computation(while_instr.called_computation_ids[1]).unwrap();
        assert!(!body.parameters()[0].shape.is_tuple());
        assert_eq!(body.root().unwrap().opcode, Opcode::Negate);
    }

    #[test]
    fn while_region_arity_is_checked() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[]));
            let cond = b.region(|r| {
                let v = r.argument(Type::f32(&[]));
                vec![r.compare(ComparisonDirection::Gt, v, v)]
            });
            let body = b.region(|r| {
                let v = r.argument(Type::f32(&[]));
                vec![v, v]
            });
            vec![b.op1(OpKind::While { cond, body }, &[x], Type::f32(&[]))]
        });
        let err = lower(main).unwrap_err();
        assert_eq!(err.class(), crate::ErrorClass::StructuralReference);
        assert!(err.to_string().contains("while body results"));
    }

    #[test]
    fn conditional_branches() {
        let main = FunctionBuilder::new("main").build(|b| {
            let p = b.argument(Type::pred(&[]));
            let x = b.argument(Type::f32(&[]));
            let t = b.region(|r| {
                let v = r.argument(Type::f32(&[]));
                vec![r.unary(UnaryOp::Exp, v)]
            });
            let f = b.region(|r| vec![r.argument(Type::f32(&[]))]);
            vec![b.op1(
                OpKind::If {
                    true_branch: t,
                    false_branch: f,
                },
                &[p, x],
                Type::f32(&[]),
            )]
        });
        let (program, comp) = lower(main).unwrap();
        let cond = comp.root().unwrap();
        assert_eq!(cond.opcode, Opcode::Conditional);
        assert_eq!(cond.operand_ids.len(), 3);
        assert_eq!(cond.operand_ids[0], InstrId(0));
        assert_eq!(cond.operand_ids[1], cond.operand_ids[2]);
        let t = program.computation(cond.called_computation_ids[0]).unwrap();
        assert!(t.parameters()[0].shape.is_tuple());
        assert_eq!(t.root().unwrap().opcode, Opcode::Exponential);
        let f = program.computation(cond.called_computation_ids[1]).unwrap();
        assert_eq!(f.name, "main.if.1");
        assert_eq!(f.root().unwrap().opcode, Opcode::GetTupleElement);
    }

    #[test]
    fn missing_callee() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[]));
            b.call("nowhere", &[x], vec![Type::f32(&[])])
        });
        let err = lower(main).unwrap_err();
        assert_eq!(err.class(), crate::ErrorClass::MissingCallee);
        assert!(matches!(
            err.root_cause(),
            LowerError::MissingCallee { callee, .. } if callee == "nowhere"
        ));
    }

    #[test]
    fn call_arity_is_checked() {
        let helper = FunctionBuilder::new("helper").build(|b| vec![b.argument(Type::f32(&[]))]);
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[]));
            b.call("helper", &[x, x], vec![Type::f32(&[])])
        });
        let module = module_with(vec![helper, main]);
        let err = lower_main(&module, &ConversionOptions::default()).unwrap_err();
        assert!(matches!(err.root_cause(), LowerError::ArityMismatch { .. }));
    }

    #[test]
    fn wrong_input_count() {
        let main = FunctionBuilder::new("main").build(|b| vec![b.argument(Type::f32(&[]))]);
        let module = module_with(vec![main]);
        let mut program = ProgramBuilder::new("p");
        let mut comp = ComputationBuilder::new("main");
        let err = convert_block(
            &module,
            &module.entry().unwrap().body,
            &mut program,
            &mut comp,
            &[],
            &ConversionOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LowerError::ArityMismatch {
                expected: 1,
                found: 0,
                ..
            }
        ));
    }

    #[test]
    fn attribute_errors_carry_op_context() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[4]));
            let y = b.op1(
                OpKind::Fft {
                    fft_type: "DCT".into(),
                    fft_length: vec![4],
                },
                &[x],
                Type::f32(&[4]),
            );
            b.locate(Location::new("fft.py", 7, 1));
            vec![y]
        });
        let err = lower(main).unwrap_err();
        assert_eq!(err.class(), crate::ErrorClass::MalformedAttribute);
        assert_eq!(
            err.to_string(),
            "in fft at fft.py:7:1: unsupported value `DCT` for attribute `fft_type`"
        );
    }

    #[test]
    fn collectives() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[4]));
            let permuted = b.op1(
                OpKind::CollectivePermute {
                    source_target_pairs: Some(DenseIntElements::from_rows(&[
                        vec![0, 1],
                        vec![1, 0],
                    ])),
                    channel_id: Some(3),
                },
                &[x],
                Type::f32(&[4]),
            );
            vec![b.op1(
                OpKind::AllGather {
                    all_gather_dimension: 0,
                    replica_groups: DenseIntElements::from_rows(&[vec![1, 0]]),
                    channel_id: None,
                },
                &[permuted],
                Type::f32(&[8]),
            )]
        });
        let (_, comp) = lower(main).unwrap();
        let gather = comp.root().unwrap();
        assert_eq!(gather.opcode, Opcode::AllGather);
        assert_eq!(gather.attrs.dimensions, vec![0]);
        assert_eq!(gather.attrs.replica_groups[0].replica_ids, vec![1, 0]);
        let permute = operand(&comp, gather, 0);
        assert_eq!(permute.attrs.source_target_pairs, vec![(0, 1), (1, 0)]);
        assert_eq!(permute.attrs.channel_id, Some(3));
    }

    #[test]
    fn custom_call_layouts() {
        let mut call = CustomCallAttrs::new("kernel");
        call.operand_layouts = Some(vec![Attribute::ints(&[0, 1])]);
        call.result_layouts = Some(vec![Attribute::ints(&[0, 1])]);
        call.schedule = "SCHEDULE_EARLIEST".into();
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[2, 3]));
            vec![b.op1(OpKind::CustomCall(Box::new(call)), &[x], Type::f32(&[3, 2]))]
        });
        let (_, comp) = lower(main).unwrap();
        let instr = comp.root().unwrap();
        assert_eq!(instr.attrs.custom_call_target, "kernel");
        assert_eq!(
            instr.attrs.custom_call_schedule,
            Some(hlx_program::attrs::CustomCallSchedule::Earliest)
        );
        assert_eq!(
            instr.attrs.operand_shapes_with_layout[0].layout,
            Some(Layout::new(vec![0, 1]))
        );
        assert_eq!(instr.shape.layout, Some(Layout::new(vec![0, 1])));
        assert_eq!(instr.shape.element_type, PrimitiveType::F32);
    }

    #[test]
    fn constants_and_iota() {
        let main = FunctionBuilder::new("main").build(|b| {
            let c = b.constant(
                Type::tensor(ElementType::I32, &[3]),
                ElementsData::Int(vec![7]),
            );
            let i = b.op1(OpKind::Iota { dimension: 0 }, &[], Type::i32(&[3]));
            vec![b.binary(BinaryOp::Add, c, i)]
        });
        let (_, comp) = lower(main).unwrap();
        let add = comp.root().unwrap();
        assert_eq!(add.opcode, Opcode::Add);
        let constant = operand(&comp, add, 0);
        assert_eq!(
            constant.attrs.literal,
            Some(hlx_program::Literal::Int(vec![7, 7, 7]))
        );
        assert_eq!(operand(&comp, add, 1).attrs.dimensions, vec![0]);

        let bad = FunctionBuilder::new("main").build(|b| {
            vec![b.op1(OpKind::Iota { dimension: 1 }, &[], Type::i32(&[3]))]
        });
        let err = lower(bad).unwrap_err();
        assert!(matches!(err.root_cause(), LowerError::MalformedAttribute { .. }));
    }

    #[test]
    fn dot_of_high_rank_is_unsupported() {
        let main = FunctionBuilder::new("main").build(|b| {
            let x = b.argument(Type::f32(&[2, 2, 2]));
            vec![b.op1(OpKind::Dot, &[x, x], Type::f32(&[2, 2, 2, 2]))]
        });
        let err = lower(main).unwrap_err();
        assert_eq!(err.class(), crate::ErrorClass::UnsupportedConstruct);
    }
    /// One op kind lowered on its own: the opcode it becomes and how many
    /// operands that instruction takes.
    struct OpCase {
        name: &'static str,
        opcode: Opcode,
        operands: usize,
        build: fn(&mut BlockBuilder<'_>) -> Vec<ValueId>,
    }

    fn scalar_add(r: &mut BlockBuilder<'_>) -> Vec<ValueId> {
        let a = r.argument(Type::f32(&[]));
        let c = r.argument(Type::f32(&[]));
        vec![r.binary(BinaryOp::Add, a, c)]
    }

    fn op_cases() -> Vec<OpCase> {
        vec![
            OpCase {
                name: "constant",
                opcode: Opcode::Constant,
                operands: 0,
                build: |b| vec![b.constant(Type::f32(&[2]), ElementsData::Float(vec![1.0, 2.0]))],
            },
            OpCase {
                name: "iota",
                opcode: Opcode::Iota,
                operands: 0,
                build: |b| vec![b.op1(OpKind::Iota { dimension: 0 }, &[], Type::i32(&[4]))],
            },
            OpCase {
                name: "unary",
                opcode: Opcode::Exponential,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    vec![b.unary(UnaryOp::Exp, x)]
                },
            },
            OpCase {
                name: "binary",
                opcode: Opcode::ShiftRightLogical,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::i32(&[4]));
                    vec![b.binary(BinaryOp::ShiftRightLogical, x, x)]
                },
            },
            OpCase {
                name: "compare",
                opcode: Opcode::Compare,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    vec![b.compare(ComparisonDirection::Ge, x, x)]
                },
            },
            OpCase {
                name: "select",
                opcode: Opcode::Select,
                operands: 3,
                build: |b| {
                    let p = b.argument(Type::pred(&[4]));
                    let x = b.argument(Type::f32(&[4]));
                    vec![b.op1(OpKind::Select, &[p, x, x], Type::f32(&[4]))]
                },
            },
            OpCase {
                name: "clamp",
                opcode: Opcode::Clamp,
                operands: 3,
                build: |b| {
                    let lo = b.argument(Type::f32(&[]));
                    let x = b.argument(Type::f32(&[4]));
                    vec![b.op1(OpKind::Clamp, &[lo, x, lo], Type::f32(&[4]))]
                },
            },
            OpCase {
                name: "convert",
                opcode: Opcode::Convert,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    vec![b.op1(OpKind::Convert, &[x], Type::i32(&[4]))]
                },
            },
            OpCase {
                name: "bitcast_convert",
                opcode: Opcode::BitcastConvert,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    vec![b.op1(OpKind::BitcastConvert, &[x], Type::i32(&[4]))]
                },
            },
            OpCase {
                name: "bitcast",
                opcode: Opcode::Bitcast,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[2, 3]));
                    vec![b.op1(OpKind::Bitcast, &[x], Type::f32(&[3, 2]))]
                },
            },
            OpCase {
                name: "reshape",
                opcode: Opcode::Reshape,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[6]));
                    vec![b.op1(OpKind::Reshape, &[x], Type::f32(&[2, 3]))]
                },
            },
            OpCase {
                name: "broadcast_in_dim",
                opcode: Opcode::Broadcast,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[3]));
                    let kind = OpKind::BroadcastInDim {
                        broadcast_dimensions: vec![1],
                    };
                    vec![b.op1(kind, &[x], Type::f32(&[2, 3]))]
                },
            },
            OpCase {
                name: "transpose",
                opcode: Opcode::Transpose,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[2, 3]));
                    let kind = OpKind::Transpose {
                        permutation: vec![1, 0],
                    };
                    vec![b.op1(kind, &[x], Type::f32(&[3, 2]))]
                },
            },
            OpCase {
                name: "reverse",
                opcode: Opcode::Reverse,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    let kind = OpKind::Reverse {
                        dimensions: vec![0],
                    };
                    vec![b.op1(kind, &[x], Type::f32(&[4]))]
                },
            },
            OpCase {
                name: "slice",
                opcode: Opcode::Slice,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[8]));
                    let kind = OpKind::Slice {
                        start_indices: vec![1],
                        limit_indices: vec![7],
                        strides: vec![2],
                    };
                    vec![b.op1(kind, &[x], Type::f32(&[3]))]
                },
            },
            OpCase {
                name: "dynamic_slice",
                opcode: Opcode::DynamicSlice,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[8]));
                    let i = b.argument(Type::i32(&[]));
                    let kind = OpKind::DynamicSlice {
                        slice_sizes: vec![2],
                    };
                    vec![b.op1(kind, &[x, i], Type::f32(&[2]))]
                },
            },
            OpCase {
                name: "dynamic_update_slice",
                opcode: Opcode::DynamicUpdateSlice,
                operands: 3,
                build: |b| {
                    let x = b.argument(Type::f32(&[8]));
                    let u = b.argument(Type::f32(&[2]));
                    let i = b.argument(Type::i32(&[]));
                    vec![b.op1(OpKind::DynamicUpdateSlice, &[x, u, i], Type::f32(&[8]))]
                },
            },
            OpCase {
                name: "concatenate",
                opcode: Opcode::Concatenate,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[2]));
                    let y = b.argument(Type::f32(&[3]));
                    let kind = OpKind::Concatenate { dimension: 0 };
                    vec![b.op1(kind, &[x, y], Type::f32(&[5]))]
                },
            },
            OpCase {
                name: "pad",
                opcode: Opcode::Pad,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[2]));
                    let zero = b.constant(Type::f32(&[]), ElementsData::Float(vec![0.0]));
                    let kind = OpKind::Pad {
                        edge_padding_low: vec![1],
                        edge_padding_high: vec![2],
                        interior_padding: vec![1],
                    };
                    vec![b.op1(kind, &[x, zero], Type::f32(&[6]))]
                },
            },
            OpCase {
                name: "tuple",
                opcode: Opcode::Tuple,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[]));
                    let y = b.argument(Type::i32(&[]));
                    vec![b.tuple(&[x, y])]
                },
            },
            OpCase {
                name: "get_tuple_element",
                opcode: Opcode::GetTupleElement,
                operands: 1,
                build: |b| {
                    let t = b.argument(Type::tuple(vec![Type::f32(&[]), Type::i32(&[])]));
                    vec![b.get_tuple_element(t, 1)]
                },
            },
            OpCase {
                name: "dot",
                opcode: Opcode::Dot,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[2, 3]));
                    let y = b.argument(Type::f32(&[3]));
                    vec![b.op1(OpKind::Dot, &[x, y], Type::f32(&[2]))]
                },
            },
            OpCase {
                name: "dot_general",
                opcode: Opcode::Dot,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[4, 2, 3]));
                    let y = b.argument(Type::f32(&[4, 3, 5]));
                    let kind = OpKind::DotGeneral {
                        dimension_numbers: DotDimensionNumbers {
                            lhs_batching_dimensions: vec![0],
                            rhs_batching_dimensions: vec![0],
                            lhs_contracting_dimensions: vec![2],
                            rhs_contracting_dimensions: vec![1],
                        },
                    };
                    vec![b.op1(kind, &[x, y], Type::f32(&[4, 2, 5]))]
                },
            },
            OpCase {
                name: "convolution",
                opcode: Opcode::Convolution,
                operands: 2,
                build: |b| {
                    let input = b.argument(Type::f32(&[1, 4, 4, 1]));
                    let kernel = b.argument(Type::f32(&[2, 2, 1, 1]));
                    let kind = OpKind::Convolution(Box::new(ConvolutionAttrs {
                        window_strides: None,
                        padding: None,
                        lhs_dilation: None,
                        rhs_dilation: None,
                        dimension_numbers: ConvDimensionNumbers {
                            input_batch_dimension: 0,
                            input_feature_dimension: 3,
                            input_spatial_dimensions: vec![1, 2],
                            kernel_input_feature_dimension: 2,
                            kernel_output_feature_dimension: 3,
                            kernel_spatial_dimensions: vec![0, 1],
                            output_batch_dimension: 0,
                            output_feature_dimension: 3,
                            output_spatial_dimensions: vec![1, 2],
                        },
                        feature_group_count: 1,
                        batch_group_count: 1,
                    }));
                    vec![b.op1(kind, &[input, kernel], Type::f32(&[1, 3, 3, 1]))]
                },
            },
            OpCase {
                name: "fft",
                opcode: Opcode::Fft,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::tensor(ElementType::Complex64, &[8]));
                    let kind = OpKind::Fft {
                        fft_type: "IFFT".into(),
                        fft_length: vec![8],
                    };
                    vec![b.op1(kind, &[x], Type::tensor(ElementType::Complex64, &[8]))]
                },
            },
            OpCase {
                name: "triangular_solve",
                opcode: Opcode::TriangularSolve,
                operands: 2,
                build: |b| {
                    let a = b.argument(Type::f32(&[3, 3]));
                    let rhs = b.argument(Type::f32(&[3, 1]));
                    let kind = OpKind::TriangularSolve {
                        left_side: true,
                        lower: true,
                        unit_diagonal: false,
                        transpose_a: "TRANSPOSE".into(),
                    };
                    vec![b.op1(kind, &[a, rhs], Type::f32(&[3, 1]))]
                },
            },
            OpCase {
                name: "reduce",
                opcode: Opcode::Reduce,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    let init = b.argument(Type::f32(&[]));
                    let body = b.region(scalar_add);
                    let kind = OpKind::Reduce {
                        dimensions: vec![0],
                        body,
                    };
                    vec![b.op1(kind, &[x, init], Type::f32(&[]))]
                },
            },
            OpCase {
                name: "sort",
                opcode: Opcode::Sort,
                operands: 2,
                build: |b| {
                    let keys = b.argument(Type::f32(&[4]));
                    let values = b.argument(Type::i32(&[4]));
                    let comparator = b.region(|r| {
                        let lhs = r.argument(Type::f32(&[]));
                        let rhs = r.argument(Type::f32(&[]));
                        let _ = r.argument(Type::i32(&[]));
                        let _ = r.argument(Type::i32(&[]));
                        vec![r.compare(ComparisonDirection::Lt, lhs, rhs)]
                    });
                    let kind = OpKind::Sort {
                        dimension: 0,
                        is_stable: true,
                        comparator,
                    };
                    b.op(kind, &[keys, values], vec![Type::f32(&[4]), Type::i32(&[4])])
                },
            },
            OpCase {
                name: "while",
                opcode: Opcode::While,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[]));
                    let cond = b.region(|r| {
                        let v = r.argument(Type::f32(&[]));
                        vec![r.compare(ComparisonDirection::Lt, v, v)]
                    });
                    let body = b.region(|r| vec![r.argument(Type::f32(&[]))]);
                    vec![b.op1(OpKind::While { cond, body }, &[x], Type::f32(&[]))]
                },
            },
            OpCase {
                name: "if",
                opcode: Opcode::Conditional,
                operands: 3,
                build: |b| {
                    let p = b.argument(Type::pred(&[]));
                    let x = b.argument(Type::f32(&[]));
                    let true_branch = b.region(|r| vec![r.argument(Type::f32(&[]))]);
                    let false_branch = b.region(|r| {
                        let v = r.argument(Type::f32(&[]));
                        vec![r.unary(UnaryOp::Negate, v)]
                    });
                    let kind = OpKind::If {
                        true_branch,
                        false_branch,
                    };
                    vec![b.op1(kind, &[p, x], Type::f32(&[]))]
                },
            },
            OpCase {
                name: "all_reduce",
                opcode: Opcode::AllReduce,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    let reducer = b.region(scalar_add);
                    let kind = OpKind::AllReduce {
                        replica_groups: DenseIntElements::from_rows(&[vec![0, 1]]),
                        channel_id: Some(1),
                        reducer,
                    };
                    vec![b.op1(kind, &[x], Type::f32(&[4]))]
                },
            },
            OpCase {
                name: "all_gather",
                opcode: Opcode::AllGather,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    let kind = OpKind::AllGather {
                        all_gather_dimension: 0,
                        replica_groups: DenseIntElements::from_rows(&[vec![0, 1]]),
                        channel_id: None,
                    };
                    vec![b.op1(kind, &[x], Type::f32(&[8]))]
                },
            },
            OpCase {
                name: "collective_permute",
                opcode: Opcode::CollectivePermute,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    let kind = OpKind::CollectivePermute {
                        source_target_pairs: None,
                        channel_id: None,
                    };
                    vec![b.op1(kind, &[x], Type::f32(&[4]))]
                },
            },
            OpCase {
                name: "replica_id",
                opcode: Opcode::ReplicaId,
                operands: 0,
                build: |b| vec![b.op1(OpKind::ReplicaId, &[], Type::scalar(ElementType::UI32))],
            },
            OpCase {
                name: "after_all",
                opcode: Opcode::AfterAll,
                operands: 2,
                build: |b| {
                    let t0 = b.argument(Type::token());
                    let t1 = b.argument(Type::token());
                    vec![b.op1(OpKind::AfterAll, &[t0, t1], Type::token())]
                },
            },
            OpCase {
                name: "custom_call",
                opcode: Opcode::CustomCall,
                operands: 1,
                build: |b| {
                    let x = b.argument(Type::f32(&[4]));
                    let kind = OpKind::CustomCall(Box::new(CustomCallAttrs::new("topk")));
                    b.op(kind, &[x], vec![Type::f32(&[2]), Type::i32(&[2])])
                },
            },
            OpCase {
                name: "call",
                opcode: Opcode::Call,
                operands: 2,
                build: |b| {
                    let x = b.argument(Type::f32(&[]));
                    b.call("helper", &[x, x], vec![Type::f32(&[])])
                },
            },
        ]
    }

    #[test]
    fn every_op_kind_keeps_its_arity() {
        let helper = FunctionBuilder::new("helper").build(|b| {
            let x = b.argument(Type::f32(&[]));
            let y = b.argument(Type::f32(&[]));
            vec![b.binary(BinaryOp::Multiply, x, y)]
        });
        for case in op_cases() {
            let main = FunctionBuilder::new("main").build(case.build);
            let results = main.body.returns().len();
            let module = module_with(vec![helper.clone(), main]);
            let (_, comp) = lower_main(&module, &ConversionOptions::default())
                .unwrap_or_else(|e| panic!("{}: {e}", case.name));

            let lowered: Vec<_> = comp
                .instructions
                .iter()
                .filter(|i| i.opcode == case.opcode)
                .collect();
            assert_eq!(lowered.len(), 1, "{}", case.name);
            assert_eq!(lowered[0].operand_ids.len(), case.operands, "{}", case.name);

            let root = comp.root().unwrap();
            if results == 1 {
                assert_eq!(root.opcode, case.opcode, "{}", case.name);
            } else {
                assert_eq!(root.opcode, Opcode::Tuple, "{}", case.name);
                assert_eq!(root.operand_ids.len(), results, "{}", case.name);
                assert_eq!(comp.count(Opcode::GetTupleElement), results, "{}", case.name);
            }
        }
    }

    #[test]
    fn malformed_shape_attributes() {
        let cases: [(&str, fn(&mut BlockBuilder<'_>) -> Vec<ValueId>); 6] = [
            ("broadcast_dimensions", |b| {
                let x = b.argument(Type::f32(&[3]));
                let kind = OpKind::BroadcastInDim {
                    broadcast_dimensions: vec![0, 1],
                };
                vec![b.op1(kind, &[x], Type::f32(&[2, 3]))]
            }),
            ("permutation", |b| {
                let x = b.argument(Type::f32(&[2, 3]));
                let kind = OpKind::Transpose {
                    permutation: vec![1, 1],
                };
                vec![b.op1(kind, &[x], Type::f32(&[3, 2]))]
            }),
            ("slice", |b| {
                let x = b.argument(Type::f32(&[8]));
                let kind = OpKind::Slice {
                    start_indices: vec![0],
                    limit_indices: vec![4, 4],
                    strides: vec![1],
                };
                vec![b.op1(kind, &[x], Type::f32(&[4]))]
            }),
            ("padding", |b| {
                let x = b.argument(Type::f32(&[2]));
                let zero = b.argument(Type::f32(&[]));
                let kind = OpKind::Pad {
                    edge_padding_low: vec![1],
                    edge_padding_high: vec![1],
                    interior_padding: vec![],
                };
                vec![b.op1(kind, &[x, zero], Type::f32(&[4]))]
            }),
            ("index", |b| {
                let t = b.argument(Type::tuple(vec![Type::f32(&[])]));
                vec![b.op1(OpKind::GetTupleElement { index: 1 }, &[t], Type::f32(&[]))]
            }),
            ("index", |b| {
                let x = b.argument(Type::f32(&[]));
                vec![b.op1(OpKind::GetTupleElement { index: 0 }, &[x], Type::f32(&[]))]
            }),
        ];
        for (attribute, build) in cases {
            let err = lower(FunctionBuilder::new("main").build(build)).unwrap_err();
            assert!(
                matches!(err.root_cause(), LowerError::MalformedAttribute { name, .. } if name == attribute),
                "{attribute}: {err}"
            );
        }
    }

    #[test]
    fn missing_result_types_are_an_arity_error() {
        for kind in [
            OpKind::Constant {
                value: ElementsData::Float(vec![0.0]),
            },
            OpKind::Iota { dimension: 0 },
        ] {
            let mut main = FunctionBuilder::new("main")
                .build(|b| vec![b.op1(kind, &[], Type::f32(&[2]))]);
            main.body.operations[0].result_types.clear();
            let err = lower(main).unwrap_err();
            assert!(
                matches!(err.root_cause(), LowerError::ArityMismatch { .. }),
                "{err}"
            );
        }
    }
}
