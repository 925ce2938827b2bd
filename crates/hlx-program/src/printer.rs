//! Human-readable text form of a program.
//!
//! ```text
//! HloModule demo
//!
//! ENTRY %main (x: f32[4], y: f32[4]) -> f32[4] {
//!   %x = f32[4]{0} parameter(0)
//!   %y = f32[4]{0} parameter(1)
//!   ROOT %add.2 = f32[4]{0} add(%x, %y)
//! }
//! ```

use std::fmt::{self, Write as _};

use crate::instruction::{Instruction, Literal, Opcode};
use crate::program::{Computation, Program};

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HloModule {}", self.name)?;
        for computation in &self.computations {
            writeln!(f)?;
            let entry = computation.id == self.entry_computation_id;
            write_computation(f, self, computation, entry)?;
        }
        Ok(())
    }
}

fn write_computation(
    f: &mut fmt::Formatter<'_>,
    program: &Program,
    computation: &Computation,
    entry: bool,
) -> fmt::Result {
    if entry {
        write!(f, "ENTRY ")?;
    }
    write!(f, "%{} (", computation.name)?;
    let shape = &computation.program_shape;
    for (i, (name, param)) in shape
        .parameter_names
        .iter()
        .zip(&shape.parameters)
        .enumerate()
    {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{name}: {param}")?;
    }
    writeln!(f, ") -> {} {{", shape.result)?;
    for instr in &computation.instructions {
        let root = if instr.id == computation.root_id {
            "ROOT "
        } else {
            ""
        };
        writeln!(f, "  {root}{}", InstructionLine { program, computation, instr })?;
    }
    writeln!(f, "}}")
}

struct InstructionLine<'a> {
    program: &'a Program,
    computation: &'a Computation,
    instr: &'a Instruction,
}

impl InstructionLine<'_> {
    fn operand_name(&self, index: usize) -> String {
        let id = self.instr.operand_ids[index];
        self.computation
            .instruction(id)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn computation_name(&self, index: usize) -> String {
        let id = self.instr.called_computation_ids[index];
        self.program
            .computation(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn called(&self) -> String {
        let names: Vec<String> = (0..self.instr.called_computation_ids.len())
            .map(|i| format!("%{}", self.computation_name(i)))
            .collect();
        match (self.instr.opcode, names.as_slice()) {
            (_, []) => String::new(),
            (Opcode::While, [cond, body]) => format!(", condition={cond}, body={body}"),
            (Opcode::Conditional, [t, e]) => {
                format!(", true_computation={t}, false_computation={e}")
            }
            (Opcode::Reduce | Opcode::Sort | Opcode::AllReduce | Opcode::Call, [one]) => {
                format!(", to_apply={one}")
            }
            (_, many) => format!(", calls={{{}}}", many.join(", ")),
        }
    }

    fn attributes(&self) -> String {
        let attrs = &self.instr.attrs;
        let mut out = String::new();
        // `write!` into a String cannot fail.
        if let Some(index) = attrs.tuple_index {
            let _ = write!(out, ", index={index}");
        }
        if !attrs.dimensions.is_empty() {
            let _ = write!(out, ", dimensions={{{}}}", join(&attrs.dimensions));
        }
        if let Some(direction) = attrs.comparison_direction {
            let _ = write!(out, ", direction={}", direction.as_str());
        }
        if !attrs.slice_dimensions.is_empty() {
            let parts: Vec<String> = attrs
                .slice_dimensions
                .iter()
                .map(|d| format!("[{}:{}:{}]", d.start, d.limit, d.stride))
                .collect();
            let _ = write!(out, ", slice={{{}}}", parts.join(", "));
        }
        if !attrs.dynamic_slice_sizes.is_empty() {
            let _ = write!(
                out,
                ", dynamic_slice_sizes={{{}}}",
                join(&attrs.dynamic_slice_sizes)
            );
        }
        if !attrs.padding_config.is_empty() {
            let parts: Vec<String> = attrs
                .padding_config
                .iter()
                .map(|p| {
                    format!(
                        "{}_{}_{}",
                        p.edge_padding_low, p.edge_padding_high, p.interior_padding
                    )
                })
                .collect();
            let _ = write!(out, ", padding={}", parts.join("x"));
        }
        if let Some(fft_type) = attrs.fft_type {
            let _ = write!(out, ", fft_type={}", fft_type.as_str());
        }
        if !attrs.fft_length.is_empty() {
            let _ = write!(out, ", fft_length={{{}}}", join(&attrs.fft_length));
        }
        if let Some(options) = &attrs.triangular_solve_options {
            let _ = write!(
                out,
                ", left_side={}, lower={}, unit_diagonal={}, transpose_a={}",
                options.left_side,
                options.lower,
                options.unit_diagonal,
                options.transpose_a.as_str()
            );
        }
        if attrs.is_stable {
            out.push_str(", is_stable=true");
        }
        if !attrs.replica_groups.is_empty() {
            let groups: Vec<String> = attrs
                .replica_groups
                .iter()
                .map(|g| format!("{{{}}}", join(&g.replica_ids)))
                .collect();
            let _ = write!(out, ", replica_groups={{{}}}", groups.join(","));
        }
        if !attrs.source_target_pairs.is_empty() {
            let pairs: Vec<String> = attrs
                .source_target_pairs
                .iter()
                .map(|(s, t)| format!("{{{s},{t}}}"))
                .collect();
            let _ = write!(out, ", source_target_pairs={{{}}}", pairs.join(","));
        }
        if let Some(channel) = attrs.channel_id {
            let _ = write!(out, ", channel_id={channel}");
        }
        if !attrs.custom_call_target.is_empty() {
            let _ = write!(out, ", custom_call_target=\"{}\"", attrs.custom_call_target);
        }
        if attrs.custom_call_has_side_effect {
            out.push_str(", custom_call_has_side_effect=true");
        }
        if let Some(schedule) = attrs.custom_call_schedule {
            let _ = write!(out, ", schedule={}", schedule.as_str());
        }
        if let Some(version) = attrs.custom_call_api_version {
            let _ = write!(out, ", api_version={}", version.as_str());
        }
        if let Some(count) = attrs.feature_group_count.filter(|c| *c != 1) {
            let _ = write!(out, ", feature_group_count={count}");
        }
        if let Some(count) = attrs.batch_group_count.filter(|c| *c != 1) {
            let _ = write!(out, ", batch_group_count={count}");
        }
        if let Some(sharding) = &attrs.sharding {
            let _ = write!(out, ", sharding={sharding}");
        }
        if !attrs.frontend_attributes.is_empty() {
            let entries: Vec<String> = attrs
                .frontend_attributes
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect();
            let _ = write!(out, ", frontend_attributes={{{}}}", entries.join(","));
        }
        if !attrs.backend_config.is_empty() {
            let _ = write!(out, ", backend_config={:?}", attrs.backend_config);
        }
        if let Some(metadata) = &attrs.metadata {
            let _ = write!(
                out,
                ", metadata={{op_type=\"{}\" op_name=\"{}\"",
                metadata.op_type, metadata.op_name
            );
            if !metadata.source_file.is_empty() {
                let _ = write!(out, " source_file=\"{}\"", metadata.source_file);
            }
            if let Some(line) = metadata.source_line {
                let _ = write!(out, " source_line={line}");
            }
            out.push('}');
        }
        out
    }
}

impl fmt::Display for InstructionLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instr = self.instr;
        write!(f, "%{} = {} {}(", instr.name, instr.shape, instr.opcode)?;
        match (&instr.attrs.parameter_number, &instr.attrs.literal) {
            (Some(number), _) => write!(f, "{number}")?,
            (None, Some(literal)) => write!(f, "{}", literal_text(literal))?,
            (None, None) => {
                for i in 0..instr.operand_ids.len() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "%{}", self.operand_name(i))?;
                }
            }
        }
        write!(f, "){}{}", self.called(), self.attributes())
    }
}

fn literal_text(literal: &Literal) -> String {
    let items: Vec<String> = match literal {
        Literal::Pred(v) => v.iter().map(|b| b.to_string()).collect(),
        Literal::Int(v) => v.iter().map(|i| i.to_string()).collect(),
        Literal::Float(v) => v.iter().map(|x| x.to_string()).collect(),
    };
    if items.len() == 1 {
        items.into_iter().next().unwrap_or_default()
    } else {
        format!("{{{}}}", items.join(", "))
    }
}

fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use crate::builder::{ComputationBuilder, ProgramBuilder};
    use crate::instruction::{Instruction, InstructionAttrs, Literal, Opcode};
    use crate::shape::{PrimitiveType, Shape};
    use crate::sharding::OpSharding;

    #[test]
    fn prints_entry_and_callee() {
        let f32 = Shape::scalar(PrimitiveType::F32);
        let mut program = ProgramBuilder::new("demo");

        let mut body = ComputationBuilder::new("double");
        let p = body.parameter(0, f32.clone(), "p").unwrap();
        let twice = body
            .add(Instruction::new(Opcode::Add, f32.clone()), &[p, p])
            .unwrap();
        let callee = program.add_computation(body.build(twice).unwrap()).unwrap();

        let mut main = ComputationBuilder::new("main");
        let x = main.parameter(0, f32.clone(), "x").unwrap();
        let one = main
            .add(
                Instruction::new(Opcode::Constant, f32.clone()).with_attrs(InstructionAttrs {
                    literal: Some(Literal::Float(vec![1.5])),
                    ..Default::default()
                }),
                &[],
            )
            .unwrap();
        let call = main
            .add(
                Instruction::new(Opcode::Call, f32.clone()).with_called(vec![callee]),
                &[x, one],
            )
            .unwrap();
        main.instruction_mut(call).unwrap().attrs.sharding = Some(OpSharding::maximal(0));
        let entry = program.add_computation(main.build(call).unwrap()).unwrap();
        let text = program.finish(entry).unwrap().to_string();

        assert!(text.starts_with("HloModule demo\n"));
        assert!(text.contains("%double (p: f32[]) -> f32[] {"));
        assert!(text.contains("ROOT %add.1 = f32[] add(%p, %p)"));
        assert!(text.contains("ENTRY %main (x: f32[]) -> f32[] {"));
        assert!(text.contains("%constant.1 = f32[] constant(1.5)"));
        assert!(text.contains(
            "ROOT %call.2 = f32[] call(%x, %constant.1), to_apply=%double, sharding={maximal device=0}"
        ));
    }

    #[test]
    fn prints_tuple_index_and_layout() {
        let mut comp = ComputationBuilder::new("main");
        let x = comp
            .parameter(0, Shape::array(PrimitiveType::S32, &[2, 2]), "x")
            .unwrap();
        let t = comp.tuple(&[x]).unwrap();
        let e = comp.get_tuple_element(t, 0).unwrap();
        let mut program = ProgramBuilder::new("m");
        let entry = program.add_computation(comp.build(e).unwrap()).unwrap();
        let text = program.finish(entry).unwrap().to_string();
        assert!(text.contains("%tuple.1 = (s32[2,2]{1,0}) tuple(%x)"));
        assert!(text.contains("ROOT %get-tuple-element.2 = s32[2,2]{1,0} get-tuple-element(%tuple.1), index=0"));
    }
}
