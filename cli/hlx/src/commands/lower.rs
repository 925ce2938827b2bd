//! `hlx lower`: convert a JSON op module into a program.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use hlx_ir::Module;
use hlx_lower::{convert_module, ConversionOptions};
use hlx_program::{Program, ProgramFile};
use log::info;

/// Output encoding of a lowered program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Emit {
    /// Program as pretty-printed JSON.
    Json,
    /// HLO-style text.
    Text,
    /// Hashed binary container (`.hlxp`).
    Binary,
}

pub fn run(
    input: &Path,
    config: Option<&Path>,
    tuple_args: bool,
    return_tuple: bool,
    emit: Emit,
    output: Option<&Path>,
) -> Result<()> {
    let module = load_module(input)?;
    let options = match config {
        Some(path) => load_options(path)?,
        None => ConversionOptions::default(),
    };
    info!(
        "lowering module `{}` ({} functions)",
        module.name,
        module.functions().len()
    );

    let program = convert_module(&module, tuple_args, return_tuple, &options)
        .with_context(|| format!("lowering {}", input.display()))?;
    info!(
        "{} computations, {} instructions",
        program.computations.len(),
        program.instruction_count()
    );
    let bytes = render(program, emit)?;

    match output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {} ({} bytes)", path.display(), bytes.len());
        }
        None if emit == Emit::Binary => {
            bail!("binary output needs --output <file>")
        }
        None => io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

pub fn load_module(path: &Path) -> Result<Module> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Module::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn load_options(path: &Path) -> Result<ConversionOptions> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    ConversionOptions::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Encode `program` in the requested form.
pub fn render(program: Program, emit: Emit) -> Result<Vec<u8>> {
    Ok(match emit {
        Emit::Json => program.to_json()?.into_bytes(),
        Emit::Text => program.to_string().into_bytes(),
        Emit::Binary => ProgramFile::new(program)?.to_bytes()?,
    })
}
