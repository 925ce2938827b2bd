//! `hlx inspect`: verify and print a binary program container.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use hlx_program::wire::REVISION;
use hlx_program::ProgramFile;

/// What `hlx inspect` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Export {
    /// Summary line followed by the program as text.
    Text,
    /// Container header and section table as JSON.
    Json,
}

pub fn run(input: &Path, export: Export) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let file =
        ProgramFile::from_bytes(&bytes).with_context(|| format!("parsing {}", input.display()))?;

    match export {
        Export::Text => {
            println!("{}", summary(&file));
            print!("{}", file.program);
        }
        Export::Json => println!("{}", serde_json::to_string_pretty(&header(&file))?),
    }
    Ok(())
}

/// One-line header description, printed as a comment above the program.
pub fn summary(file: &ProgramFile) -> String {
    format!(
        "// hlxp r{REVISION}: {} computations, {} instructions [{}]",
        file.sections.len(),
        file.program.instruction_count(),
        file.features.names().join(", ")
    )
}

fn header(file: &ProgramFile) -> serde_json::Value {
    let entry = file.program.entry().map(|c| c.name.as_str());
    serde_json::json!({
        "name": file.program.name,
        "revision": REVISION,
        "features": file.features.names(),
        "entry": entry,
        "sections": file
            .sections
            .iter()
            .map(|s| serde_json::json!({
                "name": s.name,
                "instructions": s.instructions,
                "sha256": s.digest_hex(),
            }))
            .collect::<Vec<_>>(),
    })
}
