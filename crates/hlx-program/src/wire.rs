//! Binary program container (`.hlxp`).
//!
//! Each computation is stored as its own section with a SHA-256 digest, so a
//! reader can list a program's computations from the section table and name
//! the one that is damaged without trusting the rest of the file.
//!
//! ```text
//! "HLXP" | revision: u16 | features: u16 | sections: u32 | entry section: u32
//! program name
//! section table, one row per computation in program order:
//!     name | instructions: u32 | payload length: u64 | SHA-256 of payload
//! payloads: one JSON-encoded computation per row, in table order
//! ```
//!
//! Integers are little-endian; strings are a `u32` byte length followed by
//! UTF-8.

use std::io::{self, Write};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::program::{Computation, Program};

/// Magic bytes identifying a program container.
pub const MAGIC: [u8; 4] = *b"HLXP";

/// Layout revision written by this crate; readers accept only this one.
pub const REVISION: u16 = 1;

/// Errors reading or writing a program container.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("not a program container (bad magic bytes)")]
    InvalidMagic,

    #[error("container revision {0} is not supported (expected {REVISION})")]
    UnsupportedRevision(u16),

    #[error("container uses unknown feature bits {0:#06x}")]
    UnknownFeatures(u16),

    #[error("container is truncated")]
    Truncated,

    #[error("{0} trailing bytes after the last section")]
    TrailingBytes(usize),

    #[error("section `{name}` is corrupted: digest mismatch")]
    CorruptSection { name: String },

    #[error("section `{name}`: {message}")]
    InvalidSection { name: String, message: String },

    #[error("entry section {entry} is out of range for {sections} sections")]
    BadEntry { entry: u64, sections: usize },

    #[error("{0} does not fit the container format")]
    TooLarge(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What a program uses beyond bare instructions. Recorded in the header so
/// tools can report it without decoding any section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub sharding: bool,
    pub metadata: bool,
    pub backend_config: bool,
}

impl Features {
    const SHARDING: u16 = 0x1;
    const METADATA: u16 = 0x2;
    const BACKEND_CONFIG: u16 = 0x4;

    pub fn of(program: &Program) -> Self {
        let mut features = Features::default();
        for instr in program.computations.iter().flat_map(|c| &c.instructions) {
            features.sharding |= instr.attrs.sharding.is_some();
            features.metadata |= instr.attrs.metadata.is_some();
            features.backend_config |= !instr.attrs.backend_config.is_empty();
        }
        features
    }

    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.sharding, "sharding"),
            (self.metadata, "metadata"),
            (self.backend_config, "backend-config"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }

    fn bits(&self) -> u16 {
        let mut bits = 0;
        if self.sharding {
            bits |= Self::SHARDING;
        }
        if self.metadata {
            bits |= Self::METADATA;
        }
        if self.backend_config {
            bits |= Self::BACKEND_CONFIG;
        }
        bits
    }

    fn from_bits(bits: u16) -> Result<Self, WireError> {
        let unknown = bits & !(Self::SHARDING | Self::METADATA | Self::BACKEND_CONFIG);
        if unknown != 0 {
            return Err(WireError::UnknownFeatures(unknown));
        }
        Ok(Self {
            sharding: bits & Self::SHARDING != 0,
            metadata: bits & Self::METADATA != 0,
            backend_config: bits & Self::BACKEND_CONFIG != 0,
        })
    }
}

/// Section table row for one computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub instructions: u32,
    pub digest: [u8; 32],
}

impl Section {
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A program with its section table, ready to write or as read back.
#[derive(Debug)]
pub struct ProgramFile {
    pub features: Features,
    pub sections: Vec<Section>,
    pub program: Program,
    payloads: Vec<Vec<u8>>,
}

impl ProgramFile {
    /// Encode every computation of `program` into its section.
    pub fn new(program: Program) -> Result<Self, WireError> {
        let mut sections = Vec::with_capacity(program.computations.len());
        let mut payloads = Vec::with_capacity(program.computations.len());
        for computation in &program.computations {
            let payload = serde_json::to_vec(computation)?;
            sections.push(Section {
                name: computation.name.clone(),
                instructions: to_u32(computation.instructions.len(), "instruction count")?,
                digest: Sha256::digest(&payload).into(),
            });
            payloads.push(payload);
        }
        Ok(Self {
            features: Features::of(&program),
            sections,
            program,
            payloads,
        })
    }

    /// Position of the entry computation in the section table.
    pub fn entry_section(&self) -> Result<usize, WireError> {
        let id = self.program.entry_computation_id;
        self.program
            .computations
            .iter()
            .position(|c| c.id == id)
            .ok_or(WireError::BadEntry {
                entry: id.0 as u64,
                sections: self.sections.len(),
            })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), WireError> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&REVISION.to_le_bytes())?;
        writer.write_all(&self.features.bits().to_le_bytes())?;
        writer.write_all(&to_u32(self.sections.len(), "section count")?.to_le_bytes())?;
        writer.write_all(&to_u32(self.entry_section()?, "entry section")?.to_le_bytes())?;
        write_str(writer, &self.program.name)?;
        for (section, payload) in self.sections.iter().zip(&self.payloads) {
            write_str(writer, &section.name)?;
            writer.write_all(&section.instructions.to_le_bytes())?;
            writer.write_all(&(payload.len() as u64).to_le_bytes())?;
            writer.write_all(&section.digest)?;
        }
        for payload in &self.payloads {
            writer.write_all(payload)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Parse a container, checking every section against its digest and
    /// its table row.
    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        let mut input = Input { data, pos: 0 };
        if input.take(MAGIC.len())? != MAGIC {
            return Err(WireError::InvalidMagic);
        }
        let revision = input.u16()?;
        if revision != REVISION {
            return Err(WireError::UnsupportedRevision(revision));
        }
        let features = Features::from_bits(input.u16()?)?;
        let count = input.u32()?;
        let entry = input.u32()?;
        let name = input.string()?;

        let mut rows = Vec::new();
        for _ in 0..count {
            let name = input.string()?;
            let instructions = input.u32()?;
            let len = usize::try_from(input.u64()?).map_err(|_| WireError::Truncated)?;
            let mut digest = [0u8; 32];
            digest.copy_from_slice(input.take(32)?);
            rows.push((
                Section {
                    name,
                    instructions,
                    digest,
                },
                len,
            ));
        }

        let mut sections = Vec::with_capacity(rows.len());
        let mut payloads = Vec::with_capacity(rows.len());
        let mut computations = Vec::with_capacity(rows.len());
        for (section, len) in rows {
            let payload = input.take(len)?;
            let digest: [u8; 32] = Sha256::digest(payload).into();
            if digest != section.digest {
                return Err(WireError::CorruptSection { name: section.name });
            }
            computations.push(decode_section(&section, payload)?);
            payloads.push(payload.to_vec());
            sections.push(section);
        }
        if input.remaining() > 0 {
            return Err(WireError::TrailingBytes(input.remaining()));
        }

        let entry_id = computations
            .get(entry as usize)
            .map(|c| c.id)
            .ok_or(WireError::BadEntry {
                entry: u64::from(entry),
                sections: computations.len(),
            })?;
        Ok(Self {
            features,
            sections,
            program: Program {
                name,
                entry_computation_id: entry_id,
                computations,
            },
            payloads,
        })
    }
}

fn decode_section(section: &Section, payload: &[u8]) -> Result<Computation, WireError> {
    let invalid = |message: String| WireError::InvalidSection {
        name: section.name.clone(),
        message,
    };
    let computation: Computation =
        serde_json::from_slice(payload).map_err(|e| invalid(e.to_string()))?;
    if computation.name != section.name {
        return Err(invalid(format!("holds computation `{}`", computation.name)));
    }
    if computation.instructions.len() != section.instructions as usize {
        return Err(invalid(format!(
            "{} instructions, table says {}",
            computation.instructions.len(),
            section.instructions
        )));
    }
    Ok(computation)
}

fn to_u32(n: usize, what: &'static str) -> Result<u32, WireError> {
    u32::try_from(n).map_err(|_| WireError::TooLarge(what))
}

fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<(), WireError> {
    writer.write_all(&to_u32(s.len(), "string")?.to_le_bytes())?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// Bounds-checked cursor over container bytes.
struct Input<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(n).ok_or(WireError::Truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or(WireError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String, WireError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidSection {
            name: String::from("<table>"),
            message: "name is not UTF-8".into(),
        })
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}
