//! Sharding descriptors and their two textual forms.
//!
//! An [`OpSharding`] can be written either in its direct serialized encoding
//! (compact JSON, see [`OpSharding::encode`]) or in the human-readable
//! prettyprinted form produced by `Display`:
//!
//! ```text
//! {replicated}
//! {manual}
//! {maximal device=3}
//! {devices=[2,2]0,1,2,3}
//! {devices=[2,1,2]0,1,2,3 last_tile_dim_replicate}
//! {{replicated}, {maximal device=0}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from decoding or parsing a sharding string.
#[derive(Debug, Error)]
pub enum ShardingError {
    #[error("invalid sharding encoding: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid sharding text at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
}

/// How a value is partitioned across devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardingType {
    /// Every device holds the full value.
    Replicated,
    /// The value lives on a single device.
    Maximal,
    /// One sharding per tuple element.
    Tuple,
    /// Tiled across a device mesh.
    Other,
    /// Partitioned manually by the program.
    Manual,
}

/// A sharding descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpSharding {
    #[serde(rename = "type")]
    pub kind: ShardingType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tile_assignment_dimensions: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tile_assignment_devices: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tuple_shardings: Vec<OpSharding>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replicate_on_last_tile_dim: bool,
}

impl OpSharding {
    fn of_kind(kind: ShardingType) -> Self {
        Self {
            kind,
            tile_assignment_dimensions: Vec::new(),
            tile_assignment_devices: Vec::new(),
            tuple_shardings: Vec::new(),
            replicate_on_last_tile_dim: false,
        }
    }

    pub fn replicated() -> Self {
        Self::of_kind(ShardingType::Replicated)
    }

    pub fn manual() -> Self {
        Self::of_kind(ShardingType::Manual)
    }

    pub fn maximal(device: i64) -> Self {
        Self {
            tile_assignment_dimensions: vec![1],
            tile_assignment_devices: vec![device],
            ..Self::of_kind(ShardingType::Maximal)
        }
    }

    pub fn tiled(dimensions: Vec<i64>, devices: Vec<i64>) -> Self {
        Self {
            tile_assignment_dimensions: dimensions,
            tile_assignment_devices: devices,
            ..Self::of_kind(ShardingType::Other)
        }
    }

    pub fn tuple(elements: Vec<OpSharding>) -> Self {
        Self {
            tuple_shardings: elements,
            ..Self::of_kind(ShardingType::Tuple)
        }
    }

    /// Direct serialized encoding.
    pub fn encode(&self) -> Result<String, ShardingError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the direct serialized encoding.
    pub fn decode(encoded: &str) -> Result<Self, ShardingError> {
        Ok(serde_json::from_str(encoded)?)
    }

    /// Parse the prettyprinted form.
    pub fn parse(text: &str) -> Result<Self, ShardingError> {
        let tokens = lex(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let sharding = parser.parse_sharding()?;
        parser.expect_end()?;
        Ok(sharding)
    }
}

impl fmt::Display for OpSharding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ShardingType::Replicated => write!(f, "{{replicated}}"),
            ShardingType::Manual => write!(f, "{{manual}}"),
            ShardingType::Maximal => {
                let device = self.tile_assignment_devices.first().copied().unwrap_or(0);
                write!(f, "{{maximal device={device}}}")
            }
            ShardingType::Other => {
                write!(f, "{{devices=[{}]", join(&self.tile_assignment_dimensions))?;
                write!(f, "{}", join(&self.tile_assignment_devices))?;
                if self.replicate_on_last_tile_dim {
                    write!(f, " last_tile_dim_replicate")?;
                }
                write!(f, "}}")
            }
            ShardingType::Tuple => {
                write!(f, "{{")?;
                for (i, element) in self.tuple_shardings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

// --- Prettyprint lexer and parser ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Equals,
    Int(i64),
    Ident(String),
    End,
}

impl Token {
    fn description(&self) -> String {
        match self {
            Token::LBrace => "'{'".into(),
            Token::RBrace => "'}'".into(),
            Token::LBracket => "'['".into(),
            Token::RBracket => "']'".into(),
            Token::Comma => "','".into(),
            Token::Equals => "'='".into(),
            Token::Int(v) => format!("integer {v}"),
            Token::Ident(s) => format!("'{s}'"),
            Token::End => "end of input".into(),
        }
    }
}

fn parse_error(offset: usize, message: impl Into<String>) -> ShardingError {
    ShardingError::Parse {
        offset,
        message: message.into(),
    }
}

fn lex(text: &str) -> Result<Vec<(usize, Token)>, ShardingError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let single = match c {
            b'{' => Some(Token::LBrace),
            b'}' => Some(Token::RBrace),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b',' => Some(Token::Comma),
            b'=' => Some(Token::Equals),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push((i, token));
            i += 1;
        } else if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == b'-' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let value = text[start..i]
                .parse::<i64>()
                .map_err(|e| parse_error(start, format!("bad integer: {e}")))?;
            tokens.push((start, Token::Int(value)));
        } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((start, Token::Ident(text[start..i].to_string())));
        } else {
            return Err(parse_error(i, format!("unexpected character '{}'", c as char)));
        }
    }
    tokens.push((text.len(), Token::End));
    Ok(tokens)
}

/// Deepest tuple nesting the prettyprint parser accepts.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].1
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].0
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].1.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), ShardingError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(parse_error(
                self.offset(),
                format!("expected {}, found {}", token.description(), self.peek().description()),
            ))
        }
    }

    fn expect_end(&mut self) -> Result<(), ShardingError> {
        self.expect(&Token::End)
    }

    fn expect_int(&mut self) -> Result<i64, ShardingError> {
        match self.peek() {
            Token::Int(v) => {
                let v = *v;
                self.advance();
                Ok(v)
            }
            other => Err(parse_error(
                self.offset(),
                format!("expected integer, found {}", other.description()),
            )),
        }
    }

    fn int_list(&mut self) -> Result<Vec<i64>, ShardingError> {
        let mut values = vec![self.expect_int()?];
        while self.eat(&Token::Comma) {
            values.push(self.expect_int()?);
        }
        Ok(values)
    }

    fn parse_sharding(&mut self) -> Result<OpSharding, ShardingError> {
        if self.depth == MAX_NESTING {
            return Err(parse_error(
                self.offset(),
                format!("sharding nested deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        let sharding = self.parse_sharding_body();
        self.depth -= 1;
        sharding
    }

    fn parse_sharding_body(&mut self) -> Result<OpSharding, ShardingError> {
        self.expect(&Token::LBrace)?;
        let sharding = match self.peek().clone() {
            Token::RBrace => OpSharding::tuple(Vec::new()),
            Token::LBrace => {
                let mut elements = vec![self.parse_sharding()?];
                while self.eat(&Token::Comma) {
                    elements.push(self.parse_sharding()?);
                }
                OpSharding::tuple(elements)
            }
            Token::Ident(word) => {
                let offset = self.offset();
                self.advance();
                match word.as_str() {
                    "replicated" => OpSharding::replicated(),
                    "manual" => OpSharding::manual(),
                    "maximal" => self.parse_maximal()?,
                    "devices" => self.parse_tiled(offset)?,
                    other => {
                        return Err(parse_error(offset, format!("unknown sharding kind '{other}'")))
                    }
                }
            }
            other => {
                return Err(parse_error(
                    self.offset(),
                    format!("expected sharding body, found {}", other.description()),
                ))
            }
        };
        self.expect(&Token::RBrace)?;
        Ok(sharding)
    }

    fn parse_maximal(&mut self) -> Result<OpSharding, ShardingError> {
        let offset = self.offset();
        match self.advance() {
            Token::Ident(word) if word == "device" => {}
            other => {
                return Err(parse_error(
                    offset,
                    format!("expected 'device', found {}", other.description()),
                ))
            }
        }
        self.expect(&Token::Equals)?;
        Ok(OpSharding::maximal(self.expect_int()?))
    }

    fn parse_tiled(&mut self, offset: usize) -> Result<OpSharding, ShardingError> {
        self.expect(&Token::Equals)?;
        self.expect(&Token::LBracket)?;
        let dimensions = self.int_list()?;
        self.expect(&Token::RBracket)?;
        let devices = self.int_list()?;
        let mut sharding = OpSharding::tiled(dimensions, devices);
        if let Token::Ident(word) = self.peek().clone() {
            if word != "last_tile_dim_replicate" {
                return Err(parse_error(self.offset(), format!("unknown flag '{word}'")));
            }
            self.advance();
            sharding.replicate_on_last_tile_dim = true;
        }
        let tiles = sharding
            .tile_assignment_dimensions
            .iter()
            .try_fold(1i64, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| parse_error(offset, "tile assignment overflows"))?;
        if tiles != sharding.tile_assignment_devices.len() as i64 {
            return Err(parse_error(
                offset,
                format!(
                    "tile assignment of {tiles} tiles lists {} devices",
                    sharding.tile_assignment_devices.len()
                ),
            ));
        }
        Ok(sharding)
    }
}
