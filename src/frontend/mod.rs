//! Everything the lowering engine receives from the outside world. Tokenizing
//! and parsing happen in an external tool which hands over a finished
//! [`ast::Program`] serialized as JSON.

use serde::{Deserialize, Serialize};

pub mod ast;
pub mod intern;

/// Line and column (both 1-based) a node was parsed from. A zeroed position
/// means the producer did not record one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_known(self) -> bool {
        self.line != 0
    }

    /// `self` when known, `fallback` otherwise
    pub fn or(self, fallback: SourcePosition) -> SourcePosition {
        if self.is_known() { self } else { fallback }
    }
}

impl core::fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Reads a program tree produced by the parser
pub fn load_program(json: &str) -> Result<ast::Program, serde_json::Error> {
    serde_json::from_str(json)
}
