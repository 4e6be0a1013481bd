//! Lowering errors

use thiserror::Error;

use crate::frontend::SourcePosition;

pub type LowerResult<T> = Result<T, LowerError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerErrorKind {
    #[error("redefinition of `{name}`")]
    Redefinition { name: String },

    #[error("undefined variable `{name}`")]
    UndefinedName { name: String },

    #[error("undefined function `{name}`")]
    UndefinedFunction { name: String },

    #[error("{message}")]
    Scope { message: String },

    #[error("cannot assign to {target}, it is not a storage location")]
    NotAssignable { target: String },

    #[error("function `{name}` expects {expected} argument(s) but {found} were given")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("unknown type `{name}`")]
    UnknownType { name: String },

    #[error("function `{name}` must be declared at the top level")]
    NestedFunction { name: String },

    #[error("{message}")]
    TypeMismatch { message: String },

    #[error("codegen error: {message}")]
    Codegen { message: String },
}

impl LowerErrorKind {
    pub fn at(self, position: SourcePosition) -> LowerError {
        LowerError {
            kind: self,
            position: position.is_known().then_some(position),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen {
            message: message.into(),
        }
    }
}

/// The first problem found while lowering, with the position of the node
/// that caused it when the parser recorded one
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct LowerError {
    pub kind: LowerErrorKind,
    pub position: Option<SourcePosition>,
}

impl LowerError {
    /// Attaches `position` unless a more precise one is already known
    pub fn or_at(mut self, position: SourcePosition) -> Self {
        if self.position.is_none() && position.is_known() {
            self.position = Some(position);
        }

        self
    }

    /// The single line written to stderr before the driver exits
    pub fn diagnostic(&self) -> String {
        match self.position {
            Some(position) => format!("Error: {} at line {}", self.kind, position.line),
            None => format!("Error: {}", self.kind),
        }
    }
}

impl From<LowerErrorKind> for LowerError {
    fn from(kind: LowerErrorKind) -> Self {
        Self {
            kind,
            position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_includes_line_when_known() {
        let error = LowerErrorKind::UndefinedName {
            name: "y".to_owned(),
        }
        .at(SourcePosition::new(7, 3));

        assert_eq!(error.diagnostic(), "Error: undefined variable `y` at line 7");
    }

    #[test]
    fn innermost_position_wins() {
        let error = LowerErrorKind::UndefinedName {
            name: "y".to_owned(),
        }
        .at(SourcePosition::new(4, 9))
        .or_at(SourcePosition::new(2, 1));

        assert_eq!(error.position, Some(SourcePosition::new(4, 9)));

        let error = LowerError::from(LowerErrorKind::NotAssignable {
            target: "`1`".to_owned(),
        })
        .or_at(SourcePosition::new(2, 1));

        assert_eq!(error.position, Some(SourcePosition::new(2, 1)));
    }

    #[test]
    fn diagnostic_omits_unknown_line() {
        let error = LowerErrorKind::UnknownType {
            name: "float".to_owned(),
        }
        .at(SourcePosition::default());

        assert_eq!(error.diagnostic(), "Error: unknown type `float`");
    }
}
