//! The program tree handed over by the parser. Every node owns its children
//! and records the position it was parsed from. Nothing in here changes once
//! the tree has been built; lowering only ever borrows it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::{SourcePosition, intern::InternedSymbol};

pub mod pretty_print;

/// Root of a translation unit: the top level statements in source order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default)]
    pub position: SourcePosition,
    pub symbol: InternedSymbol,
    /// Set when the identifier names a type (`int`, `double`) rather than a
    /// value
    #[serde(default)]
    pub is_type_name: bool,
    /// Set when the identifier is a use of a previously declared name rather
    /// than the name being declared
    #[serde(default = "default_true")]
    pub is_reference: bool,
}

fn default_true() -> bool {
    true
}

impl Identifier {
    /// A use of a variable inside an expression
    pub fn reference(name: &str) -> Self {
        Self {
            position: SourcePosition::default(),
            symbol: InternedSymbol::new(name),
            is_type_name: false,
            is_reference: true,
        }
    }

    /// The name being introduced by a declaration
    pub fn declared(name: &str) -> Self {
        Self {
            is_reference: false,
            ..Self::reference(name)
        }
    }

    pub fn type_name(name: &str) -> Self {
        Self {
            is_type_name: true,
            is_reference: false,
            ..Self::reference(name)
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(default)]
    pub position: SourcePosition,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionKind {
    IntegerLiteral(i32),
    DoubleLiteral(f64),
    /// Already escape decoded with the surrounding quotes removed
    StringLiteral(InternedSymbol),
    Identifier(Identifier),
    Binary {
        operator: BinaryOperatorKind,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Call {
        callee: Identifier,
        arguments: Vec<Expression>,
    },
}

impl Expression {
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            position: SourcePosition::default(),
            kind,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }

    pub fn integer(value: i32) -> Self {
        Self::new(ExpressionKind::IntegerLiteral(value))
    }

    pub fn double(value: f64) -> Self {
        Self::new(ExpressionKind::DoubleLiteral(value))
    }

    pub fn string(value: &str) -> Self {
        Self::new(ExpressionKind::StringLiteral(InternedSymbol::new(value)))
    }

    pub fn identifier(name: &str) -> Self {
        Self::new(ExpressionKind::Identifier(Identifier::reference(name)))
    }

    pub fn binary(operator: BinaryOperatorKind, lhs: Expression, rhs: Expression) -> Self {
        Self::new(ExpressionKind::Binary {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn assign(lhs: Expression, rhs: Expression) -> Self {
        Self::binary(BinaryOperatorKind::Assign, lhs, rhs)
    }

    pub fn call(callee: &str, arguments: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::Call {
            callee: Identifier::reference(callee),
            arguments,
        })
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum BinaryOperatorKind {
    #[strum(serialize = "+")]
    #[serde(rename = "add")]
    Add,
    #[strum(serialize = "-")]
    #[serde(rename = "sub")]
    Subtract,
    #[strum(serialize = "*")]
    #[serde(rename = "mul")]
    Multiply,
    #[strum(serialize = "/")]
    #[serde(rename = "div")]
    Divide,
    #[strum(serialize = "%")]
    #[serde(rename = "mod")]
    Modulus,
    #[strum(serialize = ">")]
    #[serde(rename = "gt")]
    GreaterThan,
    #[strum(serialize = ">=")]
    #[serde(rename = "ge")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "<")]
    #[serde(rename = "lt")]
    LessThan,
    #[strum(serialize = "<=")]
    #[serde(rename = "le")]
    LessThanOrEqualTo,
    #[strum(serialize = "==")]
    #[serde(rename = "eq")]
    Equals,
    #[strum(serialize = "=")]
    #[serde(rename = "assign")]
    Assign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Comparison,
    Assignment,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulus => {
                BinaryOperatorClass::Arithmetic
            }
            Self::GreaterThan
            | Self::GreaterThanOrEqualTo
            | Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::Equals => BinaryOperatorClass::Comparison,
            Self::Assign => BinaryOperatorClass::Assignment,
        }
    }

    /// Maps operator source text (`"+"`, `">="`, ...) to its kind. Returns
    /// `None` for anything micro-C does not have.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::from_str(token).ok()
    }
}

/// The type names micro-C understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum TypeName {
    Int,
    Double,
    Void,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default)]
    pub position: SourcePosition,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    VarDecl(Box<VarDecl>),
    /// A plain list of statements which does not open a scope
    Stmts(Vec<Statement>),
    /// An expression evaluated for its side effects
    Expr(Box<Expression>),
    Compound(CompoundStatement),
    Return(Option<Box<Expression>>),
    FuncDecl(Box<FuncDecl>),
    If {
        condition: Box<Expression>,
        positive: Box<Statement>,
        negative: Option<Box<Statement>>,
    },
    While {
        condition: Box<Expression>,
        body: Box<Statement>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub ty: Identifier,
    pub name: Identifier,
    #[serde(default)]
    pub initializer: Option<Box<Expression>>,
    /// Only true for declarations directly in the program root
    #[serde(default)]
    pub is_top_level: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompoundStatement {
    pub statements: Vec<Statement>,
    /// Function bodies share the scope holding the parameters instead of
    /// opening their own
    #[serde(default)]
    pub is_function_body: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub return_type: Identifier,
    pub name: Identifier,
    pub parameters: Vec<ParamDecl>,
    pub body: CompoundStatement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    #[serde(default)]
    pub position: SourcePosition,
    pub ty: Identifier,
    pub name: Identifier,
}

impl ParamDecl {
    pub fn new(ty: &str, name: &str) -> Self {
        Self {
            position: SourcePosition::default(),
            ty: Identifier::type_name(ty),
            // parameters are bound once on entry, never references themselves
            name: Identifier::declared(name),
        }
    }
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            position: SourcePosition::default(),
            kind,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }

    pub fn global(ty: &str, name: &str, initializer: Option<Expression>) -> Self {
        Self::var_decl(ty, name, initializer, true)
    }

    pub fn local(ty: &str, name: &str, initializer: Option<Expression>) -> Self {
        Self::var_decl(ty, name, initializer, false)
    }

    fn var_decl(ty: &str, name: &str, initializer: Option<Expression>, is_top_level: bool) -> Self {
        Self::new(StatementKind::VarDecl(Box::new(VarDecl {
            ty: Identifier::type_name(ty),
            name: Identifier::declared(name),
            initializer: initializer.map(Box::new),
            is_top_level,
        })))
    }

    pub fn expression(expression: Expression) -> Self {
        Self::new(StatementKind::Expr(Box::new(expression)))
    }

    pub fn stmts(statements: Vec<Statement>) -> Self {
        Self::new(StatementKind::Stmts(statements))
    }

    pub fn block(statements: Vec<Statement>) -> Self {
        Self::new(StatementKind::Compound(CompoundStatement {
            statements,
            is_function_body: false,
        }))
    }

    pub fn ret(value: Option<Expression>) -> Self {
        Self::new(StatementKind::Return(value.map(Box::new)))
    }

    pub fn function(
        return_type: &str,
        name: &str,
        parameters: Vec<ParamDecl>,
        body: Vec<Statement>,
    ) -> Self {
        Self::new(StatementKind::FuncDecl(Box::new(FuncDecl {
            return_type: Identifier::type_name(return_type),
            name: Identifier::declared(name),
            parameters,
            body: CompoundStatement {
                statements: body,
                is_function_body: true,
            },
        })))
    }

    pub fn if_else(condition: Expression, positive: Statement, negative: Option<Statement>) -> Self {
        Self::new(StatementKind::If {
            condition: Box::new(condition),
            positive: Box::new(positive),
            negative: negative.map(Box::new),
        })
    }

    pub fn while_loop(condition: Expression, body: Statement) -> Self {
        Self::new(StatementKind::While {
            condition: Box::new(condition),
            body: Box::new(body),
        })
    }
}

/// Decodes the body of a quoted string literal as it appears in source text
/// (`"a\tb\n"`), stripping the quotes and resolving escape sequences
pub fn decode_string_literal(source_text: &str) -> String {
    let inner = source_text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(source_text);

    let mut decoded = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('r') => decoded.push('\r'),
            Some('0') => decoded.push('\0'),
            Some('\\') => decoded.push('\\'),
            Some('"') => decoded.push('"'),
            Some('\'') => decoded.push('\''),
            // unknown escapes are kept verbatim
            Some(other) => {
                decoded.push('\\');
                decoded.push(other);
            }
            None => decoded.push('\\'),
        }
    }

    decoded
}
