use std::fmt::Write;

use colored::Colorize;
use itertools::Itertools;

use super::{CompoundStatement, Expression, ExpressionKind, Program, Statement, StatementKind};

/// Renders the tree as an indented outline, one node per line
pub fn dump_program(program: &Program) -> String {
    let mut printer = TreePrinter::default();

    printer.line(0, "Program".bold().to_string());

    for statement in &program.statements {
        printer.statement(1, statement);
    }

    printer.output
}

#[derive(Default)]
struct TreePrinter {
    output: String,
}

impl TreePrinter {
    fn line(&mut self, depth: usize, text: impl AsRef<str>) {
        let _ = writeln!(self.output, "{}{}", "  ".repeat(depth), text.as_ref());
    }

    fn statement(&mut self, depth: usize, statement: &Statement) {
        let position = if statement.position.is_known() {
            format!(" @{}", statement.position).dimmed().to_string()
        } else {
            String::new()
        };

        match &statement.kind {
            StatementKind::VarDecl(declaration) => {
                let storage = if declaration.is_top_level {
                    "global"
                } else {
                    "local"
                };

                self.line(
                    depth,
                    format!(
                        "{} {} {} ({storage}){position}",
                        "VarDecl".cyan(),
                        declaration.ty.symbol.value().magenta(),
                        declaration.name.symbol.value().blue(),
                    ),
                );

                if let Some(initializer) = &declaration.initializer {
                    self.expression(depth + 1, initializer);
                }
            }
            StatementKind::Stmts(statements) => {
                self.line(depth, format!("{}{position}", "Stmts".cyan()));

                for statement in statements {
                    self.statement(depth + 1, statement);
                }
            }
            StatementKind::Expr(expression) => {
                self.line(depth, format!("{}{position}", "ExprStmt".cyan()));
                self.expression(depth + 1, expression);
            }
            StatementKind::Compound(compound) => self.compound(depth, compound),
            StatementKind::Return(value) => {
                self.line(depth, format!("{}{position}", "Return".cyan()));

                if let Some(value) = value {
                    self.expression(depth + 1, value);
                }
            }
            StatementKind::FuncDecl(function) => {
                let parameters = function
                    .parameters
                    .iter()
                    .map(|p| format!("{} {}", p.ty.symbol, p.name.symbol))
                    .join(", ");

                self.line(
                    depth,
                    format!(
                        "{} {} {}({parameters}){position}",
                        "FuncDecl".cyan(),
                        function.return_type.symbol.value().magenta(),
                        function.name.symbol.value().blue(),
                    ),
                );
                self.compound(depth + 1, &function.body);
            }
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                self.line(depth, format!("{}{position}", "If".cyan()));
                self.expression(depth + 1, condition);
                self.statement(depth + 1, positive);

                if let Some(negative) = negative {
                    self.line(depth, "Else".cyan().to_string());
                    self.statement(depth + 1, negative);
                }
            }
            StatementKind::While { condition, body } => {
                self.line(depth, format!("{}{position}", "While".cyan()));
                self.expression(depth + 1, condition);
                self.statement(depth + 1, body);
            }
        }
    }

    fn compound(&mut self, depth: usize, compound: &CompoundStatement) {
        let label = if compound.is_function_body {
            "Compound (function body)"
        } else {
            "Compound"
        };

        self.line(depth, label.cyan().to_string());

        for statement in &compound.statements {
            self.statement(depth + 1, statement);
        }
    }

    fn expression(&mut self, depth: usize, expression: &Expression) {
        match &expression.kind {
            ExpressionKind::IntegerLiteral(value) => {
                self.line(depth, format!("IntegerLiteral {}", value.to_string().purple()))
            }
            ExpressionKind::DoubleLiteral(value) => {
                self.line(depth, format!("DoubleLiteral {}", format!("{value:?}").purple()))
            }
            ExpressionKind::StringLiteral(value) => self.line(
                depth,
                format!("StringLiteral {}", format!("{:?}", value.value()).green()),
            ),
            ExpressionKind::Identifier(identifier) => {
                self.line(depth, format!("Identifier {}", identifier.symbol.value().blue()))
            }
            ExpressionKind::Binary { operator, lhs, rhs } => {
                self.line(depth, format!("Binary {}", operator.to_string().yellow()));
                self.expression(depth + 1, lhs);
                self.expression(depth + 1, rhs);
            }
            ExpressionKind::Call { callee, arguments } => {
                self.line(depth, format!("Call {}", callee.symbol.value().blue()));

                for argument in arguments {
                    self.expression(depth + 1, argument);
                }
            }
        }
    }
}
