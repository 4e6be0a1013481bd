use std::fmt::Write;

use colored::Colorize;
use itertools::Itertools;

use crate::{
    frontend::ast::BinaryOperatorKind,
    index::Index,
    middle::lir,
};

/// Renders a whole module: globals, external declarations, then function
/// bodies in declaration order
pub fn pretty_print_module(module: &lir::Module) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "{} {}", "module".magenta(), module.name.value().blue());

    for global in module.globals.iter() {
        let _ = writeln!(
            output,
            "{} {} {} {}: {} {} {}",
            lir::Immediate::Global(global.id).to_string().green(),
            "=".white(),
            "global".magenta(),
            global.name.value().blue(),
            global.ty,
            "=".white(),
            global.initializer.to_string().purple()
        );
    }

    for (id, symbol) in &module.static_strings {
        let _ = writeln!(
            output,
            "{} {} {} {}",
            lir::Immediate::StaticString(*id).to_string().green(),
            "=".white(),
            "string".magenta(),
            format!("{:?}", symbol.value()).purple()
        );
    }

    for declaration in &module.external_functions {
        let _ = writeln!(output, "{} {}", "declare".magenta(), format_signature(declaration));
    }

    for function in &module.function_definitions {
        output.push('\n');
        output.push_str(&pretty_print_lir(function));
    }

    output
}

fn format_signature(signature: &lir::FunctionSignature) -> String {
    let mut parameters = signature.parameters.iter().map(|ty| ty.to_string()).collect_vec();

    if signature.is_variadic {
        parameters.push("...".to_owned());
    }

    let return_type = signature
        .return_type
        .map(|ty| ty.to_string())
        .unwrap_or_else(|| "void".to_owned());

    format!(
        "{}({}) -> {return_type}",
        signature.name.value().blue(),
        parameters.join(", ")
    )
}

pub fn pretty_print_lir(function: &lir::FunctionDefinition) -> String {
    let mut output = String::new();

    let arguments = function
        .arguments
        .iter()
        .map(|arg| format!("{arg}: {}", function.registers[arg].ty))
        .join(", ");

    let return_type = function
        .signature
        .return_type
        .map(|ty| ty.to_string())
        .unwrap_or_else(|| "void".to_owned());

    let _ = writeln!(
        output,
        "{} {}({arguments}) -> {return_type} {}",
        "fn".magenta(),
        function.signature.name.value().blue(),
        "{".white()
    );

    for block in function.blocks.values() {
        let predecessors = block.predecessors.iter().join(", ");

        if predecessors.is_empty() {
            let _ = writeln!(output, "{}", format!("{}:", block.id).bright_red());
        } else {
            let _ = writeln!(
                output,
                "{} {}",
                format!("{}:", block.id).bright_red(),
                format!("; preds: {predecessors}").dimmed()
            );
        }

        for instruction in &block.instructions {
            let _ = writeln!(output, "    {instruction}");
        }
    }

    let _ = writeln!(output, "{}", "}".white());

    output
}

fn operation_mnemonic(operator: BinaryOperatorKind, is_float: bool) -> &'static str {
    match (operator, is_float) {
        (BinaryOperatorKind::Add, false) => "add",
        (BinaryOperatorKind::Add, true) => "fadd",
        (BinaryOperatorKind::Subtract, false) => "sub",
        (BinaryOperatorKind::Subtract, true) => "fsub",
        (BinaryOperatorKind::Multiply, false) => "mul",
        (BinaryOperatorKind::Multiply, true) => "fmul",
        (BinaryOperatorKind::Divide, false) => "sdiv",
        (BinaryOperatorKind::Divide, true) => "fdiv",
        (BinaryOperatorKind::Modulus, false) => "srem",
        (BinaryOperatorKind::Modulus, true) => "frem",
        (BinaryOperatorKind::GreaterThan, false) => "icmp sgt",
        (BinaryOperatorKind::GreaterThan, true) => "fcmp ogt",
        (BinaryOperatorKind::GreaterThanOrEqualTo, false) => "icmp sge",
        (BinaryOperatorKind::GreaterThanOrEqualTo, true) => "fcmp oge",
        (BinaryOperatorKind::LessThan, false) => "icmp slt",
        (BinaryOperatorKind::LessThan, true) => "fcmp olt",
        (BinaryOperatorKind::LessThanOrEqualTo, false) => "icmp sle",
        (BinaryOperatorKind::LessThanOrEqualTo, true) => "fcmp ole",
        (BinaryOperatorKind::Equals, false) => "icmp eq",
        (BinaryOperatorKind::Equals, true) => "fcmp oeq",
        // never produced by lowering, assignments become stores
        (BinaryOperatorKind::Assign, _) => "assign",
    }
}

impl core::fmt::Display for lir::Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Instruction::AllocStack { destination, ty } => {
                write!(f, "{destination} {} {} {ty}", "=".white(), "alloc".cyan())
            }
            lir::Instruction::Load {
                destination,
                source,
            } => write!(
                f,
                "{destination} {} {} {source}",
                "=".white(),
                "load".cyan()
            ),
            lir::Instruction::Store {
                destination,
                source,
            } => write!(
                f,
                "{} {destination} {} {source}",
                "store".cyan(),
                "<-".white()
            ),
            lir::Instruction::IntToDouble {
                destination,
                operand,
            } => write!(
                f,
                "{destination} {} {} {operand}",
                "=".white(),
                "sitofp".cyan()
            ),
            lir::Instruction::IntegerOperation {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{destination} {} {} {lhs}, {rhs}",
                "=".white(),
                operation_mnemonic(*operator, false).cyan()
            ),
            lir::Instruction::FloatOperation {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{destination} {} {} {lhs}, {rhs}",
                "=".white(),
                operation_mnemonic(*operator, true).cyan()
            ),
            lir::Instruction::Branch {
                condition,
                positive,
                negative,
            } => write!(
                f,
                "{} {condition} {} {}",
                "br".cyan(),
                positive.to_string().blue(),
                negative.to_string().blue()
            ),
            lir::Instruction::Jump { destination } => {
                write!(f, "{} {}", "jmp".cyan(), destination.to_string().blue())
            }
            lir::Instruction::Return { value: Some(value) } => {
                write!(f, "{} {value}", "ret".cyan())
            }
            lir::Instruction::Return { value: None } => write!(f, "{}", "ret".cyan()),
            lir::Instruction::FunctionCall {
                target,
                arguments,
                destination,
            } => {
                if let Some(dest) = destination {
                    write!(f, "{dest} {} ", "=".white())?;
                }

                write!(
                    f,
                    "{} {}({})",
                    "call".cyan(),
                    target.value(),
                    arguments.iter().map(|op| op.to_string()).join(", ")
                )
            }
        }
    }
}

impl core::fmt::Display for lir::RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("%{}", self.index()).yellow())
    }
}

impl core::fmt::Display for lir::BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ".label_{}", self.index())
    }
}

impl core::fmt::Display for lir::Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Immediate::Int(value) => write!(f, "{value}"),
            lir::Immediate::Double(value) => write!(f, "{value:?}"),
            lir::Immediate::Bool(value) => write!(f, "{value}"),
            lir::Immediate::StaticString(id) => write!(f, "@str{}", id.index()),
            lir::Immediate::Global(id) => write!(f, "@g{}", id.index()),
        }
    }
}

impl core::fmt::Display for lir::Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Operand::Immediate(immediate) => write!(f, "{}", immediate.to_string().purple()),
            lir::Operand::Register(register_id) => write!(f, "{register_id}"),
        }
    }
}

impl core::fmt::Display for lir::Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Type::Int => write!(f, "i32"),
            lir::Type::Double => write!(f, "f64"),
            lir::Type::Bool => write!(f, "i1"),
            lir::Type::Str => write!(f, "str"),
            lir::Type::Pointer => write!(f, "ptr"),
        }
    }
}
