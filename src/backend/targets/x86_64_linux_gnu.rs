use std::{collections::BTreeMap, path::Path, process::Command};

use itertools::Itertools;

use crate::{
    backend::{
        CodegenOptions, EmitError,
        assemblers::x86_64::{Assembler, X86FullRegister, XmmRegister},
        symbols,
        targets::CodeGenerator,
    },
    frontend::ast::BinaryOperatorKind,
    middle::lir,
};

const ARG_REGS: [X86FullRegister; 6] = [
    X86FullRegister::Rdi,
    X86FullRegister::Rsi,
    X86FullRegister::Rdx,
    X86FullRegister::Rcx,
    X86FullRegister::R8,
    X86FullRegister::R9,
];

const FLOAT_ARG_REGS: [XmmRegister; 8] = [
    XmmRegister::Xmm0,
    XmmRegister::Xmm1,
    XmmRegister::Xmm2,
    XmmRegister::Xmm3,
    XmmRegister::Xmm4,
    XmmRegister::Xmm5,
    XmmRegister::Xmm6,
    XmmRegister::Xmm7,
];

pub struct CodeGeneratorX86_64LinuxGnu;

impl CodeGenerator for CodeGeneratorX86_64LinuxGnu {
    fn translate_to_asm(
        &self,
        module: &lir::Module,
        options: &CodegenOptions,
    ) -> Result<String, EmitError> {
        let externs = module
            .external_functions
            .iter()
            .map(|f| format!("extern {}", f.name.value()))
            .chain(["extern fmod".to_owned()])
            .join("\n");

        let function_bodies = module
            .function_definitions
            .iter()
            .map(|f| codegen_function(module, f, options))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");

        let globals = module
            .globals
            .iter()
            .map(format_global)
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");

        let static_strings = module
            .static_strings
            .iter()
            .map(|(id, symbol)| {
                format!(
                    "{}: db {}",
                    symbols::static_string(*id),
                    format_nasm_string(symbol.value())
                )
            })
            .join("\n");

        Ok(format!(
            indoc::indoc! {"
                ; module {0}
                default rel
                bits 64

                {1}

                section .text

                {2}
                section .data

                {3}

                section .rodata

                {4}

                section .note.GNU-stack noalloc noexec nowrite progbits
            "},
            module.name.value(),
            externs,
            function_bodies,
            globals,
            static_strings
        ))
    }

    fn create_assembler_command(&self, input_file: &Path, output_file: &Path) -> Command {
        let mut cmd = Command::new("nasm");

        cmd.args(["-f", "elf64", "-o"])
            .arg(output_file)
            .arg(input_file);

        cmd
    }

    fn create_linker_command(&self, input_file: &Path, output_file: &Path) -> Command {
        let mut cmd = Command::new("cc");

        // libm provides `fmod`
        cmd.arg("-o").arg(output_file).arg(input_file).arg("-lm");

        cmd
    }
}

fn format_global(global: &lir::Global) -> Result<String, EmitError> {
    let label = symbols::global(global.id);
    let name = global.name.value();

    match global.initializer {
        lir::Immediate::Int(value) => Ok(format!("align 4\n{label}: dd {value} ; {name}")),
        lir::Immediate::Double(value) => Ok(format!(
            "align 8\n{label}: dq 0x{:016X} ; {name} = {value:?}",
            value.to_bits()
        )),
        other => Err(EmitError::Unsupported(format!(
            "global `{name}` initialized with {other:?}"
        ))),
    }
}

/// Renders a string as a NUL terminated `db` operand list. Printable ASCII is
/// kept quoted, everything else is spelled out as bytes.
fn format_nasm_string(string: &str) -> String {
    let mut parts = Vec::new();
    let mut quoted = String::new();

    for byte in string.bytes() {
        if (b' '..=b'~').contains(&byte) && byte != b'"' {
            quoted.push(byte as char);
            continue;
        }

        if !quoted.is_empty() {
            parts.push(format!("\"{quoted}\""));
            quoted.clear();
        }

        parts.push(byte.to_string());
    }

    if !quoted.is_empty() {
        parts.push(format!("\"{quoted}\""));
    }

    parts.push("0".to_owned());

    parts.join(", ")
}

/// Every virtual register gets a slot, followed by the storage reserved by
/// `AllocStack`. Offsets are measured downwards from `rbp`.
struct FrameLayout {
    register_offsets: BTreeMap<lir::RegisterId, usize>,
    storage_offsets: BTreeMap<lir::RegisterId, usize>,
    size: usize,
}

impl FrameLayout {
    fn new(function: &lir::FunctionDefinition) -> Self {
        let mut register_offsets = BTreeMap::new();
        let mut storage_offsets = BTreeMap::new();
        let mut size = 0;

        for register in function.registers.values() {
            size = lir::align_to(size + register.ty.size(), register.ty.size());
            register_offsets.insert(register.id, size);
        }

        for instruction in function.instructions() {
            if let lir::Instruction::AllocStack { destination, ty } = instruction {
                size = lir::align_to(size + ty.size(), ty.size());
                storage_offsets.insert(*destination, size);
            }
        }

        Self {
            register_offsets,
            storage_offsets,
            size: lir::align_to(size, 16),
        }
    }
}

fn codegen_function(
    module: &lir::Module,
    function: &lir::FunctionDefinition,
    options: &CodegenOptions,
) -> Result<String, EmitError> {
    let name = function.signature.name.value();
    let layout = FrameLayout::new(function);

    codegen_log!("function {name}: frame of {} bytes", layout.size);

    let mut assembler = Assembler::new(function, &layout.register_offsets);

    assembler.global_label(name);
    assembler.function_prologue(layout.size);

    /* Move the function arguments into their stack registers */

    let (mut int_index, mut float_index) = (0, 0);

    for argument in &function.arguments {
        if options.emit_debug_info {
            assembler.comment(format!(
                "store arg {} into its stack register",
                strip_ansi_escapes::strip_str(argument.to_string())
            ));
        }

        if function.type_of_operand(lir::Operand::Register(*argument)) == lir::Type::Double {
            let register = FLOAT_ARG_REGS.get(float_index).ok_or_else(|| {
                EmitError::Unsupported(format!("more than 8 double parameters in `{name}`"))
            })?;
            assembler.store_float_operand(*argument, *register)?;
            float_index += 1;
        } else {
            let register = ARG_REGS.get(int_index).ok_or_else(|| {
                EmitError::Unsupported(format!("more than 6 integer parameters in `{name}`"))
            })?;
            assembler.store_operand(*argument, *register)?;
            int_index += 1;
        }
    }

    /* Blocks */

    for block in function.blocks.values() {
        assembler.label(block.id.to_string());

        for instruction in &block.instructions {
            if options.emit_debug_info {
                assembler.comment(strip_ansi_escapes::strip_str(instruction.to_string()));
            }

            codegen_instruction(&mut assembler, module, function, &layout, instruction)?;
        }
    }

    assembler.function_epilogue();

    Ok(assembler.into_output())
}

fn codegen_instruction(
    assembler: &mut Assembler<'_>,
    module: &lir::Module,
    function: &lir::FunctionDefinition,
    layout: &FrameLayout,
    instruction: &lir::Instruction,
) -> Result<(), EmitError> {
    match instruction {
        lir::Instruction::AllocStack { destination, .. } => {
            let offset = layout.storage_offsets[destination];

            assembler.emit(format!("lea rax, [rbp - {offset}]"));
            assembler.store_operand(*destination, X86FullRegister::Rax)?;
        }
        lir::Instruction::Load {
            destination,
            source,
        } => {
            assembler.load_operand(X86FullRegister::Rcx, *source)?;

            match function.type_of_operand(lir::Operand::Register(*destination)) {
                lir::Type::Double => {
                    assembler.emit("movsd xmm0, qword [rcx]");
                    assembler.store_float_operand(*destination, XmmRegister::Xmm0)?;
                }
                lir::Type::Int => {
                    assembler.emit("mov eax, dword [rcx]");
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
                lir::Type::Bool => {
                    assembler.emit("movzx eax, byte [rcx]");
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
                lir::Type::Str | lir::Type::Pointer => {
                    assembler.emit("mov rax, qword [rcx]");
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
            }
        }
        lir::Instruction::Store {
            destination,
            source,
        } => {
            assembler.load_operand(X86FullRegister::Rcx, *destination)?;

            match function.type_of_operand(*source) {
                lir::Type::Double => {
                    assembler.load_float_operand(XmmRegister::Xmm0, *source)?;
                    assembler.emit("movsd qword [rcx], xmm0");
                }
                lir::Type::Int => {
                    assembler.load_operand(X86FullRegister::Rax, *source)?;
                    assembler.emit("mov dword [rcx], eax");
                }
                lir::Type::Bool => {
                    assembler.load_operand(X86FullRegister::Rax, *source)?;
                    assembler.emit("mov byte [rcx], al");
                }
                lir::Type::Str | lir::Type::Pointer => {
                    assembler.load_operand(X86FullRegister::Rax, *source)?;
                    assembler.emit("mov qword [rcx], rax");
                }
            }
        }
        lir::Instruction::IntToDouble {
            destination,
            operand,
        } => {
            assembler.load_operand(X86FullRegister::Rax, *operand)?;
            assembler.emit("cvtsi2sd xmm0, eax");
            assembler.store_float_operand(*destination, XmmRegister::Xmm0)?;
        }
        lir::Instruction::IntegerOperation {
            operator,
            destination,
            lhs,
            rhs,
        } => {
            assembler.load_operand(X86FullRegister::Rax, *lhs)?;
            assembler.load_operand(X86FullRegister::Rcx, *rhs)?;

            let result = match operator {
                BinaryOperatorKind::Add => {
                    assembler.emit("add eax, ecx");
                    X86FullRegister::Rax
                }
                BinaryOperatorKind::Subtract => {
                    assembler.emit("sub eax, ecx");
                    X86FullRegister::Rax
                }
                BinaryOperatorKind::Multiply => {
                    assembler.emit("imul eax, ecx");
                    X86FullRegister::Rax
                }
                BinaryOperatorKind::Divide => {
                    assembler.emit("cdq");
                    assembler.emit("idiv ecx");
                    X86FullRegister::Rax
                }
                BinaryOperatorKind::Modulus => {
                    assembler.emit("cdq");
                    assembler.emit("idiv ecx");
                    X86FullRegister::Rdx
                }
                BinaryOperatorKind::GreaterThan
                | BinaryOperatorKind::GreaterThanOrEqualTo
                | BinaryOperatorKind::LessThan
                | BinaryOperatorKind::LessThanOrEqualTo
                | BinaryOperatorKind::Equals => {
                    let condition = match operator {
                        BinaryOperatorKind::GreaterThan => "g",
                        BinaryOperatorKind::GreaterThanOrEqualTo => "ge",
                        BinaryOperatorKind::LessThan => "l",
                        BinaryOperatorKind::LessThanOrEqualTo => "le",
                        _ => "e",
                    };

                    assembler.emit("cmp eax, ecx");
                    assembler.emit(format!("set{condition} al"));
                    X86FullRegister::Rax
                }
                BinaryOperatorKind::Assign => {
                    return Err(EmitError::Unsupported(
                        "assignment as an integer operation".to_owned(),
                    ));
                }
            };

            assembler.store_operand(*destination, result)?;
        }
        lir::Instruction::FloatOperation {
            operator,
            destination,
            lhs,
            rhs,
        } => {
            assembler.load_float_operand(XmmRegister::Xmm0, *lhs)?;
            assembler.load_float_operand(XmmRegister::Xmm1, *rhs)?;

            let arithmetic = match operator {
                BinaryOperatorKind::Add => Some("addsd"),
                BinaryOperatorKind::Subtract => Some("subsd"),
                BinaryOperatorKind::Multiply => Some("mulsd"),
                BinaryOperatorKind::Divide => Some("divsd"),
                _ => None,
            };

            if let Some(mnemonic) = arithmetic {
                assembler.emit(format!("{mnemonic} xmm0, xmm1"));
                assembler.store_float_operand(*destination, XmmRegister::Xmm0)?;
                return Ok(());
            }

            match operator {
                BinaryOperatorKind::Modulus => {
                    // operands are already in place for `fmod(xmm0, xmm1)`
                    assembler.emit("call fmod wrt ..plt");
                    assembler.store_float_operand(*destination, XmmRegister::Xmm0)?;
                }
                // unordered comparisons (NaN) are false, so `<` and `<=`
                // swap their operands instead of testing the carry flag
                BinaryOperatorKind::GreaterThan => {
                    assembler.emit("ucomisd xmm0, xmm1");
                    assembler.emit("seta al");
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
                BinaryOperatorKind::GreaterThanOrEqualTo => {
                    assembler.emit("ucomisd xmm0, xmm1");
                    assembler.emit("setae al");
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
                BinaryOperatorKind::LessThan => {
                    assembler.emit("ucomisd xmm1, xmm0");
                    assembler.emit("seta al");
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
                BinaryOperatorKind::LessThanOrEqualTo => {
                    assembler.emit("ucomisd xmm1, xmm0");
                    assembler.emit("setae al");
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
                BinaryOperatorKind::Equals => {
                    assembler.emit("ucomisd xmm0, xmm1");
                    assembler.emit("sete al");
                    assembler.emit("setnp cl");
                    assembler.emit("and al, cl");
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
                other => {
                    return Err(EmitError::Unsupported(format!(
                        "operator `{other}` on doubles"
                    )));
                }
            }
        }
        lir::Instruction::Branch {
            condition,
            positive,
            negative,
        } => {
            assembler.load_operand(X86FullRegister::Rax, *condition)?;
            assembler.emit("test eax, eax");
            assembler.emit(format!("jnz {positive}"));
            assembler.emit(format!("jmp {negative}"));
        }
        lir::Instruction::Jump { destination } => {
            assembler.emit(format!("jmp {destination}"));
        }
        lir::Instruction::Return { value } => {
            match value {
                Some(value) if function.type_of_operand(*value) == lir::Type::Double => {
                    assembler.load_float_operand(XmmRegister::Xmm0, *value)?;
                }
                Some(value) => {
                    assembler.load_operand(X86FullRegister::Rax, *value)?;
                }
                // the process exit status is whatever `main` leaves in eax
                None if function.signature.name.value() == "main" => {
                    assembler.emit("xor eax, eax");
                }
                None => {}
            }

            assembler.emit("jmp .exit");
        }
        lir::Instruction::FunctionCall {
            target,
            arguments,
            destination,
        } => {
            let (floats, ints): (Vec<&lir::Operand>, Vec<&lir::Operand>) = arguments
                .iter()
                .partition(|argument| function.type_of_operand(**argument) == lir::Type::Double);

            if ints.len() > ARG_REGS.len() || floats.len() > FLOAT_ARG_REGS.len() {
                return Err(EmitError::Unsupported(format!(
                    "call to `{target}` needs arguments passed on the stack"
                )));
            }

            // doubles first, loading their constants clobbers rax
            for (register, operand) in FLOAT_ARG_REGS.iter().zip(&floats) {
                assembler.load_float_operand(*register, **operand)?;
            }

            for (register, operand) in ARG_REGS.iter().zip(&ints) {
                assembler.load_operand(*register, **operand)?;
            }

            let is_external = module.is_external(*target);
            let is_variadic = module
                .external_functions
                .iter()
                .any(|f| f.name == *target && f.is_variadic);

            if is_variadic {
                // number of vector registers used by a variadic call
                assembler.emit(format!("mov eax, {}", floats.len()));
            }

            if is_external {
                assembler.emit(format!("call {} wrt ..plt", target.value()));
            } else {
                assembler.emit(format!("call {}", target.value()));
            }

            if let Some(destination) = destination {
                if function.type_of_operand(lir::Operand::Register(*destination))
                    == lir::Type::Double
                {
                    assembler.store_float_operand(*destination, XmmRegister::Xmm0)?;
                } else {
                    assembler.store_operand(*destination, X86FullRegister::Rax)?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::ast::{Expression, ParamDecl, Program, Statement},
        middle::lowering::lower_program,
    };

    fn asm(statements: Vec<Statement>, options: &CodegenOptions) -> String {
        let module = lower_program(&Program { statements }, "test").unwrap();

        CodeGeneratorX86_64LinuxGnu
            .translate_to_asm(&module, options)
            .unwrap()
    }

    fn lines(text: &str) -> Vec<&str> {
        text.lines().map(str::trim).collect()
    }

    #[test]
    fn integer_function_uses_a_16_byte_aligned_frame() {
        let text = asm(
            vec![
                Statement::global("int", "x", Some(Expression::integer(3))),
                Statement::function(
                    "int",
                    "f",
                    vec![ParamDecl::new("int", "a")],
                    vec![Statement::ret(Some(Expression::binary(
                        BinaryOperatorKind::Add,
                        Expression::identifier("a"),
                        Expression::identifier("x"),
                    )))],
                ),
            ],
            &CodegenOptions::default(),
        );

        let lines = lines(&text);

        for expected in [
            "global f",
            "f:",
            "sub rsp, 32",
            "mov dword [rbp - 4], edi",
            "lea rcx, [rel __global_0]",
            "add eax, ecx",
            "jmp .exit",
            ".exit:",
            "__global_0: dd 3 ; x",
        ] {
            assert!(lines.contains(&expected), "missing `{expected}` in:\n{text}");
        }
    }

    #[test]
    fn printf_receives_doubles_in_vector_registers() {
        let text = asm(
            vec![Statement::function(
                "void",
                "main",
                vec![],
                vec![Statement::expression(Expression::call(
                    "printf",
                    vec![
                        Expression::string("%d %f\n"),
                        Expression::integer(1),
                        Expression::double(2.5),
                    ],
                ))],
            )],
            &CodegenOptions::default(),
        );

        let lines = lines(&text);
        let position = |needle: &str| {
            lines
                .iter()
                .position(|l| *l == needle)
                .unwrap_or_else(|| panic!("missing `{needle}` in:\n{text}"))
        };

        let float = position("movq xmm0, rax");
        let format = position("lea rdi, [rel __static_str_0]");
        let int = position("mov esi, 1");
        let count = position("mov eax, 1");
        let call = position("call printf wrt ..plt");

        assert!(float < format && format < int && int < count && count < call);
        assert!(lines.contains(&"__static_str_0: db \"%d %f\", 10, 0"));
        assert!(lines.contains(&"xor eax, eax"));
    }

    #[test]
    fn double_remainder_calls_fmod() {
        let text = asm(
            vec![Statement::function(
                "double",
                "r",
                vec![ParamDecl::new("double", "a"), ParamDecl::new("double", "b")],
                vec![Statement::ret(Some(Expression::binary(
                    BinaryOperatorKind::Modulus,
                    Expression::identifier("a"),
                    Expression::identifier("b"),
                )))],
            )],
            &CodegenOptions::default(),
        );

        let lines = lines(&text);

        assert!(lines.contains(&"movsd qword [rbp - 8], xmm0"));
        assert!(lines.contains(&"movsd qword [rbp - 24], xmm1"));
        assert!(lines.contains(&"call fmod wrt ..plt"));
        assert!(lines.contains(&"extern fmod"));
    }

    #[test]
    fn double_globals_are_emitted_as_raw_bits() {
        let text = asm(
            vec![Statement::global("double", "y", Some(Expression::integer(2)))],
            &CodegenOptions::default(),
        );

        assert!(
            lines(&text).contains(&"__global_0: dq 0x4000000000000000 ; y = 2.0"),
            "{text}"
        );
    }

    #[test]
    fn debug_comments_are_opt_in() {
        let program = || {
            vec![Statement::function(
                "int",
                "one",
                vec![],
                vec![Statement::ret(Some(Expression::integer(1)))],
            )]
        };

        let plain = asm(program(), &CodegenOptions::default());
        let annotated = asm(
            program(),
            &CodegenOptions {
                emit_debug_info: true,
            },
        );

        assert!(!plain.contains("; ret 1"));
        assert!(lines(&annotated).contains(&"; ret 1"));
    }

    #[test]
    fn strings_escape_quotes_and_control_characters() {
        assert_eq!(format_nasm_string("a\"b\n"), "\"a\", 34, \"b\", 10, 0");
        assert_eq!(format_nasm_string(""), "0");
        assert_eq!(format_nasm_string("\tx"), "9, \"x\", 0");
    }
}
