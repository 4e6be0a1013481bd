use std::collections::BTreeMap;

use crate::{
    backend::{EmitError, symbols},
    index::Index,
    middle::lir::{self, RegisterId},
};

/// Builds the NASM text of one function. Every virtual register lives in its
/// own slot below `rbp`; operations move values through fixed scratch
/// registers.
pub struct Assembler<'a> {
    output: String,
    function: &'a lir::FunctionDefinition,
    stack_frame_register_offset_map: &'a BTreeMap<RegisterId, usize>,
}

impl<'a> Assembler<'a> {
    pub fn new(
        function: &'a lir::FunctionDefinition,
        stack_frame_register_offset_map: &'a BTreeMap<RegisterId, usize>,
    ) -> Self {
        Self {
            output: String::new(),
            function,
            stack_frame_register_offset_map,
        }
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn push_line(&mut self, string: impl AsRef<str>) {
        self.output.push_str(string.as_ref());
        self.output.push('\n');
    }

    pub fn emit(&mut self, string: impl AsRef<str>) {
        self.output.push_str("    ");
        self.push_line(string);
    }

    pub fn global_label(&mut self, name: &str) {
        self.push_line(format!("global {name}"));
        self.push_line(format!("{name}:"));
    }

    pub fn label(&mut self, name: impl AsRef<str>) {
        self.push_line(format!("{}:", name.as_ref()));
    }

    pub fn comment(&mut self, comment: impl AsRef<str>) {
        self.emit(format!("; {}", comment.as_ref()));
    }

    pub fn function_prologue(&mut self, stack_frame_size: usize) {
        self.emit("push rbp");
        self.emit("mov rbp, rsp");

        if stack_frame_size > 0 {
            self.emit(format!("sub rsp, {stack_frame_size}"));
        }
    }

    pub fn function_epilogue(&mut self) {
        self.label(".exit");
        self.emit("mov rsp, rbp");
        self.emit("pop rbp");
        self.emit("ret");
    }

    pub fn slot(&self, register: RegisterId) -> Result<usize, EmitError> {
        self.stack_frame_register_offset_map
            .get(&register)
            .copied()
            .ok_or_else(|| {
                EmitError::Unsupported(format!("register %{} has no slot", register.index()))
            })
    }

    fn register_type(&self, register: RegisterId) -> Result<lir::Type, EmitError> {
        self.function
            .registers
            .get(&register)
            .map(|r| r.ty)
            .ok_or_else(|| {
                EmitError::Unsupported(format!("register %{} is undeclared", register.index()))
            })
    }

    /// Loads a non floating point operand into `destination`, returning the
    /// register view matching the operand's size
    pub fn load_operand(
        &mut self,
        destination: X86FullRegister,
        source: lir::Operand,
    ) -> Result<X86Register, EmitError> {
        let loaded = match source {
            lir::Operand::Immediate(lir::Immediate::Int(value)) => {
                let sized = destination.as_32_bit();
                self.emit(format!("mov {sized}, {value}"));
                sized
            }
            lir::Operand::Immediate(lir::Immediate::Bool(value)) => {
                let sized = destination.as_32_bit();
                self.emit(format!("mov {sized}, {}", value as u8));
                sized
            }
            lir::Operand::Immediate(lir::Immediate::StaticString(id)) => {
                self.emit(format!("lea {destination}, [rel {}]", symbols::static_string(id)));
                destination.as_64_bit()
            }
            lir::Operand::Immediate(lir::Immediate::Global(id)) => {
                self.emit(format!("lea {destination}, [rel {}]", symbols::global(id)));
                destination.as_64_bit()
            }
            lir::Operand::Immediate(lir::Immediate::Double(value)) => {
                return Err(EmitError::Unsupported(format!(
                    "double {value:?} loaded into general purpose register {destination}"
                )));
            }
            lir::Operand::Register(register_id) => {
                let offset = self.slot(register_id)?;

                match self.register_type(register_id)? {
                    lir::Type::Int => {
                        let sized = destination.as_32_bit();
                        self.emit(format!("mov {sized}, dword [rbp - {offset}]"));
                        sized
                    }
                    lir::Type::Bool => {
                        let sized = destination.as_32_bit();
                        self.emit(format!("movzx {sized}, byte [rbp - {offset}]"));
                        sized
                    }
                    lir::Type::Str | lir::Type::Pointer => {
                        self.emit(format!("mov {destination}, qword [rbp - {offset}]"));
                        destination.as_64_bit()
                    }
                    lir::Type::Double => {
                        return Err(EmitError::Unsupported(format!(
                            "double register %{} loaded into {destination}",
                            register_id.index()
                        )));
                    }
                }
            }
        };

        Ok(loaded)
    }

    /// Loads a double operand into an SSE register. Constants travel through
    /// `rax` as raw bits.
    pub fn load_float_operand(
        &mut self,
        destination: XmmRegister,
        source: lir::Operand,
    ) -> Result<(), EmitError> {
        match source {
            lir::Operand::Immediate(lir::Immediate::Double(value)) => {
                self.emit(format!("mov rax, 0x{:016X} ; {value:?}", value.to_bits()));
                self.emit(format!("movq {destination}, rax"));
            }
            lir::Operand::Register(register_id) => {
                if self.register_type(register_id)? != lir::Type::Double {
                    return Err(EmitError::Unsupported(format!(
                        "register %{} loaded into {destination} is not a double",
                        register_id.index()
                    )));
                }

                let offset = self.slot(register_id)?;
                self.emit(format!("movsd {destination}, qword [rbp - {offset}]"));
            }
            other @ lir::Operand::Immediate(_) => {
                return Err(EmitError::Unsupported(format!(
                    "non double operand {other:?} loaded into {destination}"
                )));
            }
        }

        Ok(())
    }

    pub fn store_operand(
        &mut self,
        destination: RegisterId,
        source: X86FullRegister,
    ) -> Result<(), EmitError> {
        let offset = self.slot(destination)?;

        match self.register_type(destination)? {
            lir::Type::Int => {
                self.emit(format!("mov dword [rbp - {offset}], {}", source.as_32_bit()))
            }
            lir::Type::Bool => {
                self.emit(format!("mov byte [rbp - {offset}], {}", source.as_8_bit()))
            }
            lir::Type::Str | lir::Type::Pointer => {
                self.emit(format!("mov qword [rbp - {offset}], {source}"))
            }
            lir::Type::Double => {
                return Err(EmitError::Unsupported(format!(
                    "general purpose register {source} stored into double register"
                )));
            }
        }

        Ok(())
    }

    pub fn store_float_operand(
        &mut self,
        destination: RegisterId,
        source: XmmRegister,
    ) -> Result<(), EmitError> {
        let offset = self.slot(destination)?;
        self.emit(format!("movsd qword [rbp - {offset}], {source}"));

        Ok(())
    }
}

/// SSE registers used for doubles
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum XmmRegister {
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
}

/// General Purpose Register 64-bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum X86FullRegister {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
}

impl X86FullRegister {
    pub fn as_64_bit(self) -> X86Register {
        match self {
            Self::Rax => X86Register::Rax,
            Self::Rbx => X86Register::Rbx,
            Self::Rcx => X86Register::Rcx,
            Self::Rdx => X86Register::Rdx,
            Self::Rsi => X86Register::Rsi,
            Self::Rdi => X86Register::Rdi,
            Self::Rbp => X86Register::Rbp,
            Self::Rsp => X86Register::Rsp,
            Self::R8 => X86Register::R8,
            Self::R9 => X86Register::R9,
            Self::R10 => X86Register::R10,
            Self::R11 => X86Register::R11,
        }
    }

    pub fn as_32_bit(self) -> X86Register {
        match self {
            Self::Rax => X86Register::Eax,
            Self::Rbx => X86Register::Ebx,
            Self::Rcx => X86Register::Ecx,
            Self::Rdx => X86Register::Edx,
            Self::Rsi => X86Register::Esi,
            Self::Rdi => X86Register::Edi,
            Self::Rbp => X86Register::Ebp,
            Self::Rsp => X86Register::Esp,
            Self::R8 => X86Register::R8d,
            Self::R9 => X86Register::R9d,
            Self::R10 => X86Register::R10d,
            Self::R11 => X86Register::R11d,
        }
    }

    pub fn as_8_bit(self) -> X86Register {
        match self {
            Self::Rax => X86Register::Al,
            Self::Rbx => X86Register::Bl,
            Self::Rcx => X86Register::Cl,
            Self::Rdx => X86Register::Dl,
            Self::Rsi => X86Register::Sil,
            Self::Rdi => X86Register::Dil,
            Self::Rbp => X86Register::Bpl,
            Self::Rsp => X86Register::Spl,
            Self::R8 => X86Register::R8b,
            Self::R9 => X86Register::R9b,
            Self::R10 => X86Register::R10b,
            Self::R11 => X86Register::R11b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[rustfmt::skip]
pub enum X86Register {
    // 64-bit
    Rax, Rbx, Rcx, Rdx,
    Rsi, Rdi, Rbp, Rsp,
    R8, R9, R10, R11,

    // 32-bit
    Eax, Ebx, Ecx, Edx,
    Esi, Edi, Ebp, Esp,
    R8d, R9d, R10d, R11d,

    // 8-bit low
    Al, Bl, Cl, Dl,
    Sil, Dil, Bpl, Spl,
    R8b, R9b, R10b, R11b,
}
