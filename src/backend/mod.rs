//! The backend turns a lowered [`lir::Module`] into native code. Assembly
//! text is produced by the [`targets`] for the host, then handed to `nasm`
//! for an object file and optionally to the system C compiler driver for an
//! executable linked against libc.

use std::{
    path::Path,
    process::{Command, Output},
};

use mktemp::Temp;
use thiserror::Error;

use crate::middle::lir;

pub mod assemblers;
pub mod targets;

pub use targets::{CodeGenerator, Target};

#[derive(Debug, Clone, Default)]
pub struct CodegenOptions {
    /// Annotate the assembly with the LIR instruction each line came from
    pub emit_debug_info: bool,
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("assembler `{program}` failed: {stderr}")]
    AssemblerFailed { program: String, stderr: String },

    #[error("linker `{program}` failed: {stderr}")]
    LinkerFailed { program: String, stderr: String },

    #[error("unsupported by the backend: {0}")]
    Unsupported(String),
}

/// Symbol names shared by the code generators
pub(crate) mod symbols {
    use crate::{index::Index, middle::lir};

    pub fn global(id: lir::GlobalId) -> String {
        format!("__global_{}", id.index())
    }

    pub fn static_string(id: lir::StaticLabelId) -> String {
        format!("__static_str_{}", id.index())
    }
}

/// Produces assembly text for the host target
pub fn translate_to_asm(module: &lir::Module, options: &CodegenOptions) -> Result<String, EmitError> {
    Target::host()?.get_code_generator().translate_to_asm(module, options)
}

/// Assembles `module` into a relocatable object file at `output_file`
pub fn emit_object(
    module: &lir::Module,
    output_file: &Path,
    options: &CodegenOptions,
) -> Result<(), EmitError> {
    let generator = Target::host()?.get_code_generator();
    let asm = generator.translate_to_asm(module, options)?;

    // removed again when dropped
    let asm_file = Temp::new_file()?;
    std::fs::write(asm_file.as_path(), asm)?;

    codegen_log!("assembling {} into {}", asm_file.as_path().display(), output_file.display());

    let mut command = generator.create_assembler_command(asm_file.as_path(), output_file);
    let output = command.output()?;

    if !output.status.success() {
        return Err(EmitError::AssemblerFailed {
            program: program_name(&command),
            stderr: stderr_text(&output),
        });
    }

    Ok(())
}

/// Links an object file produced by [`emit_object`] into an executable
pub fn link_executable(object_file: &Path, output_file: &Path) -> Result<(), EmitError> {
    let generator = Target::host()?.get_code_generator();

    codegen_log!("linking {} into {}", object_file.display(), output_file.display());

    let mut command = generator.create_linker_command(object_file, output_file);
    let output = command.output()?;

    if !output.status.success() {
        return Err(EmitError::LinkerFailed {
            program: program_name(&command),
            stderr: stderr_text(&output),
        });
    }

    Ok(())
}

fn program_name(command: &Command) -> String {
    command.get_program().to_string_lossy().into_owned()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_owned()
}
