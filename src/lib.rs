//! micro-C semantic analysis and code generation. A parser hands over the
//! program tree, [`middle::lowering`] checks and lowers it into
//! [`middle::lir`], and [`backend`] turns that into x86_64 assembly.

#[macro_use]
mod log;

pub mod backend;
pub mod frontend;
pub mod index;
pub mod middle;
