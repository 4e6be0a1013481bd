//! Name resolution, type checking and lowering of the program tree into LIR
//! happen in one pass here.

pub mod lir;
pub mod lowering;
pub mod scope;
