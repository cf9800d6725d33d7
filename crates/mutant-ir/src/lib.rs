//! Bytecode representation of mutable functions.
//!
//! This crate defines the executable form that mutation testing operates on:
//! - Raw code objects: instruction bytes, literal pool and pass-through metadata
//! - A structured instruction model with decode/encode and line tracking
//! - An assembler for producing well-formed code objects
//! - The comparison, constant and branch mutation strategies

pub mod instruction;
pub mod line_table;
pub mod code;
pub mod assembler;
pub mod unit;
pub mod mutation;
pub mod validation;

pub use instruction::{decode, encode, CompareOp, Instruction, Opcode, HAVE_ARGUMENT};
pub use code::{CodeObject, Function};
pub use assembler::{Assembler, Label};
pub use unit::ExecutableUnit;
pub use mutation::{MutationRecord, Mutants, Mutator};
pub use validation::{validate_code, validate_function};
