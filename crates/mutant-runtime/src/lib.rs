//! Execution environment for mutated functions.
//!
//! This crate provides what mutation testing needs from a host runtime:
//! - Module namespaces whose bindings can be swapped and restored
//! - A fuel-limited bytecode interpreter
//! - A harness that runs the examples embedded in documentation text

pub mod module;
pub mod interpreter;
pub mod expr;
pub mod doctest;
pub mod demo;

pub use module::{Lease, Module, ModuleSpec};
pub use interpreter::{Interpreter, Object};
pub use doctest::{parse_examples, DocTestHarness, Example, TestHarness};
