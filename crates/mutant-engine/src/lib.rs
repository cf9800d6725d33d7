//! Mutation testing engine.
//!
//! Installs each mutant in place of the original function, runs the module's
//! examples, and counts the mutants the examples fail to notice.

pub mod runner;
pub mod report;
pub mod orchestrator;

pub use runner::{Escape, MutationRunner, RunResult};
pub use report::{FunctionReport, ModuleReport, ReportAggregator, SkippedFunction};
pub use orchestrator::testmod;
