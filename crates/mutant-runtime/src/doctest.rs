//! Runs the examples embedded in documentation text.
//!
//! An example is a `>>> expression` line followed by the expected output,
//! which runs until a blank line or the next `>>>` prompt:
//!
//! ```text
//! >>> func1(4)
//! False
//! ```

use crate::expr::{eval, parse_expr};
use crate::interpreter::Interpreter;
use crate::module::Module;
use mutant_core::{Result, RuntimeConfig, TestOutcome};
use tracing::{debug, warn};

const PROMPT: &str = ">>>";
const CONTINUATION: &str = "...";
const TRACEBACK: &str = "Traceback (most recent call last):";

/// One `>>>` example
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub source: String,
    pub want: String,
    /// Zero-based line of the prompt within the documentation text
    pub line: usize,
}

impl Example {
    pub fn expects_error(&self) -> bool {
        self.want.starts_with(TRACEBACK)
    }
}

pub fn parse_examples(doc: &str) -> Vec<Example> {
    let lines: Vec<&str> = doc.lines().collect();
    let mut examples = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(source) = lines[i].trim_start().strip_prefix(PROMPT) else {
            i += 1;
            continue;
        };
        let line = i;
        let mut source = source.trim().to_string();
        i += 1;

        while let Some(more) = lines.get(i).and_then(|l| l.trim_start().strip_prefix(CONTINUATION)) {
            source.push(' ');
            source.push_str(more.trim());
            i += 1;
        }

        let mut want = Vec::new();
        while let Some(l) = lines.get(i) {
            let trimmed = l.trim();
            if trimmed.is_empty() || trimmed.starts_with(PROMPT) {
                break;
            }
            want.push(trimmed);
            i += 1;
        }

        examples.push(Example {
            source,
            want: want.join("\n"),
            line,
        });
    }

    examples
}

/// Runs a module's embedded examples and reports counts
pub trait TestHarness {
    /// Returns `(failures, attempts)` over every example in the module.
    /// With `quiet` set nothing is reported beyond the counts.
    fn run(&self, module: &Module, quiet: bool) -> Result<TestOutcome>;
}

pub struct DocTestHarness {
    runtime: RuntimeConfig,
}

impl DocTestHarness {
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self { runtime }
    }

    /// Run one example against the module's current bindings
    pub fn check(&self, module: &Module, example: &Example) -> std::result::Result<(), String> {
        let mut interp = Interpreter::new(module, self.runtime.clone());
        let result = parse_expr(&example.source).and_then(|expr| eval(&expr, &mut interp));

        match result {
            Ok(_) if example.expects_error() => {
                Err("expected an error, got a value".to_string())
            }
            Ok(obj) => {
                let got = if obj.is_none() { String::new() } else { obj.repr() };
                if got == example.want {
                    Ok(())
                } else {
                    Err(format!("got {:?}", got))
                }
            }
            Err(_) if example.expects_error() => Ok(()),
            Err(e) => Err(format!("raised {}", e)),
        }
    }

    fn run_doc(&self, module: &Module, owner: &str, doc: &str, quiet: bool) -> TestOutcome {
        let mut outcome = TestOutcome::default();
        for example in parse_examples(doc) {
            outcome.attempts += 1;
            if let Err(reason) = self.check(module, &example) {
                outcome.failures += 1;
                if !quiet {
                    warn!(
                        "Failed example in {}.{} line {}: {} (expected {:?}, {})",
                        module.name(),
                        owner,
                        example.line,
                        example.source,
                        example.want,
                        reason
                    );
                }
            }
        }
        outcome
    }
}

impl Default for DocTestHarness {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl TestHarness for DocTestHarness {
    fn run(&self, module: &Module, quiet: bool) -> Result<TestOutcome> {
        let mut outcome = TestOutcome::default();

        if let Some(doc) = module.doc() {
            outcome.merge(self.run_doc(module, module.name(), &doc, quiet));
        }
        for (name, function) in module.functions() {
            if let Some(doc) = function.docstring() {
                outcome.merge(self.run_doc(module, &name, doc, quiet));
            }
        }

        debug!(
            module = module.name(),
            failures = outcome.failures,
            attempts = outcome.attempts,
            "examples run"
        );
        Ok(outcome)
    }
}
