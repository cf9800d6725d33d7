//! Runs one strategy's mutants of one function against the module's examples.

use mutant_core::{MutationConfig, Result, StrategyKind};
use mutant_ir::{ExecutableUnit, Function, Mutator};
use mutant_runtime::{Module, TestHarness};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A mutant the examples did not detect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escape {
    pub function: String,
    pub strategy: StrategyKind,
    pub description: String,
}

/// Outcome of one function/strategy run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Mutants for which the examples still passed (escaped mutants)
    pub pass_count: usize,
    /// Mutants installed and tested
    pub mutant_count: usize,
    pub escapes: Vec<Escape>,
}

pub struct MutationRunner<'h> {
    harness: &'h dyn TestHarness,
    mutator: Mutator,
    stop_on_escape: bool,
}

impl<'h> MutationRunner<'h> {
    pub fn new(harness: &'h dyn TestHarness, config: MutationConfig) -> Self {
        let stop_on_escape = config.stop_on_escape;
        Self {
            harness,
            mutator: Mutator::new(config),
            stop_on_escape,
        }
    }

    /// Test every mutant `strategy` produces for `function`, bound as `name`.
    ///
    /// The original binding is restored before this returns, whether the run
    /// completes, stops early, fails, or unwinds.
    #[instrument(skip(self, module, function, rng), fields(module = module.name()))]
    pub fn run(
        &self,
        module: &Module,
        name: &str,
        function: &Arc<Function>,
        strategy: StrategyKind,
        rng: &mut ChaCha8Rng,
    ) -> Result<RunResult> {
        let unit = ExecutableUnit::decode(function)?;
        let mut result = RunResult::default();
        let mut lease = module.lease(name)?;

        for record in self.mutator.mutants(strategy, unit, rng) {
            lease.install(record.function);
            result.mutant_count += 1;

            match self.harness.run(module, true) {
                Ok(outcome) if outcome.failures == 0 => {
                    warn!(
                        "FAIL: tests still pass after '{}' in {}.{}",
                        record.description,
                        module.name(),
                        name
                    );
                    result.pass_count += 1;
                    result.escapes.push(Escape {
                        function: name.to_string(),
                        strategy,
                        description: record.description,
                    });
                    if self.stop_on_escape {
                        break;
                    }
                }
                Ok(outcome) => {
                    debug!(
                        "Killed '{}' ({} of {} examples failed)",
                        record.description, outcome.failures, outcome.attempts
                    );
                }
                Err(e) => {
                    debug!("Killed '{}' (harness error: {})", record.description, e);
                }
            }
        }

        drop(lease);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutant_core::{Error, TestOutcome};
    use mutant_runtime::demo::example_module;
    use mutant_runtime::DocTestHarness;
    use parking_lot::Mutex;
    use rand::SeedableRng;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn run(
        module: &Module,
        name: &str,
        strategy: StrategyKind,
        config: MutationConfig,
        harness: &dyn TestHarness,
    ) -> Result<RunResult> {
        let function = module.get(name).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        MutationRunner::new(harness, config).run(module, name, &function, strategy, &mut rng)
    }

    #[test]
    fn test_boundary_mutant_escapes_weak_examples() {
        let module = example_module().unwrap();
        let harness = DocTestHarness::default();
        let result = run(
            &module,
            "func1",
            StrategyKind::Comparison,
            MutationConfig::default(),
            &harness,
        )
        .unwrap();

        assert_eq!(result.mutant_count, 9);
        assert_eq!(result.pass_count, 1);
        assert_eq!(result.escapes[0].description, "changed > to >=");
        assert_eq!(result.escapes[0].function, "func1");
    }

    #[test]
    fn test_boundary_examples_kill_every_comparison() {
        let module = example_module().unwrap();
        let harness = DocTestHarness::default();
        let result = run(
            &module,
            "func2",
            StrategyKind::Comparison,
            MutationConfig::default(),
            &harness,
        )
        .unwrap();

        assert_eq!(result.mutant_count, 9);
        assert_eq!(result.pass_count, 0);
        assert!(result.escapes.is_empty());
    }

    #[test]
    fn test_stop_on_escape() {
        let module = example_module().unwrap();
        let harness = DocTestHarness::default();
        let config = MutationConfig {
            stop_on_escape: true,
            ..Default::default()
        };
        let result = run(&module, "func1", StrategyKind::Constant, config, &harness).unwrap();

        // None replacement is killed, then `added 1 to 5` escapes.
        assert_eq!(result.mutant_count, 2);
        assert_eq!(result.pass_count, 1);
        assert_eq!(result.escapes[0].description, "added 1 to 5");
    }

    #[test]
    fn test_original_restored_after_run() {
        let module = example_module().unwrap();
        let original = module.get("func1").unwrap();
        let harness = DocTestHarness::default();
        for strategy in StrategyKind::ALL {
            run(&module, "func1", strategy, MutationConfig::default(), &harness).unwrap();
            assert!(Arc::ptr_eq(&module.get("func1").unwrap(), &original));
        }
    }

    struct ErroringHarness;

    impl TestHarness for ErroringHarness {
        fn run(&self, _module: &Module, _quiet: bool) -> Result<TestOutcome> {
            Err(Error::Other("harness crashed".to_string()))
        }
    }

    #[test]
    fn test_harness_error_counts_as_killed() {
        let module = example_module().unwrap();
        let original = module.get("func2").unwrap();
        let result = run(
            &module,
            "func2",
            StrategyKind::Branch,
            MutationConfig::default(),
            &ErroringHarness,
        )
        .unwrap();

        assert_eq!(result.mutant_count, 1);
        assert_eq!(result.pass_count, 0);
        assert!(Arc::ptr_eq(&module.get("func2").unwrap(), &original));
    }

    /// Records which implementation was bound on each call, then panics
    struct PanickingHarness {
        seen: Mutex<Vec<Arc<Function>>>,
    }

    impl TestHarness for PanickingHarness {
        fn run(&self, module: &Module, _quiet: bool) -> Result<TestOutcome> {
            self.seen.lock().push(module.get("func1").unwrap());
            panic!("example runner aborted");
        }
    }

    #[test]
    fn test_original_restored_when_harness_panics() {
        let module = example_module().unwrap();
        let original = module.get("func1").unwrap();
        let harness = PanickingHarness {
            seen: Mutex::new(Vec::new()),
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            run(
                &module,
                "func1",
                StrategyKind::Comparison,
                MutationConfig::default(),
                &harness,
            )
        }));

        assert!(outcome.is_err());
        let seen = harness.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(!Arc::ptr_eq(&seen[0], &original));
        assert!(Arc::ptr_eq(&module.get("func1").unwrap(), &original));
    }

    #[test]
    fn test_unknown_binding() {
        let module = example_module().unwrap();
        let function = module.get("func1").unwrap();
        let harness = DocTestHarness::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = MutationRunner::new(&harness, MutationConfig::default())
            .run(&module, "missing", &function, StrategyKind::Branch, &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
