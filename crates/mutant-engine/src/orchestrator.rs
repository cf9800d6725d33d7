//! Module-level mutation run.

use crate::report::{ModuleReport, ReportAggregator};
use crate::runner::MutationRunner;
use mutant_core::{Error, MutationConfig, Result};
use mutant_runtime::{Module, TestHarness};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, instrument, warn};

/// Mutation-test every function of `module` with every configured strategy.
///
/// The un-mutated examples must pass first. When they don't, the returned
/// report has `baseline_failed` set and nothing is installed.
#[instrument(skip(module, harness, config), fields(module = module.name()))]
pub fn testmod(
    module: &Module,
    harness: &dyn TestHarness,
    config: &MutationConfig,
) -> Result<ModuleReport> {
    let baseline = harness.run(module, true)?;
    if !baseline.passed() {
        warn!(
            failures = baseline.failures,
            attempts = baseline.attempts,
            "Un-mutated tests fail, skipping {}",
            module.name()
        );
        return Ok(ModuleReport::baseline_failure(module.name(), baseline));
    }

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let runner = MutationRunner::new(harness, config.clone());
    let mut aggregator = ReportAggregator::new(module.name(), baseline);

    info!(
        "Mutating {} functions of {} ({} examples)",
        module.len(),
        module.name(),
        baseline.attempts
    );

    for (name, function) in module.functions() {
        for &strategy in &config.strategies {
            match runner.run(module, &name, &function, strategy, &mut rng) {
                Ok(result) => aggregator.record(&name, strategy, result),
                Err(e @ (Error::Decode(_) | Error::Validation(_))) => {
                    error!("Cannot mutate {}.{}: {}", module.name(), name, e);
                    aggregator.skip(&name, &e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
    }

    let report = aggregator.finish();
    info!(
        escaped = report.escaped,
        attempted = report.attempted,
        "Finished {}",
        module.name()
    );
    Ok(report)
}
