//! Module-level totals.

use crate::runner::{Escape, RunResult};
use mutant_core::{Error, StrategyKind, TestOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counts for one function under one strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReport {
    pub function: String,
    pub strategy: StrategyKind,
    pub pass_count: usize,
    pub mutant_count: usize,
}

/// A function that could not be mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFunction {
    pub function: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: String,
    /// Outcome of the un-mutated examples
    pub baseline: TestOutcome,
    /// Set when the un-mutated examples fail; no mutants were run
    pub baseline_failed: bool,
    /// Mutants the examples did not detect
    pub escaped: usize,
    /// Mutants installed and tested
    pub attempted: usize,
    pub results: Vec<FunctionReport>,
    pub escapes: Vec<Escape>,
    #[serde(default)]
    pub skipped: Vec<SkippedFunction>,
}

impl ModuleReport {
    pub fn baseline_failure(module: &str, baseline: TestOutcome) -> Self {
        Self {
            module: module.to_string(),
            baseline,
            baseline_failed: true,
            ..Default::default()
        }
    }

    /// `Err(BaselineFailed)` when the un-mutated examples failed
    pub fn check_baseline(&self) -> mutant_core::Result<()> {
        if self.baseline_failed {
            return Err(Error::BaselineFailed {
                failures: self.baseline.failures,
                attempts: self.baseline.attempts,
            });
        }
        Ok(())
    }

    /// `(escaped, attempted)`
    pub fn totals(&self) -> (usize, usize) {
        (self.escaped, self.attempted)
    }

    /// Fraction of attempted mutants the examples detected
    pub fn kill_ratio(&self) -> Option<f64> {
        if self.attempted == 0 {
            return None;
        }
        Some((self.attempted - self.escaped) as f64 / self.attempted as f64)
    }

    pub fn to_json(&self) -> mutant_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for ModuleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.escaped, self.attempted)
    }
}

/// Accumulates per-run results into a `ModuleReport`
pub struct ReportAggregator {
    report: ModuleReport,
}

impl ReportAggregator {
    pub fn new(module: &str, baseline: TestOutcome) -> Self {
        Self {
            report: ModuleReport {
                module: module.to_string(),
                baseline,
                ..Default::default()
            },
        }
    }

    pub fn record(&mut self, function: &str, strategy: StrategyKind, result: RunResult) {
        self.report.escaped += result.pass_count;
        self.report.attempted += result.mutant_count;
        self.report.results.push(FunctionReport {
            function: function.to_string(),
            strategy,
            pass_count: result.pass_count,
            mutant_count: result.mutant_count,
        });
        self.report.escapes.extend(result.escapes);
    }

    pub fn skip(&mut self, function: &str, error: &Error) {
        self.report.skipped.push(SkippedFunction {
            function: function.to_string(),
            reason: error.to_string(),
        });
    }

    pub fn totals(&self) -> (usize, usize) {
        self.report.totals()
    }

    pub fn finish(self) -> ModuleReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(pass_count: usize, mutant_count: usize) -> RunResult {
        RunResult {
            pass_count,
            mutant_count,
            escapes: (0..pass_count)
                .map(|i| Escape {
                    function: "f".to_string(),
                    strategy: StrategyKind::Constant,
                    description: format!("added 1 to {}", i),
                })
                .collect(),
        }
    }

    #[test]
    fn test_aggregation() {
        let mut agg = ReportAggregator::new("m", TestOutcome::new(0, 3));
        agg.record("f", StrategyKind::Comparison, result(1, 9));
        agg.record("f", StrategyKind::Constant, result(2, 6));
        agg.record("g", StrategyKind::Branch, result(0, 1));
        assert_eq!(agg.totals(), (3, 16));

        let report = agg.finish();
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.escapes.len(), 3);
        assert!(!report.baseline_failed);
        assert_eq!(report.to_string(), "(3, 16)");
        assert!(report.check_baseline().is_ok());
    }

    #[test]
    fn test_empty_module() {
        let report = ReportAggregator::new("m", TestOutcome::default()).finish();
        assert_eq!(report.totals(), (0, 0));
        assert_eq!(report.kill_ratio(), None);
    }

    #[test]
    fn test_baseline_failure_report() {
        let report = ModuleReport::baseline_failure("m", TestOutcome::new(1, 4));
        assert!(report.baseline_failed);
        assert_eq!(report.totals(), (0, 0));
        assert!(report.results.is_empty());
        assert!(matches!(
            report.check_baseline(),
            Err(Error::BaselineFailed { failures: 1, attempts: 4 })
        ));
    }

    #[test]
    fn test_skipped_function() {
        let mut agg = ReportAggregator::new("m", TestOutcome::new(0, 1));
        agg.skip("broken", &Error::Decode("truncated operand at offset 3".to_string()));
        let report = agg.finish();
        assert_eq!(report.skipped[0].function, "broken");
        assert!(report.skipped[0].reason.contains("truncated operand"));
    }

    #[test]
    fn test_report_json() {
        let mut agg = ReportAggregator::new("m", TestOutcome::new(0, 2));
        agg.record("f", StrategyKind::Comparison, result(1, 4));
        let report = agg.finish();

        let json = report.to_json().unwrap();
        assert!(json.contains("\"strategy\": \"comparison\""));
        let back: ModuleReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.kill_ratio(), Some(0.75));
    }
}
