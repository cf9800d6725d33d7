//! Core type definitions shared across the toolkit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal constant as stored in a function's literal pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Truth value used by conditional jumps and `UNARY_NOT`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Source-like representation, as printed by the example harness.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format!("{:?}", v),
            Value::Str(s) => quote(s),
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
        }
    }
}

fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

/// Plain string form: strings print without quotes, everything else as `repr`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

/// The fixed family of mutation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Comparison,
    Constant,
    Branch,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Comparison,
        StrategyKind::Constant,
        StrategyKind::Branch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Comparison => "comparison",
            StrategyKind::Constant => "constant",
            StrategyKind::Branch => "branch",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts reported by one run of a module's examples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub failures: usize,
    pub attempts: usize,
}

impl TestOutcome {
    pub fn new(failures: usize, attempts: usize) -> Self {
        Self { failures, attempts }
    }

    pub fn passed(&self) -> bool {
        self.failures == 0
    }

    pub fn merge(&mut self, other: TestOutcome) {
        self.failures += other.failures;
        self.attempts += other.attempts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_repr() {
        assert_eq!(Value::None.repr(), "None");
        assert_eq!(Value::Bool(true).repr(), "True");
        assert_eq!(Value::Int(-3).repr(), "-3");
        assert_eq!(Value::Float(1.0).repr(), "1.0");
        assert_eq!(Value::Str("abc".into()).repr(), "'abc'");
        assert_eq!(Value::Str("it's".into()).repr(), "\"it's\"");
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(
            Value::Tuple(vec![Value::Int(1), Value::Str("x".into())]).repr(),
            "(1, 'x')"
        );
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Str("abc".into()).to_string(), "abc");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::None.to_string(), "None");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(2).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Tuple(vec![Value::None]).is_truthy());
    }

    #[test]
    fn test_strategy_serialization() {
        let json = serde_json::to_string(&StrategyKind::ALL).unwrap();
        assert_eq!(json, r#"["comparison","constant","branch"]"#);
        assert!(serde_json::from_str::<StrategyKind>(r#""arithmetic""#).is_err());
    }

    #[test]
    fn test_outcome_merge() {
        let mut total = TestOutcome::default();
        total.merge(TestOutcome::new(1, 3));
        total.merge(TestOutcome::new(0, 2));
        assert_eq!(total, TestOutcome::new(1, 5));
        assert!(!total.passed());
    }
}
