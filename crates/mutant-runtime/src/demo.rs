//! Built-in `example` module: the same threshold check tested two ways.

use crate::module::Module;
use mutant_core::{Result, Value};
use mutant_ir::{Assembler, CompareOp, Function, Opcode};

pub const MODULE_NAME: &str = "example";

const UNDER_TESTED_DOC: &str = "
    Misses the boundary cases a=5 and a=6, so some mutants survive.

    >>> func1(4)
    False
    >>> func1(8)
    True
    ";

const WELL_TESTED_DOC: &str = "
    Pins down the boundary, so every mutant is caught.

    >>> func2(4)
    False
    >>> func2(5)
    False
    >>> func2(6)
    True
    >>> func2(7)
    True
    ";

/// `if a > 5: return True` then `return False`, starting at `first_line`
fn threshold(name: &str, doc: &str, first_line: u32, body_line: u32) -> Result<Function> {
    let mut asm = Assembler::new(name, &["a"])
        .filename("example.mt")
        .first_line(first_line)
        .docstring(doc);
    let otherwise = asm.new_label();

    asm.line(body_line)
        .load_fast("a")
        .load_const(Value::Int(5))
        .compare(CompareOp::Gt)
        .jump(Opcode::PopJumpIfFalse, otherwise);
    asm.line(body_line + 1)
        .load_const(Value::Bool(true))
        .emit(Opcode::ReturnValue);
    asm.bind(otherwise);
    asm.line(body_line + 2)
        .load_const(Value::Bool(false))
        .emit(Opcode::ReturnValue);

    asm.build()
}

pub fn example_module() -> Result<Module> {
    let module = Module::new(MODULE_NAME);
    module.define(threshold("func1", UNDER_TESTED_DOC, 1, 10)?);
    module.define(threshold("func2", WELL_TESTED_DOC, 14, 27)?);
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctest::{DocTestHarness, TestHarness};
    use mutant_core::TestOutcome;

    #[test]
    fn test_example_module_passes_baseline() {
        let module = example_module().unwrap();
        let outcome = DocTestHarness::default().run(&module, true).unwrap();
        assert_eq!(outcome, TestOutcome::new(0, 6));
    }

    #[test]
    fn test_example_module_lines() {
        let module = example_module().unwrap();
        let func2 = module.get("func2").unwrap();
        let lines: Vec<u32> = func2
            .code
            .instructions()
            .unwrap()
            .iter()
            .map(|inst| inst.line)
            .collect();
        assert_eq!(lines, vec![27, 27, 27, 27, 28, 28, 29, 29]);
        assert_eq!(func2.code.first_line, 14);
    }
}
