//! Validation for code objects.

use crate::code::{CodeObject, Function};
use crate::instruction::{offsets, CompareOp, Opcode};
use mutant_core::{Error, Result};
use std::collections::HashSet;

/// Validate that a code object is well-formed
pub fn validate_code(code: &CodeObject) -> Result<()> {
    if code.varnames.len() != code.nlocals as usize {
        return Err(Error::Validation(format!(
            "{}: {} local names for {} locals",
            code.name,
            code.varnames.len(),
            code.nlocals
        )));
    }
    if code.argcount > code.nlocals {
        return Err(Error::Validation(format!(
            "{}: {} parameters exceed {} locals",
            code.name, code.argcount, code.nlocals
        )));
    }

    let instructions = code.instructions()?;
    let positions = offsets(&instructions);
    let boundaries: HashSet<usize> = positions.iter().copied().collect();

    for (inst, &offset) in instructions.iter().zip(&positions) {
        let op = inst.op().ok_or_else(|| {
            Error::Validation(format!(
                "{}: unknown opcode {} at offset {}",
                code.name, inst.opcode, offset
            ))
        })?;
        let arg = inst.arg() as usize;

        let limit = match op {
            Opcode::LoadConst => Some(("literal", code.consts.len())),
            Opcode::LoadFast | Opcode::StoreFast => Some(("local", code.nlocals as usize)),
            Opcode::LoadGlobal => Some(("name", code.names.len())),
            Opcode::CompareOp => Some(("comparison", CompareOp::TABLE.len())),
            _ => None,
        };
        if let Some((kind, len)) = limit {
            if arg >= len {
                return Err(Error::Validation(format!(
                    "{}: {} index {} out of range at offset {}",
                    code.name, kind, arg, offset
                )));
            }
        }

        if op.is_jump() {
            let target = if op.is_relative_jump() {
                offset + inst.width() + arg
            } else {
                arg
            };
            if !boundaries.contains(&target) {
                return Err(Error::Validation(format!(
                    "{}: {} at offset {} targets {}, not an instruction",
                    code.name, op, offset, target
                )));
            }
        }
    }

    Ok(())
}

/// Validate a function and its code
pub fn validate_function(func: &Function) -> Result<()> {
    validate_code(&func.code)?;
    if func.defaults.len() > func.code.argcount as usize {
        return Err(Error::Validation(format!(
            "{}: {} defaults for {} parameters",
            func.name,
            func.defaults.len(),
            func.code.argcount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use mutant_core::Value;

    fn identity() -> CodeObject {
        let mut asm = Assembler::new("identity", &["a"]);
        asm.load_fast("a").emit(Opcode::ReturnValue);
        asm.finish().unwrap()
    }

    #[test]
    fn test_validate_valid_code() {
        assert!(validate_code(&identity()).is_ok());
    }

    #[test]
    fn test_validate_unknown_opcode() {
        let mut code = identity();
        code.code[3] = 3;
        assert!(validate_code(&code).is_err());
    }

    #[test]
    fn test_validate_literal_out_of_range() {
        let mut code = identity();
        code.code = vec![100, 7, 0, 83];
        assert!(validate_code(&code).is_err());
    }

    #[test]
    fn test_validate_jump_into_operand() {
        let mut code = identity();
        // JUMP_ABSOLUTE 1 lands inside its own operand
        code.code = vec![113, 1, 0, 83];
        assert!(validate_code(&code).is_err());
    }

    #[test]
    fn test_validate_truncated_stream() {
        let mut code = identity();
        code.code = vec![124, 0];
        assert!(matches!(validate_code(&code), Err(Error::Decode(_))));
    }

    #[test]
    fn test_validate_line_table_overflow() {
        let mut code = identity();
        code.first_line = u32::MAX;
        code.lnotab = vec![3, 1];
        assert!(matches!(validate_code(&code), Err(Error::Decode(_))));
    }

    #[test]
    fn test_validate_defaults() {
        let func = Function::new(identity()).with_defaults(vec![Value::Int(1), Value::Int(2)]);
        assert!(validate_function(&func).is_err());
    }
}
