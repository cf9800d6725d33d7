//! Decoded, editable view of a function.

use crate::code::{CodeObject, Function};
use crate::instruction::{encode, Instruction};
use mutant_core::{Result, Value};
use std::sync::Arc;

/// A function decoded into instructions and literals that can be edited and
/// rebuilt. Literal 0 is held apart and always written back unchanged.
#[derive(Debug, Clone)]
pub struct ExecutableUnit {
    original: Arc<Function>,
    pub instructions: Vec<Instruction>,
    docstring: Option<Value>,
    /// Mutation-eligible literals (pool index 1 onwards)
    pub consts: Vec<Value>,
}

impl ExecutableUnit {
    pub fn decode(function: &Arc<Function>) -> Result<Self> {
        let instructions = function.code.instructions()?;
        let mut consts = function.code.consts.iter().cloned();
        let docstring = consts.next();

        Ok(Self {
            original: Arc::clone(function),
            instructions,
            docstring,
            consts: consts.collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.original.name
    }

    pub fn original(&self) -> &Arc<Function> {
        &self.original
    }

    pub fn docstring(&self) -> Option<&Value> {
        self.docstring.as_ref()
    }

    /// Rebuild a callable function from the current instructions and literals
    pub fn build(&self) -> Function {
        let source = &self.original.code;
        let mut consts = Vec::with_capacity(self.consts.len() + 1);
        consts.extend(self.docstring.iter().cloned());
        consts.extend(self.consts.iter().cloned());

        let code = CodeObject {
            code: encode(&self.instructions),
            consts,
            ..source.clone()
        };

        Function {
            name: self.original.name.clone(),
            defaults: self.original.defaults.clone(),
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::instruction::{CompareOp, Opcode};

    fn threshold() -> Arc<Function> {
        let mut asm = Assembler::new("threshold", &["a"])
            .first_line(1)
            .docstring(">>> threshold(8)\nTrue");
        let otherwise = asm.new_label();
        asm.line(2)
            .load_fast("a")
            .load_const(Value::Int(5))
            .compare(CompareOp::Gt)
            .jump(Opcode::PopJumpIfFalse, otherwise);
        asm.line(3).load_const(Value::Bool(true)).emit(Opcode::ReturnValue);
        asm.bind(otherwise);
        asm.line(4).load_const(Value::Bool(false)).emit(Opcode::ReturnValue);
        Arc::new(asm.build().unwrap())
    }

    #[test]
    fn test_decode_splits_docstring() {
        let unit = ExecutableUnit::decode(&threshold()).unwrap();
        assert_eq!(
            unit.docstring(),
            Some(&Value::Str(">>> threshold(8)\nTrue".into()))
        );
        assert_eq!(
            unit.consts,
            vec![Value::Int(5), Value::Bool(true), Value::Bool(false)]
        );
        assert_eq!(unit.instructions.len(), 8);
        assert_eq!(unit.instructions[4].line, 3);
    }

    #[test]
    fn test_unmodified_build_is_identical() {
        let original = threshold();
        let unit = ExecutableUnit::decode(&original).unwrap();
        assert_eq!(unit.build(), *original);
    }

    #[test]
    fn test_build_preserves_metadata() {
        let original = threshold();
        let mut unit = ExecutableUnit::decode(&original).unwrap();
        unit.consts[0] = Value::Int(6);
        unit.instructions[2].operand = Some(CompareOp::Ge.index());

        let rebuilt = unit.build();
        assert_eq!(rebuilt.code.consts[0], original.code.consts[0]);
        assert_eq!(rebuilt.code.consts[1], Value::Int(6));
        assert_eq!(rebuilt.code.code[7], CompareOp::Ge.index() as u8);
        assert_eq!(rebuilt.code.lnotab, original.code.lnotab);
        assert_eq!(rebuilt.code.varnames, original.code.varnames);
        assert_eq!(rebuilt.code.stack_size, original.code.stack_size);
        assert_eq!(rebuilt.code.first_line, original.code.first_line);
    }

    #[test]
    fn test_empty_literal_pool() {
        let mut code = threshold().code.clone();
        code.code = vec![9, 9];
        code.consts.clear();
        let func = Arc::new(Function::new(code));

        let unit = ExecutableUnit::decode(&func).unwrap();
        assert!(unit.docstring().is_none());
        assert!(unit.consts.is_empty());
        assert!(unit.build().code.consts.is_empty());
    }
}
