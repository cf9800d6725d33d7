//! Raw executable form: code objects and the functions that wrap them.

use crate::instruction::{decode, Instruction};
use crate::line_table::line_starts;
use mutant_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};

/// Code object flag: locals live in fast slots
pub const CO_OPTIMIZED: u32 = 0x0001;
/// Code object flag: a fresh local namespace per call
pub const CO_NEWLOCALS: u32 = 0x0002;

/// A compiled function body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeObject {
    pub argcount: u32,
    pub nlocals: u32,
    pub stack_size: u32,
    pub flags: u32,
    /// Raw instruction stream
    pub code: Vec<u8>,
    /// Literal pool; index 0 holds the documentation text
    pub consts: Vec<Value>,
    /// Global names referenced by `LOAD_GLOBAL`
    pub names: Vec<String>,
    /// Local variable names, parameters first
    pub varnames: Vec<String>,
    pub filename: String,
    pub name: String,
    pub first_line: u32,
    pub lnotab: Vec<u8>,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,
}

impl CodeObject {
    /// `(offset, line)` pairs where a new source line starts
    pub fn line_starts(&self) -> Result<Vec<(usize, u32)>> {
        line_starts(self.first_line, &self.lnotab)
    }

    /// Decode the instruction stream
    pub fn instructions(&self) -> Result<Vec<Instruction>> {
        decode(&self.code, &self.line_starts()?, self.first_line)
    }

    /// Source line of the instruction starting at `offset`
    pub fn line_at(&self, offset: usize) -> Result<u32> {
        Ok(self
            .line_starts()?
            .iter()
            .take_while(|(start, _)| *start <= offset)
            .last()
            .map(|(_, line)| *line)
            .unwrap_or(self.first_line))
    }

    pub fn docstring(&self) -> Option<&str> {
        match self.consts.first() {
            Some(Value::Str(doc)) => Some(doc),
            _ => None,
        }
    }
}

/// A callable function: code plus the values bound at definition time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Defaults for the trailing parameters
    pub defaults: Vec<Value>,
    pub code: CodeObject,
}

impl Function {
    pub fn new(code: CodeObject) -> Self {
        Self {
            name: code.name.clone(),
            defaults: Vec::new(),
            code,
        }
    }

    pub fn with_defaults(mut self, defaults: Vec<Value>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn docstring(&self) -> Option<&str> {
        self.code.docstring()
    }

    /// Human-readable listing, one instruction per line
    pub fn disassemble(&self) -> Result<String> {
        let mut out = String::new();
        for inst in self.code.instructions()? {
            out.push_str(&inst.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Opcode;

    fn sample_code() -> CodeObject {
        CodeObject {
            argcount: 1,
            nlocals: 1,
            stack_size: 2,
            flags: CO_OPTIMIZED | CO_NEWLOCALS,
            // LOAD_FAST 0; RETURN_VALUE
            code: vec![124, 0, 0, 83],
            consts: vec![Value::Str(">>> ident(1)\n1".into())],
            names: vec![],
            varnames: vec!["a".into()],
            filename: "sample.mt".into(),
            name: "ident".into(),
            first_line: 3,
            lnotab: vec![0, 1, 3, 1],
            freevars: vec![],
            cellvars: vec![],
        }
    }

    #[test]
    fn test_line_lookup() {
        let code = sample_code();
        assert_eq!(code.line_starts().unwrap(), vec![(0, 4), (3, 5)]);
        assert_eq!(code.line_at(0).unwrap(), 4);
        assert_eq!(code.line_at(3).unwrap(), 5);
    }

    #[test]
    fn test_instructions() {
        let instructions = sample_code().instructions().unwrap();
        assert_eq!(instructions.len(), 2);
        assert!(instructions[0].is(Opcode::LoadFast));
        assert_eq!(instructions[1].line, 5);
    }

    #[test]
    fn test_function_docstring() {
        let func = Function::new(sample_code());
        assert_eq!(func.name, "ident");
        assert_eq!(func.docstring(), Some(">>> ident(1)\n1"));
    }

    #[test]
    fn test_disassemble() {
        let listing = Function::new(sample_code()).disassemble().unwrap();
        assert_eq!(listing, "LOAD_FAST(0)<4>\nRETURN_VALUE<5>\n");
    }

    #[test]
    fn test_function_serialization() {
        let func = Function::new(sample_code()).with_defaults(vec![Value::Int(2)]);
        let bytes = func.to_bytes().unwrap();
        let deserialized = Function::from_bytes(&bytes).unwrap();
        assert_eq!(deserialized, func);
    }
}
