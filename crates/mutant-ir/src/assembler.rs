//! Assembler from symbolic instructions to code objects.

use crate::code::{CodeObject, Function, CO_NEWLOCALS, CO_OPTIMIZED};
use crate::instruction::{encode, offsets, CompareOp, Instruction, Opcode};
use crate::line_table::encode_line_table;
use crate::validation::validate_code;
use mutant_core::{Error, Result, Value};

/// A jump target, bound to an instruction position with [`Assembler::bind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone)]
struct Pending {
    opcode: Opcode,
    operand: Option<usize>,
    target: Option<Label>,
    line: u32,
}

pub struct Assembler {
    name: String,
    filename: String,
    first_line: u32,
    line: u32,
    argcount: u32,
    pending: Vec<Pending>,
    labels: Vec<Option<usize>>,
    consts: Vec<Value>,
    names: Vec<String>,
    varnames: Vec<String>,
    defaults: Vec<Value>,
}

impl Assembler {
    /// Start a function with the given parameter names
    pub fn new(name: &str, params: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            filename: "<assembled>".to_string(),
            first_line: 1,
            line: 1,
            argcount: params.len() as u32,
            pending: Vec::new(),
            labels: Vec::new(),
            consts: vec![Value::None],
            names: Vec::new(),
            varnames: params.iter().map(|p| p.to_string()).collect(),
            defaults: Vec::new(),
        }
    }

    pub fn filename(mut self, filename: &str) -> Self {
        self.filename = filename.to_string();
        self
    }

    /// Line of the function header; instructions start at this line too
    pub fn first_line(mut self, line: u32) -> Self {
        self.first_line = line;
        self.line = line;
        self
    }

    /// Documentation text stored in literal 0
    pub fn docstring(mut self, doc: &str) -> Self {
        self.consts[0] = Value::Str(doc.to_string());
        self
    }

    pub fn defaults(mut self, defaults: Vec<Value>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the source line for subsequently emitted instructions
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Intern a literal, never sharing the documentation slot
    pub fn constant(&mut self, value: Value) -> usize {
        if let Some(pos) = self.consts.iter().skip(1).position(|c| same_literal(c, &value)) {
            return pos + 1;
        }
        self.consts.push(value);
        self.consts.len() - 1
    }

    pub fn name(&mut self, name: &str) -> usize {
        intern(&mut self.names, name)
    }

    pub fn local(&mut self, name: &str) -> usize {
        intern(&mut self.varnames, name)
    }

    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.push(opcode, None, None)
    }

    pub fn emit_arg(&mut self, opcode: Opcode, operand: usize) -> &mut Self {
        self.push(opcode, Some(operand), None)
    }

    pub fn load_const(&mut self, value: Value) -> &mut Self {
        let index = self.constant(value);
        self.emit_arg(Opcode::LoadConst, index)
    }

    pub fn load_fast(&mut self, name: &str) -> &mut Self {
        let index = self.local(name);
        self.emit_arg(Opcode::LoadFast, index)
    }

    pub fn store_fast(&mut self, name: &str) -> &mut Self {
        let index = self.local(name);
        self.emit_arg(Opcode::StoreFast, index)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let index = self.name(name);
        self.emit_arg(Opcode::LoadGlobal, index)
    }

    pub fn compare(&mut self, op: CompareOp) -> &mut Self {
        self.emit_arg(Opcode::CompareOp, op.index() as usize)
    }

    pub fn call(&mut self, argc: usize) -> &mut Self {
        self.emit_arg(Opcode::CallFunction, argc)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn jump(&mut self, opcode: Opcode, target: Label) -> &mut Self {
        self.push(opcode, Some(0), Some(target))
    }

    /// Bind a label to the next emitted instruction
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.pending.len());
        self
    }

    fn push(&mut self, opcode: Opcode, operand: Option<usize>, target: Option<Label>) -> &mut Self {
        self.pending.push(Pending {
            opcode,
            operand,
            target,
            line: self.line,
        });
        self
    }

    /// Resolve labels, encode, and validate the result
    pub fn finish(self) -> Result<CodeObject> {
        let mut instructions = Vec::with_capacity(self.pending.len());
        for p in &self.pending {
            if p.opcode.has_operand() != p.operand.is_some() {
                return Err(Error::Validation(format!(
                    "{} emitted with wrong operand shape",
                    p.opcode
                )));
            }
            let operand = p.operand.map(to_operand).transpose()?;
            instructions.push(Instruction::from_raw(p.opcode.byte(), p.line, operand));
        }

        let positions = offsets(&instructions);
        let code_len: usize = instructions.iter().map(Instruction::width).sum();

        for (i, p) in self.pending.iter().enumerate() {
            let Some(label) = p.target else { continue };
            let index = self.labels[label.0].ok_or_else(|| {
                Error::Validation(format!("unbound label {} in {}", label.0, self.name))
            })?;
            let target = positions.get(index).copied().unwrap_or(code_len);
            let operand = if p.opcode.is_relative_jump() {
                let next = positions[i] + instructions[i].width();
                target.checked_sub(next).ok_or_else(|| {
                    Error::Validation(format!(
                        "{} at offset {} cannot jump backwards",
                        p.opcode, positions[i]
                    ))
                })?
            } else {
                target
            };
            instructions[i].operand = Some(to_operand(operand)?);
        }

        let mut starts: Vec<(usize, u32)> = Vec::new();
        for (inst, &offset) in instructions.iter().zip(&positions) {
            if starts.last().map(|&(_, line)| line) != Some(inst.line) {
                starts.push((offset, inst.line));
            }
        }
        let lnotab = encode_line_table(self.first_line, &starts)?;

        let mut depth = 0i32;
        let mut max_depth = 0i32;
        for inst in &instructions {
            if let Some(op) = inst.op() {
                depth = (depth + op.stack_effect(inst.arg())).max(0);
                max_depth = max_depth.max(depth);
            }
        }

        let code = CodeObject {
            argcount: self.argcount,
            nlocals: self.varnames.len() as u32,
            stack_size: max_depth as u32,
            flags: CO_OPTIMIZED | CO_NEWLOCALS,
            code: encode(&instructions),
            consts: self.consts,
            names: self.names,
            varnames: self.varnames,
            filename: self.filename,
            name: self.name,
            first_line: self.first_line,
            lnotab,
            freevars: Vec::new(),
            cellvars: Vec::new(),
        };
        validate_code(&code)?;
        Ok(code)
    }

    /// Finish and wrap as a function carrying the configured defaults
    pub fn build(mut self) -> Result<Function> {
        let defaults = std::mem::take(&mut self.defaults);
        Ok(Function::new(self.finish()?).with_defaults(defaults))
    }
}

/// Literal equality that keeps `0.0`/`-0.0` apart and lets NaN share a slot
fn same_literal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Tuple(xs), Value::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_literal(x, y))
        }
        _ => a == b,
    }
}

fn intern(table: &mut Vec<String>, name: &str) -> usize {
    if let Some(pos) = table.iter().position(|n| n == name) {
        return pos;
    }
    table.push(name.to_string());
    table.len() - 1
}

fn to_operand(value: usize) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| Error::Validation(format!("operand {} does not fit in 16 bits", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `if a > 5: return True` / `return False`
    fn threshold() -> Assembler {
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
        asm
    }

    #[test]
    fn test_assemble_threshold() {
        let code = threshold().finish().unwrap();

        assert_eq!(code.argcount, 1);
        assert_eq!(code.nlocals, 1);
        assert_eq!(code.stack_size, 2);
        assert_eq!(
            code.consts,
            vec![
                Value::Str(">>> threshold(8)\nTrue".into()),
                Value::Int(5),
                Value::Bool(true),
                Value::Bool(false),
            ]
        );
        assert_eq!(
            code.code,
            vec![124, 0, 0, 100, 1, 0, 107, 4, 0, 114, 16, 0, 100, 2, 0, 83, 100, 3, 0, 83]
        );
        assert_eq!(code.line_starts().unwrap(), vec![(0, 2), (12, 3), (16, 4)]);
    }

    #[test]
    fn test_relative_jump_resolution() {
        let mut asm = Assembler::new("skip", &[]);
        let end = asm.new_label();
        asm.jump(Opcode::JumpForward, end)
            .emit(Opcode::Nop)
            .bind(end)
            .load_const(Value::None)
            .emit(Opcode::ReturnValue);
        let code = asm.finish().unwrap();
        assert_eq!(&code.code[..3], &[110, 1, 0]);
    }

    #[test]
    fn test_constants_are_interned() {
        let mut asm = Assembler::new("f", &[]);
        assert_eq!(asm.constant(Value::Int(1)), 1);
        assert_eq!(asm.constant(Value::Int(2)), 2);
        assert_eq!(asm.constant(Value::Int(1)), 1);
        // The documentation slot is never reused for an equal literal.
        assert_eq!(asm.constant(Value::None), 3);
    }

    #[test]
    fn test_signed_zeros_get_separate_slots() {
        let mut asm = Assembler::new("f", &[]);
        assert_eq!(asm.constant(Value::Float(0.0)), 1);
        assert_eq!(asm.constant(Value::Float(-0.0)), 2);
        assert_eq!(asm.constant(Value::Float(-0.0)), 2);
        assert_eq!(asm.constant(Value::Tuple(vec![Value::Float(-0.0)])), 3);
        assert_eq!(asm.constant(Value::Tuple(vec![Value::Float(0.0)])), 4);
        assert_eq!(asm.constant(Value::Float(f64::NAN)), 5);
        assert_eq!(asm.constant(Value::Float(f64::NAN)), 5);
    }

    #[test]
    fn test_negative_zero_survives_assembly() {
        let mut asm = Assembler::new("f", &[]);
        asm.load_const(Value::Float(0.0))
            .emit(Opcode::PopTop)
            .load_const(Value::Float(-0.0))
            .emit(Opcode::ReturnValue);
        let code = asm.finish().unwrap();

        assert_eq!(code.code, vec![100, 1, 0, 1, 100, 2, 0, 83]);
        match code.consts[2] {
            Value::Float(v) => assert!(v.is_sign_negative()),
            ref other => panic!("expected a float, got {:?}", other),
        }
    }

    #[test]
    fn test_unbound_label() {
        let mut asm = Assembler::new("f", &[]);
        let nowhere = asm.new_label();
        asm.jump(Opcode::JumpAbsolute, nowhere);
        assert!(asm.finish().is_err());
    }

    #[test]
    fn test_backward_relative_jump_rejected() {
        let mut asm = Assembler::new("f", &[]);
        let top = asm.new_label();
        asm.bind(top).emit(Opcode::Nop).jump(Opcode::JumpForward, top);
        assert!(asm.finish().is_err());
    }

    #[test]
    fn test_build_with_defaults() {
        let mut asm = Assembler::new("inc", &["a", "step"]).defaults(vec![Value::Int(1)]);
        asm.load_fast("a")
            .load_fast("step")
            .emit(Opcode::BinaryAdd)
            .emit(Opcode::ReturnValue);
        let func = asm.build().unwrap();
        assert_eq!(func.name, "inc");
        assert_eq!(func.defaults, vec![Value::Int(1)]);
    }
}
