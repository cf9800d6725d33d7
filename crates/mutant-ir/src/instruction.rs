//! Instruction set and the raw byte encoding of instruction streams.

use mutant_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Opcodes at or above this value carry a two-byte operand.
pub const HAVE_ARGUMENT: u8 = 90;

/// Returns true if the raw opcode byte is followed by an operand
pub fn has_operand(opcode: u8) -> bool {
    opcode >= HAVE_ARGUMENT
}

/// Known opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // Stack manipulation
    PopTop = 1,
    RotTwo = 2,
    DupTop = 4,
    Nop = 9,

    // Unary
    UnaryPositive = 10,
    UnaryNegative = 11,
    UnaryNot = 12,

    // Binary
    BinaryMultiply = 20,
    BinaryModulo = 22,
    BinaryAdd = 23,
    BinarySubtract = 24,
    BinarySubscr = 25,
    BinaryFloorDivide = 26,

    ReturnValue = 83,

    // Operand-taking
    LoadConst = 100,
    BuildTuple = 102,
    CompareOp = 107,
    JumpForward = 110,
    JumpIfFalse = 111,
    JumpIfTrue = 112,
    JumpAbsolute = 113,
    PopJumpIfFalse = 114,
    PopJumpIfTrue = 115,
    LoadGlobal = 116,
    LoadFast = 124,
    StoreFast = 125,
    CallFunction = 131,
}

impl Opcode {
    pub const ALL: [Opcode; 27] = [
        Opcode::PopTop,
        Opcode::RotTwo,
        Opcode::DupTop,
        Opcode::Nop,
        Opcode::UnaryPositive,
        Opcode::UnaryNegative,
        Opcode::UnaryNot,
        Opcode::BinaryMultiply,
        Opcode::BinaryModulo,
        Opcode::BinaryAdd,
        Opcode::BinarySubtract,
        Opcode::BinarySubscr,
        Opcode::BinaryFloorDivide,
        Opcode::ReturnValue,
        Opcode::LoadConst,
        Opcode::BuildTuple,
        Opcode::CompareOp,
        Opcode::JumpForward,
        Opcode::JumpIfFalse,
        Opcode::JumpIfTrue,
        Opcode::JumpAbsolute,
        Opcode::PopJumpIfFalse,
        Opcode::PopJumpIfTrue,
        Opcode::LoadGlobal,
        Opcode::LoadFast,
        Opcode::StoreFast,
        Opcode::CallFunction,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::PopTop => "POP_TOP",
            Opcode::RotTwo => "ROT_TWO",
            Opcode::DupTop => "DUP_TOP",
            Opcode::Nop => "NOP",
            Opcode::UnaryPositive => "UNARY_POSITIVE",
            Opcode::UnaryNegative => "UNARY_NEGATIVE",
            Opcode::UnaryNot => "UNARY_NOT",
            Opcode::BinaryMultiply => "BINARY_MULTIPLY",
            Opcode::BinaryModulo => "BINARY_MODULO",
            Opcode::BinaryAdd => "BINARY_ADD",
            Opcode::BinarySubtract => "BINARY_SUBTRACT",
            Opcode::BinarySubscr => "BINARY_SUBSCR",
            Opcode::BinaryFloorDivide => "BINARY_FLOOR_DIVIDE",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::BuildTuple => "BUILD_TUPLE",
            Opcode::CompareOp => "COMPARE_OP",
            Opcode::JumpForward => "JUMP_FORWARD",
            Opcode::JumpIfFalse => "JUMP_IF_FALSE",
            Opcode::JumpIfTrue => "JUMP_IF_TRUE",
            Opcode::JumpAbsolute => "JUMP_ABSOLUTE",
            Opcode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::LoadFast => "LOAD_FAST",
            Opcode::StoreFast => "STORE_FAST",
            Opcode::CallFunction => "CALL_FUNCTION",
        }
    }

    pub fn has_operand(self) -> bool {
        has_operand(self as u8)
    }

    /// Returns true for any instruction that can transfer control
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::JumpForward
                | Opcode::JumpIfFalse
                | Opcode::JumpIfTrue
                | Opcode::JumpAbsolute
                | Opcode::PopJumpIfFalse
                | Opcode::PopJumpIfTrue
        )
    }

    /// Relative jumps are measured from the start of the next instruction
    pub fn is_relative_jump(self) -> bool {
        matches!(
            self,
            Opcode::JumpForward | Opcode::JumpIfFalse | Opcode::JumpIfTrue
        )
    }

    pub fn is_conditional_jump(self) -> bool {
        self.negated_jump().is_some()
    }

    /// The conditional jump taken on the opposite truth value
    pub fn negated_jump(self) -> Option<Opcode> {
        match self {
            Opcode::JumpIfFalse => Some(Opcode::JumpIfTrue),
            Opcode::JumpIfTrue => Some(Opcode::JumpIfFalse),
            Opcode::PopJumpIfFalse => Some(Opcode::PopJumpIfTrue),
            Opcode::PopJumpIfTrue => Some(Opcode::PopJumpIfFalse),
            _ => None,
        }
    }

    /// Net change in stack depth when the instruction falls through
    pub fn stack_effect(self, operand: u16) -> i32 {
        match self {
            Opcode::PopTop => -1,
            Opcode::RotTwo | Opcode::Nop => 0,
            Opcode::DupTop => 1,
            Opcode::UnaryPositive | Opcode::UnaryNegative | Opcode::UnaryNot => 0,
            Opcode::BinaryMultiply
            | Opcode::BinaryModulo
            | Opcode::BinaryAdd
            | Opcode::BinarySubtract
            | Opcode::BinarySubscr
            | Opcode::BinaryFloorDivide => -1,
            Opcode::ReturnValue => -1,
            Opcode::LoadConst | Opcode::LoadGlobal | Opcode::LoadFast => 1,
            Opcode::StoreFast => -1,
            Opcode::BuildTuple => 1 - operand as i32,
            Opcode::CompareOp => -1,
            Opcode::JumpForward
            | Opcode::JumpIfFalse
            | Opcode::JumpIfTrue
            | Opcode::JumpAbsolute => 0,
            Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue => -1,
            Opcode::CallFunction => -(operand as i32),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Comparison operators, indexed by the `COMPARE_OP` operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
    ExceptionMatch,
    Bad,
}

impl CompareOp {
    /// Table order defines the operand encoding.
    pub const TABLE: [CompareOp; 12] = [
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Gt,
        CompareOp::Ge,
        CompareOp::In,
        CompareOp::NotIn,
        CompareOp::Is,
        CompareOp::IsNot,
        CompareOp::ExceptionMatch,
        CompareOp::Bad,
    ];

    pub fn from_index(index: u16) -> Option<Self> {
        Self::TABLE.get(index as usize).copied()
    }

    pub fn index(self) -> u16 {
        self as u16
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
            CompareOp::ExceptionMatch => "exception match",
            CompareOp::Bad => "BAD",
        }
    }

    /// Entries that occupy a table slot but are never valid mutation targets
    pub fn is_sentinel(self) -> bool {
        matches!(self, CompareOp::ExceptionMatch | CompareOp::Bad)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Raw opcode byte; may be unknown to [`Opcode`]
    pub opcode: u8,
    /// Source line in effect when the instruction starts
    pub line: u32,
    /// Present iff the opcode is operand-taking
    pub operand: Option<u16>,
}

impl Instruction {
    pub fn new(opcode: Opcode, line: u32) -> Self {
        Self::from_raw(opcode.byte(), line, None)
    }

    pub fn with_operand(opcode: Opcode, operand: u16, line: u32) -> Self {
        Self::from_raw(opcode.byte(), line, Some(operand))
    }

    /// Build from a raw byte, normalising the operand to the opcode's class
    pub fn from_raw(opcode: u8, line: u32, operand: Option<u16>) -> Self {
        let operand = if has_operand(opcode) {
            Some(operand.unwrap_or(0))
        } else {
            None
        };
        Self {
            opcode,
            line,
            operand,
        }
    }

    pub fn op(&self) -> Option<Opcode> {
        Opcode::from_byte(self.opcode)
    }

    pub fn is(&self, opcode: Opcode) -> bool {
        self.opcode == opcode.byte()
    }

    pub fn mnemonic(&self) -> Cow<'static, str> {
        match self.op() {
            Some(op) => Cow::Borrowed(op.mnemonic()),
            None => Cow::Owned(format!("<{}>", self.opcode)),
        }
    }

    pub fn has_operand(&self) -> bool {
        has_operand(self.opcode)
    }

    pub fn arg(&self) -> u16 {
        self.operand.unwrap_or(0)
    }

    /// Operand split into its (low, high) bytes
    pub fn operand_bytes(&self) -> (u8, u8) {
        let arg = self.arg();
        ((arg & 0xff) as u8, (arg >> 8) as u8)
    }

    /// Number of bytes occupied in the raw stream
    pub fn width(&self) -> usize {
        if self.has_operand() {
            3
        } else {
            1
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode);
        if self.has_operand() {
            let (lo, hi) = self.operand_bytes();
            out.push(lo);
            out.push(hi);
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Some(arg) => write!(f, "{}({})<{}>", self.mnemonic(), arg, self.line),
            None => write!(f, "{}<{}>", self.mnemonic(), self.line),
        }
    }
}

/// Decode a raw instruction stream.
///
/// `line_starts` lists `(offset, line)` pairs sorted by offset; the line in
/// effect is carried forward from the last offset that started a new line.
pub fn decode(code: &[u8], line_starts: &[(usize, u32)], first_line: u32) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut starts = line_starts.iter().peekable();
    let mut line = first_line;
    let mut offset = 0;

    while offset < code.len() {
        while let Some(&&(start, start_line)) = starts.peek() {
            if start > offset {
                break;
            }
            if start == offset {
                line = start_line;
            }
            starts.next();
        }

        let opcode = code[offset];
        if has_operand(opcode) {
            if offset + 2 >= code.len() {
                return Err(Error::Decode(format!(
                    "opcode {} at offset {} needs 2 operand bytes, {} remain",
                    opcode,
                    offset,
                    code.len() - offset - 1
                )));
            }
            let operand = u16::from(code[offset + 1]) | (u16::from(code[offset + 2]) << 8);
            instructions.push(Instruction::from_raw(opcode, line, Some(operand)));
            offset += 3;
        } else {
            instructions.push(Instruction::from_raw(opcode, line, None));
            offset += 1;
        }
    }

    Ok(instructions)
}

/// Encode instructions back into a raw stream
pub fn encode(instructions: &[Instruction]) -> Vec<u8> {
    let mut out = Vec::with_capacity(instructions.iter().map(Instruction::width).sum());
    for inst in instructions {
        inst.encode_into(&mut out);
    }
    out
}

/// Byte offset of every instruction, in order
pub fn offsets(instructions: &[Instruction]) -> Vec<usize> {
    let mut offset = 0;
    instructions
        .iter()
        .map(|inst| {
            let at = offset;
            offset += inst.width();
            at
        })
        .collect()
}
