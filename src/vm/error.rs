//! Runtime errors. Every one of them terminates the VM per `spec.md` §7:
//! there is no recovery path once execution starts.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    /// A `CHECKED_*` arithmetic or conversion opcode produced a value
    /// outside the destination type's range.
    Overflow { opcode: &'static str, numeric_type: &'static str },
    /// Integer division (`CHECKED_IDIV`) by zero.
    DivisionByZero,
    /// Call depth exceeded the fixed cap.
    RecursionLimitExceeded,
    /// The instruction pointer walked past the end of the code blob, or an
    /// opcode byte didn't decode.
    InstructionPointerOutOfBounds,
    /// An index passed to `PUSH_ARRAY` / array slot 0 math was out of range.
    IndexOutOfBounds,
    /// The evaluation stack didn't have the operands an opcode needed.
    StackUnderflow,
    /// A `CALL_EXPORT`/`TAIL_EXPORT` referenced a function id with no entry.
    UnknownFunction(u16),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Overflow { opcode, numeric_type } => {
                write!(f, "{opcode}: overflow converting/computing a `{numeric_type}`")
            }
            VmError::DivisionByZero => write!(f, "integer division by zero"),
            VmError::RecursionLimitExceeded => write!(f, "recursion depth exceeded"),
            VmError::InstructionPointerOutOfBounds => write!(f, "instruction pointer out of bounds"),
            VmError::IndexOutOfBounds => write!(f, "array index out of bounds"),
            VmError::StackUnderflow => write!(f, "evaluation stack underflow"),
            VmError::UnknownFunction(id) => write!(f, "no function registered for id {id}"),
        }
    }
}

impl std::error::Error for VmError {}
