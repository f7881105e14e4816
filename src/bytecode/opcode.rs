//! The instruction set and numeric-type tags, taken byte-for-byte from
//! the emitter/VM's shared contract (`SPEC_FULL.md` §4.6/§4.7), confirmed
//! against `original_source/fu/virtual_machine/bytecode/structures/code.py`
//! for the opcode catalogue and operand shapes.

/// The fixed numeric-type tag accompanying `PUSH_LITERAL`, the
/// `CHECKED_CONVERT`/`UNCHECKED_CONVERT` opcodes, and every
/// `CHECKED_{ADD,SUB,MUL,IDIV,FDIV}` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NumericType {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
    I8 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
    UsizeT = 8,
    SizeT = 9,
    F16 = 10,
    F32 = 11,
    F64 = 12,
    Bool = 13,
}

impl NumericType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => NumericType::U8,
            1 => NumericType::U16,
            2 => NumericType::U32,
            3 => NumericType::U64,
            4 => NumericType::I8,
            5 => NumericType::I16,
            6 => NumericType::I32,
            7 => NumericType::I64,
            8 => NumericType::UsizeT,
            9 => NumericType::SizeT,
            10 => NumericType::F16,
            11 => NumericType::F32,
            12 => NumericType::F64,
            13 => NumericType::Bool,
            _ => return None,
        })
    }

    /// The name as it appears in the builtin type table; both `usize_t`
    /// and `size_t` are native-word (64-bit) integers that differ only in
    /// signedness.
    pub fn builtin_name(self) -> &'static str {
        match self {
            NumericType::U8 => "u8",
            NumericType::U16 => "u16",
            NumericType::U32 => "u32",
            NumericType::U64 => "u64",
            NumericType::I8 => "i8",
            NumericType::I16 => "i16",
            NumericType::I32 => "i32",
            NumericType::I64 => "i64",
            NumericType::UsizeT => "usize_t",
            NumericType::SizeT => "size_t",
            NumericType::F16 => "f16",
            NumericType::F32 => "f32",
            NumericType::F64 => "f64",
            NumericType::Bool => "bool",
        }
    }

    pub fn byte_width(self) -> usize {
        match self {
            NumericType::U8 | NumericType::I8 | NumericType::Bool => 1,
            NumericType::U16 | NumericType::I16 | NumericType::F16 => 2,
            NumericType::U32 | NumericType::I32 | NumericType::F32 => 4,
            NumericType::U64 | NumericType::I64 | NumericType::UsizeT | NumericType::SizeT | NumericType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumericType::F16 | NumericType::F32 | NumericType::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            NumericType::I8 | NumericType::I16 | NumericType::I32 | NumericType::I64 | NumericType::SizeT
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    PushLiteral = 1,
    PushArg = 2,
    PushLocal = 3,
    PopLocal = 4,
    InitLocal = 5,
    PushRef = 6,
    PushArray = 7,
    CheckedConvert = 8,
    UncheckedConvert = 9,
    Ret = 10,
    CheckedAdd = 11,
    CheckedSub = 12,
    CheckedMul = 13,
    CheckedIdiv = 14,
    CheckedFdiv = 15,
    CallExport = 16,
    TailExport = 17,
    InitArgs = 18,
    New = 19,
    Jmp = 20,
    Jz = 21,
    Cmp = 22,
    Less = 23,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Opcode::Nop,
            1 => Opcode::PushLiteral,
            2 => Opcode::PushArg,
            3 => Opcode::PushLocal,
            4 => Opcode::PopLocal,
            5 => Opcode::InitLocal,
            6 => Opcode::PushRef,
            7 => Opcode::PushArray,
            8 => Opcode::CheckedConvert,
            9 => Opcode::UncheckedConvert,
            10 => Opcode::Ret,
            11 => Opcode::CheckedAdd,
            12 => Opcode::CheckedSub,
            13 => Opcode::CheckedMul,
            14 => Opcode::CheckedIdiv,
            15 => Opcode::CheckedFdiv,
            16 => Opcode::CallExport,
            17 => Opcode::TailExport,
            18 => Opcode::InitArgs,
            19 => Opcode::New,
            20 => Opcode::Jmp,
            21 => Opcode::Jz,
            22 => Opcode::Cmp,
            23 => Opcode::Less,
            _ => return None,
        })
    }

    /// Size in bytes of this opcode's operand, not counting the opcode
    /// byte itself. `PUSH_LITERAL` is variable-width (a type tag byte plus
    /// that type's immediate) and returns `None`.
    pub fn operand_len(self) -> Option<usize> {
        match self {
            Opcode::Nop | Opcode::Ret | Opcode::PushArray | Opcode::Cmp | Opcode::Less => Some(0),
            Opcode::PushArg | Opcode::PushLocal | Opcode::PopLocal | Opcode::PushRef | Opcode::InitArgs => Some(1),
            Opcode::InitLocal => Some(0),
            Opcode::CheckedConvert
            | Opcode::UncheckedConvert
            | Opcode::CheckedAdd
            | Opcode::CheckedSub
            | Opcode::CheckedMul
            | Opcode::CheckedIdiv
            | Opcode::CheckedFdiv => Some(1),
            Opcode::CallExport | Opcode::TailExport | Opcode::New | Opcode::Jmp | Opcode::Jz => Some(2),
            Opcode::PushLiteral => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_byte() {
        for byte in 0..=23u8 {
            let op = Opcode::from_byte(byte).expect("known opcode");
            assert_eq!(op as u8, byte);
        }
    }

    #[test]
    fn unknown_opcode_byte_is_none() {
        assert!(Opcode::from_byte(255).is_none());
    }

    #[test]
    fn numeric_type_widths_match_bit_sizes() {
        assert_eq!(NumericType::I8.byte_width(), 1);
        assert_eq!(NumericType::I64.byte_width(), 8);
        assert_eq!(NumericType::F32.byte_width(), 4);
        assert_eq!(NumericType::UsizeT.byte_width(), 8);
    }

    #[test]
    fn jmp_and_jz_operands_are_two_bytes_for_i16_offsets() {
        assert_eq!(Opcode::Jmp.operand_len(), Some(2));
        assert_eq!(Opcode::Jz.operand_len(), Some(2));
    }

    #[test]
    fn usize_t_and_size_t_differ_only_in_signedness() {
        assert!(!NumericType::UsizeT.is_signed());
        assert!(NumericType::SizeT.is_signed());
        assert_eq!(NumericType::UsizeT.byte_width(), NumericType::SizeT.byte_width());
    }
}
