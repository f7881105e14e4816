//! The stack machine that executes an emitted [`crate::bytecode::Binary`].
//!
//! Grounded on `fu/virtual_machine/__init__.py`'s step loop: decode one
//! opcode, dispatch, repeat; `CALL_EXPORT`/`TAIL_EXPORT`/`RET` are the only
//! operations that touch more than the top frame. Recursion is capped at
//! [`MAX_RECURSION`]; an empty frame stack after `RET` ends execution and
//! its popped return value (`0` if none) becomes the process exit code.

mod error;
mod frame;
mod heap;
mod value;

pub use error::VmError;
pub use frame::Frame;
pub use heap::{Heap, HeapObject, Ref};
pub use value::Value;

use crate::bytecode::{Binary, NumericType, Opcode};

pub const MAX_RECURSION: usize = 100;

/// Per-type instance member counts, keyed by the binary's type-table index.
/// The wire format (`spec.md` §4.6) doesn't carry member layout — only the
/// emitter's own scope graph does — so the driver that produced `Binary`
/// passes this alongside it. `NEW` zero-initializes every slot since the
/// bytecode format carries no member-write opcode (the reference VM left
/// its own `POP_REF` commented out, never implemented); see `DESIGN.md`.
pub type InstanceLayouts = Vec<u16>;

pub struct Vm {
    code: Vec<u8>,
    function_addresses: Vec<u32>,
    heap: Heap,
    instance_layouts: InstanceLayouts,
    frames: Vec<Frame>,
    ip: usize,
    next_call_args: Vec<Value>,
}

impl Vm {
    pub fn new(binary: &Binary, instance_layouts: InstanceLayouts) -> Self {
        Self {
            code: binary.code.clone(),
            function_addresses: binary.functions.iter().map(|f| f.address).collect(),
            heap: Heap::new(),
            instance_layouts,
            frames: Vec::new(),
            ip: 0,
            next_call_args: Vec::new(),
        }
    }

    /// Runs `binary` from its `entrypoint`, passing `argv` as the single
    /// `str[]` argument to the entry frame. Returns the process exit code.
    pub fn run(binary: &Binary, instance_layouts: InstanceLayouts, argv: &[String]) -> Result<i32, VmError> {
        let mut vm = Vm::new(binary, instance_layouts);
        let entry = binary.entrypoint.unwrap_or(0) as usize;
        let argv_ref = vm.build_argv(argv);
        vm.frames.push(Frame::new(vec![argv_ref], -1));
        vm.ip = entry;
        vm.execute()
    }

    fn build_argv(&self, argv: &[String]) -> Value {
        let elements = argv
            .iter()
            .map(|s| {
                let bytes = s.bytes().map(Value::U8).collect();
                Value::Ref(self.heap.alloc_array(bytes))
            })
            .collect();
        Value::Ref(self.heap.alloc_array(elements))
    }

    fn execute(&mut self) -> Result<i32, VmError> {
        loop {
            let opcode_byte = *self.code.get(self.ip).ok_or(VmError::InstructionPointerOutOfBounds)?;
            let opcode = Opcode::from_byte(opcode_byte).ok_or(VmError::InstructionPointerOutOfBounds)?;
            self.ip += 1;
            if let Some(exit_code) = self.step(opcode)? {
                return Ok(exit_code);
            }
        }
    }

    fn read_u8(&mut self) -> Result<u8, VmError> {
        let byte = *self.code.get(self.ip).ok_or(VmError::InstructionPointerOutOfBounds)?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, VmError> {
        let bytes = self
            .code
            .get(self.ip..self.ip + 2)
            .ok_or(VmError::InstructionPointerOutOfBounds)?;
        self.ip += 2;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_i16(&mut self) -> Result<i16, VmError> {
        Ok(self.read_u16()? as i16)
    }

    fn read_numeric_type(&mut self) -> Result<NumericType, VmError> {
        let tag = self.read_u8()?;
        NumericType::from_tag(tag).ok_or(VmError::InstructionPointerOutOfBounds)
    }

    fn read_literal(&mut self, numeric_type: NumericType) -> Result<Value, VmError> {
        let width = numeric_type.byte_width();
        let bytes = self
            .code
            .get(self.ip..self.ip + width)
            .ok_or(VmError::InstructionPointerOutOfBounds)?
            .to_vec();
        self.ip += width;
        Ok(decode_immediate(numeric_type, &bytes))
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("step called with no active frame")
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.frame().pop().ok_or(VmError::StackUnderflow)
    }

    /// Executes one decoded opcode. `Ok(Some(exit_code))` means the VM
    /// reached an empty frame stack and should halt.
    fn step(&mut self, opcode: Opcode) -> Result<Option<i32>, VmError> {
        match opcode {
            Opcode::Nop => {}
            Opcode::PushLiteral => {
                let numeric_type = self.read_numeric_type()?;
                let value = self.read_literal(numeric_type)?;
                self.frame().push(value);
            }
            Opcode::PushArg => {
                let slot = self.read_u8()? as usize;
                let frame = self.frames.last().expect("active frame");
                let value = frame.args.get(slot).cloned().ok_or(VmError::IndexOutOfBounds)?;
                self.frame().push(value);
            }
            Opcode::PushLocal => {
                let slot = self.read_u8()? as usize;
                let frame = self.frames.last().expect("active frame");
                let value = frame.locals.get(slot).cloned().ok_or(VmError::IndexOutOfBounds)?;
                self.frame().push(value);
            }
            Opcode::PopLocal => {
                let slot = self.read_u8()? as usize;
                let value = self.pop()?;
                let frame = self.frame();
                if slot >= frame.locals.len() {
                    frame.locals.resize(slot + 1, Value::Bool(false));
                }
                frame.locals[slot] = value;
            }
            Opcode::InitLocal => {
                let value = self.pop()?;
                self.frame().locals.push(value);
            }
            Opcode::PushRef => {
                let slot = self.read_u8()?;
                let reference = self.pop()?;
                let Value::Ref(r) = reference else {
                    return Err(VmError::IndexOutOfBounds);
                };
                self.frame().push(r.member(slot)?);
            }
            Opcode::PushArray => {
                let index = self.pop()?;
                let reference = self.pop()?;
                let Value::Ref(r) = reference else {
                    return Err(VmError::IndexOutOfBounds);
                };
                let index = index.as_i128() as u64;
                self.frame().push(r.array_index(index)?);
            }
            Opcode::CheckedConvert => {
                let target = self.read_numeric_type()?;
                let value = self.pop()?;
                self.frame().push(checked_convert(&value, target)?);
            }
            Opcode::UncheckedConvert => {
                let target = self.read_numeric_type()?;
                let value = self.pop()?;
                self.frame().push(unchecked_convert(&value, target));
            }
            Opcode::Ret => {
                let retval = self.frame().pop();
                let finished = self.frames.pop().expect("active frame");
                if self.frames.is_empty() {
                    return Ok(Some(value_to_exit_code(retval)));
                }
                if let Some(v) = retval {
                    self.frame().push(v);
                }
                self.ip = finished.return_address as usize;
            }
            Opcode::CheckedAdd | Opcode::CheckedSub | Opcode::CheckedMul | Opcode::CheckedIdiv | Opcode::CheckedFdiv => {
                let numeric_type = self.read_numeric_type()?;
                let b = self.pop()?;
                let a = self.pop()?;
                let result = checked_arithmetic(opcode, numeric_type, &a, &b)?;
                self.frame().push(result);
            }
            Opcode::CallExport => {
                let fn_id = self.read_u16()?;
                if self.frames.len() >= MAX_RECURSION {
                    return Err(VmError::RecursionLimitExceeded);
                }
                let address = *self
                    .function_addresses
                    .get(fn_id as usize)
                    .ok_or(VmError::UnknownFunction(fn_id))?;
                let args = std::mem::take(&mut self.next_call_args);
                self.frames.push(Frame::new(args, self.ip as i64));
                self.ip = address as usize;
            }
            Opcode::TailExport => {
                let fn_id = self.read_u16()?;
                let address = *self
                    .function_addresses
                    .get(fn_id as usize)
                    .ok_or(VmError::UnknownFunction(fn_id))?;
                let args = std::mem::take(&mut self.next_call_args);
                let frame = self.frame();
                frame.args = args;
                frame.locals.clear();
                frame.stack.clear();
                self.ip = address as usize;
            }
            Opcode::InitArgs => {
                let count = self.read_u8()? as usize;
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(self.pop()?);
                }
                args.reverse();
                self.next_call_args = args;
            }
            Opcode::New => {
                let type_id = self.read_u16()?;
                let member_count = self
                    .instance_layouts
                    .get(type_id as usize)
                    .copied()
                    .unwrap_or(0) as usize;
                let members = vec![Value::I64(0); member_count];
                let reference = self.heap.alloc_instance(type_id, members);
                self.frame().push(Value::Ref(reference));
            }
            Opcode::Jmp => {
                let offset = self.read_i16()?;
                self.jump(offset)?;
            }
            Opcode::Jz => {
                let offset = self.read_i16()?;
                let top = self.frames.last().and_then(|f| f.stack.last()).ok_or(VmError::StackUnderflow)?;
                if !top.is_truthy() {
                    self.jump(offset)?;
                }
            }
            Opcode::Cmp => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.frame().push(Value::Bool(a == b));
            }
            Opcode::Less => {
                let b = self.pop()?;
                let a = self.pop()?;
                let less = if a.numeric_type().map(|t| t.is_float()).unwrap_or(false)
                    || b.numeric_type().map(|t| t.is_float()).unwrap_or(false)
                {
                    a.as_f64() < b.as_f64()
                } else {
                    a.as_i128() < b.as_i128()
                };
                self.frame().push(Value::Bool(less));
            }
        }
        Ok(None)
    }

    /// Applies a signed relative jump whose zero point is the byte
    /// immediately following the 2-byte operand (i.e. `self.ip` at the
    /// point this is called, since the operand was already consumed).
    fn jump(&mut self, offset: i16) -> Result<(), VmError> {
        let target = self.ip as i64 + offset as i64;
        if target < 0 || target as usize > self.code.len() {
            return Err(VmError::InstructionPointerOutOfBounds);
        }
        self.ip = target as usize;
        Ok(())
    }
}

fn value_to_exit_code(value: Option<Value>) -> i32 {
    match value {
        None => 0,
        Some(v) => v.as_i128_lossy() as i32,
    }
}

impl Value {
    /// Like `as_i128` but tolerant of bools/refs for exit-code purposes;
    /// a `main` that returns `void` never reaches here with a real value.
    fn as_i128_lossy(&self) -> i128 {
        match self {
            Value::Ref(_) => 0,
            Value::F16(_) | Value::F32(_) | Value::F64(_) => self.as_f64() as i128,
            _ => self.as_i128(),
        }
    }
}

fn decode_immediate(numeric_type: NumericType, bytes: &[u8]) -> Value {
    match numeric_type {
        NumericType::U8 => Value::U8(bytes[0]),
        NumericType::U16 => Value::U16(u16::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::U32 => Value::U32(u32::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::U64 => Value::U64(u64::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::I8 => Value::I8(bytes[0] as i8),
        NumericType::I16 => Value::I16(i16::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::I32 => Value::I32(i32::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::I64 => Value::I64(i64::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::UsizeT => Value::UsizeT(u64::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::SizeT => Value::SizeT(i64::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::F16 => Value::F16(half::f16::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::F32 => Value::F32(f32::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::F64 => Value::F64(f64::from_be_bytes(bytes.try_into().unwrap())),
        NumericType::Bool => Value::Bool(bytes[0] != 0),
    }
}

fn checked_convert(value: &Value, target: NumericType) -> Result<Value, VmError> {
    if target.is_float() {
        return Ok(Value::from_f64(target, value.as_f64()));
    }
    let raw = if value.numeric_type().map(|t| t.is_float()).unwrap_or(false) {
        value.as_f64() as i128
    } else {
        value.as_i128()
    };
    if !fits_numeric_type(target, raw) {
        return Err(VmError::Overflow {
            opcode: "CHECKED_CONVERT",
            numeric_type: target.builtin_name(),
        });
    }
    Ok(Value::from_i128(target, raw))
}

fn unchecked_convert(value: &Value, target: NumericType) -> Value {
    if target.is_float() {
        return Value::from_f64(target, value.as_f64());
    }
    let raw = if value.numeric_type().map(|t| t.is_float()).unwrap_or(false) {
        value.as_f64() as i128
    } else {
        value.as_i128()
    };
    Value::from_i128(target, raw)
}

fn fits_numeric_type(numeric_type: NumericType, value: i128) -> bool {
    let (min, max): (i128, i128) = match numeric_type {
        NumericType::U8 => (0, u8::MAX as i128),
        NumericType::U16 => (0, u16::MAX as i128),
        NumericType::U32 => (0, u32::MAX as i128),
        NumericType::U64 | NumericType::UsizeT => (0, u64::MAX as i128),
        NumericType::I8 => (i8::MIN as i128, i8::MAX as i128),
        NumericType::I16 => (i16::MIN as i128, i16::MAX as i128),
        NumericType::I32 => (i32::MIN as i128, i32::MAX as i128),
        NumericType::I64 | NumericType::SizeT => (i64::MIN as i128, i64::MAX as i128),
        NumericType::Bool => (0, 1),
        NumericType::F16 | NumericType::F32 | NumericType::F64 => unreachable!(),
    };
    value >= min && value <= max
}

fn checked_arithmetic(opcode: Opcode, numeric_type: NumericType, a: &Value, b: &Value) -> Result<Value, VmError> {
    if numeric_type.is_float() || matches!(opcode, Opcode::CheckedFdiv) {
        let av = a.as_f64();
        let bv = b.as_f64();
        let result = match opcode {
            Opcode::CheckedAdd => av + bv,
            Opcode::CheckedSub => av - bv,
            Opcode::CheckedMul => av * bv,
            Opcode::CheckedFdiv => av / bv,
            _ => {
                return Err(VmError::Overflow {
                    opcode: "CHECKED_ARITHMETIC",
                    numeric_type: numeric_type.builtin_name(),
                })
            }
        };
        return Ok(Value::from_f64(numeric_type, result));
    }

    let av = a.as_i128();
    let bv = b.as_i128();
    let result = match opcode {
        Opcode::CheckedAdd => av.checked_add(bv),
        Opcode::CheckedSub => av.checked_sub(bv),
        Opcode::CheckedMul => av.checked_mul(bv),
        Opcode::CheckedIdiv => {
            if bv == 0 {
                return Err(VmError::DivisionByZero);
            }
            av.checked_div(bv)
        }
        Opcode::CheckedFdiv => unreachable!("handled by the float branch above"),
        _ => unreachable!("checked_arithmetic called with a non-arithmetic opcode"),
    };
    let result = result.ok_or(VmError::Overflow {
        opcode: "CHECKED_ARITHMETIC",
        numeric_type: numeric_type.builtin_name(),
    })?;
    if !fits_numeric_type(numeric_type, result) {
        return Err(VmError::Overflow {
            opcode: "CHECKED_ARITHMETIC",
            numeric_type: numeric_type.builtin_name(),
        });
    }
    Ok(Value::from_i128(numeric_type, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Binary, FunctionEntry, TypeTableEntry};

    fn binary_with_code(code: Vec<u8>) -> Binary {
        Binary {
            is_library: false,
            entrypoint: Some(0),
            strings: vec![],
            types: vec![TypeTableEntry::Builtin(2)],
            functions: vec![FunctionEntry {
                name: 0,
                scope: 0,
                signature: 0,
                address: 0,
            }],
            code,
            source_map: vec![],
        }
    }

    fn push_i32(value: i32) -> Vec<u8> {
        let mut bytes = vec![Opcode::PushLiteral as u8, NumericType::I32 as u8];
        bytes.extend_from_slice(&value.to_be_bytes());
        bytes
    }

    #[test]
    fn empty_main_with_bare_ret_exits_zero() {
        let binary = binary_with_code(vec![Opcode::Ret as u8]);
        let code = Vm::run(&binary, vec![], &[]).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn returns_a_literal_as_exit_code() {
        let mut code = push_i32(3);
        code.push(Opcode::Ret as u8);
        let binary = binary_with_code(code);
        let exit = Vm::run(&binary, vec![], &[]).unwrap();
        assert_eq!(exit, 3);
    }

    #[test]
    fn folds_one_plus_two_through_checked_add_and_returns_three() {
        let mut code = push_i32(1);
        code.extend(push_i32(2));
        code.push(Opcode::CheckedAdd as u8);
        code.push(NumericType::I32 as u8);
        code.push(Opcode::Ret as u8);
        let binary = binary_with_code(code);
        let exit = Vm::run(&binary, vec![], &[]).unwrap();
        assert_eq!(exit, 3);
    }

    #[test]
    fn checked_add_overflow_terminates_with_an_error() {
        let mut code = push_i32(i32::MAX);
        code.extend(push_i32(1));
        code.push(Opcode::CheckedAdd as u8);
        code.push(NumericType::I32 as u8);
        code.push(Opcode::Ret as u8);
        let binary = binary_with_code(code);
        let err = Vm::run(&binary, vec![], &[]).unwrap_err();
        assert!(matches!(err, VmError::Overflow { .. }));
    }

    #[test]
    fn checked_idiv_by_zero_terminates_with_an_error() {
        let mut code = push_i32(5);
        code.extend(push_i32(0));
        code.push(Opcode::CheckedIdiv as u8);
        code.push(NumericType::I32 as u8);
        code.push(Opcode::Ret as u8);
        let binary = binary_with_code(code);
        let err = Vm::run(&binary, vec![], &[]).unwrap_err();
        assert_eq!(err, VmError::DivisionByZero);
    }

    #[test]
    fn jz_skips_the_true_branch_when_condition_is_false() {
        let mut code = vec![Opcode::PushLiteral as u8, NumericType::Bool as u8, 0u8];
        code.push(Opcode::Jz as u8);
        code.extend_from_slice(&5i16.to_be_bytes());
        code.extend(push_i32(1));
        code.push(Opcode::Ret as u8);
        code.extend(push_i32(2));
        code.push(Opcode::Ret as u8);
        let binary = binary_with_code(code);
        let exit = Vm::run(&binary, vec![], &[]).unwrap();
        assert_eq!(exit, 2);
    }

    #[test]
    fn call_export_then_ret_propagates_the_callee_return_value() {
        // function 0 (the entrypoint) calls function 1, which returns 7.
        let mut main_code = vec![Opcode::CallExport as u8];
        main_code.extend_from_slice(&1u16.to_be_bytes());
        main_code.push(Opcode::Ret as u8);
        let callee_address = main_code.len() as u32;
        let mut callee_code = push_i32(7);
        callee_code.push(Opcode::Ret as u8);
        let mut code = main_code;
        code.extend(callee_code);

        let binary = Binary {
            is_library: false,
            entrypoint: Some(0),
            strings: vec![],
            types: vec![],
            functions: vec![
                FunctionEntry {
                    name: 0,
                    scope: 0,
                    signature: 0,
                    address: 0,
                },
                FunctionEntry {
                    name: 0,
                    scope: 0,
                    signature: 0,
                    address: callee_address,
                },
            ],
            code,
            source_map: vec![],
        };
        let exit = Vm::run(&binary, vec![], &[]).unwrap();
        assert_eq!(exit, 7);
    }

    #[test]
    fn recursion_limit_is_enforced() {
        // function 0 unconditionally calls itself.
        let mut code = vec![Opcode::CallExport as u8];
        code.extend_from_slice(&0u16.to_be_bytes());
        code.push(Opcode::Ret as u8);
        let binary = Binary {
            is_library: false,
            entrypoint: Some(0),
            strings: vec![],
            types: vec![],
            functions: vec![FunctionEntry {
                name: 0,
                scope: 0,
                signature: 0,
                address: 0,
            }],
            code,
            source_map: vec![],
        };
        let err = Vm::run(&binary, vec![], &[]).unwrap_err();
        assert_eq!(err, VmError::RecursionLimitExceeded);
    }

    #[test]
    fn entry_frame_receives_argv_as_a_single_array_argument() {
        let binary = binary_with_code(vec![Opcode::PushArg as u8, 0, Opcode::Ret as u8]);
        let exit = Vm::run(&binary, vec![], &["a".to_string(), "b".to_string()]).unwrap();
        // argv is a ref; converting it to an exit code degrades to 0 rather
        // than panicking.
        assert_eq!(exit, 0);
    }
}
