//! The runtime value: one variant per `NumericType` tag plus a heap
//! reference. Grounded on `fu/virtual_machine/__init__.py`'s `Value`
//! union, collapsed here into a single flat enum since this VM is
//! statically typed (the static types have already been checked; the VM
//! only needs to carry the concrete bit pattern forward).

use crate::bytecode::NumericType;
use crate::vm::heap::Ref;
use half::f16;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    UsizeT(u64),
    SizeT(i64),
    F16(f16),
    F32(f32),
    F64(f64),
    Bool(bool),
    Ref(Ref),
}

impl Value {
    pub fn numeric_type(&self) -> Option<NumericType> {
        Some(match self {
            Value::U8(_) => NumericType::U8,
            Value::U16(_) => NumericType::U16,
            Value::U32(_) => NumericType::U32,
            Value::U64(_) => NumericType::U64,
            Value::I8(_) => NumericType::I8,
            Value::I16(_) => NumericType::I16,
            Value::I32(_) => NumericType::I32,
            Value::I64(_) => NumericType::I64,
            Value::UsizeT(_) => NumericType::UsizeT,
            Value::SizeT(_) => NumericType::SizeT,
            Value::F16(_) => NumericType::F16,
            Value::F32(_) => NumericType::F32,
            Value::F64(_) => NumericType::F64,
            Value::Bool(_) => NumericType::Bool,
            Value::Ref(_) => return None,
        })
    }

    /// Widens any numeric variant to `i128`. Panics on `Ref`, since callers
    /// only reach for this after confirming the value is numeric.
    pub fn as_i128(&self) -> i128 {
        match self {
            Value::U8(v) => *v as i128,
            Value::U16(v) => *v as i128,
            Value::U32(v) => *v as i128,
            Value::U64(v) => *v as i128,
            Value::I8(v) => *v as i128,
            Value::I16(v) => *v as i128,
            Value::I32(v) => *v as i128,
            Value::I64(v) => *v as i128,
            Value::UsizeT(v) => *v as i128,
            Value::SizeT(v) => *v as i128,
            Value::Bool(v) => *v as i128,
            Value::F16(_) | Value::F32(_) | Value::F64(_) => panic!("as_i128 called on a float value"),
            Value::Ref(_) => panic!("as_i128 called on a reference value"),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::F16(v) => f64::from(*v),
            Value::F32(v) => *v as f64,
            Value::F64(v) => *v,
            other => other.as_i128() as f64,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(v) => *v,
            other => other.as_i128() != 0,
        }
    }

    pub fn from_i128(numeric_type: NumericType, value: i128) -> Value {
        match numeric_type {
            NumericType::U8 => Value::U8(value as u8),
            NumericType::U16 => Value::U16(value as u16),
            NumericType::U32 => Value::U32(value as u32),
            NumericType::U64 => Value::U64(value as u64),
            NumericType::I8 => Value::I8(value as i8),
            NumericType::I16 => Value::I16(value as i16),
            NumericType::I32 => Value::I32(value as i32),
            NumericType::I64 => Value::I64(value as i64),
            NumericType::UsizeT => Value::UsizeT(value as u64),
            NumericType::SizeT => Value::SizeT(value as i64),
            NumericType::Bool => Value::Bool(value != 0),
            NumericType::F16 | NumericType::F32 | NumericType::F64 => {
                Value::from_f64(numeric_type, value as f64)
            }
        }
    }

    pub fn from_f64(numeric_type: NumericType, value: f64) -> Value {
        match numeric_type {
            NumericType::F16 => Value::F16(f16::from_f64(value)),
            NumericType::F32 => Value::F32(value as f32),
            NumericType::F64 => Value::F64(value),
            other => Value::from_i128(other, value as i128),
        }
    }
}
