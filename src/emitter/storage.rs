//! Where an already-lowered expression's value currently lives, and how to
//! get it onto the evaluation stack.
//!
//! Grounded on `original_source/compiler/compile/_storage_type_of.py` and
//! `_convert_to_stack.py`/`_retrieve.py`: every expression lowers to a
//! `StorageDescriptor` rather than unconditionally emitting a push, so a
//! caller that only needs the *type* of an operand (e.g. to pick the widest
//! numeric opcode variant) doesn't force code it won't use.

use crate::bytecode::{NumericType, Opcode};
use crate::types::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Arguments,
    Locals,
    /// Already sitting on the evaluation stack, left there by a previous
    /// `retrieve`/`convert_to_stack` call.
    Stack,
    /// A literal whose `PUSH_LITERAL` hasn't been emitted yet, so a caller
    /// holding two operands can control emission order (push left, convert,
    /// push right, convert) instead of eagerly emitting both up front.
    PendingLiteral,
    Static,
    Heap,
}

#[derive(Debug, Clone)]
pub struct StorageDescriptor {
    pub kind: StorageKind,
    pub ty: TypeRef,
    /// The argument/local slot this value occupies, when `kind` is
    /// `Arguments` or `Locals`.
    pub slot: Option<u8>,
    /// The numeric type tag and big-endian immediate bytes, when `kind` is
    /// `PendingLiteral`.
    pub literal: Option<(NumericType, Vec<u8>)>,
}

impl StorageDescriptor {
    pub fn stack(ty: TypeRef) -> Self {
        Self {
            kind: StorageKind::Stack,
            ty,
            slot: None,
            literal: None,
        }
    }

    pub fn pending_literal(ty: TypeRef, numeric: NumericType, bytes: Vec<u8>) -> Self {
        Self {
            kind: StorageKind::PendingLiteral,
            ty,
            slot: None,
            literal: Some((numeric, bytes)),
        }
    }

    pub fn argument(ty: TypeRef, slot: u8) -> Self {
        Self {
            kind: StorageKind::Arguments,
            ty,
            slot: Some(slot),
            literal: None,
        }
    }

    pub fn local(ty: TypeRef, slot: u8) -> Self {
        Self {
            kind: StorageKind::Locals,
            ty,
            slot: Some(slot),
            literal: None,
        }
    }

    pub fn heap(ty: TypeRef) -> Self {
        Self {
            kind: StorageKind::Heap,
            ty,
            slot: None,
            literal: None,
        }
    }

    /// Emits the minimal byte sequence to materialize this value on the
    /// evaluation stack, already converted to `target_numeric` if numeric.
    /// Non-stack storage is retrieved with a single load opcode; stack
    /// storage is already in place and emits nothing.
    pub fn convert_to_stack(&self, code: &mut Vec<u8>, target_numeric: Option<NumericType>) {
        self.retrieve(code);
        if let Some(target) = target_numeric {
            code.push(Opcode::CheckedConvert as u8);
            code.push(target as u8);
        }
    }

    /// Moves non-stack storage onto the stack without any conversion.
    pub fn retrieve(&self, code: &mut Vec<u8>) {
        match self.kind {
            StorageKind::Stack => {}
            StorageKind::PendingLiteral => {
                let (numeric, bytes) = self.literal.as_ref().expect("pending literal always carries its bytes");
                code.push(Opcode::PushLiteral as u8);
                code.push(*numeric as u8);
                code.extend_from_slice(bytes);
            }
            StorageKind::Arguments => {
                code.push(Opcode::PushArg as u8);
                code.push(self.slot.expect("argument storage always carries a slot"));
            }
            StorageKind::Locals => {
                code.push(Opcode::PushLocal as u8);
                code.push(self.slot.expect("local storage always carries a slot"));
            }
            StorageKind::Static | StorageKind::Heap => {
                // Static/heap member reads are emitted at the call site
                // (`PUSH_REF`/`PUSH_ARRAY`) since they need the owning
                // reference already on the stack; by the time a descriptor
                // reaches here that code has already run.
            }
        }
    }
}
