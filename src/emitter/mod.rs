//! Lowers a checked, optimized [`crate::ast::Document`] into a
//! [`crate::bytecode::Binary`].
//!
//! No direct teacher counterpart exists for this stage; it's grounded on
//! `spec.md` §4.5's prose plus `original_source/compiler/compile/*.py`
//! (`_compile_expression.py`, `_convert_to_stack.py`, `_retrieve.py`,
//! `_compile_if_statement.py`, `label.py`, `scope.py`, `dependencies.py`,
//! `storage.py`) for the reservation/fulfillment and control-flow algorithm.

mod label;
mod storage;

pub use label::Label;
pub use storage::{StorageDescriptor, StorageKind};

use crate::ast::{IdentityLhs, Node, OperatorKind, TypeModifier};
use crate::bytecode::{Binary, FunctionEntry, NumericType, Opcode, SourceMapEntry, TypeTableEntry};
use crate::types::{BuiltinTable, ComposedFacet, PrimitiveKind, Type, TypeFacet, TypeRef};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum EmitError {
    NoMain,
    InvalidMainSignature,
    UnknownName(String),
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::NoMain => write!(f, "no `main` found in global scope"),
            EmitError::InvalidMainSignature => {
                write!(f, "`main` must be callable, return a void/integer type, and take no arguments or `(str[])`")
            }
            EmitError::UnknownName(name) => write!(f, "unknown name `{name}` in function body"),
        }
    }
}

impl std::error::Error for EmitError {}

struct PendingFunction<'a> {
    fn_id: u16,
    params: Vec<(String, TypeRef)>,
    return_type: TypeRef,
    body: &'a [Node],
}

/// Walks the global compile dependency queue: a call site reserves an id
/// for a callee it hasn't emitted yet, and the queue drains until every
/// reachable function has a body.
pub struct Emitter<'a> {
    builtins: &'a BuiltinTable,
    functions_by_fqdn: IndexMap<String, &'a Node>,
    reservations: IndexMap<String, u16>,
    pending: VecDeque<PendingFunction<'a>>,
    code: Vec<u8>,
    functions: Vec<FunctionEntry>,
    strings: IndexMap<String, u32>,
    source_map: Vec<SourceMapEntry>,
    /// Type id a constructed type's name resolves to, assigned in
    /// declaration order alongside `types`/`instance_layouts`.
    type_ids: IndexMap<String, u16>,
    /// The composed type built from each type body's own member list (no
    /// inheritance, no special operators — the checker has already
    /// validated those; the emitter only needs member names/types/slots
    /// to lower `.member`/`Foo()` correctly).
    type_refs: IndexMap<String, TypeRef>,
    types: Vec<TypeTableEntry>,
    /// Member count per type id, indexed in parallel with `types`; handed
    /// back to the caller alongside the `Binary` since the wire format
    /// itself carries no instance-layout information (see `vm::InstanceLayouts`).
    instance_layouts: Vec<u16>,
}

impl<'a> Emitter<'a> {
    pub fn new(builtins: &'a BuiltinTable) -> Self {
        Self {
            builtins,
            functions_by_fqdn: IndexMap::new(),
            reservations: IndexMap::new(),
            pending: VecDeque::new(),
            code: Vec::new(),
            functions: Vec::new(),
            strings: IndexMap::new(),
            source_map: Vec::new(),
            type_ids: IndexMap::new(),
            type_refs: IndexMap::new(),
            types: Vec::new(),
            instance_layouts: Vec::new(),
        }
    }

    /// Emits a document's `Binary` plus the per-type-id member count the VM
    /// needs for `NEW` (`vm::InstanceLayouts`) — the binary's own `types`
    /// table is informational only and is never read by the VM.
    pub fn emit_document(mut self, content: &'a [Node]) -> Result<(Binary, Vec<u16>), EmitError> {
        self.collect_top_level_types(content);
        self.collect_top_level_functions(content);

        let main_node = self.functions_by_fqdn.get("main").copied().ok_or(EmitError::NoMain)?;
        let (params, return_type, body) = self.signature_of(main_node).ok_or(EmitError::InvalidMainSignature)?;
        if !is_valid_main_return(&return_type) || !is_valid_main_params(&params) {
            return Err(EmitError::InvalidMainSignature);
        }
        let main_id = self.reserve("main");
        self.pending.push_back(PendingFunction {
            fn_id: main_id,
            params,
            return_type,
            body,
        });

        while let Some(pending) = self.pending.pop_front() {
            self.compile_function(pending)?;
        }

        let entry_address = self.functions[main_id as usize].address;

        let string_pool = {
            let mut pool: Vec<(String, u32)> = self.strings.iter().map(|(k, v)| (k.clone(), *v)).collect();
            pool.sort_by_key(|(_, idx)| *idx);
            pool.into_iter().map(|(s, _)| s).collect()
        };

        Ok((
            Binary {
                is_library: false,
                entrypoint: Some(entry_address),
                strings: string_pool,
                types: self.types,
                functions: self.functions,
                code: self.code,
                source_map: self.source_map,
            },
            self.instance_layouts,
        ))
    }

    fn collect_top_level_functions(&mut self, content: &'a [Node]) {
        for node in content {
            if let Node::Declaration { identity, initial: Some(initial), .. } = node {
                if let Node::Identity { left: IdentityLhs::Name(name), right, .. } = identity.as_ref() {
                    if let Node::TypeExpr(expr) = right.as_ref() {
                        if expr.mods.iter().any(|m| matches!(m, TypeModifier::ParamList(_))) {
                            if let Node::Scope { .. } = initial.as_ref() {
                                self.functions_by_fqdn.insert(name.name.clone(), node);
                            }
                        }
                    }
                }
            }
        }
    }

    fn collect_top_level_types(&mut self, content: &'a [Node]) {
        for node in content {
            if let Node::TypeDeclaration {
                name,
                definition: Some(crate::ast::TypeDefinition::Body(members)),
                ..
            } = node
            {
                self.register_type(name, members);
            }
        }
    }

    fn register_type(&mut self, name: &crate::ast::Ident, members: &'a [Node]) {
        if self.type_ids.contains_key(&name.name) {
            return;
        }
        let composed = self.build_composed_type(&name.name, members);
        let member_count = composed.instance_members.len() as u16;
        let id = self.types.len() as u16;
        let interned = self.intern(&name.name);
        self.types.push(TypeTableEntry::Named { name: interned, callable: None });
        self.instance_layouts.push(member_count);
        self.type_ids.insert(name.name.clone(), id);
        self.type_refs.insert(name.name.clone(), composed);
    }

    /// A minimal type built straight from a type body's own member list —
    /// not the checker's composed type (no inheritance, no special
    /// operators, no `this` cycle; the checker has already validated all of
    /// that). Only member name/order/type is needed here, to compute a
    /// `PUSH_REF` slot and the resulting storage's type.
    fn build_composed_type(&self, name: &str, members: &[Node]) -> TypeRef {
        let mut instance_members = IndexMap::new();
        for member in members {
            let identity = match member {
                Node::Identity { .. } => member,
                Node::Declaration { identity, .. } => identity.as_ref(),
                _ => continue,
            };
            let Node::Identity { left: IdentityLhs::Name(member_name), right, .. } = identity else {
                continue;
            };
            if member_name.name == "this" {
                continue;
            }
            let ty = match right.as_ref() {
                Node::TypeExpr(expr) => self
                    .resolve_param_type(expr)
                    .unwrap_or_else(|| self.builtins.get("void").expect("void builtin present")),
                _ => self.builtins.get("void").expect("void builtin present"),
            };
            instance_members.insert(member_name.name.clone(), ty);
        }
        Rc::new(Type {
            name: name.to_string(),
            size: None,
            is_reference: true,
            callable: None,
            indexable: None,
            instance_members,
            static_members: IndexMap::new(),
            readonly_members: HashSet::new(),
            inherits: Vec::new(),
            is_const: false,
            facet: TypeFacet::Composed(ComposedFacet::plain()),
        })
    }

    fn signature_of(&self, node: &'a Node) -> Option<(Vec<(String, TypeRef)>, TypeRef, &'a [Node])> {
        let Node::Declaration { identity, initial: Some(initial), .. } = node else {
            return None;
        };
        let Node::Identity { right, .. } = identity.as_ref() else { return None };
        let Node::TypeExpr(expr) = right.as_ref() else { return None };
        let return_type = self.builtins.get(&expr.base.name)?;
        let mut params = Vec::new();
        for modifier in &expr.mods {
            if let TypeModifier::ParamList(list) = modifier {
                for param in list {
                    if let Node::Identity { left: IdentityLhs::Name(name), right, .. } = param {
                        if let Node::TypeExpr(param_ty) = right.as_ref() {
                            let ty = self.resolve_param_type(param_ty)?;
                            params.push((name.name.clone(), ty));
                        }
                    }
                }
            }
        }
        let Node::Scope { statements, .. } = initial.as_ref() else {
            return None;
        };
        Some((params, return_type, statements.as_slice()))
    }

    fn resolve_param_type(&self, expr: &crate::ast::TypeExpr) -> Option<TypeRef> {
        let base = self.builtins.get(&expr.base.name)?;
        if expr.mods.iter().any(|m| matches!(m, TypeModifier::ArrayDef)) {
            return self.builtins.get("Array");
        }
        Some(base)
    }

    fn reserve(&mut self, fqdn: &str) -> u16 {
        if let Some(&id) = self.reservations.get(fqdn) {
            return id;
        }
        let id = self.functions.len() as u16;
        self.functions.push(FunctionEntry {
            name: self.intern(fqdn),
            scope: 0,
            signature: 0,
            address: 0,
        });
        self.reservations.insert(fqdn.to_string(), id);
        id
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.strings.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.insert(s.to_string(), idx);
        idx
    }

    fn compile_function(&mut self, pending: PendingFunction<'a>) -> Result<(), EmitError> {
        let address = self.code.len() as u32;
        let mut ctx = FunctionCtx::new(pending.params, pending.return_type.clone());
        let body_start = self.code.len();
        for stmt in pending.body {
            self.compile_statement(stmt, &mut ctx)?;
        }
        self.rewrite_tail_call(body_start);
        self.functions[pending.fn_id as usize].address = address;
        Ok(())
    }

    /// If the last three bytes of the function body are `CALL_EXPORT fn-id`
    /// immediately followed by `RET`, rewrite them into `TAIL_EXPORT fn-id`
    /// in place.
    fn rewrite_tail_call(&mut self, body_start: usize) {
        let len = self.code.len();
        if len < body_start + 4 {
            return;
        }
        if self.code[len - 1] == Opcode::Ret as u8 && self.code[len - 4] == Opcode::CallExport as u8 {
            self.code[len - 4] = Opcode::TailExport as u8;
            self.code.truncate(len - 1);
        }
    }

    fn compile_statement(&mut self, node: &'a Node, ctx: &mut FunctionCtx) -> Result<(), EmitError> {
        let stmt_offset = self.code.len();
        match node {
            Node::Return { value, .. } => {
                if let Some(expr) = value {
                    let target_numeric = numeric_tag_of(&ctx.return_type);
                    let descriptor = self.compile_expr(expr, ctx)?;
                    descriptor.convert_to_stack(&mut self.code, target_numeric);
                }
                self.code.push(Opcode::Ret as u8);
            }
            Node::Declaration { identity, initial: Some(initial), .. } => {
                let Node::Identity { left: IdentityLhs::Name(name), right, .. } = identity.as_ref() else {
                    return Ok(());
                };
                let declared_ty = match right.as_ref() {
                    Node::TypeExpr(expr) => self.resolve_param_type(expr),
                    _ => None,
                };
                let descriptor = self.compile_expr(initial, ctx)?;
                let target_ty = declared_ty.unwrap_or_else(|| descriptor.ty.clone());
                descriptor.convert_to_stack(&mut self.code, numeric_tag_of(&target_ty));
                self.code.push(Opcode::InitLocal as u8);
                let slot = ctx.locals.len() as u8;
                ctx.locals.push((name.name.clone(), target_ty));
                let _ = slot;
            }
            Node::If { arms, .. } => {
                let mut end_label = Label::new();
                let mut arms_iter = arms.iter().peekable();
                while let Some(arm) = arms_iter.next() {
                    match &arm.term {
                        Some(term) => {
                            let descriptor = self.compile_expr(term, ctx)?;
                            descriptor.convert_to_stack(&mut self.code, Some(NumericType::Bool));
                            let mut next_label = Label::new();
                            self.code.push(Opcode::Jz as u8);
                            let operand_offset = self.code.len();
                            self.code.extend_from_slice(&0i16.to_be_bytes());
                            next_label.add_patch(operand_offset);

                            for stmt in &arm.body {
                                self.compile_statement(stmt, ctx)?;
                            }
                            self.code.push(Opcode::Jmp as u8);
                            let end_operand = self.code.len();
                            self.code.extend_from_slice(&0i16.to_be_bytes());
                            end_label.add_patch(end_operand);

                            let here = self.code.len();
                            next_label.link(here, &mut self.code);
                        }
                        None => {
                            for stmt in &arm.body {
                                self.compile_statement(stmt, ctx)?;
                            }
                        }
                    }
                }
                let here = self.code.len();
                end_label.link(here, &mut self.code);
            }
            Node::Scope { statements, .. } => {
                for stmt in statements {
                    self.compile_statement(stmt, ctx)?;
                }
            }
            other => {
                // A bare expression statement: evaluate and discard effects
                // aren't modeled (no POP-as-statement in this instruction
                // set beyond the ones used above), so only the recognized
                // statement forms above are legal function-body statements.
                let _ = self.compile_expr(other, ctx)?;
            }
        }
        let stmt_len = self.code.len() - stmt_offset;
        self.source_map.push(SourceMapEntry {
            file: node.location().file.to_string(),
            seek_start: node.location().start,
            seek_end: node.location().end,
            line_start: node.location().start_line as u16,
            line_end: node.location().end_line as u16,
            col_start: node.location().start_column as u16,
            col_end: node.location().end_column as u16,
            code_offset: stmt_offset as u32,
            code_length: stmt_len as u32,
        });
        Ok(())
    }

    fn compile_expr(&mut self, node: &'a Node, ctx: &mut FunctionCtx) -> Result<StorageDescriptor, EmitError> {
        match node {
            Node::Literal(lit) if lit.kind == crate::ast::LiteralKind::Number => {
                let numeric = literal_numeric_type(lit, ctx.return_type_numeric_hint());
                let ty = self.builtins.get(numeric.builtin_name()).expect("builtin numeric type always present");
                let bytes = literal_immediate_bytes(lit, numeric);
                Ok(StorageDescriptor::pending_literal(ty, numeric, bytes))
            }
            Node::Identifier(ident) => {
                if let Some((slot, ty)) = ctx.lookup_local(&ident.name) {
                    Ok(StorageDescriptor::local(ty, slot))
                } else if let Some((slot, ty)) = ctx.lookup_param(&ident.name) {
                    Ok(StorageDescriptor::argument(ty, slot))
                } else {
                    Err(EmitError::UnknownName(ident.name.clone()))
                }
            }
            Node::Operator { op, lhs: Some(lhs), rhs: Some(rhs), .. } if op.is_arithmetic() => {
                // The widest operand type must be known before either side
                // is converted, so it's inferred up front without emitting;
                // each side is then compiled, retrieved, and converted in
                // strict left-to-right order so the stack ends up
                // [left_converted, right_converted] regardless of which
                // sides are literals (pushed lazily) versus locals/args.
                let numeric = wider_numeric(&self.infer_numeric(lhs, ctx), &self.infer_numeric(rhs, ctx));
                let is_fdiv = *op == OperatorKind::Div && numeric.is_float();

                let left = self.compile_expr(lhs, ctx)?;
                left.convert_to_stack(&mut self.code, Some(numeric));
                let right = self.compile_expr(rhs, ctx)?;
                right.convert_to_stack(&mut self.code, Some(numeric));

                self.code.push(if is_fdiv { Opcode::CheckedFdiv } else { arithmetic_opcode(*op) } as u8);
                self.code.push(numeric as u8);
                let ty = self.builtins.get(numeric.builtin_name()).expect("builtin numeric type always present");
                Ok(StorageDescriptor::stack(ty))
            }
            Node::Operator { op: OperatorKind::Eq, lhs: Some(lhs), rhs: Some(rhs), .. } => {
                let left = self.compile_expr(lhs, ctx)?;
                left.retrieve(&mut self.code);
                let right = self.compile_expr(rhs, ctx)?;
                right.retrieve(&mut self.code);
                self.code.push(Opcode::Cmp as u8);
                let ty = self.builtins.get("bool").expect("bool builtin present");
                Ok(StorageDescriptor::stack(ty))
            }
            Node::Operator { op: OperatorKind::Lt, lhs: Some(lhs), rhs: Some(rhs), .. } => {
                let left = self.compile_expr(lhs, ctx)?;
                left.retrieve(&mut self.code);
                let right = self.compile_expr(rhs, ctx)?;
                right.retrieve(&mut self.code);
                self.code.push(Opcode::Less as u8);
                let ty = self.builtins.get("bool").expect("bool builtin present");
                Ok(StorageDescriptor::stack(ty))
            }
            Node::ExpressionList { values, .. } => {
                let mut last = None;
                for v in values {
                    last = Some(self.compile_expr(v, ctx)?);
                }
                Ok(last.unwrap_or_else(|| StorageDescriptor::stack(self.builtins.get("void").unwrap())))
            }
            Node::Operator { op: OperatorKind::Dot, lhs: Some(lhs), rhs: Some(rhs), .. } => {
                let ident = rhs.as_identifier().ok_or_else(|| EmitError::UnknownName(".".to_string()))?;
                let owner = self.compile_expr(lhs, ctx)?;
                let owner_ty = owner.ty.clone();
                owner.retrieve(&mut self.code);
                let slot = owner_ty
                    .instance_members
                    .get_index_of(&ident.name)
                    .ok_or_else(|| EmitError::UnknownName(format!("{}.{}", owner_ty.name, ident.name)))?;
                self.code.push(Opcode::PushRef as u8);
                self.code.push(slot as u8);
                let member_ty = owner_ty.instance_members.get(&ident.name).expect("just found by index").clone();
                Ok(StorageDescriptor::heap(member_ty))
            }
            Node::Operator { op: OperatorKind::Index, lhs: Some(lhs), rhs: Some(rhs), .. } => {
                let owner = self.compile_expr(lhs, ctx)?;
                let owner_ty = owner.ty.clone();
                owner.retrieve(&mut self.code);
                let index = self.compile_expr(rhs, ctx)?;
                index.convert_to_stack(&mut self.code, Some(NumericType::UsizeT));
                self.code.push(Opcode::PushArray as u8);
                let element_ty = owner_ty
                    .indexable
                    .as_ref()
                    .map(|sig| sig.ret.clone())
                    .ok_or_else(|| EmitError::UnknownName(format!("{} is not indexable", owner_ty.name)))?;
                Ok(StorageDescriptor::heap(element_ty))
            }
            Node::Operator { op: OperatorKind::Call, lhs: Some(lhs), rhs, .. } => {
                let args: Vec<&'a Node> = match rhs.as_deref() {
                    Some(Node::ExpressionList { values, .. }) => values.iter().collect(),
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                self.compile_call(lhs, &args, ctx)
            }
            other => Err(EmitError::UnknownName(format!("{other:?}"))),
        }
    }

    /// `Foo(...)` where `Foo` names a declared type lowers to `NEW
    /// <type-id>`; where it names a function, to the usual
    /// `INIT_ARGS`/`CALL_EXPORT` sequence, enqueuing the callee for
    /// compilation via the same reservation mechanism `main` itself uses.
    fn compile_call(&mut self, lhs: &'a Node, args: &[&'a Node], ctx: &mut FunctionCtx) -> Result<StorageDescriptor, EmitError> {
        let ident = lhs
            .as_identifier()
            .ok_or_else(|| EmitError::UnknownName("call target must be a named function or type".to_string()))?;

        if let Some(&type_id) = self.type_ids.get(&ident.name) {
            // The bytecode format has no instance-member-write opcode (see
            // DESIGN.md), so `NEW` only allocates a zero-initialized
            // instance; constructor arguments are accepted syntactically
            // but have nowhere to go yet.
            let _ = args;
            self.code.push(Opcode::New as u8);
            self.code.extend_from_slice(&type_id.to_be_bytes());
            let ty = self.type_refs.get(&ident.name).expect("registered alongside type_id").clone();
            return Ok(StorageDescriptor::heap(ty));
        }

        let callee_node = *self
            .functions_by_fqdn
            .get(&ident.name)
            .ok_or_else(|| EmitError::UnknownName(ident.name.clone()))?;
        let (params, return_type, body) = self
            .signature_of(callee_node)
            .ok_or_else(|| EmitError::UnknownName(ident.name.clone()))?;
        let fn_id = match self.reservations.get(&ident.name).copied() {
            Some(id) => id,
            None => {
                let id = self.reserve(&ident.name);
                self.pending.push_back(PendingFunction {
                    fn_id: id,
                    params,
                    return_type: return_type.clone(),
                    body,
                });
                id
            }
        };

        for arg in args {
            let descriptor = self.compile_expr(arg, ctx)?;
            descriptor.retrieve(&mut self.code);
        }
        self.code.push(Opcode::InitArgs as u8);
        self.code.push(args.len() as u8);
        self.code.push(Opcode::CallExport as u8);
        self.code.extend_from_slice(&fn_id.to_be_bytes());
        Ok(StorageDescriptor::stack(return_type))
    }

    /// Determines the numeric type an expression will compile to, without
    /// emitting anything. Used to pick the widest operand type for an
    /// arithmetic opcode before either operand is actually pushed.
    fn infer_numeric(&self, node: &Node, ctx: &FunctionCtx) -> NumericType {
        match node {
            Node::Literal(lit) if lit.kind == crate::ast::LiteralKind::Number => {
                literal_numeric_type(lit, ctx.return_type_numeric_hint())
            }
            Node::Identifier(ident) => ctx
                .lookup_local(&ident.name)
                .or_else(|| ctx.lookup_param(&ident.name))
                .and_then(|(_, ty)| numeric_tag_of(&ty))
                .unwrap_or(NumericType::I32),
            Node::Operator { op, lhs: Some(lhs), rhs: Some(rhs), .. } if op.is_arithmetic() => {
                wider_numeric(&self.infer_numeric(lhs, ctx), &self.infer_numeric(rhs, ctx))
            }
            Node::Operator { op: OperatorKind::Eq | OperatorKind::Lt, .. } => NumericType::Bool,
            _ => NumericType::I32,
        }
    }
}

struct FunctionCtx {
    params: Vec<(String, TypeRef)>,
    locals: Vec<(String, TypeRef)>,
    return_type: TypeRef,
}

impl FunctionCtx {
    fn new(params: Vec<(String, TypeRef)>, return_type: TypeRef) -> Self {
        Self {
            params,
            locals: Vec::new(),
            return_type,
        }
    }

    fn lookup_param(&self, name: &str) -> Option<(u8, TypeRef)> {
        self.params
            .iter()
            .position(|(n, _)| n == name)
            .map(|idx| (idx as u8, self.params[idx].1.clone()))
    }

    fn lookup_local(&self, name: &str) -> Option<(u8, TypeRef)> {
        self.locals
            .iter()
            .position(|(n, _)| n == name)
            .map(|idx| (idx as u8, self.locals[idx].1.clone()))
    }

    fn return_type_numeric_hint(&self) -> Option<NumericType> {
        numeric_tag_of(&self.return_type)
    }
}

fn numeric_tag_of(ty: &TypeRef) -> Option<NumericType> {
    match ty.primitive_kind()? {
        PrimitiveKind::Bool => Some(NumericType::Bool),
        PrimitiveKind::Int { bits: 8, signed: true } => Some(NumericType::I8),
        PrimitiveKind::Int { bits: 8, signed: false } => Some(NumericType::U8),
        PrimitiveKind::Int { bits: 16, signed: true } => Some(NumericType::I16),
        PrimitiveKind::Int { bits: 16, signed: false } => Some(NumericType::U16),
        PrimitiveKind::Int { bits: 32, signed: true } => Some(NumericType::I32),
        PrimitiveKind::Int { bits: 32, signed: false } => Some(NumericType::U32),
        PrimitiveKind::Int { bits: 64, signed: true } => Some(NumericType::I64),
        PrimitiveKind::Int { bits: 64, signed: false } => Some(NumericType::U64),
        PrimitiveKind::Float { bits: 16, .. } => Some(NumericType::F16),
        PrimitiveKind::Float { bits: 32, .. } => Some(NumericType::F32),
        PrimitiveKind::Float { bits: 64, .. } => Some(NumericType::F64),
        _ => None,
    }
}

/// Mirrors the resolver's literal-typing rule (`spec.md` §4.2): f-suffix is
/// always `f32`, a dot is always `f64`, otherwise an integer literal wants
/// the enclosing context's hint if it fits, falling back to the native
/// word-size type.
fn literal_numeric_type(lit: &crate::ast::Literal, want: Option<NumericType>) -> NumericType {
    if lit.has_f_suffix() {
        return NumericType::F32;
    }
    if lit.has_dot() {
        return NumericType::F64;
    }
    if let Some(hint) = want {
        if !hint.is_float() {
            if let Ok(value) = lit.text.parse::<i128>() {
                if fits_tag(hint, value) {
                    return hint;
                }
            }
        }
    }
    if lit.is_negative() {
        NumericType::SizeT
    } else {
        NumericType::UsizeT
    }
}

/// The big-endian immediate bytes `PUSH_LITERAL` expects following its
/// numeric-type tag byte.
fn literal_immediate_bytes(lit: &crate::ast::Literal, numeric: NumericType) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(numeric.byte_width());
    if numeric.is_float() {
        let value: f64 = lit.text.trim_end_matches(['f', 'F']).parse().unwrap_or(0.0);
        match numeric {
            NumericType::F16 => bytes.extend_from_slice(&half::f16::from_f64(value).to_be_bytes()),
            NumericType::F32 => bytes.extend_from_slice(&(value as f32).to_be_bytes()),
            NumericType::F64 => bytes.extend_from_slice(&value.to_be_bytes()),
            _ => unreachable!(),
        }
    } else {
        let value: i128 = lit.text.parse().unwrap_or(0);
        match numeric {
            NumericType::U8 => bytes.push(value as u8),
            NumericType::I8 => bytes.push(value as i8 as u8),
            NumericType::U16 => bytes.extend_from_slice(&(value as u16).to_be_bytes()),
            NumericType::I16 => bytes.extend_from_slice(&(value as i16).to_be_bytes()),
            NumericType::U32 => bytes.extend_from_slice(&(value as u32).to_be_bytes()),
            NumericType::I32 => bytes.extend_from_slice(&(value as i32).to_be_bytes()),
            NumericType::U64 | NumericType::UsizeT => bytes.extend_from_slice(&(value as u64).to_be_bytes()),
            NumericType::I64 | NumericType::SizeT => bytes.extend_from_slice(&(value as i64).to_be_bytes()),
            NumericType::Bool => bytes.push(if value != 0 { 1 } else { 0 }),
            NumericType::F16 | NumericType::F32 | NumericType::F64 => unreachable!(),
        }
    }
    bytes
}

fn fits_tag(tag: NumericType, value: i128) -> bool {
    let (min, max): (i128, i128) = match tag {
        NumericType::U8 => (0, u8::MAX as i128),
        NumericType::U16 => (0, u16::MAX as i128),
        NumericType::U32 => (0, u32::MAX as i128),
        NumericType::U64 | NumericType::UsizeT => (0, u64::MAX as i128),
        NumericType::I8 => (i8::MIN as i128, i8::MAX as i128),
        NumericType::I16 => (i16::MIN as i128, i16::MAX as i128),
        NumericType::I32 => (i32::MIN as i128, i32::MAX as i128),
        NumericType::I64 | NumericType::SizeT => (i64::MIN as i128, i64::MAX as i128),
        NumericType::Bool => (0, 1),
        NumericType::F16 | NumericType::F32 | NumericType::F64 => return true,
    };
    value >= min && value <= max
}

/// The wider of two numeric-type tags: float beats integer, and ties within
/// a kind go to the larger byte width (`spec.md` §4.5's arithmetic rule).
fn wider_numeric(a: &NumericType, b: &NumericType) -> NumericType {
    let (a, b) = (*a, *b);
    if a.is_float() || b.is_float() {
        return match (a.is_float(), b.is_float()) {
            (true, true) => if a.byte_width() >= b.byte_width() { a } else { b },
            (true, false) => a,
            (false, true) => b,
            _ => unreachable!(),
        };
    }
    if a.byte_width() >= b.byte_width() {
        a
    } else {
        b
    }
}

fn arithmetic_opcode(op: OperatorKind) -> Opcode {
    match op {
        OperatorKind::Add => Opcode::CheckedAdd,
        OperatorKind::Sub => Opcode::CheckedSub,
        OperatorKind::Mul => Opcode::CheckedMul,
        OperatorKind::Div => Opcode::CheckedIdiv,
        _ => unreachable!("arithmetic_opcode called with a non-arithmetic operator"),
    }
}

fn is_valid_main_return(ty: &TypeRef) -> bool {
    matches!(
        ty.primitive_kind(),
        Some(PrimitiveKind::Void) | Some(PrimitiveKind::Int { .. })
    )
}

fn is_valid_main_params(params: &[(String, TypeRef)]) -> bool {
    params.is_empty() || (params.len() == 1 && params[0].1.indexable.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceLocation;
    use crate::types::seed_builtins;

    fn loc() -> SourceLocation {
        SourceLocation::synthetic()
    }

    fn fn_decl(name: &str, return_type: &str, body: Vec<Node>) -> Node {
        Node::Declaration {
            identity: Box::new(Node::Identity {
                left: IdentityLhs::Name(crate::ast::Ident::new(name, loc())),
                right: Box::new(Node::TypeExpr(crate::ast::TypeExpr {
                    base: crate::ast::Ident::new(return_type, loc()),
                    mods: vec![TypeModifier::ParamList(vec![])],
                    location: loc(),
                })),
                location: loc(),
            }),
            initial: Some(Box::new(Node::Scope {
                statements: body,
                location: loc(),
            })),
            is_fat_arrow: false,
            location: loc(),
        }
    }

    fn main_decl(return_type: &str, body: Vec<Node>) -> Node {
        fn_decl("main", return_type, body)
    }

    fn identity_decl(name: &str, type_name: &str) -> Node {
        Node::Identity {
            left: IdentityLhs::Name(crate::ast::Ident::new(name, loc())),
            right: Box::new(Node::TypeExpr(crate::ast::TypeExpr {
                base: crate::ast::Ident::new(type_name, loc()),
                mods: vec![],
                location: loc(),
            })),
            location: loc(),
        }
    }

    fn point_type_decl() -> Node {
        Node::TypeDeclaration {
            name: crate::ast::Ident::new("Point", loc()),
            is_interface: false,
            definition: Some(crate::ast::TypeDefinition::Body(vec![
                identity_decl("x", "i32"),
                identity_decl("y", "i32"),
            ])),
            location: loc(),
        }
    }

    #[test]
    fn emits_an_empty_void_main_that_returns() {
        let builtins = seed_builtins();
        let doc = vec![main_decl("void", vec![Node::Return { value: None, location: loc() }])];
        let (binary, _layouts) = Emitter::new(&builtins).emit_document(&doc).unwrap();
        assert_eq!(binary.code, vec![Opcode::Ret as u8]);
    }

    #[test]
    fn folds_and_emits_a_returned_literal_sum() {
        let builtins = seed_builtins();
        let sum = Node::Operator {
            op: OperatorKind::Add,
            lhs: Some(Box::new(Node::Literal(crate::ast::Literal::number("1", loc())))),
            rhs: Some(Box::new(Node::Literal(crate::ast::Literal::number("2", loc())))),
            location: loc(),
        };
        let doc = vec![main_decl(
            "i32",
            vec![Node::Return {
                value: Some(Box::new(sum)),
                location: loc(),
            }],
        )];
        let (binary, _layouts) = Emitter::new(&builtins).emit_document(&doc).unwrap();
        assert_eq!(*binary.code.last().unwrap(), Opcode::Ret as u8);
        assert!(binary.code.contains(&(Opcode::CheckedAdd as u8)));
    }

    #[test]
    fn missing_main_is_an_error() {
        let builtins = seed_builtins();
        let err = Emitter::new(&builtins).emit_document(&[]).unwrap_err();
        assert_eq!(err, EmitError::NoMain);
    }

    #[test]
    fn trailing_call_then_ret_is_rewritten_to_a_tail_call() {
        // Exercises the peephole rewrite itself against hand-assembled
        // bytes, independent of whatever lowered the preceding `CALL_EXPORT`.
        let builtins = seed_builtins();
        let mut emitter = Emitter::new(&builtins);
        emitter.code.push(Opcode::CallExport as u8);
        emitter.code.extend_from_slice(&0u16.to_be_bytes());
        emitter.code.push(Opcode::Ret as u8);
        emitter.functions.push(FunctionEntry {
            name: 0,
            scope: 0,
            signature: 0,
            address: 0,
        });
        emitter.rewrite_tail_call(0);
        assert_eq!(emitter.code[0], Opcode::TailExport as u8);
        assert_eq!(emitter.code.len(), 3);
    }

    #[test]
    fn compiles_a_call_to_a_sibling_function_via_call_export() {
        let builtins = seed_builtins();
        let call = Node::Operator {
            op: OperatorKind::Call,
            lhs: Some(Box::new(Node::Identifier(crate::ast::Ident::new("helper", loc())))),
            rhs: None,
            location: loc(),
        };
        let doc = vec![
            main_decl(
                "i32",
                vec![Node::Return {
                    value: Some(Box::new(call)),
                    location: loc(),
                }],
            ),
            fn_decl(
                "helper",
                "i32",
                vec![Node::Return {
                    value: Some(Box::new(Node::Literal(crate::ast::Literal::number("4", loc())))),
                    location: loc(),
                }],
            ),
        ];
        let (binary, _layouts) = Emitter::new(&builtins).emit_document(&doc).unwrap();
        assert!(binary.code.contains(&(Opcode::CallExport as u8)));
        assert!(binary.code.contains(&(Opcode::InitArgs as u8)));
        assert_eq!(binary.functions.len(), 2);
    }

    #[test]
    fn compiles_a_type_construction_call_to_new_and_reports_its_layout() {
        let builtins = seed_builtins();
        let construct = Node::Operator {
            op: OperatorKind::Call,
            lhs: Some(Box::new(Node::Identifier(crate::ast::Ident::new("Point", loc())))),
            rhs: None,
            location: loc(),
        };
        let p_decl = Node::Declaration {
            identity: Box::new(identity_decl("p", "Point")),
            initial: Some(Box::new(construct)),
            is_fat_arrow: false,
            location: loc(),
        };
        let doc = vec![
            point_type_decl(),
            main_decl("void", vec![p_decl, Node::Return { value: None, location: loc() }]),
        ];
        let (binary, layouts) = Emitter::new(&builtins).emit_document(&doc).unwrap();
        assert!(binary.code.contains(&(Opcode::New as u8)));
        assert_eq!(layouts, vec![2]);
    }

    #[test]
    fn compiles_member_access_into_push_ref() {
        let builtins = seed_builtins();
        let construct = Node::Operator {
            op: OperatorKind::Call,
            lhs: Some(Box::new(Node::Identifier(crate::ast::Ident::new("Point", loc())))),
            rhs: None,
            location: loc(),
        };
        let p_decl = Node::Declaration {
            identity: Box::new(identity_decl("p", "Point")),
            initial: Some(Box::new(construct)),
            is_fat_arrow: false,
            location: loc(),
        };
        let member_access = Node::Operator {
            op: OperatorKind::Dot,
            lhs: Some(Box::new(Node::Identifier(crate::ast::Ident::new("p", loc())))),
            rhs: Some(Box::new(Node::Identifier(crate::ast::Ident::new("x", loc())))),
            location: loc(),
        };
        let doc = vec![
            point_type_decl(),
            main_decl(
                "i32",
                vec![
                    p_decl,
                    Node::Return {
                        value: Some(Box::new(member_access)),
                        location: loc(),
                    },
                ],
            ),
        ];
        let (binary, _layouts) = Emitter::new(&builtins).emit_document(&doc).unwrap();
        assert!(binary.code.contains(&(Opcode::PushRef as u8)));
    }
}
