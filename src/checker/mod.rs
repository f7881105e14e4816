//! The type checker: `_populate`, `_optimize`, `_check` — driven over the
//! whole program, in that order.
//!
//! Grounded on the master `_check` dispatch in the original compiler's
//! `compiler/analyzer/checks/__init__.py`, `_check_declaration.py` (shadow/
//! redefinition wording, method-body scope synthesis), and
//! `_check_type_declaration.py` (constructor completeness wording). The
//! conversion rule table lives in [`convert`]; constant folding lives in
//! [`optimize`].

pub mod convert;
pub mod optimize;

pub use convert::{check_conversion, check_interface_conformance, ConversionOutcome};
pub use optimize::optimize_document;

use crate::ast::{Document, Ident, IdentityLhs, Node, OperatorKind, SpecialOperatorKind, TypeDefinition, TypeModifier};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::resolver::{ResolveError, Resolver};
use crate::scope::{Binding, Scope, ScopeRef, ScopeStack, VariableDecl};
use crate::span::SourceLocation;
use crate::types::{
    seed_builtins, BuiltinTable, ComposedFacet, GenericBinding, GenericFacet, InterfaceFacet,
    PrimitiveKind, Signature, SpecialOperatorKind as TypeSpecialOperatorKind, Type, TypeFacet,
    TypeRef,
};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::rc::Rc;

fn node_ptr(node: &Node) -> usize {
    node as *const Node as usize
}

/// The whole-program type checker. Owns the scope stack, the builtin
/// table, and the two tracking sets §4.3 requires: `checked` (an element
/// visited more than once is a bug) and `absorbed` (fragments the checker
/// silently consumes, like identifiers nested inside a type expression).
pub struct Checker {
    pub scopes: ScopeStack,
    pub builtins: BuiltinTable,
    pub sink: DiagnosticSink,
    checked: HashSet<usize>,
    absorbed: HashSet<usize>,
}

impl Checker {
    pub fn new() -> Self {
        let root = Scope::root(SourceLocation::synthetic());
        Self {
            scopes: ScopeStack::new(root),
            builtins: seed_builtins(),
            sink: DiagnosticSink::new(),
            checked: HashSet::new(),
            absorbed: HashSet::new(),
        }
    }

    /// Marks `node` as checked; pushes a `Critical` diagnostic and returns
    /// `false` if it had already been visited this pass.
    fn mark_checked(&mut self, node: &Node) -> bool {
        if !self.checked.insert(node_ptr(node)) {
            self.sink.push(Diagnostic::critical(
                "internal error: node checked more than once",
                Some(node.location().clone()),
            ));
            return false;
        }
        true
    }

    fn mark_absorbed(&mut self, node: &Node) {
        self.absorbed.insert(node_ptr(node));
    }

    /// Runs `_populate` then `_check` over `doc`, returning the collected
    /// diagnostics. Per §8's idempotence invariant, calling this twice on
    /// the same freshly-built `Checker` would yield the same diagnostic set
    /// (the tracking sets exist to make a *bug* in that loud rather than
    /// silently re-emitting).
    pub fn populate_and_check(&mut self, doc: &Document) -> Vec<Diagnostic> {
        self.populate(doc);
        self.check(doc);
        std::mem::take(&mut self.sink).into_vec()
    }

    // ---- populate -------------------------------------------------------

    fn populate(&mut self, doc: &Document) {
        for node in &doc.content {
            self.populate_top_level(node);
        }
    }

    fn populate_top_level(&mut self, node: &Node) {
        match node {
            Node::Namespace { name, body, location } => {
                match Scope::enter(&self.scopes.current(), &name.name, location.clone()) {
                    Ok(child) => {
                        self.scopes.push(child);
                        for inner in body {
                            self.populate_top_level(inner);
                        }
                        self.scopes.pop();
                    }
                    Err(err) => self.sink.push(Diagnostic::error(err.to_string(), Some(location.clone()))),
                }
            }
            Node::TypeDeclaration { name, is_interface, definition, location } => {
                self.populate_type_declaration(name, *is_interface, definition.as_ref(), location);
            }
            Node::Declaration { identity, initial, location, .. } => {
                self.populate_declaration(identity, initial.as_deref(), location);
            }
            _ => {}
        }
    }

    fn declare_name(&mut self, name: &Ident, decl: VariableDecl) {
        let scope = self.scopes.current();
        match Scope::in_scope(&scope, &name.name) {
            Some(Binding::Variable(_)) if scope.borrow().bindings.contains_key(&name.name) => {
                self.sink.push(Diagnostic::error(
                    format!("Redefinition of '{}'.", name.name),
                    Some(name.location.clone()),
                ));
                return;
            }
            Some(_) => {
                self.sink.push(Diagnostic::warning(
                    format!("Declaration of '{}' shadows previous declaration.", name.name),
                    Some(name.location.clone()),
                ));
            }
            None => {}
        }
        Scope::declare(&scope, &name.name, decl);
    }

    fn populate_declaration(&mut self, identity: &Node, initial: Option<&Node>, location: &SourceLocation) {
        let Node::Identity { left, right, .. } = identity else {
            self.sink.push(Diagnostic::critical(
                "declaration without an identity node",
                Some(location.clone()),
            ));
            return;
        };
        let IdentityLhs::Name(name) = left else {
            // Special-operator members are populated as part of a type
            // declaration's body, never as a standalone top-level
            // declaration.
            return;
        };
        let ty = match self.resolve_type_expr(right) {
            Ok(ty) => ty,
            Err(err) => {
                self.sink.push(Diagnostic::error(err.to_string(), Some(right.location().clone())));
                return;
            }
        };
        let _ = initial;
        self.declare_name(name, VariableDecl::new(ty, location.clone(), false));
    }

    fn populate_type_declaration(
        &mut self,
        name: &Ident,
        is_interface: bool,
        definition: Option<&TypeDefinition>,
        location: &SourceLocation,
    ) -> Option<TypeRef> {
        let Some(definition) = definition else {
            if !is_builtin_name(&name.name) {
                self.sink.push(Diagnostic::error(
                    format!("Forward declaration of type '{}' without assignment.", name.name),
                    Some(location.clone()),
                ));
            }
            return self.builtins.get(&name.name);
        };
        match definition {
            TypeDefinition::Alias(target) => match self.resolve_type_expr(target) {
                Ok(ty) => {
                    self.declare_name(name, VariableDecl::new(self.meta_type(), location.clone(), true));
                    Some(ty)
                }
                Err(err) => {
                    self.sink.push(Diagnostic::error(err.to_string(), Some(target.location().clone())));
                    None
                }
            },
            TypeDefinition::Body(members) => {
                let this_placeholder = Type::new_this();
                let this_decl = VariableDecl::new(this_placeholder.clone(), location.clone(), true);

                let mut instance_members = IndexMap::new();
                let mut static_members = IndexMap::new();
                let mut special_operators = IndexMap::new();
                let mut inherits = Vec::new();
                let mut readonly_members = HashSet::new();
                let mut default_members = HashSet::new();

                let function_scope = Scope::new_child(
                    &self.scopes.current(),
                    &format!("{}#body", name.name),
                    location.clone(),
                    vec![("this".to_string(), this_decl)],
                    None,
                )
                .expect("type body scope name is unique per declaration");
                self.scopes.push(function_scope);

                for member in members {
                    self.populate_type_member(
                        member,
                        &mut instance_members,
                        &mut static_members,
                        &mut special_operators,
                        &mut inherits,
                        &mut readonly_members,
                        &mut default_members,
                        is_interface,
                    );
                }

                // `this` is still bound in `function_scope`, so the
                // constructor's assignment targets can be resolved via
                // `resolve_owning_type` before it's torn down.
                let assigned_members = constructor_body(members)
                    .map(|statements| self.collect_assigned_members(statements))
                    .unwrap_or_default();

                self.scopes.pop();

                if let Some(ctor) = special_operators.get(&TypeSpecialOperatorKind::Constructor) {
                    if ctor.ret.facet_is_not_this() {
                        self.sink.push(Diagnostic::error(
                            format!("Constructor for '{}' must return `this`.", name.name),
                            Some(location.clone()),
                        ));
                    }
                }

                let composed = Rc::new(Type {
                    name: name.name.clone(),
                    size: None,
                    is_reference: true,
                    callable: None,
                    indexable: None,
                    instance_members,
                    static_members,
                    readonly_members,
                    inherits,
                    is_const: false,
                    facet: TypeFacet::Composed(ComposedFacet {
                        special_operators,
                        generic: None,
                        interface: if is_interface {
                            Some(InterfaceFacet { default_members })
                        } else {
                            None
                        },
                    }),
                });

                if let TypeFacet::This(cell) = &this_placeholder.facet {
                    let _ = cell.resolve(composed.clone());
                }

                self.declare_name(name, VariableDecl::new(self.meta_type(), location.clone(), true));
                self.check_constructor_completeness(name, &composed, location, &assigned_members);
                Some(composed)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn populate_type_member(
        &mut self,
        member: &Node,
        instance_members: &mut IndexMap<String, TypeRef>,
        static_members: &mut IndexMap<String, TypeRef>,
        special_operators: &mut IndexMap<TypeSpecialOperatorKind, Signature>,
        inherits: &mut Vec<TypeRef>,
        readonly_members: &mut HashSet<String>,
        default_members: &mut HashSet<String>,
        is_interface: bool,
    ) {
        let (identity, has_body) = match member {
            Node::Identity { .. } => (member, false),
            Node::Declaration { identity, initial, .. } => (identity.as_ref(), initial.is_some()),
            _ => return,
        };
        let Node::Identity { left, right, location } = identity else {
            return;
        };
        match left {
            IdentityLhs::Name(name) if name.name == "this" => match self.resolve_type_expr(right) {
                Ok(base) => {
                    if is_invalid_inheritance_base(&base) {
                        self.sink.push(Diagnostic::error(
                            format!("Cannot inherit from `{}`.", base.name),
                            Some(location.clone()),
                        ));
                    } else {
                        if base.as_composed().map(|c| c.interface.is_some()) != Some(true) {
                            for (mname, mty) in &base.instance_members {
                                instance_members.entry(mname.clone()).or_insert_with(|| mty.clone());
                            }
                        }
                        inherits.push(base);
                    }
                }
                Err(err) => self.sink.push(Diagnostic::error(err.to_string(), Some(location.clone()))),
            },
            IdentityLhs::Name(name) => match self.resolve_type_expr(right) {
                Ok(ty) => {
                    if has_body && is_interface {
                        default_members.insert(name.name.clone());
                    }
                    if name.name.starts_with("const_") {
                        readonly_members.insert(name.name.clone());
                    }
                    instance_members.insert(name.name.clone(), ty);
                }
                Err(err) => self.sink.push(Diagnostic::error(err.to_string(), Some(location.clone()))),
            },
            IdentityLhs::SpecialOperator(kind, _) => match self.resolve_type_expr(right) {
                Ok(ty) => {
                    let sig = match &ty.callable {
                        Some(sig) => sig.clone(),
                        None => {
                            self.sink.push(Diagnostic::error(
                                "special operator must have a callable type",
                                Some(location.clone()),
                            ));
                            return;
                        }
                    };
                    let type_kind = match kind {
                        crate::ast::SpecialOperatorKind::Constructor => TypeSpecialOperatorKind::Constructor,
                        crate::ast::SpecialOperatorKind::Index => TypeSpecialOperatorKind::Index,
                    };
                    if special_operators.insert(type_kind, sig).is_some() {
                        self.sink.push(Diagnostic::error(
                            format!("Redefinition of '{}'.", left.display_name()),
                            Some(location.clone()),
                        ));
                    }
                }
                Err(err) => self.sink.push(Diagnostic::error(err.to_string(), Some(location.clone()))),
            },
        }
        let _ = static_members;
    }

    /// Walks a constructor body's assignment targets (`this.member = ...` or
    /// bare `.member = ...`) via `Resolver::resolve_owning_type`, collecting
    /// the set of instance members it actually initializes. Must be called
    /// while `this` is still bound in scope, i.e. before the type body's
    /// `function_scope` is popped.
    fn collect_assigned_members(&mut self, statements: &[Node]) -> HashSet<String> {
        let mut assigned = HashSet::new();
        self.collect_assigned_members_into(statements, &mut assigned);
        assigned
    }

    fn collect_assigned_members_into(&mut self, statements: &[Node], assigned: &mut HashSet<String>) {
        for stmt in statements {
            match stmt {
                Node::Operator {
                    op: OperatorKind::Assign,
                    lhs: Some(lhs),
                    ..
                } => {
                    let resolver = Resolver::new(&self.builtins);
                    if let Ok((owner, Some(member))) = resolver.resolve_owning_type(lhs, &mut self.scopes) {
                        if owner.ty.is_this() {
                            assigned.insert(member);
                        }
                    }
                }
                Node::Scope { statements: inner, .. } => self.collect_assigned_members_into(inner, assigned),
                Node::If { arms, .. } => {
                    for arm in arms {
                        self.collect_assigned_members_into(&arm.body, assigned);
                    }
                }
                _ => {}
            }
        }
    }

    fn check_constructor_completeness(
        &mut self,
        name: &Ident,
        ty: &TypeRef,
        location: &SourceLocation,
        assigned: &HashSet<String>,
    ) {
        let composed = match ty.as_composed() {
            Some(c) => c,
            None => return,
        };
        let has_ctor = composed.special_operators.contains_key(&TypeSpecialOperatorKind::Constructor);
        let uninitialized: Vec<&String> = ty
            .instance_members
            .keys()
            .filter(|m| !ty.readonly_members.contains(*m) && !assigned.contains(*m))
            .collect();
        if uninitialized.is_empty() {
            return;
        }
        let names = uninitialized.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
        let fqdn_prefix = Scope::fqdn(&self.scopes.current());
        let fqdn = if fqdn_prefix.is_empty() {
            name.name.clone()
        } else {
            format!("{fqdn_prefix}.{}", name.name)
        };
        if has_ctor {
            self.sink.push(Diagnostic::warning(
                format!("Constructor for '{fqdn}' does not initialize members '{names}'."),
                Some(location.clone()),
            ));
        } else {
            self.sink.push(Diagnostic::warning(
                format!("Type '{fqdn}' has uninitialized members: {names}. Consider adding a constructor?"),
                Some(location.clone()),
            ));
        }
    }

    fn meta_type(&self) -> TypeRef {
        self.builtins.get("type").unwrap()
    }

    // ---- type expressions -------------------------------------------------

    fn resolve_type_expr(&mut self, node: &Node) -> Result<TypeRef, ResolveError> {
        let expr = match node {
            Node::TypeExpr(expr) => expr,
            _ => return Err(ResolveError::NotAType("<non-type-expr>".to_string())),
        };
        let mut base = match Scope::in_scope(&self.scopes.current(), &expr.base.name) {
            Some(Binding::Variable(decl)) => {
                self.mark_absorbed(node);
                if decl.ty.primitive_kind() == Some(PrimitiveKind::MetaType) {
                    self.builtins
                        .get(&expr.base.name)
                        .or_else(|| self.builtins.string_type_if_named(&expr.base.name))
                        .unwrap_or(decl.ty)
                } else {
                    decl.ty
                }
            }
            _ => return Err(ResolveError::Undefined(expr.base.name.clone())),
        };

        for modifier in &expr.mods {
            base = match modifier {
                TypeModifier::ArrayDef => {
                    let array_ty = self.builtins.get("Array").unwrap();
                    crate::types::rebuild_generic(&array_ty, &IndexMap::from([("T".to_string(), base)]))
                        .expect("Array<T> rebuild is always valid for a concrete T")
                }
                TypeModifier::ParamList(params) => {
                    let mut param_types = Vec::new();
                    for param in params {
                        if let Node::Identity { right, .. } = param {
                            param_types.push(self.resolve_type_expr(right)?);
                        }
                    }
                    let sig = Signature { params: param_types, ret: base };
                    Rc::new(Type {
                        name: "function".to_string(),
                        size: None,
                        is_reference: true,
                        callable: Some(sig),
                        indexable: None,
                        instance_members: IndexMap::new(),
                        static_members: IndexMap::new(),
                        readonly_members: HashSet::new(),
                        inherits: Vec::new(),
                        is_const: false,
                        facet: TypeFacet::Primitive(PrimitiveKind::Void),
                    })
                }
                TypeModifier::GenericParamList(params) => {
                    let generic_facet = match base.generic() {
                        Some(g) => g,
                        None => return Err(ResolveError::NotAType(base.name.clone())),
                    };
                    let param_names: Vec<String> = generic_facet.params.keys().cloned().collect();
                    let mut bindings = IndexMap::new();
                    for (name, param_node) in param_names.iter().zip(params) {
                        bindings.insert(name.clone(), self.resolve_type_expr(param_node)?);
                    }
                    crate::types::rebuild_generic(&base, &bindings).map_err(|_| ResolveError::NotAType(base.name.clone()))?
                }
            };
        }
        Ok(base)
    }

    // ---- check ------------------------------------------------------------

    fn check(&mut self, doc: &Document) {
        for node in &doc.content {
            self.check_top_level(node);
        }
    }

    fn check_top_level(&mut self, node: &Node) {
        if !self.mark_checked(node) {
            return;
        }
        match node {
            Node::Namespace { name, body, location } => {
                let scope = Scope::enter(&self.scopes.current(), &name.name, location.clone())
                    .expect("populate already validated this namespace");
                self.scopes.push(scope);
                for inner in body {
                    self.check_top_level(inner);
                }
                self.scopes.pop();
            }
            Node::TypeDeclaration { .. } => {
                // Member bodies (constructor/method statements) are checked
                // when reachable from `main`; see `check_function_body`.
            }
            Node::Declaration { identity, initial, .. } => {
                self.check_declaration(identity, initial.as_deref());
            }
            _ => {}
        }
    }

    fn check_declaration(&mut self, identity: &Node, initial: Option<&Node>) {
        let Node::Identity { right, .. } = identity else { return };
        let Ok(declared_ty) = self.resolve_type_expr(right) else { return };
        if let Some(initial) = initial {
            if matches!(initial, Node::Scope { .. }) {
                self.check_function_body(initial, &declared_ty);
                return;
            }
            let resolver = Resolver::new(&self.builtins);
            match resolver.resolve_type(initial, &mut self.scopes, Some(&declared_ty)) {
                Ok(initial_ty) => match check_conversion(&initial_ty, &declared_ty) {
                    ConversionOutcome::Ok => {}
                    ConversionOutcome::Warn(message) => {
                        self.sink.push(Diagnostic::warning(message, Some(initial.location().clone())))
                    }
                    ConversionOutcome::Err(message) => {
                        self.sink.push(Diagnostic::error(message, Some(initial.location().clone())))
                    }
                },
                Err(err) => self.sink.push(Diagnostic::error(err.to_string(), Some(initial.location().clone()))),
            }
        }
    }

    fn check_function_body(&mut self, body: &Node, fn_ty: &TypeRef) {
        let Node::Scope { statements, .. } = body else { return };
        let Some(sig) = fn_ty.callable.clone() else { return };
        let return_scope = Scope::new_child(
            &self.scopes.current(),
            &format!("fn#{}", node_ptr(body)),
            body.location().clone(),
            Vec::new(),
            Some(sig.ret.clone()),
        )
        .expect("unique per call site");
        self.scopes.push(return_scope);

        if statements.is_empty() {
            self.sink.push(Diagnostic::warning("Empty method body.", Some(body.location().clone())));
        }

        let mut seen_return = false;
        self.check_block(statements, &sig, &mut seen_return);

        self.scopes.pop();
    }

    /// Checks one block of statements: top-level `return`s are tallied
    /// against `seen_return` (a second one is an error), `Declaration`s are
    /// bound into the current scope, and `Scope`/`If` recurse — an `If`
    /// arm's body gets its own child scope and its own `seen_return` tally,
    /// since its `return` is not a sibling of the enclosing body's.
    fn check_block(&mut self, statements: &[Node], sig: &Signature, seen_return: &mut bool) {
        for stmt in statements {
            if !self.mark_checked(stmt) {
                continue;
            }
            match stmt {
                Node::Return { value, location } => {
                    if *seen_return {
                        self.sink.push(Diagnostic::error(
                            "Multiple top-level returns in one function body.",
                            Some(location.clone()),
                        ));
                    }
                    *seen_return = true;
                    let resolver = Resolver::new(&self.builtins);
                    let return_ty = resolver
                        .resolve_type(stmt, &mut self.scopes, Some(&sig.ret))
                        .unwrap_or_else(|_| self.builtins.get("void").unwrap());
                    if value.is_none() && !sig.ret.is_void() {
                        self.sink.push(Diagnostic::error(
                            "Empty return in a non-void function.",
                            Some(location.clone()),
                        ));
                    } else {
                        match check_conversion(&return_ty, &sig.ret) {
                            ConversionOutcome::Ok => {}
                            ConversionOutcome::Warn(message) => {
                                self.sink.push(Diagnostic::warning(message, Some(location.clone())))
                            }
                            ConversionOutcome::Err(message) => {
                                self.sink.push(Diagnostic::error(message, Some(location.clone())))
                            }
                        }
                    }
                }
                Node::Declaration { identity, initial, location, .. } => {
                    self.check_local_declaration(identity, initial.as_deref(), location);
                }
                Node::Scope { statements: inner, .. } => {
                    self.check_block(inner, sig, seen_return);
                }
                Node::If { arms, .. } => {
                    for arm in arms {
                        if let Some(term) = &arm.term {
                            let resolver = Resolver::new(&self.builtins);
                            if let Err(err) = resolver.resolve_type(term, &mut self.scopes, None) {
                                self.sink.push(Diagnostic::error(err.to_string(), Some(term.location().clone())));
                            }
                        }
                        let arm_scope = Scope::new_child(
                            &self.scopes.current(),
                            &format!("if#{}", arm.body.as_ptr() as usize),
                            arm.location.clone(),
                            Vec::new(),
                            None,
                        )
                        .expect("unique per arm body");
                        self.scopes.push(arm_scope);
                        let mut arm_seen_return = false;
                        self.check_block(&arm.body, sig, &mut arm_seen_return);
                        self.scopes.pop();
                    }
                }
                _ => {}
            }
        }
    }

    /// A body-local declaration: resolves its type, checks its initializer's
    /// conversion (mirroring `check_declaration`'s top-level logic), then
    /// binds it into the current scope via `declare_name` so a later
    /// declaration of the same name is flagged as a shadow or redefinition.
    fn check_local_declaration(&mut self, identity: &Node, initial: Option<&Node>, location: &SourceLocation) {
        let Node::Identity { left, right, .. } = identity else { return };
        let IdentityLhs::Name(name) = left else { return };
        let Ok(declared_ty) = self.resolve_type_expr(right) else { return };
        if let Some(initial) = initial {
            if matches!(initial, Node::Scope { .. }) {
                self.check_function_body(initial, &declared_ty);
            } else {
                let resolver = Resolver::new(&self.builtins);
                match resolver.resolve_type(initial, &mut self.scopes, Some(&declared_ty)) {
                    Ok(initial_ty) => match check_conversion(&initial_ty, &declared_ty) {
                        ConversionOutcome::Ok => {}
                        ConversionOutcome::Warn(message) => {
                            self.sink.push(Diagnostic::warning(message, Some(initial.location().clone())))
                        }
                        ConversionOutcome::Err(message) => {
                            self.sink.push(Diagnostic::error(message, Some(initial.location().clone())))
                        }
                    },
                    Err(err) => self.sink.push(Diagnostic::error(err.to_string(), Some(initial.location().clone()))),
                }
            }
        }
        self.declare_name(name, VariableDecl::new(declared_ty, location.clone(), false));
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

fn is_builtin_name(name: &str) -> bool {
    crate::types::builtin_names().contains(&name)
}

/// Finds the constructor member among a type body's `members`, returning
/// its body's statements if it has one (a forward-declared constructor has
/// none).
fn constructor_body(members: &[Node]) -> Option<&[Node]> {
    members.iter().find_map(|member| {
        let Node::Declaration { identity, initial: Some(initial), .. } = member else {
            return None;
        };
        let Node::Identity {
            left: IdentityLhs::SpecialOperator(SpecialOperatorKind::Constructor, _),
            ..
        } = identity.as_ref()
        else {
            return None;
        };
        match initial.as_ref() {
            Node::Scope { statements, .. } => Some(statements.as_slice()),
            _ => None,
        }
    })
}

fn is_invalid_inheritance_base(ty: &TypeRef) -> bool {
    ty.callable.is_some()
        || ty.indexable.is_some()
        || matches!(ty.primitive_kind(), Some(PrimitiveKind::Int { .. }))
        || matches!(ty.facet, TypeFacet::GenericParam(_))
}

impl Type {
    fn facet_is_not_this(&self) -> bool {
        !self.is_this()
    }
}

impl BuiltinTable {
    fn string_type_if_named(&self, name: &str) -> Option<TypeRef> {
        if name == "string" {
            Some(self.string_type())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ident, Literal, TypeExpr};

    fn loc() -> SourceLocation {
        SourceLocation::synthetic()
    }

    fn void_fn_doc() -> Document {
        // main: void() = { };
        let identity = Node::Identity {
            left: IdentityLhs::Name(Ident::new("main", loc())),
            right: Box::new(Node::TypeExpr(TypeExpr {
                base: Ident::new("void", loc()),
                mods: vec![TypeModifier::ParamList(vec![])],
                location: loc(),
            })),
            location: loc(),
        };
        let decl = Node::Declaration {
            identity: Box::new(identity),
            initial: Some(Box::new(Node::Scope {
                statements: vec![],
                location: loc(),
            })),
            is_fat_arrow: false,
            location: loc(),
        };
        Document {
            content: vec![decl],
            location: loc(),
        }
    }

    #[test]
    fn empty_void_main_checks_cleanly_except_empty_body_warning() {
        let doc = void_fn_doc();
        let mut checker = Checker::new();
        let diags = checker.populate_and_check(&doc);
        assert!(diags.iter().all(|d| !d.is_fatal()), "unexpected errors: {diags:?}");
    }

    #[test]
    fn void_assignment_is_an_error() {
        // x: void = 0;
        let identity = Node::Identity {
            left: IdentityLhs::Name(Ident::new("x", loc())),
            right: Box::new(Node::TypeExpr(TypeExpr {
                base: Ident::new("void", loc()),
                mods: vec![],
                location: loc(),
            })),
            location: loc(),
        };
        let decl = Node::Declaration {
            identity: Box::new(identity),
            initial: Some(Box::new(Node::Literal(Literal::number("0", loc())))),
            is_fat_arrow: false,
            location: loc(),
        };
        let doc = Document {
            content: vec![decl],
            location: loc(),
        };
        let mut checker = Checker::new();
        let diags = checker.populate_and_check(&doc);
        assert!(diags
            .iter()
            .any(|d| d.message == "There are no conversions to or from void."));
    }

    #[test]
    fn narrowing_literal_assignment_warns() {
        // x: u8 = 500;
        let identity = Node::Identity {
            left: IdentityLhs::Name(Ident::new("x", loc())),
            right: Box::new(Node::TypeExpr(TypeExpr {
                base: Ident::new("u8", loc()),
                mods: vec![],
                location: loc(),
            })),
            location: loc(),
        };
        let decl = Node::Declaration {
            identity: Box::new(identity),
            initial: Some(Box::new(Node::Literal(Literal::number("500", loc())))),
            is_fat_arrow: false,
            location: loc(),
        };
        let doc = Document {
            content: vec![decl],
            location: loc(),
        };
        let mut checker = Checker::new();
        let diags = checker.populate_and_check(&doc);
        assert!(diags.iter().any(|d| d.message.starts_with("Narrowing when implicitly converting")));
    }
}
