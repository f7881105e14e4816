//! Maps syntax nodes to types, scopes, or variable declarations.
//!
//! Grounded on `resolve_type`/`resolve_owning_type`/`resolve_literal_operation`
//! in the original compiler's `compiler/analyzer/resolvers.py`. Two
//! deliberate divergences (recorded in `DESIGN.md`): overload resolution is
//! omitted entirely, and a literal `f` suffix always yields `f32` rather
//! than replicating the reference's `want`-hint interaction on f-suffixed
//! text.

use crate::ast::{IdentityLhs, Literal, LiteralKind, Node, OperatorKind};
use crate::scope::{Binding, ScopeRef, ScopeStack, VariableDecl};
use crate::types::{BuiltinTable, PrimitiveKind, TypeRef};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Undefined(String),
    NotIndexable(String),
    NotCallable(String),
    ThisNotInScope,
    NoOwner,
    NotAType(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Undefined(name) => write!(f, "`{name}` is not defined"),
            ResolveError::NotIndexable(name) => write!(f, "`{name}` is not indexable"),
            ResolveError::NotCallable(name) => write!(f, "`{name}` is not callable"),
            ResolveError::ThisNotInScope => write!(f, "`this` is not in scope here"),
            ResolveError::NoOwner => write!(f, "expression has no assignable owner"),
            ResolveError::NotAType(name) => write!(f, "`{name}` does not name a type"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// What a syntax node can resolve to.
#[derive(Debug, Clone)]
pub enum Resolved {
    Type(TypeRef),
    Scope(ScopeRef),
    Variable(VariableDecl),
}

impl Resolved {
    pub fn as_type(&self) -> Option<TypeRef> {
        match self {
            Resolved::Type(ty) => Some(ty.clone()),
            Resolved::Variable(decl) => Some(decl.ty.clone()),
            Resolved::Scope(_) => None,
        }
    }
}

pub struct Resolver<'a> {
    pub builtins: &'a BuiltinTable,
}

impl<'a> Resolver<'a> {
    pub fn new(builtins: &'a BuiltinTable) -> Self {
        Self { builtins }
    }

    /// Resolves `node` to a type, given an optional `want` hint (the
    /// expected type from the surrounding context — a declared type, a
    /// function return type, etc).
    pub fn resolve_type(
        &self,
        node: &Node,
        scopes: &mut ScopeStack,
        want: Option<&TypeRef>,
    ) -> Result<TypeRef, ResolveError> {
        match node {
            Node::Return { value, .. } => match value {
                Some(inner) => self.resolve_type(inner, scopes, want),
                None => Ok(self.builtins.get("void").unwrap()),
            },
            Node::Operator {
                op: OperatorKind::Dot,
                lhs: None,
                rhs: Some(rhs),
                ..
            } => {
                let this_decl = match Binding::clone_variable(&scopes.current(), "this") {
                    Some(decl) => decl,
                    None => return Err(ResolveError::ThisNotInScope),
                };
                self.resolve_member(&this_decl.ty, rhs, true)
            }
            Node::Operator {
                op: OperatorKind::Dot,
                lhs: Some(lhs),
                rhs: Some(rhs),
                ..
            } => {
                let owner_ty = self.resolve_type(lhs, scopes, None)?;
                let is_static = matches!(lhs.as_ref(), Node::Identifier(ident) if Binding::names_a_type(&scopes.current(), &ident.name));
                self.resolve_member(&owner_ty, rhs, !is_static)
            }
            Node::Operator {
                op: OperatorKind::Index,
                lhs: Some(lhs),
                ..
            } => {
                let owner_ty = self.resolve_type(lhs, scopes, None)?;
                owner_ty
                    .indexable
                    .as_ref()
                    .map(|sig| sig.ret.clone())
                    .ok_or_else(|| ResolveError::NotIndexable(owner_ty.name.clone()))
            }
            Node::Operator {
                op: OperatorKind::Call,
                lhs: Some(lhs),
                ..
            } => {
                let callee_ty = self.resolve_type(lhs, scopes, None)?;
                callee_ty
                    .callable
                    .as_ref()
                    .map(|sig| sig.ret.clone())
                    .ok_or_else(|| ResolveError::NotCallable(callee_ty.name.clone()))
            }
            Node::Operator {
                op,
                lhs: Some(lhs),
                rhs: Some(rhs),
                ..
            } if op.is_arithmetic() => {
                let lhs_lit = lhs.as_literal();
                let rhs_lit = rhs.as_literal();
                if let (Some(a), Some(b)) = (lhs_lit, rhs_lit) {
                    self.resolve_literal_operation(*op, a, b, want)
                } else {
                    let lhs_ty = self.resolve_type(lhs, scopes, want)?;
                    let rhs_ty = self.resolve_type(rhs, scopes, want)?;
                    Ok(wider_numeric_type(&lhs_ty, &rhs_ty))
                }
            }
            Node::Operator { op: OperatorKind::Assign, .. } => Ok(self.builtins.get("void").unwrap()),
            Node::Operator { op: OperatorKind::Eq, .. } | Node::Operator { op: OperatorKind::Lt, .. } => {
                Ok(self.builtins.get("bool").unwrap())
            }
            Node::Identifier(ident) => match Binding::lookup(&scopes.current(), &ident.name) {
                Some(Binding::Variable(decl)) => Ok(decl.ty),
                Some(Binding::Scope(_)) => Err(ResolveError::NotAType(ident.name.clone())),
                None => Err(ResolveError::Undefined(ident.name.clone())),
            },
            Node::Literal(lit) => self.resolve_literal(lit, want),
            other => panic!("resolve_type called on a non-expression node: {other:?}"),
        }
    }

    fn resolve_member(&self, owner_ty: &TypeRef, rhs: &Node, instance: bool) -> Result<TypeRef, ResolveError> {
        let ident = rhs
            .as_identifier()
            .unwrap_or_else(|| panic!("dot operator rhs must be an identifier"));
        let members = if instance {
            &owner_ty.instance_members
        } else {
            &owner_ty.static_members
        };
        members
            .get(&ident.name)
            .cloned()
            .ok_or_else(|| ResolveError::Undefined(format!("{}.{}", owner_ty.name, ident.name)))
    }

    /// Resolves `(owner_decl, member_decl)` for an assignment target:
    /// `a.b`, bare `.b`, or a bare identifier.
    pub fn resolve_owning_type(
        &self,
        node: &Node,
        scopes: &mut ScopeStack,
    ) -> Result<(VariableDecl, Option<String>), ResolveError> {
        match node {
            Node::Identifier(ident) => match Binding::lookup(&scopes.current(), &ident.name) {
                Some(Binding::Variable(decl)) => Ok((decl, None)),
                _ => Err(ResolveError::Undefined(ident.name.clone())),
            },
            Node::Operator {
                op: OperatorKind::Dot,
                lhs: None,
                rhs: Some(rhs),
                ..
            } => {
                let this_decl = Binding::clone_variable(&scopes.current(), "this").ok_or(ResolveError::ThisNotInScope)?;
                let member = rhs.as_identifier().expect("dot rhs must be an identifier").name.clone();
                Ok((this_decl, Some(member)))
            }
            Node::Operator {
                op: OperatorKind::Dot,
                lhs: Some(lhs),
                rhs: Some(rhs),
                ..
            } => {
                let (owner, _) = self.resolve_owning_type(lhs, scopes)?;
                let member = rhs.as_identifier().expect("dot rhs must be an identifier").name.clone();
                Ok((owner, Some(member)))
            }
            _ => Err(ResolveError::NoOwner),
        }
    }

    /// Resolves the type of an infix arithmetic operation whose operands
    /// are both literals, per §4.2: evaluated at resolve time, yielding the
    /// type a bare literal of the same shape would (suffix / decimal point
    /// / `want` hint / default size type), applied to the combined value.
    pub fn resolve_literal_operation(
        &self,
        op: OperatorKind,
        lhs: &Literal,
        rhs: &Literal,
        want: Option<&TypeRef>,
    ) -> Result<TypeRef, ResolveError> {
        let is_float = lhs.has_f_suffix() || rhs.has_f_suffix() || lhs.has_dot() || rhs.has_dot();
        if is_float {
            return Ok(self.builtins.get("f32").unwrap());
        }
        let a: i128 = lhs.text.parse().unwrap_or(0);
        let b: i128 = rhs.text.parse().unwrap_or(0);
        let value = match op {
            OperatorKind::Add => a + b,
            OperatorKind::Sub => a - b,
            OperatorKind::Mul => a * b,
            // Integer literal division truncates; see DESIGN.md's Open
            // Question #1.
            OperatorKind::Div => {
                if b == 0 {
                    0
                } else {
                    a / b
                }
            }
            _ => unreachable!("non-arithmetic operator passed to resolve_literal_operation"),
        };
        Ok(self.type_for_int_literal(value, want))
    }

    fn resolve_literal(&self, lit: &Literal, want: Option<&TypeRef>) -> Result<TypeRef, ResolveError> {
        match lit.kind {
            LiteralKind::String => Ok(self.builtins.string_type()),
            LiteralKind::Number => {
                if lit.has_f_suffix() {
                    return Ok(self.builtins.get("f32").unwrap());
                }
                if lit.has_dot() {
                    return Ok(self.builtins.get("f64").unwrap());
                }
                let value: i128 = lit.text.parse().unwrap_or(0);
                Ok(self.type_for_int_literal(value, want))
            }
        }
    }

    /// If `want` is an integer type the value fits, yields `want`;
    /// otherwise yields the native-word "size type" (`usize_t` for
    /// non-negative values, `size_t` for negative ones).
    fn type_for_int_literal(&self, value: i128, want: Option<&TypeRef>) -> TypeRef {
        if let Some(ty) = want {
            if let Some(kind) = ty.primitive_kind() {
                if kind.is_integral() && kind.could_hold_value(value) {
                    return ty.clone();
                }
            }
        }
        if value < 0 {
            self.builtins.get("size_t").unwrap()
        } else {
            self.builtins.get("usize_t").unwrap()
        }
    }
}

/// Widens two typed numeric operands to the larger operand's size, per
/// §4.2's "widens to the larger operand's size" rule. Callers are expected
/// to separately warn on signed/unsigned or size mismatch (see `checker`).
pub fn wider_numeric_type(a: &TypeRef, b: &TypeRef) -> TypeRef {
    match (a.primitive_kind(), b.primitive_kind()) {
        (Some(PrimitiveKind::Float { .. }), _) | (_, Some(PrimitiveKind::Float { .. })) => {
            if a.size >= b.size {
                a.clone()
            } else {
                b.clone()
            }
        }
        _ => {
            if a.size >= b.size {
                a.clone()
            } else {
                b.clone()
            }
        }
    }
}

/// Identity helper used by the special-operator left-hand side of an
/// `Identity` node.
pub fn special_operator_display(left: &IdentityLhs) -> String {
    left.display_name().to_string()
}

impl Binding {
    fn clone_variable(scope: &ScopeRef, name: &str) -> Option<VariableDecl> {
        match crate::scope::Scope::in_scope(scope, name) {
            Some(Binding::Variable(decl)) => Some(decl),
            _ => None,
        }
    }

    fn lookup(scope: &ScopeRef, name: &str) -> Option<Binding> {
        crate::scope::Scope::in_scope(scope, name)
    }

    fn names_a_type(scope: &ScopeRef, name: &str) -> bool {
        matches!(
            crate::scope::Scope::in_scope(scope, name),
            Some(Binding::Variable(decl)) if decl.ty.primitive_kind() == Some(PrimitiveKind::MetaType)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceLocation;
    use crate::types::seed_builtins;

    fn loc() -> SourceLocation {
        SourceLocation::synthetic()
    }

    #[test]
    fn string_literal_resolves_to_string_type() {
        let builtins = seed_builtins();
        let resolver = Resolver::new(&builtins);
        let lit = Literal::string("hello", loc());
        let ty = resolver.resolve_literal(&lit, None).unwrap();
        assert_eq!(ty, builtins.string_type());
    }

    #[test]
    fn f_suffixed_literal_is_always_f32() {
        let builtins = seed_builtins();
        let resolver = Resolver::new(&builtins);
        let lit = Literal::number("1.5f", loc());
        let ty = resolver.resolve_literal(&lit, None).unwrap();
        assert_eq!(ty, builtins.get("f32").unwrap());
    }

    #[test]
    fn bare_integer_literal_defaults_to_usize_t() {
        let builtins = seed_builtins();
        let resolver = Resolver::new(&builtins);
        let lit = Literal::number("500", loc());
        let ty = resolver.resolve_literal(&lit, None).unwrap();
        assert_eq!(ty, builtins.get("usize_t").unwrap());
    }

    #[test]
    fn literal_adopts_want_hint_when_it_fits() {
        let builtins = seed_builtins();
        let resolver = Resolver::new(&builtins);
        let i32_ty = builtins.get("i32").unwrap();
        let lit = Literal::number("3", loc());
        let ty = resolver.resolve_literal(&lit, Some(&i32_ty)).unwrap();
        assert_eq!(ty, i32_ty);
    }

    #[test]
    fn literal_addition_folds_under_the_want_hint() {
        let builtins = seed_builtins();
        let resolver = Resolver::new(&builtins);
        let i32_ty = builtins.get("i32").unwrap();
        let a = Literal::number("1", loc());
        let b = Literal::number("2", loc());
        let ty = resolver
            .resolve_literal_operation(OperatorKind::Add, &a, &b, Some(&i32_ty))
            .unwrap();
        assert_eq!(ty, i32_ty);
    }
}
