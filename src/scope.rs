//! The scope graph: hierarchical named scopes with parent-chain lookup.
//!
//! Grounded on `AnalyzerScope` in the original compiler's
//! `compiler/analyzer/scope.py`: `enter` reuses an existing child scope or
//! fails on a non-scope name collision, `new` always allocates a fresh
//! uniquely-named child, and `in_scope` walks the parent chain looking for
//! a binding.

use crate::span::SourceLocation;
use crate::types::TypeRef;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub ty: TypeRef,
    pub location: SourceLocation,
    pub is_const: bool,
    pub member_decls: HashMap<String, VariableDecl>,
}

impl VariableDecl {
    pub fn new(ty: TypeRef, location: SourceLocation, is_const: bool) -> Self {
        Self {
            ty,
            location,
            is_const,
            member_decls: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Binding {
    Variable(VariableDecl),
    Scope(ScopeRef),
}

pub type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug)]
pub struct Scope {
    pub name: Option<String>,
    pub bindings: HashMap<String, Binding>,
    pub parent: Option<ScopeRef>,
    pub location: SourceLocation,
    /// `Some` only for a function scope.
    pub return_type: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    NameIsNotAScope(String),
    ScopeAlreadyExists(String),
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::NameIsNotAScope(name) => {
                write!(f, "`{name}` is already declared and is not a scope")
            }
            ScopeError::ScopeAlreadyExists(name) => {
                write!(f, "a scope named `{name}` already exists in this scope")
            }
        }
    }
}

impl std::error::Error for ScopeError {}

impl Scope {
    pub fn root(location: SourceLocation) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            name: None,
            bindings: HashMap::new(),
            parent: None,
            location,
            return_type: None,
        }))
    }

    /// Pushes a subscope named `name`, reusing an existing one if present.
    /// Fails if `name` already resolves to a non-scope binding in this
    /// scope.
    pub fn enter(this: &ScopeRef, name: &str, location: SourceLocation) -> Result<ScopeRef, ScopeError> {
        let existing = this.borrow().bindings.get(name).cloned();
        match existing {
            Some(Binding::Scope(child)) => Ok(child),
            Some(Binding::Variable(_)) => Err(ScopeError::NameIsNotAScope(name.to_string())),
            None => {
                let child = Rc::new(RefCell::new(Scope {
                    name: Some(name.to_string()),
                    bindings: HashMap::new(),
                    parent: Some(this.clone()),
                    location,
                    return_type: None,
                }));
                this.borrow_mut()
                    .bindings
                    .insert(name.to_string(), Binding::Scope(child.clone()));
                Ok(child)
            }
        }
    }

    /// Creates a fresh uniquely-named subscope; fails if `name` is already a
    /// subscope (or any other binding) here.
    pub fn new_child(
        this: &ScopeRef,
        name: &str,
        location: SourceLocation,
        vars: Vec<(String, VariableDecl)>,
        return_type: Option<TypeRef>,
    ) -> Result<ScopeRef, ScopeError> {
        if this.borrow().bindings.contains_key(name) {
            return Err(ScopeError::ScopeAlreadyExists(name.to_string()));
        }
        let mut bindings = HashMap::new();
        for (var_name, decl) in vars {
            bindings.insert(var_name, Binding::Variable(decl));
        }
        let child = Rc::new(RefCell::new(Scope {
            name: Some(name.to_string()),
            bindings,
            parent: Some(this.clone()),
            location,
            return_type,
        }));
        this.borrow_mut()
            .bindings
            .insert(name.to_string(), Binding::Scope(child.clone()));
        Ok(child)
    }

    /// Walks from `this` up to the root, returning the first binding found
    /// for `ident`.
    pub fn in_scope(this: &ScopeRef, ident: &str) -> Option<Binding> {
        let mut current = Some(this.clone());
        while let Some(scope) = current {
            let found = scope.borrow().bindings.get(ident).cloned();
            if found.is_some() {
                return found;
            }
            current = scope.borrow().parent.clone();
        }
        None
    }

    /// Declares `name` directly in `this` scope (not the scope graph's
    /// `enter`/`new` operations — used by the checker once it has decided a
    /// declaration is not a redefinition).
    pub fn declare(this: &ScopeRef, name: &str, decl: VariableDecl) {
        this.borrow_mut()
            .bindings
            .insert(name.to_string(), Binding::Variable(decl));
    }

    /// The fully qualified dotted name of `this` scope from the root.
    pub fn fqdn(this: &ScopeRef) -> String {
        let mut parts = Vec::new();
        let mut current = Some(this.clone());
        while let Some(scope) = current {
            if let Some(name) = &scope.borrow().name {
                parts.push(name.clone());
            }
            current = scope.borrow().parent.clone();
        }
        parts.reverse();
        parts.join(".")
    }

    pub fn nearest_return_type(this: &ScopeRef) -> Option<TypeRef> {
        let mut current = Some(this.clone());
        while let Some(scope) = current {
            if let Some(ty) = scope.borrow().return_type.clone() {
                return Some(ty);
            }
            current = scope.borrow().parent.clone();
        }
        None
    }
}

/// LIFO-balanced stack of "current scope" used uniformly by the resolver,
/// checker, and emitter. Entering and leaving must balance even when a pass
/// bails out partway through a node; callers should prefer
/// [`ScopeStack::with_scope`] to get that for free.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<ScopeRef>,
}

impl ScopeStack {
    pub fn new(root: ScopeRef) -> Self {
        Self { frames: vec![root] }
    }

    pub fn current(&self) -> ScopeRef {
        self.frames
            .last()
            .cloned()
            .expect("scope stack must never be empty")
    }

    pub fn push(&mut self, scope: ScopeRef) {
        self.frames.push(scope);
    }

    pub fn pop(&mut self) -> ScopeRef {
        if self.frames.len() == 1 {
            panic!("cannot pop the root scope");
        }
        self.frames.pop().expect("checked non-empty above")
    }

    /// Runs `f` with `scope` pushed as current, unwinding even if `f`
    /// returns an error.
    pub fn with_scope<T, E>(&mut self, scope: ScopeRef, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        self.push(scope);
        let result = f(self);
        self.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc as StdRc;

    fn loc() -> SourceLocation {
        SourceLocation::synthetic()
    }

    #[test]
    fn enter_reuses_existing_scope() {
        let root = Scope::root(loc());
        let a = Scope::enter(&root, "a", loc()).unwrap();
        let a_again = Scope::enter(&root, "a", loc()).unwrap();
        assert!(StdRc::ptr_eq(&a, &a_again));
    }

    #[test]
    fn enter_fails_on_non_scope_collision() {
        let root = Scope::root(loc());
        let ty = crate::types::Type::primitive("i32", crate::types::PrimitiveKind::Int { bits: 32, signed: true });
        Scope::declare(&root, "x", VariableDecl::new(ty, loc(), false));
        assert!(Scope::enter(&root, "x", loc()).is_err());
    }

    #[test]
    fn new_child_fails_if_name_taken() {
        let root = Scope::root(loc());
        Scope::new_child(&root, "a", loc(), Vec::new(), None).unwrap();
        assert!(Scope::new_child(&root, "a", loc(), Vec::new(), None).is_err());
    }

    #[test]
    fn in_scope_walks_parent_chain() {
        let root = Scope::root(loc());
        let ty = crate::types::Type::primitive("i32", crate::types::PrimitiveKind::Int { bits: 32, signed: true });
        Scope::declare(&root, "x", VariableDecl::new(ty, loc(), false));
        let child = Scope::enter(&root, "child", loc()).unwrap();
        assert!(Scope::in_scope(&child, "x").is_some());
        assert!(Scope::in_scope(&child, "does-not-exist").is_none());
    }

    #[test]
    fn fqdn_joins_scope_names_from_root() {
        let root = Scope::root(loc());
        let a = Scope::enter(&root, "a", loc()).unwrap();
        let b = Scope::enter(&a, "b", loc()).unwrap();
        assert_eq!(Scope::fqdn(&b), "a.b");
    }

    #[test]
    fn scope_stack_unwinds_on_error() {
        let root = Scope::root(loc());
        let child = Scope::enter(&root, "child", loc()).unwrap();
        let mut stack = ScopeStack::new(root.clone());
        let result: Result<(), ()> = stack.with_scope(child, |_| Err(()));
        assert!(result.is_err());
        assert!(StdRc::ptr_eq(&stack.current(), &root));
    }
}
