//! The type graph: primitives, composed types, generics, interfaces, and the
//! `this`/`StaticType` cycle-breaking facets.
//!
//! Types are immutable once built and shared via [`TypeRef`] (`Rc<Type>`).
//! The one controlled exception is [`ThisCell`]: a placeholder allocated
//! before its owning composed type exists, resolved exactly once after the
//! composed type is finalized.

mod builtins;
mod generic;

pub use builtins::{builtin_names, seed_builtins, BuiltinTable};
pub use generic::rebuild_generic;

use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type TypeRef = Rc<Type>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialOperatorKind {
    Constructor,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// The meta-type of type declarations themselves (`type`).
    MetaType,
    Void,
    Bool,
    Int { bits: u8, signed: bool },
    Float { bits: u8, exp_bits: u8 },
}

impl PrimitiveKind {
    pub fn size_bytes(self) -> Option<u32> {
        match self {
            PrimitiveKind::MetaType | PrimitiveKind::Void => None,
            PrimitiveKind::Bool => Some(1),
            PrimitiveKind::Int { bits, .. } => Some(bits as u32 / 8),
            PrimitiveKind::Float { bits, .. } => Some(bits as u32 / 8),
        }
    }

    pub fn is_integral(self) -> bool {
        matches!(self, PrimitiveKind::Int { .. })
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveKind::Float { .. })
    }

    /// Whether `value` (interpreted as a signed 128-bit integer) fits this
    /// integer type's range. Panics if called on a non-integer kind.
    pub fn could_hold_value(self, value: i128) -> bool {
        let PrimitiveKind::Int { bits, signed } = self else {
            panic!("could_hold_value called on a non-integer primitive");
        };
        if signed {
            let min = -(1i128 << (bits as u32 - 1));
            let max = (1i128 << (bits as u32 - 1)) - 1;
            value >= min && value <= max
        } else {
            let max = if bits == 128 { i128::MAX } else { (1i128 << bits as u32) - 1 };
            value >= 0 && value <= max
        }
    }
}

/// `(param types, return type)` — shared shape for callable and indexable
/// signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
}

/// The resolve-once placeholder for "the type currently being defined".
/// Equality between any two `This` facets is always `true` regardless of
/// resolution state or identity — callers that need to compare the
/// *resolved* type must deref through [`Type::this_resolved`] first.
#[derive(Debug)]
pub struct ThisCell(RefCell<Option<TypeRef>>);

impl ThisCell {
    pub fn unresolved() -> Self {
        Self(RefCell::new(None))
    }

    pub fn resolve(&self, target: TypeRef) -> Result<(), TypeError> {
        let mut slot = self.0.borrow_mut();
        if slot.is_some() {
            return Err(TypeError::ThisAlreadyResolved);
        }
        *slot = Some(target);
        Ok(())
    }

    pub fn resolved(&self) -> Option<TypeRef> {
        self.0.borrow().clone()
    }
}

static NEXT_GENERIC_PARAM_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh identity for a `GenericParam`. Two `GenericParam`
/// facets are equal only when they carry the same id.
pub fn next_generic_param_id() -> u64 {
    NEXT_GENERIC_PARAM_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenericBinding {
    Free(u64),
    Bound(TypeRef),
}

#[derive(Debug, Clone)]
pub struct GenericFacet {
    pub params: IndexMap<String, GenericBinding>,
    /// Predecessors this type was rebuilt from, most recent first.
    pub generic_inheritance: Vec<TypeRef>,
}

#[derive(Debug, Clone)]
pub struct InterfaceFacet {
    /// Member names that carry a default implementation and therefore don't
    /// need to be present on a conforming candidate.
    pub default_members: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct ComposedFacet {
    pub special_operators: IndexMap<SpecialOperatorKind, Signature>,
    pub generic: Option<GenericFacet>,
    pub interface: Option<InterfaceFacet>,
}

impl ComposedFacet {
    pub fn plain() -> Self {
        Self {
            special_operators: IndexMap::new(),
            generic: None,
            interface: None,
        }
    }
}

#[derive(Debug)]
pub enum TypeFacet {
    Primitive(PrimitiveKind),
    This(ThisCell),
    GenericParam(u64),
    Composed(ComposedFacet),
    /// Wraps an instance type, exposing its static facet (constructor as
    /// callable, static members, a distinct static `this`).
    Static(TypeRef),
}

/// A type in the program's type graph. See the module docs for the
/// equality rules; `is_const` is deliberately excluded from equality.
#[derive(Debug)]
pub struct Type {
    pub name: String,
    pub size: Option<u32>,
    pub is_reference: bool,
    pub callable: Option<Signature>,
    pub indexable: Option<Signature>,
    pub instance_members: IndexMap<String, TypeRef>,
    pub static_members: IndexMap<String, TypeRef>,
    pub readonly_members: HashSet<String>,
    pub inherits: Vec<TypeRef>,
    pub is_const: bool,
    pub facet: TypeFacet,
}

impl Type {
    pub fn primitive(name: impl Into<String>, kind: PrimitiveKind) -> TypeRef {
        Rc::new(Type {
            name: name.into(),
            size: kind.size_bytes(),
            is_reference: false,
            callable: None,
            indexable: None,
            instance_members: IndexMap::new(),
            static_members: IndexMap::new(),
            readonly_members: HashSet::new(),
            inherits: Vec::new(),
            is_const: false,
            facet: TypeFacet::Primitive(kind),
        })
    }

    pub fn new_this() -> TypeRef {
        Rc::new(Type {
            name: "this".to_string(),
            size: None,
            is_reference: true,
            callable: None,
            indexable: None,
            instance_members: IndexMap::new(),
            static_members: IndexMap::new(),
            readonly_members: HashSet::new(),
            inherits: Vec::new(),
            is_const: false,
            facet: TypeFacet::This(ThisCell::unresolved()),
        })
    }

    pub fn new_generic_param(name: impl Into<String>) -> TypeRef {
        Rc::new(Type {
            name: name.into(),
            size: None,
            is_reference: false,
            callable: None,
            indexable: None,
            instance_members: IndexMap::new(),
            static_members: IndexMap::new(),
            readonly_members: HashSet::new(),
            inherits: Vec::new(),
            is_const: false,
            facet: TypeFacet::GenericParam(next_generic_param_id()),
        })
    }

    pub fn is_void(&self) -> bool {
        matches!(self.facet, TypeFacet::Primitive(PrimitiveKind::Void))
    }

    pub fn is_this(&self) -> bool {
        matches!(self.facet, TypeFacet::This(_))
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self.facet {
            TypeFacet::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn as_composed(&self) -> Option<&ComposedFacet> {
        match &self.facet {
            TypeFacet::Composed(c) => Some(c),
            _ => None,
        }
    }

    pub fn generic(&self) -> Option<&GenericFacet> {
        self.as_composed().and_then(|c| c.generic.as_ref())
    }

    /// Follows a `This` facet to its resolved target, if any; returns the
    /// type itself for every other facet.
    pub fn this_resolved(self: &TypeRef) -> Option<TypeRef> {
        match &self.facet {
            TypeFacet::This(cell) => cell.resolved(),
            _ => Some(self.clone()),
        }
    }

    fn facet_eq(&self, other: &Type) -> bool {
        match (&self.facet, &other.facet) {
            (TypeFacet::Primitive(a), TypeFacet::Primitive(b)) => a == b,
            (TypeFacet::Static(a), TypeFacet::Static(b)) => a == b,
            (TypeFacet::Composed(a), TypeFacet::Composed(b)) => {
                a.special_operators == b.special_operators
                    && match (&a.generic, &b.generic) {
                        (Some(ga), Some(gb)) => ga.params == gb.params,
                        (None, None) => true,
                        _ => false,
                    }
                    && match (&a.interface, &b.interface) {
                        (Some(ia), Some(ib)) => ia.default_members == ib.default_members,
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

impl PartialEq for Type {
    /// Structural equality for primitive/integral/float types; nominal
    /// (by underlying composition, excluding `name` and `is_const`)
    /// equality for composed/generic types. Any two `This` facets compare
    /// equal regardless of resolution state. `GenericParam` facets compare
    /// equal only when they share the same identity.
    fn eq(&self, other: &Self) -> bool {
        match (&self.facet, &other.facet) {
            (TypeFacet::This(_), TypeFacet::This(_)) => return true,
            (TypeFacet::This(_), _) | (_, TypeFacet::This(_)) => return false,
            (TypeFacet::GenericParam(a), TypeFacet::GenericParam(b)) => return a == b,
            (TypeFacet::GenericParam(_), _) | (_, TypeFacet::GenericParam(_)) => return false,
            _ => {}
        }
        self.size == other.size
            && self.is_reference == other.is_reference
            && self.callable == other.callable
            && self.indexable == other.indexable
            && self.instance_members == other.instance_members
            && self.static_members == other.static_members
            && self.readonly_members == other.readonly_members
            && self.inherits == other.inherits
            && self.facet_eq(other)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    ThisAlreadyResolved,
    NotGeneric(String),
    UnknownGenericParam(String),
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::ThisAlreadyResolved => write!(f, "this-type was resolved more than once"),
            TypeError::NotGeneric(name) => write!(f, "type `{name}` is not generic"),
            TypeError::UnknownGenericParam(name) => {
                write!(f, "unknown generic parameter `{name}`")
            }
        }
    }
}

impl std::error::Error for TypeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_structurally_ignoring_name() {
        let a = Type::primitive("i32", PrimitiveKind::Int { bits: 32, signed: true });
        let b = Type::primitive("MyI32Alias", PrimitiveKind::Int { bits: 32, signed: true });
        assert_eq!(a, b);
    }

    #[test]
    fn generic_params_compare_by_identity_only() {
        let a = Type::new_generic_param("T");
        let b = Type::new_generic_param("T");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn this_cells_always_compare_equal() {
        let a = Type::new_this();
        let b = Type::new_this();
        assert_eq!(a, b);
    }

    #[test]
    fn this_cell_resolves_exactly_once() {
        let this = Type::new_this();
        let TypeFacet::This(cell) = &this.facet else {
            unreachable!()
        };
        let target = Type::primitive("void", PrimitiveKind::Void);
        assert!(cell.resolve(target.clone()).is_ok());
        assert!(cell.resolve(target).is_err());
    }

    #[test]
    fn const_flag_is_excluded_from_equality() {
        let mut a = Type::primitive("i32", PrimitiveKind::Int { bits: 32, signed: true });
        Rc::get_mut(&mut a).unwrap().is_const = true;
        let b = Type::primitive("i32", PrimitiveKind::Int { bits: 32, signed: true });
        assert_eq!(a, b);
    }
}
