//! Generic type rebuilding: substituting bound types for a generic type's
//! free parameters, producing a new immutable type that records its
//! predecessor in `generic_inheritance`.
//!
//! Grounded on `_rebuild_generic_type` in the original compiler's
//! `composed_types/generic_types/__init__.py`: walk every field that can
//! mention a generic parameter (inherits, indexable, callable, instance and
//! static members, special operators), substitute identity-matched
//! parameters, and re-point any `this`-cycle at the freshly built type.

use super::{
    ComposedFacet, GenericBinding, GenericFacet, Signature, Type, TypeError, TypeFacet, TypeRef,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;

/// Rebuilds `base` (a generic composed type) with `bindings` substituted for
/// its free parameters. `bindings` maps parameter name to the concrete type
/// it should take; parameters not named in `bindings` stay free.
pub fn rebuild_generic(base: &TypeRef, bindings: &IndexMap<String, TypeRef>) -> Result<TypeRef, TypeError> {
    let base_composed = base
        .as_composed()
        .ok_or_else(|| TypeError::NotGeneric(base.name.clone()))?;
    let base_generic = base_composed
        .generic
        .as_ref()
        .ok_or_else(|| TypeError::NotGeneric(base.name.clone()))?;

    let mut subst: HashMap<u64, TypeRef> = HashMap::new();
    let mut new_params: IndexMap<String, GenericBinding> = IndexMap::new();
    for (name, binding) in &base_generic.params {
        match (binding, bindings.get(name)) {
            (GenericBinding::Free(id), Some(target)) => {
                subst.insert(*id, target.clone());
                new_params.insert(name.clone(), GenericBinding::Bound(target.clone()));
            }
            (other, None) => {
                new_params.insert(name.clone(), other.clone());
            }
            (GenericBinding::Bound(_), Some(_)) => {
                return Err(TypeError::UnknownGenericParam(name.clone()));
            }
        }
    }
    for name in bindings.keys() {
        if !base_generic.params.contains_key(name) {
            return Err(TypeError::UnknownGenericParam(name.clone()));
        }
    }

    // Two-phase construction: allocate the new `this` placeholder first so
    // self-referencing fields can point at it before the composed type
    // exists, then resolve it once the type is built.
    let self_placeholder = Type::new_this();

    let new_inherits: Vec<TypeRef> = base
        .inherits
        .iter()
        .map(|t| substitute(t, base, &subst, &self_placeholder))
        .collect();
    let new_callable = base
        .callable
        .as_ref()
        .map(|sig| substitute_signature(sig, base, &subst, &self_placeholder));
    let new_indexable = base
        .indexable
        .as_ref()
        .map(|sig| substitute_signature(sig, base, &subst, &self_placeholder));
    let new_instance_members: IndexMap<String, TypeRef> = base
        .instance_members
        .iter()
        .map(|(name, ty)| (name.clone(), substitute(ty, base, &subst, &self_placeholder)))
        .collect();
    let new_static_members: IndexMap<String, TypeRef> = base
        .static_members
        .iter()
        .map(|(name, ty)| (name.clone(), substitute(ty, base, &subst, &self_placeholder)))
        .collect();
    let new_special_operators = base_composed
        .special_operators
        .iter()
        .map(|(op, sig)| (*op, substitute_signature(sig, base, &subst, &self_placeholder)))
        .collect();

    let mut generic_inheritance = vec![base.clone()];
    generic_inheritance.extend(base_generic.generic_inheritance.iter().cloned());

    let rebuilt = Rc::new(Type {
        name: base.name.clone(),
        size: base.size,
        is_reference: base.is_reference,
        callable: new_callable,
        indexable: new_indexable,
        instance_members: new_instance_members,
        static_members: new_static_members,
        readonly_members: base.readonly_members.clone(),
        inherits: new_inherits,
        is_const: base.is_const,
        facet: TypeFacet::Composed(ComposedFacet {
            special_operators: new_special_operators,
            generic: Some(GenericFacet {
                params: new_params,
                generic_inheritance,
            }),
            interface: base_composed.interface.clone(),
        }),
    });

    if let TypeFacet::This(cell) = &self_placeholder.facet {
        cell.resolve(rebuilt.clone())
            .expect("freshly allocated this-placeholder cannot already be resolved");
    }

    Ok(rebuilt)
}

fn substitute_signature(
    sig: &Signature,
    base: &TypeRef,
    subst: &HashMap<u64, TypeRef>,
    self_placeholder: &TypeRef,
) -> Signature {
    Signature {
        params: sig
            .params
            .iter()
            .map(|p| substitute(p, base, subst, self_placeholder))
            .collect(),
        ret: substitute(&sig.ret, base, subst, self_placeholder),
    }
}

/// Substitutes one type reference: a matching free parameter becomes its
/// bound type; a `this` pointing back at `base` (or still unresolved, which
/// in a type under construction means "self") is redirected at the new
/// placeholder; a nested generic type that mentions one of `base`'s own
/// parameters is rebuilt recursively; anything else is shared unchanged.
fn substitute(
    ty: &TypeRef,
    base: &TypeRef,
    subst: &HashMap<u64, TypeRef>,
    self_placeholder: &TypeRef,
) -> TypeRef {
    match &ty.facet {
        TypeFacet::GenericParam(id) => subst.get(id).cloned().unwrap_or_else(|| ty.clone()),
        TypeFacet::This(cell) => match cell.resolved() {
            Some(resolved) if Rc::ptr_eq(&resolved, base) => self_placeholder.clone(),
            Some(_) => ty.clone(),
            None => self_placeholder.clone(),
        },
        TypeFacet::Composed(composed) => {
            if Rc::ptr_eq(ty, base) {
                return self_placeholder.clone();
            }
            let Some(nested_generic) = &composed.generic else {
                return ty.clone();
            };
            let nested_bindings: IndexMap<String, TypeRef> = nested_generic
                .params
                .iter()
                .filter_map(|(name, binding)| match binding {
                    GenericBinding::Free(id) => {
                        subst.get(id).cloned().map(|target| (name.clone(), target))
                    }
                    GenericBinding::Bound(_) => None,
                })
                .collect();
            if nested_bindings.is_empty() {
                ty.clone()
            } else {
                rebuild_generic(ty, &nested_bindings).unwrap_or_else(|_| ty.clone())
            }
        }
        _ => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{seed_builtins, PrimitiveKind};

    #[test]
    fn rebuilding_array_binds_the_element_type() {
        let table = seed_builtins();
        let array_ty = table.get("Array").unwrap();
        let i32_ty = table.get("i32").unwrap();
        let bound = rebuild_generic(&array_ty, &IndexMap::from([("T".to_string(), i32_ty.clone())]))
            .unwrap();
        assert_eq!(bound.indexable.as_ref().unwrap().ret, i32_ty);
        let generic = bound.generic().unwrap();
        assert_eq!(generic.generic_inheritance.len(), 1);
        assert!(Rc::ptr_eq(&generic.generic_inheritance[0], &array_ty));
    }

    #[test]
    fn rebuilding_twice_chains_generic_inheritance() {
        let table = seed_builtins();
        let array_ty = table.get("Array").unwrap();
        let i32_ty = table.get("i32").unwrap();
        let u8_ty = Type::primitive("u8", PrimitiveKind::Int { bits: 8, signed: false });
        let once = rebuild_generic(&array_ty, &IndexMap::from([("T".to_string(), i32_ty)])).unwrap();
        // Rebinding an already-bound parameter is rejected: every binding in
        // `once`'s generic facet is now `Bound`, not `Free`.
        assert!(rebuild_generic(&once, &IndexMap::from([("T".to_string(), u8_ty)])).is_err());
    }

    #[test]
    fn unrelated_fields_are_shared_not_cloned() {
        let table = seed_builtins();
        let array_ty = table.get("Array").unwrap();
        let i32_ty = table.get("i32").unwrap();
        let bound =
            rebuild_generic(&array_ty, &IndexMap::from([("T".to_string(), i32_ty)])).unwrap();
        assert_eq!(bound.readonly_members, array_ty.readonly_members);
    }
}
