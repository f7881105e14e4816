//! The conversion check: whether a value of one type may convert to
//! another, and what (if anything) to warn about along the way.
//!
//! Grounded on `_check_conversion` in the original compiler's
//! `compiler/analyzer/checks/_check_conversion.py`, including its exact
//! diagnostic wording (see `SPEC_FULL.md` §4.3).

use crate::types::{PrimitiveKind, TypeRef};
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Ok,
    Warn(String),
    Err(String),
}

/// Checks whether `from` may convert to `to`, per §4.3's rule table.
pub fn check_conversion(from: &TypeRef, to: &TypeRef) -> ConversionOutcome {
    if from == to {
        return ConversionOutcome::Ok;
    }
    if from.is_void() || to.is_void() {
        return ConversionOutcome::Err("There are no conversions to or from void.".to_string());
    }

    match (from.primitive_kind(), to.primitive_kind()) {
        (Some(PrimitiveKind::Int { bits: fb, signed: fs }), Some(PrimitiveKind::Int { bits: tb, signed: ts })) => {
            if fits_without_narrowing(fb, fs, tb, ts) {
                return ConversionOutcome::Ok;
            }
            return ConversionOutcome::Warn(format!(
                "Narrowing when implicitly converting from a `{}` ({}bit {}) to a `{}` ({}bit {}).",
                from.name,
                fb,
                signed_word(fs),
                to.name,
                tb,
                signed_word(ts),
            ));
        }
        (Some(PrimitiveKind::Float { bits: fb, .. }), Some(PrimitiveKind::Int { .. })) => {
            let _ = fb;
            return ConversionOutcome::Warn(format!(
                "Precision loss when implicitly converting from a `{}` to a `{}`.",
                from.name, to.name
            ));
        }
        (Some(PrimitiveKind::Int { .. }), Some(PrimitiveKind::Float { .. })) => {
            return ConversionOutcome::Ok;
        }
        (Some(PrimitiveKind::Float { exp_bits: fe, .. }), Some(PrimitiveKind::Float { exp_bits: te, .. })) => {
            if te >= fe {
                return ConversionOutcome::Ok;
            }
            return ConversionOutcome::Warn(format!(
                "Precision loss when narrowing exponent from a `{}` to a `{}`.",
                from.name, to.name
            ));
        }
        _ => {}
    }

    if let (Some(from_sig), Some(to_sig)) = (&from.callable, &to.callable) {
        if from_sig.params.len() != to_sig.params.len() {
            return ConversionOutcome::Err(format!(
                "Could not find a conversion between `{}` and `{}`.",
                from.name, to.name
            ));
        }
        for (fp, tp) in from_sig.params.iter().zip(&to_sig.params) {
            if !matches!(check_conversion(tp, fp), ConversionOutcome::Ok) {
                return ConversionOutcome::Err(format!(
                    "Could not find a conversion between `{}` and `{}`.",
                    from.name, to.name
                ));
            }
        }
        return check_conversion(&from_sig.ret, &to_sig.ret);
    }

    if let Some(interface) = to.as_composed().and_then(|c| c.interface.as_ref()) {
        return match check_interface_conformance(from, to, interface) {
            Ok(()) => ConversionOutcome::Ok,
            Err(missing) => ConversionOutcome::Err(format!(
                "`{}` does not satisfy interface `{}`: missing {}.",
                from.name,
                to.name,
                missing.join(", ")
            )),
        };
    }

    if let (Some(from_generic), Some(to_generic)) = (from.generic(), to.generic()) {
        let shares_ancestry = from_generic
            .generic_inheritance
            .iter()
            .chain(std::iter::once(from))
            .any(|candidate| to_generic.generic_inheritance.iter().any(|other| Rc::ptr_eq(candidate, other)) || Rc::ptr_eq(candidate, to));
        if shares_ancestry {
            for (name, to_binding) in &to_generic.params {
                if let (crate::types::GenericBinding::Bound(to_ty), Some(crate::types::GenericBinding::Bound(from_ty))) =
                    (to_binding, from_generic.params.get(name))
                {
                    if !matches!(check_conversion(from_ty, to_ty), ConversionOutcome::Ok) {
                        return ConversionOutcome::Err(format!(
                            "Could not find a conversion between `{}` and `{}`.",
                            from.name, to.name
                        ));
                    }
                }
            }
            return ConversionOutcome::Ok;
        }
    }

    if has_common_ancestor(from, to) {
        return ConversionOutcome::Ok;
    }

    ConversionOutcome::Err(format!(
        "Could not find a conversion between `{}` and `{}`.",
        from.name, to.name
    ))
}

fn signed_word(signed: bool) -> &'static str {
    if signed {
        "signed"
    } else {
        "unsigned"
    }
}

fn fits_without_narrowing(from_bits: u8, from_signed: bool, to_bits: u8, to_signed: bool) -> bool {
    if from_signed == to_signed {
        to_bits >= from_bits
    } else if to_signed {
        // unsigned -> signed always needs one more bit of headroom
        to_bits > from_bits
    } else {
        // signed -> unsigned never safe in general (negative values)
        false
    }
}

/// Every interface member must be present on the candidate (or one of its
/// inherited types) with an identical type, unless the interface provides a
/// default implementation. Returns the missing/mismatched member names.
pub fn check_interface_conformance(
    candidate: &TypeRef,
    interface: &TypeRef,
    interface_facet: &crate::types::InterfaceFacet,
) -> Result<(), Vec<String>> {
    let mut missing = Vec::new();
    for (name, member_ty) in &interface.instance_members {
        if interface_facet.default_members.contains(name) {
            continue;
        }
        match find_inherited_member(candidate, name) {
            Some(candidate_ty) if &candidate_ty == member_ty => {}
            _ => missing.push(name.clone()),
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}

fn find_inherited_member(ty: &TypeRef, name: &str) -> Option<TypeRef> {
    if let Some(found) = ty.instance_members.get(name) {
        return Some(found.clone());
    }
    for base in &ty.inherits {
        if let Some(found) = find_inherited_member(base, name) {
            return Some(found);
        }
    }
    None
}

/// Transitive-inherits closure search for a common ancestor between `from`
/// and `to`.
fn has_common_ancestor(from: &TypeRef, to: &TypeRef) -> bool {
    let from_ancestors = expand_inherits(from);
    let to_ancestors = expand_inherits(to);
    from_ancestors.iter().any(|a| to_ancestors.iter().any(|b| a == b))
}

fn expand_inherits(ty: &TypeRef) -> Vec<TypeRef> {
    let mut seen = HashSet::new();
    let mut stack = vec![ty.clone()];
    let mut result = Vec::new();
    while let Some(current) = stack.pop() {
        let ptr = Rc::as_ptr(&current) as usize;
        if !seen.insert(ptr) {
            continue;
        }
        for base in &current.inherits {
            stack.push(base.clone());
        }
        result.push(current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::seed_builtins;

    #[test]
    fn identical_types_convert_cleanly() {
        let builtins = seed_builtins();
        let i32_ty = builtins.get("i32").unwrap();
        assert_eq!(check_conversion(&i32_ty, &i32_ty), ConversionOutcome::Ok);
    }

    #[test]
    fn void_conversion_is_always_an_error() {
        let builtins = seed_builtins();
        let void_ty = builtins.get("void").unwrap();
        let i32_ty = builtins.get("i32").unwrap();
        assert_eq!(
            check_conversion(&void_ty, &i32_ty),
            ConversionOutcome::Err("There are no conversions to or from void.".to_string())
        );
    }

    #[test]
    fn narrowing_usize_t_to_u8_warns_with_exact_wording() {
        let builtins = seed_builtins();
        let from = builtins.get("usize_t").unwrap();
        let to = builtins.get("u8").unwrap();
        assert_eq!(
            check_conversion(&from, &to),
            ConversionOutcome::Warn(
                "Narrowing when implicitly converting from a `usize_t` (64bit unsigned) to a `u8` (8bit unsigned).".to_string()
            )
        );
    }

    #[test]
    fn widening_int_to_int_is_ok() {
        let builtins = seed_builtins();
        let from = builtins.get("u8").unwrap();
        let to = builtins.get("u16").unwrap();
        assert_eq!(check_conversion(&from, &to), ConversionOutcome::Ok);
    }

    #[test]
    fn unrelated_types_have_no_conversion() {
        let builtins = seed_builtins();
        let from = builtins.get("bool").unwrap();
        let to = builtins.get("i32").unwrap();
        assert!(matches!(check_conversion(&from, &to), ConversionOutcome::Err(_)));
    }
}
