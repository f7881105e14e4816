//! The fixed set of names the analyzer must seed as real types before any
//! user source is loaded (`parsing builtins` mode).

use super::{GenericBinding, GenericFacet, PrimitiveKind, Signature, Type, TypeRef};
use indexmap::IndexMap;
use std::collections::HashSet;

pub const BUILTIN_NAMES: &[&str] = &[
    "type", "void", "size_t", "usize_t", "i8", "u8", "i16", "u16", "i32", "u32", "i64", "u64",
    "f16", "f32", "f64", "bool", "Array",
];

pub fn builtin_names() -> &'static [&'static str] {
    BUILTIN_NAMES
}

/// The preconstructed builtin type table. Declarations of these names in
/// the builtins source file bind to these instances rather than creating
/// new ones.
pub struct BuiltinTable {
    pub by_name: IndexMap<String, TypeRef>,
    pub array_param: TypeRef,
}

impl BuiltinTable {
    pub fn get(&self, name: &str) -> Option<TypeRef> {
        self.by_name.get(name).cloned()
    }

    pub fn string_type(&self) -> TypeRef {
        self.by_name
            .get("string")
            .cloned()
            .expect("string alias seeded alongside Array")
    }
}

/// Builds the builtin type table: `type` (the meta-type), `void`, every
/// integral and float width, `bool`, and `Array<T>` — the one generic type
/// in the core, indexable by `usize_t` with a read-only `length` member.
/// `String` is seeded as `Array<u8>`.
pub fn seed_builtins() -> BuiltinTable {
    let mut by_name = IndexMap::new();

    by_name.insert("type".into(), Type::primitive("type", PrimitiveKind::MetaType));
    by_name.insert("void".into(), Type::primitive("void", PrimitiveKind::Void));
    by_name.insert("bool".into(), Type::primitive("bool", PrimitiveKind::Bool));

    for (name, bits, signed) in [
        ("i8", 8u8, true),
        ("u8", 8, false),
        ("i16", 16, true),
        ("u16", 16, false),
        ("i32", 32, true),
        ("u32", 32, false),
        ("i64", 64, true),
        ("u64", 64, false),
        ("size_t", 64, true),
        ("usize_t", 64, false),
    ] {
        by_name.insert(
            name.into(),
            Type::primitive(name, PrimitiveKind::Int { bits, signed }),
        );
    }

    for (name, bits, exp_bits) in [("f16", 16u8, 5u8), ("f32", 32, 8), ("f64", 64, 11)] {
        by_name.insert(
            name.into(),
            Type::primitive(name, PrimitiveKind::Float { bits, exp_bits }),
        );
    }

    let usize_t = by_name.get("usize_t").cloned().unwrap();
    let u8_t = by_name.get("u8").cloned().unwrap();

    let array_param = Type::new_generic_param("T");
    let length_member = usize_t.clone();

    let mut instance_members = IndexMap::new();
    instance_members.insert("length".to_string(), length_member);
    let mut readonly_members = HashSet::new();
    readonly_members.insert("length".to_string());

    let array_ty = std::rc::Rc::new(Type {
        name: "Array".to_string(),
        size: None,
        is_reference: true,
        callable: None,
        indexable: Some(Signature {
            params: vec![usize_t],
            ret: array_param.clone(),
        }),
        instance_members,
        static_members: IndexMap::new(),
        readonly_members,
        inherits: Vec::new(),
        is_const: false,
        facet: super::TypeFacet::Composed(super::ComposedFacet {
            special_operators: IndexMap::new(),
            generic: Some(GenericFacet {
                params: IndexMap::from([("T".to_string(), {
                    let id = match &array_param.facet {
                        super::TypeFacet::GenericParam(id) => *id,
                        _ => unreachable!(),
                    };
                    GenericBinding::Free(id)
                })]),
                generic_inheritance: Vec::new(),
            }),
            interface: None,
        }),
    });
    by_name.insert("Array".into(), array_ty.clone());

    let string_ty = super::rebuild_generic(
        &array_ty,
        &IndexMap::from([("T".to_string(), u8_t)]),
    )
    .expect("Array<T> rebuild with T=u8 for String must succeed");
    by_name.insert("string".into(), string_ty);

    BuiltinTable { by_name, array_param }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_every_builtin_name() {
        let table = seed_builtins();
        for name in builtin_names() {
            if *name == "Array" {
                assert!(table.get(name).is_some());
                continue;
            }
            assert!(table.get(name).is_some(), "missing builtin {name}");
        }
    }

    #[test]
    fn string_is_array_of_u8() {
        let table = seed_builtins();
        let string_ty = table.string_type();
        assert_eq!(string_ty.indexable.as_ref().unwrap().ret.name, "u8");
    }
}
