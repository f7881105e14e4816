//! End-to-end scenarios driving the whole pipeline: checker -> optimizer ->
//! emitter -> VM, against the literal source/outcome pairs documented in
//! DESIGN.md's testable-properties section.

use fu::ast::{Document, Ident, IdentityLhs, LiteralKind, Node, OperatorKind, TypeExpr, TypeModifier};
use fu::checker::{optimize_document, Checker};
use fu::emitter::Emitter;
use fu::span::SourceLocation;
use fu::types::seed_builtins;
use fu::vm::Vm;

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn main_decl(return_type: &str, body: Vec<Node>) -> Node {
    Node::Declaration {
        identity: Box::new(Node::Identity {
            left: IdentityLhs::Name(Ident::new("main", loc())),
            right: Box::new(Node::TypeExpr(TypeExpr {
                base: Ident::new(return_type, loc()),
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

fn run(doc: &Document) -> i32 {
    let builtins = seed_builtins();
    let mut checker = Checker::new();
    let diags = checker.populate_and_check(doc);
    assert!(diags.iter().all(|d| !d.is_fatal()), "unexpected errors: {diags:?}");

    let optimized = optimize_document(doc);
    let (binary, layouts) = Emitter::new(&builtins).emit_document(&optimized.content).unwrap();
    Vm::run(&binary, layouts, &[]).unwrap()
}

/// Emits and runs without checking first, to isolate the operand-order
/// property under test from the checker entirely.
fn emit_and_run(doc: &Document) -> i32 {
    let builtins = seed_builtins();
    let optimized = optimize_document(doc);
    let (binary, layouts) = Emitter::new(&builtins).emit_document(&optimized.content).unwrap();
    Vm::run(&binary, layouts, &[]).unwrap()
}

#[test]
fn scenario_1_empty_void_main_exits_zero() {
    // main: void() = { };
    let doc = Document {
        content: vec![main_decl("void", vec![])],
        location: loc(),
    };
    assert_eq!(run(&doc), 0);
}

#[test]
fn scenario_2_folded_literal_sum_exits_with_its_value() {
    // main: i32() = { return 1 + 2; };
    let sum = Node::Operator {
        op: OperatorKind::Add,
        lhs: Some(Box::new(Node::Literal(fu::ast::Literal::number("1", loc())))),
        rhs: Some(Box::new(Node::Literal(fu::ast::Literal::number("2", loc())))),
        location: loc(),
    };
    let doc = Document {
        content: vec![main_decl(
            "i32",
            vec![Node::Return {
                value: Some(Box::new(sum)),
                location: loc(),
            }],
        )],
        location: loc(),
    };

    // The optimizer folds the sum to a single literal before the emitter
    // ever sees it, so the binary's code is just PUSH_LITERAL i32 3; RET.
    let optimized = optimize_document(&doc);
    match &optimized.content[0] {
        Node::Declaration { initial: Some(initial), .. } => match initial.as_ref() {
            Node::Scope { statements, .. } => match &statements[0] {
                Node::Return { value: Some(v), .. } => match v.as_ref() {
                    Node::Literal(lit) => {
                        assert_eq!(lit.kind, LiteralKind::Number);
                        assert_eq!(lit.text, "3");
                    }
                    other => panic!("expected a folded literal, got {other:?}"),
                },
                other => panic!("expected a return statement, got {other:?}"),
            },
            other => panic!("expected a scope, got {other:?}"),
        },
        other => panic!("expected a declaration, got {other:?}"),
    }

    assert_eq!(run(&doc), 3);
}

#[test]
fn scenario_2_variant_subtraction_is_not_commutative() {
    // main: i32() = { return 5 - 2; }; exercises operand-order correctness
    // for a non-commutative operator through the full pipeline.
    let diff = Node::Operator {
        op: OperatorKind::Sub,
        lhs: Some(Box::new(Node::Literal(fu::ast::Literal::number("5", loc())))),
        rhs: Some(Box::new(Node::Literal(fu::ast::Literal::number("2", loc())))),
        location: loc(),
    };
    let doc = Document {
        content: vec![main_decl(
            "i32",
            vec![Node::Return {
                value: Some(Box::new(diff)),
                location: loc(),
            }],
        )],
        location: loc(),
    };
    assert_eq!(run(&doc), 3);
}

#[test]
fn local_declaration_then_return_preserves_operand_order() {
    // main: i32() = { x: i32 = 10; return x - 3; };
    let decl = Node::Declaration {
        identity: Box::new(Node::Identity {
            left: IdentityLhs::Name(Ident::new("x", loc())),
            right: Box::new(Node::TypeExpr(TypeExpr {
                base: Ident::new("i32", loc()),
                mods: vec![],
                location: loc(),
            })),
            location: loc(),
        }),
        initial: Some(Box::new(Node::Literal(fu::ast::Literal::number("10", loc())))),
        is_fat_arrow: false,
        location: loc(),
    };
    let ret = Node::Return {
        value: Some(Box::new(Node::Operator {
            op: OperatorKind::Sub,
            lhs: Some(Box::new(Node::Identifier(Ident::new("x", loc())))),
            rhs: Some(Box::new(Node::Literal(fu::ast::Literal::number("3", loc())))),
            location: loc(),
        })),
        location: loc(),
    };
    let doc = Document {
        content: vec![main_decl("i32", vec![decl, ret])],
        location: loc(),
    };
    assert_eq!(emit_and_run(&doc), 7);
}

#[test]
fn scenario_6_body_local_shadows_later_top_level_namespace() {
    // main: void() = { x: u8 = 0; }; x: namespace = {}; (namespace first,
    // per populate's two-pass order: the whole document's top-level names
    // are bound before any function body is checked.)
    let local_decl = Node::Declaration {
        identity: Box::new(Node::Identity {
            left: IdentityLhs::Name(Ident::new("x", loc())),
            right: Box::new(Node::TypeExpr(TypeExpr {
                base: Ident::new("u8", loc()),
                mods: vec![],
                location: loc(),
            })),
            location: loc(),
        }),
        initial: Some(Box::new(Node::Literal(fu::ast::Literal::number("0", loc())))),
        is_fat_arrow: false,
        location: loc(),
    };
    let doc = Document {
        content: vec![
            main_decl("void", vec![local_decl]),
            Node::Namespace {
                name: Ident::new("x", loc()),
                body: vec![],
                location: loc(),
            },
        ],
        location: loc(),
    };
    let mut checker = Checker::new();
    let diags = checker.populate_and_check(&doc);
    assert!(
        diags.iter().any(|d| d.message == "Declaration of 'x' shadows previous declaration."),
        "expected a shadow warning, got: {diags:?}"
    );
}

#[test]
fn calls_a_sibling_function_through_the_full_pipeline() {
    // main: i32() = { return helper(); }; helper: i32() = { return 4; };
    let call = Node::Operator {
        op: OperatorKind::Call,
        lhs: Some(Box::new(Node::Identifier(Ident::new("helper", loc())))),
        rhs: None,
        location: loc(),
    };
    let helper_decl = Node::Declaration {
        identity: Box::new(Node::Identity {
            left: IdentityLhs::Name(Ident::new("helper", loc())),
            right: Box::new(Node::TypeExpr(TypeExpr {
                base: Ident::new("i32", loc()),
                mods: vec![TypeModifier::ParamList(vec![])],
                location: loc(),
            })),
            location: loc(),
        }),
        initial: Some(Box::new(Node::Scope {
            statements: vec![Node::Return {
                value: Some(Box::new(Node::Literal(fu::ast::Literal::number("4", loc())))),
                location: loc(),
            }],
            location: loc(),
        })),
        is_fat_arrow: false,
        location: loc(),
    };
    let doc = Document {
        content: vec![
            main_decl(
                "i32",
                vec![Node::Return {
                    value: Some(Box::new(call)),
                    location: loc(),
                }],
            ),
            helper_decl,
        ],
        location: loc(),
    };
    assert_eq!(run(&doc), 4);
}
