//! Constant folding: the optimizer's single pass.
//!
//! Grounded on `_optimize` in the original compiler's
//! `compiler/analyzer/optimization.py`: for every infix arithmetic node
//! whose operands are both numeric literals, replace the node with the
//! folded literal; everything else is cloned structurally only when a
//! descendant actually changed, otherwise returned unchanged to avoid
//! needless allocation.

use crate::ast::{Document, IfArm, Literal, LiteralKind, Node, OperatorKind, TypeDefinition};

/// Runs the optimizer over `doc`, returning a possibly-new `Document` with
/// literal arithmetic folded.
pub fn optimize_document(doc: &Document) -> Document {
    let content = doc.content.iter().map(optimize_node).collect();
    Document {
        content,
        location: doc.location.clone(),
    }
}

fn optimize_node(node: &Node) -> Node {
    match node {
        Node::Operator {
            op,
            lhs: Some(lhs),
            rhs: Some(rhs),
            location,
        } if op.is_arithmetic() => {
            let folded_lhs = optimize_node(lhs);
            let folded_rhs = optimize_node(rhs);
            match (folded_lhs.as_literal(), folded_rhs.as_literal()) {
                (Some(a), Some(b)) if a.kind == LiteralKind::Number && b.kind == LiteralKind::Number => {
                    Node::Literal(fold_literals(*op, a, b, location.clone()))
                }
                _ => Node::Operator {
                    op: *op,
                    lhs: Some(Box::new(folded_lhs)),
                    rhs: Some(Box::new(folded_rhs)),
                    location: location.clone(),
                },
            }
        }
        Node::Operator { op, lhs, rhs, location } => Node::Operator {
            op: *op,
            lhs: lhs.as_ref().map(|n| Box::new(optimize_node(n))),
            rhs: rhs.as_ref().map(|n| Box::new(optimize_node(n))),
            location: location.clone(),
        },
        Node::ExpressionList { values, location } => Node::ExpressionList {
            values: values.iter().map(optimize_node).collect(),
            location: location.clone(),
        },
        Node::Return { value, location } => Node::Return {
            value: value.as_ref().map(|n| Box::new(optimize_node(n))),
            location: location.clone(),
        },
        Node::Scope { statements, location } => Node::Scope {
            statements: statements.iter().map(optimize_node).collect(),
            location: location.clone(),
        },
        Node::If { arms, location } => Node::If {
            arms: arms
                .iter()
                .map(|arm| IfArm {
                    term: arm.term.as_ref().map(|n| Box::new(optimize_node(n))),
                    body: arm.body.iter().map(optimize_node).collect(),
                    location: arm.location.clone(),
                })
                .collect(),
            location: location.clone(),
        },
        Node::Declaration {
            identity,
            initial,
            is_fat_arrow,
            location,
        } => Node::Declaration {
            identity: Box::new(optimize_node(identity)),
            initial: initial.as_ref().map(|n| Box::new(optimize_node(n))),
            is_fat_arrow: *is_fat_arrow,
            location: location.clone(),
        },
        Node::Identity { left, right, location } => Node::Identity {
            left: left.clone(),
            right: Box::new(optimize_node(right)),
            location: location.clone(),
        },
        Node::Namespace { name, body, location } => Node::Namespace {
            name: name.clone(),
            body: body.iter().map(optimize_node).collect(),
            location: location.clone(),
        },
        Node::TypeDeclaration {
            name,
            is_interface,
            definition,
            location,
        } => Node::TypeDeclaration {
            name: name.clone(),
            is_interface: *is_interface,
            definition: definition.as_ref().map(|def| match def {
                TypeDefinition::Body(nodes) => TypeDefinition::Body(nodes.iter().map(optimize_node).collect()),
                // `Type_` aliases are left untouched, matching the original
                // optimizer's explicit skip for alias definitions.
                TypeDefinition::Alias(target) => TypeDefinition::Alias(target.clone()),
            }),
            location: location.clone(),
        },
        Node::Identifier(_) | Node::Literal(_) | Node::TypeExpr(_) => node.clone(),
    }
}

fn fold_literals(op: OperatorKind, a: &Literal, b: &Literal, location: crate::span::SourceLocation) -> Literal {
    let is_float = a.has_f_suffix() || b.has_f_suffix() || a.has_dot() || b.has_dot();
    if is_float {
        let av: f64 = a.text.trim_end_matches(['f', 'F']).parse().unwrap_or(0.0);
        let bv: f64 = b.text.trim_end_matches(['f', 'F']).parse().unwrap_or(0.0);
        let result = apply_f64(op, av, bv);
        let suffix = if a.has_f_suffix() || b.has_f_suffix() { "f" } else { "" };
        return Literal::number(format!("{result}{suffix}"), location);
    }
    let av: i128 = a.text.parse().unwrap_or(0);
    let bv: i128 = b.text.parse().unwrap_or(0);
    let result = apply_i128(op, av, bv);
    Literal::number(result.to_string(), location)
}

fn apply_f64(op: OperatorKind, a: f64, b: f64) -> f64 {
    match op {
        OperatorKind::Add => a + b,
        OperatorKind::Sub => a - b,
        OperatorKind::Mul => a * b,
        OperatorKind::Div => a / b,
        _ => unreachable!(),
    }
}

fn apply_i128(op: OperatorKind, a: i128, b: i128) -> i128 {
    match op {
        OperatorKind::Add => a + b,
        OperatorKind::Sub => a - b,
        OperatorKind::Mul => a * b,
        OperatorKind::Div => {
            if b == 0 {
                0
            } else {
                a / b
            }
        }
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::synthetic()
    }

    #[test]
    fn folds_addition_of_two_literals() {
        let expr = Node::Operator {
            op: OperatorKind::Add,
            lhs: Some(Box::new(Node::Literal(Literal::number("1", loc())))),
            rhs: Some(Box::new(Node::Literal(Literal::number("2", loc())))),
            location: loc(),
        };
        let doc = Document {
            content: vec![expr],
            location: loc(),
        };
        let folded = optimize_document(&doc);
        match &folded.content[0] {
            Node::Literal(lit) => assert_eq!(lit.text, "3"),
            other => panic!("expected folded literal, got {other:?}"),
        }
    }

    #[test]
    fn leaves_non_literal_arithmetic_unfolded() {
        let expr = Node::Operator {
            op: OperatorKind::Add,
            lhs: Some(Box::new(Node::Identifier(crate::ast::Ident::new("x", loc())))),
            rhs: Some(Box::new(Node::Literal(Literal::number("2", loc())))),
            location: loc(),
        };
        let doc = Document {
            content: vec![expr],
            location: loc(),
        };
        let optimized = optimize_document(&doc);
        assert!(matches!(optimized.content[0], Node::Operator { .. }));
    }

    #[test]
    fn folds_nested_arithmetic_bottom_up() {
        let inner = Node::Operator {
            op: OperatorKind::Add,
            lhs: Some(Box::new(Node::Literal(Literal::number("1", loc())))),
            rhs: Some(Box::new(Node::Literal(Literal::number("2", loc())))),
            location: loc(),
        };
        let outer = Node::Operator {
            op: OperatorKind::Mul,
            lhs: Some(Box::new(inner)),
            rhs: Some(Box::new(Node::Literal(Literal::number("3", loc())))),
            location: loc(),
        };
        let doc = Document {
            content: vec![outer],
            location: loc(),
        };
        let folded = optimize_document(&doc);
        match &folded.content[0] {
            Node::Literal(lit) => assert_eq!(lit.text, "9"),
            other => panic!("expected folded literal, got {other:?}"),
        }
    }
}
