//! The syntax tree handed to the analyzer.
//!
//! Tokenizing and parsing Fu source text live outside this crate's scope
//! (see the module-level docs in `lib.rs`); this module only defines the
//! shape a well-formed syntax tree must have to be fed into [`crate::checker`].
//! Each node mirrors one of the discriminated variants the specification's
//! external interface promises: a location, structural access to children,
//! and a tag the resolver/checker/emitter dispatch on via exhaustive match.

use crate::span::SourceLocation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub location: SourceLocation,
}

impl Ident {
    pub fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }
}

/// Operator kinds, the closed set the tokenizer is assumed to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    Dot,
    Assign,
    Eq,
    Lt,
    Call,
    Index,
    Add,
    Sub,
    Mul,
    Div,
    Not,
}

impl OperatorKind {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, OperatorKind::Add | OperatorKind::Sub | OperatorKind::Mul | OperatorKind::Div)
    }

    pub fn text(self) -> &'static str {
        match self {
            OperatorKind::Dot => ".",
            OperatorKind::Assign => "=",
            OperatorKind::Eq => "==",
            OperatorKind::Lt => "<",
            OperatorKind::Call => "(",
            OperatorKind::Index => "[",
            OperatorKind::Add => "+",
            OperatorKind::Sub => "-",
            OperatorKind::Mul => "*",
            OperatorKind::Div => "/",
            OperatorKind::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralKind {
    String,
    Number,
}

/// A literal as written in source. Numbers are kept as text (`"500"`,
/// `"1.5f"`, `"-3"`) so the resolver and optimizer can inspect suffixes and
/// fold arithmetic without re-lexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub kind: LiteralKind,
    pub text: String,
    pub location: SourceLocation,
}

impl Literal {
    pub fn number(text: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind: LiteralKind::Number,
            text: text.into(),
            location,
        }
    }

    pub fn string(text: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind: LiteralKind::String,
            text: text.into(),
            location,
        }
    }

    pub fn has_f_suffix(&self) -> bool {
        self.text.ends_with('f') || self.text.ends_with('F')
    }

    pub fn has_dot(&self) -> bool {
        self.text.contains('.')
    }

    pub fn is_negative(&self) -> bool {
        self.text.starts_with('-')
    }
}

/// The closed set of "special operators" a type body may define instead of a
/// plain named member (`op= : this() = { ... }` for the constructor, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialOperatorKind {
    Constructor,
    Index,
}

/// Left side of an `Identity` node (`name: Type`): either a plain identifier
/// or one of the special operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdentityLhs {
    Name(Ident),
    SpecialOperator(SpecialOperatorKind, SourceLocation),
}

impl IdentityLhs {
    pub fn location(&self) -> &SourceLocation {
        match self {
            IdentityLhs::Name(ident) => &ident.location,
            IdentityLhs::SpecialOperator(_, location) => location,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            IdentityLhs::Name(ident) => ident.name.as_str(),
            IdentityLhs::SpecialOperator(SpecialOperatorKind::Constructor, _) => "op=",
            IdentityLhs::SpecialOperator(SpecialOperatorKind::Index, _) => "op[]",
        }
    }
}

/// A modifier appended to a type expression's base identifier, e.g. the
/// `(i32, i32)` in `i32(i32, i32)`, the `[]` in `i32[]`, or the `<T>` in
/// `List<T>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeModifier {
    ParamList(Vec<Node>),
    ArrayDef,
    GenericParamList(Vec<Node>),
}

/// A type expression: a base identifier plus zero or more modifiers applied
/// left to right (`i32(str[])[]` is an array of functions `str[] -> i32`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeExpr {
    pub base: Ident,
    pub mods: Vec<TypeModifier>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfArm {
    /// `None` marks the trailing `else` arm.
    pub term: Option<Box<Node>>,
    pub body: Vec<Node>,
    pub location: SourceLocation,
}

/// One node of the syntax tree. Each variant names the kind of construct it
/// represents; every analyzer pass dispatches on this tag exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Namespace {
        name: Ident,
        body: Vec<Node>,
        location: SourceLocation,
    },
    TypeDeclaration {
        name: Ident,
        is_interface: bool,
        /// `None` for a forward declaration, `Some(Body(..))` for a full
        /// definition, `Some(Alias(..))` for `foo: type = bar;`.
        definition: Option<TypeDefinition>,
        location: SourceLocation,
    },
    Identifier(Ident),
    Literal(Literal),
    Identity {
        left: IdentityLhs,
        right: Box<Node>,
        location: SourceLocation,
    },
    TypeExpr(TypeExpr),
    ExpressionList {
        values: Vec<Node>,
        location: SourceLocation,
    },
    Scope {
        statements: Vec<Node>,
        location: SourceLocation,
    },
    Return {
        value: Option<Box<Node>>,
        location: SourceLocation,
    },
    If {
        arms: Vec<IfArm>,
        location: SourceLocation,
    },
    /// A binary/unary operator node. `lhs` is `None` for a prefix unary
    /// operator (`-x`, `.foo`, `!x`); `rhs` is the only operand in that case.
    Operator {
        op: OperatorKind,
        lhs: Option<Box<Node>>,
        rhs: Option<Box<Node>>,
        location: SourceLocation,
    },
    Declaration {
        identity: Box<Node>,
        initial: Option<Box<Node>>,
        is_fat_arrow: bool,
        location: SourceLocation,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDefinition {
    Body(Vec<Node>),
    Alias(Box<Node>),
}

impl Node {
    pub fn location(&self) -> &SourceLocation {
        match self {
            Node::Namespace { location, .. }
            | Node::TypeDeclaration { location, .. }
            | Node::Identity { location, .. }
            | Node::ExpressionList { location, .. }
            | Node::Scope { location, .. }
            | Node::Return { location, .. }
            | Node::If { location, .. }
            | Node::Operator { location, .. }
            | Node::Declaration { location, .. } => location,
            Node::Identifier(ident) => &ident.location,
            Node::Literal(lit) => &lit.location,
            Node::TypeExpr(expr) => &expr.location,
        }
    }

    pub fn as_identifier(&self) -> Option<&Ident> {
        match self {
            Node::Identifier(ident) => Some(ident),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Node::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

/// The top-level unit handed to the checker: one source file's sequence of
/// namespace/type/value declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: Vec<Node>,
    pub location: SourceLocation,
}
