//! `fu`: a small statically-typed language's semantic analyzer, bytecode
//! emitter, and stack-based virtual machine.
//!
//! The pipeline runs front-to-back through these modules: a caller builds
//! (or parses, outside this crate) an [`ast::Document`], hands it to
//! [`checker::Checker`] for `populate`/`check`, then to an [`emitter::Emitter`]
//! to produce a [`bytecode::Binary`], which [`vm::Vm`] executes directly or
//! after a [`bytecode::save`]/[`bytecode::load`] round trip.

pub mod ast;
pub mod bytecode;
pub mod checker;
pub mod diagnostics;
pub mod emitter;
pub mod resolver;
pub mod scope;
pub mod span;
pub mod types;
pub mod vm;

pub use bytecode::{Binary, BytecodeError};
pub use checker::Checker;
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use emitter::{EmitError, Emitter};
pub use vm::{Vm, VmError};
