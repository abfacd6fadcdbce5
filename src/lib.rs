//! `stepjs` — a sandboxed, step-driven interpreter for an ES5 subset.
//!
//! Source text is lexed and parsed into an ESTree-shaped AST, then executed
//! by an explicit-stack step engine: every call to [`Interpreter::step`]
//! performs one micro-step and returns, so a host can interleave guest
//! execution with its own event loop, throttle it, or suspend it around
//! asynchronous native callbacks. Guest code cannot reach the host runtime
//! except through bindings the host injects.
//!
//! # Crate layout
//!
//! - [`lexer`] — tokens and the hand-written scanner.
//! - [`ast`] — ESTree-shaped nodes with source spans.
//! - [`parser`] — recursive-descent parser with ASI and strict-mode checks.
//! - [`types`] — guest values (`Value`, UTF-16 `JsString`).
//! - [`interpreter`] — the step engine, object/scope model, builtins, and
//!   the host↔guest bridge.

pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod types;

pub use interpreter::{
    AsyncResolver, Descriptor, ErrorKind, Interpreter, InterpreterError, NativeValue, StepError,
};
pub use parser::{ParseError, ParseOptions, Parser};
pub use types::Value;
