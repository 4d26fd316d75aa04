//! I/O utilities for interrupt scenario scripts.
//!
//! A scenario script describes a set of PLIC sources, the order in which
//! devices raise them, and which handlers raise further sources while they
//! run. The host tools feed parsed scripts into the simulated controller.

/// File loading for scenario scripts.
///
/// Reads a script from disk and attaches the path to any I/O or parse error.
pub mod loader;

/// Parser for the line-oriented scenario script format.
///
/// Each non-empty line holds one statement; `#` starts a comment. Statements
/// are checked against the controller geometry while parsing, so a returned
/// [`parser::Script`] can be wired into a model without further validation.
pub mod parser;
