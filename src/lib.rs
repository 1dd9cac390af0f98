//! A pandoc filter for math written in a small extensible notation.
//!
//! Math blocks hold statements in a language with no fixed operators:
//! `op`, `opr`, and `opp` statements grow the grammar at run time, `var`
//! and `fn` bind names, and every expression statement renders to TeX
//! markup that replaces the block's payload in the pandoc JSON stream.
//! A prelude file evaluated up front seeds the definitions; state
//! accumulates across blocks for the rest of the document.

pub mod ast;
pub mod eval;
pub mod lex;
pub mod ops;
pub mod pandoc;
pub mod parse;
pub mod tex;

pub use parse::{Parser, SyntaxError};

use ast::ExprArena;
use eval::Environment;
use ops::OpTable;

/// Markup and diagnostics produced by one buffer.
pub struct BlockOutput {
    pub markup: String,
    pub errors: Vec<SyntaxError>,
}

/// Parser and evaluator state shared across every buffer of a document:
/// the expression arena, the operator table, and the global scope.
pub struct Session {
    ast: ExprArena,
    ops: OpTable,
    globals: Environment<'static>,
}

impl Session {
    pub fn new() -> Self {
        let mut ops = OpTable::new();
        // The only built-in. Registered directly rather than through the
        // priority counter, so user operators still start at 1.
        ops.define("__unwrap__", 0, 100);
        Session {
            ast: ExprArena::new(),
            ops,
            globals: Environment::new(),
        }
    }

    /// Parses and evaluates one buffer against the shared state.
    ///
    /// The whole buffer is parsed first, then the statements that parsed
    /// cleanly are evaluated in order; a statement that produced a
    /// diagnostic is skipped rather than evaluated half-built. The
    /// returned markup is the concatenation of every expression
    /// statement's rendering.
    pub fn run(&mut self, source: &str, origin: &str) -> BlockOutput {
        let mut statements = Vec::new();
        let errors = {
            let mut parser = Parser::new(origin, source, &mut self.ast, &mut self.ops);
            loop {
                let seen = parser.errors.len();
                match parser.next_statement() {
                    Some(stmt) => statements.push((stmt, parser.errors.len() == seen)),
                    None => break,
                }
            }
            parser.into_errors()
        };

        let mut markup = String::new();
        for (stmt, clean) in statements {
            if !clean {
                continue;
            }
            if let Some(value) = eval::eval_statement(&stmt, &self.ast, &mut self.globals) {
                markup.push_str(&tex::render(&value));
            }
        }
        BlockOutput { markup, errors }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
