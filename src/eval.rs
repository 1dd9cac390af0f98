use crate::ast::{Delim, Expr, ExprArena, ExprId, Stmt};
use crate::ops;
use crate::tex;

/// A fully evaluated expression. Matrices hold values rather than node
/// ids; a function holds its body by id, since the arena outlives every
/// value of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(i32),
    /// Rendered as `\text{...}`.
    String(String),
    /// Rendered verbatim.
    RawString(String),
    Function {
        params: Vec<String>,
        body: ExprId,
    },
    Matrix {
        width: u32,
        height: u32,
        delim: Delim,
        cells: Vec<Value>,
    },
}

const CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    value: Value,
}

/// A scope of name bindings with a parent pointer.
///
/// Lookup walks the chain, so a function body sees its caller's scope
/// through the chain of call frames rather than the scope it was defined
/// in. Same open-addressing layout as the operator table; the slot array
/// is only allocated once the first binding arrives, since most call
/// frames bind one or two names.
#[derive(Debug, Default)]
pub struct Environment<'p> {
    slots: Vec<Option<Binding>>,
    used: usize,
    parent: Option<&'p Environment<'p>>,
}

impl<'p> Environment<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: &'p Environment<'p>) -> Self {
        Environment {
            slots: Vec::new(),
            used: 0,
            parent: Some(parent),
        }
    }

    /// Binds `name` in this scope, shadowing any parent binding and
    /// overwriting a previous one here. A full scope drops the binding
    /// and reports failure.
    pub fn define(&mut self, name: &str, value: Value) -> bool {
        if self.slots.is_empty() {
            self.slots = vec![None; CAPACITY];
        }
        if self.used == CAPACITY {
            return false;
        }

        let mask = CAPACITY - 1;
        let mut i = ops::hash(name) as usize & mask;
        for _ in 0..CAPACITY {
            match &self.slots[i] {
                None => {
                    self.slots[i] = Some(Binding {
                        name: name.to_owned(),
                        value,
                    });
                    self.used += 1;
                    return true;
                }
                Some(binding) if binding.name == name => {
                    self.slots[i] = Some(Binding {
                        name: name.to_owned(),
                        value,
                    });
                    return true;
                }
                Some(_) => i = (i + 1) & mask,
            }
        }
        false
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if !self.slots.is_empty() {
            let mask = CAPACITY - 1;
            let mut i = ops::hash(name) as usize & mask;
            // The probe is bounded so a full scope still falls through
            // to the parent chain.
            for _ in 0..CAPACITY {
                match &self.slots[i] {
                    None => break,
                    Some(binding) if binding.name == name => return Some(binding.value.clone()),
                    Some(_) => i = (i + 1) & mask,
                }
            }
        }
        self.parent.and_then(|parent| parent.lookup(name))
    }
}

/// Evaluates one statement. Expression statements produce the value to
/// render; definitions mutate `env` and produce nothing. A `var` body
/// (and a zero-parameter `fn` body) is evaluated eagerly at definition
/// time.
pub fn eval_statement(stmt: &Stmt, ast: &ExprArena, env: &mut Environment<'_>) -> Option<Value> {
    match stmt {
        Stmt::Empty => None,
        Stmt::Expr(id) => Some(eval_expr(ast, *id, env)),
        Stmt::Def(def) => {
            let value = if def.params.is_empty() {
                eval_expr(ast, def.body, env)
            } else {
                Value::Function {
                    params: def.params.clone(),
                    body: def.body,
                }
            };
            env.define(&def.name, value);
            None
        }
    }
}

pub fn eval_expr(ast: &ExprArena, id: ExprId, env: &Environment<'_>) -> Value {
    match &ast[id] {
        Expr::Number(n) => Value::Number(*n),
        Expr::String(text) => Value::String(strip_delimiters(text)),
        Expr::RawString(text) => Value::RawString(strip_delimiters(text)),
        // An unbound name passes through as its own spelling, so plain
        // TeX identifiers need no declarations.
        Expr::Variable(name) => env
            .lookup(name)
            .unwrap_or_else(|| Value::RawString(name.clone())),
        Expr::Matrix {
            width,
            height,
            delim,
            cells,
        } => Value::Matrix {
            width: *width,
            height: *height,
            delim: *delim,
            cells: cells.iter().map(|&cell| eval_expr(ast, cell, env)).collect(),
        },
        Expr::Call { callee, arg } => eval_call(ast, *callee, *arg, env),
    }
}

fn eval_call(ast: &ExprArena, callee: ExprId, arg: ExprId, env: &Environment<'_>) -> Value {
    // `__unwrap__` is matched on the callee's spelling before lookup, so
    // it cannot be shadowed away.
    if let Expr::Variable(name) = &ast[callee] {
        if name == "__unwrap__" {
            return unwrap_value(eval_expr(ast, arg, env));
        }
    }

    let callee = eval_expr(ast, callee, env);
    let arg = eval_expr(ast, arg, env);

    match callee {
        Value::Function { params, body } => {
            let mut scope = Environment::with_parent(env);
            if params.len() == 1 {
                scope.define(&params[0], arg);
            } else {
                let Value::Matrix {
                    width,
                    height,
                    cells,
                    ..
                } = arg
                else {
                    panic!(
                        "function of {} parameters applied to a non-matrix argument",
                        params.len()
                    );
                };
                assert!(
                    width as usize == params.len() && height == 1,
                    "function of {} parameters applied to a {width}x{height} matrix",
                    params.len()
                );
                for (param, value) in params.iter().zip(cells) {
                    scope.define(param, value);
                }
            }
            eval_expr(ast, body, &scope)
        }
        callee => {
            // Applying a non-function degrades into concatenated markup,
            // which is what makes `alpha beta` come out as two adjacent
            // TeX atoms.
            let mut markup = tex::render(&callee);
            markup.push_str(&tex::render(&arg));
            Value::RawString(markup)
        }
    }
}

/// Strips nested 1×1 matrices, leaving any other value untouched.
pub fn unwrap_value(value: Value) -> Value {
    match value {
        Value::Matrix {
            width: 1,
            height: 1,
            mut cells,
            ..
        } => unwrap_value(cells.remove(0)),
        value => value,
    }
}

fn strip_delimiters(text: &str) -> String {
    if text.len() >= 2 {
        text[1..text.len() - 1].to_owned()
    } else {
        String::new()
    }
}
