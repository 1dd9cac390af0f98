use std::ops::Index;

/// Which delimiter a matrix literal was written with. The parser folds
/// `{` into `Bracket`; `None` marks the synthesized argument pair of an
/// infix operator, which renders with no delimiters at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delim {
    None,
    Paren,
    Bracket,
    Brace,
}

/// Stable handle into the [`ExprArena`]. Copying an id shares the node,
/// which is how an operator call reuses its left-hand side and how a
/// function value points at its body without cloning the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprId(u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(i32),
    /// Quoted literal, delimiters still included; stripped at evaluation.
    String(String),
    /// Backtick literal, delimiters still included.
    RawString(String),
    Variable(String),
    Matrix {
        width: u32,
        height: u32,
        delim: Delim,
        cells: Vec<ExprId>,
    },
    Call {
        callee: ExprId,
        arg: ExprId,
    },
}

/// Append-only node storage for every expression of a run. Nodes are
/// never freed or mutated once allocated; the arena is dropped wholesale
/// when the session ends.
#[derive(Debug, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.0 as usize]
    }
}

impl Index<ExprId> for ExprArena {
    type Output = Expr;

    fn index(&self, id: ExprId) -> &Expr {
        self.get(id)
    }
}

/// One `var`/`fn`/`opp`/`op`/`opr` statement. For operator forms `name`
/// is the operator spelling; the environment binding and the operator
/// table entry share it.
#[derive(Debug, Clone, PartialEq)]
pub struct Def {
    pub name: String,
    pub params: Vec<String>,
    pub body: ExprId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Empty,
    Expr(ExprId),
    Def(Def),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_shareable() {
        let mut arena = ExprArena::new();
        let a = arena.alloc(Expr::Number(1));
        let b = arena.alloc(Expr::Call { callee: a, arg: a });
        assert_eq!(arena[a], Expr::Number(1));
        match &arena[b] {
            Expr::Call { callee, arg } => {
                assert_eq!(*callee, a);
                assert_eq!(*arg, a);
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }
}
