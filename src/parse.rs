use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::ast::{Def, Delim, Expr, ExprArena, ExprId, Stmt};
use crate::lex::{Lexer, Token, TokenKind};
use crate::ops::OpTable;

/// A parse diagnostic. Rendered as `error:LINE:COL: message` on one line;
/// the miette source/label machinery carries the same position for fancy
/// reporting.
#[derive(Error, Debug, Diagnostic)]
#[error("error:{line}:{column}: {message}")]
pub struct SyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    span: SourceSpan,

    line: usize,
    column: usize,
    message: String,
}

impl SyntaxError {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Statement parser over one source buffer.
///
/// The grammar is not fixed: operator-definition statements install
/// entries into the shared [`OpTable`] while parsing, so the same
/// spelling can lex into different shapes depending on what was defined
/// earlier in the run. Expressions are parsed by precedence climbing
/// against that live table, with implicit juxtaposition-application as
/// the fallback when no operator applies.
///
/// Errors are sticky for the rest of the statement that raised them:
/// while the flag is set every accept succeeds without consuming and
/// further diagnostics are suppressed, so the statement unwinds
/// quietly. Before the next statement parses, the cursor skips to just
/// past the newline of the line the diagnostic fired in.
pub struct Parser<'de, 'a> {
    origin: String,
    lexer: Lexer<'de>,
    token: Token<'de>,
    ast: &'a mut ExprArena,
    ops: &'a mut OpTable,
    poisoned: bool,
    pub errors: Vec<SyntaxError>,
}

impl<'de, 'a> Parser<'de, 'a> {
    pub fn new(origin: &str, input: &'de str, ast: &'a mut ExprArena, ops: &'a mut OpTable) -> Self {
        let mut lexer = Lexer::new(input);
        let token = lexer.next_token();
        Parser {
            origin: origin.to_owned(),
            lexer,
            token,
            ast,
            ops,
            poisoned: false,
            errors: Vec::new(),
        }
    }

    pub fn into_errors(self) -> Vec<SyntaxError> {
        self.errors
    }

    /// Parses the next statement, or `None` once the buffer is exhausted
    /// (or starts with something no statement can begin with).
    pub fn next_statement(&mut self) -> Option<Stmt> {
        if self.poisoned {
            self.resynchronize();
        }

        if self.accept(TokenKind::Newline) {
            return Some(Stmt::Empty);
        }
        if let Some(expr) = self.parse_expression() {
            self.accept(TokenKind::Newline);
            return Some(Stmt::Expr(expr));
        }
        self.parse_definition().map(Stmt::Def)
    }

    /// Skips to just past the newline that ends the statement a
    /// diagnostic fired in, then lifts the sticky flag.
    fn resynchronize(&mut self) {
        while !matches!(self.token.kind, TokenKind::Newline | TokenKind::Eof) {
            self.advance();
        }
        if self.token.kind == TokenKind::Newline {
            self.advance();
        }
        self.poisoned = false;
    }

    fn advance(&mut self) {
        self.token = self.lexer.next_token();
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.poisoned {
            return true;
        }
        if self.token.kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn accept_ident_text(&mut self, expected: &str) -> bool {
        if self.poisoned {
            return true;
        }
        if self.token.kind == TokenKind::Ident && self.token.text == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) {
        if !self.accept(kind) {
            self.error(format!("Expected {kind}, but found {}", self.token.kind));
        }
    }

    fn expect_ident_text(&mut self, expected: &str) {
        if !self.accept_ident_text(expected) {
            self.error(format!("Expected '{expected}'"));
        }
    }

    fn error(&mut self, message: String) {
        if self.poisoned {
            return;
        }
        self.poisoned = true;

        let whole = self.lexer.whole();
        let offset = self.token.offset.min(whole.len());
        let consumed = &whole[..offset];
        let line = consumed.bytes().filter(|&b| b == b'\n').count() + 1;
        let column = offset - consumed.rfind('\n').map_or(0, |i| i + 1) + 1;
        let length = self.token.text.len().max(1).min(whole.len() - offset);

        self.errors.push(SyntaxError {
            src: NamedSource::new(&self.origin, whole.to_string()),
            span: SourceSpan::from(offset..offset + length),
            line,
            column,
            message,
        });
    }

    fn peek_ident(&self) -> Option<&'de str> {
        (self.token.kind == TokenKind::Ident).then_some(self.token.text)
    }

    fn parse_ident(&mut self) -> Option<&'de str> {
        let text = self.peek_ident()?;
        self.advance();
        Some(text)
    }

    fn parse_number(&mut self) -> Option<i32> {
        if self.token.kind != TokenKind::Number {
            return None;
        }
        let mut number: i32 = 0;
        for &b in self.token.text.as_bytes() {
            number = number.wrapping_mul(10).wrapping_add(i32::from(b - b'0'));
        }
        self.advance();
        Some(number)
    }

    fn parse_expression(&mut self) -> Option<ExprId> {
        self.parse_expression_bp(0)
    }

    fn parse_expression_bp(&mut self, bp: i32) -> Option<ExprId> {
        let mut lhs = self.parse_unary()?;

        while !self.poisoned {
            if let Some(op) = self.peek_ident() {
                if let Some(lbp) = self.ops.postfix(op) {
                    if lbp < bp {
                        break;
                    }
                    self.advance();
                    let callee = self.ast.alloc(Expr::Variable(op.to_owned()));
                    lhs = self.ast.alloc(Expr::Call { callee, arg: lhs });
                    continue;
                }
                if let Some((lbp, rbp)) = self.ops.infix(op) {
                    if lbp < bp {
                        break;
                    }
                    self.advance();
                    let rhs = self.parse_expression_bp(rbp).unwrap_or_else(|| {
                        self.error("Expected expression after operator".into());
                        self.ast.alloc(Expr::Number(0))
                    });
                    let callee = self.ast.alloc(Expr::Variable(op.to_owned()));
                    let arg = self.ast.alloc(Expr::Matrix {
                        width: 2,
                        height: 1,
                        delim: Delim::None,
                        cells: vec![lhs, rhs],
                    });
                    lhs = self.ast.alloc(Expr::Call { callee, arg });
                    continue;
                }
            }

            // No operator applies: adjacency becomes application, with
            // the accumulated left side as the callee.
            match self.parse_unary() {
                Some(rhs) => {
                    lhs = self.ast.alloc(Expr::Call {
                        callee: lhs,
                        arg: rhs,
                    });
                }
                None => break,
            }
        }

        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<ExprId> {
        if let Some(matrix) = self.parse_matrix() {
            return Some(matrix);
        }
        if let Some(name) = self.parse_ident() {
            if let Some((lbp, rbp)) = self.ops.find(name) {
                if lbp == 0 && rbp != 0 {
                    let arg = self.parse_expression_bp(rbp).unwrap_or_else(|| {
                        self.error("Expected expression".into());
                        self.ast.alloc(Expr::Number(0))
                    });
                    let callee = self.ast.alloc(Expr::Variable(name.to_owned()));
                    return Some(self.ast.alloc(Expr::Call { callee, arg }));
                }
                // A known operator in the wrong position; the identifier
                // stays consumed and unary parsing fails, so it is not
                // mistaken for a plain variable.
                return None;
            }
            return Some(self.ast.alloc(Expr::Variable(name.to_owned())));
        }
        if let Some(number) = self.parse_number() {
            return Some(self.ast.alloc(Expr::Number(number)));
        }
        if self.token.kind == TokenKind::String {
            let text = self.token.text.to_owned();
            self.advance();
            return Some(self.ast.alloc(Expr::String(text)));
        }
        if self.token.kind == TokenKind::RawString {
            let text = self.token.text.to_owned();
            self.advance();
            return Some(self.ast.alloc(Expr::RawString(text)));
        }
        None
    }

    /// A comma-separated, delimited list. Always 1×N at this stage; true
    /// two-dimensional matrices are only built by later value plumbing.
    fn parse_matrix(&mut self) -> Option<ExprId> {
        let (delim, closing) = if self.accept(TokenKind::LeftParen) {
            (Delim::Paren, TokenKind::RightParen)
        } else if self.accept(TokenKind::LeftBracket) {
            (Delim::Bracket, TokenKind::RightBracket)
        } else if self.accept(TokenKind::LeftBrace) {
            // Braces render like brackets.
            (Delim::Bracket, TokenKind::RightBrace)
        } else {
            return None;
        };

        let mut cells = Vec::new();
        while !self.poisoned {
            match self.parse_expression() {
                Some(expr) => cells.push(expr),
                None => {
                    self.error("Expected expression inside matrix".into());
                    break;
                }
            }
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        self.expect(closing);

        Some(self.ast.alloc(Expr::Matrix {
            width: cells.len() as u32,
            height: 1,
            delim,
            cells,
        }))
    }

    fn parse_definition(&mut self) -> Option<Def> {
        if self.accept(TokenKind::Var) {
            let name = self.expect_name();
            self.expect_ident_text("=");
            let body = self.expect_body("Expected expression");
            self.expect(TokenKind::Newline);
            return Some(Def {
                name,
                params: Vec::new(),
                body,
            });
        }

        if self.accept(TokenKind::Fn) {
            let name = self.expect_name();
            self.expect(TokenKind::LeftParen);

            let mut params = Vec::new();
            while !self.poisoned && !self.accept(TokenKind::RightParen) {
                match self.parse_ident() {
                    Some(param) => params.push(param.to_owned()),
                    None => {
                        self.error(format!(
                            "Expected identifier, but found {}",
                            self.token.kind
                        ));
                    }
                }
                if !self.accept(TokenKind::Comma) {
                    self.expect(TokenKind::RightParen);
                    break;
                }
            }

            self.expect_ident_text("=");
            let body = self.expect_body("Expected expression");
            self.expect(TokenKind::Newline);
            return Some(Def { name, params, body });
        }

        if self.accept(TokenKind::Opp) {
            let rbp = self.ops.allocate_priority();
            let name = match self.parse_ident() {
                Some(name) => name.to_owned(),
                None => {
                    self.error("Expected identifier".into());
                    String::new()
                }
            };
            let param = match self.parse_ident() {
                Some(param) => param.to_owned(),
                None => {
                    self.error("Expected one parameter for the operator".into());
                    String::new()
                }
            };
            self.expect_ident_text("=");
            let body = self.expect_body("Expected expression for definition");
            if !name.is_empty() {
                self.ops.define(&name, 0, rbp);
            }
            self.expect(TokenKind::Newline);
            return Some(Def {
                name,
                params: vec![param],
                body,
            });
        }

        // Generic infix form. The priority is claimed before we know
        // whether `op` or `opr` follows; a statement that falls through
        // to here still advances the counter, like redefinitions do.
        let priority = self.ops.allocate_priority();
        let (mut lbp, mut rbp) = if self.accept(TokenKind::Op) {
            (priority, priority + 1)
        } else if self.accept(TokenKind::Opr) {
            (priority + 1, priority)
        } else {
            return None;
        };

        if self.accept(TokenKind::LeftBracket) {
            if let Some(target) = self.parse_ident() {
                match self.ops.find(target) {
                    Some(pair) => (lbp, rbp) = pair,
                    None => self.error(format!("Operator not found: {target}")),
                }
            } else if let Some(left) = self.parse_number() {
                lbp = left;
                self.expect(TokenKind::Comma);
                match self.parse_number() {
                    Some(right) => rbp = right,
                    None => self.error("Expected number".into()),
                }
            } else {
                self.error("Expected identifier".into());
            }
            self.expect(TokenKind::RightBracket);
        }

        let first = self.expect_param("Expected identifier for first parameter");
        let name = self.expect_param("Expected identifier for the operator");
        let second = self.expect_param("Expected identifier for second parameter");

        self.expect_ident_text("=");
        let body = self.expect_body(&format!("Expected expression for the definition of {name}"));
        self.expect(TokenKind::Newline);

        // A definition whose operator name failed to parse installs no
        // table entry.
        if !name.is_empty() {
            self.ops.define(&name, lbp, rbp);
        }
        Some(Def {
            name,
            params: vec![first, second],
            body,
        })
    }

    fn expect_name(&mut self) -> String {
        match self.parse_ident() {
            Some(name) => name.to_owned(),
            None => {
                self.error(format!(
                    "Expected identifier, but found {}",
                    self.token.kind
                ));
                String::new()
            }
        }
    }

    fn expect_param(&mut self, message: &str) -> String {
        match self.parse_ident() {
            Some(name) => name.to_owned(),
            None => {
                self.error(message.to_owned());
                String::new()
            }
        }
    }

    fn expect_body(&mut self, message: &str) -> ExprId {
        match self.parse_expression() {
            Some(body) => body,
            None => {
                self.error(message.to_owned());
                self.ast.alloc(Expr::Number(0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_all(input: &str) -> (ExprArena, OpTable, Vec<Stmt>, Vec<SyntaxError>) {
        let mut ast = ExprArena::new();
        let mut ops = OpTable::new();
        let mut statements = Vec::new();
        let errors = {
            let mut parser = Parser::new("<test>", input, &mut ast, &mut ops);
            while let Some(stmt) = parser.next_statement() {
                statements.push(stmt);
            }
            parser.into_errors()
        };
        (ast, ops, statements, errors)
    }

    fn last_expr(statements: &[Stmt]) -> ExprId {
        match statements.last() {
            Some(Stmt::Expr(id)) => *id,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    /// Destructures `Call(op, Matrix[lhs, rhs])`.
    fn as_infix(ast: &ExprArena, id: ExprId) -> (String, ExprId, ExprId) {
        let Expr::Call { callee, arg } = &ast[id] else {
            panic!("expected call, got {:?}", ast[id]);
        };
        let Expr::Variable(name) = &ast[*callee] else {
            panic!("expected operator variable, got {:?}", ast[*callee]);
        };
        let Expr::Matrix {
            width: 2,
            height: 1,
            delim: Delim::None,
            cells,
        } = &ast[*arg]
        else {
            panic!("expected synthesized pair, got {:?}", ast[*arg]);
        };
        (name.clone(), cells[0], cells[1])
    }

    #[test]
    fn later_operators_bind_tighter() {
        let (ast, _, statements, errors) =
            parse_all("op a + b = 0\nop a * b = 0\n1 + 2 * 3\n");
        assert!(errors.is_empty());

        let (op, lhs, rhs) = as_infix(&ast, last_expr(&statements));
        assert_eq!(op, "+");
        assert_eq!(ast[lhs], Expr::Number(1));
        let (op, lhs, rhs) = as_infix(&ast, rhs);
        assert_eq!(op, "*");
        assert_eq!(ast[lhs], Expr::Number(2));
        assert_eq!(ast[rhs], Expr::Number(3));
    }

    #[test]
    fn op_chains_associate_left() {
        let (ast, _, statements, _) = parse_all("op a + b = 0\n1 + 2 + 3\n");
        let (_, lhs, rhs) = as_infix(&ast, last_expr(&statements));
        assert_eq!(ast[rhs], Expr::Number(3));
        let (_, lhs, rhs) = as_infix(&ast, lhs);
        assert_eq!(ast[lhs], Expr::Number(1));
        assert_eq!(ast[rhs], Expr::Number(2));
    }

    #[test]
    fn opr_chains_associate_right() {
        let (ast, _, statements, _) = parse_all("opr a ^ b = 0\n2 ^ 2 ^ 3\n");
        let (op, lhs, rhs) = as_infix(&ast, last_expr(&statements));
        assert_eq!(op, "^");
        assert_eq!(ast[lhs], Expr::Number(2));
        let (_, lhs, rhs) = as_infix(&ast, rhs);
        assert_eq!(ast[lhs], Expr::Number(2));
        assert_eq!(ast[rhs], Expr::Number(3));
    }

    #[test]
    fn default_priorities_increase_monotonically() {
        let (_, ops, _, _) = parse_all("op a + b = 0\nop a * b = 0\n");
        assert_eq!(ops.find("+"), Some((1, 2)));
        assert_eq!(ops.find("*"), Some((3, 4)));
    }

    #[test]
    fn redefined_operator_keeps_first_entry_but_burns_a_priority() {
        let (_, ops, _, _) = parse_all("op a + b = 0\nop a + b = 1\nop a * b = 0\n");
        assert_eq!(ops.find("+"), Some((1, 2)));
        // The second `+` claimed priority 2 even though its table entry
        // was rejected.
        assert_eq!(ops.find("*"), Some((3, 4)));
    }

    #[test]
    fn override_copies_an_existing_pair() {
        let (_, ops, _, errors) = parse_all("op a + b = 0\nop [+] a plus b = 0\n");
        assert!(errors.is_empty());
        assert_eq!(ops.find("plus"), ops.find("+"));
    }

    #[test]
    fn override_takes_literal_pair() {
        let (_, ops, _, errors) = parse_all("op [5, 6] a @ b = 0\n");
        assert!(errors.is_empty());
        assert_eq!(ops.find("@"), Some((5, 6)));
    }

    #[test]
    fn override_of_unknown_operator_errors() {
        let (_, _, _, errors) = parse_all("op [?] a @ b = 0\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("Operator not found"));
    }

    #[test]
    fn opp_defines_a_prefix_operator() {
        let (ast, ops, statements, errors) = parse_all("opp neg x = x\nneg 7\n");
        assert!(errors.is_empty());
        assert_eq!(ops.find("neg"), Some((0, 1)));

        let Expr::Call { callee, arg } = &ast[last_expr(&statements)] else {
            panic!("expected prefix call");
        };
        assert_eq!(ast[*callee], Expr::Variable("neg".into()));
        assert_eq!(ast[*arg], Expr::Number(7));
    }

    #[test]
    fn juxtaposition_becomes_application() {
        let (ast, _, statements, errors) = parse_all("f 5\n");
        assert!(errors.is_empty());
        let Expr::Call { callee, arg } = &ast[last_expr(&statements)] else {
            panic!("expected implicit application");
        };
        assert_eq!(ast[*callee], Expr::Variable("f".into()));
        assert_eq!(ast[*arg], Expr::Number(5));
    }

    #[test]
    fn list_literal_is_a_one_by_n_matrix() {
        let (ast, _, statements, _) = parse_all("[1, 2, 3]\n");
        let Expr::Matrix {
            width,
            height,
            delim,
            cells,
        } = &ast[last_expr(&statements)]
        else {
            panic!("expected matrix literal");
        };
        assert_eq!((*width, *height), (3, 1));
        assert_eq!(*delim, Delim::Bracket);
        assert_eq!(cells.len(), 3);
    }

    #[test]
    fn braces_fold_into_the_bracket_delimiter() {
        let (ast, _, statements, _) = parse_all("{1, 2}\n");
        let Expr::Matrix { delim, .. } = &ast[last_expr(&statements)] else {
            panic!("expected matrix literal");
        };
        assert_eq!(*delim, Delim::Bracket);
    }

    #[test]
    fn empty_list_is_an_error() {
        let (_, _, _, errors) = parse_all("()\n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("inside matrix"));
    }

    #[test]
    fn var_and_fn_definitions() {
        let (_, _, statements, errors) = parse_all("var x = 3\nfn f(a, b) = a\n");
        assert!(errors.is_empty());
        let Stmt::Def(var) = &statements[0] else {
            panic!("expected definition");
        };
        assert_eq!(var.name, "x");
        assert!(var.params.is_empty());
        let Stmt::Def(f) = &statements[1] else {
            panic!("expected definition");
        };
        assert_eq!(f.name, "f");
        assert_eq!(f.params, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn error_reports_line_and_column() {
        let (_, _, _, errors) = parse_all("var x = 3\nvar y 4\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line(), 2);
        assert!(errors[0].message().contains("Expected '='"));
    }

    #[test]
    fn parsing_resumes_after_a_bad_statement() {
        // The malformed line drains under the sticky flag; the next one
        // parses normally.
        let (_, _, statements, errors) = parse_all("(\nvar x = 4\n");
        assert_eq!(errors.len(), 1);
        assert!(statements
            .iter()
            .any(|s| matches!(s, Stmt::Def(def) if def.name == "x")));
    }

    #[test]
    fn recovery_skips_the_rest_of_the_bad_line_only() {
        // The diagnostic fires mid-line; everything up to that line's
        // newline is discarded and the two following statements come
        // through untouched.
        let (_, _, statements, errors) = parse_all("var a 1 junk\nvar b = 2\nvar c = 3\n");
        assert_eq!(errors.len(), 1);
        let names: Vec<_> = statements
            .iter()
            .filter_map(|s| match s {
                Stmt::Def(def) => Some(def.name.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"b") && names.contains(&"c"));
    }

    #[test]
    fn one_diagnostic_per_bad_statement() {
        // Several expectations fail in this line; only the first
        // reports.
        let (_, _, _, errors) = parse_all("op a\n");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn malformed_operator_definition_installs_nothing() {
        let (_, ops, _, errors) = parse_all("opp\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(ops.find(""), None);
    }

    #[test]
    fn infix_identifier_in_prefix_position_fails_the_statement() {
        let (_, _, statements, _) = parse_all("op a + b = 0\n+ 1\n");
        // The stray `+` line neither parses as an expression nor as a
        // definition, which ends the run.
        assert_eq!(statements.len(), 1);
    }
}
