use crate::ast::Delim;
use crate::eval::Value;

/// Markup around a matrix, keyed on its delimiter and whether it has
/// more than one row. Tall matrices become TeX matrix environments; flat
/// ones keep lightweight delimiters (brackets turn into a subscript
/// group).
fn delimiters(delim: Delim, tall: bool) -> (&'static str, &'static str) {
    if tall {
        match delim {
            Delim::None => ("\\begin{matrix}", "\\end{matrix}"),
            Delim::Paren => ("\\begin{pmatrix}", "\\end{pmatrix}"),
            Delim::Bracket => ("\\begin{bmatrix}", "\\end{bmatrix}"),
            Delim::Brace => ("\\begin{matrix}", "\\end{matrix}"),
        }
    } else {
        match delim {
            Delim::None => ("", ""),
            Delim::Paren => ("(", ")"),
            Delim::Bracket => ("_{", "}"),
            Delim::Brace => ("\\{", "\\}"),
        }
    }
}

fn put(out: &mut Option<&mut String>, piece: &str) -> usize {
    if let Some(buffer) = out {
        buffer.push_str(piece);
    }
    piece.len()
}

/// Serializes `value`, returning the byte length written. With no buffer
/// this is a pure measuring pass; [`render`] runs it twice so the final
/// string is allocated exactly once.
pub fn write_value(value: &Value, out: &mut Option<&mut String>) -> usize {
    match value {
        Value::Number(n) => put(out, &n.to_string()),
        Value::String(text) => put(out, "\\text{") + put(out, text) + put(out, "}"),
        Value::RawString(text) => put(out, text),
        Value::Function { .. } => put(out, "<fn>"),
        Value::Matrix {
            width,
            height,
            delim,
            cells,
        } => {
            let tall = *height > 1;
            let (open, close) = delimiters(*delim, tall);
            let separator = if tall { " & " } else { ", " };

            let mut total = put(out, open);
            let mut cells = cells.iter();
            for row in 0..*height {
                if row != 0 {
                    total += put(out, "\\\n");
                }
                for col in 0..*width {
                    if col != 0 {
                        total += put(out, separator);
                    }
                    if let Some(cell) = cells.next() {
                        total += write_value(cell, out);
                    }
                }
            }
            total + put(out, close)
        }
    }
}

pub fn measure(value: &Value) -> usize {
    write_value(value, &mut None)
}

pub fn render(value: &Value) -> String {
    let mut markup = String::with_capacity(measure(value));
    write_value(value, &mut Some(&mut markup));
    markup
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn flat(delim: Delim, cells: Vec<Value>) -> Value {
        Value::Matrix {
            width: cells.len() as u32,
            height: 1,
            delim,
            cells,
        }
    }

    #[test]
    fn scalars() {
        assert_eq!(render(&Value::Number(42)), "42");
        assert_eq!(render(&Value::String("sum of".into())), "\\text{sum of}");
        assert_eq!(render(&Value::RawString("\\sum".into())), "\\sum");
        assert_eq!(
            render(&Value::Function {
                params: vec!["x".into()],
                body: crate::ast::ExprArena::new().alloc(crate::ast::Expr::Number(0)),
            }),
            "<fn>"
        );
    }

    #[test]
    fn flat_matrices_by_delimiter() {
        let cells = || vec![Value::Number(1), Value::Number(2)];
        assert_eq!(render(&flat(Delim::Paren, cells())), "(1, 2)");
        assert_eq!(render(&flat(Delim::Bracket, cells())), "_{1, 2}");
        assert_eq!(render(&flat(Delim::Brace, cells())), "\\{1, 2\\}");
        assert_eq!(render(&flat(Delim::None, cells())), "1, 2");
    }

    #[test]
    fn tall_matrices_use_environments() {
        let grid = Value::Matrix {
            width: 2,
            height: 2,
            delim: Delim::Paren,
            cells: vec![
                Value::Number(1),
                Value::Number(2),
                Value::Number(3),
                Value::Number(4),
            ],
        };
        assert_eq!(
            render(&grid),
            "\\begin{pmatrix}1 & 2\\\n3 & 4\\end{pmatrix}"
        );
    }

    #[test]
    fn measure_matches_rendered_length() {
        let value = Value::Matrix {
            width: 2,
            height: 2,
            delim: Delim::Bracket,
            cells: vec![
                Value::Number(10),
                Value::String("x".into()),
                Value::RawString("\\pi".into()),
                flat(Delim::Paren, vec![Value::Number(7)]),
            ],
        };
        assert_eq!(measure(&value), render(&value).len());
    }
}
