//! Render the typed IR to C text, once, at the end of the pipeline.
//!
//! The driver asserts that indentation returns to zero
//! between sections; [`Printer::indent`]/[`Printer::dedent`] are the only
//! way to change the running indent, which makes that assertion a single
//! field check rather than a text scan.

use std::fmt::Write as _;

use crate::error::TranslateError;
use crate::ir::expr::{COp, CUnOp, CExpr};
use crate::ir::stmt::CStmt;

pub struct Printer {
    buf: String,
    depth: u32,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer {
    #[must_use]
    pub fn new() -> Self {
        Self { buf: String::new(), depth: 0 }
    }

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Check the printer closed every block it opened at this point,
    /// returning to zero indentation before the next pass begins.
    pub fn finish_section(&mut self, section: &'static str) -> Result<(), TranslateError> {
        if self.depth != 0 {
            return Err(TranslateError::IndentationLeak { section });
        }
        Ok(())
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.buf
    }

    pub fn raw_line(&mut self, s: &str) {
        self.indent_line();
        self.buf.push_str(s);
        self.buf.push('\n');
    }

    fn indent_line(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
    }

    pub fn stmt(&mut self, s: &CStmt) {
        match s {
            CStmt::Expr(e) => {
                self.indent_line();
                let _ = write!(self.buf, "{};\n", render_expr(e));
            }
            CStmt::Decl { ty, name, init } => {
                self.indent_line();
                match init {
                    Some(e) => {
                        let _ = write!(self.buf, "{ty} {name} = {};\n", render_expr(e));
                    }
                    None => {
                        let _ = write!(self.buf, "{ty} {name};\n");
                    }
                }
            }
            CStmt::Block(stmts) => {
                self.indent_line();
                self.buf.push_str("{\n");
                self.depth += 1;
                for s in stmts {
                    self.stmt(s);
                }
                self.depth -= 1;
                self.indent_line();
                self.buf.push_str("}\n");
            }
            CStmt::If { cond, then_branch, else_branch } => {
                self.indent_line();
                let _ = write!(self.buf, "if ({}) {{\n", render_expr(cond));
                self.depth += 1;
                self.stmt(then_branch);
                self.depth -= 1;
                self.indent_line();
                if let Some(e) = else_branch {
                    self.buf.push_str("} else {\n");
                    self.depth += 1;
                    self.stmt(e);
                    self.depth -= 1;
                    self.indent_line();
                    self.buf.push_str("}\n");
                } else {
                    self.buf.push_str("}\n");
                }
            }
            CStmt::For { init, cond, step, body } => {
                self.indent_line();
                let init_s = init.as_deref().map_or(String::new(), |s| render_stmt_head(s));
                let cond_s = cond.as_ref().map_or(String::new(), render_expr);
                let step_s = step.as_ref().map_or(String::new(), render_expr);
                let _ = write!(self.buf, "for ({init_s}; {cond_s}; {step_s}) {{\n");
                self.depth += 1;
                self.stmt(body);
                self.depth -= 1;
                self.indent_line();
                self.buf.push_str("}\n");
            }
            CStmt::While { cond, body } => {
                self.indent_line();
                let _ = write!(self.buf, "while ({}) {{\n", render_expr(cond));
                self.depth += 1;
                self.stmt(body);
                self.depth -= 1;
                self.indent_line();
                self.buf.push_str("}\n");
            }
            CStmt::Label(l) => {
                let _ = write!(self.buf, "{l}:\n");
            }
            CStmt::Goto(l) => {
                self.indent_line();
                let _ = write!(self.buf, "goto {l};\n");
            }
            CStmt::Return(e) => {
                self.indent_line();
                match e {
                    Some(e) => {
                        let _ = write!(self.buf, "return {};\n", render_expr(e));
                    }
                    None => self.buf.push_str("return;\n"),
                }
            }
            CStmt::Break => self.raw_line("break;"),
            CStmt::Continue => self.raw_line("continue;"),
            CStmt::Raw(s) => {
                for line in s.lines() {
                    self.raw_line(line);
                }
            }
            CStmt::Comment(s) => self.raw_line(&format!("/* {s} */")),
        }
    }
}

fn render_stmt_head(s: &CStmt) -> String {
    // `for` init/step only ever carry a decl or an expr in practice.
    match s {
        CStmt::Decl { ty, name, init: Some(e) } => format!("{ty} {name} = {}", render_expr(e)),
        CStmt::Decl { ty, name, init: None } => format!("{ty} {name}"),
        CStmt::Expr(e) => render_expr(e),
        other => {
            let mut p = Printer::new();
            p.stmt(other);
            p.into_string().trim_end_matches([';', '\n']).to_owned()
        }
    }
}

#[must_use]
pub fn render_expr(e: &CExpr) -> String {
    match e {
        CExpr::IntLit(n) => n.to_string(),
        CExpr::StrLit(s) => format!("\"{}\"", escape_c_string(s)),
        CExpr::Ident(s) => s.clone(),
        CExpr::Unary(op, e) => format!("{}({})", unop_str(*op), render_expr(e)),
        CExpr::Binary(op, l, r) => {
            format!("({}) {} ({})", render_expr(l), binop_str(*op), render_expr(r))
        }
        CExpr::Ternary(c, t, f) => {
            format!("({}) ? ({}) : ({})", render_expr(c), render_expr(t), render_expr(f))
        }
        CExpr::Member(e, f) => format!("({}).{f}", render_expr(e)),
        CExpr::ArrowMember(e, f) => format!("({})->{f}", render_expr(e)),
        CExpr::Index(e, i) => format!("({})[{}]", render_expr(e), render_expr(i)),
        CExpr::Call(f, args) => {
            format!("{f}({})", args.iter().map(render_expr).collect::<Vec<_>>().join(", "))
        }
        CExpr::Cast(ty, e) => format!("(({ty}){})", render_expr(e)),
        CExpr::Assign(l, r) => format!("({}) = ({})", render_expr(l), render_expr(r)),
        CExpr::Comma(es) => es.iter().map(render_expr).collect::<Vec<_>>().join(", "),
        CExpr::Raw(s) => s.clone(),
    }
}

fn unop_str(op: CUnOp) -> &'static str {
    match op {
        CUnOp::Neg => "-",
        CUnOp::BitNot => "~",
        CUnOp::LNot => "!",
        CUnOp::Deref => "*",
        CUnOp::AddrOf => "&",
    }
}

fn binop_str(op: COp) -> &'static str {
    match op {
        COp::Add => "+",
        COp::Sub => "-",
        COp::Mul => "*",
        COp::Div => "/",
        COp::Mod => "%",
        COp::BitAnd => "&",
        COp::BitOr => "|",
        COp::BitXor => "^",
        COp::Shl => "<<",
        COp::Shr => ">>",
        COp::LAnd => "&&",
        COp::LOr => "||",
        COp::Lt => "<",
        COp::Le => "<=",
        COp::Gt => ">",
        COp::Ge => ">=",
        COp::Eq => "==",
        COp::Ne => "!=",
    }
}

pub(crate) fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_nesting_returns_to_zero_depth() {
        let mut p = Printer::new();
        p.stmt(&CStmt::Block(vec![CStmt::Expr(CExpr::IntLit(1))]));
        assert_eq!(p.depth(), 0);
        p.finish_section("test").unwrap();
    }
}
