//! C statement IR.

use crate::ir::expr::CExpr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CStmt {
    Expr(CExpr),
    /// `ty name [= init];`
    Decl { ty: String, name: String, init: Option<CExpr> },
    Block(Vec<CStmt>),
    If { cond: CExpr, then_branch: Box<CStmt>, else_branch: Option<Box<CStmt>> },
    For {
        init: Option<Box<CStmt>>,
        cond: Option<CExpr>,
        step: Option<CExpr>,
        body: Box<CStmt>,
    },
    While { cond: CExpr, body: Box<CStmt> },
    Label(String),
    Goto(String),
    Return(Option<CExpr>),
    Break,
    Continue,
    /// A verbatim fragment: embedded-C blocks, and anything pre-rendered
    /// by the DWARF location translator.
    Raw(String),
    /// A C comment, emitted as-is (used sparingly, matching the
    /// teacher's habit of one-line comments over prose blocks).
    Comment(String),
}

impl CStmt {
    #[must_use]
    pub fn block(stmts: Vec<CStmt>) -> Self {
        CStmt::Block(stmts)
    }

    #[must_use]
    pub fn expr(e: CExpr) -> Self {
        CStmt::Expr(e)
    }

    #[must_use]
    pub fn goto_out() -> Self {
        CStmt::Goto("out".to_owned())
    }
}
