//! C expression IR.

/// A C binary operator, kept distinct from [`crate::types::ast::BinOp`]
/// because the IR also needs operators the script language doesn't
/// expose directly (pointer arithmetic, logical `&&`/`||` after
/// short-circuit lowering, C's `,`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum COp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    LAnd,
    LOr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CUnOp {
    Neg,
    BitNot,
    LNot,
    Deref,
    AddrOf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CExpr {
    IntLit(i64),
    /// A C string literal, already escaped.
    StrLit(String),
    /// A bare identifier: a context-struct field, a local, a global.
    Ident(String),
    Unary(CUnOp, Box<CExpr>),
    Binary(COp, Box<CExpr>, Box<CExpr>),
    Ternary(Box<CExpr>, Box<CExpr>, Box<CExpr>),
    Member(Box<CExpr>, String),
    ArrowMember(Box<CExpr>, String),
    Index(Box<CExpr>, Box<CExpr>),
    Call(String, Vec<CExpr>),
    Cast(String, Box<CExpr>),
    Assign(Box<CExpr>, Box<CExpr>),
    Comma(Vec<CExpr>),
    /// An already-rendered fragment, used for DWARF location
    /// translations (`crate::dwarf::loc2c`) and embedded-C expressions,
    /// which are strings by construction upstream.
    Raw(String),
}

impl CExpr {
    #[must_use]
    pub fn ident(s: impl Into<String>) -> Self {
        CExpr::Ident(s.into())
    }

    #[must_use]
    pub fn member(self, field: impl Into<String>) -> Self {
        CExpr::Member(Box::new(self), field.into())
    }

    #[must_use]
    pub fn arrow(self, field: impl Into<String>) -> Self {
        CExpr::ArrowMember(Box::new(self), field.into())
    }

    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<CExpr>) -> Self {
        CExpr::Call(name.into(), args)
    }

    #[must_use]
    pub fn bin(op: COp, l: CExpr, r: CExpr) -> Self {
        CExpr::Binary(op, Box::new(l), Box::new(r))
    }

    #[must_use]
    pub fn eq0(self) -> Self {
        CExpr::bin(COp::Eq, self, CExpr::IntLit(0))
    }
}
