//! The elaborated AST the translator back end consumes.
//!
//! Every variant below is a direct transcription of the script language's
//! declaration and expression categories; nothing here performs inference
//! or validation — that already happened upstream. `mk_idx!` gives each
//! declaration kind its own index type so a `VarId` can never be confused
//! with a `FuncId`.

use smallvec::SmallVec;
use std::fmt;

use crate::mk_idx;
use crate::symbol::Symbol;

mk_idx!(
    /// Index of a `vardecl`, whether local or global.
    VarId
);
mk_idx!(
    /// Index of a `functiondecl`.
    FuncId
);
mk_idx!(
    /// Index of a `derived_probe`.
    ProbeId
);
mk_idx!(
    /// Index of a statistic declaration.
    StatId
);

/// Source location, carried on every AST node so diagnostics and
/// `last_stmt` strings can point back at the script.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub file: Symbol,
    pub line: u32,
    pub column: u32,
    /// The exact source text of the token, used verbatim as `c->last_stmt`.
    pub text: Symbol,
}

impl Token {
    #[must_use]
    pub fn synthetic(text: &str) -> Self {
        Self {
            file: crate::symbol::intern("<synthetic>"),
            line: 0,
            column: 0,
            text: crate::symbol::intern(text),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// The script language's closed type set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Long,
    String,
    Stats,
    Unknown,
}

/// Shape of a statistic declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatShape {
    /// count/sum/min/max/avg only, no histogram.
    Plain,
    Linear { low: i64, high: i64, step: i64 },
    Logarithmic,
}

#[derive(Debug, Clone)]
pub struct StatDecl {
    pub id: StatId,
    pub name: Symbol,
    pub shape: StatShape,
    pub tok: Token,
}

bitflags::bitflags! {
    /// Privilege bits a probe may require, and a loader's credential set
    /// is checked against.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Privilege: u32 {
        const STAPDEV    = 1 << 0;
        const STAPSYS    = 1 << 1;
        const STAPUSR    = 1 << 2;
        const STAPBASE   = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Which globals a probe needs locked, and how. This is
    /// the *declared* need; the emitter computes the concrete lock set
    /// per probe from the body (see `emit::locks`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LockNeeds: u8 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// A variable declaration.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub id: VarId,
    pub name: Symbol,
    pub ty: Type,
    /// Arity 0 = scalar; arity >= 1 = array/map, where `index_types[i]`
    /// is the key type of dimension `i`.
    pub index_types: SmallVec<[Type; 2]>,
    pub is_global: bool,
    pub initializer: Option<Expr>,
    /// Bounded + overwrite-oldest map.
    pub wrap: bool,
    /// `MAXMAPENTRIES` override, or `None` to use the session default.
    pub maxsize: Option<u32>,
    pub tok: Token,
}

impl VarDecl {
    #[must_use]
    pub fn arity(&self) -> usize {
        self.index_types.len()
    }

    /// A scalar, non-array global backed by a per-CPU stats aggregate
    /// rather than a plain typed value.
    #[must_use]
    pub fn is_pmap(&self) -> bool {
        self.is_global && self.arity() == 0 && self.ty == Type::Stats
    }

    #[must_use]
    pub fn is_map(&self) -> bool {
        self.is_global && self.arity() > 0
    }
}

#[derive(Debug, Clone)]
pub struct FormalArg {
    pub name: Symbol,
    pub ty: Type,
}

/// A function declaration.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub id: FuncId,
    pub name: Symbol,
    pub ty: Type,
    pub formal_args: Vec<FormalArg>,
    pub locals: Vec<VarDecl>,
    pub body: Block,
    pub tok: Token,
}

/// A derived probe.
#[derive(Debug, Clone)]
pub struct DerivedProbe {
    pub id: ProbeId,
    pub name: Symbol,
    /// The probe-point token as it appears in the script, e.g.
    /// `kernel.function("sys_open")`.
    pub point: Symbol,
    /// Free-form derivation trail, used verbatim in `stap_probes[]`.
    pub derivation: Symbol,
    pub locals: Vec<VarDecl>,
    pub body: Block,
    pub needs_global_locks: bool,
    pub required_privilege: Privilege,
    pub tok: Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    BitNot,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// Plain `=`.
    Set,
    /// Compound: `+= -= *= /= %= &= |= ^= <<= >>=` (long only) or `.=` (string).
    Compound(BinOpOrConcat),
    /// `<<<`, the stats-insertion operator.
    StatsInsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpOrConcat {
    Bin(BinOp),
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDec {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOp {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistOp {
    Linear,
    Log,
}

/// One `%`-conversion in a `print_format` argument list.
#[derive(Debug, Clone)]
pub struct PrintConv {
    pub spec: char,
    pub width: Option<Width>,
    pub precision: Option<Width>,
}

#[derive(Debug, Clone, Copy)]
pub enum Width {
    Static(u32),
    /// `*`: consumes the next argument as the width/precision.
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct PrintFormat {
    pub to_stream: bool,
    pub format: Symbol,
    pub conversions: Vec<PrintConv>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    LiteralLong(i64),
    LiteralString(Symbol),
    EmbeddedC(Symbol),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Logical(LogicOp, Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Concat(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Symbol(VarId),
    ArrayIndex { array: VarId, indices: Vec<Expr> },
    Call { func: FuncId, args: Vec<Expr> },
    PrintFormat(PrintFormat),
    StatOp(StatOp, Box<Expr>),
    HistOp(HistOp, Box<Expr>),
    IncDec(IncDec, Box<LValue>),
    Assign { op: AssignOp, lhs: Box<LValue>, rhs: Box<Expr> },
}

/// An addressable place: a bare variable or an array element.
#[derive(Debug, Clone)]
pub enum LValue {
    Var(VarId),
    ArrayElem { array: VarId, indices: Vec<Expr> },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub tok: Token,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Block),
    Try { body: Block, catch_var: Option<VarId>, catch_body: Block },
    ExprStmt(Expr),
    If { cond: Expr, then_branch: Block, else_branch: Option<Block> },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Box<Stmt>>, body: Block },
    Foreach(ForeachStmt),
    Return(Option<Expr>),
    Next,
    Break,
    Continue,
    Delete(LValue),
    Null,
    EmbeddedC(Symbol),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct ForeachStmt {
    pub iter_var: VarId,
    /// `None` for the bare array/pmap itself; `Some` when iterating the
    /// buckets of `@hist_linear`/`@hist_log` applied to a stats map.
    pub hist_of: Option<VarId>,
    pub array: VarId,
    pub key_vars: Vec<VarId>,
    pub limit: Option<Expr>,
    /// `None` = declaration order; `Some(0)` = sort by value (the
    /// aggregate's count column for a pmap); `Some(n)` = sort by key `n`.
    pub sort_key: Option<u32>,
    pub sort_dir: SortDir,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub tok: Token,
}
