//! Temp-variable planner.
//!
//! A shadow walker over a function/probe body that pre-reserves frame
//! slots for intermediates before the emitter runs, so the per-probe and
//! per-function context struct has exactly the right layout. There is a
//! single planning walk ([`plan_block`]) that returns a [`Plan`] tree,
//! and the emitter (`crate::emit`) only ever *consumes* that tree through
//! a [`PlanCursor`] — it never re-derives slot names by walking the AST a
//! second time, so staying in lockstep is a structural guarantee rather
//! than a convention two code paths have to keep in sync by hand.

use crate::types::ast::{Block, Expr, ExprKind, ForeachStmt, Stmt, StmtKind, Type};

/// One reserved frame slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub c_type: &'static str,
}

/// One nesting level of the anonymous-union overlay: slots reserved
/// directly by statements at this level share one union; nested statements get disjoint overlays,
/// recorded as `children`.
#[derive(Debug, Clone, Default)]
pub struct ScopeUnion {
    pub slots: Vec<Slot>,
    pub children: Vec<ScopeUnion>,
}

impl ScopeUnion {
    /// Whether this union (and therefore its struct/union braces) has
    /// anything to emit at all. The planner "must emit the struct/union
    /// opening and closing only when at least one slot was reserved
    /// inside" — this is exactly that check, applied
    /// recursively.
    #[must_use]
    pub fn is_empty_recursive(&self) -> bool {
        self.slots.is_empty() && self.children.iter().all(ScopeUnion::is_empty_recursive)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub root: ScopeUnion,
}

/// A read cursor over an already-built [`Plan`], used by the emitter to
/// pull slot names in the same order the planner reserved them. Walking
/// the cursor out of order relative to the original AST traversal is a
/// programmer error in the emitter, not something this type can prevent
/// on its own — hence the contract note on the module doc comment.
pub struct PlanCursor<'p> {
    stack: Vec<(&'p ScopeUnion, usize, usize)>,
}

impl<'p> PlanCursor<'p> {
    #[must_use]
    pub fn new(plan: &'p Plan) -> Self {
        Self { stack: vec![(&plan.root, 0, 0)] }
    }

    /// Consume the next slot reserved at the current nesting level.
    pub fn next_slot(&mut self) -> Option<&'p Slot> {
        let (scope, idx, _) = self.stack.last_mut()?;
        if *idx < scope.slots.len() {
            let s = &scope.slots[*idx];
            *idx += 1;
            Some(s)
        } else {
            None
        }
    }

    /// Enter the next nested (disjoint) scope, e.g. on descending into a
    /// loop/if/try body.
    pub fn enter_child(&mut self) {
        let (scope, _, child_idx) = self.stack.last_mut().expect("cursor stack underflow");
        let child = &scope.children[*child_idx];
        *child_idx += 1;
        self.stack.push((child, 0, 0));
    }

    pub fn exit_child(&mut self) {
        self.stack.pop();
    }
}

struct Planner {
    counter: u32,
}

impl Planner {
    fn fresh(&mut self, c_type: &'static str) -> Slot {
        let name = format!("tmp{}", self.counter);
        self.counter += 1;
        Slot { name, c_type }
    }
}

fn c_type_of(ty: Type) -> &'static str {
    match ty {
        Type::Long => "int64_t",
        Type::String => "string_t",
        Type::Stats => "Stat",
        Type::Unknown => "int64_t",
    }
}

/// Plan one function or probe body.
#[must_use]
pub fn plan_block(body: &Block) -> Plan {
    let mut p = Planner { counter: 0 };
    Plan { root: plan_block_inner(&mut p, body) }
}

fn plan_block_inner(p: &mut Planner, body: &Block) -> ScopeUnion {
    let mut scope = ScopeUnion::default();
    for stmt in &body.stmts {
        plan_stmt(p, stmt, &mut scope);
    }
    scope
}

fn plan_stmt(p: &mut Planner, stmt: &Stmt, scope: &mut ScopeUnion) {
    match &stmt.kind {
        StmtKind::Block(b) => scope.children.push(plan_block_inner(p, b)),
        StmtKind::Try { body, catch_body, .. } => {
            scope.children.push(plan_block_inner(p, body));
            scope.children.push(plan_block_inner(p, catch_body));
        }
        StmtKind::ExprStmt(e) => plan_expr(p, e, scope),
        StmtKind::If { cond, then_branch, else_branch } => {
            plan_expr(p, cond, scope);
            scope.children.push(plan_block_inner(p, then_branch));
            if let Some(e) = else_branch {
                scope.children.push(plan_block_inner(p, e));
            }
        }
        StmtKind::For { init, cond, step, body } => {
            if let Some(s) = init {
                plan_stmt(p, s, scope);
            }
            if let Some(c) = cond {
                plan_expr(p, c, scope);
            }
            if let Some(s) = step {
                plan_stmt(p, s, scope);
            }
            scope.children.push(plan_block_inner(p, body));
        }
        StmtKind::Foreach(f) => plan_foreach(p, f, scope),
        StmtKind::Return(Some(e)) => plan_expr(p, e, scope),
        StmtKind::Delete(_) => {}
        StmtKind::Return(None)
        | StmtKind::Next
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Null
        | StmtKind::EmbeddedC(_) => {}
    }
}

fn plan_foreach(p: &mut Planner, f: &ForeachStmt, scope: &mut ScopeUnion) {
    // The iterator itself always gets a slot.
    scope.slots.push(p.fresh("map_node_t*"));
    if let Some(limit) = &f.limit {
        plan_expr(p, limit, scope);
    }
    // Histogram-of-stats-map foreach additionally needs key slots and an
    // aggregate pointer slot.
    if f.hist_of.is_some() {
        for _ in &f.key_vars {
            scope.slots.push(p.fresh("int64_t"));
        }
        scope.slots.push(p.fresh("Stat*"));
    }
    scope.children.push(plan_block_inner(p, &f.body));
}

fn plan_expr(p: &mut Planner, e: &Expr, scope: &mut ScopeUnion) {
    if materializes(e) {
        scope.slots.push(p.fresh(c_type_of(e.ty)));
    }
    for child in subexprs(e) {
        plan_expr(p, child, scope);
    }
}

/// Whether evaluating `e` needs a slot to hold its result: every
/// expression that materializes a non-trivial
/// binary/comparison/concat/assignment/array-access/stat-op/print
/// result does.
fn materializes(e: &Expr) -> bool {
    matches!(
        e.kind,
        ExprKind::Binary(..)
            | ExprKind::Compare(..)
            | ExprKind::Concat(..)
            | ExprKind::Assign { .. }
            | ExprKind::ArrayIndex { .. }
            | ExprKind::StatOp(..)
            | ExprKind::PrintFormat(..)
    )
}

fn subexprs(e: &Expr) -> Vec<&Expr> {
    match &e.kind {
        ExprKind::Unary(_, a) | ExprKind::StatOp(_, a) | ExprKind::HistOp(_, a) => vec![a],
        ExprKind::Binary(_, a, b)
        | ExprKind::Logical(_, a, b)
        | ExprKind::Compare(_, a, b)
        | ExprKind::Concat(a, b) => vec![a, b],
        ExprKind::Ternary(a, b, c) => vec![a, b, c],
        ExprKind::ArrayIndex { indices, .. } => indices.iter().collect(),
        ExprKind::Call { args, .. } => args.iter().collect(),
        ExprKind::PrintFormat(pf) => pf.args.iter().collect(),
        ExprKind::Assign { rhs, lhs, .. } => {
            let mut v = vec![rhs.as_ref()];
            if let crate::types::ast::LValue::ArrayElem { indices, .. } = lhs.as_ref() {
                v.extend(indices.iter());
            }
            v
        }
        ExprKind::IncDec(_, lv) => {
            if let crate::types::ast::LValue::ArrayElem { indices, .. } = lv.as_ref() {
                indices.iter().collect()
            } else {
                vec![]
            }
        }
        ExprKind::LiteralLong(_) | ExprKind::LiteralString(_) | ExprKind::EmbeddedC(_) | ExprKind::Symbol(_) => {
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ast::*;

    fn tok() -> Token {
        Token::synthetic("t")
    }

    fn long_lit(n: i64) -> Expr {
        Expr { kind: ExprKind::LiteralLong(n), ty: Type::Long, tok: tok() }
    }

    #[test]
    fn binary_expr_reserves_one_slot() {
        let e = Expr {
            kind: ExprKind::Binary(BinOp::Add, Box::new(long_lit(1)), Box::new(long_lit(2))),
            ty: Type::Long,
            tok: tok(),
        };
        let body = Block { stmts: vec![Stmt { kind: StmtKind::ExprStmt(e), tok: tok() }] };
        let plan = plan_block(&body);
        assert_eq!(plan.root.slots.len(), 1);
        assert_eq!(plan.root.slots[0].name, "tmp0");
    }

    #[test]
    fn empty_block_has_no_slots_and_reports_empty() {
        let body = Block::default();
        let plan = plan_block(&body);
        assert!(plan.root.is_empty_recursive());
    }

    #[test]
    fn nested_if_gets_a_disjoint_child_scope() {
        let cond = Expr { kind: ExprKind::LiteralLong(1), ty: Type::Long, tok: tok() };
        let inner = Expr {
            kind: ExprKind::Binary(BinOp::Add, Box::new(long_lit(1)), Box::new(long_lit(2))),
            ty: Type::Long,
            tok: tok(),
        };
        let then_branch =
            Block { stmts: vec![Stmt { kind: StmtKind::ExprStmt(inner), tok: tok() }] };
        let body = Block {
            stmts: vec![Stmt {
                kind: StmtKind::If { cond, then_branch, else_branch: None },
                tok: tok(),
            }],
        };
        let plan = plan_block(&body);
        assert!(plan.root.slots.is_empty());
        assert_eq!(plan.root.children.len(), 1);
        assert_eq!(plan.root.children[0].slots.len(), 1);
    }
}
