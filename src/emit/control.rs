//! Control-flow lowering: if/for/foreach/try-catch.

use crate::emit::vars::LvalueMode;
use crate::emit::{assign, budget, vars, EmitCtx};
use crate::error::Result;
use crate::ir::expr::{COp, CExpr};
use crate::ir::stmt::CStmt;
use crate::types::ast::{Block, ForeachStmt, LValue, SortDir, Stmt, StatShape, VarId};
use crate::types::Idx;

pub fn emit_if(
    ctx: &mut EmitCtx<'_>,
    cond: &crate::types::ast::Expr,
    then_branch: &Block,
    else_branch: Option<&Block>,
) -> Result<CStmt> {
    let cond_expr = assign::lower_expr(ctx, cond)?;
    ctx.cursor.enter_child();
    let then_stmt = super::emit_block(ctx, then_branch)?;
    ctx.cursor.exit_child();
    let else_stmt = match else_branch {
        Some(b) => {
            ctx.cursor.enter_child();
            let s = super::emit_block(ctx, b)?;
            ctx.cursor.exit_child();
            Some(Box::new(s))
        }
        None => None,
    };
    Ok(CStmt::If { cond: cond_expr, then_branch: Box::new(then_stmt), else_branch: else_stmt })
}

pub fn emit_for(
    ctx: &mut EmitCtx<'_>,
    init: Option<&Stmt>,
    cond: Option<&crate::types::ast::Expr>,
    step: Option<&Stmt>,
    body: &Block,
) -> Result<CStmt> {
    let init_stmt = init.map(|s| super::emit_stmt(ctx, s)).transpose()?.map(Box::new);
    let cond_expr = cond.map(|c| assign::lower_expr(ctx, c)).transpose()?;
    let step_expr = match step.map(|s| super::emit_stmt(ctx, s)).transpose()? {
        Some(CStmt::Expr(e)) => Some(e),
        Some(other) => Some(CExpr::Raw(format!("{other:?}"))),
        None => None,
    };
    ctx.cursor.enter_child();
    let body_stmt = super::emit_block(ctx, body)?;
    ctx.cursor.exit_child();
    Ok(CStmt::For { init: init_stmt, cond: cond_expr, step: step_expr, body: Box::new(body_stmt) })
}

/// `try { body } catch (e) { catch_body }`: runtime errors inside `body`
/// set `c->errorcount`; the catch clause resets it to zero before running.
pub fn emit_try(
    ctx: &mut EmitCtx<'_>,
    body: &Block,
    _catch_var: Option<VarId>,
    catch_body: &Block,
) -> Result<CStmt> {
    ctx.cursor.enter_child();
    let body_stmt = super::emit_block(ctx, body)?;
    ctx.cursor.exit_child();
    ctx.cursor.enter_child();
    let catch_stmt = super::emit_block(ctx, catch_body)?;
    ctx.cursor.exit_child();
    Ok(CStmt::Block(vec![
        body_stmt,
        CStmt::If {
            cond: CExpr::bin(COp::Ne, crate::emit::context::field("errorcount"), CExpr::IntLit(0)),
            then_branch: Box::new(CStmt::Block(vec![
                CStmt::Expr(CExpr::Assign(
                    Box::new(crate::emit::context::field("errorcount")),
                    Box::new(CExpr::IntLit(0)),
                )),
                catch_stmt,
            ])),
            else_branch: None,
        },
    ]))
}

/// Map iteration over an array/pmap/histogram: the sort key
/// is encoded as `None` = declaration order, `Some(0)` = aggregate value,
/// `Some(n)` = key column `n`, descending negates the comparator.
fn sort_key_arg(f: &ForeachStmt) -> CExpr {
    match f.sort_key {
        None => CExpr::IntLit(-1),
        Some(n) => {
            let signed = if f.sort_dir == SortDir::Descending { -(i64::from(n) + 1) } else { i64::from(n) + 1 };
            CExpr::IntLit(signed)
        }
    }
}

/// Bucket count for a stats map's `@hist_linear`/`@hist_log` iteration,
/// looked up by matching the global's name against its `StatDecl` shape.
/// `0` means the shape can't produce a valid bucket range (e.g. a
/// zero/negative linear step), reported as a runtime error rather than
/// looping forever or indexing out of bounds.
fn hist_bucket_count(ctx: &EmitCtx<'_>, stat_var: VarId) -> i64 {
    let Some(name) = ctx.session.globals.get(stat_var.into_usize()).map(|v| v.name) else {
        return 0;
    };
    let Some(decl) = ctx.session.stats.iter().find(|s| s.name == name) else {
        return 0;
    };
    match decl.shape {
        StatShape::Plain => 0,
        StatShape::Linear { low, high, step } if step > 0 && high >= low => {
            (high - low) / step + 1
        }
        StatShape::Linear { .. } => 0,
        // A fixed bucket count matching the runtime's `_stp_stat_hist_log`
        // table size.
        StatShape::Logarithmic => 64,
    }
}

/// `foreach (bucket in @hist_linear(...))`/`@hist_log(...)`: the body walks
/// bucket indices `0..buckets` rather than map nodes, so it gets its own
/// loop shape instead of `emit_foreach`'s `_stp_map_start`/`_stp_map_iter_next`
/// pair.
fn emit_foreach_histogram(
    ctx: &mut EmitCtx<'_>,
    f: &ForeachStmt,
    stat_var: VarId,
) -> Result<CStmt> {
    let buckets = hist_bucket_count(ctx, stat_var);
    let mut setup = vec![CStmt::If {
        cond: CExpr::IntLit(buckets).eq0(),
        then_branch: Box::new(budget::error_stmt("histogram index out of range")),
        else_branch: None,
    }];

    let bucket_var = match f.key_vars.first() {
        Some(kv) => vars::lower_lvalue(ctx, &LValue::Var(*kv), LvalueMode::Write)?,
        None => {
            // No explicit bucket variable: the planner reserves this scope's
            // slots for the (unused, for a histogram) map iterator and the
            // key/aggregate slots `key_vars`/`hist_of` normally consume
            // through `resolve_var`, not through the cursor — so a fresh
            // counter-local temp is the honest declaration here rather than
            // borrowing one of those mistyped slots.
            let name = format!("__histbkt{}", ctx.guard_counter);
            ctx.guard_counter += 1;
            ctx.pending.push(CStmt::Decl { ty: "int64_t".into(), name: name.clone(), init: None });
            CExpr::ident(name)
        }
    };

    ctx.cursor.enter_child();
    let mut body_stmts = vec![budget::charge_iteration(ctx)];
    body_stmts.push(super::emit_block(ctx, &f.body)?);
    ctx.cursor.exit_child();

    setup.push(CStmt::For {
        init: Some(Box::new(CStmt::Expr(CExpr::Assign(
            Box::new(bucket_var.clone()),
            Box::new(CExpr::IntLit(0)),
        )))),
        cond: Some(CExpr::bin(COp::Lt, bucket_var.clone(), CExpr::IntLit(buckets))),
        step: Some(CExpr::Assign(
            Box::new(bucket_var.clone()),
            Box::new(CExpr::bin(COp::Add, bucket_var, CExpr::IntLit(1))),
        )),
        body: Box::new(CStmt::Block(body_stmts)),
    });
    Ok(CStmt::Block(setup))
}

pub fn emit_foreach(ctx: &mut EmitCtx<'_>, f: &ForeachStmt) -> Result<CStmt> {
    if let Some(stat_var) = f.hist_of {
        return emit_foreach_histogram(ctx, f, stat_var);
    }

    let array = vars::lower_lvalue(ctx, &LValue::Var(f.array), LvalueMode::Read)?;
    let mut setup = Vec::new();
    let is_pmap = ctx.session.globals.get(f.array.into_usize()).is_some_and(|v| v.is_pmap());
    if is_pmap {
        // A pmap is per-CPU until aggregated; iterating it without first
        // folding every CPU's copy into one map would only see whichever
        // CPU happens to run this statement.
        setup.push(CStmt::If {
            cond: CExpr::call("_stp_pmap_agg", vec![array.clone()]),
            then_branch: Box::new(budget::error_stmt("aggregation overflow")),
            else_branch: None,
        });
    }

    let iter_slot =
        ctx.cursor.next_slot().map(|s| s.name.clone()).unwrap_or_else(|| "it".to_owned());
    let limit_expr = f.limit.as_ref().map(|l| assign::lower_expr(ctx, l)).transpose()?;

    setup.push(CStmt::Decl {
        ty: "map_node_t*".into(),
        name: iter_slot.clone(),
        init: Some(CExpr::call(
            "_stp_map_start",
            vec![array.clone(), sort_key_arg(f)],
        )),
    });
    if let Some(limit) = &limit_expr {
        setup.push(CStmt::Decl {
            ty: "int64_t".into(),
            name: format!("{iter_slot}_limit"),
            init: Some(limit.clone()),
        });
    }

    ctx.cursor.enter_child();
    let mut body_stmts = vec![budget::charge_iteration(ctx)];
    for kv in &f.key_vars {
        let key_place = vars::lower_lvalue(ctx, &LValue::Var(*kv), LvalueMode::Write)?;
        body_stmts.push(CStmt::Expr(CExpr::Assign(
            Box::new(key_place),
            Box::new(CExpr::call("_stp_map_key", vec![CExpr::ident(iter_slot.clone())])),
        )));
    }
    body_stmts.push(super::emit_block(ctx, &f.body)?);
    if limit_expr.is_some() {
        body_stmts.push(CStmt::Expr(CExpr::Assign(
            Box::new(CExpr::ident(format!("{iter_slot}_limit"))),
            Box::new(CExpr::bin(
                COp::Sub,
                CExpr::ident(format!("{iter_slot}_limit")),
                CExpr::IntLit(1),
            )),
        )));
    }
    ctx.cursor.exit_child();

    let cond = if let Some(_) = &limit_expr {
        CExpr::bin(
            COp::LAnd,
            CExpr::ident(iter_slot.clone()).eq0().let_not(),
            CExpr::bin(
                COp::Gt,
                CExpr::ident(format!("{iter_slot}_limit")),
                CExpr::IntLit(0),
            ),
        )
    } else {
        CExpr::ident(iter_slot.clone()).eq0().let_not()
    };

    Ok(CStmt::Block(vec![
        CStmt::Block(setup),
        CStmt::While {
            cond,
            body: Box::new(CStmt::Block(vec![
                CStmt::Block(body_stmts),
                CStmt::Expr(CExpr::Assign(
                    Box::new(CExpr::ident(iter_slot.clone())),
                    Box::new(CExpr::call("_stp_map_iter_next", vec![CExpr::ident(iter_slot)])),
                )),
            ])),
        },
    ]))
}

trait NotExt {
    fn let_not(self) -> CExpr;
}

impl NotExt for CExpr {
    fn let_not(self) -> CExpr {
        CExpr::Unary(crate::ir::expr::CUnOp::LNot, Box::new(self))
    }
}
