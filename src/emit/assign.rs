//! Expression lowering: the canonical `L op R` shape every assignment
//! reduces to, plus the division/modulo and shift-count runtime guards.

use crate::emit::{budget, context, vars, EmitCtx};
use crate::error::{Result, TranslateError};
use crate::ir::expr::{COp, CUnOp, CExpr};
use crate::ir::stmt::CStmt;
use crate::types::ast::{
    AssignOp, BinOp, BinOpOrConcat, CmpOp, Expr, ExprKind, IncDec, LValue, LogicOp, Token, Type,
    UnOp,
};

fn binop(op: BinOp) -> COp {
    match op {
        BinOp::Add => COp::Add,
        BinOp::Sub => COp::Sub,
        BinOp::Mul => COp::Mul,
        BinOp::Div => COp::Div,
        BinOp::Mod => COp::Mod,
        BinOp::BitAnd => COp::BitAnd,
        BinOp::BitOr => COp::BitOr,
        BinOp::BitXor => COp::BitXor,
        BinOp::Shl => COp::Shl,
        BinOp::Shr => COp::Shr,
    }
}

fn cmpop(op: CmpOp) -> COp {
    match op {
        CmpOp::Lt => COp::Lt,
        CmpOp::Le => COp::Le,
        CmpOp::Gt => COp::Gt,
        CmpOp::Ge => COp::Ge,
        CmpOp::Eq => COp::Eq,
        CmpOp::Ne => COp::Ne,
    }
}

fn logicop(op: LogicOp) -> COp {
    match op {
        LogicOp::And => COp::LAnd,
        LogicOp::Or => COp::LOr,
    }
}

/// Division and modulo by a runtime-zero divisor abort the probe rather
/// than faulting the kernel. A C expression can't perform a `goto`, so
/// this hoists a real `if (r == 0) { ...; goto out; } else { tmp = l op r; }`
/// statement into `ctx.pending` (drained by the enclosing `emit_stmt`,
/// right before the statement that needed it) and hands back the temp
/// holding the result.
fn guard_div(ctx: &mut EmitCtx<'_>, op: COp, l: CExpr, r: CExpr, tok: &Token) -> CExpr {
    ctx.guard_counter += 1;
    let tmp = format!("__div{}", ctx.guard_counter);
    ctx.pending.push(CStmt::Decl { ty: "int64_t".into(), name: tmp.clone(), init: None });
    ctx.pending.push(CStmt::If {
        cond: r.clone().eq0(),
        then_branch: Box::new(CStmt::Block(vec![
            CStmt::Expr(CExpr::Assign(
                Box::new(context::field("last_stmt")),
                Box::new(CExpr::StrLit(tok.text.to_string())),
            )),
            budget::error_stmt("division by zero"),
        ])),
        else_branch: Some(Box::new(CStmt::Expr(CExpr::Assign(
            Box::new(CExpr::ident(tmp.clone())),
            Box::new(CExpr::bin(op, l, r)),
        )))),
    });
    CExpr::ident(tmp)
}

/// Write-mode lvalues come back as a dereferenced pointer temp
/// (`*__mapptrN`); a helper that needs the *address* of a place (to pass
/// to a mutate-through-pointer runtime call) should use the pointer
/// directly rather than re-taking the address of the dereference.
fn addr_of(place: CExpr) -> CExpr {
    match place {
        CExpr::Unary(CUnOp::Deref, inner) => *inner,
        other => CExpr::Unary(CUnOp::AddrOf, Box::new(other)),
    }
}

/// Shift counts outside `[0, 64)` are clamped rather than invoking C's
/// undefined behavior.
fn guard_shift(op: COp, l: CExpr, r: CExpr) -> CExpr {
    let clamped = CExpr::call("_stp_clamp_shift", vec![r]);
    CExpr::bin(op, l, clamped)
}

pub fn lower_expr(ctx: &mut EmitCtx<'_>, e: &Expr) -> Result<CExpr> {
    let expr = match &e.kind {
        ExprKind::LiteralLong(n) => CExpr::IntLit(*n),
        ExprKind::LiteralString(s) => CExpr::StrLit(s.to_string()),
        ExprKind::EmbeddedC(s) => CExpr::Raw(s.to_string()),
        ExprKind::Unary(op, inner) => lower_unary(ctx, *op, inner)?,
        ExprKind::Binary(op, l, r) => {
            let l = lower_expr(ctx, l)?;
            let r = lower_expr(ctx, r)?;
            match op {
                BinOp::Div | BinOp::Mod => guard_div(ctx, binop(*op), l, r, &e.tok),
                BinOp::Shl | BinOp::Shr => guard_shift(binop(*op), l, r),
                _ => CExpr::bin(binop(*op), l, r),
            }
        }
        ExprKind::Logical(op, l, r) => {
            CExpr::bin(logicop(*op), lower_expr(ctx, l)?, lower_expr(ctx, r)?)
        }
        ExprKind::Compare(op, l, r) => {
            CExpr::bin(cmpop(*op), lower_expr(ctx, l)?, lower_expr(ctx, r)?)
        }
        ExprKind::Concat(l, r) => {
            CExpr::call("_stp_string_concat", vec![lower_expr(ctx, l)?, lower_expr(ctx, r)?])
        }
        ExprKind::Ternary(c, t, f) => CExpr::Ternary(
            Box::new(lower_expr(ctx, c)?),
            Box::new(lower_expr(ctx, t)?),
            Box::new(lower_expr(ctx, f)?),
        ),
        ExprKind::Symbol(id) => vars::lower_lvalue(ctx, &LValue::Var(*id), vars::LvalueMode::Read)?,
        ExprKind::ArrayIndex { array, indices } => vars::lower_lvalue(
            ctx,
            &LValue::ArrayElem { array: *array, indices: indices.clone() },
            vars::LvalueMode::Read,
        )?,
        ExprKind::Call { func, args } => {
            let mut lowered = Vec::with_capacity(args.len());
            for a in args {
                lowered.push(lower_expr(ctx, a)?);
            }
            use crate::types::Idx;
            CExpr::Call(format!("function_{}", func.into_usize()), lowered)
        }
        ExprKind::PrintFormat(pf) => crate::emit::printf::lower(ctx, pf)?,
        ExprKind::StatOp(op, inner) => {
            let base = lower_expr(ctx, inner)?;
            CExpr::call(stat_op_fn(*op), vec![base])
        }
        ExprKind::HistOp(op, inner) => {
            let base = lower_expr(ctx, inner)?;
            let name = match op {
                crate::types::ast::HistOp::Linear => "_stp_stat_hist_linear",
                crate::types::ast::HistOp::Log => "_stp_stat_hist_log",
            };
            CExpr::call(name, vec![base])
        }
        ExprKind::IncDec(kind, lv) => lower_incdec(ctx, *kind, lv)?,
        ExprKind::Assign { op, lhs, rhs } => lower_assign(ctx, *op, lhs, rhs, e)?,
    };
    Ok(expr)
}

fn stat_op_fn(op: crate::types::ast::StatOp) -> &'static str {
    use crate::types::ast::StatOp;
    match op {
        StatOp::Count => "_stp_stat_get_count",
        StatOp::Sum => "_stp_stat_get_sum",
        StatOp::Min => "_stp_stat_get_min",
        StatOp::Max => "_stp_stat_get_max",
        StatOp::Avg => "_stp_stat_get_avg",
    }
}

fn lower_unary(ctx: &mut EmitCtx<'_>, op: UnOp, inner: &Expr) -> Result<CExpr> {
    let e = lower_expr(ctx, inner)?;
    Ok(match op {
        // `-INT64_MIN` overflows in plain two's-complement negation; route
        // through a helper that performs the wrap-safe cast instead.
        UnOp::Neg => CExpr::call("_stp_neg64", vec![e]),
        UnOp::BitNot => CExpr::Unary(CUnOp::BitNot, Box::new(e)),
        UnOp::Not => CExpr::Unary(CUnOp::LNot, Box::new(e)),
    })
}

fn lower_incdec(ctx: &mut EmitCtx<'_>, kind: IncDec, lv: &LValue) -> Result<CExpr> {
    let place = vars::lower_lvalue(ctx, lv, vars::LvalueMode::Write)?;
    let (delta, pre) = match kind {
        IncDec::PreInc => (1, true),
        IncDec::PreDec => (-1, true),
        IncDec::PostInc => (1, false),
        IncDec::PostDec => (-1, false),
    };
    let fname = if pre { "_stp_pre_incdec" } else { "_stp_post_incdec" };
    Ok(CExpr::call(fname, vec![addr_of(place), CExpr::IntLit(delta)]))
}

fn lower_assign(
    ctx: &mut EmitCtx<'_>,
    op: AssignOp,
    lhs: &LValue,
    rhs: &Expr,
    site: &Expr,
) -> Result<CExpr> {
    let place = vars::lower_lvalue(ctx, lhs, vars::LvalueMode::Write)?;
    let rhs_val = lower_expr(ctx, rhs)?;
    match op {
        AssignOp::Set => Ok(CExpr::Assign(Box::new(place), Box::new(rhs_val))),
        AssignOp::StatsInsert => {
            if rhs.ty != Type::Long {
                return Err(TranslateError::BadStatsInsert { token: site.tok.clone() });
            }
            Ok(CExpr::call("_stp_stat_add", vec![addr_of(place), rhs_val]))
        }
        AssignOp::Compound(BinOpOrConcat::Concat) => {
            if rhs.ty != Type::String {
                return Err(TranslateError::BadStringCompoundAssign {
                    token: site.tok.clone(),
                    op: ".=".into(),
                });
            }
            Ok(CExpr::Assign(
                Box::new(place.clone()),
                Box::new(CExpr::call("_stp_string_concat", vec![place, rhs_val])),
            ))
        }
        AssignOp::Compound(BinOpOrConcat::Bin(bop)) => {
            let combined = match bop {
                BinOp::Div | BinOp::Mod => guard_div(ctx, binop(bop), place.clone(), rhs_val, &site.tok),
                BinOp::Shl | BinOp::Shr => guard_shift(binop(bop), place.clone(), rhs_val),
                _ => CExpr::bin(binop(bop), place.clone(), rhs_val),
            };
            Ok(CExpr::Assign(Box::new(place), Box::new(combined)))
        }
    }
}
