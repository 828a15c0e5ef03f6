//! Global declaration emission: scalars, arrays/maps, per-CPU stats
//! (pmaps), and the rwlock each global carries.

use itertools::Itertools;

use crate::emit::{budget, EmitCtx};
use crate::error::{Result, TranslateError};
use crate::ir::expr::{CExpr, CUnOp};
use crate::ir::stmt::CStmt;
use crate::types::ast::{LValue, Type, VarDecl};

/// Whether an lvalue is being read or written. Array/map elements lower
/// very differently in the two cases: a read is a plain `map_get(...)`
/// call expression, but a write needs an addressable place, which means
/// going through a pointer-returning accessor and dereferencing it.
/// Plain variables lower the same way either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LvalueMode {
    Read,
    Write,
}

fn c_type(ty: Type) -> &'static str {
    match ty {
        Type::Long => "int64_t",
        Type::String => "string_t",
        Type::Stats => "Stat",
        Type::Unknown => "int64_t",
    }
}

/// `MAP_TYPE<key0,...,value>`, the generic map template instantiation
/// string used both to declare a global array and, deduplicated, to
/// declare the backing `struct map_info` only once per distinct key/value
/// shape.
#[must_use]
pub fn map_template_tuple(var: &VarDecl) -> String {
    let mut parts: Vec<&str> = var.index_types.iter().map(|t| c_type(*t)).collect();
    parts.push(c_type(var.ty));
    format!("MAP<{}>", parts.join(","))
}

/// Deduplicate map template instantiations across a whole global list,
/// returning the distinct tuples in first-seen order — the declarations
/// the driver actually needs to emit.
#[must_use]
pub fn distinct_map_templates(globals: &[VarDecl]) -> Vec<String> {
    globals
        .iter()
        .filter(|g| g.is_map() || g.is_pmap())
        .map(map_template_tuple)
        .unique()
        .collect()
}

/// One global's declaration: a scalar, a locked array/map, or a per-CPU
/// stats aggregate, each carrying its own `rwlock_t`.
#[must_use]
pub fn emit_global_decl(var: &VarDecl) -> CStmt {
    let ty_name = if var.is_map() {
        map_template_tuple(var)
    } else if var.is_pmap() {
        "PMAP".to_owned()
    } else {
        c_type(var.ty).to_owned()
    };
    CStmt::Block(vec![
        CStmt::Decl { ty: ty_name, name: format!("global_{}", var.name), init: None },
        CStmt::Decl {
            ty: "rwlock_t".into(),
            name: format!("global_{}_lock", var.name),
            init: None,
        },
    ])
}

fn global_ident(var_name: &str) -> CExpr {
    CExpr::ident(format!("global_{var_name}"))
}

/// Lower a read/write reference to a global or local, including map/array
/// indexing. Locals are plain context-struct fields resolved through the
/// slot cursor at the call site; globals index straight into
/// their backing structure.
///
/// A read is a direct `map_get(...)` call, valid anywhere an rvalue is
/// wanted. A write cannot use the same call: there is no `map_set`
/// counterpart, and a C function call is never a valid assignment target.
/// Instead, `LvalueMode::Write` reserves a pointer temp, initializes it
/// from a pointer-returning accessor (guarding the insert against
/// `MAXMAPENTRIES`, the way a real `mapvar` handle would), and hands back
/// a dereferenced pointer — which *is* a valid C lvalue — for the caller
/// to assign through.
pub fn lower_lvalue(ctx: &mut EmitCtx<'_>, lv: &LValue, mode: LvalueMode) -> Result<CExpr> {
    match lv {
        LValue::Var(id) => Ok(resolve_var(ctx, *id)),
        LValue::ArrayElem { array, indices } => {
            let base = resolve_var(ctx, *array);
            let mut idx_exprs = Vec::with_capacity(indices.len());
            for i in indices {
                idx_exprs.push(crate::emit::assign::lower_expr(ctx, i)?);
            }
            match mode {
                LvalueMode::Read => Ok(CExpr::Call(
                    "map_get".into(),
                    std::iter::once(base).chain(idx_exprs).collect(),
                )),
                LvalueMode::Write => lower_array_write(ctx, *array, base, idx_exprs),
            }
        }
    }
}

/// Build the pointer temp + overflow guard for an array/map write, the
/// `LvalueMode::Write` half of [`lower_lvalue`]. Hoisted statements land in
/// `ctx.pending`, drained by the enclosing `emit_stmt`.
fn lower_array_write(
    ctx: &mut EmitCtx<'_>,
    array: crate::types::ast::VarId,
    base: CExpr,
    idx_exprs: Vec<CExpr>,
) -> Result<CExpr> {
    use crate::types::Idx;
    let var = ctx.session.globals.get(array.into_usize());
    let elem_ty = var.map_or("int64_t", |v| c_type(v.ty));
    let maxn = var.map_or(ctx.session.max_map_entries_default, |v| {
        max_entries(v, ctx.session.max_map_entries_default)
    });

    ctx.guard_counter += 1;
    let ptr = format!("__mapptr{}", ctx.guard_counter);
    let mut args = Vec::with_capacity(idx_exprs.len() + 2);
    args.push(base);
    args.extend(idx_exprs);
    args.push(CExpr::IntLit(i64::from(maxn)));

    ctx.pending.push(CStmt::Decl {
        ty: format!("{elem_ty}*"),
        name: ptr.clone(),
        init: Some(CExpr::call("map_get_addr", args)),
    });
    ctx.pending.push(CStmt::If {
        cond: CExpr::ident(ptr.clone()).eq0(),
        then_branch: Box::new(budget::error_stmt(format!(
            "array overflow, check MAXMAPENTRIES ({maxn})"
        ))),
        else_branch: None,
    });
    Ok(CExpr::Unary(CUnOp::Deref, Box::new(CExpr::ident(ptr))))
}

fn resolve_var(ctx: &EmitCtx<'_>, id: crate::types::ast::VarId) -> CExpr {
    use crate::types::Idx;
    if let Some(g) = ctx.session.globals.get(id.into_usize()) {
        return global_ident(&g.name.to_string());
    }
    CExpr::ident(format!("l_{}", id.into_usize()))
}

pub fn lower_delete(ctx: &mut EmitCtx<'_>, lv: &LValue) -> Result<CExpr> {
    match lv {
        LValue::Var(id) => Ok(CExpr::call("map_clear", vec![resolve_var(ctx, *id)])),
        LValue::ArrayElem { array, indices } => {
            let base = resolve_var(ctx, *array);
            let mut idx_exprs = Vec::with_capacity(indices.len());
            for i in indices {
                idx_exprs.push(crate::emit::assign::lower_expr(ctx, i)?);
            }
            Ok(CExpr::Call(
                "map_delete".into(),
                std::iter::once(base).chain(idx_exprs).collect(),
            ))
        }
    }
}

/// `MAXMAPENTRIES` resolution for one global: its own override, or the
/// session default.
#[must_use]
pub fn max_entries(var: &VarDecl, session_default: u32) -> u32 {
    var.maxsize.unwrap_or(session_default)
}

pub(crate) fn type_error(token: &crate::types::ast::Token, expected: Type, found: Type) -> TranslateError {
    TranslateError::TypeMismatch { token: token.clone(), expected, found }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::intern;
    use crate::types::ast::{Token, VarDecl, VarId};
    use crate::types::Idx;
    use smallvec::smallvec;

    fn var(name: &str, index_types: &[Type], ty: Type) -> VarDecl {
        VarDecl {
            id: VarId::from_usize(0),
            name: intern(name),
            ty,
            index_types: index_types.iter().copied().collect::<smallvec::SmallVec<[Type; 2]>>(),
            is_global: true,
            initializer: None,
            wrap: false,
            maxsize: None,
            tok: Token::synthetic(name),
        }
    }

    #[test]
    fn identical_map_shapes_share_one_template() {
        let globals = vec![
            var("a", &[Type::Long], Type::Long),
            var("b", &[Type::Long], Type::Long),
            var("c", &[Type::String], Type::Long),
        ];
        let _ = smallvec![Type::Long]; // keep smallvec import used
        let distinct = distinct_map_templates(&globals);
        assert_eq!(distinct.len(), 2);
    }
}
