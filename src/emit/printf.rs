//! Compiled `printf`/`print`/`println` lowering: each
//! distinct `(to_stream, format_string)` pair compiles to one specialized
//! emission function, keyed by content hash so repeated `stp_printf` call
//! sites share one emitted function instead of re-parsing the format
//! string at probe-fire time.

use std::hash::{Hash, Hasher};

use arrayvec::ArrayVec;

use crate::emit::{assign, EmitCtx};
use crate::error::{Result, TranslateError};
use crate::ir::expr::CExpr;
use crate::ir::stmt::CStmt;
use crate::symbol::Symbol;
use crate::types::ast::{PrintConv, PrintFormat, Width};

/// A `(to_stream, format)` pair stripped of its per-call-site argument
/// list — everything [`emit_compiled_fn`] needs to build one specialized
/// printer function, shared by every call site that prints the same format
/// string to the same stream.
#[derive(Debug, Clone)]
pub struct PrintSig {
    pub to_stream: bool,
    pub format: Symbol,
    pub conversions: Vec<PrintConv>,
}

impl From<&PrintFormat> for PrintSig {
    fn from(pf: &PrintFormat) -> Self {
        Self { to_stream: pf.to_stream, format: pf.format, conversions: pf.conversions.clone() }
    }
}

pub(crate) fn sig_fn_name(to_stream: bool, format: Symbol) -> String {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    to_stream.hash(&mut h);
    format.hash(&mut h);
    format!("_stp_compiled_print_{:016x}", h.finish())
}

pub const MAX_PRINT_ARGS: usize = 32;

/// `%m`/`%M` (errno text) conversions cap their precision at 1024 bytes;
/// anything larger is a translate-time error rather than a runtime
/// truncation.
const MAX_ERRNO_PRECISION: u32 = 1024;

fn conv_c_fn(c: char, legacy_pointer: bool) -> &'static str {
    match c {
        'd' | 'i' => "_stp_print_int64",
        'u' => "_stp_print_uint64",
        'x' => "_stp_print_hex64",
        'X' => "_stp_print_HEX64",
        'o' => "_stp_print_oct64",
        's' => "_stp_print_string",
        'c' => "_stp_print_char",
        'p' if legacy_pointer => "_stp_print_ptr_legacy",
        'p' => "_stp_print_ptr",
        'm' => "_stp_print_errno_name",
        'M' => "_stp_print_errno_text",
        'b' => "_stp_print_binary",
        _ => "_stp_print_int64",
    }
}

fn width_expr(w: &Option<Width>, dynamic_args: &mut std::vec::IntoIter<CExpr>) -> Option<CExpr> {
    match w {
        None => None,
        Some(Width::Static(n)) => Some(CExpr::IntLit(i64::from(*n))),
        Some(Width::Dynamic) => dynamic_args.next(),
    }
}

/// One specialized emission function per distinct `(to_stream,
/// format_string)` pair, named by content hash so two calls compiling the
/// same format string land on the same symbol without threading shared
/// state through every call site.
fn compiled_fn_name(pf: &PrintFormat) -> String {
    sig_fn_name(pf.to_stream, pf.format)
}

/// Lower one `printf`/`print`/`println` call. `print(x)`/`println(x)` with
/// a single `%s`-equivalent string argument collapse straight to
/// `_stp_print_string`, skipping the general conversion loop entirely.
pub fn lower(ctx: &mut EmitCtx<'_>, pf: &PrintFormat) -> Result<CExpr> {
    if pf.args.len() > MAX_PRINT_ARGS {
        return Err(TranslateError::TooManyPrintArgs {
            token: crate::types::ast::Token::synthetic("print"),
            count: pf.args.len(),
        });
    }

    if pf.conversions.len() == 1 && pf.conversions[0].spec == 's' && pf.args.len() == 1 {
        let arg = assign::lower_expr(ctx, &pf.args[0])?;
        return Ok(CExpr::call("_stp_print_string", vec![arg]));
    }

    for conv in &pf.conversions {
        if matches!(conv.spec, 'm' | 'M') {
            if let Some(Width::Static(p)) = conv.precision {
                if p > MAX_ERRNO_PRECISION {
                    return Err(TranslateError::TooManyPrintArgs {
                        token: crate::types::ast::Token::synthetic("print"),
                        count: p as usize,
                    });
                }
            }
        }
    }

    // `pf.args.len() <= MAX_PRINT_ARGS` was just checked above, so the
    // bound is a real invariant rather than a guess.
    let mut lowered_args: ArrayVec<CExpr, MAX_PRINT_ARGS> = ArrayVec::new();
    for a in &pf.args {
        lowered_args.push(assign::lower_expr(ctx, a)?);
    }
    let mut dynamic = lowered_args.to_vec().into_iter();

    let mut call_args = vec![CExpr::IntLit(i64::from(pf.to_stream))];
    let mut arg_cursor = lowered_args.to_vec().into_iter();
    for conv in &pf.conversions {
        if let Some(w) = width_expr(&conv.width, &mut dynamic) {
            call_args.push(w);
        }
        if let Some(p) = width_expr(&conv.precision, &mut dynamic) {
            call_args.push(p);
        }
        if let Some(next) = arg_cursor.next() {
            call_args.push(next);
        }
    }

    let fname = compiled_fn_name(pf);
    ctx.printf_sigs.push(PrintSig::from(pf));
    Ok(CExpr::call(fname, call_args))
}

/// The C type a conversion's value parameter takes in the specialized
/// printer function — matching what [`conv_c_fn`]'s underlying runtime
/// call expects.
fn conv_arg_c_type(spec: char) -> &'static str {
    match spec {
        's' => "string_t",
        'p' | 'b' => "void*",
        _ => "int64_t",
    }
}

/// Build the one specialized printer function a [`PrintSig`] compiles
/// down to. Parameters mirror `lower`'s `call_args` positionally: one
/// slot per present width/precision (the call site passes a literal for
/// a static one and a variable for a dynamic one, but either way it's one
/// argument) plus one value parameter per conversion, each dispatched to
/// the matching low-level `_stp_print_*` call in format order.
#[must_use]
pub fn emit_compiled_fn(sig: &PrintSig, legacy_pointer: bool) -> CStmt {
    let name = sig_fn_name(sig.to_stream, sig.format);
    let mut params = vec!["int to_stream".to_string()];
    let mut body = Vec::with_capacity(sig.conversions.len());
    let mut counter = 0u32;

    for conv in &sig.conversions {
        let mut call_args = vec![CExpr::ident("to_stream")];
        for w in [&conv.width, &conv.precision] {
            // Every present width/precision occupies one positional call
            // argument at the call site (`lower`'s `width_expr`), whether
            // its value is a compile-time literal or a dynamic `*` arg —
            // so the parameter list must reserve a slot either way.
            if w.is_some() {
                let pname = format!("dyn{counter}");
                counter += 1;
                params.push(format!("int64_t {pname}"));
                call_args.push(CExpr::ident(pname));
            }
        }
        let vname = format!("val{counter}");
        counter += 1;
        params.push(format!("{} {vname}", conv_arg_c_type(conv.spec)));
        call_args.push(CExpr::ident(vname));
        body.push(CStmt::Expr(CExpr::call(conv_c_fn(conv.spec, legacy_pointer), call_args)));
    }

    CStmt::Block(vec![
        CStmt::Raw(format!("static void {name}({})", params.join(", "))),
        CStmt::Raw("{".into()),
        CStmt::Block(body),
        CStmt::Raw("}".into()),
    ])
}

/// The specialized per-format emission functions this module compiles
/// down to, one per distinct conversion in the format string.
#[must_use]
pub fn conversion_fn_names(conversions: &[PrintConv], legacy_pointer: bool) -> Vec<&'static str> {
    conversions.iter().map(|c| conv_c_fn(c.spec, legacy_pointer)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_pointer_uses_the_pre_1_3_symbol() {
        assert_eq!(conv_c_fn('p', true), "_stp_print_ptr_legacy");
        assert_eq!(conv_c_fn('p', false), "_stp_print_ptr");
    }
}
