//! Embedded-C blocks: emitted verbatim, with a privilege assertion
//! inserted ahead of them in unprivileged mode.

use crate::emit::EmitCtx;
use crate::ir::stmt::CStmt;
use crate::symbol::Symbol;

const UNPRIVILEGED_ASSERTION_MARKER: &str = "myproc-unprivileged";

/// Whether an embedded-C block carries the marker comment that lets it
/// run in unprivileged mode without the usual privilege gate.
#[must_use]
pub fn is_asserted_unprivileged(text: &str) -> bool {
    text.contains(UNPRIVILEGED_ASSERTION_MARKER)
}

pub fn emit(ctx: &mut EmitCtx<'_>, sym: Symbol) -> CStmt {
    let text = sym.to_string();
    let unprivileged = ctx.session.flags.contains(crate::types::session::Flags::UNPRIVILEGED);
    if unprivileged && !is_asserted_unprivileged(&text) {
        return CStmt::Block(vec![
            CStmt::Raw("c->last_error = \"embedded C requires elevated privilege\";".into()),
            CStmt::Goto("out".into()),
        ]);
    }
    CStmt::Raw(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_detected_anywhere_in_the_block() {
        assert!(is_asserted_unprivileged("/* myproc-unprivileged */\nint x = 1;"));
        assert!(!is_asserted_unprivileged("int x = 1;"));
    }
}
