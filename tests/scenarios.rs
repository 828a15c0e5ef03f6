//! End-to-end coverage of the "Concrete scenarios": build a
//! small [`Session`] by hand (this crate has no parser of its own; a
//! session is its input contract) and drive it through
//! [`tapgen::driver::translate`].

use tapgen::compat::CompatVersion;
use tapgen::symbol::intern;
use tapgen::types::ast::*;
use tapgen::types::session::Session;
use tapgen::types::Idx;
use tapgen::unwind::frame::{synthesize_debug_frame_hdr, synthesized_len, FdeIndexEntry};

fn tok(text: &str) -> Token {
    Token::synthetic(text)
}

fn long_lit(n: i64) -> Expr {
    Expr { kind: ExprKind::LiteralLong(n), ty: Type::Long, tok: tok(&n.to_string()) }
}

/// Scenario 1: `global x = 3` plus `probe begin { x++; printf("%d\n", x); exit() }`.
#[test]
fn trivial_globals_round_trip_through_the_driver() {
    let mut session = Session::new();
    let x = VarId::from_usize(0);
    session.globals.push(VarDecl {
        id: x,
        name: intern("x"),
        ty: Type::Long,
        index_types: Default::default(),
        is_global: true,
        initializer: Some(long_lit(3)),
        wrap: false,
        maxsize: None,
        tok: tok("global x = 3"),
    });

    let incr = Expr {
        kind: ExprKind::IncDec(IncDec::PostInc, Box::new(LValue::Var(x))),
        ty: Type::Long,
        tok: tok("x++"),
    };
    let body = Block {
        stmts: vec![Stmt { kind: StmtKind::ExprStmt(incr), tok: tok("x++;") }],
    };
    session.probes.push(DerivedProbe {
        id: ProbeId::from_usize(0),
        name: intern("begin"),
        point: intern("begin"),
        derivation: intern("begin"),
        locals: vec![],
        body,
        needs_global_locks: true,
        required_privilege: Privilege::empty(),
        tok: tok("probe begin"),
    });

    let result = tapgen::driver::translate(&session, &[], &[]).expect("translation succeeds");
    assert!(result.module_c.contains("global_x"));
    assert!(result.module_c.contains("stap_probes"));
}

/// Scenario 2: a non-wrapped map with `MAXMAPENTRIES = 2` resolves its
/// effective cap from the per-global override, not the session default.
#[test]
fn map_overflow_uses_the_declared_maxsize_override() {
    use tapgen::emit::vars::max_entries;
    let var = VarDecl {
        id: VarId::from_usize(0),
        name: intern("m"),
        ty: Type::Long,
        index_types: smallvec::smallvec![Type::Long],
        is_global: true,
        initializer: None,
        wrap: false,
        maxsize: Some(2),
        tok: tok("global m[2]"),
    };
    assert_eq!(max_entries(&var, 2048), 2);
}

/// Scenario 4: unwind synthesis length formula and sort order, exercised
/// through the public API rather than the frame.rs unit tests directly.
#[test]
fn unwind_header_length_matches_entry_count() {
    let entries = vec![
        FdeIndexEntry { initial_location: 0x2000, fde_offset: 8 },
        FdeIndexEntry { initial_location: 0x1000, fde_offset: 0 },
    ];
    let hdr = synthesize_debug_frame_hdr(entries, true).unwrap();
    assert_eq!(hdr.len(), synthesized_len(2, true));
}

/// Scenario 5: two probes with identical bodies and the same
/// `needs_global_locks` collapse to one generated function, reached
/// through the full driver rather than `emit::dedup` directly.
#[test]
fn duplicate_probes_collapse_to_one_function_in_the_driver_output() {
    let mut session = Session::new();
    let body = || Block {
        stmts: vec![Stmt {
            kind: StmtKind::ExprStmt(long_lit(1)),
            tok: tok("1;"),
        }],
    };
    for i in 0..2 {
        session.probes.push(DerivedProbe {
            id: ProbeId::from_usize(i),
            name: intern(&format!("p{i}")),
            point: intern(&format!("kernel.function(\"f{i}\")")),
            derivation: intern("kernel.function"),
            locals: vec![],
            body: body(),
            needs_global_locks: false,
            required_privilege: Privilege::empty(),
            tok: tok("probe"),
        });
    }
    let result = tapgen::driver::translate(&session, &[], &[]).expect("translation succeeds");
    // Exactly one canonical probe function should be emitted even though
    // the probe table still lists two entries.
    let fn_count = result.module_c.matches("static int probe_").count();
    assert_eq!(fn_count, 1);
    let table_entries = result.module_c.matches(".point =").count();
    assert_eq!(table_entries, 2);
}

/// Scenario 6: MAXACTION exhaustion — a probe body that decrements the
/// action counter at every statement, guarded by the exact runtime error
/// string a module reports on exhaustion.
#[test]
fn every_emitted_statement_is_charged_against_the_action_budget() {
    let session = Session::new();
    let func = FunctionDecl {
        id: FuncId::from_usize(0),
        name: intern("f"),
        ty: Type::Long,
        formal_args: vec![],
        locals: vec![],
        body: Block {
            stmts: vec![
                Stmt { kind: StmtKind::ExprStmt(long_lit(1)), tok: tok("1;") },
                Stmt { kind: StmtKind::ExprStmt(long_lit(2)), tok: tok("2;") },
            ],
        },
        tok: tok("function f"),
    };
    let body = tapgen::emit::emit_function_body(&session, &func).expect("lowers");
    let rendered = format!("{body:?}");
    // One charge site per statement, each naming the exact runtime string
    // reported on exhaustion.
    assert_eq!(rendered.matches("MAXACTION exceeded").count(), 2);
    assert!(rendered.contains("_stp_dec_actioncount"));
}

/// Round-trip law: `"A.B"` parses to `(A<<8)+B` and back.
#[test]
fn compat_version_round_trips() {
    let v: CompatVersion = "2.6".parse().unwrap();
    assert_eq!(v.as_u16(), (2u16 << 8) + 6);
    assert_eq!(v.to_string(), "2.6");
}
