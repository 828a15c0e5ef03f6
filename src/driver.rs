//! The translator driver: the fixed nine-step pass order that
//! turns a [`Session`] into the emitted C module text plus the unwind
//! header. Steps cannot be reordered; each one's output is asserted to
//! return the printer to zero indentation before the next begins.

use std::collections::HashSet;

use crate::emit::{self, context, dedup, locks, module, printf, vars};
use crate::error::Result;
use crate::ir::print::Printer;
use crate::ir::stmt::CStmt;
use crate::types::session::Session;
use crate::unwind::emit::emit_header as emit_unwind_header;
use crate::unwind::ModuleRecord;

/// The translator's complete output: the generated module's C text and
/// the symbol/unwind header text, emitted separately
/// since the runtime `#include`s the unwind header into the module.
pub struct Translation {
    pub module_c: String,
    pub unwind_h: String,
}

fn finish(p: &mut Printer, section: &'static str) -> Result<()> {
    log::info!("driver: finished section {section}");
    p.finish_section(section)
}

/// Run the fixed nine-step pass. `unwind_modules` is the
/// already-resolved set of [`ModuleRecord`]s the unwind/symbol dumper
/// built for every module the session named; `unresolved`
/// lists the ones that couldn't be opened, for the header's comment
/// trailer.
pub fn translate(
    session: &Session,
    unwind_modules: &[ModuleRecord],
    unresolved: &[String],
) -> Result<Translation> {
    let mut p = Printer::new();

    // Step 1: prepare symbol data. Library expansion and vDSO discovery
    // happen in `crate::dwarf::library` ahead of this call; by the time
    // the driver runs, `unwind_modules` already reflects that expansion.
    log::info!("driver: step 1 symbol data prepared ({} modules)", unwind_modules.len());

    // Step 2: common header.
    emit_common_header(&mut p, session)?;
    finish(&mut p, "common header")?;

    // The lock-set analysis is pure data (no printed output of its own),
    // but global storage needs its skip counters, so it's computed here
    // rather than down at its historical step 5 — the nine *printed*
    // sections stay in the documented order either way.
    let lock_needs: Vec<_> = session.probes.iter().map(locks::probe_lock_needs).collect();
    let skip_report = locks::build_skip_report(&lock_needs);

    // Step 3: global storage struct + static initializers.
    emit_global_storage(&mut p, session, &skip_report)?;
    finish(&mut p, "global storage")?;

    // Step 4: function signatures, then bodies.
    let mut function_bodies = Vec::with_capacity(session.functions.len());
    let mut printf_sigs = Vec::new();
    for func in &session.functions {
        let (struct_decl, body, sigs) = emit::emit_function_body(session, func)?;
        printf_sigs.extend(sigs);
        function_bodies.push((func, struct_decl, body));
    }
    for (func, struct_decl, _) in &function_bodies {
        p.stmt(struct_decl);
        p.raw_line(&format!(
            "static int function_{}(struct {} *c);",
            func.name,
            context::struct_name(&format!("fn_{}", func.name))
        ));
    }
    for (func, _, body) in &function_bodies {
        p.raw_line(&format!(
            "static int function_{}(struct {} *c) {{",
            func.name,
            context::struct_name(&format!("fn_{}", func.name))
        ));
        p.stmt(body);
        p.raw_line("}");
    }
    finish(&mut p, "functions")?;

    log::info!("driver: step 5 computed lock sets for {} probes", lock_needs.len());

    // Step 6: probes with duplicate elision.
    let mut probe_bodies = Vec::with_capacity(session.probes.len());
    for (probe, needs) in session.probes.iter().zip(&lock_needs) {
        let (struct_decl, body, sigs) = emit::emit_probe_body(session, probe, needs)?;
        printf_sigs.extend(sigs);
        probe_bodies.push((probe.id, probe.needs_global_locks && !needs.is_empty(), struct_decl, body));
    }
    let dedup_input: Vec<_> =
        probe_bodies.iter().map(|(id, needs_lock, _, body)| (*id, *needs_lock, body.clone())).collect();
    let groups = dedup::group_duplicates(&dedup_input);
    let canonical = dedup::canonical_mask(&groups, session.probes.len());
    let mut emitted = bit_set::BitSet::with_capacity(session.probes.len());

    // The specialized printer functions every `_stp_compiled_print_<hash>`
    // call site above (in both functions and probes) resolves to, one
    // definition per distinct `(to_stream, format)` pair.
    let legacy_pointer = session
        .compat_version
        .map(crate::compat::CompatVersion::needs_legacy_pointer_format)
        .unwrap_or(false);
    let mut seen_printf = HashSet::new();
    for sig in &printf_sigs {
        if seen_printf.insert((sig.to_stream, sig.format)) {
            p.stmt(&printf::emit_compiled_fn(sig, legacy_pointer));
        }
    }

    for group in groups.values() {
        use crate::types::Idx;
        let idx = group[0].into_usize();
        if !canonical.contains(idx) || !emitted.insert(idx) {
            continue;
        }
        let name = dedup::canonical_function_name(group);
        let (_, _, struct_decl, body) =
            probe_bodies.iter().find(|(id, _, _, _)| *id == group[0]).expect("canonical probe present");
        p.stmt(struct_decl);
        p.raw_line(&format!(
            "static int {name}(struct {} *c) {{",
            context::struct_name(&format!("probe_{idx}"))
        ));
        p.stmt(body);
        p.raw_line("}");
    }
    finish(&mut p, "probes")?;

    // Step 7: stap_probes[] table.
    emit_probe_table(&mut p, session, &groups)?;
    finish(&mut p, "probe table")?;

    // Step 8: init/refresh/exit and module metadata.
    emit_module_scaffolding(&mut p, session, &skip_report)?;
    finish(&mut p, "module scaffolding")?;

    // Step 9: symbol/unwind header.
    let unwind_h = emit_unwind_header(unwind_modules, unresolved);
    log::info!("driver: step 9 emitted unwind header for {} modules", unwind_modules.len());

    Ok(Translation { module_c: p.into_string(), unwind_h })
}

fn emit_common_header(p: &mut Printer, session: &Session) -> Result<()> {
    p.raw_line("#include <linux/module.h>");
    p.raw_line("#include \"stap-symbols.h\"");
    for tmpl in vars::distinct_map_templates(&session.globals) {
        p.raw_line(&format!("/* map template: {tmpl} */"));
    }
    p.raw_line(&format!("#define MAXNESTING {}", session.max_nesting));
    p.raw_line(&format!("#define MAXACTION {}", session.max_action));
    if let Some(v) = session.compat_version {
        p.raw_line(&format!("/* compiled for stap compat {} */", v.as_u16()));
    }
    Ok(())
}

fn emit_global_storage(p: &mut Printer, session: &Session, skip_report: &locks::SkipReport) -> Result<()> {
    // Top-level initializers never reference temp slots, so an empty plan
    // is enough to satisfy `EmitCtx`'s cursor.
    let empty_plan = crate::plan::Plan::default();
    for g in &session.globals {
        p.stmt(&vars::emit_global_decl(g));
        if let Some(init) = &g.initializer {
            if g.arity() == 0 {
                let mut ctx = crate::emit::EmitCtx {
                    session,
                    cursor: crate::plan::PlanCursor::new(&empty_plan),
                    budget: crate::emit::budget::Budget::new(),
                    pending: Vec::new(),
                    guard_counter: 0,
                    printf_sigs: Vec::new(),
                };
                let init_expr = crate::emit::assign::lower_expr(&mut ctx, init)?;
                for stmt in std::mem::take(&mut ctx.pending) {
                    p.stmt(&stmt);
                }
                let assign = crate::ir::expr::CExpr::Assign(
                    Box::new(crate::ir::expr::CExpr::ident(format!("global_{}", g.name))),
                    Box::new(init_expr),
                );
                p.stmt(&CStmt::Expr(assign));
            }
        }
    }
    if session.flags.contains(crate::types::session::Flags::TIMING) {
        for stmt in crate::emit::timing::emit_timing_counters(session, session.probes.len()) {
            p.stmt(&stmt);
        }
    }
    for stmt in locks::emit_skip_counters(session, skip_report) {
        p.stmt(&stmt);
    }
    Ok(())
}

fn emit_probe_table(
    p: &mut Printer,
    session: &Session,
    groups: &std::collections::HashMap<dedup::DupeKey, Vec<crate::types::ast::ProbeId>>,
) -> Result<()> {
    use crate::types::Idx;
    let mut canonical_of = std::collections::HashMap::new();
    for group in groups.values() {
        let name = dedup::canonical_function_name(group);
        for id in group {
            canonical_of.insert(*id, name.clone());
        }
    }
    p.raw_line("static struct stap_probe stap_probes[] = {");
    for probe in &session.probes {
        let func = canonical_of.get(&probe.id).cloned().unwrap_or_else(|| format!("probe_{}", probe.id.into_usize()));
        p.raw_line(&format!(
            "  {{ .point = \"{}\", .name = \"{}\", .location = \"{}\", .derivation = \"{}\", .ph = &{} }},",
            probe.point, probe.name, probe.tok, probe.derivation, func
        ));
    }
    p.raw_line("};");
    Ok(())
}

fn emit_module_scaffolding(p: &mut Printer, session: &Session, skip_report: &locks::SkipReport) -> Result<()> {
    for stmt in module::emit_module_params(&session.globals) {
        p.stmt(&stmt);
    }
    for stmt in module::emit_module_info(session) {
        p.stmt(&stmt);
    }
    p.raw_line("MODULE_LICENSE(\"GPL\");");
    p.stmt(&module::emit_init(session, vec![]));
    p.stmt(&module::emit_exit(session, vec![], skip_report));
    Ok(())
}
