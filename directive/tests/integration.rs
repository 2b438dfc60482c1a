use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use directive::{
    Directive, DirectiveError, DirectiveFlags, DirectiveRegistry, ErrorKind, Script, ScriptError,
    call_directive, run_script,
};
use valparam::{Expr, ValParam, ValParamList};

/// What a recording handler saw on each call.
#[derive(Debug, Clone, PartialEq)]
struct Seen {
    object: u32,
    valparams: String,
    objext: String,
    line: u64,
}

type Log = Rc<RefCell<Vec<Seen>>>;

fn recording(name: &str, flags: DirectiveFlags) -> (Directive<u32>, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let directive = Directive::new(name, flags, move |object: &mut u32, vps, ext, line| {
        sink.borrow_mut().push(Seen {
            object: *object,
            valparams: ValParamList::render(vps.as_deref()),
            objext: ValParamList::render(ext.as_deref()),
            line,
        });
        *object += 1;
        Ok(())
    });
    (directive, log)
}

fn run(source: &str) -> (String, directive::ScriptRun) {
    let script: Script = source.parse().expect("script failed to load");
    let mut output = Vec::new();
    let run = run_script(&script, &mut output, 0).expect("script failed to run");
    (String::from_utf8(output).unwrap(), run)
}

#[test]
fn arg_required_rejects_absent_list() {
    let (dir, log) = recording("section", DirectiveFlags::ARG_REQUIRED);
    let mut object = 0;
    let err = call_directive(&dir, &mut object, None, None, 4).unwrap_err();
    assert_eq!(
        err,
        DirectiveError::ArgumentRequired {
            directive: "section".into()
        }
    );
    assert_eq!(err.to_string(), "directive `section' requires an argument");
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert!(log.borrow().is_empty());
    assert_eq!(object, 0);
}

#[test]
fn arg_required_rejects_empty_list() {
    let (dir, log) = recording("section", DirectiveFlags::ARG_REQUIRED);
    let mut vps = ValParamList::new();
    let err = dir.call(&mut 0, Some(&mut vps), None, 1).unwrap_err();
    assert!(matches!(err, DirectiveError::ArgumentRequired { .. }));
    assert!(log.borrow().is_empty());
}

#[test]
fn id_required_also_requires_an_argument() {
    let (dir, log) = recording("global", DirectiveFlags::ID_REQUIRED);
    let err = dir.call(&mut 0, None, None, 1).unwrap_err();
    assert!(matches!(err, DirectiveError::ArgumentRequired { .. }));
    assert!(log.borrow().is_empty());
}

#[test]
fn id_required_rejects_expression_parameter() {
    let (dir, log) = recording("global", DirectiveFlags::ID_REQUIRED);
    let mut vps = ValParamList::new().with(ValParam::expr(Expr::int(1, 1)));
    let err = dir.call(&mut 0, Some(&mut vps), None, 9).unwrap_err();
    assert_eq!(
        err.to_string(),
        "directive `global' requires an identifier parameter"
    );
    assert!(log.borrow().is_empty());
    // the rejected list is left as it was
    assert!(vps.first().is_some_and(|vp| vp.param().is_some()));
}

#[test]
fn id_required_only_checks_first_entry() {
    let (dir, log) = recording("global", DirectiveFlags::ID_REQUIRED);
    let mut vps = ValParamList::new()
        .with(ValParam::id("start"))
        .with(ValParam::expr(Expr::int(1, 1)));
    dir.call(&mut 0, Some(&mut vps), None, 2).unwrap();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn satisfied_gate_invokes_handler_once_with_inputs() {
    let (dir, log) = recording(
        "section",
        DirectiveFlags::ARG_REQUIRED | DirectiveFlags::ID_REQUIRED,
    );
    let mut object = 41;
    let mut vps = ValParamList::new().with(ValParam::id(".text"));
    let mut ext = ValParamList::new().with(ValParam::new(Some("align".into()), Some(Expr::int(16, 3))));

    call_directive(&dir, &mut object, Some(&mut vps), Some(&mut ext), 3).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![Seen {
            object: 41,
            valparams: "(\".text\",(nil))".into(),
            objext: "(\"align\",16)".into(),
            line: 3,
        }]
    );
    assert_eq!(object, 42);
}

#[test]
fn no_requirements_accepts_anything() {
    let (dir, log) = recording("nop", DirectiveFlags::ANY);
    dir.call(&mut 0, None, None, 1).unwrap();
    dir.call(&mut 0, Some(&mut ValParamList::new()), None, 2).unwrap();
    dir.call(
        &mut 0,
        Some(&mut ValParamList::new().with(ValParam::default())),
        None,
        3,
    )
    .unwrap();

    let seen: Vec<String> = log.borrow().iter().map(|s| s.valparams.clone()).collect();
    assert_eq!(seen, vec!["(none)", "", "((nil),(nil))"]);
}

#[test]
fn handler_errors_pass_through() {
    let dir: Directive<()> = Directive::new("bits", DirectiveFlags::ARG_REQUIRED, |_, _, _, _| {
        Err(DirectiveError::handler("bits", ErrorKind::Value, "invalid argument"))
    });
    let mut vps = ValParamList::new().with(ValParam::expr(Expr::int(7, 1)));
    let err = dir.call(&mut (), Some(&mut vps), None, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert_eq!(err.to_string(), "bits: invalid argument");
}

#[test]
fn handler_may_take_expressions() {
    let dir: Directive<Vec<i64>> = Directive::new(
        "align",
        DirectiveFlags::ARG_REQUIRED,
        |object: &mut Vec<i64>, vps, _, _| {
            let value = vps
                .and_then(|vps| vps.first_mut())
                .and_then(|vp| vp.take_param())
                .and_then(|e| e.const_value())
                .ok_or_else(|| DirectiveError::handler("align", ErrorKind::Value, "not constant"))?;
            object.push(value);
            Ok(())
        },
    );
    let mut object = Vec::new();
    let mut vps = ValParamList::new().with(ValParam::expr(Expr::int(8, 1)));
    dir.call(&mut object, Some(&mut vps), None, 1).unwrap();
    assert_eq!(object, vec![8]);
    assert!(vps.first().is_some_and(|vp| vp.param().is_none()));
}

#[test]
fn flags_display_and_parse() {
    assert_eq!(DirectiveFlags::ANY.to_string(), "any");
    assert_eq!(
        (DirectiveFlags::ARG_REQUIRED | DirectiveFlags::ID_REQUIRED).to_string(),
        "arg-required|id-required"
    );
    assert_eq!(
        DirectiveFlags::from_name("id-required"),
        Some(DirectiveFlags::ID_REQUIRED)
    );
    assert_eq!(DirectiveFlags::from_name("any"), Some(DirectiveFlags::ANY));
    assert_eq!(DirectiveFlags::from_name("bogus"), None);
}

#[test]
fn registry_lookup_and_dispatch() {
    let mut registry = DirectiveRegistry::new();
    let (section, section_log) = recording("section", DirectiveFlags::ID_REQUIRED);
    let (global, _) = recording("global", DirectiveFlags::ID_REQUIRED);
    assert!(registry.register(section).is_none());
    assert!(registry.register(global).is_none());
    assert_eq!(registry.names(), vec!["global", "section"]);
    assert!(registry.get("SECTION").is_none());
    assert!(registry.get_entry("SECTION").is_some());

    let mut object = 0;
    let mut vps = ValParamList::new().with(ValParam::id(".data"));
    registry
        .dispatch("Section", &mut object, Some(&mut vps), None, 5)
        .unwrap();
    assert_eq!(section_log.borrow().len(), 1);

    let err = registry
        .dispatch("segment", &mut object, Some(&mut vps), None, 6)
        .unwrap_err();
    assert_eq!(err.to_string(), "unrecognized directive `segment'");
    assert_eq!(vps.len(), 1);
}

#[test]
fn registry_replaces_same_name() {
    let mut registry = DirectiveRegistry::new();
    let (first, _) = recording("bits", DirectiveFlags::ANY);
    let (second, _) = recording("bits", DirectiveFlags::ARG_REQUIRED);
    registry.register(first);
    let replaced = registry.register(second).expect("earlier directive returned");
    assert_eq!(replaced.flags(), DirectiveFlags::ANY);
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.get("bits").map(|d| d.flags()),
        Some(DirectiveFlags::ARG_REQUIRED)
    );
}

#[test]
fn registry_folded_lookup_prefers_first_registration() {
    for _ in 0..32 {
        let mut registry = DirectiveRegistry::new();
        let (lower, lower_log) = recording("bits", DirectiveFlags::ANY);
        let (upper, upper_log) = recording("BITS", DirectiveFlags::ARG_REQUIRED);
        registry.register(lower);
        registry.register(upper);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_entry("Bits").map(|d| d.name()), Some("bits"));
        assert_eq!(registry.get_entry("BITS").map(|d| d.name()), Some("BITS"));

        let mut object = 0;
        registry.dispatch("Bits", &mut object, None, None, 3).unwrap();
        assert_eq!(lower_log.borrow().len(), 1);
        assert!(upper_log.borrow().is_empty());
    }
}

#[test]
fn script_echoes_calls() {
    let (output, run) = run(r#"
[[directive]]
name = "section"
flags = ["id-required"]

[[call]]
name = "section"
params = [{ id = ".text" }, { expr = { add = [{ sym = "base" }, { int = 4 }] } }]
objext = [{ id = "align", expr = { int = 16 } }]
"#);
    assert_eq!(
        output,
        "section@7: (\".text\",(nil)),((nil),base+4) ; (\"align\",16)\n"
    );
    assert!(!run.has_errors());
    assert_eq!(run.handled, 1);
    assert_eq!(run.symtab.lookup("base").map(|s| s.use_lines().to_vec()), Some(vec![7]));
}

#[test]
fn script_distinguishes_absent_and_empty_lists() {
    let (output, run) = run(r#"
[[directive]]
name = "nop"

[[call]]
name = "nop"
line = 10

[[call]]
name = "nop"
line = 11
params = []
"#);
    assert_eq!(output, "nop@10: (none) ; (none)\nnop@11:  ; (none)\n");
    assert_eq!(run.handled, 2);
}

#[test]
fn script_reports_and_continues() {
    let (output, run) = run(r#"
[[directive]]
name = "global"
flags = ["id-required"]

[[call]]
name = "global"
params = [{ expr = { int = 1 } }]

[[call]]
name = "extern"
params = [{ id = "puts" }]

[[call]]
name = "global"

[[call]]
name = "global"
params = [{ id = "main" }]
"#);
    assert_eq!(output, "global@18: (\"main\",(nil)) ; (none)\n");
    assert_eq!(run.handled, 1);

    let messages: Vec<String> = run.diagnostics.iter().map(|d| d.to_string()).collect();
    assert_eq!(
        messages,
        vec![
            "directive `global' requires an identifier parameter",
            "unrecognized directive `extern'",
            "directive `global' requires an argument",
        ]
    );
    let lines: Vec<Option<u64>> = run.diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![Some(7), Some(11), Some(15)]);
    assert!(run.diagnostics.iter().all(|d| d.span.is_some()));
}

#[test]
fn script_resolve_converts_entries() {
    let (output, run) = run(r#"
[[directive]]
name = "extern"
flags = ["arg-required"]
resolve = true

[[call]]
name = "extern"
line = 3
params = [{ id = "puts" }, { expr = { neg = { int = 2 } } }, {}]
"#);
    assert_eq!(
        output,
        "extern@3: (\"puts\",(nil)),((nil),-2),((nil),(nil)) ; (none)\n  = puts\n  = -2\n"
    );
    assert_eq!(
        run.symtab.lookup("puts").map(|s| s.use_lines().to_vec()),
        Some(vec![3])
    );
}

#[test]
fn script_case_insensitive_symbols() {
    let (_, run) = run(r#"
case_insensitive = true

[[directive]]
name = "d"

[[call]]
name = "d"
params = [{ expr = { add = [{ sym = "Foo" }, { sym = "FOO" }] } }]
"#);
    assert_eq!(run.symtab.len(), 1);
}

#[test]
fn script_rejects_unknown_flag() {
    let err = "[[directive]]\nname = \"d\"\nflags = [\"required\"]\n"
        .parse::<Script>()
        .unwrap_err();
    assert!(matches!(err, ScriptError::UnknownFlag { ref flag, .. } if flag == "required"));
    assert_eq!(err.to_string(), "directive `d': unknown flag `required'");
}

#[test]
fn script_rejects_duplicate_directive() {
    let err = "[[directive]]\nname = \"d\"\n[[directive]]\nname = \"d\"\n"
        .parse::<Script>()
        .unwrap_err();
    assert!(matches!(err, ScriptError::DuplicateDirective { .. }));
}

#[test]
fn script_rejects_directives_differing_only_in_case() {
    let err = "[[directive]]\nname = \"bits\"\n\n[[directive]]\nname = \"BITS\"\nflags = [\"arg-required\"]\n"
        .parse::<Script>()
        .unwrap_err();
    assert!(matches!(err, ScriptError::DuplicateDirective { ref name, .. } if name == "BITS"));
    assert_eq!(err.to_string(), "directive `BITS' declared more than once");
    assert!(err.span().is_some());
}

#[test]
fn script_rejects_misspelled_call_field() {
    let err = "[[directive]]\nname = \"bits\"\n\n[[call]]\nname = \"bits\"\nparms = [{ expr = { int = 32 } }]\n"
        .parse::<Script>()
        .unwrap_err();
    assert!(matches!(err, ScriptError::Toml { .. }));
    assert!(err.to_string().contains("parms"));
}

#[test]
fn script_rejects_misspelled_directive_field() {
    let err = "[[directive]]\nname = \"bits\"\nflag = [\"arg-required\"]\n"
        .parse::<Script>()
        .unwrap_err();
    assert!(matches!(err, ScriptError::Toml { .. }));
}

#[test]
fn script_rejects_single_operand() {
    let err = "[[call]]\nname = \"d\"\nparams = [{ expr = { add = [{ int = 1 }] } }]\n"
        .parse::<Script>()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "call to `d': operator `+' needs at least two operands, got 1"
    );
}

#[test]
fn script_rejects_bad_toml() {
    let err = "[[call]]\nname = \n".parse::<Script>().unwrap_err();
    assert!(matches!(err, ScriptError::Toml { .. }));
    assert!(err.span().is_some());
}

#[test]
fn script_from_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("bits.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[[directive]]\nname = \"bits\"\nflags = [\"arg-required\"]\n").unwrap();
    writeln!(file, "[[call]]\nname = \"bits\"\nparams = [{{ expr = {{ int = 32 }} }}]").unwrap();
    drop(file);

    let script = Script::load(&path).expect("script loads");
    let mut output = Vec::new();
    let run = run_script(&script, &mut output, 0).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "bits@6: ((nil),32) ; (none)\n");
    assert!(!run.has_errors());
}

#[test]
fn script_missing_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let err = Script::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ScriptError::Io(_)));
}
