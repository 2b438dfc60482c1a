use std::io::Write;

use valparam::{SymbolTable, ValParamList};

use crate::definition::Directive;
use crate::error::{DiagnosticError, DirectiveError, ErrorKind, ScriptError};
use crate::registry::DirectiveRegistry;
use crate::script::Script;

/// The object handed to script directive handlers.
pub struct ScriptObject<'w> {
    pub symtab: SymbolTable,
    pub output: &'w mut dyn Write,
}

/// Outcome of running a script to completion.
#[derive(Debug)]
pub struct ScriptRun {
    /// Errors reported by the calls that failed, in call order.
    pub diagnostics: Vec<DiagnosticError>,
    pub symtab: SymbolTable,
    /// Number of calls whose handler ran successfully.
    pub handled: usize,
}

impl ScriptRun {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Build a registry of echoing handlers from the script's declarations.
pub fn build_registry<'w>(
    script: &Script,
) -> Result<DirectiveRegistry<ScriptObject<'w>>, ScriptError> {
    let mut registry: DirectiveRegistry<ScriptObject<'w>> = DirectiveRegistry::new();
    for decl in &script.directives {
        let name = decl.name().to_string();
        let resolve = decl.resolve;
        let handler_name = name.clone();
        registry.register(Directive::new(
            name,
            decl.directive_flags()?,
            move |object, valparams, objext_valparams, line| {
                echo(&handler_name, resolve, object, valparams, objext_valparams, line)
            },
        ));
    }
    Ok(registry)
}

/// Write `name@line: <valparams> ; <objext>` and, when `resolve` is set, one `  = expr`
/// line per entry that converts to an expression.
fn echo(
    name: &str,
    resolve: bool,
    object: &mut ScriptObject<'_>,
    valparams: Option<&mut ValParamList>,
    objext_valparams: Option<&mut ValParamList>,
    line: u64,
) -> Result<(), DirectiveError> {
    let io_error = |e: std::io::Error| DirectiveError::handler(name, ErrorKind::General, e.to_string());

    writeln!(
        object.output,
        "{}@{}: {} ; {}",
        name,
        line,
        ValParamList::render(valparams.as_deref()),
        ValParamList::render(objext_valparams.as_deref()),
    )
    .map_err(io_error)?;

    if resolve {
        if let Some(vps) = valparams {
            for vp in vps.iter_mut() {
                if let Some(expr) = vp.to_expr(&mut object.symtab, line) {
                    writeln!(object.output, "  = {}", expr).map_err(io_error)?;
                }
            }
        }
    }
    Ok(())
}

/// Run every call of the script in order against its declared directives.
///
/// A call that fails is recorded as a diagnostic and the run moves on to the next one.
pub fn run_script(
    script: &Script,
    output: &mut dyn Write,
    source_id: usize,
) -> Result<ScriptRun, ScriptError> {
    let registry = build_registry(script)?;
    let symtab = if script.case_insensitive {
        SymbolTable::case_insensitive()
    } else {
        SymbolTable::new()
    };
    let mut object = ScriptObject { symtab, output };
    let mut diagnostics = Vec::new();
    let mut handled = 0;

    for call in &script.calls {
        let line = call.line();
        let mut valparams = call.valparams(&mut object.symtab);
        let mut objext_valparams = call.objext_valparams(&mut object.symtab);

        match registry.dispatch(
            call.name(),
            &mut object,
            valparams.as_mut(),
            objext_valparams.as_mut(),
            line,
        ) {
            Ok(()) => handled += 1,
            Err(error) => {
                diagnostics.push(DiagnosticError::at(error, call.name.span(), source_id, line));
            }
        }
    }

    Ok(ScriptRun {
        diagnostics,
        symtab: object.symtab,
        handled,
    })
}
