use valparam::ValParamList;

use crate::definition::{Directive, DirectiveFlags};
use crate::error::DirectiveError;

/// Invoke a directive's handler once its argument requirements hold.
///
/// A directive that requires an argument or an identifier fails when `valparams` is
/// absent or empty; one that requires an identifier also fails when the first entry
/// has no `val`. On failure the handler is not called. Whatever the handler returns is
/// passed back unchanged.
pub fn call_directive<O>(
    directive: &Directive<O>,
    object: &mut O,
    valparams: Option<&mut ValParamList>,
    objext_valparams: Option<&mut ValParamList>,
    line: u64,
) -> Result<(), DirectiveError> {
    let flags = directive.flags();
    let first_has_id = valparams
        .as_deref()
        .and_then(|vps| vps.first())
        .map(|vp| vp.val().is_some());

    match first_has_id {
        None if flags.intersects(DirectiveFlags::ARG_REQUIRED | DirectiveFlags::ID_REQUIRED) => {
            log::debug!("line {}: `{}' rejected, no arguments", line, directive.name());
            return Err(DirectiveError::ArgumentRequired {
                directive: directive.name().to_string(),
            });
        }
        Some(false) if flags.contains(DirectiveFlags::ID_REQUIRED) => {
            log::debug!(
                "line {}: `{}' rejected, first argument is not an identifier",
                line,
                directive.name()
            );
            return Err(DirectiveError::IdentifierRequired {
                directive: directive.name().to_string(),
            });
        }
        _ => {}
    }

    log::debug!("line {}: dispatching `{}'", line, directive.name());
    directive.invoke(object, valparams, objext_valparams, line)
}
