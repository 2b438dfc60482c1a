pub mod definition;
pub mod error;
pub mod gate;
pub mod registry;
pub mod runner;
pub mod script;

pub use definition::{Directive, DirectiveFlags};
pub use error::{DiagnosticError, DirectiveError, ErrorKind, ScriptError};
pub use gate::call_directive;
pub use registry::DirectiveRegistry;
pub use runner::{ScriptObject, ScriptRun, run_script};
pub use script::Script;
