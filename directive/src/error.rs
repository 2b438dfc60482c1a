use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

/// Broad class of a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Value,
    General,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Syntax => write!(f, "syntax"),
            ErrorKind::Value => write!(f, "value"),
            ErrorKind::General => write!(f, "general"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveError {
    /// The directive needs at least one parameter and got none.
    ArgumentRequired { directive: String },
    /// The directive's first parameter must be an identifier.
    IdentifierRequired { directive: String },
    /// No directive with this name is registered.
    Unrecognized { name: String },
    /// Failure reported by a directive handler itself.
    Handler {
        directive: String,
        kind: ErrorKind,
        message: String,
    },
}

impl DirectiveError {
    pub fn handler(directive: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        DirectiveError::Handler {
            directive: directive.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DirectiveError::ArgumentRequired { .. }
            | DirectiveError::IdentifierRequired { .. }
            | DirectiveError::Unrecognized { .. } => ErrorKind::Syntax,
            DirectiveError::Handler { kind, .. } => *kind,
        }
    }
}

impl fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectiveError::ArgumentRequired { directive } => {
                write!(f, "directive `{}' requires an argument", directive)
            }
            DirectiveError::IdentifierRequired { directive } => {
                write!(f, "directive `{}' requires an identifier parameter", directive)
            }
            DirectiveError::Unrecognized { name } => {
                write!(f, "unrecognized directive `{}'", name)
            }
            DirectiveError::Handler {
                directive, message, ..
            } => write!(f, "{}: {}", directive, message),
        }
    }
}

impl std::error::Error for DirectiveError {}

/// A directive error enriched with source location information.
#[derive(Debug, Clone)]
pub struct DiagnosticError {
    pub error: DirectiveError,
    pub span: Option<Range<usize>>,
    pub source_id: usize,
    /// Line number the directive was invoked with.
    pub line: Option<u64>,
}

impl DiagnosticError {
    pub fn at(error: DirectiveError, span: Range<usize>, source_id: usize, line: u64) -> Self {
        DiagnosticError {
            error,
            span: Some(span),
            source_id,
            line: Some(line),
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let mut diagnostic = Diagnostic::new(Severity::Error)
            .with_message(self.error.to_string())
            .with_code(self.error.kind().to_string());
        if let Some(span) = &self.span {
            diagnostic = diagnostic.with_labels(vec![Label::primary(self.source_id, span.clone())]);
        }
        if let Some(line) = self.line {
            diagnostic = diagnostic.with_notes(vec![format!("directive invoked on line {}", line)]);
        }
        diagnostic
    }
}

impl From<DirectiveError> for DiagnosticError {
    fn from(error: DirectiveError) -> Self {
        DiagnosticError {
            error,
            span: None,
            source_id: 0,
            line: None,
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for DiagnosticError {}

/// Errors raised while loading or preparing a directive script.
#[derive(Debug, Clone)]
pub enum ScriptError {
    Io(String),
    Toml {
        message: String,
        span: Option<Range<usize>>,
    },
    UnknownFlag {
        directive: String,
        flag: String,
        span: Range<usize>,
    },
    DuplicateDirective {
        name: String,
        span: Range<usize>,
    },
    InvalidExpression {
        call: String,
        message: String,
        span: Range<usize>,
    },
}

impl ScriptError {
    pub fn span(&self) -> Option<&Range<usize>> {
        match self {
            ScriptError::Io(_) => None,
            ScriptError::Toml { span, .. } => span.as_ref(),
            ScriptError::UnknownFlag { span, .. }
            | ScriptError::DuplicateDirective { span, .. }
            | ScriptError::InvalidExpression { span, .. } => Some(span),
        }
    }

    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        let labels = self
            .span()
            .map(|span| vec![Label::primary(file_id, span.clone())])
            .unwrap_or_default();
        Diagnostic::new(Severity::Error)
            .with_message(self.to_string())
            .with_labels(labels)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Io(msg) => write!(f, "I/O error: {}", msg),
            ScriptError::Toml { message, .. } => write!(f, "invalid script: {}", message.trim_end()),
            ScriptError::UnknownFlag { directive, flag, .. } => {
                write!(f, "directive `{}': unknown flag `{}'", directive, flag)
            }
            ScriptError::DuplicateDirective { name, .. } => {
                write!(f, "directive `{}' declared more than once", name)
            }
            ScriptError::InvalidExpression { call, message, .. } => {
                write!(f, "call to `{}': {}", call, message)
            }
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<toml::de::Error> for ScriptError {
    fn from(error: toml::de::Error) -> Self {
        ScriptError::Toml {
            message: error.message().to_string(),
            span: error.span(),
        }
    }
}
