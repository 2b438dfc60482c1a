use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use valparam::ValParamList;

use crate::error::DirectiveError;
use crate::gate;

/// Argument requirements a directive declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DirectiveFlags(u32);

impl DirectiveFlags {
    /// No requirements.
    pub const ANY: DirectiveFlags = DirectiveFlags(0);
    /// At least one value/parameter must be present.
    pub const ARG_REQUIRED: DirectiveFlags = DirectiveFlags(1 << 0);
    /// The first value/parameter must carry an identifier.
    pub const ID_REQUIRED: DirectiveFlags = DirectiveFlags(1 << 1);

    const NAMED: [(&'static str, DirectiveFlags); 2] = [
        ("arg-required", DirectiveFlags::ARG_REQUIRED),
        ("id-required", DirectiveFlags::ID_REQUIRED),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: DirectiveFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: DirectiveFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Parse a flag by its script name (`any`, `arg-required`, `id-required`).
    pub fn from_name(name: &str) -> Option<DirectiveFlags> {
        if name == "any" {
            return Some(DirectiveFlags::ANY);
        }
        DirectiveFlags::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, flag)| *flag)
    }
}

impl BitOr for DirectiveFlags {
    type Output = DirectiveFlags;

    fn bitor(self, rhs: DirectiveFlags) -> DirectiveFlags {
        DirectiveFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirectiveFlags {
    fn bitor_assign(&mut self, rhs: DirectiveFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for DirectiveFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "any");
        }
        let names: Vec<&str> = DirectiveFlags::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Handler invoked once a directive's argument requirements are met:
/// `(object, valparams, objext_valparams, line)`.
pub type Handler<O> = Box<
    dyn Fn(&mut O, Option<&mut ValParamList>, Option<&mut ValParamList>, u64) -> Result<(), DirectiveError>,
>;

/// A directive: its name, what arguments it insists on, and the code that runs it.
pub struct Directive<O> {
    name: String,
    flags: DirectiveFlags,
    handler: Handler<O>,
}

impl<O> Directive<O> {
    pub fn new<F>(name: impl Into<String>, flags: DirectiveFlags, handler: F) -> Self
    where
        F: Fn(&mut O, Option<&mut ValParamList>, Option<&mut ValParamList>, u64) -> Result<(), DirectiveError>
            + 'static,
    {
        Directive {
            name: name.into(),
            flags,
            handler: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> DirectiveFlags {
        self.flags
    }

    /// Run the handler directly, skipping the argument checks.
    pub fn invoke(
        &self,
        object: &mut O,
        valparams: Option<&mut ValParamList>,
        objext_valparams: Option<&mut ValParamList>,
        line: u64,
    ) -> Result<(), DirectiveError> {
        (self.handler)(object, valparams, objext_valparams, line)
    }

    /// Check the argument requirements, then run the handler.
    pub fn call(
        &self,
        object: &mut O,
        valparams: Option<&mut ValParamList>,
        objext_valparams: Option<&mut ValParamList>,
        line: u64,
    ) -> Result<(), DirectiveError> {
        gate::call_directive(self, object, valparams, objext_valparams, line)
    }
}

impl<O> fmt::Debug for Directive<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directive")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
