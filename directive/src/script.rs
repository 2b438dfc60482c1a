//! Directive scripts: TOML documents declaring directives and the already-structured
//! calls to run against them.
//!
//! ```toml
//! [[directive]]
//! name = "section"
//! flags = ["id-required"]
//!
//! [[call]]
//! name = "section"
//! params = [{ id = ".text" }, { expr = { add = [{ sym = "base" }, { int = 4 }] } }]
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use toml::Spanned;

use valparam::{Expr, ExprTerm, Operator, SymbolTable, ValParam, ValParamList};

use crate::definition::DirectiveFlags;
use crate::error::ScriptError;

#[derive(Debug, Deserialize)]
pub struct Script {
    /// Fold ASCII case when resolving symbol names.
    #[serde(default)]
    pub case_insensitive: bool,

    #[serde(default, rename = "directive")]
    pub directives: Vec<DirectiveDecl>,

    #[serde(default, rename = "call")]
    pub calls: Vec<Call>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectiveDecl {
    pub name: Spanned<String>,

    #[serde(default)]
    pub flags: Vec<Spanned<String>>,

    /// Convert each entry of the primary list to an expression when called.
    #[serde(default)]
    pub resolve: bool,
}

impl DirectiveDecl {
    pub fn name(&self) -> &str {
        self.name.get_ref()
    }

    pub fn directive_flags(&self) -> Result<DirectiveFlags, ScriptError> {
        let mut flags = DirectiveFlags::ANY;
        for flag in &self.flags {
            flags |= DirectiveFlags::from_name(flag.get_ref()).ok_or_else(|| {
                ScriptError::UnknownFlag {
                    directive: self.name().to_string(),
                    flag: flag.get_ref().clone(),
                    span: flag.span(),
                }
            })?;
        }
        Ok(flags)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Call {
    pub name: Spanned<String>,

    /// Line reported to the handler. Defaults to the line the call's name is on.
    #[serde(default)]
    pub line: Option<u64>,

    /// Omitted means no list at all, `[]` means an empty one.
    #[serde(default)]
    pub params: Option<Vec<ParamSpec>>,

    #[serde(default)]
    pub objext: Option<Vec<ParamSpec>>,
}

impl Call {
    pub fn name(&self) -> &str {
        self.name.get_ref()
    }

    pub fn line(&self) -> u64 {
        self.line.unwrap_or(1)
    }

    pub fn valparams(&self, symtab: &mut SymbolTable) -> Option<ValParamList> {
        let line = self.line();
        self.params.as_ref().map(|specs| build_list(specs, symtab, line))
    }

    pub fn objext_valparams(&self, symtab: &mut SymbolTable) -> Option<ValParamList> {
        let line = self.line();
        self.objext.as_ref().map(|specs| build_list(specs, symtab, line))
    }
}

/// One value/parameter: `{ id = "name" }`, `{ expr = ... }`, both, or `{}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub expr: Option<ExprSpec>,
}

impl ParamSpec {
    pub fn build(&self, symtab: &mut SymbolTable, line: u64) -> ValParam {
        ValParam::new(
            self.id.clone(),
            self.expr.as_ref().map(|e| e.build(symtab, line)),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExprSpec {
    Int(i64),
    Sym(String),
    Neg(Box<ExprSpec>),
    Not(Box<ExprSpec>),
    Add(Vec<ExprSpec>),
    Sub(Vec<ExprSpec>),
    Mul(Vec<ExprSpec>),
    Div(Vec<ExprSpec>),
    Mod(Vec<ExprSpec>),
    Shl(Vec<ExprSpec>),
    Shr(Vec<ExprSpec>),
    And(Vec<ExprSpec>),
    Or(Vec<ExprSpec>),
    Xor(Vec<ExprSpec>),
}

impl ExprSpec {
    fn operands(&self) -> Option<(Operator, &[ExprSpec])> {
        let pair = match self {
            ExprSpec::Add(v) => (Operator::Add, v),
            ExprSpec::Sub(v) => (Operator::Sub, v),
            ExprSpec::Mul(v) => (Operator::Mul, v),
            ExprSpec::Div(v) => (Operator::Div, v),
            ExprSpec::Mod(v) => (Operator::Mod, v),
            ExprSpec::Shl(v) => (Operator::Shl, v),
            ExprSpec::Shr(v) => (Operator::Shr, v),
            ExprSpec::And(v) => (Operator::And, v),
            ExprSpec::Or(v) => (Operator::Or, v),
            ExprSpec::Xor(v) => (Operator::Xor, v),
            ExprSpec::Int(_) | ExprSpec::Sym(_) | ExprSpec::Neg(_) | ExprSpec::Not(_) => {
                return None;
            }
        };
        Some((pair.0, pair.1.as_slice()))
    }

    /// Check that every operator has at least two operands.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ExprSpec::Int(_) | ExprSpec::Sym(_) => Ok(()),
            ExprSpec::Neg(inner) | ExprSpec::Not(inner) => inner.validate(),
            _ => {
                let Some((op, terms)) = self.operands() else {
                    return Ok(());
                };
                if terms.len() < 2 {
                    return Err(format!(
                        "operator `{}' needs at least two operands, got {}",
                        op.token(),
                        terms.len()
                    ));
                }
                terms.iter().try_for_each(ExprSpec::validate)
            }
        }
    }

    /// Build the expression, registering a use of every symbol it names.
    pub fn build(&self, symtab: &mut SymbolTable, line: u64) -> Expr {
        match self {
            ExprSpec::Int(n) => Expr::int(*n, line),
            ExprSpec::Sym(name) => Expr::sym(symtab.use_symbol(name, line), line),
            ExprSpec::Neg(inner) => Expr::unary(Operator::Neg, inner.term(symtab, line), line),
            ExprSpec::Not(inner) => Expr::unary(Operator::Not, inner.term(symtab, line), line),
            _ => {
                let (op, specs) = self.operands().unwrap_or((Operator::Ident, &[]));
                Expr {
                    op,
                    terms: specs.iter().map(|s| s.term(symtab, line)).collect(),
                    line,
                }
            }
        }
    }

    fn term(&self, symtab: &mut SymbolTable, line: u64) -> ExprTerm {
        match self {
            ExprSpec::Int(n) => ExprTerm::Int(*n),
            ExprSpec::Sym(name) => ExprTerm::Sym(symtab.use_symbol(name, line)),
            _ => ExprTerm::Expr(Box::new(self.build(symtab, line))),
        }
    }
}

fn build_list(specs: &[ParamSpec], symtab: &mut SymbolTable, line: u64) -> ValParamList {
    specs.iter().map(|spec| spec.build(symtab, line)).collect()
}

/// Convert a byte offset in `source` to a 1-based line number.
pub fn byte_offset_to_line(source: &str, offset: usize) -> u64 {
    source.as_bytes()[..offset.min(source.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u64
        + 1
}

impl Script {
    pub fn load(path: &Path) -> Result<Script, ScriptError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| ScriptError::Io(format!("cannot read '{}': {}", path.display(), e)))?;
        source.parse()
    }

    pub fn find_directive(&self, name: &str) -> Option<&DirectiveDecl> {
        self.directives.iter().find(|d| d.name() == name)
    }

    fn validate(&self) -> Result<(), ScriptError> {
        let mut seen = HashSet::new();
        for decl in &self.directives {
            decl.directive_flags()?;
            if !seen.insert(decl.name().to_ascii_lowercase()) {
                return Err(ScriptError::DuplicateDirective {
                    name: decl.name().to_string(),
                    span: decl.name.span(),
                });
            }
        }

        for call in &self.calls {
            let specs = call.params.iter().chain(call.objext.iter()).flatten();
            for expr in specs.filter_map(|p| p.expr.as_ref()) {
                expr.validate()
                    .map_err(|message| ScriptError::InvalidExpression {
                        call: call.name().to_string(),
                        message,
                        span: call.name.span(),
                    })?;
            }
        }
        Ok(())
    }
}

impl FromStr for Script {
    type Err = ScriptError;

    fn from_str(source: &str) -> Result<Script, ScriptError> {
        let mut script: Script = toml::from_str(source)?;
        for call in &mut script.calls {
            if call.line.is_none() {
                call.line = Some(byte_offset_to_line(source, call.name.span().start));
            }
        }
        script.validate()?;
        Ok(script)
    }
}
