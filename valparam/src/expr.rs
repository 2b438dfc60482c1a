use std::fmt;

use crate::symbol::SymbolRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// No operation; the expression is its single term.
    Ident,
    /// Arithmetic negation: -x
    Neg,
    /// Bitwise not: ~x
    Not,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl Operator {
    pub fn is_unary(self) -> bool {
        matches!(self, Operator::Neg | Operator::Not)
    }

    /// Token used when rendering the operator.
    pub fn token(self) -> &'static str {
        match self {
            Operator::Ident => "",
            Operator::Neg => "-",
            Operator::Not => "~",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::And => "&",
            Operator::Or => "|",
            Operator::Xor => "^",
        }
    }
}

/// A single operand of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprTerm {
    Int(i64),
    Sym(SymbolRef),
    Expr(Box<Expr>),
}

impl From<Expr> for ExprTerm {
    fn from(e: Expr) -> Self {
        ExprTerm::Expr(Box::new(e))
    }
}

impl From<i64> for ExprTerm {
    fn from(n: i64) -> Self {
        ExprTerm::Int(n)
    }
}

impl From<SymbolRef> for ExprTerm {
    fn from(sym: SymbolRef) -> Self {
        ExprTerm::Sym(sym)
    }
}

/// A symbolic expression tree. Every node remembers the source line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub op: Operator,
    pub terms: Vec<ExprTerm>,
    pub line: u64,
}

impl Expr {
    /// Identity wrapping of a single term.
    pub fn ident(term: impl Into<ExprTerm>, line: u64) -> Self {
        Expr {
            op: Operator::Ident,
            terms: vec![term.into()],
            line,
        }
    }

    pub fn int(value: i64, line: u64) -> Self {
        Expr::ident(ExprTerm::Int(value), line)
    }

    pub fn sym(sym: SymbolRef, line: u64) -> Self {
        Expr::ident(ExprTerm::Sym(sym), line)
    }

    /// Apply `op` to a single term. Meant for `Neg` and `Not`; any other operator yields a
    /// one-term node that renders and folds as the bare term.
    pub fn unary(op: Operator, term: impl Into<ExprTerm>, line: u64) -> Self {
        Expr {
            op,
            terms: vec![term.into()],
            line,
        }
    }

    pub fn binary(
        op: Operator,
        left: impl Into<ExprTerm>,
        right: impl Into<ExprTerm>,
        line: u64,
    ) -> Self {
        Expr {
            op,
            terms: vec![left.into(), right.into()],
            line,
        }
    }

    /// The symbol this expression names, if it is nothing more than a symbol reference.
    pub fn symbol(&self) -> Option<&SymbolRef> {
        match (self.op, self.terms.as_slice()) {
            (Operator::Ident, [ExprTerm::Sym(sym)]) => Some(sym),
            (Operator::Ident, [ExprTerm::Expr(inner)]) => inner.symbol(),
            _ => None,
        }
    }

    /// The integer this expression holds, if it is a bare integer.
    pub fn int_value(&self) -> Option<i64> {
        match (self.op, self.terms.as_slice()) {
            (Operator::Ident, [ExprTerm::Int(n)]) => Some(*n),
            (Operator::Ident, [ExprTerm::Expr(inner)]) => inner.int_value(),
            _ => None,
        }
    }

    /// Fold the expression to a constant. Returns `None` when a symbol is involved,
    /// on division by zero, or on an out-of-range shift. Arithmetic wraps.
    pub fn const_value(&self) -> Option<i64> {
        let mut values = self.terms.iter().map(term_value);
        let first = values.next()??;

        match self.op {
            Operator::Ident => Some(first),
            Operator::Neg => Some(first.wrapping_neg()),
            Operator::Not => Some(!first),
            op => values.try_fold(first, |acc, v| apply(op, acc, v?)),
        }
    }
}

/// Whether the term's rendering starts with a minus sign.
fn leads_with_minus(term: &ExprTerm) -> bool {
    match term {
        ExprTerm::Int(n) => *n < 0,
        ExprTerm::Sym(_) => false,
        ExprTerm::Expr(e) => {
            e.op == Operator::Ident && e.terms.first().is_some_and(leads_with_minus)
        }
    }
}

fn term_value(term: &ExprTerm) -> Option<i64> {
    match term {
        ExprTerm::Int(n) => Some(*n),
        ExprTerm::Sym(_) => None,
        ExprTerm::Expr(e) => e.const_value(),
    }
}

fn apply(op: Operator, a: i64, b: i64) -> Option<i64> {
    match op {
        Operator::Add => Some(a.wrapping_add(b)),
        Operator::Sub => Some(a.wrapping_sub(b)),
        Operator::Mul => Some(a.wrapping_mul(b)),
        Operator::Div => a.checked_div(b),
        Operator::Mod => a.checked_rem(b),
        Operator::Shl => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
        Operator::Shr => u32::try_from(b).ok().and_then(|s| a.checked_shr(s)),
        Operator::And => Some(a & b),
        Operator::Or => Some(a | b),
        Operator::Xor => Some(a ^ b),
        Operator::Ident | Operator::Neg | Operator::Not => None,
    }
}

impl fmt::Display for ExprTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprTerm::Int(n) => write!(f, "{}", n),
            ExprTerm::Sym(sym) => write!(f, "{}", sym.name()),
            ExprTerm::Expr(e) if e.op == Operator::Ident => write!(f, "{}", e),
            ExprTerm::Expr(e) => write!(f, "({})", e),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op.is_unary() {
            write!(f, "{}", self.op.token())?;
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.op.token())?;
            }
            // `1-(-2)`, not `1--2`.
            if (i > 0 || self.op.is_unary()) && leads_with_minus(term) {
                write!(f, "({})", term)?;
            } else {
                write!(f, "{}", term)?;
            }
        }
        Ok(())
    }
}
