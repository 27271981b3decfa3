//! Restricted formula language for model functions.
//!
//! A model's `FUNCTION` is parsed once into an expression tree ([`Expr`]) and
//! then evaluated by a pure interpreter against a scenario's variable
//! bindings. Nothing outside the tree can be reached: the only names that
//! resolve are the scenario's variables and the whitelisted functions
//! `exp`, `sqrt` and `log`.
//!
//! # Grammar
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/' | '//' | '%') factor)*
//! factor  := ('+' | '-') factor | power
//! power   := primary ('**' factor)?
//! primary := NUMBER | IDENT | FUNC '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! `**` is right associative and binds tighter than a unary operator on its
//! left, so `-2**2` is `-4`.
//!
//! # Example
//!
//! ```
//! use montecarlo_expr::Formula;
//! use std::collections::HashMap;
//!
//! let formula = Formula::parse("x * exp(y) + sqrt(4)").unwrap();
//! let env = HashMap::from([("x".to_string(), 2.0), ("y".to_string(), 0.0)]);
//! assert_eq!(formula.eval(&env).unwrap(), 4.0);
//! ```

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, Function, UnaryOp};
pub use error::{EvalError, ExprError};
pub use eval::Bindings;
pub use lexer::Token;

use std::collections::BTreeSet;
use std::fmt;

/// A parsed model function.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    root: Expr,
    variables: BTreeSet<String>,
}

impl Formula {
    /// Parse a formula. Unknown function names and wrong argument counts are
    /// rejected here rather than at evaluation time.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let root = parser::parse(source)?;
        let mut variables = BTreeSet::new();
        root.collect_variables(&mut variables);
        Ok(Self {
            source: source.to_string(),
            root,
            variables,
        })
    }

    /// Evaluate against a set of variable bindings.
    ///
    /// Pure: the same formula and bindings always yield the same bits.
    pub fn eval<B: Bindings + ?Sized>(&self, bindings: &B) -> Result<f64, EvalError> {
        eval::evaluate(&self.root, bindings)
    }

    /// Variables referenced by the formula, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }

    /// Referenced variables that `defined` does not contain.
    pub fn undefined_variables<'a, I>(&self, defined: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let defined: BTreeSet<&str> = defined.into_iter().collect();
        self.variables
            .iter()
            .filter(|v| !defined.contains(v.as_str()))
            .cloned()
            .collect()
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Formula {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
