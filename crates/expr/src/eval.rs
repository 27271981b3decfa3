//! Pure interpreter over the expression tree.
//!
//! Arithmetic follows Python float semantics: `/`, `//` and `%` by zero
//! fail, `//` and `%` floor toward negative infinity, and math functions
//! reject arguments outside their domain instead of returning NaN.

use crate::ast::{BinaryOp, Expr, Function, UnaryOp};
use crate::error::EvalError;
use indexmap::IndexMap;
use montecarlo_types::Scenario;
use std::collections::{BTreeMap, HashMap};

/// Variable lookup for evaluation.
pub trait Bindings {
    /// Value bound to `name`, or `None` when the name is unknown or has no value.
    fn value(&self, name: &str) -> Option<f64>;
}

impl Bindings for HashMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Bindings for BTreeMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Bindings for IndexMap<String, Option<f64>> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied().flatten()
    }
}

impl Bindings for [(&str, f64)] {
    fn value(&self, name: &str) -> Option<f64> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }
}

impl Bindings for Scenario {
    fn value(&self, name: &str) -> Option<f64> {
        self.variables.value(name)
    }
}

pub(crate) fn evaluate<B: Bindings + ?Sized>(expr: &Expr, env: &B) -> Result<f64, EvalError> {
    let value = eval_node(expr, env)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::Overflow)
    }
}

fn eval_node<B: Bindings + ?Sized>(expr: &Expr, env: &B) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Variable(name) => env
            .value(name)
            .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
        Expr::Unary { op, operand } => {
            let value = eval_node(operand, env)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Neg => -value,
            })
        }
        Expr::Binary { op, lhs, rhs } => {
            let a = eval_node(lhs, env)?;
            let b = eval_node(rhs, env)?;
            binary(*op, a, b)
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| eval_node(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, &values)
        }
    }
}

fn binary(op: BinaryOp, a: f64, b: f64) -> Result<f64, EvalError> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }
        BinaryOp::FloorDiv => floor_divmod(a, b).map(|(div, _)| div),
        BinaryOp::Mod => floor_divmod(a, b).map(|(_, rem)| rem),
        BinaryOp::Pow => pow(a, b),
    }
}

/// Floored division and remainder with the remainder taking the divisor's sign.
fn floor_divmod(a: f64, b: f64) -> Result<(f64, f64), EvalError> {
    if b == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    let mut rem = a % b;
    let mut div = (a - rem) / b;
    if rem != 0.0 {
        if (b < 0.0) != (rem < 0.0) {
            rem += b;
            div -= 1.0;
        }
    } else {
        rem = 0.0_f64.copysign(b);
    }
    let floor = if div != 0.0 {
        let mut floor = div.floor();
        if div - floor > 0.5 {
            floor += 1.0;
        }
        floor
    } else {
        0.0_f64.copysign(a / b)
    };
    Ok((floor, rem))
}

fn pow(base: f64, exponent: f64) -> Result<f64, EvalError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(EvalError::Domain {
            operation: "pow",
            argument: base,
        });
    }
    let value = base.powf(exponent);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::Overflow)
    }
}

fn call(function: Function, args: &[f64]) -> Result<f64, EvalError> {
    match (function, args) {
        (Function::Exp, [x]) => {
            let value = x.exp();
            if value.is_finite() {
                Ok(value)
            } else {
                Err(EvalError::Overflow)
            }
        }
        (Function::Sqrt, [x]) => {
            if *x < 0.0 {
                Err(EvalError::Domain {
                    operation: "sqrt",
                    argument: *x,
                })
            } else {
                Ok(x.sqrt())
            }
        }
        (Function::Log, [x]) => ln(*x),
        (Function::Log, [x, base]) => {
            let numerator = ln(*x)?;
            let denominator = ln(*base)?;
            if denominator == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(numerator / denominator)
            }
        }
        // Arity is checked by the parser; a hand-built tree can still get here.
        (function, args) => Err(EvalError::Domain {
            operation: function.name(),
            argument: args.len() as f64,
        }),
    }
}

fn ln(x: f64) -> Result<f64, EvalError> {
    if x <= 0.0 {
        Err(EvalError::Domain {
            operation: "log",
            argument: x,
        })
    } else {
        Ok(x.ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Formula;

    fn eval(source: &str, env: &[(&str, f64)]) -> Result<f64, EvalError> {
        Formula::parse(source).unwrap().eval(env)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3", &[]), Ok(7.0));
        assert_eq!(eval("(1 + 2) * 3", &[]), Ok(9.0));
        assert_eq!(eval("7 / 2", &[]), Ok(3.5));
        assert_eq!(eval("-2 ** 2", &[]), Ok(-4.0));
        assert_eq!(eval("2 ** 3 ** 2", &[]), Ok(512.0));
        assert_eq!(eval("2 ** -1", &[]), Ok(0.5));
        assert_eq!(eval("+x - -x", &[("x", 1.5)]), Ok(3.0));
    }

    #[test]
    fn test_floor_division_and_modulo_follow_floor_semantics() {
        assert_eq!(eval("7 // 2", &[]), Ok(3.0));
        assert_eq!(eval("-7 // 2", &[]), Ok(-4.0));
        assert_eq!(eval("7 % 3", &[]), Ok(1.0));
        assert_eq!(eval("-7 % 3", &[]), Ok(2.0));
        assert_eq!(eval("7 % -3", &[]), Ok(-2.0));
        assert_eq!(eval("7.0 // 0.1", &[]), Ok(69.0));
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("exp(0)", &[]), Ok(1.0));
        assert_eq!(eval("sqrt(x)", &[("x", 16.0)]), Ok(4.0));
        assert_eq!(eval("log(1)", &[]), Ok(0.0));
        let log_100 = eval("log(100, 10)", &[]).unwrap();
        assert!((log_100 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_domain_errors() {
        assert!(matches!(
            eval("sqrt(-1)", &[]),
            Err(EvalError::Domain {
                operation: "sqrt",
                ..
            })
        ));
        assert!(matches!(
            eval("log(0)", &[]),
            Err(EvalError::Domain {
                operation: "log",
                ..
            })
        ));
        assert!(matches!(
            eval("(-8) ** 0.5", &[]),
            Err(EvalError::Domain {
                operation: "pow",
                ..
            })
        ));
        assert_eq!(eval("(-2) ** 3", &[]), Ok(-8.0));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1 / 0", &[]), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1 // 0", &[]), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1 % 0", &[]), Err(EvalError::DivisionByZero));
        assert_eq!(eval("0 ** -1", &[]), Err(EvalError::DivisionByZero));
        assert_eq!(eval("log(5, 1)", &[]), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(eval("exp(1000)", &[]), Err(EvalError::Overflow));
        assert_eq!(eval("10 ** 400", &[]), Err(EvalError::Overflow));
        assert_eq!(eval("x * x", &[("x", 1e200)]), Err(EvalError::Overflow));
    }

    #[test]
    fn test_unbound_variable() {
        assert_eq!(
            eval("x + y", &[("x", 1.0)]),
            Err(EvalError::UnboundVariable("y".into()))
        );
    }

    #[test]
    fn test_absent_scenario_value_is_unbound() {
        let scenario = Scenario::new(montecarlo_types::ScenarioId(1))
            .with_value("x", Some(2.0))
            .with_value("y", None);
        let formula = Formula::parse("x * 2").unwrap();
        assert_eq!(formula.eval(&scenario), Ok(4.0));
        let formula = Formula::parse("x * y").unwrap();
        assert_eq!(
            formula.eval(&scenario),
            Err(EvalError::UnboundVariable("y".into()))
        );
    }
}
