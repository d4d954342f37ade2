use vista_variant::Variant;

use crate::ast::{BinaryOp, Builtin, Expr, PropRef, UnaryOp};
use crate::error::ExpressionError;

/// How property references resolve to values. The binding graph implements
/// this; every call is also its chance to record the read into the active
/// dependency set.
pub trait PropertyResolver {
    fn resolve(&mut self, reference: &PropRef) -> Result<Variant, ExpressionError>;
}

/// Evaluate a compiled expression. Short-circuit operators only resolve the
/// operands they actually take, so the recorded read-set matches the taken
/// path exactly.
pub fn eval(expr: &Expr, resolver: &mut dyn PropertyResolver) -> Result<Variant, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Property(reference) => resolver.resolve(reference),

        Expr::Unary { op, operand } => {
            let value = eval(operand, resolver)?;
            apply_unary(*op, value)
        }

        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::And => {
                let left = eval(lhs, resolver)?;
                if !left.is_truthy() {
                    return Ok(Variant::Bool(false));
                }
                let right = eval(rhs, resolver)?;
                Ok(Variant::Bool(right.is_truthy()))
            }
            BinaryOp::Or => {
                let left = eval(lhs, resolver)?;
                if left.is_truthy() {
                    return Ok(Variant::Bool(true));
                }
                let right = eval(rhs, resolver)?;
                Ok(Variant::Bool(right.is_truthy()))
            }
            _ => {
                let left = eval(lhs, resolver)?;
                let right = eval(rhs, resolver)?;
                apply_binary(*op, left, right)
            }
        },

        Expr::Ternary {
            cond,
            then_branch,
            else_branch,
        } => {
            let chosen = if eval(cond, resolver)?.is_truthy() {
                then_branch
            } else {
                else_branch
            };
            eval(chosen, resolver)
        }

        Expr::Call { func, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, resolver)?);
            }
            apply_builtin(*func, values)
        }
    }
}

fn apply_unary(op: UnaryOp, value: Variant) -> Result<Variant, ExpressionError> {
    match op {
        UnaryOp::Not => Ok(Variant::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Variant::Int(v) => Ok(Variant::Int(-v)),
            Variant::Real(v) => Ok(Variant::Real(-v)),
            other => Err(ExpressionError::TypeMismatch {
                op: "-",
                lhs: other.type_name(),
                rhs: "",
            }),
        },
    }
}

fn apply_binary(op: BinaryOp, lhs: Variant, rhs: Variant) -> Result<Variant, ExpressionError> {
    use BinaryOp::*;
    match op {
        Eq => Ok(Variant::Bool(loose_eq(&lhs, &rhs))),
        Ne => Ok(Variant::Bool(!loose_eq(&lhs, &rhs))),

        Add => {
            // `+` concatenates when either side is a string.
            if let (Variant::String(a), b) = (&lhs, &rhs) {
                return Ok(Variant::from(format!("{}{}", a, display_raw(b))));
            }
            if let (a, Variant::String(b)) = (&lhs, &rhs) {
                return Ok(Variant::from(format!("{}{}", display_raw(a), b)));
            }
            numeric(op, lhs, rhs)
        }
        Sub | Mul | Div | Rem => numeric(op, lhs, rhs),

        Lt | Le | Gt | Ge => {
            let (a, b) = both_real(op, lhs, rhs)?;
            let result = match op {
                Lt => a < b,
                Le => a <= b,
                Gt => a > b,
                Ge => a >= b,
                _ => unreachable!(),
            };
            Ok(Variant::Bool(result))
        }

        // Short-circuit forms handled in eval(); reaching here is a bug in
        // the caller, still give a correct answer.
        And => Ok(Variant::Bool(lhs.is_truthy() && rhs.is_truthy())),
        Or => Ok(Variant::Bool(lhs.is_truthy() || rhs.is_truthy())),
    }
}

/// Display without the quoting `Variant`'s `Display` applies to strings.
fn display_raw(value: &Variant) -> String {
    match value {
        Variant::String(s) => s.as_ref().to_string(),
        other => other.to_string(),
    }
}

/// Equality across numeric kinds compares values (1 == 1.0); everything
/// else requires matching kinds.
fn loose_eq(lhs: &Variant, rhs: &Variant) -> bool {
    match (lhs, rhs) {
        (Variant::Int(a), Variant::Real(b)) => *a as f64 == *b,
        (Variant::Real(a), Variant::Int(b)) => *a == *b as f64,
        (a, b) => a == b,
    }
}

fn both_real(op: BinaryOp, lhs: Variant, rhs: Variant) -> Result<(f64, f64), ExpressionError> {
    match (lhs.to_real(), rhs.to_real()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ExpressionError::TypeMismatch {
            op: op.symbol(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        }),
    }
}

fn numeric(op: BinaryOp, lhs: Variant, rhs: Variant) -> Result<Variant, ExpressionError> {
    use BinaryOp::*;
    match (&lhs, &rhs) {
        // Integral stays integral; division/remainder by zero is an error
        // rather than a panic.
        (Variant::Int(a), Variant::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                Add => a.wrapping_add(b),
                Sub => a.wrapping_sub(b),
                Mul => a.wrapping_mul(b),
                Div => {
                    if b == 0 {
                        return Err(ExpressionError::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
                Rem => {
                    if b == 0 {
                        return Err(ExpressionError::DivisionByZero);
                    }
                    a.wrapping_rem(b)
                }
                _ => unreachable!(),
            };
            Ok(Variant::Int(result))
        }
        // Any real operand promotes; IEEE handles zero divisors.
        _ => {
            let (a, b) = both_real(op, lhs, rhs)?;
            let result = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                _ => unreachable!(),
            };
            Ok(Variant::Real(result))
        }
    }
}

fn apply_builtin(func: Builtin, mut args: Vec<Variant>) -> Result<Variant, ExpressionError> {
    let real = |v: &Variant| -> Result<f64, ExpressionError> {
        v.to_real().ok_or(ExpressionError::TypeMismatch {
            op: func.name(),
            lhs: v.type_name(),
            rhs: "number",
        })
    };
    // Integer in, integer out, where the operation allows it.
    let all_int = args.iter().all(|a| matches!(a, Variant::Int(_)));

    match func {
        Builtin::Min | Builtin::Max => {
            let b = real(&args[1])?;
            let a = real(&args[0])?;
            let picked = match func {
                Builtin::Min => a.min(b),
                _ => a.max(b),
            };
            Ok(if all_int {
                Variant::Int(picked as i64)
            } else {
                Variant::Real(picked)
            })
        }
        Builtin::Abs => match args.remove(0) {
            Variant::Int(v) => Ok(Variant::Int(v.wrapping_abs())),
            other => Ok(Variant::Real(real(&other)?.abs())),
        },
        Builtin::Floor => Ok(Variant::Int(real(&args[0])?.floor() as i64)),
        Builtin::Ceil => Ok(Variant::Int(real(&args[0])?.ceil() as i64)),
        Builtin::Round => Ok(Variant::Int(real(&args[0])?.round() as i64)),
        Builtin::Clamp => {
            let hi = real(&args[2])?;
            let lo = real(&args[1])?;
            let v = real(&args[0])?.clamp(lo, hi);
            Ok(if all_int {
                Variant::Int(v as i64)
            } else {
                Variant::Real(v)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::compile;
    use std::collections::HashMap;

    /// Test resolver backed by a map; records every read in order.
    struct MapResolver {
        values: HashMap<String, Variant>,
        reads: Vec<String>,
    }

    impl MapResolver {
        fn new(pairs: &[(&str, Variant)]) -> Self {
            Self {
                values: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                reads: Vec::new(),
            }
        }
    }

    impl PropertyResolver for MapResolver {
        fn resolve(&mut self, reference: &PropRef) -> Result<Variant, ExpressionError> {
            let key = reference.to_string();
            self.reads.push(key.clone());
            self.values
                .get(&key)
                .cloned()
                .ok_or(ExpressionError::UnknownProperty { name: key })
        }
    }

    fn run(src: &str, pairs: &[(&str, Variant)]) -> Result<Variant, ExpressionError> {
        let expr = compile(src).unwrap();
        let mut resolver = MapResolver::new(pairs);
        eval(&expr, &mut resolver)
    }

    #[test]
    fn int_arithmetic_stays_integral() {
        assert_eq!(run("7 / 2", &[]).unwrap(), Variant::Int(3));
        assert_eq!(run("7 % 2", &[]).unwrap(), Variant::Int(1));
    }

    #[test]
    fn real_operand_promotes() {
        assert_eq!(run("7 / 2.0", &[]).unwrap(), Variant::Real(3.5));
        assert_eq!(run("1 + 0.5", &[]).unwrap(), Variant::Real(1.5));
    }

    #[test]
    fn integer_division_by_zero_errors() {
        assert_eq!(run("1 / 0", &[]), Err(ExpressionError::DivisionByZero));
    }

    #[test]
    fn real_division_by_zero_is_ieee() {
        assert_eq!(run("1.0 / 0.0", &[]).unwrap(), Variant::Real(f64::INFINITY));
    }

    #[test]
    fn string_concat() {
        assert_eq!(
            run("'w: ' + 4", &[]).unwrap(),
            Variant::string("w: 4")
        );
    }

    #[test]
    fn loose_numeric_equality() {
        assert_eq!(run("1 == 1.0", &[]).unwrap(), Variant::Bool(true));
        assert_eq!(run("'1' == 1", &[]).unwrap(), Variant::Bool(false));
    }

    #[test]
    fn property_reads_recorded() {
        let expr = compile("a + parent.b").unwrap();
        let mut resolver =
            MapResolver::new(&[("a", Variant::Int(1)), ("parent.b", Variant::Int(2))]);
        assert_eq!(eval(&expr, &mut resolver).unwrap(), Variant::Int(3));
        assert_eq!(resolver.reads, vec!["a", "parent.b"]);
    }

    #[test]
    fn short_circuit_skips_reads() {
        let expr = compile("false && missing").unwrap();
        let mut resolver = MapResolver::new(&[]);
        assert_eq!(eval(&expr, &mut resolver).unwrap(), Variant::Bool(false));
        assert!(resolver.reads.is_empty());
    }

    #[test]
    fn ternary_reads_only_taken_branch() {
        let expr = compile("flag ? a : b").unwrap();
        let mut resolver = MapResolver::new(&[
            ("flag", Variant::Bool(true)),
            ("a", Variant::Int(10)),
            ("b", Variant::Int(20)),
        ]);
        assert_eq!(eval(&expr, &mut resolver).unwrap(), Variant::Int(10));
        assert_eq!(resolver.reads, vec!["flag", "a"]);
    }

    #[test]
    fn builtins() {
        assert_eq!(run("min(3, 5)", &[]).unwrap(), Variant::Int(3));
        assert_eq!(run("max(3, 5.0)", &[]).unwrap(), Variant::Real(5.0));
        assert_eq!(run("abs(0 - 4)", &[]).unwrap(), Variant::Int(4));
        assert_eq!(run("floor(2.9)", &[]).unwrap(), Variant::Int(2));
        assert_eq!(run("clamp(15, 0, 10)", &[]).unwrap(), Variant::Int(10));
    }

    #[test]
    fn type_mismatch_is_reported() {
        assert!(matches!(
            run("'a' * 2", &[]),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_property_surfaces() {
        assert!(matches!(
            run("nope + 1", &[]),
            Err(ExpressionError::UnknownProperty { .. })
        ));
    }
}
