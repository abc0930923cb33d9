//! Operation engine
//!
//! Maps an operator and its evaluated operands to a result literal.
//! Arithmetic and ordered comparisons first pick a common numeric
//! representation with [`promote`], then run generically over it.

use crate::error::{Result, SableError};
use crate::parser::ast::Literal;
use crate::parser::token::Operator;
use num_traits::{CheckedDiv, CheckedRem, WrappingAdd, WrappingMul, WrappingSub, Zero};
use std::rc::Rc;

// ============================================================================
// Numeric promotion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericType {
    Int,
    Long,
    Float,
    Double,
}

impl NumericType {
    pub fn of(value: &Literal) -> Option<Self> {
        match value {
            Literal::Int(_) => Some(NumericType::Int),
            Literal::Long(_) => Some(NumericType::Long),
            Literal::Float(_) => Some(NumericType::Float),
            Literal::Double(_) => Some(NumericType::Double),
            _ => None,
        }
    }
}

/// Walk the operands left to right, seeded by the first operand's type.
///
/// A float met after an int leaves the running type at int.
pub fn promote(operator: Operator, operands: &[Literal]) -> Result<NumericType> {
    let mut types = operands.iter().map(|value| {
        NumericType::of(value).ok_or_else(|| {
            SableError::eval(format!(
                "Operator {} expects numeric operands, found {}",
                operator.lexeme(),
                value.lang_type()
            ))
        })
    });

    let mut running = match types.next() {
        Some(first) => first?,
        None => {
            return Err(SableError::eval(format!(
                "Operator {} requires at least one operand",
                operator.lexeme()
            )))
        }
    };

    for next in types {
        let next = next?;
        running = match (running, next) {
            (NumericType::Double, _) | (_, NumericType::Double) => NumericType::Double,
            (NumericType::Float, NumericType::Long) => NumericType::Double,
            (_, NumericType::Long) => NumericType::Long,
            (NumericType::Long, NumericType::Int) => NumericType::Long,
            (NumericType::Float, NumericType::Int) => NumericType::Double,
            (_, NumericType::Int) => NumericType::Int,
            (NumericType::Long, NumericType::Float) => NumericType::Double,
            (running, NumericType::Float) => running,
        };
    }

    Ok(running)
}

// ============================================================================
// Generic arithmetic
// ============================================================================

trait Number: Copy + PartialOrd {
    fn read(value: &Literal) -> Self;
    fn wrap(self) -> Literal;
    fn one() -> Self;
    fn plus(self, rhs: Self) -> Self;
    fn minus(self, rhs: Self) -> Self;
    fn times(self, rhs: Self) -> Self;
    fn divide(self, rhs: Self) -> Result<Self>;
    fn modulo(self, rhs: Self) -> Result<Self>;
}

macro_rules! integral {
    ($t:ty, $variant:ident, $read:ident) => {
        impl Number for $t {
            fn read(value: &Literal) -> Self {
                value.$read()
            }

            fn wrap(self) -> Literal {
                Literal::$variant(self)
            }

            fn one() -> Self {
                1
            }

            fn plus(self, rhs: Self) -> Self {
                WrappingAdd::wrapping_add(&self, &rhs)
            }

            fn minus(self, rhs: Self) -> Self {
                WrappingSub::wrapping_sub(&self, &rhs)
            }

            fn times(self, rhs: Self) -> Self {
                WrappingMul::wrapping_mul(&self, &rhs)
            }

            fn divide(self, rhs: Self) -> Result<Self> {
                if rhs.is_zero() {
                    return Err(SableError::eval("Division by zero"));
                }
                // MIN / -1 wraps back to MIN
                Ok(CheckedDiv::checked_div(&self, &rhs).unwrap_or(self))
            }

            fn modulo(self, rhs: Self) -> Result<Self> {
                if rhs.is_zero() {
                    return Err(SableError::eval("Modulo by zero"));
                }
                Ok(CheckedRem::checked_rem(&self, &rhs).unwrap_or_else(<$t as Zero>::zero))
            }
        }
    };
}

macro_rules! floating {
    ($t:ty, $variant:ident, $read:ident) => {
        impl Number for $t {
            fn read(value: &Literal) -> Self {
                value.$read()
            }

            fn wrap(self) -> Literal {
                Literal::$variant(self)
            }

            fn one() -> Self {
                1.0
            }

            fn plus(self, rhs: Self) -> Self {
                self + rhs
            }

            fn minus(self, rhs: Self) -> Self {
                self - rhs
            }

            fn times(self, rhs: Self) -> Self {
                self * rhs
            }

            fn divide(self, rhs: Self) -> Result<Self> {
                Ok(self / rhs)
            }

            fn modulo(self, rhs: Self) -> Result<Self> {
                Ok(self % rhs)
            }
        }
    };
}

integral!(i32, Int, as_int);
integral!(i64, Long, as_long);
floating!(f32, Float, as_float);
floating!(f64, Double, as_double);

/// Run `$body` with `$n` aliased to the Rust type for `$kind`
macro_rules! with_numeric {
    ($kind:expr, $n:ident => $body:expr) => {
        match $kind {
            NumericType::Int => {
                type $n = i32;
                $body
            }
            NumericType::Long => {
                type $n = i64;
                $body
            }
            NumericType::Float => {
                type $n = f32;
                $body
            }
            NumericType::Double => {
                type $n = f64;
                $body
            }
        }
    };
}

fn fold<N: Number>(operands: &[Literal], step: impl Fn(N, N) -> Result<N>) -> Result<Literal> {
    let mut iter = operands.iter().map(N::read);
    let mut acc = match iter.next() {
        Some(first) => first,
        None => return Err(SableError::eval("Operation requires at least one operand")),
    };
    for value in iter {
        acc = step(acc, value)?;
    }
    Ok(acc.wrap())
}

fn offset_each<N: Number>(operands: &[Literal], step: impl Fn(N) -> N) -> Vec<Literal> {
    operands.iter().map(|value| step(N::read(value)).wrap()).collect()
}

fn chain<N: Number>(operands: &[Literal], relation: impl Fn(N, N) -> bool) -> bool {
    operands
        .windows(2)
        .all(|pair| relation(N::read(&pair[0]), N::read(&pair[1])))
}

fn arithmetic(operator: Operator, operands: &[Literal]) -> Result<Literal> {
    let kind = promote(operator, operands)?;
    match operator {
        Operator::Add => with_numeric!(kind, N => fold::<N>(operands, |a, b| Ok(a.plus(b)))),
        Operator::Subtract => with_numeric!(kind, N => fold::<N>(operands, |a, b| Ok(a.minus(b)))),
        Operator::Multiply => with_numeric!(kind, N => fold::<N>(operands, |a, b| Ok(a.times(b)))),
        Operator::Divide => with_numeric!(kind, N => fold::<N>(operands, N::divide)),
        Operator::Modulo => with_numeric!(kind, N => fold::<N>(operands, N::modulo)),
        Operator::Exponentiate => {
            fold::<f64>(operands, |base, exponent| Ok(base.powf(exponent)))
        }
        Operator::Increment => {
            let items = with_numeric!(kind, N => offset_each::<N>(operands, |v| v.plus(N::one())));
            Ok(Literal::AList(Rc::new(items)))
        }
        Operator::Decrement => {
            let mut items = with_numeric!(kind, N => offset_each::<N>(operands, |v| v.minus(N::one())));
            if items.len() == 1 {
                Ok(items.remove(0))
            } else {
                Ok(Literal::AList(Rc::new(items)))
            }
        }
        _ => {
            let holds = match operator {
                Operator::Greater => with_numeric!(kind, N => chain::<N>(operands, |a, b| a > b)),
                Operator::GreaterEqual => with_numeric!(kind, N => chain::<N>(operands, |a, b| a >= b)),
                Operator::Less => with_numeric!(kind, N => chain::<N>(operands, |a, b| a < b)),
                Operator::LessEqual => with_numeric!(kind, N => chain::<N>(operands, |a, b| a <= b)),
                other => {
                    return Err(SableError::eval(format!(
                        "Operator {} is not numeric",
                        other.lexeme()
                    )))
                }
            };
            Ok(Literal::Boolean(holds))
        }
    }
}

// ============================================================================
// Booleans and equality
// ============================================================================

/// Early exit rule for `and`, `or`, `nand` and `nor`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortCircuit {
    /// Operand truth value that stops evaluation
    pub stop_on: bool,
    /// Result when evaluation stops early
    pub result: bool,
}

impl ShortCircuit {
    /// Result when every operand was evaluated
    pub fn exhausted(self) -> bool {
        !self.result
    }
}

pub fn short_circuit(operator: Operator) -> Option<ShortCircuit> {
    let (stop_on, result) = match operator {
        Operator::And => (false, false),
        Operator::Or => (true, true),
        Operator::Nand => (false, true),
        Operator::Nor => (true, false),
        _ => return None,
    };
    Some(ShortCircuit { stop_on, result })
}

fn logical(operator: Operator, operands: &[Literal]) -> Result<Literal> {
    if let Some(rule) = short_circuit(operator) {
        let stopped = operands.iter().any(|value| value.as_bool() == rule.stop_on);
        return Ok(Literal::Boolean(if stopped { rule.result } else { rule.exhausted() }));
    }

    let true_count = operands.iter().filter(|value| value.as_bool()).count();
    match operator {
        Operator::Xor => Ok(Literal::Boolean(true_count % 2 == 1)),
        Operator::Xnor => Ok(Literal::Boolean(true_count % 2 == 0)),
        Operator::Negate => match operands {
            [value] => Ok(Literal::Boolean(!value.as_bool())),
            _ => Err(SableError::eval(format!(
                "Negate expects exactly one operand, found {}",
                operands.len()
            ))),
        },
        other => Err(SableError::eval(format!(
            "Operator {} is not logical",
            other.lexeme()
        ))),
    }
}

fn equality(operator: Operator, operands: &[Literal]) -> Literal {
    let holds = match operator {
        Operator::Equals => operands.windows(2).all(|pair| pair[0] == pair[1]),
        Operator::RefEquality => operands
            .windows(2)
            .all(|pair| pair[0].is_ref_equal_to(&pair[1])),
        _ => operands.iter().enumerate().all(|(i, left)| {
            operands[i + 1..]
                .iter()
                .all(|right| !left.is_ref_equal_to(right))
        }),
    };
    Literal::Boolean(holds)
}

/// Apply `operator` to already evaluated operands
pub fn apply(operator: Operator, operands: &[Literal]) -> Result<Literal> {
    match operator {
        Operator::And
        | Operator::Or
        | Operator::Nand
        | Operator::Nor
        | Operator::Xor
        | Operator::Xnor
        | Operator::Negate => logical(operator, operands),
        Operator::Equals | Operator::RefEquality | Operator::RefNonEquality => {
            Ok(equality(operator, operands))
        }
        _ => arithmetic(operator, operands),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i32]) -> Vec<Literal> {
        values.iter().map(|v| Literal::Int(*v)).collect()
    }

    #[test]
    fn test_promotion_walk() {
        let op = Operator::Add;
        assert_eq!(promote(op, &[Literal::Int(1), Literal::Double(2.0)]).unwrap(), NumericType::Double);
        assert_eq!(promote(op, &[Literal::Long(1), Literal::Float(2.0)]).unwrap(), NumericType::Double);
        assert_eq!(promote(op, &[Literal::Float(1.0), Literal::Long(2)]).unwrap(), NumericType::Double);
        assert_eq!(
            promote(op, &[Literal::Int(1), Literal::Long(2), Literal::Int(3)]).unwrap(),
            NumericType::Long
        );
        assert_eq!(promote(op, &[Literal::Int(1), Literal::Float(2.0)]).unwrap(), NumericType::Int);
        assert_eq!(promote(op, &[Literal::Float(1.0), Literal::Int(2)]).unwrap(), NumericType::Double);
        assert_eq!(promote(op, &[Literal::Float(1.0), Literal::Float(2.0)]).unwrap(), NumericType::Float);
    }

    #[test]
    fn test_promotion_rejects_non_numeric() {
        let err = promote(Operator::Add, &[Literal::Int(1), Literal::string("a")]).unwrap_err();
        assert!(err.to_string().contains("expects numeric operands"));
        assert!(promote(Operator::Add, &[]).is_err());
        assert!(apply(Operator::Less, &[Literal::Boolean(true), Literal::Int(1)]).is_err());
    }

    #[test]
    fn test_arithmetic_folds() {
        assert_eq!(apply(Operator::Add, &ints(&[1, 2, 3])).unwrap(), Literal::Int(6));
        assert_eq!(apply(Operator::Subtract, &ints(&[10, 3, 2])).unwrap(), Literal::Int(5));
        assert_eq!(apply(Operator::Multiply, &ints(&[2, 3, 4])).unwrap(), Literal::Int(24));
        assert_eq!(apply(Operator::Divide, &ints(&[20, 2, 5])).unwrap(), Literal::Int(2));
        assert_eq!(apply(Operator::Modulo, &ints(&[17, 5])).unwrap(), Literal::Int(2));
        assert_eq!(
            apply(Operator::Add, &[Literal::Int(1), Literal::Double(0.5)]).unwrap(),
            Literal::Double(1.5)
        );
        // float after int truncates
        assert_eq!(
            apply(Operator::Add, &[Literal::Int(1), Literal::Float(2.5)]).unwrap(),
            Literal::Int(3)
        );
    }

    #[test]
    fn test_integer_edge_cases() {
        let err = apply(Operator::Divide, &ints(&[1, 0])).unwrap_err();
        assert!(err.message.contains("Division by zero"));
        assert!(apply(Operator::Modulo, &ints(&[1, 0])).is_err());
        assert_eq!(
            apply(Operator::Add, &ints(&[i32::MAX, 1])).unwrap(),
            Literal::Int(i32::MIN)
        );
        assert_eq!(
            apply(Operator::Divide, &ints(&[i32::MIN, -1])).unwrap(),
            Literal::Int(i32::MIN)
        );
        match apply(Operator::Divide, &[Literal::Double(1.0), Literal::Double(0.0)]).unwrap() {
            Literal::Double(v) => assert!(v.is_infinite()),
            other => panic!("Expected double, got {:?}", other),
        }
    }

    #[test]
    fn test_exponentiate_is_double() {
        assert_eq!(apply(Operator::Exponentiate, &ints(&[2, 3])).unwrap(), Literal::Double(8.0));
        assert_eq!(apply(Operator::Exponentiate, &ints(&[2, 3, 2])).unwrap(), Literal::Double(64.0));
    }

    #[test]
    fn test_increment_and_decrement_shapes() {
        match apply(Operator::Increment, &ints(&[1])).unwrap() {
            Literal::AList(items) => assert_eq!(*items, vec![Literal::Int(2)]),
            other => panic!("Expected alist, got {:?}", other),
        }
        assert_eq!(apply(Operator::Decrement, &ints(&[1])).unwrap(), Literal::Int(0));
        match apply(Operator::Decrement, &ints(&[1, 5])).unwrap() {
            Literal::AList(items) => assert_eq!(*items, ints(&[0, 4])),
            other => panic!("Expected alist, got {:?}", other),
        }
    }

    #[test]
    fn test_chained_comparisons() {
        assert_eq!(apply(Operator::Less, &ints(&[1, 2, 3])).unwrap(), Literal::Boolean(true));
        assert_eq!(apply(Operator::Less, &ints(&[1, 3, 2])).unwrap(), Literal::Boolean(false));
        assert_eq!(apply(Operator::LessEqual, &ints(&[1, 1, 2])).unwrap(), Literal::Boolean(true));
        assert_eq!(apply(Operator::Greater, &ints(&[3, 2, 1])).unwrap(), Literal::Boolean(true));
        assert_eq!(
            apply(Operator::GreaterEqual, &[Literal::Double(2.5), Literal::Int(2)]).unwrap(),
            Literal::Boolean(true)
        );
    }

    #[test]
    fn test_boolean_operators() {
        let t = Literal::Boolean(true);
        let f = Literal::Boolean(false);
        let check = |op, operands: &[Literal], expected| {
            assert_eq!(apply(op, operands).unwrap(), Literal::Boolean(expected), "{:?}", op);
        };

        check(Operator::And, &[t.clone(), t.clone()], true);
        check(Operator::And, &[t.clone(), f.clone()], false);
        check(Operator::Or, &[f.clone(), t.clone()], true);
        check(Operator::Or, &[f.clone(), f.clone()], false);
        check(Operator::Nand, &[t.clone(), f.clone()], true);
        check(Operator::Nand, &[t.clone(), t.clone()], false);
        check(Operator::Nor, &[f.clone(), f.clone()], true);
        check(Operator::Nor, &[f.clone(), t.clone()], false);
        check(Operator::Xor, &[t.clone(), f.clone(), f.clone()], true);
        check(Operator::Xor, &[t.clone(), t.clone()], false);
        check(Operator::Xnor, &[t.clone(), t.clone()], true);
        check(Operator::Negate, &[f.clone()], true);
        assert!(apply(Operator::Negate, &[]).is_err());
    }

    #[test]
    fn test_equality_flavours() {
        let shared = Literal::string("a");
        assert_eq!(
            apply(Operator::Equals, &[Literal::string("a"), Literal::string("a")]).unwrap(),
            Literal::Boolean(true)
        );
        assert_eq!(
            apply(Operator::Equals, &[Literal::Int(1), Literal::Double(1.0)]).unwrap(),
            Literal::Boolean(false)
        );
        assert_eq!(
            apply(Operator::Equals, &[Literal::Null, Literal::Int(1)]).unwrap(),
            Literal::Boolean(false)
        );
        assert_eq!(
            apply(Operator::RefEquality, &[Literal::Int(1), Literal::Double(1.0)]).unwrap(),
            Literal::Boolean(true)
        );
        assert_eq!(
            apply(Operator::RefEquality, &[Literal::string("a"), Literal::string("a")]).unwrap(),
            Literal::Boolean(false)
        );
        assert_eq!(
            apply(Operator::RefEquality, &[shared.clone(), shared.clone()]).unwrap(),
            Literal::Boolean(true)
        );
        assert_eq!(
            apply(Operator::RefNonEquality, &ints(&[1, 2, 3])).unwrap(),
            Literal::Boolean(true)
        );
        assert_eq!(
            apply(Operator::RefNonEquality, &ints(&[1, 2, 1])).unwrap(),
            Literal::Boolean(false)
        );
    }
}
