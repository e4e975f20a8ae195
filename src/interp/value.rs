use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::HashSet,
    fmt::{self, Display, Formatter},
    rc::Rc,
};

use crate::{
    compile::ast::{BinaryOp, UnaryOp},
    infra::format_float,
};

use super::error::RuntimeError;

/// Lists are shared: assigning a list to a second name aliases it.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// Identity of a list, used to notice a list that (indirectly) contains itself.
type ListId = *const RefCell<Vec<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn new(start: i64, stop: i64, step: i64) -> Result<Self, RuntimeError> {
        match step {
            0 => Err(RuntimeError::RangeStepZero),
            step => Ok(Self { start, stop, step }),
        }
    }

    pub fn values(self) -> impl Iterator<Item = i64> {
        let Self { start, stop, step } = self;

        std::iter::successors(Some(start), move |value| value.checked_add(step)).take_while(
            move |value| {
                if step > 0 {
                    *value < stop
                } else {
                    *value > stop
                }
            },
        )
    }

    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }

    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            i128::from(self.stop) - i128::from(self.start)
        } else {
            i128::from(self.start) - i128::from(self.stop)
        };
        let step = i128::from(self.step).abs();

        match span {
            span if span <= 0 => 0,
            span => usize::try_from((span + step - 1) / step).unwrap_or(usize::MAX),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(ListRef),
    Range(RangeValue),
}

enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(&self) -> f64 {
        match self {
            Self::Int(value) => *value as f64,
            Self::Float(value) => *value,
        }
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Range(_) => "range",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::Bool(value) => *value,
            Self::Str(value) => !value.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Range(range) => !range.is_empty(),
        }
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            Self::Int(value) => Some(Number::Int(*value)),
            Self::Float(value) => Some(Number::Float(*value)),
            _ => None,
        }
    }

    /// Structural equality. Integers and floats compare by value.
    pub fn equals(&self, other: &Value) -> bool {
        self.equals_within(other, &mut HashSet::new())
    }

    /// A pair of lists already under comparison counts as equal, so cyclic lists terminate.
    fn equals_within(&self, other: &Value, comparing: &mut HashSet<(ListId, ListId)>) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                if Rc::ptr_eq(a, b) || !comparing.insert((Rc::as_ptr(a), Rc::as_ptr(b))) {
                    return true;
                }

                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.equals_within(y, comparing))
            }
            (Self::Range(a), Self::Range(b)) => a == b,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
                _ => false,
            },
        }
    }

    /// The quoted form used for elements inside a printed list.
    pub fn repr(&self) -> String {
        match self {
            Self::Str(value) => quote(value),
            other => other.to_string(),
        }
    }
}

fn quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\t', "\\t");

    format!("'{escaped}'")
}

/// Writes a list, printing `[...]` for a list that is already being written further up.
fn write_list(f: &mut Formatter<'_>, items: &ListRef, open: &mut HashSet<ListId>) -> fmt::Result {
    let id = Rc::as_ptr(items);
    if !open.insert(id) {
        return write!(f, "[...]");
    }

    write!(f, "[")?;
    for (i, item) in items.borrow().iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }

        match item {
            Value::List(inner) => write_list(f, inner, open)?,
            other => write!(f, "{}", other.repr())?,
        }
    }
    open.remove(&id);

    write!(f, "]")
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{}", format_float(*value)),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Str(value) => write!(f, "{value}"),
            Self::List(items) => write_list(f, items, &mut HashSet::new()),
            Self::Range(RangeValue { start, stop, step }) => match step {
                1 => write!(f, "range({start}, {stop})"),
                step => write!(f, "range({start}, {stop}, {step})"),
            },
        }
    }
}

fn checked(value: Option<i64>, operation: &'static str) -> Result<Value, RuntimeError> {
    value
        .map(Value::Int)
        .ok_or(RuntimeError::IntegerOverflow { operation })
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Add => checked(a.checked_add(b), "addition"),
        BinaryOp::Sub => checked(a.checked_sub(b), "subtraction"),
        BinaryOp::Mul => checked(a.checked_mul(b), "multiplication"),
        BinaryOp::Div => match b {
            0 => Err(RuntimeError::DivisionByZero),
            b => Ok(Value::Float(a as f64 / b as f64)),
        },
        BinaryOp::Mod => match b {
            0 => Err(RuntimeError::ModuloByZero),
            b => {
                let rem = a
                    .checked_rem(b)
                    .ok_or(RuntimeError::IntegerOverflow { operation: "modulo" })?;

                // floored: the result takes the sign of the divisor
                if rem != 0 && (rem < 0) != (b < 0) {
                    Ok(Value::Int(rem + b))
                } else {
                    Ok(Value::Int(rem))
                }
            }
        },
        _ => unreachable!("not an arithmetic operator: {op}"),
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div if b == 0.0 => Err(RuntimeError::DivisionByZero),
        BinaryOp::Div => Ok(Value::Float(a / b)),
        BinaryOp::Mod if b == 0.0 => Err(RuntimeError::ModuloByZero),
        BinaryOp::Mod => {
            let rem = a % b;

            if rem != 0.0 && (rem < 0.0) != (b < 0.0) {
                Ok(Value::Float(rem + b))
            } else {
                Ok(Value::Float(rem))
            }
        }
        _ => unreachable!("not an arithmetic operator: {op}"),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => Ok(Value::Str(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        _ => match (left.as_number(), right.as_number()) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => int_arithmetic(op, a, b),
            (Some(a), Some(b)) => float_arithmetic(op, a.as_f64(), b.as_f64()),
            _ => Err(RuntimeError::UnsupportedOperands {
                op,
                left: left.type_name(),
                right: right.type_name(),
            }),
        },
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => {
                return Err(RuntimeError::UnsupportedOperands {
                    op,
                    left: left.type_name(),
                    right: right.type_name(),
                });
            }
        },
    };

    let result = match ordering {
        None => false,
        Some(ordering) => match op {
            BinaryOp::Less => ordering == Ordering::Less,
            BinaryOp::LessEq => ordering != Ordering::Greater,
            BinaryOp::Greater => ordering == Ordering::Greater,
            BinaryOp::GreaterEq => ordering != Ordering::Less,
            _ => unreachable!("not an ordering operator: {op}"),
        },
    };

    Ok(Value::Bool(result))
}

/// Applies a binary operator to two already evaluated operands.
pub fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::And => Ok(if left.is_truthy() { right } else { left }),
        BinaryOp::Or => Ok(if left.is_truthy() { left } else { right }),
        BinaryOp::Eq => Ok(Value::Bool(left.equals(&right))),
        BinaryOp::NotEq => Ok(Value::Bool(!left.equals(&right))),
        BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
            compare(op, &left, &right)
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, &left, &right)
        }
    }
}

pub fn unary(op: UnaryOp, operand: Value) -> Result<Value, RuntimeError> {
    match (op, operand) {
        (UnaryOp::Not, operand) => Ok(Value::Bool(!operand.is_truthy())),
        (UnaryOp::Neg, Value::Int(value)) => checked(value.checked_neg(), "negation"),
        (UnaryOp::Neg, Value::Float(value)) => Ok(Value::Float(-value)),
        (UnaryOp::Neg, operand) => Err(RuntimeError::UnsupportedOperand {
            op,
            type_name: operand.type_name(),
        }),
    }
}

fn position(index: i64, len: usize) -> Result<usize, RuntimeError> {
    usize::try_from(index)
        .ok()
        .filter(|position| *position < len)
        .ok_or(RuntimeError::IndexOutOfRange { index, len })
}

/// Reads `target[index]`. Negative indices are out of range.
pub fn index(target: &Value, index: &Value) -> Result<Value, RuntimeError> {
    if !matches!(target, Value::List(_) | Value::Str(_)) {
        return Err(RuntimeError::NotIndexable {
            type_name: target.type_name(),
        });
    }

    let Value::Int(index) = index else {
        return Err(RuntimeError::IndexNotInteger {
            type_name: index.type_name(),
        });
    };

    match target {
        Value::List(items) => {
            let items = items.borrow();
            let at = position(*index, items.len())?;
            Ok(items[at].clone())
        }
        Value::Str(text) => {
            let len = text.chars().count();
            let at = position(*index, len)?;
            Ok(text
                .chars()
                .nth(at)
                .map_or(Value::None, |c| Value::Str(c.to_string())))
        }
        _ => unreachable!(),
    }
}

/// Writes `list[index] = value` in place, so every alias observes the change.
pub fn store(list: &ListRef, index: &Value, value: Value) -> Result<(), RuntimeError> {
    let Value::Int(index) = index else {
        return Err(RuntimeError::IndexNotInteger {
            type_name: index.type_name(),
        });
    };

    let mut items = list.borrow_mut();
    let at = position(*index, items.len())?;
    items[at] = value;

    Ok(())
}

pub fn len(target: &Value) -> Result<Value, RuntimeError> {
    let len = match target {
        Value::List(items) => items.borrow().len(),
        Value::Str(text) => text.chars().count(),
        other => {
            return Err(RuntimeError::LenUnsupported {
                type_name: other.type_name(),
            });
        }
    };

    i64::try_from(len)
        .map(Value::Int)
        .map_err(|_| RuntimeError::IntegerOverflow { operation: "len" })
}

fn expect_args(method: &str, args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    match args.len() {
        found if found == expected => Ok(()),
        found => Err(RuntimeError::MethodArityMismatch {
            method: method.to_string(),
            expected,
            found,
        }),
    }
}

fn string_arg<'a>(method: &str, arg: &'a Value) -> Result<&'a str, RuntimeError> {
    match arg {
        Value::Str(text) => Ok(text),
        other => Err(RuntimeError::MethodArgument {
            method: method.to_string(),
            type_name: other.type_name(),
        }),
    }
}

/// Dispatches `receiver.method(args)`. Only strings carry methods.
pub fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    let Value::Str(text) = receiver else {
        return Err(RuntimeError::MethodOnNonString {
            method: method.to_string(),
            type_name: receiver.type_name(),
        });
    };

    match method {
        "upper" => {
            expect_args(method, args, 0)?;
            Ok(Value::Str(text.to_uppercase()))
        }
        "lower" => {
            expect_args(method, args, 0)?;
            Ok(Value::Str(text.to_lowercase()))
        }
        "strip" => {
            expect_args(method, args, 0)?;
            Ok(Value::Str(text.trim().to_string()))
        }
        "replace" => {
            expect_args(method, args, 2)?;
            let old = string_arg(method, &args[0])?;
            let new = string_arg(method, &args[1])?;
            Ok(Value::Str(text.replace(old, new)))
        }
        _ => Err(RuntimeError::UnknownMethod {
            method: method.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn division_always_yields_float() {
        let result = binary(BinaryOp::Div, Value::Int(7), Value::Int(2)).unwrap();

        assert_eq!(result.to_string(), "3.5");
        assert_eq!(
            binary(BinaryOp::Div, Value::Int(4), Value::Int(2))
                .unwrap()
                .to_string(),
            "2.0"
        );
    }

    #[test]
    fn modulo_is_floored() {
        let result = binary(BinaryOp::Mod, Value::Int(-7), Value::Int(3)).unwrap();

        assert!(result.equals(&Value::Int(2)));
    }

    #[test]
    fn zero_divisors_are_errors() {
        assert_eq!(
            binary(BinaryOp::Div, Value::Int(1), Value::Int(0)).unwrap_err(),
            RuntimeError::DivisionByZero
        );
        assert_eq!(
            binary(BinaryOp::Mod, Value::Float(1.0), Value::Float(0.0)).unwrap_err(),
            RuntimeError::ModuloByZero
        );
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(
            binary(BinaryOp::Mul, Value::Int(i64::MAX), Value::Int(2)).unwrap_err(),
            RuntimeError::IntegerOverflow {
                operation: "multiplication"
            }
        );
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        let result = binary(BinaryOp::Add, Value::Int(1), Value::Float(0.5)).unwrap();

        assert_eq!(result.to_string(), "1.5");
    }

    #[test]
    fn concatenation_requires_matching_types() {
        let joined = binary(BinaryOp::Add, Value::Str("ab".into()), Value::Str("c".into()));
        assert_eq!(joined.unwrap().to_string(), "abc");

        let err = binary(BinaryOp::Add, Value::Str("a".into()), Value::Int(1)).unwrap_err();
        assert!(matches!(err, RuntimeError::UnsupportedOperands { .. }));

        let lists = binary(BinaryOp::Add, ints(&[1]), ints(&[2, 3])).unwrap();
        assert_eq!(lists.to_string(), "[1, 2, 3]");
    }

    #[test]
    fn logical_operators_return_operands() {
        let result = binary(BinaryOp::Or, Value::Int(0), Value::Str("x".into())).unwrap();
        assert_eq!(result.to_string(), "x");

        let result = binary(BinaryOp::And, Value::Int(0), Value::Int(5)).unwrap();
        assert_eq!(result.to_string(), "0");
    }

    #[test]
    fn lists_print_with_quoted_strings() {
        let list = Value::list(vec![Value::Int(1), Value::Str("a".into()), Value::Bool(true)]);

        assert_eq!(list.to_string(), "[1, 'a', True]");
    }

    #[test]
    fn self_containing_lists_print_and_compare() {
        let a = ints(&[1, 2]);
        let b = ints(&[1, 2]);
        for list in [&a, &b] {
            if let Value::List(items) = list {
                items.borrow_mut()[0] = list.clone();
            }
        }

        assert_eq!(a.to_string(), "[[...], 2]");
        assert!(a.equals(&b));
        assert!(!a.equals(&ints(&[1, 2])));
    }

    #[test]
    fn indexing_checks_bounds() {
        let list = ints(&[1, 2, 3]);

        assert_eq!(index(&list, &Value::Int(1)).unwrap().to_string(), "2");
        assert_eq!(
            index(&list, &Value::Int(3)).unwrap_err(),
            RuntimeError::IndexOutOfRange { index: 3, len: 3 }
        );
        assert_eq!(
            index(&list, &Value::Int(-1)).unwrap_err(),
            RuntimeError::IndexOutOfRange { index: -1, len: 3 }
        );
        assert!(matches!(
            index(&Value::Int(3), &Value::Int(0)).unwrap_err(),
            RuntimeError::NotIndexable { .. }
        ));
    }

    #[test]
    fn ranges_count_in_both_directions() {
        let up = RangeValue::new(0, 10, 3).unwrap();
        let down = RangeValue::new(5, 0, -2).unwrap();

        assert_eq!(up.values().collect::<Vec<_>>(), vec![0, 3, 6, 9]);
        assert_eq!(down.values().collect::<Vec<_>>(), vec![5, 3, 1]);
        assert_eq!(up.len(), 4);
        assert_eq!(down.len(), 3);
        assert_eq!(RangeValue::new(0, 1, 0), Err(RuntimeError::RangeStepZero));
    }

    #[test]
    fn string_methods() {
        let text = Value::Str("  Hello ".into());

        assert_eq!(call_method(&text, "strip", &[]).unwrap().to_string(), "Hello");
        assert_eq!(call_method(&text, "upper", &[]).unwrap().to_string(), "  HELLO ");
        assert_eq!(
            call_method(
                &text,
                "replace",
                &[Value::Str("l".into()), Value::Str("L".into())]
            )
            .unwrap()
            .to_string(),
            "  HeLLo "
        );
        assert!(matches!(
            call_method(&text, "title", &[]).unwrap_err(),
            RuntimeError::UnknownMethod { .. }
        ));
        assert!(matches!(
            call_method(&Value::Int(1), "upper", &[]).unwrap_err(),
            RuntimeError::MethodOnNonString { .. }
        ));
    }
}
