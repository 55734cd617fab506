//! Arithmetic, comparison and coercion helpers shared by the dispatch loop
//! (spec §4.3 "Arithmetic and comparison").

use crate::error::{AscensionError, Result};
use crate::value::Value;

/// `+, -, *, /, %` with NULL-propagation, string concatenation on `+`, and
/// float-to-integer collapse when the result happens to be integral.
pub fn arith(op: char, a: &Value, b: &Value) -> Result<Value> {
    if matches!(a, Value::Null) || matches!(b, Value::Null) {
        return Ok(Value::Null);
    }

    if op == '+' {
        if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
            return Ok(Value::Str(format!("{}{}", a.display_string(), b.display_string())));
        }
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        '+' => x + y,
        '-' => x - y,
        '*' => x * y,
        '/' => {
            if y == 0.0 {
                return Err(AscensionError::division_by_zero());
            }
            x / y
        }
        '%' => {
            if y == 0.0 {
                return Err(AscensionError::division_by_zero());
            }
            x % y
        }
        _ => return Err(AscensionError::type_error(format!("unknown arithmetic op '{op}'"))),
    };

    Ok(collapse(result))
}

/// Collapse an integral `f64` result to `Value::Int`, matching spec §4.3
/// ("if the float result is integral, collapse to integer").
pub fn collapse(f: f64) -> Value {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_concat_coerces_numbers() {
        let v = arith('+', &Value::Str("v=".into()), &Value::Int(3)).unwrap();
        assert_eq!(v.display_string(), "v=3");
    }

    #[test]
    fn null_propagates() {
        assert!(matches!(arith('+', &Value::Null, &Value::Int(1)).unwrap(), Value::Null));
    }

    #[test]
    fn division_by_zero_errors() {
        let err = arith('/', &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::DivisionByZero);
    }

    #[test]
    fn integral_float_collapses_to_int() {
        let v = arith('*', &Value::Float(2.0), &Value::Float(3.0)).unwrap();
        assert!(matches!(v, Value::Int(6)));
    }
}
