//! Math and RNG builtins (spec §8 "sqrt, pow, exp, log, trig, random").

use rand::Rng;

use crate::error::{AscensionError, Result};
use crate::opcode::HostOp;
use crate::value::Value;
use crate::vm::ops::collapse;

use super::{arg_f64, arg_i64};

pub struct StdMath;

impl StdMath {
    pub fn new() -> Self {
        Self
    }

    pub fn call(&mut self, op: HostOp, args: Vec<Value>) -> Result<Value> {
        use HostOp::*;
        let x = arg_f64(&args, 0);
        let y = arg_f64(&args, 1);

        let result = match op {
            Sqrt if x < 0.0 => return Err(AscensionError::math("sqrt of a negative number")),
            Sqrt => x.sqrt(),
            Pow => x.powf(y),
            Exp => x.exp(),
            Log if x <= 0.0 => return Err(AscensionError::math("log of a non-positive number")),
            Log => x.ln(),
            Abs => x.abs(),
            Floor => x.floor(),
            Ceil => x.ceil(),
            Sin => x.sin(),
            Cos => x.cos(),
            Tan => x.tan(),
            Asin if !(-1.0..=1.0).contains(&x) => return Err(AscensionError::math("asin out of domain")),
            Asin => x.asin(),
            Acos if !(-1.0..=1.0).contains(&x) => return Err(AscensionError::math("acos out of domain")),
            Acos => x.acos(),
            Atan => x.atan(),
            Atan2 => x.atan2(y),
            RandomUnit => rand::thread_rng().gen::<f64>(),
            RandomMax => {
                let max = arg_i64(&args, 0).max(1);
                return Ok(Value::Int(rand::thread_rng().gen_range(0..max)));
            }
            RandomRange => {
                let (lo, hi) = (arg_i64(&args, 0), arg_i64(&args, 1));
                let (lo, hi) = if lo < hi { (lo, hi) } else { (hi, lo + 1) };
                return Ok(Value::Int(rand::thread_rng().gen_range(lo..hi)));
            }
            other => unreachable!("{other:?} is not a math op"),
        };

        Ok(collapse(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_of_negative_is_math_error() {
        let mut m = StdMath::new();
        let err = m.call(HostOp::Sqrt, vec![Value::Int(-1)]).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::MathError);
    }

    #[test]
    fn pow_computes_integral_result() {
        let mut m = StdMath::new();
        let v = m.call(HostOp::Pow, vec![Value::Int(2), Value::Int(10)]).unwrap();
        assert!(matches!(v, Value::Int(1024)));
    }

    #[test]
    fn random_range_respects_bounds() {
        let mut m = StdMath::new();
        for _ in 0..50 {
            let v = m.call(HostOp::RandomRange, vec![Value::Int(3), Value::Int(7)]).unwrap();
            let n = v.as_i64();
            assert!((3..7).contains(&n));
        }
    }

    #[test]
    fn random_max_is_exclusive_upper_bound() {
        let mut m = StdMath::new();
        for _ in 0..50 {
            let v = m.call(HostOp::RandomMax, vec![Value::Int(5)]).unwrap();
            let n = v.as_i64();
            assert!((0..5).contains(&n));
        }
    }
}
