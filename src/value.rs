//! The runtime value model: a tagged union plus the single reference-shared
//! dictionary type that stands in for struct instances, 1-D arrays, 2-D
//! matrices, and user dict literals alike (spec §3, §9 "Dictionary as
//! universal container").

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::AscensionError;

/// Reserved dictionary keys that give a plain `Dict` its special shapes.
pub mod reserved {
    pub const TYPE: &str = "__type__";
    pub const MATRIX: &str = "__matrix__";
    pub const ROWS: &str = "__rows__";
    pub const COLS: &str = "__cols__";
}

/// A dictionary key. Ascension dicts accept both string and integer keys;
/// `keys()` (spec §8) needs a stable base ordering before the mixed-type
/// sort rule is layered on, so this type orders integers before strings and
/// otherwise compares within a variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    pub fn as_display(&self) -> String {
        match self {
            Key::Int(i) => i.to_string(),
            Key::Str(s) => s.clone(),
        }
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

/// The shared backing store for struct instances, arrays, matrices and dict
/// literals. Wrapped in `Rc<RefCell<_>>` by [`Value::Dict`] so that passing
/// one to a function shares the same storage with the caller (spec §3
/// Ownership).
#[derive(Debug, Default)]
pub struct Dict {
    pub entries: BTreeMap<Key, Value>,
}

impl Dict {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    pub fn get(&self, key: &Key) -> Value {
        self.entries.get(key).cloned().unwrap_or(Value::Int(0))
    }

    pub fn set(&mut self, key: Key, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn type_name(&self) -> Option<&str> {
        match self.entries.get(&Key::Str(reserved::TYPE.to_string())) {
            Some(Value::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self.entries.get(&Key::Str(reserved::MATRIX.to_string())), Some(Value::Int(1)))
    }

    pub fn rows(&self) -> i64 {
        match self.entries.get(&Key::Str(reserved::ROWS.to_string())) {
            Some(Value::Int(i)) => *i,
            _ => 0,
        }
    }

    pub fn cols(&self) -> i64 {
        match self.entries.get(&Key::Str(reserved::COLS.to_string())) {
            Some(Value::Int(i)) => *i,
            _ => 0,
        }
    }

    pub fn set_rows(&mut self, rows: i64) {
        self.entries.insert(Key::Str(reserved::ROWS.to_string()), Value::Int(rows));
    }

    pub fn set_cols(&mut self, cols: i64) {
        self.entries.insert(Key::Str(reserved::COLS.to_string()), Value::Int(cols));
    }

    /// `keys()` (spec §8): every key other than `__type__`, in the mixed-type
    /// order described in spec §9(c) — integers and strings both rendered
    /// through their display form and compared lexicographically. This
    /// preserves the source's loosely-defined mixed-key ordering rather than
    /// inventing a stricter one.
    pub fn sorted_keys(&self) -> Vec<Key> {
        let mut ks: Vec<&Key> = self
            .entries
            .keys()
            .filter(|k| **k != Key::Str(reserved::TYPE.to_string()))
            .collect();
        ks.sort_by(|a, b| a.as_display().cmp(&b.as_display()));
        ks.into_iter().cloned().collect()
    }
}

/// The tagged value union (spec §3, §9).
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
    Dict(Rc<RefCell<Dict>>),
}

impl Value {
    pub fn new_dict() -> Self {
        Value::Dict(Rc::new(RefCell::new(Dict::new())))
    }

    pub fn new_struct(type_name: &str, fields: &[String]) -> Self {
        let mut dict = Dict::new();
        dict.set(Key::Str(reserved::TYPE.to_string()), Value::Str(type_name.to_string()));
        for f in fields {
            dict.set(Key::Str(f.clone()), Value::Int(0));
        }
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn new_matrix(rows: i64, cols: i64, fill: Value) -> Self {
        let mut dict = Dict::new();
        dict.set(Key::Str(reserved::MATRIX.to_string()), Value::Int(1));
        dict.set(Key::Str(reserved::ROWS.to_string()), Value::Int(rows));
        dict.set(Key::Str(reserved::COLS.to_string()), Value::Int(cols));
        for r in 0..rows {
            for c in 0..cols {
                dict.set(Key::Str(format!("{r},{c}")), fill.clone());
            }
        }
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    /// Truthiness for `AND`/`OR`/`JZ`/`JNZ`: NULL, 0, and empty string are
    /// falsy; everything else (including dicts) is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
            Value::Dict(_) => true,
        }
    }

    pub fn as_dict(&self) -> Option<Rc<RefCell<Dict>>> {
        match self {
            Value::Dict(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Coerce to `f64` for arithmetic. Strings that parse as numbers convert;
    /// anything else becomes `0.0` (arithmetic-context default, spec §8).
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Str(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Value::Null => 0.0,
            Value::Dict(_) => 0.0,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Str(s) => s.trim().parse::<i64>().unwrap_or(0),
            Value::Null => 0,
            Value::Dict(_) => 0,
        }
    }

    pub fn to_int(&self) -> Result<Value, AscensionError> {
        match self {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => Ok(Value::Int(*f as i64)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| s.trim().parse::<f64>().map(|f| Value::Int(f as i64)))
                .map_err(|_| AscensionError::conversion(format!("cannot convert '{s}' to int"))),
            Value::Null => Err(AscensionError::conversion("cannot convert NULL to int")),
            Value::Dict(_) => Err(AscensionError::conversion("cannot convert dict to int")),
        }
    }

    pub fn to_float(&self) -> Result<Value, AscensionError> {
        match self {
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| AscensionError::conversion(format!("cannot convert '{s}' to float"))),
            Value::Null => Err(AscensionError::conversion("cannot convert NULL to float")),
            Value::Dict(_) => Err(AscensionError::conversion("cannot convert dict to float")),
        }
    }

    /// String form used by `PRINT` and `+` concatenation: integral floats
    /// print without a decimal point (spec §4.3, scenario 4).
    pub fn display_string(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
            Value::Str(s) => s.clone(),
            Value::Null => "NULL".to_string(),
            Value::Dict(_) => "[dict]".to_string(),
        }
    }

    /// Raw equality used by `EQ`/`NEQ`: no coercion across type tags, so
    /// `NULL == 0` is false (spec §8).
    pub fn raw_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

/// Numeric comparison used by `GT`/`LT`/`GTE`/`LTE`, coercing both sides to
/// float the way the other binary arithmetic ops do.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_matches_spec_falsy_set() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Int(1).truthy());
        assert!(Value::Str("x".into()).truthy());
    }

    #[test]
    fn raw_eq_distinguishes_null_from_zero() {
        assert!(!Value::Null.raw_eq(&Value::Int(0)));
        assert!(Value::Int(0).raw_eq(&Value::Int(0)));
    }

    #[test]
    fn display_string_collapses_integral_floats() {
        assert_eq!(Value::Float(3.0).display_string(), "3");
        assert_eq!(Value::Float(3.5).display_string(), "3.5");
    }

    #[test]
    fn dict_sharing_is_reference_semantics() {
        let d = Value::new_dict();
        let d2 = d.clone();
        if let (Value::Dict(a), Value::Dict(b)) = (&d, &d2) {
            a.borrow_mut().set(Key::Str("x".into()), Value::Int(5));
            assert_eq!(b.borrow().get(&Key::Str("x".into())).as_i64(), 5);
        } else {
            panic!("expected dicts");
        }
    }

    #[test]
    fn matrix_bounds_grow_monotonically() {
        let m = Value::new_matrix(2, 3, Value::Int(0));
        if let Value::Dict(d) = &m {
            assert_eq!(d.borrow().rows(), 2);
            assert_eq!(d.borrow().cols(), 3);
        }
    }
}
