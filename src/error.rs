//! Error taxonomy for the compiler and virtual machine.

use thiserror::Error;

/// The family an [`AscensionError`] belongs to, mirrored 1:1 onto the
/// script-visible `kind` tag carried by a caught error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Call to an undefined function, or a prototype left without a body.
    LinkerError,
    /// Arity mismatch between a prototype and its eventual definition.
    PrototypeError,
    /// `to_int`/`to_float` applied to an unparsable value.
    ConversionError,
    /// Illegal operand types remain after coercion.
    TypeError,
    /// Division or modulo by zero.
    DivisionByZero,
    /// Domain error in a math built-in (`sqrt`, `log`, `asin`, `acos`, ...).
    MathError,
    /// Any other host or VM-internal failure.
    RuntimeError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::LinkerError => "LinkerError",
            ErrorKind::PrototypeError => "PrototypeError",
            ErrorKind::ConversionError => "ConversionError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::DivisionByZero => "DivisionByZero",
            ErrorKind::MathError => "MathError",
            ErrorKind::RuntimeError => "RuntimeError",
        };
        write!(f, "{s}")
    }
}

/// A single error value, carrying a kind tag and a human-readable message.
///
/// Compile-time errors never carry an `ip`; run-time errors that escape every
/// `try/catch` do, so the CLI can print `Uncaught @ IP <n>: <message>`.
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct AscensionError {
    pub kind: ErrorKind,
    pub message: String,
    pub ip: Option<usize>,
}

impl AscensionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), ip: None }
    }

    pub fn with_ip(mut self, ip: usize) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn linker(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LinkerError, message)
    }

    pub fn prototype(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PrototypeError, message)
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConversionError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn division_by_zero() -> Self {
        Self::new(ErrorKind::DivisionByZero, "division by zero")
    }

    pub fn math(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MathError, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message)
    }

    /// Render the diagnostic line printed for an uncaught error (spec §7).
    pub fn diagnostic(&self) -> String {
        match self.ip {
            Some(ip) => format!("Uncaught @ IP {ip}: {}", self.message),
            None => format!("Uncaught: {}", self.message),
        }
    }
}

pub type Result<T> = std::result::Result<T, AscensionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_includes_ip_when_present() {
        let e = AscensionError::runtime("boom").with_ip(42);
        assert_eq!(e.diagnostic(), "Uncaught @ IP 42: boom");
    }

    #[test]
    fn diagnostic_without_ip() {
        let e = AscensionError::prototype("odd/1 redefined with 2 params");
        assert_eq!(e.diagnostic(), "Uncaught: odd/1 redefined with 2 params");
    }

    #[test]
    fn kind_display_matches_tag_names() {
        assert_eq!(ErrorKind::DivisionByZero.to_string(), "DivisionByZero");
        assert_eq!(ErrorKind::MathError.to_string(), "MathError");
    }
}
