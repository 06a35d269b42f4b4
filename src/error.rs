//! Runtime interpreter error implementation

use thiserror::Error;

/// Script-visible exception taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExceptionKind {
    /// Generic `Error`.
    Error,
    /// `TypeError`.
    TypeError,
    /// `ReferenceError`.
    ReferenceError,
    /// `SyntaxError`.
    SyntaxError,
    /// `RangeError`.
    RangeError,
    /// `URIError`.
    UriError,
    /// `EvalError`.
    EvalError,
}

impl ExceptionKind {
    /// Constructor name of the exception class.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::TypeError => "TypeError",
            Self::ReferenceError => "ReferenceError",
            Self::SyntaxError => "SyntaxError",
            Self::RangeError => "RangeError",
            Self::UriError => "URIError",
            Self::EvalError => "EvalError",
        }
    }
}

impl core::fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Interpreter runtime error variants reported to the host.
///
/// Script-level exceptions travel through the engine as the `ERROR` value
/// sentinel with the payload parked in the context exception slot; they only
/// become an [`EngineError`] when they escape the outermost frame of an
/// entry point.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An exception escaped every handler of the executed code.
    #[error("Uncaught {kind}: {message}")]
    Uncaught {
        /// Exception class, when the thrown value was an error object.
        kind: ExceptionKind,
        /// Rendered exception value.
        message: Box<str>,
    },
    /// The host stop-hook (or an engine fatal) aborted execution; aborts
    /// bypass every `catch`.
    #[error("Execution aborted: {0}")]
    Aborted(Box<str>),
    /// The bytecode stream violated the compiled-code contract.
    #[error("Malformed bytecode: {0}")]
    InvalidBytecode(&'static str),
}

/// Marker returned by fallible interpreter operations.
///
/// The exception payload never travels with the error: it sits in the
/// per-context exception slot, keeping the side channel separate from the
/// value domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Thrown;

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn exception_kind_names_match_constructors() {
        for kind in ExceptionKind::iter() {
            assert!(kind.name().ends_with("Error"));
        }
        assert_eq!(ExceptionKind::TypeError.name(), "TypeError");
        assert_eq!(ExceptionKind::UriError.name(), "URIError");
    }
}
