use thiserror::Error;

/// Category of a runtime failure, exposed to `catch` as the `type` child.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// Malformed keyword usage: missing or misordered siblings, wrong node shape.
    Structural,
    /// Bad input data, such as a node without a name or a malformed selector.
    Validation,
    /// A configured ceiling was exceeded.
    ResourceExhausted,
    /// An operator invoked out of context.
    Evaluation,
    /// A handler registration that does not satisfy the loader contract.
    Discovery,
    /// Raised explicitly by a script through `throw`.
    Thrown,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} error: {message}")]
pub struct LambdaError {
    kind: ErrorKind,
    message: String,
    trace: Vec<String>,
}

pub type LambdaResult<T> = Result<T, LambdaError>;

impl LambdaError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn structural<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Structural, message)
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    pub fn evaluation<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Evaluation, message)
    }

    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Discovery, message)
    }

    pub fn thrown<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Thrown, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Event names the error crossed while propagating, innermost first.
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub(crate) fn traced(mut self, event: &str) -> Self {
        self.trace.push(event.to_string());
        self
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Lambda error: {0}")]
    Lambda(#[from] LambdaError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_names() {
        assert_eq!(ErrorKind::Structural.to_string(), "structural");
        assert_eq!(ErrorKind::ResourceExhausted.to_string(), "resource-exhausted");
        assert_eq!(
            ErrorKind::from_str("thrown").unwrap(),
            ErrorKind::Thrown
        );
    }

    #[test]
    fn test_trace_accumulates_innermost_first() {
        let err = LambdaError::structural("bad")
            .traced("else")
            .traced("lambda");
        assert_eq!(err.trace(), ["else".to_string(), "lambda".to_string()]);
        assert_eq!(err.to_string(), "structural error: bad");
    }

    #[test]
    fn test_wraps_into_crate_error() {
        let err: Error = LambdaError::thrown("boom").into();
        assert_eq!(err.to_string(), "Lambda error: thrown error: boom");
    }
}
