//! Success/failure value produced by a future's operation.

use std::fmt;

/// Immutable outcome of an operation: either a success value or a failure error.
///
/// The `Debug` rendering is `Success(<value>)` or `Failure(<error>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Try<T, E>
where
    E: std::error::Error,
{
    Success(T),
    Failure(E),
}

impl<T, E> Try<T, E>
where
    E: std::error::Error,
{
    pub fn success(value: T) -> Self {
        Try::Success(value)
    }

    pub fn failure(error: E) -> Self {
        Try::Failure(error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Try::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Try::Failure(_))
    }

    /// The success value, if this is a success
    pub fn success_value(&self) -> Option<&T> {
        match self {
            Try::Success(value) => Some(value),
            Try::Failure(_) => None,
        }
    }

    /// The failure error, if this is a failure
    pub fn failure_error(&self) -> Option<&E> {
        match self {
            Try::Success(_) => None,
            Try::Failure(error) => Some(error),
        }
    }

    /// Borrow as a standard `Result` so callers can use `?` on a shared outcome.
    pub fn as_result(&self) -> Result<&T, &E> {
        match self {
            Try::Success(value) => Ok(value),
            Try::Failure(error) => Err(error),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Try::Success(value) => Ok(value),
            Try::Failure(error) => Err(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for Try<T, E>
where
    E: std::error::Error,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Try::Success(value),
            Err(error) => Try::Failure(error),
        }
    }
}

impl<T, E> fmt::Display for Try<T, E>
where
    T: fmt::Display,
    E: std::error::Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Try::Success(value) => write!(f, "Success({})", value),
            Try::Failure(error) => write!(f, "Failure({})", error),
        }
    }
}
