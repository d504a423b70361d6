//! Exit-code mapping for the two binaries.

use rama_error::BoxError;

/// Wraps an error with the process exit code it should produce.
///
/// Only configuration failures (bad INI, unparsable positional arguments)
/// are worth a distinct code; everything else that reaches `main` exits `1`.
#[derive(Debug)]
pub struct ErrorWithExitCode {
    code: i32,
    error: BoxError,
}

/// Configuration errors (INI or positional-argument parse failures) exit
/// with this code rather than the generic `1`.
pub const EXIT_CONFIG_ERROR: i32 = 2;

impl ErrorWithExitCode {
    pub fn new(code: i32, error: impl Into<BoxError>) -> Self {
        Self { code, error: error.into() }
    }

    pub fn config(error: impl Into<BoxError>) -> Self {
        Self::new(EXIT_CONFIG_ERROR, error)
    }

    pub fn exit_code(&self) -> i32 {
        self.code
    }
}

impl From<BoxError> for ErrorWithExitCode {
    fn from(error: BoxError) -> Self {
        Self { code: 1, error }
    }
}

impl std::fmt::Display for ErrorWithExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.error)
    }
}

impl std::error::Error for ErrorWithExitCode {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}
