use thiserror::Error;

/// Errors returned while decoding a serialized program.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The data is shorter than the fixed-size program header.
    #[error(
        "program header truncated: expected at least {expected} bytes, \
         got {got}"
    )]
    TruncatedHeader {
        /// Minimum number of bytes a serialized program can have.
        expected: usize,
        /// Number of bytes actually provided.
        got: usize,
    },
}
