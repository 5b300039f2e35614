use core::fmt;

/// The error type for parsing segment headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An incoming segment could not be parsed because it was shorter than assumed.
    ///
    /// The buffer may be shorter than the minimum header, or the data offset may point beyond
    /// the end of the received data. For options, the length byte of some option was out of
    /// bounds of the option block.
    Truncated,

    /// An incoming segment was recognized but was self-contradictory.
    ///
    /// Examples: a data offset smaller than the fixed header; an MSS option whose length byte is
    /// not 4.
    Malformed,
}

/// The result type for header parsing.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "truncated segment"),
            Error::Malformed => write!(f, "malformed segment"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
