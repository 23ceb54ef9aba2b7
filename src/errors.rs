use crate::Id;
use thiserror::Error;

/// Parse and analysis failures.
///
/// The format is self-describing, so every mismatch means either a corrupt
/// dump or a mis-parse; both invalidate anything derived downstream. There is
/// no partial-result recovery: callers surface the first error and stop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HprofError {
    #[error("not a JAVA PROFILE 1.0.2 heap dump")]
    WrongFormat,
    #[error("unsupported identifier size {0}")]
    UnsupportedIdentifierSize(u32),
    #[error("ran out of bytes mid-record")]
    OutOfBounds,
    #[error("unknown record tag 0x{0:02X}")]
    InvalidTag(u8),
    #[error("unknown heap dump sub-record tag 0x{0:02X}")]
    InvalidSubTag(u8),
    #[error("unknown basic type 0x{0:02X}")]
    InvalidBasicType(u8),
    #[error("record contents do not match the declared body size")]
    BodySizeMismatch,
    #[error("no field named {0} in the class hierarchy")]
    FieldNotFound(String),
    #[error("id 0x{0:X} does not resolve to anything in the dump")]
    UnknownObject(Id),
    #[error("coroutine parent chain loops back to 0x{0:X}")]
    ParentCycle(Id),
}

/// Result of consuming a prefix of `input`: the rest of the slice plus the
/// parsed value. The slice-and-remainder shape follows nom, but the error
/// channel is already the crate error so iterators can yield it directly.
pub type ParseResult<'a, T> = Result<(&'a [u8], T), HprofError>;

/// Adapts nom's leaf parsers (`be_u32`, `take`, ...) into [`ParseResult`].
/// The only way those fail on a complete input is by running short.
pub(crate) trait NomLeaf<'a, T> {
    fn or_eof(self) -> ParseResult<'a, T>;
}

impl<'a, T> NomLeaf<'a, T> for nom::IResult<&'a [u8], T> {
    fn or_eof(self) -> ParseResult<'a, T> {
        self.map_err(|_| HprofError::OutOfBounds)
    }
}
