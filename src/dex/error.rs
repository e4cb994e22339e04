use std::fmt;

use crate::dex::header::Table;

#[macro_export]
macro_rules! fail {
    ($kind:expr) => {
        return Err(DexError::new($kind))
    };
    ($kind:expr, $context:literal) => {
        return Err(DexError::with_context(DexError::new($kind), $context.to_string()))
    };
    ($kind:expr, $contextfmt:literal, $($contextargs:tt)*) => {
        return Err(DexError::with_context(DexError::new($kind), format!($contextfmt, $($contextargs)*)))
    };
}

/// What went wrong while decoding. Every variant is fatal for the structure
/// being decoded; header problems that decoding can survive are reported as
/// [`HeaderIssue`](crate::dex::header::HeaderIssue) instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexErrorKind
{
    /// A read would run past the end of the buffer.
    TruncatedBuffer { offset: usize, wanted: usize, len: usize },
    /// The buffer cannot hold the fixed 0x70 byte header.
    TruncatedHeader { len: usize },
    /// The endian tag is neither of the two recognised byte patterns.
    UnknownEndianTag([u8; 4]),
    /// A ULEB128 value did not terminate within the span or within 5 bytes.
    MalformedVarint { offset: usize },
    IndexOutOfRange { table: Table, index: u32, size: u32 },
    /// The declared table does not fit inside the buffer.
    TableOutOfBounds { table: Table, offset: u32, size: u32, len: usize },
    BadIntegerWidth(usize),
    /// Header problems promoted to an error by strict parsing.
    RejectedHeader(String),
    Io(String),
}

impl fmt::Display for DexErrorKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            DexErrorKind::TruncatedBuffer { offset, wanted, len } =>
                write!(f, "Unexpected end of stream reading {} bytes at 0x{:x} (buffer is 0x{:x} bytes)", wanted, offset, len),
            DexErrorKind::TruncatedHeader { len } =>
                write!(f, "Not enough bytes for header ({} < 0x70)", len),
            DexErrorKind::UnknownEndianTag(tag) =>
                write!(f, "Corrupted endian tag {:02x}{:02x}{:02x}{:02x}", tag[0], tag[1], tag[2], tag[3]),
            DexErrorKind::MalformedVarint { offset } =>
                write!(f, "Malformed uleb128 at 0x{:x}", offset),
            DexErrorKind::IndexOutOfRange { table, index, size } =>
                write!(f, "{} index {} out of range (size {})", table, index, size),
            DexErrorKind::TableOutOfBounds { table, offset, size, len } =>
                write!(f, "{} table at 0x{:x} with {} entries overruns buffer of 0x{:x} bytes", table, offset, size, len),
            DexErrorKind::BadIntegerWidth(width) =>
                write!(f, "Unsupported integer width {}", width),
            DexErrorKind::RejectedHeader(issues) => write!(f, "Rejected header: {}", issues),
            DexErrorKind::Io(msg) => write!(f, "io Error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexError
{
    kind: DexErrorKind,
    contexts: Vec<String>,
}

impl DexError
{
    pub(crate) fn new(kind: DexErrorKind) -> Self
    {
        DexError {
            kind,
            contexts: Vec::new(),
        }
    }

    pub(crate) fn with_context(base: DexError, context: String) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context);
        DexError { kind: base.kind, contexts }
    }

    pub fn kind(&self) -> &DexErrorKind
    {
        &self.kind
    }

    pub(crate) fn truncated(offset: usize, wanted: usize, len: usize) -> Self
    {
        DexError::new(DexErrorKind::TruncatedBuffer { offset, wanted, len })
    }
}

impl fmt::Display for DexError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.kind)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}

impl From<std::io::Error> for DexError
{
    fn from(e: std::io::Error) -> Self
    {
        DexError::new(DexErrorKind::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_chain_in_display()
    {
        let base = DexError::new(DexErrorKind::MalformedVarint { offset: 0x40 });
        let e = DexError::with_context(DexError::with_context(base, "class data".to_string()), "class 3".to_string());
        assert_eq!(e.to_string(), "Malformed uleb128 at 0x40 for class data of class 3");
        assert_eq!(e.kind(), &DexErrorKind::MalformedVarint { offset: 0x40 });
    }

    #[test]
    fn fail_macro_attaches_context()
    {
        fn check(n: u32) -> Result<(), DexError>
        {
            if n > 2 { fail!(DexErrorKind::BadIntegerWidth(n as usize), "width check {}", n); }
            Ok(())
        }
        assert!(check(1).is_ok());
        assert_eq!(check(3).unwrap_err().to_string(), "Unsupported integer width 3 for width check 3");
    }
}
