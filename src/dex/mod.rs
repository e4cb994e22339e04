#[macro_use]
pub mod error;

pub mod class_data;
pub mod code_item;
pub mod dex_file;
pub mod header;
pub mod leb;

pub use crate::dex::dex_file::{DexFile, ParseOptions};
pub use crate::dex::header::{Header, HeaderIssue, Table};

use std::fmt;

use nom::number::complete as number;
use nom::number::Endianness;
use nom::IResult;
use serde::Serialize;

use crate::dex::error::{DexError, DexErrorKind};

/// Byte order of every fixed-width integer in a DEX image, fixed by the
/// header's endian tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Endian
{
    Little,
    Big,
}

impl From<Endian> for Endianness
{
    fn from(e: Endian) -> Self
    {
        match e
        {
            Endian::Little => Endianness::Little,
            Endian::Big => Endianness::Big,
        }
    }
}

impl fmt::Display for Endian
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            Endian::Little => write!(f, "little endian"),
            Endian::Big => write!(f, "big endian"),
        }
    }
}

// Basic type reading
fn read_fixed<'a, T>(
    bytes: &'a [u8],
    ix: &mut usize,
    width: usize,
    parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T>,
) -> Result<T, DexError>
{
    let start = *ix;
    let tail = bytes.get(start..).ok_or_else(|| DexError::truncated(start, width, bytes.len()))?;
    let (_, val) = parser(tail).map_err(|_| DexError::truncated(start, width, bytes.len()))?;
    *ix += width;
    Ok(val)
}

pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    read_fixed(bytes, ix, 1, number::u8)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize, endian: Endian) -> Result<u16, DexError>
{
    read_fixed(bytes, ix, 2, number::u16(endian.into()))
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize, endian: Endian) -> Result<u32, DexError>
{
    read_fixed(bytes, ix, 4, number::u32(endian.into()))
}

pub(crate) fn read_u8(bytes: &[u8], ix: &mut usize, endian: Endian) -> Result<u64, DexError>
{
    read_fixed(bytes, ix, 8, number::u64(endian.into()))
}

/// Copies `length` bytes out of the buffer. Never returns a short read.
pub(crate) fn read_x(bytes: &[u8], ix: &mut usize, length: usize) -> Result<Vec<u8>, DexError>
{
    let end = ix.checked_add(length).filter(|end| *end <= bytes.len());
    match end
    {
        Some(end) => {
            let v = bytes[*ix..end].to_vec();
            *ix = end;
            Ok(v)
        }
        None => Err(DexError::truncated(*ix, length, bytes.len())),
    }
}

pub(crate) fn read_array<const N: usize>(bytes: &[u8], ix: &mut usize) -> Result<[u8; N], DexError>
{
    let arr: [u8; N] = ix
        .checked_add(N)
        .and_then(|end| bytes.get(*ix..end))
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| DexError::truncated(*ix, N, bytes.len()))?;
    *ix += N;
    Ok(arr)
}

/// Interprets a 1, 2, 4 or 8 byte span as an unsigned integer.
pub fn read_fixed_uint(span: &[u8], endian: Endian) -> Result<u64, DexError>
{
    let mut ix = 0;
    match span.len()
    {
        1 => read_u1(span, &mut ix).map(u64::from),
        2 => read_u2(span, &mut ix, endian).map(u64::from),
        4 => read_u4(span, &mut ix, endian).map(u64::from),
        8 => read_u8(span, &mut ix, endian),
        n => fail!(DexErrorKind::BadIntegerWidth(n)),
    }
}

/// Signed counterpart of [`read_fixed_uint`]; the span is sign extended from its width.
pub fn read_fixed_int(span: &[u8], endian: Endian) -> Result<i64, DexError>
{
    let raw = read_fixed_uint(span, endian)?;
    let shift = 64 - 8 * span.len() as u32;
    Ok(((raw << shift) as i64) >> shift)
}
