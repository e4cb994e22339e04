/* DEX header_item and the table directory it describes */

use std::fmt;

use adler::adler32_slice;
use log::warn;
use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::dex::error::{DexError, DexErrorKind};
use crate::dex::{read_array, read_u4, Endian};

pub const HEADER_SIZE: usize = 0x70;
pub const DEX_MAGIC_PREFIX: [u8; 4] = [0x64, 0x65, 0x78, 0x0a];
/// Endian tag as laid out in a big endian file.
pub const ENDIAN_CONSTANT: [u8; 4] = [0x12, 0x34, 0x56, 0x78];
/// Endian tag as laid out in a little endian file.
pub const REVERSE_ENDIAN_CONSTANT: [u8; 4] = [0x78, 0x56, 0x34, 0x12];

const ENDIAN_TAG_OFFSET: usize = 40;

/// The fixed-stride index tables addressed by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Table
{
    Strings,
    Types,
    Protos,
    Fields,
    Methods,
    ClassDefs,
}

impl Table
{
    /// Size in bytes of one entry.
    pub fn stride(self) -> u32
    {
        match self
        {
            Table::Strings | Table::Types => 4,
            Table::Protos => 12,
            Table::Fields | Table::Methods => 8,
            Table::ClassDefs => 32,
        }
    }
}

impl fmt::Display for Table
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self
        {
            Table::Strings => "string_ids",
            Table::Types => "type_ids",
            Table::Protos => "proto_ids",
            Table::Fields => "field_ids",
            Table::Methods => "method_ids",
            Table::ClassDefs => "class_defs",
        };
        write!(f, "{}", name)
    }
}

/// A (size, offset) pair from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Section
{
    pub size: u32,
    pub offset: u32,
}

/// Header problems that do not stop decoding. They are collected at load
/// time and shown in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HeaderIssue
{
    InvalidMagic([u8; 4]),
    InvalidVersion([u8; 4]),
    SizeMismatch { declared: u32, real: usize },
    HeaderSizeMismatch(u32),
    ChecksumMismatch { declared: u32, computed: u32 },
    SignatureMismatch,
}

impl fmt::Display for HeaderIssue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self
        {
            HeaderIssue::InvalidMagic(m) => write!(f, "corrupted magic {:?}", m),
            HeaderIssue::InvalidVersion(v) => write!(f, "corrupted version {:?}", v),
            HeaderIssue::SizeMismatch { declared, real } =>
                write!(f, "declared file size {} but real size is {}", declared, real),
            HeaderIssue::HeaderSizeMismatch(s) => write!(f, "header size 0x{:x} should be 0x70", s),
            HeaderIssue::ChecksumMismatch { declared, computed } =>
                write!(f, "checksum {:08x} does not match computed {:08x}", declared, computed),
            HeaderIssue::SignatureMismatch => write!(f, "signature does not match computed SHA-1"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian: Endian,
    pub link: Section,
    pub map_off: u32,
    pub string_ids: Section,
    pub type_ids: Section,
    pub proto_ids: Section,
    pub field_ids: Section,
    pub method_ids: Section,
    pub class_defs: Section,
    pub data: Section,
}

impl Endian
{
    /// Picks the byte order from the raw endian tag bytes.
    pub fn from_tag(tag: [u8; 4]) -> Result<Endian, DexError>
    {
        match tag
        {
            ENDIAN_CONSTANT => Ok(Endian::Big),
            REVERSE_ENDIAN_CONSTANT => Ok(Endian::Little),
            _ => fail!(DexErrorKind::UnknownEndianTag(tag)),
        }
    }
}

impl Header
{
    pub fn read(bytes: &[u8]) -> Result<Header, DexError>
    {
        if bytes.len() < HEADER_SIZE {
            fail!(DexErrorKind::TruncatedHeader { len: bytes.len() });
        }

        let mut tag_ix = ENDIAN_TAG_OFFSET;
        let endian = Endian::from_tag(read_array(bytes, &mut tag_ix)?)?;

        let mut ix = 0;
        let magic = read_array(bytes, &mut ix)?;
        let checksum = read_u4(bytes, &mut ix, endian)?;
        let signature = read_array(bytes, &mut ix)?;
        let file_size = read_u4(bytes, &mut ix, endian)?;
        let header_size = read_u4(bytes, &mut ix, endian)?;
        ix += 4; // endian tag, already consumed
        let section = |ix: &mut usize| -> Result<Section, DexError> {
            Ok(Section { size: read_u4(bytes, ix, endian)?, offset: read_u4(bytes, ix, endian)? })
        };
        let link = section(&mut ix)?;
        let map_off = read_u4(bytes, &mut ix, endian)?;

        Ok(Header {
            magic,
            checksum,
            signature,
            file_size,
            header_size,
            endian,
            link,
            map_off,
            string_ids: section(&mut ix)?,
            type_ids: section(&mut ix)?,
            proto_ids: section(&mut ix)?,
            field_ids: section(&mut ix)?,
            method_ids: section(&mut ix)?,
            class_defs: section(&mut ix)?,
            data: section(&mut ix)?,
        })
    }

    pub fn table(&self, table: Table) -> Section
    {
        match table
        {
            Table::Strings => self.string_ids,
            Table::Types => self.type_ids,
            Table::Protos => self.proto_ids,
            Table::Fields => self.field_ids,
            Table::Methods => self.method_ids,
            Table::ClassDefs => self.class_defs,
        }
    }

    pub fn magic_is_valid(&self) -> bool
    {
        self.magic[..4] == DEX_MAGIC_PREFIX
    }

    /// The three version digits followed by a NUL, e.g. `035\0`.
    pub fn version_is_valid(&self) -> bool
    {
        self.magic[4..7].iter().all(u8::is_ascii_digit) && self.magic[7] == 0
    }

    /// Numeric DEX version from the magic, e.g. 35 or 39.
    pub fn version(&self) -> Option<u32>
    {
        if !self.version_is_valid() {
            return None;
        }
        Some(self.magic[4..7].iter().fold(0, |acc, d| acc * 10 + (d - b'0') as u32))
    }

    /// Checks everything decoding can survive being wrong, against the buffer
    /// the header came from.
    pub fn issues(&self, bytes: &[u8]) -> Vec<HeaderIssue>
    {
        let mut issues = vec![];
        let quad = |from: usize| -> [u8; 4] {
            let mut q = [0u8; 4];
            q.copy_from_slice(&self.magic[from..from + 4]);
            q
        };
        if !self.magic_is_valid() {
            issues.push(HeaderIssue::InvalidMagic(quad(0)));
        }
        if !self.version_is_valid() {
            issues.push(HeaderIssue::InvalidVersion(quad(4)));
        }
        if self.file_size as usize != bytes.len() {
            issues.push(HeaderIssue::SizeMismatch { declared: self.file_size, real: bytes.len() });
        }
        if self.header_size as usize != HEADER_SIZE {
            issues.push(HeaderIssue::HeaderSizeMismatch(self.header_size));
        }
        let computed = adler32_slice(bytes.get(12..).unwrap_or_default());
        if computed != self.checksum {
            issues.push(HeaderIssue::ChecksumMismatch { declared: self.checksum, computed });
        }
        if Sha1::digest(bytes.get(32..).unwrap_or_default()).as_slice() != &self.signature[..] {
            issues.push(HeaderIssue::SignatureMismatch);
        }

        for issue in &issues {
            warn!("[header] {}", issue);
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_header(tag: [u8; 4]) -> Vec<u8>
    {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[..8].copy_from_slice(b"dex\n035\0");
        bytes[40..44].copy_from_slice(&tag);
        bytes
    }

    #[test]
    fn endian_tag_selects_byte_order()
    {
        assert_eq!(Endian::from_tag([0x12, 0x34, 0x56, 0x78]).unwrap(), Endian::Big);
        assert_eq!(Endian::from_tag([0x78, 0x56, 0x34, 0x12]).unwrap(), Endian::Little);
        let e = Endian::from_tag([0x12, 0x34, 0x56, 0x79]).unwrap_err();
        assert_eq!(e.kind(), &DexErrorKind::UnknownEndianTag([0x12, 0x34, 0x56, 0x79]));
    }

    #[test]
    fn fields_follow_the_tag()
    {
        let mut bytes = blank_header(ENDIAN_CONSTANT);
        bytes[56..60].copy_from_slice(&[0, 0, 0, 7]);
        bytes[60..64].copy_from_slice(&[0, 0, 0, 0x70]);
        let h = Header::read(&bytes).unwrap();
        assert_eq!(h.endian, Endian::Big);
        assert_eq!(h.string_ids, Section { size: 7, offset: 0x70 });

        let mut bytes = blank_header(REVERSE_ENDIAN_CONSTANT);
        bytes[56..60].copy_from_slice(&[7, 0, 0, 0]);
        bytes[108..112].copy_from_slice(&[0x00, 0x01, 0, 0]);
        let h = Header::read(&bytes).unwrap();
        assert_eq!(h.endian, Endian::Little);
        assert_eq!(h.string_ids.size, 7);
        assert_eq!(h.data.offset, 0x100);
        assert_eq!(h.table(Table::Strings), h.string_ids);
    }

    #[test]
    fn short_buffer_is_truncated_header()
    {
        let bytes = blank_header(REVERSE_ENDIAN_CONSTANT);
        let e = Header::read(&bytes[..0x6f]).unwrap_err();
        assert_eq!(e.kind(), &DexErrorKind::TruncatedHeader { len: 0x6f });
    }

    #[test]
    fn unknown_tag_is_fatal()
    {
        let bytes = blank_header([0, 0, 0, 0]);
        assert!(matches!(Header::read(&bytes).unwrap_err().kind(), DexErrorKind::UnknownEndianTag(_)));
    }

    #[test]
    fn version_parsing()
    {
        let mut bytes = blank_header(REVERSE_ENDIAN_CONSTANT);
        let h = Header::read(&bytes).unwrap();
        assert_eq!(h.version(), Some(35));
        bytes[5] = b'x';
        let h = Header::read(&bytes).unwrap();
        assert_eq!(h.version(), None);
        assert!(h.magic_is_valid());
    }

    #[test]
    fn issues_are_collected_not_raised()
    {
        let mut bytes = blank_header(REVERSE_ENDIAN_CONSTANT);
        bytes[0] = b'D';
        bytes[36..40].copy_from_slice(&[0x78, 0, 0, 0]);
        let h = Header::read(&bytes).unwrap();
        let issues = h.issues(&bytes);
        assert!(issues.contains(&HeaderIssue::InvalidMagic(*b"Dex\n")));
        assert!(issues.contains(&HeaderIssue::SizeMismatch { declared: 0, real: HEADER_SIZE }));
        assert!(issues.contains(&HeaderIssue::HeaderSizeMismatch(0x78)));
        assert!(issues.contains(&HeaderIssue::SignatureMismatch));
        assert!(!issues.iter().any(|i| matches!(i, HeaderIssue::InvalidVersion(_))));
    }

    #[test]
    fn issues_tolerate_a_foreign_short_buffer()
    {
        let bytes = blank_header(REVERSE_ENDIAN_CONSTANT);
        let h = Header::read(&bytes).unwrap();
        for short in [&bytes[..16], &bytes[..31]] {
            let issues = h.issues(short);
            assert!(issues.contains(&HeaderIssue::SizeMismatch { declared: 0, real: short.len() }));
            assert!(issues.contains(&HeaderIssue::SignatureMismatch));
        }
    }
}
