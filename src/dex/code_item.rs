use std::fmt;

use log::trace;
use serde::Serialize;

use crate::dex::error::DexError;
use crate::dex::{read_u2, read_u4, read_x, Endian};

/// The fixed part of a code_item plus its instruction stream as raw bytes.
///
/// Try items, catch handlers and debug info are not decoded here; only their
/// presence is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeItem
{
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: Option<u32>,
    /// File offset of the first instruction byte.
    pub insns_off: u32,
    /// `2 * insns_size` bytes, in file byte order.
    #[serde(skip)]
    pub insns: Vec<u8>,
    #[serde(skip)]
    endian: Endian,
}

impl CodeItem
{
    pub fn read(bytes: &[u8], offset: u32, endian: Endian) -> Result<CodeItem, DexError>
    {
        let ix = &mut (offset as usize);
        let registers_size = read_u2(bytes, ix, endian)?;
        let ins_size = read_u2(bytes, ix, endian)?;
        let outs_size = read_u2(bytes, ix, endian)?;
        let tries_size = read_u2(bytes, ix, endian)?;
        let debug_info_off = Some(read_u4(bytes, ix, endian)?).filter(|off| *off != 0);
        let insns_size = read_u4(bytes, ix, endian)?;

        let insns_off = *ix as u32;
        let insns = read_x(bytes, ix, 2 * insns_size as usize)?;
        trace!("[codeitem] 0x{:x}: {} code units, {} tries", offset, insns_size, tries_size);

        Ok(CodeItem { registers_size, ins_size, outs_size, tries_size, debug_info_off, insns_off, insns, endian })
    }

    /// Instruction count in 16-bit code units.
    pub fn insns_size(&self) -> usize
    {
        self.insns.len() / 2
    }

    pub fn has_tries(&self) -> bool
    {
        self.tries_size > 0
    }

    pub fn has_debug_info(&self) -> bool
    {
        self.debug_info_off.is_some()
    }

    /// The instruction stream as code units, for disassemblers.
    pub fn code_units(&self) -> impl Iterator<Item = u16> + '_
    {
        self.insns.chunks_exact(2).map(move |c| match self.endian
        {
            Endian::Little => u16::from_le_bytes([c[0], c[1]]),
            Endian::Big => u16::from_be_bytes([c[0], c[1]]),
        })
    }
}

impl fmt::Display for CodeItem
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "[registers={} ins={} outs={} insns={}", self.registers_size, self.ins_size, self.outs_size, self.insns_size())?;
        if self.has_tries() {
            write!(f, " tries={}", self.tries_size)?;
        }
        if let Some(off) = self.debug_info_off {
            write!(f, " debug@0x{:x}", off)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::error::DexErrorKind;

    fn code_item_le(pad: usize, insns: &[u16], tries: u16, debug: u32) -> Vec<u8>
    {
        let mut v = vec![0xAAu8; pad];
        v.extend_from_slice(&3u16.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes());
        v.extend_from_slice(&2u16.to_le_bytes());
        v.extend_from_slice(&tries.to_le_bytes());
        v.extend_from_slice(&debug.to_le_bytes());
        v.extend_from_slice(&(insns.len() as u32).to_le_bytes());
        for i in insns {
            v.extend_from_slice(&i.to_le_bytes());
        }
        v
    }

    #[test]
    fn reads_header_and_instruction_span()
    {
        let bytes = code_item_le(4, &[0x1012, 0x000e], 0, 0);
        let ci = CodeItem::read(&bytes, 4, Endian::Little).unwrap();
        assert_eq!((ci.registers_size, ci.ins_size, ci.outs_size), (3, 1, 2));
        assert_eq!(ci.insns_off, 20);
        assert_eq!(ci.insns, vec![0x12, 0x10, 0x0e, 0x00]);
        assert_eq!(ci.code_units().collect::<Vec<_>>(), vec![0x1012, 0x000e]);
        assert!(!ci.has_tries());
        assert!(!ci.has_debug_info());
    }

    #[test]
    fn tries_and_debug_info_are_presence_only()
    {
        let mut bytes = code_item_le(0, &[0x000e], 1, 0x1234);
        // try_item and handler list bytes follow; they must be left alone
        bytes.extend_from_slice(&[0u8; 12]);
        let ci = CodeItem::read(&bytes, 0, Endian::Little).unwrap();
        assert!(ci.has_tries());
        assert_eq!(ci.debug_info_off, Some(0x1234));
        assert_eq!(ci.insns.len(), 2);
        assert_eq!(ci.to_string(), "[registers=3 ins=1 outs=2 insns=1 tries=1 debug@0x1234]");
    }

    #[test]
    fn truncated_instruction_stream_fails()
    {
        let mut bytes = code_item_le(0, &[0x000e, 0x000e], 0, 0);
        bytes.pop();
        let e = CodeItem::read(&bytes, 0, Endian::Little).unwrap_err();
        assert_eq!(e.kind(), &DexErrorKind::TruncatedBuffer { offset: 16, wanted: 4, len: 19 });
    }

    #[test]
    fn big_endian_code_units()
    {
        let mut bytes = vec![];
        for half in [5u16, 1, 1, 0] {
            bytes.extend_from_slice(&half.to_be_bytes());
        }
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&0x0e00u16.to_be_bytes());
        let ci = CodeItem::read(&bytes, 0, Endian::Big).unwrap();
        assert_eq!(ci.registers_size, 5);
        assert_eq!(ci.code_units().collect::<Vec<_>>(), vec![0x0e00]);
    }
}
