/* Dex file container and on-demand resolvers */

use std::fmt;
use std::fs;
use std::path::Path;

use log::{debug, error};

use crate::dex::class_data::ClassMembers;
use crate::dex::error::{DexError, DexErrorKind};
use crate::dex::header::{Header, HeaderIssue, Section, Table, HEADER_SIZE};
use crate::dex::leb::read_uleb128;
use crate::dex::{read_u2, read_u4, read_x, Endian};
use crate::types::{AccessFlags, Class, DataRef, DexString, DexType, Prototype, RawField, RawMethod};

/* Constants */
pub const NO_INDEX: u32 = 0xffffffff;

/// Load-time behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions
{
    /// Refuse files with any [`HeaderIssue`] instead of just reporting them.
    pub strict: bool,
}

/// A DEX image held in memory.
///
/// Only the header is decoded up front. Every query walks the buffer again
/// and returns freshly built values, so the container itself never changes
/// after loading and can be shared between threads.
#[derive(Debug)]
pub struct DexFile
{
    bytes: Vec<u8>,
    header: Header,
    issues: Vec<HeaderIssue>,
}

impl DexFile
{
    pub fn from_bytes(bytes: &[u8]) -> Result<DexFile, DexError>
    {
        DexFile::from_vec(bytes.to_vec(), ParseOptions::default())
    }

    pub fn from_bytes_with(bytes: &[u8], options: ParseOptions) -> Result<DexFile, DexError>
    {
        DexFile::from_vec(bytes.to_vec(), options)
    }

    pub fn from_file(path: &Path) -> Result<DexFile, DexError>
    {
        DexFile::from_file_with(path, ParseOptions::default())
    }

    pub fn from_file_with(path: &Path, options: ParseOptions) -> Result<DexFile, DexError>
    {
        let bytes = fs::read(path).map_err(|e| DexError::with_context(e.into(), path.display().to_string()))?;
        DexFile::from_vec(bytes, options)
    }

    /// Takes ownership of an already loaded image.
    pub fn from_vec(bytes: Vec<u8>, options: ParseOptions) -> Result<DexFile, DexError>
    {
        let header = Header::read(&bytes)?;
        let issues = header.issues(&bytes);
        if options.strict && !issues.is_empty() {
            let joined = issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ");
            fail!(DexErrorKind::RejectedHeader(joined));
        }
        debug!(
            "[dex] loaded {} bytes, {}, {} classes",
            bytes.len(), header.endian, header.class_defs.size
        );
        Ok(DexFile { bytes, header, issues })
    }

    pub fn header(&self) -> &Header
    {
        &self.header
    }

    /// Non-fatal header problems found at load time.
    pub fn issues(&self) -> &[HeaderIssue]
    {
        &self.issues
    }

    pub fn bytes(&self) -> &[u8]
    {
        &self.bytes
    }

    pub fn endian(&self) -> Endian
    {
        self.header.endian
    }

    pub fn is_big_endian(&self) -> bool
    {
        self.header.endian == Endian::Big
    }

    /// Actual length of the image, as opposed to the declared `file_size`.
    pub fn real_size(&self) -> usize
    {
        self.bytes.len()
    }

    pub fn table(&self, table: Table) -> Section
    {
        self.header.table(table)
    }

    /// File offset of entry `index` of `table`, after checking the index and
    /// that the whole table lies inside the buffer.
    fn entry_offset(&self, table: Table, index: u32) -> Result<usize, DexError>
    {
        let Section { size, offset } = self.header.table(table);
        if index >= size {
            fail!(DexErrorKind::IndexOutOfRange { table, index, size });
        }
        let end = offset as u64 + size as u64 * table.stride() as u64;
        if end > self.bytes.len() as u64 {
            fail!(DexErrorKind::TableOutOfBounds { table, offset, size, len: self.bytes.len() });
        }
        Ok(offset as usize + index as usize * table.stride() as usize)
    }

    fn u2_at(&self, ix: &mut usize) -> Result<u16, DexError>
    {
        read_u2(&self.bytes, ix, self.header.endian)
    }

    fn u4_at(&self, ix: &mut usize) -> Result<u32, DexError>
    {
        read_u4(&self.bytes, ix, self.header.endian)
    }

    /// String `n`: a uleb128 length followed by that many payload bytes.
    ///
    /// The stored length counts UTF-16 code units, but it is used here as a
    /// byte count, which agrees for ASCII payloads.
    pub fn string(&self, n: u32) -> Result<DexString, DexError>
    {
        let mut ix = self.entry_offset(Table::Strings, n)?;
        let mut data_ix = self.u4_at(&mut ix)? as usize;
        let len = read_uleb128(&self.bytes, &mut data_ix)?;
        let payload = read_x(&self.bytes, &mut data_ix, len as usize)
            .map_err(|e| DexError::with_context(e, format!("string {}", n)))?;
        Ok(DexString::new(payload))
    }

    /// Type descriptor `n`, e.g. `Ljava/lang/Object;`.
    pub fn type_descriptor(&self, n: u32) -> Result<DexType, DexError>
    {
        let mut ix = self.entry_offset(Table::Types, n)?;
        let string_idx = self.u4_at(&mut ix)?;
        self.string(string_idx)
    }

    /// A type_list at `offset`; offset 0 is the empty list.
    pub fn type_list(&self, offset: u32) -> Result<Vec<DexType>, DexError>
    {
        if offset == 0 {
            return Ok(vec![]);
        }
        let mut ix = offset as usize;
        let size = self.u4_at(&mut ix)?;
        let mut v = vec![];
        for _ in 0..size {
            let type_idx = self.u2_at(&mut ix)?;
            v.push(self.type_descriptor(type_idx as u32)?);
        }
        Ok(v)
    }

    pub fn prototype(&self, n: u32) -> Result<Prototype, DexError>
    {
        let mut ix = self.entry_offset(Table::Protos, n)?;
        let shorty_idx = self.u4_at(&mut ix)?;
        let return_type_idx = self.u4_at(&mut ix)?;
        let parameters_off = self.u4_at(&mut ix)?;

        Ok(Prototype {
            shorty: self.string(shorty_idx)?,
            return_type: self.type_descriptor(return_type_idx)?,
            parameters: self.type_list(parameters_off)
                .map_err(|e| DexError::with_context(e, format!("parameters of proto {}", n)))?,
        })
    }

    pub fn raw_field(&self, n: u32) -> Result<RawField, DexError>
    {
        let mut ix = self.entry_offset(Table::Fields, n)?;
        let class_idx = self.u2_at(&mut ix)?;
        let type_idx = self.u2_at(&mut ix)?;
        let name_idx = self.u4_at(&mut ix)?;

        Ok(RawField {
            class: self.type_descriptor(class_idx as u32)?,
            field_type: self.type_descriptor(type_idx as u32)?,
            name: self.string(name_idx)?,
        })
    }

    pub fn raw_method(&self, n: u32) -> Result<RawMethod, DexError>
    {
        let mut ix = self.entry_offset(Table::Methods, n)?;
        let class_idx = self.u2_at(&mut ix)?;
        let proto_idx = self.u2_at(&mut ix)?;
        let name_idx = self.u4_at(&mut ix)?;

        Ok(RawMethod {
            class: self.type_descriptor(class_idx as u32)?,
            proto: self.prototype(proto_idx as u32)?,
            name: self.string(name_idx)?,
        })
    }

    pub fn class_count(&self) -> u32
    {
        self.header.class_defs.size
    }

    /// Only the type of class `n`, without touching its class data.
    pub fn class_id(&self, n: u32) -> Result<DexType, DexError>
    {
        let mut ix = self.entry_offset(Table::ClassDefs, n)?;
        let class_idx = self.u4_at(&mut ix)?;
        self.type_descriptor(class_idx)
    }

    pub fn class_ids(&self) -> impl Iterator<Item = Result<DexType, DexError>> + '_
    {
        (0..self.class_count()).map(move |n| self.class_id(n))
    }

    pub fn class(&self, n: u32) -> Result<Class, DexError>
    {
        self.read_class(n).map_err(|e| DexError::with_context(e, format!("class_def {}", n)))
    }

    fn read_class(&self, n: u32) -> Result<Class, DexError>
    {
        let mut ix = self.entry_offset(Table::ClassDefs, n)?;
        let class_idx = self.u4_at(&mut ix)?;
        let access_flags = self.u4_at(&mut ix)?;
        let superclass_idx = self.u4_at(&mut ix)?;
        let interfaces_off = self.u4_at(&mut ix)?;
        let source_file_idx = self.u4_at(&mut ix)?;
        let annotations_off = self.u4_at(&mut ix)?;
        let class_data_off = self.u4_at(&mut ix)?;
        let static_values_off = self.u4_at(&mut ix)?;

        let members = if class_data_off == 0 {
            ClassMembers::default()
        } else {
            ClassMembers::decode(self, class_data_off)?
        };

        Ok(Class {
            class_type: self.type_descriptor(class_idx)?,
            access_flags: AccessFlags::from_raw(access_flags),
            superclass: if superclass_idx != NO_INDEX { Some(self.type_descriptor(superclass_idx)?) }
                        else { None },
            interfaces: self.type_list(interfaces_off)?,
            source_file: if source_file_idx != NO_INDEX { Some(self.string(source_file_idx)?) }
                         else { None },
            annotations: Some(DataRef { offset: annotations_off }).filter(|r| r.offset != 0),
            static_fields: members.static_fields,
            instance_fields: members.instance_fields,
            direct_methods: members.direct_methods,
            virtual_methods: members.virtual_methods,
            static_values: Some(DataRef { offset: static_values_off }).filter(|r| r.offset != 0),
        })
    }

    /// Every class, one result per class_def so a corrupt class does not hide the others.
    pub fn all_classes(&self) -> Vec<Result<Class, DexError>>
    {
        (0..self.class_count())
            .map(|n| {
                let c = self.class(n);
                if let Err(e) = &c {
                    error!("Error reading class: {}", e);
                }
                c
            })
            .collect()
    }

    /// Classes whose descriptor contains `name`, e.g. `MainActivity` matches
    /// both `Lcom/app/MainActivity;` and `Lcom/app/MainActivity$Inner;`.
    ///
    /// Class ids that cannot be resolved are returned as errors, in class_def order.
    pub fn find_class(&self, name: &str) -> Vec<Result<Class, DexError>>
    {
        let mut res = vec![];
        for n in 0..self.class_count() {
            match self.class_id(n)
            {
                Ok(id) if id.contains(name) => res.push(self.class(n)),
                Ok(_) => {}
                Err(e) => res.push(Err(DexError::with_context(e, format!("class_def {}", n)))),
            }
        }
        res
    }

    fn has_issue(&self, pred: impl Fn(&HeaderIssue) -> bool) -> bool
    {
        self.issues.iter().any(pred)
    }

    /// Human readable header report. Values that disagree with what the file
    /// structure implies are flagged inline rather than rejected.
    pub fn summary(&self) -> String
    {
        let h = &self.header;
        let mut res = String::new();

        res.push_str("Magic: ");
        if h.magic_is_valid() {
            res.push_str("dex\n");
        } else {
            res.push_str(&format!("{}  WARNING: corrupted magic, left raw\n", h.magic[..4].escape_ascii()));
        }

        res.push_str("Version: ");
        if h.version_is_valid() {
            res.push_str(&format!("{}\n", String::from_utf8_lossy(&h.magic[4..7])));
        } else {
            res.push_str(&format!("{}  WARNING: corrupted version, left raw\n", h.magic[4..8].escape_ascii()));
        }

        res.push_str(&format!("Checksum: {:08x}", h.checksum));
        for issue in &self.issues {
            if let HeaderIssue::ChecksumMismatch { computed, .. } = issue {
                res.push_str(&format!("  WARNING: computed checksum is {:08x}", computed));
            }
        }
        res.push('\n');

        res.push_str("Signature: ");
        for b in &h.signature {
            res.push_str(&format!("{:02x}", b));
        }
        if self.has_issue(|i| *i == HeaderIssue::SignatureMismatch) {
            res.push_str("  WARNING: signature does not match contents");
        }
        res.push('\n');

        res.push_str("File size: ");
        if self.real_size() == h.file_size as usize {
            res.push_str(&format!("{}\n", h.file_size));
        } else {
            res.push_str(&format!("{}  WARNING: real file size differs (real size is: {})\n", h.file_size, self.real_size()));
        }

        res.push_str("Header size: ");
        if h.header_size as usize == HEADER_SIZE {
            res.push_str("0x70\n");
        } else {
            res.push_str(&format!("{}  WARNING: header size should be 0x70\n", h.header_size));
        }

        // The endian tag cannot be corrupt here, the file would not have loaded
        res.push_str(&format!("Endianness: {}\n", h.endian));
        res.push_str(&format!("String count: {}\n", h.string_ids.size));
        res.push_str(&format!("Type count: {}\n", h.type_ids.size));
        res.push_str(&format!("Prototype count: {}\n", h.proto_ids.size));
        res.push_str(&format!("Field count: {}\n", h.field_ids.size));
        res.push_str(&format!("Method count: {}\n", h.method_ids.size));
        res.push_str(&format!("Class count: {}", h.class_defs.size));
        res
    }
}

impl fmt::Display for DexFile
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.summary())
    }
}
