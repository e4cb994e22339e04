/* class_data_item: delta encoded member lists of one class */

use log::debug;
use serde::Serialize;

use crate::dex::code_item::CodeItem;
use crate::dex::dex_file::DexFile;
use crate::dex::error::DexError;
use crate::dex::leb::read_uleb128;
use crate::types::{AccessFlags, Field, Method};

/// Running base of the member indices within one category. Each entry only
/// stores the difference to the previous one, so entries must be folded in
/// stream order and the base starts over at every category.
struct IndexAccumulator(u32);

impl IndexAccumulator
{
    fn start() -> Self
    {
        IndexAccumulator(0)
    }

    fn advance(&mut self, diff: u32) -> u32
    {
        self.0 = self.0.saturating_add(diff);
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedField
{
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedMethod
{
    pub method_idx: u32,
    pub access_flags: u32,
    /// `None` for abstract and native methods.
    pub code_off: Option<u32>,
}

/// The class data stream with absolute indices but nothing resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassDataItem
{
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

fn read_encoded_fields(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<EncodedField>, DexError>
{
    let mut base = IndexAccumulator::start();
    (0..count)
        .map(|_| -> Result<EncodedField, DexError> {
            let diff = read_uleb128(bytes, ix)?;
            let access_flags = read_uleb128(bytes, ix)?;
            Ok(EncodedField { field_idx: base.advance(diff), access_flags })
        })
        .collect()
}

fn read_encoded_methods(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<EncodedMethod>, DexError>
{
    let mut base = IndexAccumulator::start();
    (0..count)
        .map(|_| -> Result<EncodedMethod, DexError> {
            let diff = read_uleb128(bytes, ix)?;
            let access_flags = read_uleb128(bytes, ix)?;
            let code_off = Some(read_uleb128(bytes, ix)?).filter(|off| *off != 0);
            Ok(EncodedMethod { method_idx: base.advance(diff), access_flags, code_off })
        })
        .collect()
}

impl ClassDataItem
{
    pub fn read(bytes: &[u8], offset: u32) -> Result<ClassDataItem, DexError>
    {
        let ix = &mut (offset as usize);
        let static_fields_size = read_uleb128(bytes, ix)?;
        let instance_fields_size = read_uleb128(bytes, ix)?;
        let direct_methods_size = read_uleb128(bytes, ix)?;
        let virtual_methods_size = read_uleb128(bytes, ix)?;
        debug!(
            "[classdata] 0x{:x}: {} static, {} instance, {} direct, {} virtual",
            offset, static_fields_size, instance_fields_size, direct_methods_size, virtual_methods_size
        );

        Ok(ClassDataItem {
            static_fields: read_encoded_fields(bytes, ix, static_fields_size)?,
            instance_fields: read_encoded_fields(bytes, ix, instance_fields_size)?,
            direct_methods: read_encoded_methods(bytes, ix, direct_methods_size)?,
            virtual_methods: read_encoded_methods(bytes, ix, virtual_methods_size)?,
        })
    }
}

/// Class data with every member resolved against the index tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMembers
{
    pub static_fields: Vec<Field>,
    pub instance_fields: Vec<Field>,
    pub direct_methods: Vec<Method>,
    pub virtual_methods: Vec<Method>,
}

impl ClassMembers
{
    pub(crate) fn decode(dex: &DexFile, offset: u32) -> Result<ClassMembers, DexError>
    {
        let item = ClassDataItem::read(dex.bytes(), offset)?;

        let fields = |encoded: &[EncodedField]| -> Result<Vec<Field>, DexError> {
            encoded.iter()
                .map(|f| -> Result<Field, DexError> {
                    Ok(Field { raw: dex.raw_field(f.field_idx)?, access_flags: AccessFlags::from_raw(f.access_flags) })
                })
                .collect()
        };
        let methods = |encoded: &[EncodedMethod]| -> Result<Vec<Method>, DexError> {
            encoded.iter()
                .map(|m| -> Result<Method, DexError> {
                    let code = match m.code_off
                    {
                        Some(off) => Some(CodeItem::read(dex.bytes(), off, dex.endian()).map_err(|e| {
                            DexError::with_context(e, format!("code item of method {}", m.method_idx))
                        })?),
                        None => None,
                    };
                    Ok(Method { raw: dex.raw_method(m.method_idx)?, access_flags: AccessFlags::from_raw(m.access_flags), code })
                })
                .collect()
        };

        Ok(ClassMembers {
            static_fields: fields(&item.static_fields)?,
            instance_fields: fields(&item.instance_fields)?,
            direct_methods: methods(&item.direct_methods)?,
            virtual_methods: methods(&item.virtual_methods)?,
        })
    }
}
