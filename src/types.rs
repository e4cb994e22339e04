/* The decoded object model handed out by DexFile queries. */
/* Every value is built fresh per query; nothing here borrows the DEX buffer. */

use std::borrow::Cow;
use std::fmt;

use bitflags::bitflags;
use serde::{Serialize, Serializer};

use crate::dex::code_item::CodeItem;

/// Raw string payload from the string data section.
///
/// The bytes are kept exactly as stored (Modified UTF-8); use
/// [`DexString::to_str`] for text.
///
/// # Examples
///
/// ```
/// use dexview::types::DexString;
///
/// let s = DexString::from("Lcom/app/MainActivity$Inner;");
/// assert!(s.contains("MainActivity"));
/// assert_eq!(s.to_str().unwrap(), "Lcom/app/MainActivity$Inner;");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DexString(Vec<u8>);

/// Type descriptors are strings reached through the type table, e.g. `Ljava/lang/Object;`.
pub type DexType = DexString;

impl DexString
{
    pub fn new(bytes: Vec<u8>) -> Self
    {
        DexString(bytes)
    }

    pub fn as_bytes(&self) -> &[u8]
    {
        &self.0
    }

    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }

    /// Decodes the Modified UTF-8 payload, `None` if it is not well formed.
    pub fn to_str(&self) -> Option<Cow<'_, str>>
    {
        cesu8::from_java_cesu8(&self.0).ok()
    }

    /// Byte-wise substring test against the UTF-8 encoding of `needle`.
    pub fn contains(&self, needle: &str) -> bool
    {
        let needle = needle.as_bytes();
        needle.is_empty() || self.0.windows(needle.len()).any(|w| w == needle)
    }
}

impl From<&str> for DexString
{
    fn from(s: &str) -> Self
    {
        DexString(s.as_bytes().to_vec())
    }
}

impl PartialEq<str> for DexString
{
    fn eq(&self, other: &str) -> bool
    {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for DexString
{
    fn eq(&self, other: &&str) -> bool
    {
        self.0 == other.as_bytes()
    }
}

impl fmt::Display for DexString
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.to_str()
        {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "{}", String::from_utf8_lossy(&self.0)),
        }
    }
}

impl Serialize for DexString
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        serializer.serialize_str(&self.to_string())
    }
}

bitflags! {
    /// Access flags of classes, fields and methods. Unknown bits are retained.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

/// What a set of access flags is attached to; some bits mean different
/// things on fields and methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget
{
    Class,
    Field,
    Method,
}

impl AccessFlags
{
    pub fn from_raw(raw: u32) -> Self
    {
        AccessFlags::from_bits_retain(raw)
    }

    /// Smali keywords for the set bits, in canonical order.
    pub fn keywords(self, target: FlagTarget) -> Vec<&'static str>
    {
        let table: &[(AccessFlags, &str)] = &[
            (AccessFlags::PUBLIC, "public"),
            (AccessFlags::PRIVATE, "private"),
            (AccessFlags::PROTECTED, "protected"),
            (AccessFlags::STATIC, "static"),
            (AccessFlags::FINAL, "final"),
        ];
        let mut m: Vec<&'static str> = table.iter().filter(|(f, _)| self.contains(*f)).map(|(_, k)| *k).collect();

        match target
        {
            FlagTarget::Field => {
                if self.contains(AccessFlags::VOLATILE) { m.push("volatile"); }
                if self.contains(AccessFlags::TRANSIENT) { m.push("transient"); }
            }
            FlagTarget::Method => {
                if self.contains(AccessFlags::SYNCHRONIZED) { m.push("synchronized"); }
                if self.contains(AccessFlags::BRIDGE) { m.push("bridge"); }
                if self.contains(AccessFlags::VARARGS) { m.push("varargs"); }
                if self.contains(AccessFlags::NATIVE) { m.push("native"); }
            }
            FlagTarget::Class => {}
        }

        let rest: &[(AccessFlags, &str)] = &[
            (AccessFlags::INTERFACE, "interface"),
            (AccessFlags::ABSTRACT, "abstract"),
            (AccessFlags::STRICT, "strictfp"),
            (AccessFlags::SYNTHETIC, "synthetic"),
            (AccessFlags::ANNOTATION, "annotation"),
            (AccessFlags::ENUM, "enum"),
            (AccessFlags::CONSTRUCTOR, "constructor"),
            (AccessFlags::DECLARED_SYNCHRONIZED, "declared-synchronized"),
        ];
        m.extend(rest.iter().filter(|(f, _)| self.contains(*f)).map(|(_, k)| *k));
        m
    }
}

fn write_keywords(f: &mut fmt::Formatter<'_>, flags: AccessFlags, target: FlagTarget) -> fmt::Result
{
    for k in flags.keywords(target) {
        write!(f, "{} ", k)?;
    }
    Ok(())
}

/// A proto_id resolved to its strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prototype
{
    pub shorty: DexString,
    pub return_type: DexType,
    pub parameters: Vec<DexType>,
}

impl fmt::Display for Prototype
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "(")?;
        for p in &self.parameters {
            write!(f, "{}", p)?;
        }
        write!(f, "){}", self.return_type)
    }
}

/// A field_id: a reference to a field, not yet tied to a class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawField
{
    pub class: DexType,
    pub field_type: DexType,
    pub name: DexString,
}

impl fmt::Display for RawField
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}->{}:{}", self.class, self.name, self.field_type)
    }
}

/// A method_id: a reference to a method, not yet tied to a class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMethod
{
    pub class: DexType,
    pub proto: Prototype,
    pub name: DexString,
}

impl fmt::Display for RawMethod
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}->{}{}", self.class, self.name, self.proto)
    }
}

/// A field as declared by a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field
{
    pub raw: RawField,
    pub access_flags: AccessFlags,
}

impl fmt::Display for Field
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, ".field ")?;
        write_keywords(f, self.access_flags, FlagTarget::Field)?;
        write!(f, "{}:{}", self.raw.name, self.raw.field_type)
    }
}

/// A method as declared by a class. Abstract and native methods have no code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Method
{
    pub raw: RawMethod,
    pub access_flags: AccessFlags,
    pub code: Option<CodeItem>,
}

impl Method
{
    pub fn has_code(&self) -> bool
    {
        self.code.is_some()
    }

    pub fn is_constructor(&self) -> bool
    {
        self.access_flags.contains(AccessFlags::CONSTRUCTOR)
    }
}

impl fmt::Display for Method
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, ".method ")?;
        write_keywords(f, self.access_flags, FlagTarget::Method)?;
        write!(f, "{}{}", self.raw.name, self.raw.proto)?;
        if let Some(code) = &self.code {
            write!(f, " {}", code)?;
        }
        Ok(())
    }
}

/// Offset of a data section structure that is left undecoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataRef
{
    pub offset: u32,
}

/// A class_def with everything it points at resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Class
{
    pub class_type: DexType,
    pub access_flags: AccessFlags,
    /// `None` for root classes.
    pub superclass: Option<DexType>,
    pub interfaces: Vec<DexType>,
    pub source_file: Option<DexString>,
    /// annotations_directory_item, not decoded.
    pub annotations: Option<DataRef>,
    pub static_fields: Vec<Field>,
    pub instance_fields: Vec<Field>,
    pub direct_methods: Vec<Method>,
    pub virtual_methods: Vec<Method>,
    /// encoded_array_item of static initial values, not decoded.
    pub static_values: Option<DataRef>,
}

impl Class
{
    pub fn fields(&self) -> impl Iterator<Item = &Field>
    {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method>
    {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }
}

impl fmt::Display for Class
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, ".class ")?;
        write_keywords(f, self.access_flags, FlagTarget::Class)?;
        writeln!(f, "{}", self.class_type)?;
        if let Some(s) = &self.superclass {
            writeln!(f, ".super {}", s)?;
        }
        if let Some(s) = &self.source_file {
            writeln!(f, ".source \"{}\"", s)?;
        }
        for i in &self.interfaces {
            writeln!(f, ".implements {}", i)?;
        }
        for field in self.fields() {
            writeln!(f, "{}", field)?;
        }
        for method in self.methods() {
            writeln!(f, "{}", method)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_match_is_bytewise()
    {
        let s = DexString::from("Lcom/app/MainActivity;");
        assert!(s.contains("MainActivity"));
        assert!(s.contains(""));
        assert!(!s.contains("mainactivity"));
        assert!(!DexString::default().contains("a"));
    }

    #[test]
    fn modified_utf8_decodes()
    {
        // U+0000 is stored as C0 80 in Modified UTF-8
        let s = DexString::new(vec![0x61, 0xc0, 0x80, 0x62]);
        assert_eq!(s.to_str().unwrap(), "a\0b");
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn keywords_depend_on_target()
    {
        let flags = AccessFlags::from_raw(0x1 | 0x8 | 0x40 | 0x80);
        assert_eq!(flags.keywords(FlagTarget::Field), vec!["public", "static", "volatile", "transient"]);
        assert_eq!(flags.keywords(FlagTarget::Method), vec!["public", "static", "bridge", "varargs"]);
        assert_eq!(flags.keywords(FlagTarget::Class), vec!["public", "static"]);
    }

    #[test]
    fn unknown_flag_bits_survive()
    {
        let flags = AccessFlags::from_raw(0x8000_0001);
        assert_eq!(flags.bits(), 0x8000_0001);
        assert!(flags.contains(AccessFlags::PUBLIC));
    }

    #[test]
    fn descriptors_render()
    {
        let proto = Prototype {
            shorty: DexString::from("VIL"),
            return_type: DexString::from("V"),
            parameters: vec![DexString::from("I"), DexString::from("Ljava/lang/String;")],
        };
        assert_eq!(proto.to_string(), "(ILjava/lang/String;)V");
        let m = RawMethod { class: DexString::from("Lfoo/Bar;"), proto, name: DexString::from("run") };
        assert_eq!(m.to_string(), "Lfoo/Bar;->run(ILjava/lang/String;)V");
        let fl = Field {
            raw: RawField { class: DexString::from("Lfoo/Bar;"), field_type: DexString::from("I"), name: DexString::from("count") },
            access_flags: AccessFlags::PRIVATE | AccessFlags::FINAL,
        };
        assert_eq!(fl.to_string(), ".field private final count:I");
        assert_eq!(fl.raw.to_string(), "Lfoo/Bar;->count:I");
    }
}
