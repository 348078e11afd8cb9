//! Netlink attribute (rtattr/nlattr) handling.
//!
//! Attributes are decoded into an [`AttrMap`] guided by a static [`Schema`]
//! that says which attribute types hold fixed-width integers, which hold
//! raw bytes and which hold nested attribute streams.

use std::collections::BTreeMap;

use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Netlink attribute header (mirrors struct nlattr / struct rtattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

impl NlAttr {
    /// Create a new attribute header.
    ///
    /// `nla_len` is 16 bits, so `data_len` must not exceed
    /// `u16::MAX - NLA_HDRLEN`.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        debug_assert!(
            NLA_HDRLEN + data_len <= u16::MAX as usize,
            "attribute payload of {} bytes does not fit nla_len",
            data_len
        );
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the attribute type without flags.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    /// Check if this is a nested attribute.
    pub fn is_nested(&self) -> bool {
        self.nla_type & NLA_F_NESTED != 0
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// How the payload of one attribute type is interpreted.
#[derive(Debug, Clone, Copy)]
pub enum AttrKind {
    U8,
    U16,
    U32,
    U64,
    Bytes,
    Nested(&'static Schema),
}

/// Attribute layout of one message kind.
#[derive(Debug)]
pub struct Schema {
    /// Name used in diagnostics.
    pub name: &'static str,
    /// Known attribute types. Types not listed decode as bytes, or as a
    /// nested map when the kernel set NLA_F_NESTED.
    pub entries: &'static [(u16, AttrKind)],
}

/// Schema with no known entries; used for unknown nested attributes.
pub static OPAQUE: Schema = Schema {
    name: "opaque",
    entries: &[],
};

impl Schema {
    fn kind_of(&self, kind: u16, nested_flag: bool) -> AttrKind {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
            .unwrap_or(if nested_flag {
                AttrKind::Nested(&OPAQUE)
            } else {
                AttrKind::Bytes
            })
    }
}

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(Vec<u8>),
    Nested(AttrMap),
}

impl AttrValue {
    fn decode(kind_id: u16, kind: AttrKind, data: &[u8]) -> Result<Self> {
        fn fixed<const N: usize>(kind_id: u16, data: &[u8]) -> Result<[u8; N]> {
            data.get(..N)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| Error::InvalidAttribute {
                    kind: kind_id,
                    reason: format!("{} byte payload, need {}", data.len(), N),
                })
        }

        Ok(match kind {
            AttrKind::U8 => Self::U8(fixed::<1>(kind_id, data)?[0]),
            AttrKind::U16 => Self::U16(u16::from_ne_bytes(fixed(kind_id, data)?)),
            AttrKind::U32 => Self::U32(u32::from_ne_bytes(fixed(kind_id, data)?)),
            AttrKind::U64 => Self::U64(u64::from_ne_bytes(fixed(kind_id, data)?)),
            AttrKind::Bytes => Self::Bytes(data.to_vec()),
            AttrKind::Nested(schema) => Self::Nested(AttrMap::parse(data, schema)?),
        })
    }

    fn write_to(&self, attr_type: u16, buf: &mut Vec<u8>) {
        match self {
            Self::U8(v) => write_attr(buf, attr_type, &[*v]),
            Self::U16(v) => write_attr(buf, attr_type, &v.to_ne_bytes()),
            Self::U32(v) => write_attr(buf, attr_type, &v.to_ne_bytes()),
            Self::U64(v) => write_attr(buf, attr_type, &v.to_ne_bytes()),
            Self::Bytes(v) => write_attr(buf, attr_type, v),
            Self::Nested(map) => {
                let start = buf.len();
                buf.extend_from_slice(NlAttr::new(attr_type | NLA_F_NESTED, 0).as_bytes());
                map.write_to(buf);
                let len = buf.len() - start;
                debug_assert!(len <= u16::MAX as usize, "nested attribute too long");
                buf[start..start + 2].copy_from_slice(&(len as u16).to_ne_bytes());
            }
        }
    }
}

/// Attributes of one message, keyed by type (flags masked off).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrMap {
    attrs: BTreeMap<u16, AttrValue>,
}

impl AttrMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an attribute stream.
    ///
    /// Alignment padding between attributes is skipped. A declared length
    /// shorter than the header or running past the end of `data` is an
    /// error, as is a fixed-width attribute shorter than its width.
    pub fn parse(mut data: &[u8], schema: &Schema) -> Result<Self> {
        let mut map = Self::new();

        while !data.is_empty() {
            let attr = NlAttr::from_bytes(data).map_err(|_| {
                Error::MalformedMessage(format!(
                    "{}: {} trailing bytes, attribute header needs {}",
                    schema.name,
                    data.len(),
                    NLA_HDRLEN
                ))
            })?;

            let len = attr.nla_len as usize;
            if len < NLA_HDRLEN || len > data.len() {
                return Err(Error::MalformedMessage(format!(
                    "{}: attribute {} declares length {} with {} bytes remaining",
                    schema.name,
                    attr.kind(),
                    len,
                    data.len()
                )));
            }

            let payload = &data[NLA_HDRLEN..len];
            let kind = schema.kind_of(attr.kind(), attr.is_nested());
            let value = AttrValue::decode(attr.kind(), kind, payload)?;
            map.attrs.insert(attr.kind(), value);

            // The last attribute may omit its padding.
            let aligned = nla_align(len);
            data = if aligned >= data.len() {
                &[]
            } else {
                &data[aligned..]
            };
        }

        Ok(map)
    }

    /// Insert or replace an attribute.
    pub fn insert(&mut self, kind: u16, value: AttrValue) -> &mut Self {
        self.attrs.insert(kind & NLA_TYPE_MASK, value);
        self
    }

    /// Get a raw value.
    pub fn get(&self, kind: u16) -> Option<&AttrValue> {
        self.attrs.get(&kind)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// True if no attributes are present.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Iterate over (type, value) pairs in type order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &AttrValue)> {
        self.attrs.iter().map(|(k, v)| (*k, v))
    }

    pub fn u8(&self, kind: u16) -> Option<u8> {
        match self.get(kind)? {
            AttrValue::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn u16(&self, kind: u16) -> Option<u16> {
        match self.get(kind)? {
            AttrValue::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn u32(&self, kind: u16) -> Option<u32> {
        match self.get(kind)? {
            AttrValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn u64(&self, kind: u16) -> Option<u64> {
        match self.get(kind)? {
            AttrValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn bytes(&self, kind: u16) -> Option<&[u8]> {
        match self.get(kind)? {
            AttrValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn nested(&self, kind: u16) -> Option<&AttrMap> {
        match self.get(kind)? {
            AttrValue::Nested(v) => Some(v),
            _ => None,
        }
    }

    /// Extract a null-terminated string attribute.
    pub fn string(&self, kind: u16) -> Result<Option<String>> {
        let Some(data) = self.bytes(kind) else {
            return Ok(None);
        };
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map(|s| Some(s.to_string()))
            .map_err(|e| Error::InvalidAttribute {
                kind,
                reason: format!("invalid UTF-8: {}", e),
            })
    }

    /// Encode all attributes, each padded to NLA_ALIGNTO.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        for (kind, value) in &self.attrs {
            value.write_to(*kind, buf);
        }
    }
}

/// Append one attribute with its padding.
pub fn write_attr(buf: &mut Vec<u8>, attr_type: u16, data: &[u8]) {
    buf.extend_from_slice(NlAttr::new(attr_type, data.len()).as_bytes());
    buf.extend_from_slice(data);
    let aligned = nla_align(buf.len());
    buf.resize(aligned, 0);
}

/// Null-terminate a string for use as an attribute payload.
pub fn c_string(value: &str) -> Vec<u8> {
    let mut data = value.as_bytes().to_vec();
    data.push(0);
    data
}
