//! CIP data model: elementary type codes, decoded values and device status.

use std::{borrow::Cow, fmt};

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    cursor::ByteReader,
    error::{Error, Result},
};

/// Maximum number of data bytes a CIP STRING value may carry.
pub const STRING_DATA_CAPACITY: usize = 82;

/// Data area written on the wire for a STRING: capacity plus trailing pad.
pub const STRING_DATA_AREA: usize = 84;

/// Encoded width of one STRING element: 4-byte length prefix + data capacity.
pub const STRING_ENCODED_LEN: usize = 86;

/// Structure handle of the standard STRING template, emitted little-endian
/// right after the type code when writing a string tag.
pub const STRING_STRUCTURE_HANDLE: u16 = 0x0FCE;

/// Elementary CIP data type codes.
///
/// Codes and widths follow the Logix data access reference
/// (publication 1756-PM020); `String` is the structured STRING template
/// (`0x02A0` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u16)]
pub enum CipDataType {
    Bool = 0x00C1,
    Sint = 0x00C2,
    Int = 0x00C3,
    Dint = 0x00C4,
    Lint = 0x00C5,
    Usint = 0x00C6,
    Uint = 0x00C7,
    Udint = 0x00C8,
    Ulint = 0x00C9,
    Real = 0x00CA,
    Lreal = 0x00CB,
    Byte = 0x00D1,
    Word = 0x00D2,
    Dword = 0x00D3,
    Lword = 0x00D4,
    String = 0x02A0,
}

impl CipDataType {
    /// Maps a raw wire code to a known type; `None` for unrecognised codes.
    pub fn from_raw(code: u16) -> Option<Self> {
        Some(match code {
            0x00C1 => Self::Bool,
            0x00C2 => Self::Sint,
            0x00C3 => Self::Int,
            0x00C4 => Self::Dint,
            0x00C5 => Self::Lint,
            0x00C6 => Self::Usint,
            0x00C7 => Self::Uint,
            0x00C8 => Self::Udint,
            0x00C9 => Self::Ulint,
            0x00CA => Self::Real,
            0x00CB => Self::Lreal,
            0x00D1 => Self::Byte,
            0x00D2 => Self::Word,
            0x00D3 => Self::Dword,
            0x00D4 => Self::Lword,
            0x02A0 => Self::String,
            _ => return None,
        })
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self as u16
    }

    /// Encoded element width in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Bool | Self::Sint | Self::Usint | Self::Byte => 1,
            Self::Int | Self::Uint | Self::Word => 2,
            Self::Dint | Self::Udint | Self::Dword | Self::Real => 4,
            Self::Lint | Self::Ulint | Self::Lword | Self::Lreal => 8,
            Self::String => STRING_ENCODED_LEN,
        }
    }
}

/// A bounded CIP STRING: up to 82 data bytes plus the structure handle the
/// device associates with the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipString {
    handle: u16,
    data: Vec<u8>,
}

impl CipString {
    pub fn new(text: &str) -> Result<Self> {
        Self::from_bytes(STRING_STRUCTURE_HANDLE, text.as_bytes())
    }

    pub fn from_bytes(handle: u16, data: &[u8]) -> Result<Self> {
        if data.len() > STRING_DATA_CAPACITY {
            return Err(Error::OutOfRange {
                context: "string data exceeds 82 bytes",
            });
        }
        Ok(Self {
            handle,
            data: data.to_vec(),
        })
    }

    #[inline]
    pub fn handle(&self) -> u16 {
        self.handle
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// A decoded CIP value, tagged by its elementary type.
///
/// Every recognised type code has its own variant so decode and encode stay
/// total; bit-string types (`Byte`/`Word`/`Dword`/`Lword`) are carried
/// separately from their unsigned-integer twins because the type code must
/// round-trip on a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum CipValue {
    Bool(bool),
    Sint(i8),
    Int(i16),
    Dint(i32),
    Lint(i64),
    Usint(u8),
    Uint(u16),
    Udint(u32),
    Ulint(u64),
    Real(f32),
    Lreal(f64),
    Byte(u8),
    Word(u16),
    Dword(u32),
    Lword(u64),
    String(CipString),
}

impl CipValue {
    pub fn data_type(&self) -> CipDataType {
        match self {
            Self::Bool(_) => CipDataType::Bool,
            Self::Sint(_) => CipDataType::Sint,
            Self::Int(_) => CipDataType::Int,
            Self::Dint(_) => CipDataType::Dint,
            Self::Lint(_) => CipDataType::Lint,
            Self::Usint(_) => CipDataType::Usint,
            Self::Uint(_) => CipDataType::Uint,
            Self::Udint(_) => CipDataType::Udint,
            Self::Ulint(_) => CipDataType::Ulint,
            Self::Real(_) => CipDataType::Real,
            Self::Lreal(_) => CipDataType::Lreal,
            Self::Byte(_) => CipDataType::Byte,
            Self::Word(_) => CipDataType::Word,
            Self::Dword(_) => CipDataType::Dword,
            Self::Lword(_) => CipDataType::Lword,
            Self::String(_) => CipDataType::String,
        }
    }

    /// Decodes one element of `ty` from the reader.
    ///
    /// Floating types are read as little-endian bit patterns and
    /// reinterpreted; the string form reads its 32-bit length prefix and
    /// bounds-checks it against both the 82-byte capacity and the remaining
    /// input before copying.
    pub fn decode(ty: CipDataType, r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(match ty {
            CipDataType::Bool => Self::Bool(r.read_u8()? != 0),
            CipDataType::Sint => Self::Sint(r.read_u8()? as i8),
            CipDataType::Int => Self::Int(r.read_u16_le()? as i16),
            CipDataType::Dint => Self::Dint(r.read_u32_le()? as i32),
            CipDataType::Lint => Self::Lint(r.read_u64_le()? as i64),
            CipDataType::Usint => Self::Usint(r.read_u8()?),
            CipDataType::Uint => Self::Uint(r.read_u16_le()?),
            CipDataType::Udint => Self::Udint(r.read_u32_le()?),
            CipDataType::Ulint => Self::Ulint(r.read_u64_le()?),
            CipDataType::Real => Self::Real(f32::from_bits(r.read_u32_le()?)),
            CipDataType::Lreal => Self::Lreal(f64::from_bits(r.read_u64_le()?)),
            CipDataType::Byte => Self::Byte(r.read_u8()?),
            CipDataType::Word => Self::Word(r.read_u16_le()?),
            CipDataType::Dword => Self::Dword(r.read_u32_le()?),
            CipDataType::Lword => Self::Lword(r.read_u64_le()?),
            CipDataType::String => {
                let len = r.read_u32_le()? as usize;
                if len > STRING_DATA_CAPACITY {
                    return Err(Error::Decode {
                        context: "string length exceeds 82-byte capacity",
                    });
                }
                let data = r.read_bytes(len)?;
                Self::String(CipString {
                    handle: STRING_STRUCTURE_HANDLE,
                    data: data.to_vec(),
                })
            }
        })
    }

    /// Decodes one element and also captures the exact bytes it consumed,
    /// so the value can later be re-encoded verbatim on a write.
    pub fn decode_with_raw(ty: CipDataType, r: &mut ByteReader<'_>) -> Result<(Self, Bytes)> {
        let mark = r.position();
        let value = Self::decode(ty, r)?;
        let raw = Bytes::copy_from_slice(r.span_since(mark));
        Ok((value, raw))
    }

    /// Appends the element's data bytes (the read-path inverse of
    /// [`CipValue::decode`]). String padding to the full data area is a
    /// write-framing concern and is not applied here.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Self::Bool(v) => out.put_u8(u8::from(*v)),
            Self::Sint(v) => out.put_u8(*v as u8),
            Self::Int(v) => out.put_u16_le(*v as u16),
            Self::Dint(v) => out.put_u32_le(*v as u32),
            Self::Lint(v) => out.put_u64_le(*v as u64),
            Self::Usint(v) => out.put_u8(*v),
            Self::Uint(v) => out.put_u16_le(*v),
            Self::Udint(v) => out.put_u32_le(*v),
            Self::Ulint(v) => out.put_u64_le(*v),
            Self::Real(v) => out.put_u32_le(v.to_bits()),
            Self::Lreal(v) => out.put_u64_le(v.to_bits()),
            Self::Byte(v) => out.put_u8(*v),
            Self::Word(v) => out.put_u16_le(*v),
            Self::Dword(v) => out.put_u32_le(*v),
            Self::Lword(v) => out.put_u64_le(*v),
            Self::String(s) => {
                out.put_u32_le(s.data.len() as u32);
                out.put_slice(&s.data);
            }
        }
    }

    /// The element's data bytes as an owned buffer.
    pub fn to_wire_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.data_type().size());
        self.encode(&mut out);
        out.freeze()
    }
}

impl fmt::Display for CipValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Sint(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Dint(v) => write!(f, "{v}"),
            Self::Lint(v) => write!(f, "{v}"),
            Self::Usint(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Udint(v) => write!(f, "{v}"),
            Self::Ulint(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Lreal(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v:#04x}"),
            Self::Word(v) => write!(f, "{v:#06x}"),
            Self::Dword(v) => write!(f, "{v:#010x}"),
            Self::Lword(v) => write!(f, "{v:#018x}"),
            Self::String(s) => write!(f, "{:?}", s.to_string_lossy()),
        }
    }
}

/// A decoded value together with its provenance: the device status that
/// accompanied it, the capture time and the verbatim wire bytes.
#[derive(Debug, Clone)]
pub struct TagValue {
    /// CIP general status reported for this item.
    pub status: u8,
    /// First additional status word, when the reply supplied one.
    pub ext_status: u16,
    /// Capture time, assigned when the reply was decoded.
    pub timestamp: DateTime<Utc>,
    pub value: CipValue,
    /// Exact bytes the value was decoded from, kept for write round-trips.
    pub raw: Bytes,
}

impl TagValue {
    pub fn new(value: CipValue, raw: Bytes) -> Self {
        Self {
            status: 0,
            ext_status: 0,
            timestamp: Utc::now(),
            value,
            raw,
        }
    }

    #[inline]
    pub fn data_type(&self) -> CipDataType {
        self.value.data_type()
    }
}

/// CIP service codes used by this driver. Replies echo the request code
/// with [`service::REPLY_FLAG`] set.
pub mod service {
    pub const READ_TAG: u8 = 0x4C;
    pub const WRITE_TAG: u8 = 0x4D;
    pub const FORWARD_CLOSE: u8 = 0x4E;
    pub const MULTIPLE_SERVICE: u8 = 0x0A;
    pub const FORWARD_OPEN: u8 = 0x54;
    pub const REPLY_FLAG: u8 = 0x80;
}

/// Well-known CIP object class codes.
pub mod class {
    pub const IDENTITY: u16 = 0x01;
    pub const MESSAGE_ROUTER: u16 = 0x02;
    pub const ASSEMBLY: u16 = 0x04;
    pub const CONNECTION: u16 = 0x05;
    pub const CONNECTION_MANAGER: u16 = 0x06;
}

/// Identity object (class 0x01) instance attribute ids.
pub mod identity_attr {
    pub const VENDOR_ID: u16 = 1;
    pub const DEVICE_TYPE: u16 = 2;
    pub const PRODUCT_CODE: u16 = 3;
    pub const REVISION: u16 = 4;
    pub const STATUS: u16 = 5;
    pub const SERIAL_NUMBER: u16 = 6;
    pub const PRODUCT_NAME: u16 = 7;
}

/// Human-readable text for a CIP general status code.
///
/// Codes `0x2F..=0xCF` are reserved by the CIP specification and
/// `0xD0..=0xFF` are object-class specific; both fall through to the
/// unknown arm.
pub fn status_description(status: u8) -> &'static str {
    match status {
        0x00 => "Success",
        0x01 => "Connection-related service failed along the connection path",
        0x02 => "Resource unavailable",
        0x03 => "Invalid parameter value",
        0x04 => "Path segment error. Tag does not exist in the device",
        0x05 => "Path destination unknown. Structure member does not exist or array element is out of range",
        0x06 => "Partial transfer; only part of the expected data was transferred",
        0x07 => "Loss of connection",
        0x08 => "Service not supported",
        0x09 => "Invalid attribute value",
        0x0A => "Attribute list error",
        0x0B => "Object cannot perform the requested service in its current mode/state",
        0x0C => "Object cannot perform service in current state",
        0x0D => "Requested instance of object to be created already exists",
        0x0E => "A request to modify a non-editable attribute was received",
        0x0F => "A permission / privilege check failed",
        0x10 => "The device's current mode/state prohibits the execution of the requested service",
        0x11 => "Reply data too large",
        0x12 => "The service specified an operation that would fragment a primitive data value",
        0x13 => "Not enough data",
        0x14 => "Attribute not supported",
        0x15 => "Too much data. The service supplied more data than expected",
        0x16 => "The object specified does not exist in the device",
        0x17 => "The fragmentation sequence for this service is not currently active for this data",
        0x18 => "The attribute data of this object was not saved prior to the requested service",
        0x19 => "The attribute data of this object was not saved due to a failure during the attempt",
        0x1A => "Routing failure; request packet too large",
        0x1B => "Routing failure; response packet too large",
        0x1C => "Missing attribute in list entry data",
        0x1D => "Invalid attribute value list",
        0x1E => "Embedded service error. One or more services returned an error within a multiple-service packet service",
        0x1F => "Vendor-specific error. Consult vendor documentation",
        0x20 => "Invalid parameter. Parameter does not meet the requirements of the CIP specification",
        0x21 => "An attempt was made to write to a write-once medium that has already been written",
        0x22 => "Invalid reply received. Reply service code does not match the request service code or reply message is shorter than the minimum expected reply size",
        0x23 => "The message received is larger than the receiving buffer can handle",
        0x24 => "The format of the received message is not supported by the server",
        0x25 => "The key segment included as the first segment in the path does not match the destination module",
        0x26 => "The size of the path sent with the service request is not large enough to allow the request to be routed to an object or too much routing data was included",
        0x27 => "Unexpected attribute in list",
        0x28 => "The member ID specified in the request does not exist in the specified class, instance, or attribute",
        0x29 => "A request to modify a non-modifiable member was received",
        0x2A => "DeviceNet-specific error",
        0x2B => "A CIP to Modbus translator received an unknown Modbus exception code",
        0x2C => "A request to read a non-readable attribute was received",
        0x2D => "A requested object instance cannot be deleted",
        0x2E => "The object supports the service, but not for the designated application path",
        _ => "Unknown error",
    }
}
