//! Reply parsing for encapsulation envelopes and CIP service responses.
//!
//! Every reply is unwrapped in the same order: encapsulation header checks,
//! CPF envelope, then the service reply with its general/additional status
//! block. Embedded Multiple Service Packet replies reuse the same service
//! reply parser so single and batched reads cannot drift apart.

use super::{
    super::{
        cursor::ByteReader,
        error::{Error, Result},
        types::{service, CipDataType, CipValue, TagValue},
    },
    header::EncapCommand,
    EncapPacket, CPF_NULL_ADDRESS, CPF_UNCONNECTED_DATA,
};
use bytes::Bytes;

/// Unwrap a SendRRData reply down to the CIP payload carried by the
/// unconnected data item.
pub fn unwrap_rr_data(packet: &EncapPacket) -> Result<Bytes> {
    if packet.header.command != EncapCommand::SendRrData.raw() {
        return Err(Error::ProtocolViolation {
            context: "reply is not SendRRData",
        });
    }
    if packet.header.status != 0 {
        return Err(Error::EncapStatus {
            status: packet.header.status,
        });
    }

    let mut r = ByteReader::new(&packet.payload);
    r.read_u32_le()?; // interface handle
    r.read_u16_le()?; // timeout
    let item_count = r.read_u16_le()?;
    if item_count != 2 {
        return Err(Error::ProtocolViolation {
            context: "unexpected CPF item count",
        });
    }

    let address_type = r.read_u16_le()?;
    if address_type != CPF_NULL_ADDRESS {
        return Err(Error::ProtocolViolation {
            context: "first CPF item is not the null address item",
        });
    }
    let address_len = r.read_u16_le()? as usize;
    r.skip(address_len)?;

    let data_type = r.read_u16_le()?;
    if data_type != CPF_UNCONNECTED_DATA {
        return Err(Error::ProtocolViolation {
            context: "second CPF item is not the unconnected data item",
        });
    }
    let data_len = r.read_u16_le()? as usize;
    if data_len > r.remaining() {
        return Err(Error::InsufficientData {
            needed: data_len,
            available: r.remaining(),
        });
    }
    let start = r.position();
    Ok(packet.payload.slice(start..start + data_len))
}

/// A parsed CIP service reply: echoed service code, status block and the
/// remaining reply data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReply {
    /// Echoed service code with the reply flag set.
    pub service: u8,
    /// General status, zero on success.
    pub status: u8,
    /// First additional status word, zero when none was supplied.
    pub ext_status: u16,
    /// Reply data following the status block.
    pub data: Bytes,
}

impl ServiceReply {
    /// Parse `service + reserved + status + additional status` and slice off
    /// the reply data. Any additional status words beyond the first are
    /// consumed but not kept.
    pub fn parse(cip: &Bytes) -> Result<Self> {
        let mut r = ByteReader::new(cip);
        let service = r.read_u8()?;
        r.read_u8()?; // reserved
        let status = r.read_u8()?;
        let additional_words = r.read_u8()? as usize;
        let ext_status = if additional_words > 0 {
            let first = r.read_u16_le()?;
            r.skip((additional_words - 1) * 2)?;
            first
        } else {
            0
        };
        let data = cip.slice(r.position()..);
        Ok(Self {
            service,
            status,
            ext_status,
            data,
        })
    }

    /// Check that this reply echoes `request` with the reply flag set.
    pub fn expect_echo_of(&self, request: u8) -> Result<()> {
        if self.service != request | service::REPLY_FLAG {
            return Err(Error::ProtocolViolation {
                context: "service code echo mismatch",
            });
        }
        Ok(())
    }

    /// Turn a non-zero general status into a typed error.
    pub fn check_status(&self) -> Result<()> {
        if self.status != 0 {
            return Err(Error::CipStatus {
                status: self.status,
                ext_status: self.ext_status,
            });
        }
        Ok(())
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Decode a single-tag read reply: a type code followed directly by one
/// value. The string form here carries no structure handle; the handle only
/// appears in embedded Multiple Service Packet replies.
pub fn decode_read_reply(reply: &ServiceReply) -> Result<TagValue> {
    let mut r = ByteReader::new(&reply.data);
    let code = r.read_u16_le()?;
    let ty = CipDataType::from_raw(code).ok_or(Error::UnsupportedDataType { code })?;
    let (value, raw) = CipValue::decode_with_raw(ty, &mut r)?;
    Ok(TagValue::new(value, raw))
}

/// Decode an array read reply: a type code followed by `element_count`
/// values laid out at fixed strides of the type's encoded size. Strings
/// occupy the whole 86-byte structure even when the text is shorter.
pub fn decode_read_array_reply(
    reply: &ServiceReply,
    element_count: u16,
) -> Result<Vec<TagValue>> {
    let mut r = ByteReader::new(&reply.data);
    let code = r.read_u16_le()?;
    let ty = CipDataType::from_raw(code).ok_or(Error::UnsupportedDataType { code })?;
    let stride = ty.size();
    let values_start = r.position();

    let needed = element_count as usize * stride;
    let available = reply.data.len() - values_start;
    if available < needed {
        return Err(Error::InsufficientData { needed, available });
    }

    let mut out = Vec::with_capacity(element_count as usize);
    for i in 0..element_count as usize {
        let mut er = ByteReader::new(&reply.data[values_start + i * stride..]);
        let (value, raw) = CipValue::decode_with_raw(ty, &mut er)?;
        out.push(TagValue::new(value, raw));
    }
    Ok(out)
}

/// Split a Multiple Service Packet reply into its embedded service replies,
/// order-aligned with the request.
///
/// The top-level status is accepted when it is success or `0x1E` (one or
/// more embedded services failed); per-item status is reported on each
/// returned [`ServiceReply`] so callers keep request/result alignment even
/// for partial failures.
pub fn split_multiple_service(reply: &ServiceReply) -> Result<Vec<ServiceReply>> {
    reply.expect_echo_of(service::MULTIPLE_SERVICE)?;
    if reply.status != 0x00 && reply.status != 0x1E {
        return Err(Error::CipStatus {
            status: reply.status,
            ext_status: reply.ext_status,
        });
    }

    let mut r = ByteReader::new(&reply.data);
    let item_count = r.read_u16_le()? as usize;
    let mut offsets = Vec::with_capacity(item_count);
    for _ in 0..item_count {
        // Offsets are measured from the reply count field, i.e. from the
        // start of this reply's data.
        offsets.push(r.read_u16_le()? as usize);
    }

    let mut items = Vec::with_capacity(item_count);
    for i in 0..item_count {
        let start = offsets[i];
        let end = if i + 1 < item_count {
            offsets[i + 1]
        } else {
            reply.data.len()
        };
        if start >= end || end > reply.data.len() {
            return Err(Error::ProtocolViolation {
                context: "embedded reply offset out of range",
            });
        }
        items.push(ServiceReply::parse(&reply.data.slice(start..end))?);
    }
    Ok(items)
}

/// Decode the value carried by one embedded read reply.
///
/// Unlike single-tag replies, embedded string replies carry the 2-byte
/// structure handle between the type code and the length word; it is
/// consumed here and not part of the captured raw bytes.
pub fn decode_embedded_read_value(item: &ServiceReply) -> Result<TagValue> {
    let mut r = ByteReader::new(&item.data);
    let code = r.read_u16_le()?;
    let ty = CipDataType::from_raw(code).ok_or(Error::UnsupportedDataType { code })?;
    if ty == CipDataType::String {
        r.skip(2)?; // structure handle
    }
    let (value, raw) = CipValue::decode_with_raw(ty, &mut r)?;
    Ok(TagValue::new(value, raw))
}

/// Parse a ForwardOpen reply and extract the network connection id the
/// target chose for the originator-to-target direction.
pub fn parse_forward_open_reply(cip: &Bytes) -> Result<u32> {
    let reply = ServiceReply::parse(cip)?;
    reply.expect_echo_of(service::FORWARD_OPEN)?;
    reply.check_status()?;
    let mut r = ByteReader::new(&reply.data);
    r.read_u32_le()
}
