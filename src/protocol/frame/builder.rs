//! Request builders for session management and CIP services.
//!
//! Session-level builders produce complete [`EncapPacket`]s; service-level
//! builders produce the raw CIP payload that the session wraps in a
//! SendRRData envelope before transmission.

use super::{
    super::{
        error::{Error, Result},
        types::{class, service, CipDataType, CipValue, STRING_DATA_AREA},
    },
    header::{EncapCommand, EncapHeader},
    path, EncapPacket, CPF_NULL_ADDRESS, CPF_UNCONNECTED_DATA, RR_DATA_OVERHEAD,
};
use bytes::{BufMut, Bytes, BytesMut};

/// Requested encapsulation protocol version, little-endian on the wire.
const PROTOCOL_VERSION: u16 = 1;

/// Build a RegisterSession request. The session handle is zero because the
/// target has not issued one yet.
pub fn build_register_session() -> EncapPacket {
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u16_le(PROTOCOL_VERSION);
    payload.put_u16_le(0); // option flags
    EncapPacket::new(
        EncapHeader::new(EncapCommand::RegisterSession, 4, 0),
        payload.freeze(),
    )
}

/// Build an UnregisterSession request carrying the handle being released.
/// The target answers by closing the connection, not with a reply packet.
pub fn build_unregister_session(session_handle: u32) -> EncapPacket {
    EncapPacket::new(
        EncapHeader::new(EncapCommand::UnregisterSession, 0, session_handle),
        Bytes::new(),
    )
}

/// Wrap a CIP request in a SendRRData envelope: interface handle and timeout,
/// then a two-item CPF with a null address item and an unconnected data item
/// holding the CIP bytes.
pub fn wrap_rr_data(session_handle: u32, cip: Bytes) -> Result<EncapPacket> {
    let payload_len = RR_DATA_OVERHEAD + cip.len();
    if payload_len > u16::MAX as usize {
        return Err(Error::Encode {
            context: "CIP payload exceeds encapsulation length field",
        });
    }
    let mut payload = BytesMut::with_capacity(payload_len);
    payload.put_u32_le(0); // interface handle: CIP
    payload.put_u16_le(0); // timeout, handled at the encapsulation level
    payload.put_u16_le(2); // item count
    payload.put_u16_le(CPF_NULL_ADDRESS);
    payload.put_u16_le(0);
    payload.put_u16_le(CPF_UNCONNECTED_DATA);
    payload.put_u16_le(cip.len() as u16);
    payload.put_slice(&cip);
    Ok(EncapPacket::new(
        EncapHeader::new(EncapCommand::SendRrData, payload_len as u16, session_handle),
        payload.freeze(),
    ))
}

/// Append `service code + path size + path` for a tag reference.
fn put_tag_service_header(buf: &mut BytesMut, service_code: u8, tag: &str) -> Result<()> {
    let path = path::encode_tag_path(tag)?;
    buf.put_u8(service_code);
    buf.put_u8(path::path_size_words(path.len())?);
    buf.put_slice(&path);
    Ok(())
}

/// Append `service code + path size + path` for a class/instance/attribute.
fn put_logical_service_header(
    buf: &mut BytesMut,
    service_code: u8,
    class: u16,
    instance: u16,
    attribute: u16,
) -> Result<()> {
    let path = path::encode_logical_path(class, instance, attribute);
    buf.put_u8(service_code);
    buf.put_u8(path::path_size_words(path.len())?);
    buf.put_slice(&path);
    Ok(())
}

/// Append the value portion of a Write Tag request.
///
/// Numeric values are written as `element count (1)` followed by the raw
/// little-endian bytes. Strings carry the structure handle before the
/// element count, then a 4-byte length and the character data zero-padded
/// to the full 84-byte data area.
fn put_write_value(buf: &mut BytesMut, value: &CipValue) {
    buf.put_u16_le(value.data_type().raw());
    match value {
        CipValue::String(s) => {
            buf.put_u16_le(s.handle());
            buf.put_u16_le(1);
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
            buf.put_bytes(0, STRING_DATA_AREA - s.len());
        }
        other => {
            buf.put_u16_le(1);
            other.encode(buf);
        }
    }
}

/// Build a Read Tag request body (without the MSR or RR wrappers).
fn read_tag_request(tag: &str, element_count: u16) -> Result<BytesMut> {
    if element_count == 0 {
        return Err(Error::Encode {
            context: "element count must be at least 1",
        });
    }
    let mut buf = BytesMut::new();
    put_tag_service_header(&mut buf, service::READ_TAG, tag)?;
    buf.put_u16_le(element_count);
    Ok(buf)
}

/// Build a Write Tag request body for a single typed value.
fn write_tag_request(tag: &str, value: &CipValue) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    put_tag_service_header(&mut buf, service::WRITE_TAG, tag)?;
    put_write_value(&mut buf, value);
    Ok(buf)
}

/// CIP payload for reading `element_count` elements of a tag.
pub fn build_read_tag(tag: &str, element_count: u16) -> Result<Bytes> {
    Ok(read_tag_request(tag, element_count)?.freeze())
}

/// CIP payload for writing a single typed value to a tag.
pub fn build_write_tag(tag: &str, value: &CipValue) -> Result<Bytes> {
    Ok(write_tag_request(tag, value)?.freeze())
}

/// CIP payload for writing `element_count` elements of raw little-endian
/// data to a tag. The data length must match the element count exactly.
pub fn build_write_tag_array(
    tag: &str,
    ty: CipDataType,
    element_count: u16,
    data: &[u8],
) -> Result<Bytes> {
    if element_count == 0 {
        return Err(Error::Encode {
            context: "element count must be at least 1",
        });
    }
    if data.len() != element_count as usize * ty.size() {
        return Err(Error::Encode {
            context: "data length does not match element count",
        });
    }
    let mut buf = BytesMut::new();
    put_tag_service_header(&mut buf, service::WRITE_TAG, tag)?;
    buf.put_u16_le(ty.raw());
    buf.put_u16_le(element_count);
    buf.put_slice(data);
    Ok(buf.freeze())
}

/// One embedded write in a Multiple Service Packet request.
#[derive(Debug, Clone)]
pub struct TagWrite {
    /// Tag reference (`Name[i].Member` syntax).
    pub tag: String,
    /// Value to write.
    pub value: CipValue,
}

impl TagWrite {
    pub fn new(tag: impl Into<String>, value: CipValue) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }
}

/// Wrap embedded requests in a Multiple Service Packet addressed to the
/// Message Router. Offsets in the embedded-request table are measured from
/// the service count field.
fn wrap_multiple_service(requests: Vec<BytesMut>) -> Result<Bytes> {
    if requests.is_empty() {
        return Err(Error::Encode {
            context: "multiple service request needs at least one embedded request",
        });
    }
    if requests.len() > u16::MAX as usize {
        return Err(Error::Encode {
            context: "too many embedded requests",
        });
    }

    let mut buf = BytesMut::new();
    buf.put_u8(service::MULTIPLE_SERVICE);
    buf.put_u8(0x02); // path size in words
    path::put_logical_class(&mut buf, class::MESSAGE_ROUTER);
    path::put_logical_instance(&mut buf, 1);
    buf.put_u16_le(requests.len() as u16);

    let mut offset = 2 + 2 * requests.len();
    for request in &requests {
        if offset > u16::MAX as usize {
            return Err(Error::Encode {
                context: "embedded request offset exceeds 16 bits",
            });
        }
        buf.put_u16_le(offset as u16);
        offset += request.len();
    }
    for request in requests {
        buf.put_slice(&request);
    }
    Ok(buf.freeze())
}

/// CIP payload reading one element of each tag via a Multiple Service Packet.
pub fn build_multiple_read<S: AsRef<str>>(tags: &[S]) -> Result<Bytes> {
    let requests = tags
        .iter()
        .map(|tag| read_tag_request(tag.as_ref(), 1))
        .collect::<Result<Vec<_>>>()?;
    wrap_multiple_service(requests)
}

/// CIP payload writing one value to each tag via a Multiple Service Packet.
pub fn build_multiple_write(writes: &[TagWrite]) -> Result<Bytes> {
    let requests = writes
        .iter()
        .map(|w| write_tag_request(&w.tag, &w.value))
        .collect::<Result<Vec<_>>>()?;
    wrap_multiple_service(requests)
}

/// CIP payload for reading a single object attribute.
pub fn build_read_attribute(class: u16, instance: u16, attribute: u16) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    put_logical_service_header(&mut buf, service::READ_TAG, class, instance, attribute)?;
    buf.put_u16_le(1); // element count
    Ok(buf.freeze())
}

/// CIP payload for writing a single object attribute.
pub fn build_write_attribute(
    class: u16,
    instance: u16,
    attribute: u16,
    value: &CipValue,
) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    put_logical_service_header(&mut buf, service::WRITE_TAG, class, instance, attribute)?;
    put_write_value(&mut buf, value);
    Ok(buf.freeze())
}

/// Class 1 connection parameters for ForwardOpen/ForwardClose.
///
/// Defaults match the fixed parameter block this driver has always sent:
/// 500-unit RPIs in both directions, network parameter word `0x0043`
/// (point-to-point, low priority, fixed 3-byte payload) and a class 1
/// cyclic transport (`0xA3`).
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Connection serial number echoed in ForwardClose.
    pub connection_serial: u16,
    /// Originator vendor id.
    pub vendor_id: u16,
    /// Originator serial number (16-bit field in this driver's request).
    pub originator_serial: u16,
    /// Connection timeout multiplier code.
    pub timeout_multiplier: u8,
    /// Originator-to-target requested packet interval.
    pub o_t_rpi: u32,
    /// Target-to-originator requested packet interval.
    pub t_o_rpi: u32,
    /// Network parameter word used for both directions.
    pub network_params: u16,
    /// Transport class and trigger byte.
    pub transport_trigger: u8,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            connection_serial: 0x0001,
            vendor_id: 0x1234,
            originator_serial: 0x5678,
            timeout_multiplier: 0x03,
            o_t_rpi: 500,
            t_o_rpi: 500,
            network_params: 0x0043,
            transport_trigger: 0xA3,
        }
    }
}

/// Application connection path appended to ForwardOpen: assembly object,
/// instance 100, connection point 1.
const CONNECTION_PATH: [u8; 7] = [0x02, 0x20, 0x04, 0x24, 0x64, 0x2C, 0x01];

/// CIP payload for a ForwardOpen request to the Connection Manager.
pub fn build_forward_open(params: &ConnectionParams) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(service::FORWARD_OPEN);
    buf.put_u8(0x02); // path size in words
    path::put_logical_class(&mut buf, class::CONNECTION_MANAGER);
    path::put_logical_instance(&mut buf, 1);
    buf.put_u32_le(0); // O->T connection id, target assigns
    buf.put_u16_le(params.connection_serial);
    buf.put_u16_le(params.vendor_id);
    buf.put_u16_le(params.originator_serial);
    buf.put_u8(params.timeout_multiplier);
    buf.put_slice(&[0x00, 0x00]); // reserved
    buf.put_u32_le(params.o_t_rpi);
    buf.put_u16_le(params.network_params);
    buf.put_u32_le(params.t_o_rpi);
    buf.put_u16_le(params.network_params);
    buf.put_u8(params.transport_trigger);
    buf.put_slice(&CONNECTION_PATH);
    buf.freeze()
}

/// CIP payload for a ForwardClose request matching a previous ForwardOpen.
pub fn build_forward_close(params: &ConnectionParams) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(service::FORWARD_CLOSE);
    buf.put_u8(0x02); // path size in words
    path::put_logical_class(&mut buf, class::CONNECTION_MANAGER);
    path::put_logical_instance(&mut buf, 1);
    buf.put_u16_le(params.connection_serial);
    buf.put_u16_le(params.vendor_id);
    buf.put_u16_le(params.originator_serial);
    buf.put_slice(&[0x00, 0x00]); // reserved
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{class, identity_attr, CipString};

    #[test]
    fn register_session_is_28_bytes() {
        let packet = build_register_session();
        assert_eq!(packet.total_len(), 28);
        assert_eq!(packet.header.command, 0x0065);
        assert_eq!(packet.header.length, 4);
        assert_eq!(packet.header.session_handle, 0);
        assert_eq!(&packet.payload[..], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn unregister_session_carries_handle_only() {
        let packet = build_unregister_session(0xCAFE);
        assert_eq!(packet.header.command, 0x0066);
        assert_eq!(packet.header.length, 0);
        assert_eq!(packet.header.session_handle, 0xCAFE);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn rr_data_envelope_layout() {
        let packet = wrap_rr_data(0x42, Bytes::from_static(&[0xDE, 0xAD])).unwrap();
        assert_eq!(packet.header.command, 0x006F);
        assert_eq!(packet.header.length as usize, RR_DATA_OVERHEAD + 2);
        let expected = [
            0x00, 0x00, 0x00, 0x00, // interface handle
            0x00, 0x00, // timeout
            0x02, 0x00, // item count
            0x00, 0x00, 0x00, 0x00, // null address item
            0xB2, 0x00, 0x02, 0x00, // unconnected data item, 2 bytes
            0xDE, 0xAD,
        ];
        assert_eq!(&packet.payload[..], &expected);
    }

    #[test]
    fn read_tag_request_layout() {
        let cip = build_read_tag("MyTag", 1).unwrap();
        let expected = [
            0x4C, 0x04, 0x91, 0x05, b'M', b'y', b'T', b'a', b'g', 0x00, 0x01, 0x00,
        ];
        assert_eq!(&cip[..], &expected);
        assert!(build_read_tag("MyTag", 0).is_err());
    }

    #[test]
    fn write_dint_request_layout() {
        let cip = build_write_tag("Tag1", &CipValue::Dint(-2)).unwrap();
        let expected = [
            0x4D, 0x03, 0x91, 0x04, b'T', b'a', b'g', b'1', // service + path
            0xC4, 0x00, // DINT
            0x01, 0x00, // element count
            0xFE, 0xFF, 0xFF, 0xFF,
        ];
        assert_eq!(&cip[..], &expected);
    }

    #[test]
    fn write_string_pads_data_area() {
        let value = CipValue::String(CipString::new("AB").unwrap());
        let cip = build_write_tag("Msg", &value).unwrap();
        // service(1) + words(1) + path(6) = 8 header bytes
        assert_eq!(&cip[8..10], &[0xA0, 0x02]); // STRING type
        assert_eq!(&cip[10..12], &[0xCE, 0x0F]); // structure handle
        assert_eq!(&cip[12..14], &[0x01, 0x00]); // element count
        assert_eq!(&cip[14..18], &[0x02, 0x00, 0x00, 0x00]); // length
        assert_eq!(&cip[18..20], b"AB");
        assert_eq!(cip.len(), 14 + 4 + STRING_DATA_AREA);
        assert!(cip[20..].iter().all(|&b| b == 0));
    }

    #[test]
    fn write_array_validates_data_length() {
        let data = [0u8; 8];
        let cip = build_write_tag_array("Arr", CipDataType::Dint, 2, &data).unwrap();
        assert_eq!(cip[0], 0x4D);
        assert_eq!(&cip[8..12], &[0xC4, 0x00, 0x02, 0x00]);
        assert_eq!(&cip[12..], &data);

        assert!(build_write_tag_array("Arr", CipDataType::Dint, 3, &data).is_err());
        assert!(build_write_tag_array("Arr", CipDataType::Dint, 0, &[]).is_err());
    }

    #[test]
    fn multiple_read_offset_table() {
        let cip = build_multiple_read(&["Tag1", "Tag2"]).unwrap();
        assert_eq!(&cip[..8], &[0x0A, 0x02, 0x20, 0x02, 0x24, 0x01, 0x02, 0x00]);
        // Offsets are relative to the service count field at byte 6.
        let first = u16::from_le_bytes([cip[8], cip[9]]) as usize;
        let second = u16::from_le_bytes([cip[10], cip[11]]) as usize;
        assert_eq!(first, 6);
        let sub1 = &cip[6 + first..6 + second];
        let sub2 = &cip[6 + second..];
        assert_eq!(
            sub1,
            &[0x4C, 0x03, 0x91, 0x04, b'T', b'a', b'g', b'1', 0x01, 0x00]
        );
        assert_eq!(
            sub2,
            &[0x4C, 0x03, 0x91, 0x04, b'T', b'a', b'g', b'2', 0x01, 0x00]
        );
    }

    #[test]
    fn multiple_service_rejects_empty_batch() {
        assert!(build_multiple_read::<&str>(&[]).is_err());
        assert!(build_multiple_write(&[]).is_err());
    }

    #[test]
    fn multiple_write_embeds_typed_values() {
        let writes = vec![
            TagWrite::new("A", CipValue::Int(7)),
            TagWrite::new("B", CipValue::Real(1.0)),
        ];
        let cip = build_multiple_write(&writes).unwrap();
        assert_eq!(cip[0], 0x0A);
        let first = u16::from_le_bytes([cip[8], cip[9]]) as usize;
        let sub1_start = 6 + first;
        assert_eq!(cip[sub1_start], 0x4D);
        // symbolic "A" pads to two bytes: 0x91 0x01 'A' 0x00
        assert_eq!(
            &cip[sub1_start + 2..sub1_start + 6],
            &[0x91, 0x01, b'A', 0x00]
        );
        assert_eq!(&cip[sub1_start + 6..sub1_start + 10], &[0xC3, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn attribute_requests_use_logical_paths() {
        let cip = build_read_attribute(class::IDENTITY, 1, identity_attr::SERIAL_NUMBER).unwrap();
        let expected = [
            0x4C, 0x03, 0x20, 0x01, 0x24, 0x01, 0x30, 0x06, 0x01, 0x00,
        ];
        assert_eq!(&cip[..], &expected);

        let cip = build_write_attribute(class::ASSEMBLY, 0x64, 0x03, &CipValue::Uint(9)).unwrap();
        assert_eq!(cip[0], 0x4D);
        assert_eq!(&cip[2..8], &[0x20, 0x04, 0x24, 0x64, 0x30, 0x03]);
        assert_eq!(&cip[8..14], &[0xC7, 0x00, 0x01, 0x00, 0x09, 0x00]);
    }

    #[test]
    fn forward_open_default_parameter_block() {
        let cip = build_forward_open(&ConnectionParams::default());
        let expected = [
            0x54, 0x02, 0x20, 0x06, 0x24, 0x01, // service + Connection Manager path
            0x00, 0x00, 0x00, 0x00, // O->T connection id
            0x01, 0x00, // connection serial
            0x34, 0x12, // vendor id
            0x78, 0x56, // originator serial
            0x03, // timeout multiplier
            0x00, 0x00, // reserved
            0xF4, 0x01, 0x00, 0x00, // O->T RPI
            0x43, 0x00, // O->T parameters
            0xF4, 0x01, 0x00, 0x00, // T->O RPI
            0x43, 0x00, // T->O parameters
            0xA3, // transport class/trigger
            0x02, 0x20, 0x04, 0x24, 0x64, 0x2C, 0x01, // connection path
        ];
        assert_eq!(&cip[..], &expected);
    }

    #[test]
    fn forward_close_echoes_connection_triad() {
        let cip = build_forward_close(&ConnectionParams::default());
        let expected = [
            0x4E, 0x02, 0x20, 0x06, 0x24, 0x01, 0x01, 0x00, 0x34, 0x12, 0x78, 0x56, 0x00, 0x00,
        ];
        assert_eq!(&cip[..], &expected);
    }
}
