pub mod builder;
pub mod header;
pub mod path;
pub mod response;

use self::header::EncapHeader;
use bytes::Bytes;

/// Common Packet Format item type: null address item.
pub const CPF_NULL_ADDRESS: u16 = 0x0000;
/// Common Packet Format item type: unconnected data item.
pub const CPF_UNCONNECTED_DATA: u16 = 0x00B2;
/// Fixed bytes between the encapsulation header and the CIP payload in a
/// SendRRData packet: interface handle(4) + timeout(2) + item count(2) +
/// null address item(4) + data item header(4).
pub const RR_DATA_OVERHEAD: usize = 16;

/// A fully framed encapsulation packet (header + payload).
///
/// This is the item produced and consumed by `EipCodec`. The payload is the
/// raw bytes after the 24-byte header; for `SendRRData` traffic it still
/// contains the interface handle and CPF items, which are peeled off by
/// [`response::unwrap_rr_data`].
#[derive(Debug, Clone)]
pub struct EncapPacket {
    /// Encapsulation header.
    pub header: EncapHeader,
    /// Payload bytes following the header (zero-copy slice of the frame).
    pub payload: Bytes,
}

impl EncapPacket {
    /// Wrap a payload with a header whose length field matches the payload.
    pub fn new(header: EncapHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Total encoded size of this packet on the wire.
    pub fn total_len(&self) -> usize {
        EncapHeader::byte_len() + self.payload.len()
    }
}
