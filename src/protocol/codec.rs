use super::{
    cursor::ByteReader,
    error::Error,
    frame::{header::EncapHeader, EncapPacket},
};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on the declared payload length accepted by the decoder.
///
/// The length field is a `u16`, so this is the largest value a conforming
/// peer can declare; it mainly guards against treating garbage bytes as a
/// frame header and stalling forever waiting for a payload that never comes.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Streaming codec for encapsulation packets.
///
/// Frames are delimited by the fixed 24-byte header plus the payload length
/// it declares. The decoder buffers until a whole frame is available, so a
/// reply split across TCP segments is reassembled instead of being lost the
/// way a single drain-and-parse read would lose it.
#[derive(Debug, Clone)]
pub struct EipCodec {
    /// Largest payload the decoder will accept.
    pub max_payload_len: usize,
}

impl Default for EipCodec {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

impl Decoder for EipCodec {
    type Item = EncapPacket;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < EncapHeader::byte_len() {
            return Ok(None);
        }

        // Peek the declared payload length before committing to the frame.
        let declared = u16::from_le_bytes([src[2], src[3]]) as usize;
        if declared > self.max_payload_len {
            return Err(Error::InvalidFrame);
        }

        let frame_len = EncapHeader::byte_len() + declared;
        if src.len() < frame_len {
            return Ok(None);
        }

        // Split the complete frame and decode the header on that slice.
        let frame = src.split_to(frame_len).freeze();
        let mut r = ByteReader::new(&frame);
        let header = EncapHeader::decode(&mut r)?;
        let payload = frame.slice(EncapHeader::byte_len()..);
        Ok(Some(EncapPacket { header, payload }))
    }
}

impl Encoder<EncapPacket> for EipCodec {
    type Error = Error;

    fn encode(&mut self, item: EncapPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.header.length as usize != item.payload.len() {
            return Err(Error::Encode {
                context: "header length does not match payload size",
            });
        }
        dst.reserve(item.total_len());
        item.header.encode_to(dst);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}
