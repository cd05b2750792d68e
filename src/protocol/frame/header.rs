use super::super::{
    cursor::ByteReader,
    error::{Error, Result},
};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Encapsulation commands used by this driver.
///
/// Only the session-management commands and the unconnected send carrier are
/// implemented; other encapsulation commands (ListServices, ListIdentity,
/// SendUnitData) are not used by the tag engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u16)]
pub enum EncapCommand {
    /// Open a session and obtain a session handle.
    RegisterSession = 0x0065,
    /// Release a session handle. The peer sends no reply.
    UnregisterSession = 0x0066,
    /// Carry an unconnected CIP request/reply via CPF items.
    SendRrData = 0x006F,
}

impl EncapCommand {
    /// Map a raw command code to a known command.
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x0065 => Some(Self::RegisterSession),
            0x0066 => Some(Self::UnregisterSession),
            0x006F => Some(Self::SendRrData),
            _ => None,
        }
    }

    /// Raw on-wire command code.
    pub const fn raw(self) -> u16 {
        self as u16
    }
}

/// Encapsulation header preceding every packet in both directions.
///
/// All fields are little-endian on the wire. The `command` field is kept as a
/// raw `u16` so that unknown command codes survive decoding and can be
/// reported verbatim by validation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncapHeader {
    /// Raw command code (see [`EncapCommand`]).
    pub command: u16,
    /// Byte length of the payload following this header.
    pub length: u16,
    /// Session handle issued by the target, zero before registration.
    pub session_handle: u32,
    /// Status code, zero on success.
    pub status: u32,
    /// Opaque context echoed back by the target.
    pub sender_context: u64,
    /// Options flags, always zero in this driver.
    pub options: u32,
}

impl EncapHeader {
    /// Build a header for an outgoing packet. Status, context and options
    /// are always sent as zero.
    pub fn new(command: EncapCommand, length: u16, session_handle: u32) -> Self {
        Self {
            command: command.raw(),
            length,
            session_handle,
            status: 0,
            sender_context: 0,
            options: 0,
        }
    }

    /// Compute the encoded byte length for this header.
    pub const fn byte_len() -> usize {
        // command(2) + length(2) + session_handle(4) + status(4) + sender_context(8) + options(4)
        2 + 2 + 4 + 4 + 8 + 4
    }

    /// Encode the header into `buf` in wire order.
    pub fn encode_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.command);
        buf.put_u16_le(self.length);
        buf.put_u32_le(self.session_handle);
        buf.put_u32_le(self.status);
        buf.put_u64_le(self.sender_context);
        buf.put_u32_le(self.options);
    }

    /// Decode a header from the reader, consuming exactly
    /// [`EncapHeader::byte_len`] bytes.
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            command: r.read_u16_le()?,
            length: r.read_u16_le()?,
            session_handle: r.read_u32_le()?,
            status: r.read_u32_le()?,
            sender_context: r.read_u64_le()?,
            options: r.read_u32_le()?,
        })
    }

    /// Reject headers whose command code is not one this driver understands.
    pub fn require_known_command(&self) -> Result<EncapCommand> {
        EncapCommand::from_raw(self.command).ok_or(Error::ProtocolViolation {
            context: "unknown encapsulation command",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn header_round_trip() {
        let header = EncapHeader::new(EncapCommand::SendRrData, 28, 0xDEAD_BEEF);
        let mut buf = BytesMut::new();
        header.encode_to(&mut buf);
        assert_eq!(buf.len(), EncapHeader::byte_len());

        let mut r = ByteReader::new(&buf);
        let decoded = EncapHeader::decode(&mut r).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn register_session_wire_layout() {
        let header = EncapHeader::new(EncapCommand::RegisterSession, 4, 0);
        let mut buf = BytesMut::new();
        header.encode_to(&mut buf);
        // Command 0x0065 and length 4, everything else zero.
        assert_eq!(&buf[..4], &[0x65, 0x00, 0x04, 0x00]);
        assert!(buf[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn unknown_command_is_preserved_and_rejected() {
        let wire = [
            0x63, 0x00, // ListIdentity, not supported
            0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let mut r = ByteReader::new(&wire);
        let header = EncapHeader::decode(&mut r).unwrap();
        assert_eq!(header.command, 0x0063);
        assert!(header.require_known_command().is_err());
    }
}
