//! CIP request path construction.
//!
//! Tag access uses ANSI extended symbolic segments (`0x91`) optionally
//! followed by element selectors for array indices; object access uses
//! 8/16-bit logical class/instance/attribute segments. Paths are always
//! length-prefixed in 16-bit words by the services that embed them.

use super::super::error::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Append a symbolic segment for `name`, padding to an even byte count.
pub fn put_symbolic(buf: &mut BytesMut, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Encode {
            context: "empty tag segment name",
        });
    }
    if name.len() > u8::MAX as usize {
        return Err(Error::Encode {
            context: "tag segment name exceeds 255 bytes",
        });
    }
    buf.put_u8(0x91);
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
    if name.len() % 2 != 0 {
        buf.put_u8(0x00);
    }
    Ok(())
}

/// Append an element selector for an array index, using the shortest of the
/// 8/16/32-bit forms that fits.
pub fn put_element(buf: &mut BytesMut, index: u32) {
    if index <= u8::MAX as u32 {
        buf.put_u8(0x28);
        buf.put_u8(index as u8);
    } else if index <= u16::MAX as u32 {
        buf.put_u8(0x29);
        buf.put_u8(0x00); // reserved
        buf.put_u16_le(index as u16);
    } else {
        buf.put_u8(0x2A);
        buf.put_u8(0x00); // reserved
        buf.put_u32_le(index);
    }
}

/// Append a logical class segment (8-bit or 16-bit form).
pub fn put_logical_class(buf: &mut BytesMut, class: u16) {
    if class <= u8::MAX as u16 {
        buf.put_u8(0x20);
        buf.put_u8(class as u8);
    } else {
        buf.put_u8(0x21);
        buf.put_u16_le(class);
    }
}

/// Append a logical instance segment (8-bit or 16-bit form).
pub fn put_logical_instance(buf: &mut BytesMut, instance: u16) {
    if instance <= u8::MAX as u16 {
        buf.put_u8(0x24);
        buf.put_u8(instance as u8);
    } else {
        buf.put_u8(0x25);
        buf.put_u16_le(instance);
    }
}

/// Append a logical attribute segment (8-bit or 16-bit form).
pub fn put_logical_attribute(buf: &mut BytesMut, attribute: u16) {
    if attribute <= u8::MAX as u16 {
        buf.put_u8(0x30);
        buf.put_u8(attribute as u8);
    } else {
        buf.put_u8(0x31);
        buf.put_u16_le(attribute);
    }
}

/// Encode a class/instance/attribute path for object access.
pub fn encode_logical_path(class: u16, instance: u16, attribute: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(9);
    put_logical_class(&mut buf, class);
    put_logical_instance(&mut buf, instance);
    put_logical_attribute(&mut buf, attribute);
    buf
}

/// Encode a tag reference into a request path.
///
/// The accepted syntax is `Name[i][j].Member[k]...`: dot-separated member
/// segments, each with any number of bracketed array indices. Every name
/// part becomes a symbolic segment and every index an element selector, so
/// `Matrix[1][2]` encodes as one symbolic segment followed by two selectors.
///
/// Malformed references (empty name, unterminated bracket, non-numeric
/// index) are rejected rather than silently encoded as index zero.
pub fn encode_tag_path(tag: &str) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    if tag.is_empty() {
        return Err(Error::Encode {
            context: "empty tag name",
        });
    }
    for token in tag.split('.') {
        let mut rest = token;
        let name = match rest.find('[') {
            Some(at) => {
                let (name, brackets) = rest.split_at(at);
                rest = brackets;
                name
            }
            None => {
                let name = rest;
                rest = "";
                name
            }
        };
        put_symbolic(&mut buf, name)?;

        while !rest.is_empty() {
            let inner = rest
                .strip_prefix('[')
                .ok_or(Error::Encode {
                    context: "unexpected characters after array index",
                })?;
            let close = inner.find(']').ok_or(Error::Encode {
                context: "unterminated array index",
            })?;
            let index: u32 = inner[..close].parse().map_err(|_| Error::Encode {
                context: "array index is not a decimal number",
            })?;
            put_element(&mut buf, index);
            rest = &inner[close + 1..];
        }
    }
    Ok(buf)
}

/// Recover the first symbolic segment name from an encoded path.
///
/// Element selectors and any further segments are ignored. Intended for
/// logging and diagnostics, not round-tripping.
pub fn decode_symbolic(path: &[u8]) -> Option<String> {
    if path.len() < 2 || path[0] != 0x91 {
        return None;
    }
    let len = path[1] as usize;
    let bytes = path.get(2..2 + len)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

/// Convert an encoded path length in bytes to the word count carried in
/// request path-size fields.
pub fn path_size_words(byte_len: usize) -> Result<u8> {
    if byte_len % 2 != 0 {
        return Err(Error::Encode {
            context: "request path has an odd byte length",
        });
    }
    let words = byte_len / 2;
    if words > u8::MAX as usize {
        return Err(Error::Encode {
            context: "request path exceeds 255 words",
        });
    }
    Ok(words as u8)
}
