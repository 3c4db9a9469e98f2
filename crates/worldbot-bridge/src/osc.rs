//! OSC 1.0 packet codec.
//!
//! Only the argument types the bridge exchanges are supported:
//!
//! | tag | payload |
//! |-----|---------|
//! | `s` | NUL-terminated UTF-8, padded to 4 bytes |
//! | `i` | big-endian `i32` |
//! | `f` | big-endian `f32` |
//! | `T` / `F` | none |
//!
//! Inbound bundles (`#bundle`) are flattened recursively; their time tags are
//! ignored and contained messages are delivered in packet order.  An element
//! that fails to decode (for example an OSC 1.1 `d` or `b` argument from
//! avatar parameter traffic) is logged and skipped without losing its
//! siblings.

use tracing::warn;
use worldbot_types::{BotError, BridgeMessage, OscArg};

const BUNDLE_TAG: &[u8] = b"#bundle\0";

/// Nested bundles deeper than this are rejected.
const MAX_BUNDLE_DEPTH: usize = 8;

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

fn push_padded_str(buf: &mut Vec<u8>, s: &str) -> Result<(), BotError> {
    if s.as_bytes().contains(&0) {
        return Err(BotError::Codec("OSC strings must not contain NUL".to_string()));
    }
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
    Ok(())
}

/// Encode a single message into an OSC packet.
pub fn encode(message: &BridgeMessage) -> Result<Vec<u8>, BotError> {
    if !message.address.starts_with('/') {
        return Err(BotError::Codec(format!(
            "address {:?} must start with '/'",
            message.address
        )));
    }

    let mut buf = Vec::with_capacity(64);
    push_padded_str(&mut buf, &message.address)?;

    let tags: String = std::iter::once(',')
        .chain(message.args.iter().map(OscArg::type_tag))
        .collect();
    push_padded_str(&mut buf, &tags)?;

    for arg in &message.args {
        match arg {
            OscArg::Str(s) => push_padded_str(&mut buf, s)?,
            OscArg::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
            OscArg::Float(f) => buf.extend_from_slice(&f.to_be_bytes()),
            OscArg::Bool(_) => {}
        }
    }
    Ok(buf)
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BotError> {
        if self.remaining() < n {
            return Err(BotError::Codec(format!(
                "truncated packet: wanted {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_str(&mut self) -> Result<&'a str, BotError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| BotError::Codec("unterminated OSC string".to_string()))?;
        let padded = (len + 4) & !3;
        let raw = self.take(padded)?;
        std::str::from_utf8(&raw[..len])
            .map_err(|e| BotError::Codec(format!("OSC string is not UTF-8: {e}")))
    }

    fn read_4(&mut self) -> Result<[u8; 4], BotError> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }
}

/// Decode an OSC packet (message or bundle) into its messages.
pub fn decode(packet: &[u8]) -> Result<Vec<BridgeMessage>, BotError> {
    let mut out = Vec::new();
    decode_into(packet, 0, &mut out)?;
    Ok(out)
}

fn decode_into(packet: &[u8], depth: usize, out: &mut Vec<BridgeMessage>) -> Result<(), BotError> {
    if !packet.starts_with(BUNDLE_TAG) {
        out.push(decode_message(packet)?);
        return Ok(());
    }
    if depth >= MAX_BUNDLE_DEPTH {
        return Err(BotError::Codec("bundle nesting too deep".to_string()));
    }
    let mut reader = Reader::new(packet);
    reader.take(BUNDLE_TAG.len())?;
    reader.take(8)?; // time tag

    // Bad elements are skipped; the bundle only fails when nothing in it
    // decoded.
    let decoded_before = out.len();
    let mut first_error = None;
    while reader.remaining() > 0 {
        let element = match read_element(&mut reader) {
            Ok(element) => element,
            Err(e) => {
                warn!(error = %e, "bundle framing broken; dropping the rest of it");
                first_error.get_or_insert(e);
                break;
            }
        };
        if let Err(e) = decode_into(element, depth + 1, out) {
            warn!(error = %e, "skipping undecodable bundle element");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) if out.len() == decoded_before => Err(e),
        _ => Ok(()),
    }
}

fn read_element<'a>(reader: &mut Reader<'a>) -> Result<&'a [u8], BotError> {
    let size = i32::from_be_bytes(reader.read_4()?);
    let size = usize::try_from(size)
        .map_err(|_| BotError::Codec(format!("negative bundle element size {size}")))?;
    reader.take(size)
}

fn decode_message(packet: &[u8]) -> Result<BridgeMessage, BotError> {
    if packet.len() % 4 != 0 {
        return Err(BotError::Codec(format!(
            "packet length {} is not a multiple of 4",
            packet.len()
        )));
    }
    let mut reader = Reader::new(packet);
    let address = reader.read_str()?.to_string();
    if !address.starts_with('/') {
        return Err(BotError::Codec(format!("invalid address {address:?}")));
    }

    // A message without a type-tag string carries no arguments.
    if reader.remaining() == 0 {
        return Ok(BridgeMessage::new(address, Vec::new()));
    }
    let tags = reader.read_str()?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(BotError::Codec(format!("type tags {tags:?} must start with ','")));
    };

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            's' => OscArg::Str(reader.read_str()?.to_string()),
            'i' => OscArg::Int(i32::from_be_bytes(reader.read_4()?)),
            'f' => OscArg::Float(f32::from_be_bytes(reader.read_4()?)),
            'T' => OscArg::Bool(true),
            'F' => OscArg::Bool(false),
            other => {
                return Err(BotError::Codec(format!("unsupported OSC type tag {other:?}")));
            }
        };
        args.push(arg);
    }
    Ok(BridgeMessage::new(address, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_layout() {
        let msg = BridgeMessage::new("/a", vec![OscArg::Int(1), OscArg::Str("hi".into())]);
        let bytes = encode(&msg).unwrap();
        let expected: &[u8] = &[
            b'/', b'a', 0, 0, // address
            b',', b'i', b's', 0, // tags
            0, 0, 0, 1, // int
            b'h', b'i', 0, 0, // string
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn string_of_exact_multiple_gets_full_pad() {
        let msg = BridgeMessage::new("/abc", vec![]);
        let bytes = encode(&msg).unwrap();
        // "/abc" + NUL padding to 8, then "," + padding to 4.
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn decodes_what_it_encodes_for_chat_shape() {
        let msg = BridgeMessage::new(
            "/vrchat/chat",
            vec![
                OscArg::Str("Alice".into()),
                OscArg::Int(42),
                OscArg::Str("where is the café?".into()),
                OscArg::Bool(true),
                OscArg::Float(0.25),
            ],
        );
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, vec![msg]);
    }

    #[test]
    fn rejects_address_without_slash() {
        let msg = BridgeMessage::new("chat", vec![]);
        assert!(matches!(encode(&msg), Err(BotError::Codec(_))));
    }

    #[test]
    fn rejects_embedded_nul() {
        let msg = BridgeMessage::new("/a", vec![OscArg::Str("x\0y".into())]);
        assert!(encode(&msg).is_err());
    }

    #[test]
    fn truncated_packet_is_an_error_not_a_panic() {
        let msg = BridgeMessage::new("/a", vec![OscArg::Int(7)]);
        let bytes = encode(&msg).unwrap();
        for cut in 0..bytes.len() {
            let _ = decode(&bytes[..cut]);
        }
        assert!(decode(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(&[0xff, 0xfe, 0x00, 0x01]).is_err());
        assert!(decode(b"/a\0\0xyz\0").is_err());
        assert!(decode(b"/a\0\0,b\0\0").is_err());
    }

    #[test]
    fn message_without_tag_string_has_no_args() {
        let decoded = decode(b"/ping\0\0\0").unwrap();
        assert_eq!(decoded, vec![BridgeMessage::new("/ping", vec![])]);
    }

    #[test]
    fn bundles_are_flattened_in_order() {
        let first = encode(&BridgeMessage::new("/one", vec![OscArg::Int(1)])).unwrap();
        let second = encode(&BridgeMessage::new("/two", vec![OscArg::Bool(false)])).unwrap();

        let mut inner = BUNDLE_TAG.to_vec();
        inner.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        inner.extend_from_slice(&(second.len() as i32).to_be_bytes());
        inner.extend_from_slice(&second);

        let mut outer = BUNDLE_TAG.to_vec();
        outer.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        outer.extend_from_slice(&(first.len() as i32).to_be_bytes());
        outer.extend_from_slice(&first);
        outer.extend_from_slice(&(inner.len() as i32).to_be_bytes());
        outer.extend_from_slice(&inner);

        let decoded = decode(&outer).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].address, "/one");
        assert_eq!(decoded[1].address, "/two");
    }

    #[test]
    fn oversized_bundle_element_is_rejected() {
        let mut packet = BUNDLE_TAG.to_vec();
        packet.extend_from_slice(&[0; 8]);
        packet.extend_from_slice(&1000_i32.to_be_bytes());
        assert!(decode(&packet).is_err());
    }

    fn bundle(elements: &[&[u8]]) -> Vec<u8> {
        let mut packet = BUNDLE_TAG.to_vec();
        packet.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        for element in elements {
            packet.extend_from_slice(&(element.len() as i32).to_be_bytes());
            packet.extend_from_slice(element);
        }
        packet
    }

    #[test]
    fn bad_bundle_element_does_not_drop_chat_sibling() {
        let chat = encode(&BridgeMessage::new(
            "/vrchat/chat",
            vec![OscArg::Str("Alice".into()), OscArg::Int(3), OscArg::Str("hi".into())],
        ))
        .unwrap();
        // `/avatar/x ,d <f64>`: a double, which this codec does not carry.
        let mut avatar = b"/avatar/x\0\0\0,d\0\0".to_vec();
        avatar.extend_from_slice(&1.5_f64.to_be_bytes());

        let decoded = decode(&bundle(&[&avatar, &chat, b"garbage!"])).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].address, "/vrchat/chat");
        assert_eq!(decoded[0].args[2].as_str(), Some("hi"));
    }

    #[test]
    fn broken_framing_keeps_elements_already_read() {
        let ping = encode(&BridgeMessage::new("/ping", vec![])).unwrap();
        let mut packet = bundle(&[&ping]);
        packet.extend_from_slice(&64_i32.to_be_bytes());
        packet.extend_from_slice(b"/short\0\0");

        let decoded = decode(&packet).unwrap();
        assert_eq!(decoded, vec![BridgeMessage::new("/ping", vec![])]);
    }

    #[test]
    fn bundle_with_only_bad_elements_is_an_error() {
        assert!(matches!(
            decode(&bundle(&[b"/a\0\0,d\0\0\0\0\0\0\0\0\0\0"])),
            Err(BotError::Codec(_))
        ));
    }
}
