//! Bridge message schema.
//!
//! | Direction | Address | Arguments |
//! |---|---|---|
//! | world → bot | [`ADDR_CHAT`] | `senderName: s, senderId: i, message: s` |
//! | world → bot | [`ADDR_INTERACTION`] | `itemId: s, itemName: s, senderName: s, senderId: i` |
//! | bot → world | [`ADDR_BOT_CHAT`] | `text: s` |
//! | bot → VRChat chatbox | [`ADDR_CHATBOX_INPUT`] | `text: s, immediate: T` |
//!
//! Outbound chat text is clamped to [`MAX_CHAT_MESSAGE_CHARS`] characters.
//! Anything else arriving on the wire decodes to
//! [`BotError::MalformedMessage`] so the caller can log and drop it.

use worldbot_types::{BotError, BridgeMessage, OscArg};

pub const ADDR_CHAT: &str = "/vrchat/chat";
pub const ADDR_INTERACTION: &str = "/vrchat/interaction";
pub const ADDR_BOT_CHAT: &str = "/bot/chat";
pub const ADDR_CHATBOX_INPUT: &str = "/chatbox/input";

/// Longest chat message sent over the bridge, in characters.
pub const MAX_CHAT_MESSAGE_CHARS: usize = 280;

/// VRChat's chatbox display limit, in characters.
pub const MAX_CHATBOX_CHARS: usize = 144;

/// A chat line typed by someone in the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub sender_name: String,
    pub sender_id: i32,
    pub message: String,
}

/// Someone used an item in the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionNotice {
    pub item_id: String,
    pub item_name: String,
    pub sender_name: String,
    pub sender_id: i32,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Chat(ChatRequest),
    Interaction(InteractionNotice),
    /// The remote bot answered; shown verbatim.
    BotResponse(String),
}

/// Cut `text` to at most `max` characters.
pub fn clamp_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

pub fn encode_chat_request(request: &ChatRequest) -> BridgeMessage {
    BridgeMessage::new(
        ADDR_CHAT,
        vec![
            OscArg::from(request.sender_name.as_str()),
            OscArg::Int(request.sender_id),
            OscArg::from(clamp_chars(&request.message, MAX_CHAT_MESSAGE_CHARS)),
        ],
    )
}

pub fn encode_interaction(notice: &InteractionNotice) -> BridgeMessage {
    BridgeMessage::new(
        ADDR_INTERACTION,
        vec![
            OscArg::from(notice.item_id.as_str()),
            OscArg::from(notice.item_name.as_str()),
            OscArg::from(notice.sender_name.as_str()),
            OscArg::Int(notice.sender_id),
        ],
    )
}

/// Bot answers travel unclamped; the receiving display decides how to fit
/// them.
pub fn encode_bot_response(text: &str) -> BridgeMessage {
    BridgeMessage::new(ADDR_BOT_CHAT, vec![OscArg::from(text)])
}

/// Build a VRChat chatbox message, shortening overlong text with `...`.
pub fn encode_chatbox(text: &str) -> BridgeMessage {
    let fitted = if text.chars().count() > MAX_CHATBOX_CHARS {
        format!("{}...", clamp_chars(text, MAX_CHATBOX_CHARS - 3))
    } else {
        text.to_string()
    };
    BridgeMessage::new(ADDR_CHATBOX_INPUT, vec![OscArg::Str(fitted), OscArg::Bool(true)])
}

fn malformed(address: &str, reason: impl Into<String>) -> BotError {
    BotError::MalformedMessage {
        address: address.to_string(),
        reason: reason.into(),
    }
}

fn expect_arity(message: &BridgeMessage, n: usize) -> Result<(), BotError> {
    if message.args.len() != n {
        return Err(malformed(
            &message.address,
            format!("expected {n} arguments, got {}", message.args.len()),
        ));
    }
    Ok(())
}

fn str_arg(message: &BridgeMessage, idx: usize, name: &str) -> Result<String, BotError> {
    message.args[idx]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(&message.address, format!("{name} must be a string")))
}

fn int_arg(message: &BridgeMessage, idx: usize, name: &str) -> Result<i32, BotError> {
    message.args[idx]
        .as_int()
        .ok_or_else(|| malformed(&message.address, format!("{name} must be an int")))
}

/// Map a wire message onto the schema.
pub fn decode(message: &BridgeMessage) -> Result<Inbound, BotError> {
    match message.address.as_str() {
        ADDR_CHAT => {
            expect_arity(message, 3)?;
            Ok(Inbound::Chat(ChatRequest {
                sender_name: str_arg(message, 0, "senderName")?,
                sender_id: int_arg(message, 1, "senderId")?,
                message: str_arg(message, 2, "message")?,
            }))
        }
        ADDR_INTERACTION => {
            expect_arity(message, 4)?;
            Ok(Inbound::Interaction(InteractionNotice {
                item_id: str_arg(message, 0, "itemId")?,
                item_name: str_arg(message, 1, "itemName")?,
                sender_name: str_arg(message, 2, "senderName")?,
                sender_id: int_arg(message, 3, "senderId")?,
            }))
        }
        ADDR_BOT_CHAT => {
            expect_arity(message, 1)?;
            Ok(Inbound::BotResponse(str_arg(message, 0, "text")?))
        }
        other => Err(malformed(other, "unknown address")),
    }
}
