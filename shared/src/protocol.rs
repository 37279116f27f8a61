//! Wire protocol: typed messages, reliable/unreliable delivery bookkeeping, and the
//! `[type][len][payload]` datagram framing.

use serde::{Deserialize, Serialize};

use crate::cmd::Command;
use crate::fixed::QwPos;
use crate::snake::BezierHandle;

/// `576 (typical MTU) - 60 (max IPv4 header) - 8 (UDP header)`.
pub const MAX_UDP_PACKET_SIZE: usize = 508;
/// Per-record framing overhead: one type byte, one length byte.
const RECORD_HEADER_SIZE: usize = 2;
/// `bincode`-encoded payloads must fit in a `u8` length prefix.
pub const MAX_PAYLOAD_SIZE: usize = 253;

pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    JoinRequest = 0,
    JoinAccept = 1,
    JoinDenyBadProtocol = 2,
    JoinDenyBadUsername = 3,
    JoinDenyServerFull = 4,
    Leave = 5,
    Commands = 6,
    Feedback = 7,
    SnakeHead = 8,
    SnakeBezier = 9,
    SnakeBezierAck = 10,
    SnakeMetadata = 11,
    SnakeMetadataAck = 12,
    FoodCreate = 13,
    FoodCreateAck = 14,
    FoodDestroy = 15,
    FoodDestroyAck = 16,
}

impl MessageType {
    fn from_u8(v: u8) -> Option<MessageType> {
        use MessageType::*;
        Some(match v {
            0 => JoinRequest,
            1 => JoinAccept,
            2 => JoinDenyBadProtocol,
            3 => JoinDenyBadUsername,
            4 => JoinDenyServerFull,
            5 => Leave,
            6 => Commands,
            7 => Feedback,
            8 => SnakeHead,
            9 => SnakeBezier,
            10 => SnakeBezierAck,
            11 => SnakeMetadata,
            12 => SnakeMetadataAck,
            13 => FoodCreate,
            14 => FoodCreateAck,
            15 => FoodDestroy,
            16 => FoodDestroyAck,
            _ => return None,
        })
    }

    /// Resend rate in net-ticks for messages of this type when queued reliably (nonzero),
    /// `0` for messages that are always unreliable. Mirrors the reliable/unreliable mapping
    /// fixed as authoritative for this protocol.
    pub fn default_resend_rate(self) -> u8 {
        use MessageType::*;
        match self {
            JoinRequest | JoinAccept | JoinDenyBadProtocol | JoinDenyBadUsername
            | JoinDenyServerFull | Leave | SnakeBezier | SnakeMetadata | FoodCreate | FoodDestroy => 5,
            SnakeBezierAck | SnakeMetadataAck | FoodCreateAck | FoodDestroyAck | Commands | SnakeHead
            | Feedback => 0,
        }
    }

    pub fn is_reliable(self) -> bool {
        self.default_resend_rate() > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequestPayload {
    pub protocol_version: u8,
    pub username: String,
    pub frame: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JoinAcceptPayload {
    pub sim_tick_rate: u8,
    pub net_tick_rate: u8,
    pub client_frame: u16,
    pub server_frame: u16,
    pub snake_id: u16,
    pub spawn: QwPos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinDenyPayload {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsPayload {
    pub last_frame: u16,
    pub cmds: Vec<Command>,
}

impl CommandsPayload {
    /// Expand into `(frame, command)` pairs, where the nth command in `cmds` applies to frame
    /// `last_frame - n` (the wire order is newest-first).
    pub fn frames(&self) -> Vec<(u16, Command)> {
        self.cmds
            .iter()
            .enumerate()
            .map(|(n, cmd)| (self.last_frame.wrapping_sub(n as u16), *cmd))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub diff: i8,
    pub frame: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnakeHeadPayload {
    pub frame: u16,
    pub snake_id: u16,
    pub head: BezierHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnakeBezierPayload {
    pub snake_id: u16,
    pub handle_index: u32,
    pub handle: BezierHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnakeBezierAckPayload {
    pub snake_id: u16,
    pub handle_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnakeMetadataPayload {
    pub snake_id: u16,
    pub username: String,
    pub upgrades: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnakeMetadataAckPayload {
    pub snake_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodCreatePayload {
    pub cluster_index: u32,
    pub point_index: u32,
    pub pos: QwPos,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodCreateAckPayload {
    pub cluster_index: u32,
    pub point_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodDestroyPayload {
    pub cluster_index: u32,
    pub point_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodDestroyAckPayload {
    pub cluster_index: u32,
    pub point_index: u32,
}

/// The full set of typed messages this protocol can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    JoinRequest(JoinRequestPayload),
    JoinAccept(JoinAcceptPayload),
    JoinDenyBadProtocol(JoinDenyPayload),
    JoinDenyBadUsername(JoinDenyPayload),
    JoinDenyServerFull(JoinDenyPayload),
    Leave,
    Commands(CommandsPayload),
    Feedback(FeedbackPayload),
    SnakeHead(SnakeHeadPayload),
    SnakeBezier(SnakeBezierPayload),
    SnakeBezierAck(SnakeBezierAckPayload),
    SnakeMetadata(SnakeMetadataPayload),
    SnakeMetadataAck(SnakeMetadataAckPayload),
    FoodCreate(FoodCreatePayload),
    FoodCreateAck(FoodCreateAckPayload),
    FoodDestroy(FoodDestroyPayload),
    FoodDestroyAck(FoodDestroyAckPayload),
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        use MessageBody::*;
        match self {
            JoinRequest(_) => MessageType::JoinRequest,
            JoinAccept(_) => MessageType::JoinAccept,
            JoinDenyBadProtocol(_) => MessageType::JoinDenyBadProtocol,
            JoinDenyBadUsername(_) => MessageType::JoinDenyBadUsername,
            JoinDenyServerFull(_) => MessageType::JoinDenyServerFull,
            Leave => MessageType::Leave,
            Commands(_) => MessageType::Commands,
            Feedback(_) => MessageType::Feedback,
            SnakeHead(_) => MessageType::SnakeHead,
            SnakeBezier(_) => MessageType::SnakeBezier,
            SnakeBezierAck(_) => MessageType::SnakeBezierAck,
            SnakeMetadata(_) => MessageType::SnakeMetadata,
            SnakeMetadataAck(_) => MessageType::SnakeMetadataAck,
            FoodCreate(_) => MessageType::FoodCreate,
            FoodCreateAck(_) => MessageType::FoodCreateAck,
            FoodDestroy(_) => MessageType::FoodDestroy,
            FoodDestroyAck(_) => MessageType::FoodDestroyAck,
        }
    }
}

/// A queued outbound message with reliability bookkeeping. `priority`/`priority_counter` let a
/// session interleave message kinds fairly when a datagram can't fit everything; `resend_rate`
/// of `0` marks the message unreliable (removed after one send).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub body: MessageBody,
    pub priority: i8,
    pub priority_counter: i8,
    pub resend_rate: u8,
    pub resend_rate_counter: u8,
    pub ack: bool,
}

impl Message {
    pub fn new(body: MessageBody, priority: i8) -> Message {
        let resend_rate = body.message_type().default_resend_rate();
        Message {
            body,
            priority,
            priority_counter: 0,
            resend_rate,
            resend_rate_counter: 0,
            ack: false,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.resend_rate > 0
    }

    /// Called once per net-tick for reliable messages. Returns `true` if the message should be
    /// (re)packed into this tick's outgoing datagram. Fires immediately when queued (counter
    /// starts at `0`), then every `resend_rate` ticks thereafter: ticks `0, R, 2R, …`.
    pub fn tick_resend(&mut self) -> bool {
        if self.resend_rate == 0 {
            return true; // unreliable: always sent once then the caller removes it.
        }
        if self.resend_rate_counter == 0 {
            self.resend_rate_counter = self.resend_rate - 1;
            true
        } else {
            self.resend_rate_counter -= 1;
            false
        }
    }
}

/// Encode a message body's payload with `bincode`. Errors if the encoded form would not fit the
/// `u8` length prefix.
pub fn encode_payload(body: &MessageBody) -> Result<Vec<u8>, crate::error::NetcodeError> {
    let bytes = bincode::serialize(body)
        .map_err(|e| crate::error::NetcodeError::InvalidMessage(e.to_string()))?;
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(crate::error::NetcodeError::InvalidMessage(format!(
            "payload too large: {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

pub fn decode_payload(type_byte: u8, payload: &[u8]) -> Result<MessageBody, crate::error::NetcodeError> {
    if MessageType::from_u8(type_byte).is_none() {
        return Err(crate::error::NetcodeError::InvalidMessage(format!(
            "unknown message type {type_byte}"
        )));
    }
    bincode::deserialize(payload).map_err(|e| crate::error::NetcodeError::InvalidMessage(e.to_string()))
}

/// Pack as many messages as fit into one `MAX_UDP_PACKET_SIZE` datagram, unreliable messages
/// first, then reliable. Returns the packed bytes and the indices of the messages that were
/// actually packed (so the caller can drop unreliable ones and tick reliable ones).
pub fn pack_datagram<'a>(messages: impl Iterator<Item = (usize, &'a Message)>) -> (Vec<u8>, Vec<usize>) {
    let mut unreliable = Vec::new();
    let mut reliable = Vec::new();
    for (idx, msg) in messages {
        if msg.is_reliable() {
            reliable.push((idx, msg));
        } else {
            unreliable.push((idx, msg));
        }
    }

    let mut out = Vec::with_capacity(MAX_UDP_PACKET_SIZE);
    let mut packed = Vec::new();
    for (idx, msg) in unreliable.into_iter().chain(reliable) {
        let Ok(payload) = encode_payload(&msg.body) else { continue };
        if out.len() + RECORD_HEADER_SIZE + payload.len() > MAX_UDP_PACKET_SIZE {
            continue; // doesn't fit this tick; retried next tick since the caller keeps it queued.
        }
        out.push(msg.body.message_type() as u8);
        out.push(payload.len() as u8);
        out.extend_from_slice(&payload);
        packed.push(idx);
    }
    (out, packed)
}

/// Unframe a datagram into `(type_byte, payload)` records. Returns `Err` the moment a record's
/// declared length runs past the end of the buffer, since that is exactly the malformed-datagram
/// condition the server treats as a protocol violation.
pub fn unpack_datagram(mut bytes: &[u8]) -> Result<Vec<(u8, Vec<u8>)>, crate::error::NetcodeError> {
    let mut records = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(crate::error::NetcodeError::InvalidMessage(
                "truncated record header".into(),
            ));
        }
        let type_byte = bytes[0];
        let len = bytes[1] as usize;
        bytes = &bytes[RECORD_HEADER_SIZE..];
        if bytes.len() < len {
            return Err(crate::error::NetcodeError::InvalidMessage(
                "record payload runs past end of datagram".into(),
            ));
        }
        records.push((type_byte, bytes[..len].to_vec()));
        bytes = &bytes[len..];
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Action;

    fn join_request() -> MessageBody {
        MessageBody::JoinRequest(JoinRequestPayload {
            protocol_version: PROTOCOL_VERSION,
            username: "test".into(),
            frame: 0,
        })
    }

    #[test]
    fn encode_decode_round_trips_join_request() {
        let body = join_request();
        let bytes = encode_payload(&body).unwrap();
        let decoded = decode_payload(MessageType::JoinRequest as u8, &bytes).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn pack_then_unpack_round_trips_multiple_messages() {
        let messages = vec![
            Message::new(join_request(), 10),
            Message::new(
                MessageBody::Commands(CommandsPayload {
                    last_frame: 42,
                    cmds: vec![Command { angle: 5, speed: 200, action: Action::Boost }],
                }),
                1,
            ),
        ];
        let indexed: Vec<(usize, &Message)> = messages.iter().enumerate().collect();
        let (bytes, packed) = pack_datagram(indexed.into_iter());
        assert_eq!(packed.len(), 2);
        let records = unpack_datagram(&bytes).unwrap();
        assert_eq!(records.len(), 2);
        for (type_byte, payload) in records {
            let decoded = decode_payload(type_byte, &payload).unwrap();
            assert!(messages.iter().any(|m| m.body == decoded));
        }
    }

    #[test]
    fn unpack_rejects_truncated_record() {
        let bytes = vec![MessageType::Leave as u8, 10, 1, 2, 3]; // declares 10 bytes, has 3
        assert!(unpack_datagram(&bytes).is_err());
    }

    #[test]
    fn unreliable_messages_are_packed_before_reliable() {
        let reliable = Message::new(join_request(), 10);
        let unreliable = Message::new(
            MessageBody::Feedback(FeedbackPayload { diff: 1, frame: 5 }),
            1,
        );
        let messages = vec![reliable, unreliable];
        let indexed: Vec<(usize, &Message)> = messages.iter().enumerate().collect();
        let (bytes, packed) = pack_datagram(indexed.into_iter());
        // first packed record in the byte stream should be the unreliable Feedback message.
        assert_eq!(bytes[0], MessageType::Feedback as u8);
        assert_eq!(packed, vec![1, 0]);
    }

    #[test]
    fn reliable_message_resends_at_its_configured_rate() {
        let mut msg = Message::new(join_request(), 10);
        msg.resend_rate = 3;
        msg.resend_rate_counter = 0;
        let fired: Vec<bool> = (0..7).map(|_| msg.tick_resend()).collect();
        assert_eq!(fired, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn commands_payload_frames_counts_down_from_last_frame() {
        let payload = CommandsPayload {
            last_frame: 100,
            cmds: vec![
                Command { angle: 1, speed: 1, action: Action::None },
                Command { angle: 2, speed: 2, action: Action::None },
                Command { angle: 3, speed: 3, action: Action::None },
            ],
        };
        let frames = payload.frames();
        assert_eq!(frames[0].0, 100);
        assert_eq!(frames[1].0, 99);
        assert_eq!(frames[2].0, 98);
    }

    #[test]
    fn message_type_round_trips_through_byte() {
        for t in [
            MessageType::JoinRequest,
            MessageType::FoodDestroyAck,
            MessageType::SnakeMetadata,
        ] {
            assert_eq!(MessageType::from_u8(t as u8), Some(t));
        }
        assert_eq!(MessageType::from_u8(255), None);
    }
}
