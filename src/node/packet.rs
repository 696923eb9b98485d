//! Wire format of the packets carried over the radio and exchanged with the host.
//!
//! A packet travels as eight text fields joined by `||`:
//! `timestamp_hex||channel_name||channel_id||sender||message_id||length||is_channel||message`.
//! The last field absorbs the remainder of the frame, so it may itself contain the delimiter.

use crate::{MeshNodeError, MeshNodeErrorKind};
use chrono::Utc;
use rand::{rngs::StdRng, Rng};
use slog::{Record, Serializer, KV};
use std::fmt;

/// Separator between the fields of a frame.
pub const FIELD_DELIMITER: &str = "||";
/// Number of fields in a frame.
pub const FIELD_COUNT: usize = 8;
/// Channel name of unicast application data.
pub const DATA_CHANNEL: &str = "DATA";
/// Channel name of route requests.
pub const RREQ_CHANNEL: &str = "RREQ";
/// Channel name of route replies.
pub const RREP_CHANNEL: &str = "RREP";

/// Class of a packet, derived from its channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Routed application data.
    Data,
    /// Route request flood.
    RouteRequest,
    /// Route reply.
    RouteReply,
    /// Any other application channel. Transmitted as-is, never routed.
    Channel,
}

/// A frame as carried on the radio channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    /// Sender-local clock (ms since boot) in hex.
    pub timestamp_hex: String,
    /// DATA, RREQ, RREP or an application channel label.
    pub channel_name: String,
    /// Destination address, or channel id for application traffic.
    pub channel_id: String,
    /// Node that transmitted the frame over the last hop.
    pub sender: String,
    /// Opaque identifier of the frame.
    pub message_id: String,
    /// Declared payload length. Not checked against `message`.
    pub length: usize,
    /// True for control and flood traffic.
    pub is_channel: bool,
    /// Payload. Control and DATA packets carry a sub-record here.
    pub message: String,
    /// Set only when the frame was fully decoded or built locally.
    pub valid: bool,
}

impl Packet {
    /// Builds a valid, unstamped packet. `length` is taken from the message.
    pub fn new(
        channel_name: &str,
        channel_id: &str,
        sender: &str,
        message: String,
        is_channel: bool,
    ) -> Packet {
        Packet {
            timestamp_hex: String::new(),
            channel_name: channel_name.to_string(),
            channel_id: channel_id.to_string(),
            sender: sender.to_string(),
            message_id: String::new(),
            length: message.len(),
            is_channel,
            message,
            valid: true,
        }
    }

    /// Sets the timestamp and a fresh message id for a packet about to leave this node.
    pub fn stamp(mut self, now: u64, rng: &mut StdRng) -> Packet {
        self.timestamp_hex = format!("{:x}", now);
        self.message_id = generate_message_id(now, rng);
        self
    }

    /// Class of this packet.
    pub fn kind(&self) -> PacketKind {
        match self.channel_name.as_str() {
            DATA_CHANNEL => PacketKind::Data,
            RREQ_CHANNEL => PacketKind::RouteRequest,
            RREP_CHANNEL => PacketKind::RouteReply,
            _ => PacketKind::Channel,
        }
    }

    /// Parses a frame, reporting why it was rejected.
    /// Length and is_channel are parsed strictly: a malformed value rejects the whole frame.
    pub fn parse(raw: &str) -> Result<Packet, MeshNodeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(malformed("Empty frame"));
        }

        let parts: Vec<&str> = raw.splitn(FIELD_COUNT, FIELD_DELIMITER).collect();
        if parts.len() < FIELD_COUNT {
            let err_msg = format!(
                "Frame has {} fields, expected {}",
                parts.len(),
                FIELD_COUNT
            );
            return Err(malformed(&err_msg));
        }

        let length = parts[5].trim().parse::<usize>().map_err(|e| {
            let err_msg = format!("Invalid length field: {:?}", parts[5].trim());
            MeshNodeError::with_cause(MeshNodeErrorKind::Serialization(err_msg), e)
        })?;
        let is_channel = match parts[6].trim() {
            "0" => false,
            "1" => true,
            other => {
                let err_msg = format!("Invalid is_channel field: {:?}", other);
                return Err(malformed(&err_msg));
            }
        };

        Ok(Packet {
            timestamp_hex: parts[0].trim().to_string(),
            channel_name: parts[1].trim().to_string(),
            channel_id: parts[2].trim().to_string(),
            sender: parts[3].trim().to_string(),
            message_id: parts[4].trim().to_string(),
            length,
            is_channel,
            message: parts[7].trim().to_string(),
            valid: true,
        })
    }

    /// Decodes a frame. Never fails: a malformed frame yields a packet with `valid == false`.
    pub fn decode(raw: &str) -> Packet {
        Packet::parse(raw).unwrap_or_default()
    }

    /// Decodes a frame read from the radio.
    pub fn from_bytes(data: &[u8]) -> Packet {
        Packet::decode(&String::from_utf8_lossy(data))
    }

    /// Serializes the packet into its wire form.
    /// Fails if one of the first seven fields contains the delimiter, as the frame would be ambiguous.
    pub fn to_wire(&self) -> Result<String, MeshNodeError> {
        let header = [
            ("timestamp_hex", &self.timestamp_hex),
            ("channel_name", &self.channel_name),
            ("channel_id", &self.channel_id),
            ("sender", &self.sender),
            ("message_id", &self.message_id),
        ];
        if let Some((name, _)) = header
            .iter()
            .find(|(_, value)| value.contains(FIELD_DELIMITER))
        {
            let err_msg = format!("Field {} contains the frame delimiter", name);
            return Err(MeshNodeErrorKind::Serialization(err_msg).into());
        }

        Ok(self.to_string())
    }

    /// Serializes the packet into the bytes handed to the radio.
    pub fn encode(&self) -> Result<Vec<u8>, MeshNodeError> {
        self.to_wire().map(String::into_bytes)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}||{}||{}||{}||{}||{}||{}||{}",
            self.timestamp_hex,
            self.channel_name,
            self.channel_id,
            self.sender,
            self.message_id,
            self.length,
            if self.is_channel { 1 } else { 0 },
            self.message
        )
    }
}

impl KV for Packet {
    fn serialize(&self, _rec: &Record, serializer: &mut dyn Serializer) -> slog::Result {
        serializer.emit_str("channel_name", &self.channel_name)?;
        serializer.emit_str("channel_id", &self.channel_id)?;
        serializer.emit_str("sender", &self.sender)?;
        serializer.emit_str("message_id", &self.message_id)
    }
}

/// Produces a 16 hex-char identifier: uptime millis, a random word and the wall-clock microseconds.
pub fn generate_message_id(now: u64, rng: &mut StdRng) -> String {
    let r: u16 = rng.gen();
    let u = Utc::now().timestamp_subsec_micros() & 0xFFFF;
    format!("{:08X}{:04X}{:04X}", now as u32, r, u)
}

fn malformed(msg: &str) -> MeshNodeError {
    MeshNodeErrorKind::Serialization(msg.to_string()).into()
}
