//! This module implements the features to give the node commands over its host line interface.

use crate::node::packet::{Packet, PacketKind, FIELD_DELIMITER};
use crate::{MeshNodeError, MeshNodeErrorKind};
use std::str::FromStr;

/// Enummeration of all the commands the node supports
#[derive(Debug, Clone, PartialEq)]
pub enum Commands {
    ///Route a payload to the destination, discovering the route if needed.
    Send(String, String),
    ///Transmit a packet as-is.
    Transmit(Packet),
    ///Dump the route table to the log.
    Routes,
    ///The link to the given neighbour is gone.
    LinkBreak(String),
    ///Stop the node.
    Finish,
}

impl Commands {
    /// Lines the node skips without complaint: empty lines and echoed log lines.
    pub fn is_ignored(line: &str) -> bool {
        let line = line.trim();
        line.is_empty() || line.starts_with('[')
    }
}

impl FromStr for Commands {
    type Err = MeshNodeError;

    fn from_str(s: &str) -> Result<Commands, MeshNodeError> {
        let s = s.trim();

        //Wire packets
        if s.contains(FIELD_DELIMITER) {
            let pkt = Packet::parse(s).map_err(|e| {
                let err_msg = String::from("Failed to parse packet line");
                MeshNodeError::with_cause(MeshNodeErrorKind::Command(err_msg), e)
            })?;
            if pkt.kind() == PacketKind::Data && !pkt.channel_id.is_empty() {
                return Ok(Commands::Send(pkt.channel_id, pkt.message));
            }
            return Ok(Commands::Transmit(pkt));
        }

        let parts: Vec<&str> = s.splitn(3, char::is_whitespace).collect();
        match parts[0].to_uppercase().as_str() {
            "SEND" => {
                if parts.len() < 3 || parts[1].is_empty() {
                    let err_msg = String::from("Send needs two parameters: destination and data.");
                    return Err(MeshNodeErrorKind::Command(err_msg).into());
                }
                Ok(Commands::Send(parts[1].into(), parts[2].trim().into()))
            }
            "ROUTES" => Ok(Commands::Routes),
            "BREAK" => {
                let hop = parts.get(1).map(|p| p.trim()).unwrap_or("");
                if hop.is_empty() {
                    let err_msg = String::from("Break needs one parameter: the neighbour address.");
                    return Err(MeshNodeErrorKind::Command(err_msg).into());
                }
                Ok(Commands::LinkBreak(hop.into()))
            }
            "FINISH" => Ok(Commands::Finish),
            _ => {
                let err_msg = format!("Unknown command: {}", s);
                Err(MeshNodeErrorKind::Command(err_msg).into())
            }
        }
    }
}
