//! This module defines the NodeConfig struct and related functions. It allows a node_cli process to
//! deserialize a configuration file into a NodeConfig object that eventually creates a Node object.

use crate::node::aodv::Aodv;
use crate::node::packet::FIELD_DELIMITER;
use crate::node::radio::{Radio, SimulatedMedium, UdpRadio, DEFAULT_PORT};
use crate::node::Node;
use crate::{MeshNodeError, MeshNodeErrorKind, ONE_SECOND_MS};
use slog::Logger;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Default period between two route maintenance passes, in milliseconds.
pub const MAINTENANCE_PERIOD: u64 = ONE_SECOND_MS;

/// Routing parameters. Any value left out falls back to the protocol default.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct AodvParams {
    /// Hop horizon of route request floods.
    pub rreq_ttl: Option<u32>,
    /// Lifetime of new routes, in ms.
    pub route_lifetime: Option<u64>,
    /// Bounds of the rebroadcast jitter, in ms.
    pub jitter_min: Option<u64>,
    pub jitter_max: Option<u64>,
    /// How long to wait for a route reply, in ms.
    pub discovery_timeout: Option<u64>,
    /// Payloads held per destination while its route is discovered.
    pub max_queued_packets: Option<usize>,
    /// Origins remembered by the flood dedup tracker.
    pub broadcast_cache_size: Option<usize>,
}

/// Radios a node can run on.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum RadioMode {
    /// In-process medium. The node has no neighbours unless it is linked in code.
    Simulated,
    /// IPv6 multicast datagrams on a local link.
    Udp,
}

/// Configuration of the radio of the node.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RadioConfig {
    /// Radio to use.
    pub mode: RadioMode,
    /// Udp mode only. Port shared by every node of the mesh.
    pub port: Option<u16>,
    /// Udp mode only. Index of the network interface used for multicast. 0 lets the OS choose.
    pub interface_index: Option<u32>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            mode: RadioMode::Udp,
            port: Some(DEFAULT_PORT),
            interface_index: Some(0),
        }
    }
}

/// Configuration for a node object. An external client such as node_cli creates NodeConfig objects
/// from configuration files and CLI parameters, leaving the construction of the node to this module.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct NodeConfig {
    /// Address of the node on the mesh.
    pub address: String,
    /// Directory for the node to operate. Log files will be written here.
    pub work_dir: String,
    /// Random seed used for all RNG operations.
    pub random_seed: u32,
    /// Period between route maintenance passes, in ms.
    pub maintenance_period: Option<u64>,
    /// Should the node log to the terminal as well.
    pub term_log: Option<bool>,
    /// Should the node read commands from its standard input.
    pub accept_commands: Option<bool>,
    /// NOTE: Tables must be kept last in the structure, as TOML places them at the end of the document.
    /// Radio of this node.
    pub radio: RadioConfig,
    /// Routing parameters.
    pub aodv: Option<AodvParams>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            address: String::from("01"),
            work_dir: String::from("."),
            random_seed: 0,
            maintenance_period: Some(MAINTENANCE_PERIOD),
            term_log: Some(false),
            accept_commands: Some(true),
            radio: RadioConfig::default(),
            aodv: None,
        }
    }
}

impl NodeConfig {
    /// Creates a new configuration with default settings.
    pub fn new() -> NodeConfig {
        NodeConfig::default()
    }

    /// Checks the values that deserialization alone can't.
    pub fn validate(&self) -> Result<(), MeshNodeError> {
        if self.address.trim().is_empty() {
            let err_msg = String::from("Node address can't be empty");
            return Err(MeshNodeErrorKind::Configuration(err_msg).into());
        }
        if self.address.contains(FIELD_DELIMITER) || self.address.chars().any(char::is_whitespace) {
            let err_msg = format!("Invalid node address {:?}", &self.address);
            return Err(MeshNodeErrorKind::Configuration(err_msg).into());
        }
        if let Some(ref params) = self.aodv {
            if let (Some(min), Some(max)) = (params.jitter_min, params.jitter_max) {
                if min > max {
                    let err_msg = format!("jitter_min ({}) is above jitter_max ({})", min, max);
                    return Err(MeshNodeErrorKind::Configuration(err_msg).into());
                }
            }
        }
        Ok(())
    }

    /// Creates a new Node object configured with the values of this configuration object.
    /// The radio is not started.
    pub fn create_node(self, logger: Logger) -> Result<Node, MeshNodeError> {
        self.validate()?;

        let radio: Box<dyn Radio> = match self.radio.mode {
            RadioMode::Simulated => {
                let medium = SimulatedMedium::new();
                Box::new(medium.create_radio(&self.address)?)
            }
            RadioMode::Udp => Box::new(UdpRadio::new(
                self.radio.port.unwrap_or(DEFAULT_PORT),
                self.radio.interface_index.unwrap_or(0),
                logger.clone(),
            )),
        };

        let params = self.aodv.unwrap_or_default();
        let rng = Node::rng_from_seed(self.random_seed);
        let aodv = Aodv::new(&params, rng, logger.clone());

        Ok(Node::new(
            self.address,
            radio,
            aodv,
            self.maintenance_period.unwrap_or(MAINTENANCE_PERIOD),
            logger,
        ))
    }

    /// Loads a configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(file_path: P) -> Result<NodeConfig, MeshNodeError> {
        let mut file_content = String::new();
        let mut file = File::open(file_path.as_ref()).map_err(|e| {
            let err_msg = format!(
                "Failed to open configuration file {}",
                file_path.as_ref().display()
            );
            MeshNodeError::with_cause(MeshNodeErrorKind::Configuration(err_msg), e)
        })?;
        file.read_to_string(&mut file_content).map_err(|e| {
            let err_msg = String::from("Failed to read configuration file");
            MeshNodeError::with_cause(MeshNodeErrorKind::Configuration(err_msg), e)
        })?;

        toml::from_str(&file_content).map_err(|e| {
            let err_msg = String::from("Failed to deserialize configuration file");
            MeshNodeError::with_cause(MeshNodeErrorKind::Serialization(err_msg), e)
        })
    }

    /// Writes the current configuration object to a formatted configuration file, that can be passed to
    /// the node_cli binary.
    pub fn write_to_file<P: AsRef<Path>>(&self, file_path: P) -> Result<String, MeshNodeError> {
        let data = toml::to_string(self).map_err(|e| {
            let err_msg = String::from("Failed to serialize configuration");
            MeshNodeError::with_cause(MeshNodeErrorKind::Serialization(err_msg), e)
        })?;
        let mut file = File::create(file_path.as_ref()).map_err(|e| {
            let err_msg = format!(
                "Failed to create configuration file {}",
                file_path.as_ref().display()
            );
            MeshNodeError::with_cause(MeshNodeErrorKind::Configuration(err_msg), e)
        })?;
        write!(file, "{}", &data).map_err(|e| {
            let err_msg = String::from("Failed to write configuration file");
            MeshNodeError::with_cause(MeshNodeErrorKind::Configuration(err_msg), e)
        })?;

        Ok(file_path.as_ref().to_string_lossy().into_owned())
    }
}
