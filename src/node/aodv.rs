//! Implementation of the Ad-hoc On-demand Distance Vector routing protocol for the mesh.
//! Routes are discovered by flooding route requests (RREQ) and confirmed by unicast
//! route replies (RREP). DATA is then relayed hop by hop along the discovered route.

use crate::node::broadcasts::BroadcastTracker;
use crate::node::node_config::AodvParams;
use crate::node::packet::{
    Packet, PacketKind, DATA_CHANNEL, FIELD_DELIMITER, RREP_CHANNEL, RREQ_CHANNEL,
};
use crate::node::route_table::{RouteEntry, RouteTable};
use crate::node::{log_handle_packet, MessageStatus};
use crate::{MeshNodeError, MeshNodeErrorKind};

use rand::{rngs::StdRng, Rng};
use slog::{Logger, Record, Serializer, KV};
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::str::FromStr;
use std::time::Duration;

// **************************************************
// ************ Configuration parameters ************
// **************************************************
/// Hop horizon of a route request flood.
pub const RREQ_TTL: u32 = 10;
/// Lifetime of a freshly installed route, in milliseconds.
pub const ROUTE_LIFETIME: u64 = 60_000;
/// Lower bound of the rebroadcast jitter, in milliseconds.
pub const JITTER_MIN: u64 = 10;
/// Upper bound of the rebroadcast jitter, in milliseconds.
pub const JITTER_MAX: u64 = 50;
/// Time a node waits for a route reply before abandoning a discovery, in milliseconds.
pub const DISCOVERY_TIMEOUT: u64 = 10_000;
/// Payloads held per destination while its route is being discovered.
pub const MAX_QUEUED_PACKETS: usize = 16;

/// Resolved protocol parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub rreq_ttl: u32,
    pub route_lifetime: u64,
    pub jitter_min: u64,
    pub jitter_max: u64,
    pub discovery_timeout: u64,
    pub max_queued_packets: usize,
    pub broadcast_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rreq_ttl: RREQ_TTL,
            route_lifetime: ROUTE_LIFETIME,
            jitter_min: JITTER_MIN,
            jitter_max: JITTER_MAX,
            discovery_timeout: DISCOVERY_TIMEOUT,
            max_queued_packets: MAX_QUEUED_PACKETS,
            broadcast_cache_size: crate::node::broadcasts::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Applies the configured values over the defaults.
    pub fn from_params(params: &AodvParams) -> Config {
        let defaults = Config::default();
        let jitter_min = params.jitter_min.unwrap_or(defaults.jitter_min);
        Config {
            rreq_ttl: params.rreq_ttl.unwrap_or(defaults.rreq_ttl),
            route_lifetime: params.route_lifetime.unwrap_or(defaults.route_lifetime),
            jitter_min,
            jitter_max: params
                .jitter_max
                .unwrap_or(defaults.jitter_max)
                .max(jitter_min),
            discovery_timeout: params
                .discovery_timeout
                .unwrap_or(defaults.discovery_timeout),
            max_queued_packets: params
                .max_queued_packets
                .unwrap_or(defaults.max_queued_packets)
                .max(1),
            broadcast_cache_size: params
                .broadcast_cache_size
                .unwrap_or(defaults.broadcast_cache_size),
        }
    }
}

// **************************************************
// ******************  Messages *********************
// **************************************************

/// Route request, carried in the message field of an RREQ packet as
/// `origin||source_seq||dest_seq||broadcast_id||hop_count||ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequestMessage {
    /// Node that started the discovery.
    pub origin: String,
    /// Node being sought. Travels in the packet's channel_id.
    pub destination: String,
    pub source_seq: u64,
    pub dest_seq: u64,
    pub broadcast_id: u32,
    pub hop_count: u32,
    pub ttl: u32,
}

impl RouteRequestMessage {
    /// Reads the request out of an RREQ packet.
    pub fn from_packet(pkt: &Packet) -> Result<RouteRequestMessage, MeshNodeError> {
        let fields = split_record(&pkt.message, 6, RREQ_CHANNEL)?;
        Ok(RouteRequestMessage {
            origin: parse_address(fields[0], "origin")?,
            destination: parse_address(&pkt.channel_id, "destination")?,
            source_seq: parse_field(fields[1], "source_seq")?,
            dest_seq: parse_field(fields[2], "dest_seq")?,
            broadcast_id: parse_field(fields[3], "broadcast_id")?,
            hop_count: parse_field(fields[4], "hop_count")?,
            ttl: parse_field(fields[5], "ttl")?,
        })
    }

    /// Packs the request into a packet transmitted by `sender`.
    pub fn to_packet(&self, sender: &str) -> Packet {
        let record = format!(
            "{}||{}||{}||{}||{}||{}",
            self.origin,
            self.source_seq,
            self.dest_seq,
            self.broadcast_id,
            self.hop_count,
            self.ttl
        );
        Packet::new(RREQ_CHANNEL, &self.destination, sender, record, true)
    }
}

impl KV for RouteRequestMessage {
    fn serialize(&self, _rec: &Record, serializer: &mut dyn Serializer) -> slog::Result {
        serializer.emit_str("msg_type", "RREQ")?;
        serializer.emit_str("origin", &self.origin)?;
        serializer.emit_u32("broadcast_id", self.broadcast_id)?;
        serializer.emit_u32("hop_count", self.hop_count)?;
        serializer.emit_u32("ttl", self.ttl)
    }
}

/// Route reply, carried in the message field of an RREP packet as
/// `destination||origin||dest_seq||hop_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResponseMessage {
    /// Node that was discovered.
    pub destination: String,
    /// Node that started the discovery.
    pub origin: String,
    pub dest_seq: u64,
    pub hop_count: u32,
}

impl RouteResponseMessage {
    /// Reads the reply out of an RREP packet.
    pub fn from_packet(pkt: &Packet) -> Result<RouteResponseMessage, MeshNodeError> {
        let fields = split_record(&pkt.message, 4, RREP_CHANNEL)?;
        Ok(RouteResponseMessage {
            destination: parse_address(fields[0], "destination")?,
            origin: parse_address(fields[1], "origin")?,
            dest_seq: parse_field(fields[2], "dest_seq")?,
            hop_count: parse_field(fields[3], "hop_count")?,
        })
    }

    /// Packs the reply into a packet sent by `sender` to the neighbour `next_hop`.
    pub fn to_packet(&self, next_hop: &str, sender: &str) -> Packet {
        let record = format!(
            "{}||{}||{}||{}",
            self.destination, self.origin, self.dest_seq, self.hop_count
        );
        Packet::new(RREP_CHANNEL, next_hop, sender, record, true)
    }
}

impl KV for RouteResponseMessage {
    fn serialize(&self, _rec: &Record, serializer: &mut dyn Serializer) -> slog::Result {
        serializer.emit_str("msg_type", "RREP")?;
        serializer.emit_str("origin", &self.origin)?;
        serializer.emit_str("destination", &self.destination)?;
        serializer.emit_u32("hop_count", self.hop_count)
    }
}

/// Routed application data, carried in the message field of a DATA packet as
/// `origin||next_hop||hop_count||payload`. The payload may contain the delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub origin: String,
    pub next_hop: String,
    pub hop_count: u32,
    pub payload: String,
}

impl DataMessage {
    /// Reads the data record out of a DATA packet.
    pub fn from_packet(pkt: &Packet) -> Result<DataMessage, MeshNodeError> {
        let fields = split_record(&pkt.message, 4, DATA_CHANNEL)?;
        Ok(DataMessage {
            origin: parse_address(fields[0], "origin")?,
            next_hop: parse_address(fields[1], "next_hop")?,
            hop_count: parse_field(fields[2], "hop_count")?,
            payload: fields[3].to_string(),
        })
    }

    /// Packs the record into a packet for `destination`, transmitted by `sender`.
    pub fn to_packet(&self, destination: &str, sender: &str) -> Packet {
        let record = format!(
            "{}||{}||{}||{}",
            self.origin, self.next_hop, self.hop_count, self.payload
        );
        Packet::new(DATA_CHANNEL, destination, sender, record, false)
    }
}

impl KV for DataMessage {
    fn serialize(&self, _rec: &Record, serializer: &mut dyn Serializer) -> slog::Result {
        serializer.emit_str("msg_type", "DATA")?;
        serializer.emit_str("origin", &self.origin)?;
        serializer.emit_str("next_hop", &self.next_hop)?;
        serializer.emit_u32("hop_count", self.hop_count)
    }
}

fn split_record<'a>(
    record: &'a str,
    fields: usize,
    msg_type: &str,
) -> Result<Vec<&'a str>, MeshNodeError> {
    let parts: Vec<&str> = record.splitn(fields, FIELD_DELIMITER).map(str::trim).collect();
    if parts.len() != fields {
        let err_msg = format!(
            "Malformed {} record: {} fields, expected {}",
            msg_type,
            parts.len(),
            fields
        );
        return Err(MeshNodeErrorKind::Protocol(err_msg).into());
    }
    Ok(parts)
}

fn parse_field<T>(value: &str, name: &str) -> Result<T, MeshNodeError>
where
    T: FromStr,
    T::Err: Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| {
        let err_msg = format!("Invalid {} field: {:?}", name, value);
        MeshNodeError::with_cause(MeshNodeErrorKind::Protocol(err_msg), e)
    })
}

fn parse_address(value: &str, name: &str) -> Result<String, MeshNodeError> {
    let value = value.trim();
    if value.is_empty() {
        let err_msg = format!("Empty {} field", name);
        return Err(MeshNodeErrorKind::Protocol(err_msg).into());
    }
    Ok(value.to_string())
}

// **************************************************
// ****************  Routing state ******************
// **************************************************

#[derive(Debug, Clone, Copy)]
struct PendingRoute {
    broadcast_id: u32,
    started: u64,
}

/// All the routing state of a node. Owned by the node and lent to the engine for each event.
#[derive(Debug)]
pub struct RoutingState {
    address: String,
    /// Routes known to this node.
    pub route_table: RouteTable,
    /// Route request floods already handled.
    pub broadcasts: BroadcastTracker,
    broadcast_id: u32,
    pending_routes: HashMap<String, PendingRoute>,
    queued_payloads: HashMap<String, VecDeque<String>>,
}

impl RoutingState {
    /// Creates the empty state of the node with the given address.
    pub fn new(address: &str, broadcast_cache_size: usize) -> RoutingState {
        RoutingState {
            address: address.to_string(),
            route_table: RouteTable::new(),
            broadcasts: BroadcastTracker::new(broadcast_cache_size),
            broadcast_id: 0,
            pending_routes: HashMap::new(),
            queued_payloads: HashMap::new(),
        }
    }

    /// Address of the node owning this state.
    pub fn get_address(&self) -> &str {
        &self.address
    }

    /// Id of the last route request flood started by this node.
    pub fn broadcast_id(&self) -> u32 {
        self.broadcast_id
    }

    /// True while a route discovery for `destination` awaits its reply.
    pub fn is_discovering(&self, destination: &str) -> bool {
        self.pending_routes.contains_key(destination)
    }

    /// Payloads waiting for a route to `destination`.
    pub fn queued_count(&self, destination: &str) -> usize {
        self.queued_payloads
            .get(destination)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

// **************************************************
// ******************  Outcomes *********************
// **************************************************

/// A packet the node must put on the air, after waiting `delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub packet: Packet,
    pub delay: Duration,
}

impl Transmission {
    fn immediate(packet: Packet) -> Transmission {
        Transmission {
            packet,
            delay: Duration::from_millis(0),
        }
    }

    fn delayed(packet: Packet, delay: Duration) -> Transmission {
        Transmission { packet, delay }
    }
}

/// Result of handling an inbound packet.
#[derive(Debug, Default)]
pub struct HandleMessageOutcome {
    /// Packets to transmit in response.
    pub transmissions: Vec<Transmission>,
    /// DATA that reached this node, rewritten with the payload and the originator as sender.
    pub delivered: Option<Packet>,
}

impl HandleMessageOutcome {
    fn transmit(t: Transmission) -> HandleMessageOutcome {
        HandleMessageOutcome {
            transmissions: vec![t],
            delivered: None,
        }
    }
}

/// Result of a maintenance pass.
#[derive(Debug, Default)]
pub struct MaintenanceReport {
    /// Destinations whose routes expired.
    pub expired_routes: Vec<String>,
    /// Destinations whose discovery was abandoned.
    pub abandoned_discoveries: Vec<String>,
    /// Queued payloads released because a route became available.
    pub transmissions: Vec<Transmission>,
}

// **************************************************
// ******************  Engine ***********************
// **************************************************

/// The routing engine. Stateless between calls apart from its RNG; the routing state is passed in.
#[derive(Debug)]
pub struct Aodv {
    config: Config,
    rng: StdRng,
    logger: Logger,
}

impl Aodv {
    /// Creates a new engine, using the defaults for the parameters not configured.
    pub fn new(params: &AodvParams, rng: StdRng, logger: Logger) -> Aodv {
        let config = Config::from_params(params);
        debug!(logger, "AODV config: {:?}", &config);
        Aodv {
            config,
            rng,
            logger,
        }
    }

    /// Parameters in use.
    pub fn get_config(&self) -> &Config {
        &self.config
    }

    /// Creates an empty routing state sized for this engine.
    pub fn new_state(&self, address: &str) -> RoutingState {
        RoutingState::new(address, self.config.broadcast_cache_size)
    }

    /// Sends `payload` to `destination` if a route is known. Otherwise the payload is queued
    /// and a route discovery is started, unless one is already pending.
    pub fn send_data_or_discover(
        &mut self,
        state: &mut RoutingState,
        destination: &str,
        payload: String,
        now: u64,
    ) -> Result<Vec<Transmission>, MeshNodeError> {
        let me = state.address.clone();
        let destination = destination.trim();
        if destination.is_empty() || destination.contains(FIELD_DELIMITER) {
            let err_msg = format!("Invalid destination {:?}", destination);
            return Err(MeshNodeErrorKind::Command(err_msg).into());
        }
        if destination == me {
            let err_msg = String::from("Cannot route data to the node's own address");
            return Err(MeshNodeErrorKind::Command(err_msg).into());
        }

        if let Some(route) = state.route_table.lookup(destination) {
            let msg = DataMessage {
                origin: me.clone(),
                next_hop: route.next_hop.clone(),
                hop_count: 0,
                payload,
            };
            info!(
                self.logger,
                "Sending data";
                "destination" => destination,
                "next_hop" => &msg.next_hop,
            );
            let pkt = msg.to_packet(destination, &me).stamp(now, &mut self.rng);
            return Ok(vec![Transmission::immediate(pkt)]);
        }

        self.queue_payload(state, destination, payload);
        if state.is_discovering(destination) {
            info!(
                self.logger,
                "Route discovery already in progress";
                "destination" => destination,
                "queued" => state.queued_count(destination),
            );
            return Ok(Vec::new());
        }

        Ok(vec![self.start_route_discovery(state, destination, now)])
    }

    /// Forgets a discovery whose route request never made it on the air, along with the
    /// payloads queued for it. Returns the number of payloads dropped.
    pub fn abort_discovery(&self, state: &mut RoutingState, destination: &str) -> usize {
        state.pending_routes.remove(destination);
        let dropped = state
            .queued_payloads
            .remove(destination)
            .map(|q| q.len())
            .unwrap_or(0);
        warn!(
            self.logger,
            "Route discovery aborted";
            "destination" => destination,
            "dropped_payloads" => dropped,
        );
        dropped
    }

    fn queue_payload(&self, state: &mut RoutingState, destination: &str, payload: String) {
        let queue = state
            .queued_payloads
            .entry(destination.to_string())
            .or_insert_with(VecDeque::new);
        if queue.len() >= self.config.max_queued_packets {
            queue.pop_front();
            warn!(
                self.logger,
                "Queue full, dropped oldest payload";
                "destination" => destination,
            );
        }
        queue.push_back(payload);
        info!(
            self.logger,
            "Data queued";
            "destination" => destination,
            "status" => MessageStatus::QUEUED,
            "reason" => "No route to destination",
        );
    }

    fn start_route_discovery(
        &mut self,
        state: &mut RoutingState,
        destination: &str,
        now: u64,
    ) -> Transmission {
        state.broadcast_id = state.broadcast_id.wrapping_add(1);
        let broadcast_id = state.broadcast_id;
        let rreq = RouteRequestMessage {
            origin: state.address.clone(),
            destination: destination.to_string(),
            source_seq: now,
            dest_seq: 0,
            broadcast_id,
            hop_count: 0,
            ttl: self.config.rreq_ttl,
        };

        //Echoes of our own flood must be treated as duplicates
        state.broadcasts.should_process(&rreq.origin, broadcast_id);
        state.pending_routes.insert(
            destination.to_string(),
            PendingRoute {
                broadcast_id,
                started: now,
            },
        );
        info!(
            self.logger,
            "Route discovery started";
            "destination" => destination,
            "broadcast_id" => broadcast_id,
        );

        let pkt = rreq.to_packet(&state.address).stamp(now, &mut self.rng);
        Transmission::immediate(pkt)
    }

    /// Entry point for RREQ, RREP and DATA packets received over the radio.
    /// Fails without touching the state when the packet does not carry a well-formed record.
    pub fn handle_packet(
        &mut self,
        state: &mut RoutingState,
        pkt: &Packet,
        now: u64,
    ) -> Result<HandleMessageOutcome, MeshNodeError> {
        match pkt.kind() {
            PacketKind::RouteRequest => {
                let msg = RouteRequestMessage::from_packet(pkt)?;
                Ok(self.on_rreq(state, pkt, msg, now))
            }
            PacketKind::RouteReply => {
                if pkt.channel_id != state.address {
                    log_handle_packet(
                        &self.logger,
                        pkt,
                        MessageStatus::DROPPED,
                        Some("RREP not addressed to this node"),
                        &(),
                    );
                    return Ok(HandleMessageOutcome::default());
                }
                let msg = RouteResponseMessage::from_packet(pkt)?;
                Ok(self.on_rrep(state, pkt, msg, now))
            }
            PacketKind::Data => {
                let msg = DataMessage::from_packet(pkt)?;
                Ok(self.on_data(state, pkt, msg, now))
            }
            PacketKind::Channel => {
                let err_msg = format!("{} is not a routing packet", pkt.channel_name);
                Err(MeshNodeErrorKind::Protocol(err_msg).into())
            }
        }
    }

    /// Handles a route request heard from the neighbour `pkt.sender`.
    pub fn on_rreq(
        &mut self,
        state: &mut RoutingState,
        pkt: &Packet,
        mut msg: RouteRequestMessage,
        now: u64,
    ) -> HandleMessageOutcome {
        let me = state.address.clone();

        if !state.broadcasts.should_process(&msg.origin, msg.broadcast_id) {
            log_handle_packet(
                &self.logger,
                pkt,
                MessageStatus::DROPPED,
                Some("DUPLICATE"),
                &msg,
            );
            return HandleMessageOutcome::default();
        }

        //Reverse route towards the node that started the discovery
        let reverse = RouteEntry::new(
            &msg.origin,
            &pkt.sender,
            msg.hop_count.saturating_add(1),
            msg.source_seq,
            now.saturating_add(self.config.route_lifetime),
        );
        if state.route_table.upsert_reverse(reverse) {
            debug!(
                self.logger,
                "Reverse route installed";
                "destination" => &msg.origin,
                "next_hop" => &pkt.sender,
            );
        }

        if msg.destination == me {
            log_handle_packet(
                &self.logger,
                pkt,
                MessageStatus::ACCEPTED,
                Some("RREQ reached its destination"),
                &msg,
            );
            let rrep = RouteResponseMessage {
                destination: me.clone(),
                origin: msg.origin,
                dest_seq: msg.dest_seq,
                hop_count: 0,
            };
            let resp = rrep.to_packet(&pkt.sender, &me).stamp(now, &mut self.rng);
            return HandleMessageOutcome::transmit(Transmission::immediate(resp));
        }

        if msg.ttl == 0 {
            log_handle_packet(
                &self.logger,
                pkt,
                MessageStatus::DROPPED,
                Some("TTL_EXPIRED"),
                &msg,
            );
            return HandleMessageOutcome::default();
        }

        msg.ttl -= 1;
        msg.hop_count = msg.hop_count.saturating_add(1);
        log_handle_packet(
            &self.logger,
            pkt,
            MessageStatus::FORWARDING,
            None,
            &msg,
        );
        let jitter = self.jitter();
        let fwd = relay_stamp(msg.to_packet(&me), pkt, now);
        HandleMessageOutcome::transmit(Transmission::delayed(fwd, jitter))
    }

    /// Handles a route reply addressed to this node.
    pub fn on_rrep(
        &mut self,
        state: &mut RoutingState,
        pkt: &Packet,
        mut msg: RouteResponseMessage,
        now: u64,
    ) -> HandleMessageOutcome {
        let me = state.address.clone();

        let forward = RouteEntry::new(
            &msg.destination,
            &pkt.sender,
            msg.hop_count,
            msg.dest_seq,
            now.saturating_add(self.config.route_lifetime),
        );
        state.route_table.upsert_forward(forward);

        if msg.origin == me {
            log_handle_packet(
                &self.logger,
                pkt,
                MessageStatus::ACCEPTED,
                Some("Route discovery completed"),
                &msg,
            );
            state.pending_routes.remove(&msg.destination);
            return HandleMessageOutcome {
                transmissions: self.flush_queue(state, &msg.destination, now),
                delivered: None,
            };
        }

        let next_hop = match state.route_table.lookup(&msg.origin) {
            Some(route) => route.next_hop.clone(),
            None => {
                log_handle_packet(
                    &self.logger,
                    pkt,
                    MessageStatus::DROPPED,
                    Some("No reverse route to origin"),
                    &msg,
                );
                return HandleMessageOutcome::default();
            }
        };

        msg.hop_count = msg.hop_count.saturating_add(1);
        log_handle_packet(
            &self.logger,
            pkt,
            MessageStatus::FORWARDING,
            None,
            &msg,
        );
        let relay = relay_stamp(msg.to_packet(&next_hop, &me), pkt, now);
        HandleMessageOutcome::transmit(Transmission::immediate(relay))
    }

    /// Handles a DATA packet: delivers it, relays it or ignores it when overheard.
    /// Only the hop named in the record acts on the packet, so a destination in range of
    /// several hops of the path delivers the payload once.
    pub fn on_data(
        &mut self,
        state: &mut RoutingState,
        pkt: &Packet,
        mut msg: DataMessage,
        now: u64,
    ) -> HandleMessageOutcome {
        let me = state.address.clone();

        if msg.next_hop != me {
            log_handle_packet(
                &self.logger,
                pkt,
                MessageStatus::DROPPED,
                Some("OVERHEARD"),
                &msg,
            );
            return HandleMessageOutcome::default();
        }

        if pkt.channel_id == me {
            log_handle_packet(
                &self.logger,
                pkt,
                MessageStatus::ACCEPTED,
                Some("DATA reached its destination"),
                &msg,
            );
            let mut delivered = Packet::new(DATA_CHANNEL, &me, &msg.origin, msg.payload, false);
            delivered.timestamp_hex = pkt.timestamp_hex.clone();
            delivered.message_id = pkt.message_id.clone();
            return HandleMessageOutcome {
                transmissions: Vec::new(),
                delivered: Some(delivered),
            };
        }

        if msg.hop_count >= self.config.rreq_ttl {
            log_handle_packet(
                &self.logger,
                pkt,
                MessageStatus::DROPPED,
                Some("HOP_LIMIT"),
                &msg,
            );
            return HandleMessageOutcome::default();
        }

        let next_hop = match state.route_table.lookup(&pkt.channel_id) {
            Some(route) => route.next_hop.clone(),
            None => {
                log_handle_packet(
                    &self.logger,
                    pkt,
                    MessageStatus::DROPPED,
                    Some("No route to destination"),
                    &msg,
                );
                return HandleMessageOutcome::default();
            }
        };

        msg.next_hop = next_hop;
        msg.hop_count += 1;
        log_handle_packet(
            &self.logger,
            pkt,
            MessageStatus::FORWARDING,
            None,
            &msg,
        );
        let relay = relay_stamp(msg.to_packet(&pkt.channel_id, &me), pkt, now);
        HandleMessageOutcome::transmit(Transmission::immediate(relay))
    }

    /// Invalidates every route through `next_hop`. No rediscovery is started.
    pub fn on_link_break(&self, state: &mut RoutingState, next_hop: &str) -> usize {
        let invalidated = state.route_table.invalidate_via(next_hop);
        warn!(
            self.logger,
            "Link break";
            "next_hop" => next_hop,
            "invalidated_routes" => invalidated,
        );
        invalidated
    }

    /// Periodic housekeeping: expires routes, abandons stale discoveries and releases
    /// queued payloads whose destination became reachable in the meantime.
    pub fn do_maintenance(&mut self, state: &mut RoutingState, now: u64) -> MaintenanceReport {
        let expired_routes = state.route_table.expire(now);
        for dest in expired_routes.iter() {
            info!(self.logger, "Route expired"; "destination" => dest);
        }

        let mut resolved: Vec<String> = state
            .pending_routes
            .keys()
            .filter(|dest| state.route_table.lookup(dest).is_some())
            .cloned()
            .collect();
        resolved.sort();
        let mut transmissions = Vec::new();
        for dest in resolved.iter() {
            state.pending_routes.remove(dest);
            transmissions.extend(self.flush_queue(state, dest, now));
        }

        let timeout = self.config.discovery_timeout;
        let mut abandoned: Vec<String> = state
            .pending_routes
            .iter()
            .filter(|(_, p)| now >= p.started.saturating_add(timeout))
            .map(|(k, _)| k.clone())
            .collect();
        abandoned.sort();
        for dest in abandoned.iter() {
            let broadcast_id = state
                .pending_routes
                .remove(dest)
                .map(|p| p.broadcast_id)
                .unwrap_or(0);
            let dropped = state
                .queued_payloads
                .remove(dest)
                .map(|q| q.len())
                .unwrap_or(0);
            warn!(
                self.logger,
                "Route discovery timed out";
                "destination" => dest,
                "broadcast_id" => broadcast_id,
                "dropped_payloads" => dropped,
            );
        }

        MaintenanceReport {
            expired_routes,
            abandoned_discoveries: abandoned,
            transmissions,
        }
    }

    fn flush_queue(
        &mut self,
        state: &mut RoutingState,
        destination: &str,
        now: u64,
    ) -> Vec<Transmission> {
        let queued = match state.queued_payloads.remove(destination) {
            Some(q) => q,
            None => return Vec::new(),
        };
        let next_hop = match state.route_table.lookup(destination) {
            Some(route) => route.next_hop.clone(),
            None => return Vec::new(),
        };

        info!(
            self.logger,
            "Sending queued data";
            "destination" => destination,
            "count" => queued.len(),
        );
        let me = state.address.clone();
        queued
            .into_iter()
            .map(|payload| {
                let msg = DataMessage {
                    origin: me.clone(),
                    next_hop: next_hop.clone(),
                    hop_count: 0,
                    payload,
                };
                Transmission::immediate(msg.to_packet(destination, &me).stamp(now, &mut self.rng))
            })
            .collect()
    }

    fn jitter(&mut self) -> Duration {
        let ms = self
            .rng
            .gen_range(self.config.jitter_min..=self.config.jitter_max);
        Duration::from_millis(ms)
    }
}

// Relayed packets keep the id of the packet they continue.
fn relay_stamp(mut pkt: Packet, received: &Packet, now: u64) -> Packet {
    pkt.timestamp_hex = format!("{:x}", now);
    pkt.message_id = received.message_id.clone();
    pkt
}
