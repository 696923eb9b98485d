//! The node is the main actor of the mesh. It owns the radio, the routing state and the routing engine,
//! and runs a single-threaded loop that bridges the host line interface with the radio channel.

pub mod aodv;
pub mod broadcasts;
pub mod commands;
pub mod node_config;
pub mod packet;
pub mod radio;
pub mod route_table;

use self::aodv::{Aodv, HandleMessageOutcome, RoutingState, Transmission};
use self::commands::Commands;
use self::packet::{Packet, PacketKind};
use self::radio::{Radio, RxSignal};
use self::route_table::RouteTable;
use crate::{MeshNodeError, MeshNodeErrorKind};

use byteorder::{NativeEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, TryRecvError};
use rand::{rngs::StdRng, SeedableRng};
use slog::{Key, Logger, Record, Serializer, Value, KV};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MAIN_THREAD_PERIOD: u64 = 5; //ms

// *****************************************
// ************* Log records ***************
// *****************************************

/// Enum that represents the possible status of a packet as it moves through the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// The packet has reached its destination.
    ACCEPTED,
    /// The packet has been dropped. The *reason* field should provide more data.
    DROPPED,
    /// The packet has reached an intermediate node and will be forwarded.
    FORWARDING,
    /// A new packet has been transmitted
    SENT,
    /// The payload has been queued. This usually indicates a pending route discovery.
    QUEUED,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MessageStatus::ACCEPTED => write!(f, "ACCEPTED"),
            MessageStatus::DROPPED => write!(f, "DROPPED"),
            MessageStatus::FORWARDING => write!(f, "FORWARDING"),
            MessageStatus::SENT => write!(f, "SENT"),
            MessageStatus::QUEUED => write!(f, "QUEUED"),
        }
    }
}

impl Value for MessageStatus {
    fn serialize(&self, _rec: &Record, key: Key, serializer: &mut dyn Serializer) -> slog::Result {
        serializer.emit_str(key, &self.to_string())
    }
}

/// Logs an incoming packet along with what the node did with it.
pub fn log_handle_packet<T: KV>(
    logger: &Logger,
    pkt: &Packet,
    status: MessageStatus,
    reason: Option<&str>,
    msg: &T,
) {
    info!(
        logger,
        "Received packet";
        msg,
        pkt,
        "reason" => reason.unwrap_or(""),
        "status" => status,
    );
}

/// Logs an outgoing packet.
pub fn log_tx(logger: &Logger, pkt: &Packet, size: usize) {
    info!(
        logger,
        "Packet sent";
        pkt,
        "size" => size,
        "reason" => "",
        "status" => MessageStatus::SENT,
    );
}

// *****************************************
// *************** Clock *******************
// *****************************************

/// Node-local clock, counting milliseconds since the node was created.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    boot: DateTime<Utc>,
}

impl Default for LocalClock {
    fn default() -> Self {
        LocalClock { boot: Utc::now() }
    }
}

impl LocalClock {
    /// Starts a clock at zero.
    pub fn new() -> LocalClock {
        LocalClock::default()
    }

    /// Milliseconds elapsed since boot.
    pub fn millis(&self) -> u64 {
        let elapsed = Utc::now().signed_duration_since(self.boot).num_milliseconds();
        elapsed.max(0) as u64
    }
}

// *****************************************
// **************** Node *******************
// *****************************************

/// What became of a line received from the host.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// The line was a command and it was executed.
    Accepted,
    /// Empty line or echoed log line.
    Ignored,
    /// The line could not be parsed, or its command failed.
    Rejected(String),
}

/// A node of the mesh.
#[derive(Debug)]
pub struct Node {
    address: String,
    state: RoutingState,
    aodv: Aodv,
    radio: Box<dyn Radio>,
    rx_signal: Arc<RxSignal>,
    clock: LocalClock,
    maintenance_period: u64,
    next_maintenance: u64,
    started: bool,
    finished: bool,
    logger: Logger,
}

impl Node {
    /// Creates a node. The radio stays idle until `begin` is called.
    pub fn new(
        address: String,
        radio: Box<dyn Radio>,
        aodv: Aodv,
        maintenance_period: u64,
        logger: Logger,
    ) -> Node {
        let state = aodv.new_state(&address);
        let rx_signal = radio.rx_signal();
        Node {
            address,
            state,
            aodv,
            radio,
            rx_signal,
            clock: LocalClock::new(),
            maintenance_period,
            next_maintenance: maintenance_period,
            started: false,
            finished: false,
            logger,
        }
    }

    /// Create a new random number generator from the given seed.
    pub fn rng_from_seed(seed: u32) -> StdRng {
        //Create RNG from the provided random seed.
        let mut random_bytes = vec![];
        //Fill the uper 28 bytes with 0s
        for _i in 0..7 {
            random_bytes.write_u32::<NativeEndian>(0).unwrap_or(());
        }
        //Write the last 4 bytes from the provided seed
        random_bytes.write_u32::<NativeEndian>(seed).unwrap_or(());

        let mut randomness = [0; 32];
        randomness.copy_from_slice(random_bytes.as_slice());
        StdRng::from_seed(randomness)
    }

    /// Address of this node.
    pub fn get_address(&self) -> &str {
        &self.address
    }

    /// Route table of this node.
    pub fn routes(&self) -> &RouteTable {
        &self.state.route_table
    }

    /// Routing state of this node.
    pub fn state(&self) -> &RoutingState {
        &self.state
    }

    /// Whether a frame is waiting to be handled.
    pub fn rx_pending(&self) -> bool {
        self.rx_signal.is_set()
    }

    /// Whether the host asked the node to stop.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Milliseconds since this node was created.
    pub fn uptime(&self) -> u64 {
        self.clock.millis()
    }

    /// Starts the radio. A node whose radio fails to start must not serve traffic.
    pub fn begin(&mut self) -> Result<(), MeshNodeError> {
        self.radio.begin().map_err(|e| {
            error!(self.logger, "Radio initialization failed: {}", &e);
            e
        })?;
        self.radio.receive_mode();
        self.started = true;
        info!(self.logger, "Node started"; "address" => &self.address);
        Ok(())
    }

    /// Sends a payload to another node of the mesh, discovering the route if needed.
    /// A discovery started by this call is rolled back if its route request can't be transmitted.
    pub fn send_data(&mut self, destination: &str, payload: String) -> Result<(), MeshNodeError> {
        if !self.started {
            let err_msg = String::from("Node has not been started");
            return Err(MeshNodeErrorKind::Radio(err_msg).into());
        }

        let now = self.clock.millis();
        let destination = destination.trim();
        let was_discovering = self.state.is_discovering(destination);
        let out = self
            .aodv
            .send_data_or_discover(&mut self.state, destination, payload, now)?;
        if let Err(e) = self.transmit_all(out) {
            if !was_discovering && self.state.is_discovering(destination) {
                self.aodv.abort_discovery(&mut self.state, destination);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Puts a packet on the air unchanged.
    pub fn transmit(&mut self, pkt: &Packet) -> Result<(), MeshNodeError> {
        if !self.started {
            let err_msg = String::from("Node has not been started");
            return Err(MeshNodeErrorKind::Radio(err_msg).into());
        }
        let data = pkt.encode()?;
        self.radio.transmit(&data)?;
        log_tx(&self.logger, pkt, data.len());
        self.radio.receive_mode();
        Ok(())
    }

    fn transmit_all(&mut self, out: Vec<Transmission>) -> Result<(), MeshNodeError> {
        for t in out {
            if t.delay > Duration::from_millis(0) {
                thread::sleep(t.delay);
            }
            self.transmit(&t.packet)?;
        }
        Ok(())
    }

    /// Invalidates every route through `next_hop`.
    pub fn link_break(&mut self, next_hop: &str) -> usize {
        self.aodv.on_link_break(&mut self.state, next_hop)
    }

    /// Executes one line received from the host.
    pub fn handle_line(&mut self, line: &str) -> LineOutcome {
        if Commands::is_ignored(line) {
            return LineOutcome::Ignored;
        }

        let command = match line.parse::<Commands>() {
            Ok(c) => c,
            Err(e) => {
                warn!(self.logger, "Error parsing command: {}", &e; "line" => line.trim());
                return LineOutcome::Rejected(e.to_string());
            }
        };

        match self.process_command(command) {
            Ok(()) => LineOutcome::Accepted,
            Err(e) => {
                error!(self.logger, "Error executing command: {}", &e);
                if let Some(ref cause) = e.cause {
                    error!(self.logger, "Cause: {}", cause);
                }
                LineOutcome::Rejected(e.to_string())
            }
        }
    }

    fn process_command(&mut self, command: Commands) -> Result<(), MeshNodeError> {
        match command {
            Commands::Send(destination, payload) => {
                info!(self.logger, "Send command received"; "destination" => &destination);
                self.send_data(&destination, payload)
            }
            Commands::Transmit(pkt) => self.transmit(&pkt),
            Commands::Routes => {
                self.state.route_table.log_routes(&self.logger);
                Ok(())
            }
            Commands::LinkBreak(next_hop) => {
                self.link_break(&next_hop);
                Ok(())
            }
            Commands::Finish => {
                info!(self.logger, "Finish command received");
                self.finished = true;
                Ok(())
            }
        }
    }

    /// Services one receive-ready signal. Returns the packet to report to the host, if any.
    /// DATA that reached this node is reported with its payload and its originator as sender.
    pub fn on_packet_received(&mut self) -> Option<Packet> {
        let size = self.rx_signal.take()?;
        let data = self.radio.read_available();
        let report = self.process_frame(size, &data);
        self.radio.receive_mode();
        report
    }

    fn process_frame(&mut self, size: usize, data: &[u8]) -> Option<Packet> {
        if size == 0 || data.is_empty() {
            return None;
        }

        let pkt = Packet::from_bytes(data);
        if !pkt.valid {
            warn!(self.logger, "Dropping malformed frame"; "size" => data.len());
            return None;
        }
        if pkt.sender == self.address {
            debug!(self.logger, "Dropping own transmission"; "message_id" => &pkt.message_id);
            return None;
        }

        if pkt.kind() == PacketKind::Channel {
            log_handle_packet(
                &self.logger,
                &pkt,
                MessageStatus::ACCEPTED,
                Some("Application channel"),
                &(),
            );
            return Some(pkt);
        }

        let now = self.clock.millis();
        match self.aodv.handle_packet(&mut self.state, &pkt, now) {
            Ok(HandleMessageOutcome {
                transmissions,
                delivered,
            }) => {
                if let Err(e) = self.transmit_all(transmissions) {
                    error!(self.logger, "Failed to transmit response: {}", &e);
                }
                match pkt.kind() {
                    PacketKind::Data => delivered,
                    _ => Some(pkt),
                }
            }
            Err(e) => {
                log_handle_packet(
                    &self.logger,
                    &pkt,
                    MessageStatus::DROPPED,
                    Some(&e.to_string()),
                    &(),
                );
                None
            }
        }
    }

    /// Runs the route maintenance pass if its period has elapsed.
    pub fn maintenance(&mut self) {
        let now = self.clock.millis();
        if now < self.next_maintenance {
            return;
        }
        self.next_maintenance = now.saturating_add(self.maintenance_period);

        let report = self.aodv.do_maintenance(&mut self.state, now);
        if let Err(e) = self.transmit_all(report.transmissions) {
            error!(self.logger, "Failed to perform maintenance operations: {}", &e);
        }
    }

    /// Main loop of the node. Executes host lines from `commands`, services the radio and runs
    /// maintenance until a Finish command arrives. Every reported packet is passed to `report`.
    pub fn run<F>(
        &mut self,
        commands: Option<Receiver<String>>,
        mut report: F,
    ) -> Result<(), MeshNodeError>
    where
        F: FnMut(&Packet),
    {
        if !self.started {
            self.begin()?;
        }

        let mut commands = commands;
        let main_thread_period = Duration::from_millis(MAIN_THREAD_PERIOD);
        loop {
            //Host lines
            let mut closed = false;
            if let Some(ref rx) = commands {
                loop {
                    match rx.try_recv() {
                        Ok(line) => {
                            self.handle_line(&line);
                        }
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            closed = true;
                            break;
                        }
                    }
                }
            }
            if closed {
                info!(self.logger, "Command input closed");
                commands = None;
            }

            //Radio
            while self.rx_pending() {
                if let Some(pkt) = self.on_packet_received() {
                    report(&pkt);
                }
            }

            self.maintenance();

            if self.finished {
                info!(self.logger, "Node finished"; "address" => &self.address);
                break;
            }
            thread::sleep(main_thread_period);
        }

        Ok(())
    }
}

// *****************************
// ********** Tests ************
// *****************************
