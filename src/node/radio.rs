//! This module defines the abstraction of the half-duplex radio a node transmits and receives with,
//! along with the radios available: a simulated shared medium and IPv6 multicast over UDP.

use crate::{MeshNodeError, MeshNodeErrorKind};
use crossbeam_channel::{unbounded, Receiver, Sender};
use slog::Logger;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

///Maximum size the payload of a UDP packet can have.
pub const MAX_UDP_PAYLOAD_SIZE: usize = 65507; //65,507 bytes (65,535 − 8 byte UDP header − 20 byte IP header)
/// Default port of the multicast radio.
pub const DEFAULT_PORT: u16 = 4915;
const LISTENER_TIMEOUT: u64 = 100; //ms
const LISTENER_THREAD_NAME: &str = "RadioListener";

lazy_static! {
    ///Address used for multicast group
    pub static ref SERVICE_ADDRESS: Ipv6Addr = Ipv6Addr::new(0xFF02, 0, 0, 0, 0, 0, 0, 0x0123);
}

/// Receive-ready notification shared between a radio and the node loop.
/// Notifying only records the frame size and raises the flag.
#[derive(Debug, Default)]
pub struct RxSignal {
    ready: AtomicBool,
    size: AtomicUsize,
}

impl RxSignal {
    /// Flags that a frame of `size` bytes is ready to be read.
    pub fn notify(&self, size: usize) {
        self.size.store(size, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Clears the flag, returning the announced size if it was raised.
    pub fn take(&self) -> Option<usize> {
        if self.ready.swap(false, Ordering::SeqCst) {
            Some(self.size.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    /// Whether a frame is waiting.
    pub fn is_set(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Trait for a half-duplex packet radio.
pub trait Radio: std::fmt::Debug + Send {
    /// Powers up the radio. The node must not serve traffic if this fails.
    fn begin(&mut self) -> Result<(), MeshNodeError>;

    /// Puts a frame on the air.
    fn transmit(&mut self, data: &[u8]) -> Result<(), MeshNodeError>;

    /// Reads the frame announced by the receive-ready signal. Empty if there is none.
    fn read_available(&mut self) -> Vec<u8>;

    /// Re-arms reception after a transmit or receive cycle.
    fn receive_mode(&mut self);

    /// The receive-ready signal of this radio.
    fn rx_signal(&self) -> Arc<RxSignal>;
}

// Frames delivered to a radio but not yet read by the node.
#[derive(Debug)]
struct RxQueue {
    inbox: Receiver<Vec<u8>>,
    buffer: VecDeque<Vec<u8>>,
}

impl RxQueue {
    fn new(inbox: Receiver<Vec<u8>>) -> RxQueue {
        RxQueue {
            inbox,
            buffer: VecDeque::new(),
        }
    }

    fn pop(&mut self) -> Vec<u8> {
        self.drain_inbox();
        self.buffer.pop_front().unwrap_or_default()
    }

    // Raises the signal again if frames arrived while the previous one was handled.
    fn rearm(&mut self, signal: &RxSignal) {
        self.drain_inbox();
        if let Some(frame) = self.buffer.front() {
            signal.notify(frame.len());
        }
    }

    fn drain_inbox(&mut self) {
        self.buffer.extend(self.inbox.try_iter());
    }
}

//************************************************//
//*************** Simulated medium ***************//
//************************************************//

#[derive(Debug)]
struct Station {
    tx: Sender<Vec<u8>>,
    signal: Arc<RxSignal>,
}

#[derive(Debug, Default)]
struct MediumState {
    stations: HashMap<String, Station>,
    links: HashSet<(String, String)>,
}

/// In-process radio channel. Frames reach exactly the stations linked to the transmitter.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMedium {
    state: Arc<Mutex<MediumState>>,
}

impl SimulatedMedium {
    /// Creates an empty medium.
    pub fn new() -> SimulatedMedium {
        SimulatedMedium::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MediumState>, MeshNodeError> {
        self.state.lock().map_err(|_e| {
            let err_msg = String::from("Failed to lock the simulated medium");
            MeshNodeError::from(MeshNodeErrorKind::Radio(err_msg))
        })
    }

    /// Attaches a new station to the medium and returns its radio.
    pub fn create_radio(&self, address: &str) -> Result<SimulatedRadio, MeshNodeError> {
        let mut state = self.lock()?;
        if state.stations.contains_key(address) {
            let err_msg = format!("Station {} is already attached to the medium", address);
            return Err(MeshNodeErrorKind::Configuration(err_msg).into());
        }

        let (tx, rx) = unbounded();
        let signal = Arc::new(RxSignal::default());
        state.stations.insert(
            address.to_string(),
            Station {
                tx,
                signal: Arc::clone(&signal),
            },
        );

        Ok(SimulatedRadio {
            address: address.to_string(),
            medium: self.clone(),
            queue: RxQueue::new(rx),
            signal,
            started: false,
        })
    }

    /// Removes a station. Its radio can no longer start nor transmit.
    pub fn detach(&self, address: &str) -> Result<(), MeshNodeError> {
        let mut state = self.lock()?;
        state.stations.remove(address);
        state.links.retain(|(a, b)| a != address && b != address);
        Ok(())
    }

    /// Puts two stations in radio range of each other.
    pub fn connect(&self, a: &str, b: &str) -> Result<(), MeshNodeError> {
        let mut state = self.lock()?;
        state.links.insert((a.to_string(), b.to_string()));
        state.links.insert((b.to_string(), a.to_string()));
        Ok(())
    }

    /// Takes two stations out of range of each other.
    pub fn disconnect(&self, a: &str, b: &str) -> Result<(), MeshNodeError> {
        let mut state = self.lock()?;
        state.links.remove(&(a.to_string(), b.to_string()));
        state.links.remove(&(b.to_string(), a.to_string()));
        Ok(())
    }

    fn is_attached(&self, address: &str) -> Result<bool, MeshNodeError> {
        Ok(self.lock()?.stations.contains_key(address))
    }

    // Returns the number of stations that received the frame.
    fn deliver(&self, from: &str, data: &[u8]) -> Result<usize, MeshNodeError> {
        let state = self.lock()?;
        if !state.stations.contains_key(from) {
            let err_msg = format!("Station {} is not attached to the medium", from);
            return Err(MeshNodeErrorKind::Radio(err_msg).into());
        }

        let mut reached = 0;
        for (addr, station) in state.stations.iter() {
            if !state.links.contains(&(from.to_string(), addr.clone())) {
                continue;
            }
            if station.tx.send(data.to_vec()).is_ok() {
                station.signal.notify(data.len());
                reached += 1;
            }
        }
        Ok(reached)
    }
}

/// Radio attached to a `SimulatedMedium`.
#[derive(Debug)]
pub struct SimulatedRadio {
    address: String,
    medium: SimulatedMedium,
    queue: RxQueue,
    signal: Arc<RxSignal>,
    started: bool,
}

impl Radio for SimulatedRadio {
    fn begin(&mut self) -> Result<(), MeshNodeError> {
        if !self.medium.is_attached(&self.address)? {
            let err_msg = format!("Station {} is not attached to the medium", &self.address);
            return Err(MeshNodeErrorKind::Radio(err_msg).into());
        }
        self.started = true;
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), MeshNodeError> {
        if !self.started {
            let err_msg = String::from("Radio has not been started");
            return Err(MeshNodeErrorKind::Radio(err_msg).into());
        }
        self.medium.deliver(&self.address, data).map(|_| ())
    }

    fn read_available(&mut self) -> Vec<u8> {
        self.queue.pop()
    }

    fn receive_mode(&mut self) {
        self.queue.rearm(&self.signal);
    }

    fn rx_signal(&self) -> Arc<RxSignal> {
        Arc::clone(&self.signal)
    }
}

//************************************************//
//***************** UDP multicast ****************//
//************************************************//

/// Radio that carries frames as IPv6 multicast datagrams, so several node processes
/// on the same link form one broadcast domain.
#[derive(Debug)]
pub struct UdpRadio {
    port: u16,
    interface_index: u32,
    socket: Option<Socket>,
    queue: Option<RxQueue>,
    signal: Arc<RxSignal>,
    logger: Logger,
}

impl UdpRadio {
    /// Creates an idle radio. Nothing is bound until `begin`.
    pub fn new(port: u16, interface_index: u32, logger: Logger) -> UdpRadio {
        UdpRadio {
            port,
            interface_index,
            socket: None,
            queue: None,
            signal: Arc::new(RxSignal::default()),
            logger,
        }
    }

    fn init_listener(&self) -> Result<Socket, MeshNodeError> {
        let sock = new_socket()?;
        sock.set_reuse_address(true).map_err(|e| {
            let err_msg = String::from("Failed to configure socket");
            MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
        })?;

        //Join multicast group
        sock.join_multicast_v6(&SERVICE_ADDRESS, self.interface_index)
            .map_err(|e| {
                let err_msg = String::from("Failed to join the multicast group");
                MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
            })?;
        sock.set_only_v6(true).map_err(|e| {
            let err_msg = String::from("Failed to configure socket");
            MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
        })?;
        sock.set_read_timeout(Some(Duration::from_millis(LISTENER_TIMEOUT)))
            .map_err(|e| {
                let err_msg = String::from("Failed to configure socket");
                MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
            })?;

        let address = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), self.port);
        sock.bind(&SockAddr::from(address)).map_err(|e| {
            let err_msg = format!("Could not bind socket to address {}", &address);
            MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
        })?;

        Ok(sock)
    }

    fn init_sender(&self) -> Result<Socket, MeshNodeError> {
        let sock = new_socket()?;
        sock.set_multicast_if_v6(self.interface_index)
            .map_err(|e| {
                let err_msg = format!(
                    "Failed to configure interface with index {}",
                    self.interface_index
                );
                MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
            })?;
        sock.set_multicast_loop_v6(true).map_err(|e| {
            let err_msg = String::from("Failed to configure socket");
            MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
        })?;
        Ok(sock)
    }
}

impl Radio for UdpRadio {
    fn begin(&mut self) -> Result<(), MeshNodeError> {
        let listener = self.init_listener()?;
        let sender = self.init_sender()?;
        let (tx, rx) = unbounded();
        let signal = Arc::clone(&self.signal);
        let logger = self.logger.clone();

        thread::Builder::new()
            .name(LISTENER_THREAD_NAME.into())
            .spawn(move || {
                let mut buffer = vec![0u8; MAX_UDP_PAYLOAD_SIZE + 1];
                loop {
                    let bytes_read = match listener.recv_from(&mut buffer) {
                        Ok((bytes_read, _peer_addr)) => bytes_read,
                        Err(_e) => {
                            //Timeout, no frame read
                            continue;
                        }
                    };
                    if bytes_read == 0 {
                        continue;
                    }
                    if tx.send(buffer[..bytes_read].to_vec()).is_err() {
                        debug!(logger, "Radio dropped, listener exiting");
                        break;
                    }
                    signal.notify(bytes_read);
                }
            })
            .map_err(|e| {
                let err_msg = String::from("Failed to start the radio listener");
                MeshNodeError::with_cause(MeshNodeErrorKind::Radio(err_msg), e)
            })?;

        info!(
            self.logger,
            "Radio listening";
            "group" => SERVICE_ADDRESS.to_string(),
            "port" => self.port,
            "interface_index" => self.interface_index,
        );
        self.socket = Some(sender);
        self.queue = Some(RxQueue::new(rx));
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), MeshNodeError> {
        let socket = match self.socket {
            Some(ref s) => s,
            None => {
                let err_msg = String::from("Radio has not been started");
                return Err(MeshNodeErrorKind::Radio(err_msg).into());
            }
        };
        let sock_addr = SocketAddr::new(IpAddr::V6(*SERVICE_ADDRESS), self.port);
        socket
            .send_to(data, &SockAddr::from(sock_addr))
            .map_err(|e| {
                let err_msg = String::from("Failed to transmit frame");
                MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
            })?;
        Ok(())
    }

    fn read_available(&mut self) -> Vec<u8> {
        match self.queue {
            Some(ref mut q) => q.pop(),
            None => Vec::new(),
        }
    }

    fn receive_mode(&mut self) {
        if let Some(ref mut q) = self.queue {
            q.rearm(&self.signal);
        }
    }

    fn rx_signal(&self) -> Arc<RxSignal> {
        Arc::clone(&self.signal)
    }
}

//************************************************//
//*************** Utility functions **************//
//************************************************//
/// Creates an IPv6 UDP socket.
pub fn new_socket() -> Result<Socket, MeshNodeError> {
    Socket::new(Domain::ipv6(), Type::dgram(), Some(Protocol::udp())).map_err(|e| {
        let err_msg = String::from("Failed to create new socket");
        MeshNodeError::with_cause(MeshNodeErrorKind::Networking(err_msg), e)
    })
}
