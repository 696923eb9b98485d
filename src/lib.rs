//*****************
//External crates
//*****************
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate slog;

//*****************
//Modules declaration
//*****************
pub mod logging;
pub mod node;
pub mod tests;

//*****************
//Constants
//*****************
/// Milliseconds in a second.
pub const ONE_SECOND_MS: u64 = 1_000;

//*****************
//Errors
//*****************
use std::error::Error;
use std::fmt;

/// Error struct for this crate
#[derive(Debug)]
pub struct MeshNodeError {
    pub cause: Option<Box<dyn Error + Send + Sync>>,
    pub kind: MeshNodeErrorKind,
}

/// Types of errors produced in this crate
#[derive(Debug)]
pub enum MeshNodeErrorKind {
    /// Failures related to [de]serializing data, including wire frames
    Serialization(String),
    /// Failures in configuration of the system
    Configuration(String),
    /// Networking related failures
    Networking(String),
    /// The radio could not be initialized or failed to transmit
    Radio(String),
    /// Errors from the host command interface
    Command(String),
    /// A control message that does not follow the routing protocol
    Protocol(String),
}

impl MeshNodeError {
    /// Builds an error of the given kind, keeping the underlying cause.
    pub fn with_cause<E>(kind: MeshNodeErrorKind, cause: E) -> MeshNodeError
    where
        E: Error + Send + Sync + 'static,
    {
        MeshNodeError {
            kind,
            cause: Some(Box::new(cause)),
        }
    }
}

impl Error for MeshNodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.cause {
            Some(ref cause) => Some(&**cause),
            None => None,
        }
    }
}

impl fmt::Display for MeshNodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for MeshNodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MeshNodeErrorKind::Serialization(msg) => write!(f, "{}", msg),
            MeshNodeErrorKind::Configuration(msg) => write!(f, "{}", msg),
            MeshNodeErrorKind::Networking(msg) => write!(f, "{}", msg),
            MeshNodeErrorKind::Radio(msg) => write!(f, "{}", msg),
            MeshNodeErrorKind::Command(msg) => write!(f, "{}", msg),
            MeshNodeErrorKind::Protocol(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<MeshNodeErrorKind> for MeshNodeError {
    fn from(kind: MeshNodeErrorKind) -> MeshNodeError {
        MeshNodeError { cause: None, kind }
    }
}
