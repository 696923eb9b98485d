//! Module related to producing and reading back the logs of a node.

// Lint options for this module
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

use crate::{MeshNodeError, MeshNodeErrorKind};
use slog::{Drain, Logger};
use std::fs::{File, OpenOptions};
use std::io;
use std::io::BufRead;
use std::path::Path;

/// Directory name for where the logs will be placed.
pub const LOG_DIR_NAME: &str = "log";
const LOG_CHANNEL_SIZE: usize = 512; //Default is 128
const LOG_THREAD_NAME: &str = "LoggerThread";

/// Struct that encapsulates a log entry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    /// Main log message
    pub msg: String,
    /// Logging level
    pub level: String,
    /// Timestamp of the event
    pub ts: String,
    /// Packet status
    pub status: Option<String>,
    /// Reason for status
    pub reason: Option<String>,
    /// Type of packet
    pub channel_name: Option<String>,
    /// Last hop of the packet
    pub sender: Option<String>,
    /// ID of the packet
    pub message_id: Option<String>,
}

///Struct to hold a log record of a packet handled by the node
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PacketLog {
    /// The timestamp of the record
    pub ts: String,
    ///The packet class (DATA, RREQ, RREP or an application channel)
    pub channel_name: String,
    ///The node that transmitted this packet over the last hop
    pub sender: String,
    ///The destination of the packet
    pub channel_id: String,
    ///The id of this packet
    pub message_id: String,
    ///The status of this packet. Refer to the *MessageStatus* enum
    pub status: String,
    ///The reason (if any) for the status.
    pub reason: String,
}

///Loads a log file and produces an array of log records for processing.
pub fn get_log_records_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<LogEntry>, io::Error> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    let reader = io::BufReader::new(file);

    for line in reader.lines() {
        let data = line?;
        let u: LogEntry = serde_json::from_str(&data)?;
        records.push(u);
    }

    Ok(records)
}

///Creates a Vector that holds the log records of every packet received by the node.
pub fn get_received_packet_records<P: AsRef<Path>>(path: P) -> Result<Vec<PacketLog>, io::Error> {
    get_packet_records(path, "Received packet")
}

///Creates a Vector that holds the log records of every packet transmitted by the node.
pub fn get_sent_packet_records<P: AsRef<Path>>(path: P) -> Result<Vec<PacketLog>, io::Error> {
    get_packet_records(path, "Packet sent")
}

fn get_packet_records<P: AsRef<Path>>(path: P, pattern: &str) -> Result<Vec<PacketLog>, io::Error> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    let reader = io::BufReader::new(file);

    for line in reader.lines() {
        let data = line?;
        if data.contains(pattern) {
            let u: PacketLog = serde_json::from_str(&data)?;
            records.push(u);
        }
    }

    Ok(records)
}

///Returns the first log record whose message matches the one passed.
pub fn find_record_by_msg<'a>(msg: &str, records: &'a [LogEntry]) -> Option<&'a LogEntry> {
    records.iter().find(|rec| rec.msg == msg)
}

/// Create a duplicate logger for the terminal and the file passed as parameter.
pub fn create_logger<P: AsRef<Path>>(
    log_file_name: P,
    log_term: bool,
) -> Result<Logger, MeshNodeError> {
    //Make sure the full path is valid
    if let Some(parent) = log_file_name.as_ref().parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            let err_msg = format!("Could not create log directory {}", parent.display());
            MeshNodeError::with_cause(MeshNodeErrorKind::Configuration(err_msg), e)
        })?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_file_name.as_ref())
        .map_err(|e| {
            let err_msg = format!(
                "Could not open log file {}",
                log_file_name.as_ref().display()
            );
            MeshNodeError::with_cause(MeshNodeErrorKind::Configuration(err_msg), e)
        })?;

    if log_term {
        Ok(create_term_and_file_logger(log_file))
    } else {
        Ok(create_file_logger(log_file))
    }
}

fn create_file_logger(log_file: File) -> Logger {
    let d2 = slog_json::Json::new(log_file)
        .add_default_keys()
        .build()
        .fuse();
    let d2 = slog_async::Async::new(d2)
        .chan_size(LOG_CHANNEL_SIZE)
        .overflow_strategy(slog_async::OverflowStrategy::Drop)
        .thread_name(format!("File{}", LOG_THREAD_NAME))
        .build()
        .fuse();

    Logger::root(d2, o!())
}

fn create_term_and_file_logger(log_file: File) -> Logger {
    //Create the terminal drain. Stdout carries the host bridge, so logs go to stderr.
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let d1 = slog_term::CompactFormat::new(decorator).build().fuse();
    let d1 = slog_async::Async::new(d1)
        .chan_size(LOG_CHANNEL_SIZE)
        .overflow_strategy(slog_async::OverflowStrategy::Drop)
        .thread_name(format!("Term{}", LOG_THREAD_NAME))
        .build()
        .fuse();

    //Create the file drain
    let d2 = slog_json::Json::new(log_file)
        .add_default_keys()
        .build()
        .fuse();
    let d2 = slog_async::Async::new(d2)
        .chan_size(LOG_CHANNEL_SIZE)
        .overflow_strategy(slog_async::OverflowStrategy::Drop)
        .thread_name(format!("File{}", LOG_THREAD_NAME))
        .build()
        .fuse();

    //Fuse the drains and create the logger
    Logger::root(slog::Duplicate::new(d1, d2).fuse(), o!())
}

/// Creates a logger that discards all records. Used for tests that don't need logs.
pub fn create_discard_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
