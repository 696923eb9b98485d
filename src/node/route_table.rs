//! Per-destination routes known to a node.

use slog::Logger;
use std::collections::HashMap;

/// Best known route to a single destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Final target of the route.
    pub destination: String,
    /// One-hop neighbour to forward through.
    pub next_hop: String,
    /// Hops between this node and the destination, as advertised.
    pub hop_count: u32,
    /// Freshness of the route, taken from the clock of the node that started the discovery.
    pub sequence_number: u64,
    /// Only valid entries are used for forwarding.
    pub valid: bool,
    /// Local-clock deadline (ms) after which maintenance invalidates the entry.
    pub expiration_time: u64,
}

impl RouteEntry {
    /// Creates a valid entry.
    pub fn new(
        destination: &str,
        next_hop: &str,
        hop_count: u32,
        sequence_number: u64,
        expiration_time: u64,
    ) -> RouteEntry {
        RouteEntry {
            destination: destination.to_string(),
            next_hop: next_hop.to_string(),
            hop_count,
            sequence_number,
            valid: true,
            expiration_time,
        }
    }
}

/// Route table. Holds at most one entry per destination.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, RouteEntry>,
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> RouteTable {
        RouteTable::default()
    }

    /// Returns the route to `destination` only if it is valid.
    pub fn lookup(&self, destination: &str) -> Option<&RouteEntry> {
        self.routes.get(destination).filter(|e| e.valid)
    }

    /// Returns the entry for `destination` regardless of its validity.
    pub fn get(&self, destination: &str) -> Option<&RouteEntry> {
        self.routes.get(destination)
    }

    /// Installs a reverse route, unless a valid route to the same destination already exists.
    /// Returns whether the entry was stored.
    pub fn upsert_reverse(&mut self, entry: RouteEntry) -> bool {
        if self.lookup(&entry.destination).is_some() {
            return false;
        }
        self.routes.insert(entry.destination.clone(), entry);
        true
    }

    /// Installs a forward route, replacing whatever was known about the destination.
    pub fn upsert_forward(&mut self, entry: RouteEntry) {
        self.routes.insert(entry.destination.clone(), entry);
    }

    /// Marks as invalid every route through `next_hop`. Entries are kept.
    /// Returns the number of routes that went from valid to invalid.
    pub fn invalidate_via(&mut self, next_hop: &str) -> usize {
        let mut count = 0;
        for entry in self.routes.values_mut().filter(|e| e.next_hop == next_hop) {
            if entry.valid {
                count += 1;
            }
            entry.valid = false;
        }
        count
    }

    /// Invalidates every valid route whose deadline is at or before `now`.
    /// Returns the destinations of the routes that expired.
    pub fn expire(&mut self, now: u64) -> Vec<String> {
        let mut expired: Vec<String> = self
            .routes
            .values_mut()
            .filter(|e| e.valid && e.expiration_time <= now)
            .map(|e| {
                e.valid = false;
                e.destination.clone()
            })
            .collect();
        expired.sort();
        expired
    }

    /// Number of entries, valid or not.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// All entries, sorted by destination.
    pub fn entries(&self) -> Vec<&RouteEntry> {
        let mut entries: Vec<&RouteEntry> = self.routes.values().collect();
        entries.sort_by(|a, b| a.destination.cmp(&b.destination));
        entries
    }

    /// Writes one log record per entry.
    pub fn log_routes(&self, logger: &Logger) {
        info!(logger, "Route table"; "entries" => self.routes.len());
        for entry in self.entries() {
            info!(
                logger,
                "Route";
                "destination" => &entry.destination,
                "next_hop" => &entry.next_hop,
                "hop_count" => entry.hop_count,
                "sequence_number" => entry.sequence_number,
                "valid" => entry.valid,
                "expiration_time" => entry.expiration_time,
            );
        }
    }
}
