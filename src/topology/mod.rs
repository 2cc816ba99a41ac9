/// Seed list management and connect-attempt ordering
///
/// A seed is a server address the client may try before any topology
/// discovery has happened. Seeds are kept in insertion order, and a connect
/// attempt walks them in that order until one accepts; exhausting the list
/// surfaces as `NoReachableSeed` at the client level.
use std::fmt;

use crate::error::{PuenteError, PuenteResult};

/// Default MongoDB port, used when a URI omits one
pub const DEFAULT_PORT: u16 = 27017;

/// A candidate server address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeedAddress {
    pub host: String,
    pub port: u16,
}

impl SeedAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for SeedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Insertion-ordered, duplicate-free set of seed addresses
#[derive(Debug, Clone, Default)]
pub struct SeedList {
    seeds: Vec<SeedAddress>,
}

impl SeedList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a seed list from a `mongodb://` connection URI
    ///
    /// Accepted shape: `mongodb://host[:port][,host[:port]...][/db]`.
    /// Credentials, query options, and `mongodb+srv` lookups are not
    /// supported.
    pub fn from_uri(uri: &str) -> PuenteResult<Self> {
        let rest = uri
            .strip_prefix("mongodb://")
            .ok_or_else(|| PuenteError::InvalidUri(format!("missing mongodb:// scheme: {}", uri)))?;

        // Anything after the first '/' names a database; the seed list does
        // not care about it.
        let hosts = rest.split('/').next().unwrap_or("");
        if hosts.is_empty() {
            return Err(PuenteError::InvalidUri(format!("no hosts in URI: {}", uri)));
        }

        let mut list = Self::new();
        for entry in hosts.split(',') {
            let (host, port) = match entry.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port.parse::<u16>().map_err(|_| {
                        PuenteError::InvalidUri(format!("invalid port in {:?}", entry))
                    })?;
                    (host, port)
                }
                None => (entry, DEFAULT_PORT),
            };
            if host.is_empty() {
                return Err(PuenteError::InvalidUri(format!("empty host in {:?}", entry)));
            }
            list.add(host, port);
        }

        Ok(list)
    }

    /// Add a seed; returns false if an identical host/port is already listed
    pub fn add(&mut self, host: impl Into<String>, port: u16) -> bool {
        let seed = SeedAddress::new(host, port);
        if self.seeds.contains(&seed) {
            return false;
        }
        self.seeds.push(seed);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// Seeds in connect-attempt order
    pub fn iter(&self) -> impl Iterator<Item = &SeedAddress> {
        self.seeds.iter()
    }

    /// Snapshot of the current seeds in connect-attempt order
    pub fn snapshot(&self) -> Vec<SeedAddress> {
        self.seeds.clone()
    }
}
