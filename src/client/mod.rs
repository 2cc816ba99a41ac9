/// Client lifecycle and seed-list connect policy
///
/// A client owns at most one active connection. `connect()` walks the seed
/// list in insertion order and keeps the first connection that completes a
/// handshake; only after every seed has failed does the attempt surface as
/// `NoReachableSeed`.
pub(crate) mod command;
pub mod connection;
pub mod handles;

use std::sync::{Arc, Mutex};

use bson::doc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{PuenteError, PuenteResult};
use crate::options::ClientOptions;
use crate::topology::SeedList;

pub use connection::{Connection, ConnectionState};
pub use handles::{Collection, Database};

/// Top-level handle to a MongoDB deployment
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    options: ClientOptions,
    seeds: Mutex<SeedList>,
    connection: RwLock<Option<Arc<Connection>>>,
}

impl Client {
    /// Create a client with default options and an empty seed list
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClientInner {
                options: ClientOptions::default(),
                seeds: Mutex::new(SeedList::new()),
                connection: RwLock::new(None),
            }),
        }
    }

    /// Create a client with explicit options
    pub fn with_options(options: ClientOptions) -> PuenteResult<Self> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                options,
                seeds: Mutex::new(SeedList::new()),
                connection: RwLock::new(None),
            }),
        })
    }

    /// Create a client seeded from a `mongodb://` connection URI
    ///
    /// The URI and explicit `add_seed` calls feed the same seed list, so
    /// both construction styles behave identically from here on.
    pub fn with_uri_str(uri: &str) -> PuenteResult<Self> {
        let seeds = SeedList::from_uri(uri)?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                options: ClientOptions::default(),
                seeds: Mutex::new(seeds),
                connection: RwLock::new(None),
            }),
        })
    }

    /// Add a server address to try on connect
    ///
    /// Returns false when an identical host/port was already present.
    pub fn add_seed(&self, host: impl Into<String>, port: u16) -> bool {
        self.inner.seeds.lock().unwrap().add(host, port)
    }

    /// Number of distinct seeds currently known
    pub fn seed_count(&self) -> usize {
        self.inner.seeds.lock().unwrap().len()
    }

    /// Connect to the first reachable seed
    ///
    /// Any previously held connection is closed first; reconnecting
    /// replaces it. Failures against individual seeds are logged and the
    /// next seed is tried; only exhaustion of the whole list is an error.
    pub async fn connect(&self) -> PuenteResult<()> {
        let seeds = self.inner.seeds.lock().unwrap().snapshot();

        let previous = self.inner.connection.write().await.take();
        if let Some(previous) = previous {
            previous.close().await;
        }

        for seed in &seeds {
            match Connection::connect(seed, &self.inner.options).await {
                Ok(connection) => {
                    info!("Connected to {}", seed);
                    *self.inner.connection.write().await = Some(Arc::new(connection));
                    return Ok(());
                }
                Err(e) => {
                    warn!("Seed {} failed: {}", seed, e);
                }
            }
        }

        Err(PuenteError::NoReachableSeed {
            attempted: seeds.len(),
        })
    }

    /// Get a handle to a named database
    pub fn get_database(&self, name: impl Into<String>) -> Database {
        Database::new(self.clone(), name)
    }

    /// Round-trip a `ping` command to verify the connection
    pub async fn ping(&self) -> PuenteResult<()> {
        self.get_database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
    }

    /// Whether an established connection is currently held
    pub async fn is_connected(&self) -> bool {
        match self.inner.connection.read().await.as_ref() {
            Some(connection) => connection.state() == ConnectionState::Connected,
            None => false,
        }
    }

    /// Close the underlying connection, if any
    ///
    /// Requests still in flight resolve with `Cancelled`.
    pub async fn close(&self) {
        let connection = self.inner.connection.write().await.take();
        if let Some(connection) = connection {
            connection.close().await;
        }
    }

    pub(crate) async fn connection(&self) -> PuenteResult<Arc<Connection>> {
        self.inner
            .connection
            .read()
            .await
            .clone()
            .ok_or(PuenteError::NotConnected)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
