/// Single-socket connection handling with request pipelining
///
/// A connection owns one TCP stream. Writes are serialized through the
/// write half; a dedicated reader task owns the read half, feeds bytes to
/// the wire decoder, and resolves pending requests by response-to id. The
/// pending map is the only state shared between the send and receive paths.
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use bson::{doc, Document};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::client::command;
use crate::error::{PuenteError, PuenteResult};
use crate::options::ClientOptions;
use crate::topology::SeedAddress;
use crate::wire::{Command, Reply, WireDecoder};

/// Connection lifecycle states
///
/// `Failed` is terminal for a connection instance; the owning client
/// recovers by constructing a fresh connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Failed = 3,
}

/// Lock-free cell holding a [`ConnectionState`]
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Failed,
        }
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

type PendingMap = Arc<Mutex<HashMap<i32, oneshot::Sender<PuenteResult<Reply>>>>>;

/// A single connection to a MongoDB server
#[derive(Debug)]
pub struct Connection {
    address: SeedAddress,
    state: Arc<StateCell>,
    writer: Arc<AsyncMutex<OwnedWriteHalf>>,
    pending: PendingMap,
    next_request_id: AtomicI32,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Open a socket to the given seed and perform the wire handshake
    ///
    /// Fails with `ConnectionRefused`, `Timeout`, or `HandshakeRejected`.
    pub async fn connect(address: &SeedAddress, options: &ClientOptions) -> PuenteResult<Self> {
        debug!("Connecting to {}", address);

        let attempt = TcpStream::connect((address.host.as_str(), address.port));
        let stream = match timeout(options.connect_timeout(), attempt).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                debug!("Connection refused by {}", address);
                return Err(PuenteError::connection_refused(address.to_string()));
            }
            Ok(Err(e)) => {
                debug!("Network error connecting to {}: {}", address, e);
                return Err(e.into());
            }
            Err(_) => {
                debug!("Timeout connecting to {}", address);
                return Err(PuenteError::timeout(format!("connect to {}", address)));
            }
        };
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let state = Arc::new(StateCell::new(ConnectionState::Connecting));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let writer = Arc::new(AsyncMutex::new(write_half));
        let decoder = WireDecoder::new(options.max_message_size_bytes);
        let reader = tokio::spawn(read_loop(
            read_half,
            decoder,
            Arc::clone(&pending),
            Arc::clone(&state),
            Arc::clone(&writer),
            address.to_string(),
        ));

        let connection = Self {
            address: address.clone(),
            state,
            writer,
            pending,
            next_request_id: AtomicI32::new(0),
            reader: Mutex::new(Some(reader)),
        };

        connection.handshake(options).await?;
        connection.state.store(ConnectionState::Connected);
        debug!("Handshake complete with {}", address);

        Ok(connection)
    }

    /// Exchange the `isMaster` greeting with the server
    async fn handshake(&self, options: &ClientOptions) -> PuenteResult<()> {
        let mut greeting = doc! { "isMaster": 1 };
        if let Some(app_name) = &options.app_name {
            greeting.insert(
                "client",
                doc! { "application": { "name": app_name.clone() } },
            );
        }

        let reply = match self.execute_raw("admin", greeting).await {
            Ok(reply) => reply,
            Err(e) => {
                self.close().await;
                return Err(PuenteError::handshake_rejected(e.to_string()));
            }
        };

        let accepted = reply.documents.first().map(command::document_is_ok) == Some(true);
        if !accepted {
            let message = reply
                .documents
                .first()
                .and_then(|document| document.get_str("errmsg").ok())
                .unwrap_or("server rejected isMaster")
                .to_string();
            self.close().await;
            return Err(PuenteError::handshake_rejected(message));
        }

        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Address of the server this connection talks to
    pub fn address(&self) -> &SeedAddress {
        &self.address
    }

    /// Number of requests awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Send a command document and await the correlated reply
    ///
    /// Multiple calls may be in flight concurrently; each is matched to its
    /// reply by request id. Dropping the returned future abandons the
    /// request without cancelling it on the wire: the entry stays pending
    /// until the reply arrives and is then resolved into nothing.
    pub async fn execute(&self, database: &str, document: Document) -> PuenteResult<Reply> {
        if self.state() != ConnectionState::Connected {
            return Err(PuenteError::NotConnected);
        }
        self.execute_raw(database, document).await
    }

    /// Command execution without the state gate, used by the handshake
    /// while the connection is still `Connecting`
    async fn execute_raw(&self, database: &str, document: Document) -> PuenteResult<Reply> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let command = Command::new(database, document, request_id);
        let bytes = command.encode()?;

        // Register before writing so a fast reply can never race the entry.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request_id, tx);
        trace!(
            "Sending request {} to {} ({} bytes)",
            request_id,
            self.address,
            bytes.len()
        );

        let write_result = {
            let mut writer = self.writer.lock().await;
            writer.write_all(&bytes).await
        };
        if let Err(e) = write_result {
            warn!("Write to {} failed: {}", self.address, e);
            self.pending.lock().unwrap().remove(&request_id);
            self.state.store(ConnectionState::Failed);
            fail_all_pending(&self.pending, || PuenteError::ConnectionLost);
            return Err(PuenteError::WriteError(e));
        }

        match rx.await {
            Ok(result) => result,
            // The reader resolves every pending entry before exiting, so a
            // dropped sender can only mean the connection went away.
            Err(_) => Err(PuenteError::ConnectionLost),
        }
    }

    /// Close the connection and cancel everything still pending
    pub async fn close(&self) {
        debug!("Closing connection to {}", self.address);
        self.state.store(ConnectionState::Disconnected);
        fail_all_pending(&self.pending, || PuenteError::Cancelled);
        if let Some(handle) = self.reader.lock().unwrap().take() {
            handle.abort();
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

/// Reader half of the connection: accumulate bytes, decode frames, dispatch
async fn read_loop(
    mut read_half: OwnedReadHalf,
    decoder: WireDecoder,
    pending: PendingMap,
    state: Arc<StateCell>,
    writer: Arc<AsyncMutex<OwnedWriteHalf>>,
    address: String,
) {
    let mut buf = BytesMut::with_capacity(8192);

    loop {
        loop {
            match decoder.decode(&mut buf) {
                Ok(Some(reply)) => dispatch_reply(&pending, reply, &address),
                Ok(None) => break, // need more data
                Err(e) => {
                    // The byte stream can no longer be trusted.
                    warn!("Connection to {} is corrupt: {}", address, e);
                    abandon(&pending, &state, &writer).await;
                    return;
                }
            }
        }

        match read_half.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("Server {} closed the connection", address);
                abandon(&pending, &state, &writer).await;
                return;
            }
            Ok(n) => trace!("Read {} bytes from {}", n, address),
            Err(e) => {
                warn!("Read from {} failed: {}", address, e);
                abandon(&pending, &state, &writer).await;
                return;
            }
        }
    }
}

/// Resolve the pending request matching a decoded reply
fn dispatch_reply(pending: &PendingMap, reply: Reply, address: &str) {
    let sender = pending.lock().unwrap().remove(&reply.response_to);
    match sender {
        // A failed send means the caller dropped its future; the reply is
        // simply unobserved.
        Some(sender) => {
            let _ = sender.send(Ok(reply));
        }
        None => debug!(
            "Discarding unmatched reply to request {} from {}",
            reply.response_to, address
        ),
    }
}

/// Transition to Failed, fail every pending request, and release the socket
async fn abandon(pending: &PendingMap, state: &StateCell, writer: &AsyncMutex<OwnedWriteHalf>) {
    if state.load() == ConnectionState::Disconnected {
        // close() already resolved pending requests with Cancelled
        return;
    }
    state.store(ConnectionState::Failed);
    fail_all_pending(pending, || PuenteError::ConnectionLost);
    let mut writer = writer.lock().await;
    let _ = writer.shutdown().await;
}

fn fail_all_pending(pending: &PendingMap, mut error: impl FnMut() -> PuenteError) {
    let senders: Vec<_> = pending.lock().unwrap().drain().collect();
    for (_, sender) in senders {
        let _ = sender.send(Err(error()));
    }
}
