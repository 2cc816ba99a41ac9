/// In-process stand-ins for a MongoDB server, used by unit tests
///
/// The mock understands just enough OP_QUERY to answer the handshake and a
/// `count` command; anything fancier is scripted per behavior.
use bson::{doc, Document};
use bytes::{Buf, BytesMut};
use std::io::Cursor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::wire::{MessageHeader, Reply, HEADER_LEN, OP_QUERY};

/// Install the env-filtered subscriber so `RUST_LOG` works under tests
///
/// Only the first call wins; later calls (one per test) are no-ops.
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the mock reacts to commands after the handshake
#[derive(Debug, Clone)]
pub(crate) enum MockBehavior {
    /// Answer the handshake; `count` commands yield this value, `ping` and
    /// anything else get a bare `ok`
    Count(f64),
    /// Answer the handshake; every later command gets an `ok: 0` error reply
    CommandError { code: i32, message: String },
    /// Reply to the handshake itself with `ok: 0`
    RejectHandshake,
    /// Answer the handshake, read this many commands without replying, then
    /// drop the socket
    DropAfter { swallow: usize },
    /// Answer the handshake, then respond to the next command with bytes
    /// that are not a wire-protocol frame
    Garbage,
}

/// A scripted single-connection MongoDB server on an ephemeral port
pub(crate) struct MockServer {
    port: u16,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn start(behavior: MockBehavior) -> Self {
        init_test_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, behavior).await;
                });
            }
        });

        Self { port, handle }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(mut stream: TcpStream, behavior: MockBehavior) -> std::io::Result<()> {
    // Handshake first: every behavior except RejectHandshake accepts it.
    let (greeting_id, _) = read_command(&mut stream).await?;
    match behavior {
        MockBehavior::RejectHandshake => {
            write_reply(
                &mut stream,
                greeting_id,
                doc! { "ok": 0.0, "errmsg": "unauthorized" },
            )
            .await?;
            return Ok(());
        }
        _ => {
            write_reply(
                &mut stream,
                greeting_id,
                doc! { "ismaster": true, "maxMessageSizeBytes": 48_000_000_i32, "ok": 1.0 },
            )
            .await?;
        }
    }

    match behavior {
        MockBehavior::Count(count) => loop {
            let (request_id, document) = read_command(&mut stream).await?;
            let response = if document.get("count").is_some() {
                doc! { "n": count, "ok": 1.0 }
            } else {
                doc! { "ok": 1.0 }
            };
            write_reply(&mut stream, request_id, response).await?;
        },
        MockBehavior::CommandError { code, message } => loop {
            let (request_id, _) = read_command(&mut stream).await?;
            write_reply(
                &mut stream,
                request_id,
                doc! { "ok": 0.0, "code": code, "errmsg": message.clone() },
            )
            .await?;
        },
        MockBehavior::DropAfter { swallow } => {
            for _ in 0..swallow {
                let _ = read_command(&mut stream).await?;
            }
            // Dropping the stream closes the socket with requests pending.
            Ok(())
        }
        MockBehavior::Garbage => {
            let _ = read_command(&mut stream).await?;
            stream.write_all(&[0xDE; 64]).await?;
            stream.flush().await?;
            // Keep the socket open so the client sees garbage, not EOF.
            let mut sink = [0u8; 256];
            while stream.read(&mut sink).await? > 0 {}
            Ok(())
        }
        MockBehavior::RejectHandshake => unreachable!(),
    }
}

/// Read one OP_QUERY command, returning its request id and document
pub(crate) async fn read_command(stream: &mut TcpStream) -> std::io::Result<(i32, Document)> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let message_length = i32::from_le_bytes(len_bytes) as usize;
    assert!(message_length >= HEADER_LEN, "frame shorter than header");

    let mut rest = vec![0u8; message_length - 4];
    stream.read_exact(&mut rest).await?;

    let mut frame = BytesMut::with_capacity(message_length);
    frame.extend_from_slice(&len_bytes);
    frame.extend_from_slice(&rest);

    let header = MessageHeader::read_from(&mut frame);
    assert_eq!(header.op_code, OP_QUERY, "client must send OP_QUERY");

    frame.advance(4); // flags
    let name_end = frame
        .iter()
        .position(|&b| b == 0)
        .expect("collection name must be NUL-terminated");
    frame.advance(name_end + 1);
    frame.advance(8); // number_to_skip + number_to_return

    let document = Document::from_reader(&mut Cursor::new(&frame[..])).expect("valid BSON");
    Ok((header.request_id, document))
}

/// Send an OP_REPLY carrying a single document
pub(crate) async fn write_reply(
    stream: &mut TcpStream,
    response_to: i32,
    document: Document,
) -> std::io::Result<()> {
    let reply = Reply {
        response_to,
        flags: 0,
        cursor_id: 0,
        starting_from: 0,
        documents: vec![document],
    };
    let bytes = reply.encode(0).expect("reply encodes");
    stream.write_all(&bytes).await?;
    stream.flush().await
}
