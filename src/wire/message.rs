/// Command and reply codec for the MongoDB wire protocol
///
/// Encoding produces a complete framed message in one shot. Decoding is
/// incremental: it operates on a byte buffer accumulated across socket
/// reads and reports "need more data" (`Ok(None)`) until a full frame is
/// buffered, so a reader loop can feed it partial reads without blocking.
use std::io::Cursor;

use bson::Document;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PuenteError, PuenteResult};
use crate::wire::{MessageHeader, HEADER_LEN, MAX_MESSAGE_SIZE, OP_QUERY, OP_REPLY};

/// A command document bound for a database's `$cmd` collection
#[derive(Debug, Clone)]
pub struct Command {
    /// Database the command is scoped to
    pub database: String,
    /// The command document itself, e.g. `{ count: "users" }`
    pub document: Document,
    /// Request id, unique within the issuing connection
    pub request_id: i32,
}

impl Command {
    pub fn new(database: impl Into<String>, document: Document, request_id: i32) -> Self {
        Self {
            database: database.into(),
            document,
            request_id,
        }
    }

    /// Serialize the command as a framed OP_QUERY message
    ///
    /// Layout after the header: flags (i32), full collection name
    /// (cstring, `<db>.$cmd`), number_to_skip (i32), number_to_return
    /// (i32), then the BSON command document.
    pub fn encode(&self) -> PuenteResult<Bytes> {
        if self.database.is_empty() || self.database.contains(['\0', '.']) {
            return Err(PuenteError::malformed(format!(
                "invalid database name: {:?}",
                self.database
            )));
        }

        let mut doc_bytes = Vec::new();
        self.document
            .to_writer(&mut doc_bytes)
            .map_err(|e| PuenteError::malformed(format!("BSON encode failed: {}", e)))?;

        let full_name = format!("{}.$cmd", self.database);
        let message_length = HEADER_LEN + 4 + full_name.len() + 1 + 4 + 4 + doc_bytes.len();

        let mut buf = BytesMut::with_capacity(message_length);
        let header = MessageHeader {
            message_length: message_length as i32,
            request_id: self.request_id,
            response_to: 0,
            op_code: OP_QUERY,
        };
        header.write_to(&mut buf);
        buf.put_i32_le(0); // flags
        buf.put_slice(full_name.as_bytes());
        buf.put_u8(0);
        buf.put_i32_le(0); // number_to_skip
        buf.put_i32_le(1); // number_to_return: commands yield one document
        buf.put_slice(&doc_bytes);

        Ok(buf.freeze())
    }
}

/// A decoded OP_REPLY message
#[derive(Debug, Clone)]
pub struct Reply {
    /// Request id of the command this reply answers
    pub response_to: i32,
    /// Response flag bits
    pub flags: i32,
    /// Cursor id for follow-up getMore requests (always 0 for commands)
    pub cursor_id: i64,
    /// Offset of the first returned document within the cursor
    pub starting_from: i32,
    /// Documents carried by the reply
    pub documents: Vec<Document>,
}

impl Reply {
    /// Whether the server flagged this reply as a query failure
    pub fn is_query_failure(&self) -> bool {
        self.flags & crate::wire::REPLY_QUERY_FAILURE != 0
    }

    /// Serialize the reply as a framed OP_REPLY message
    ///
    /// The client never sends replies; this exists for test doubles that
    /// stand in for a server, and for codec round-trip checks.
    pub fn encode(&self, request_id: i32) -> PuenteResult<Bytes> {
        let mut docs_bytes = Vec::new();
        for document in &self.documents {
            document
                .to_writer(&mut docs_bytes)
                .map_err(|e| PuenteError::malformed(format!("BSON encode failed: {}", e)))?;
        }

        let message_length = HEADER_LEN + 4 + 8 + 4 + 4 + docs_bytes.len();
        let mut buf = BytesMut::with_capacity(message_length);
        let header = MessageHeader {
            message_length: message_length as i32,
            request_id,
            response_to: self.response_to,
            op_code: OP_REPLY,
        };
        header.write_to(&mut buf);
        buf.put_i32_le(self.flags);
        buf.put_i64_le(self.cursor_id);
        buf.put_i32_le(self.starting_from);
        buf.put_i32_le(self.documents.len() as i32);
        buf.put_slice(&docs_bytes);

        Ok(buf.freeze())
    }
}

/// Incremental decoder for server replies
///
/// Stateless apart from its size limit; all buffering lives in the caller's
/// `BytesMut`, which the decoder consumes one whole frame at a time.
#[derive(Debug, Clone, Copy)]
pub struct WireDecoder {
    max_message_size: usize,
}

impl WireDecoder {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Try to decode one reply from the front of the buffer
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a complete
    /// frame; no bytes are consumed in that case. A successfully decoded
    /// frame is removed from the buffer. Errors mean the byte stream can no
    /// longer be trusted and the connection should be torn down.
    pub fn decode(&self, buf: &mut BytesMut) -> PuenteResult<Option<Reply>> {
        if buf.len() < 4 {
            return Ok(None);
        }

        let declared = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if declared < HEADER_LEN as i32 {
            return Err(PuenteError::malformed(format!(
                "declared message length {} below header size",
                declared
            )));
        }
        let declared = declared as usize;
        if declared > self.max_message_size {
            return Err(PuenteError::malformed(format!(
                "declared message length {} exceeds limit {}",
                declared, self.max_message_size
            )));
        }

        if buf.len() < declared {
            // Partial frame, wait for more socket data
            return Ok(None);
        }

        let mut frame = buf.split_to(declared);
        let header = MessageHeader::read_from(&mut frame);
        if header.op_code != OP_REPLY {
            return Err(PuenteError::malformed(format!(
                "unexpected opcode {} from server",
                header.op_code
            )));
        }

        Self::parse_reply_body(header, frame).map(Some)
    }

    fn parse_reply_body(header: MessageHeader, mut frame: BytesMut) -> PuenteResult<Reply> {
        if frame.len() < 20 {
            return Err(PuenteError::malformed("reply body truncated"));
        }

        let flags = frame.get_i32_le();
        let cursor_id = frame.get_i64_le();
        let starting_from = frame.get_i32_le();
        let number_returned = frame.get_i32_le();
        if number_returned < 0 {
            return Err(PuenteError::malformed(format!(
                "negative document count {}",
                number_returned
            )));
        }

        let mut documents = Vec::with_capacity(number_returned as usize);
        for _ in 0..number_returned {
            if frame.len() < 4 {
                return Err(PuenteError::malformed("document length truncated"));
            }
            let doc_len = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
            if doc_len < 5 || doc_len as usize > frame.len() {
                return Err(PuenteError::malformed(format!(
                    "document length {} inconsistent with frame",
                    doc_len
                )));
            }
            let doc_bytes = frame.split_to(doc_len as usize);
            let document = Document::from_reader(&mut Cursor::new(&doc_bytes[..]))
                .map_err(|e| PuenteError::malformed(format!("BSON decode failed: {}", e)))?;
            documents.push(document);
        }

        if !frame.is_empty() {
            return Err(PuenteError::malformed(format!(
                "{} trailing bytes after documents",
                frame.len()
            )));
        }

        Ok(Reply {
            response_to: header.response_to,
            flags,
            cursor_id,
            starting_from,
            documents,
        })
    }
}

impl Default for WireDecoder {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}
