/// MongoDB wire-protocol framing
///
/// Every message starts with a 16-byte little-endian header: total message
/// length (including the length field itself), request id, response-to id,
/// and opcode. The opcode-specific payload follows. Commands are issued as
/// legacy OP_QUERY messages against the `$cmd` pseudo-collection; the server
/// answers with OP_REPLY.
pub mod message;

use bytes::{Buf, BufMut, BytesMut};

pub use message::{Command, Reply, WireDecoder};

/// Server reply to a query or command
pub const OP_REPLY: i32 = 1;
/// Legacy query message, also the carrier for command execution
pub const OP_QUERY: i32 = 2004;

/// Size of the standard message header in bytes
pub const HEADER_LEN: usize = 16;

/// Upper bound on a single wire message; frames declaring more than this
/// are treated as malformed rather than buffered
pub const MAX_MESSAGE_SIZE: usize = 48 * 1024 * 1024;

/// Reply flag: the cursor id in a getMore was not known to the server
pub const REPLY_CURSOR_NOT_FOUND: i32 = 1 << 0;
/// Reply flag: the query failed; the single document carries `$err`
pub const REPLY_QUERY_FAILURE: i32 = 1 << 1;

/// Standard header prefixed to every wire-protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

impl MessageHeader {
    /// Append the header to a buffer in wire order
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.message_length);
        buf.put_i32_le(self.request_id);
        buf.put_i32_le(self.response_to);
        buf.put_i32_le(self.op_code);
    }

    /// Consume a header from the front of a buffer
    ///
    /// The caller must have verified that at least [`HEADER_LEN`] bytes are
    /// available.
    pub fn read_from(buf: &mut BytesMut) -> Self {
        Self {
            message_length: buf.get_i32_le(),
            request_id: buf.get_i32_le(),
            response_to: buf.get_i32_le(),
            op_code: buf.get_i32_le(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = MessageHeader {
            message_length: 58,
            request_id: 7,
            response_to: 0,
            op_code: OP_QUERY,
        };

        let mut buf = BytesMut::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);

        let decoded = MessageHeader::read_from(&mut buf);
        assert_eq!(decoded, header);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_wire_order_is_little_endian() {
        let header = MessageHeader {
            message_length: 0x0102_0304,
            request_id: 1,
            response_to: 0,
            op_code: OP_REPLY,
        };

        let mut buf = BytesMut::new();
        header.write_to(&mut buf);
        assert_eq!(&buf[..4], &[0x04, 0x03, 0x02, 0x01]);
    }
}
