/// Puente - A minimal asynchronous MongoDB wire-protocol client
///
/// Puente speaks just enough of the MongoDB wire protocol to connect to a
/// server from a seed list or URI, run commands, and count documents:
/// 1. Wire codec: OP_QUERY/OP_REPLY framing around BSON documents, with
///    incremental decoding across partial socket reads
/// 2. Connection: one socket, one reader task, pipelined requests
///    correlated by request id
/// 3. Client: seed-list connect policy and cheap database/collection
///    handles
///
/// Requests are futures; dropping one abandons the result without tearing
/// down the connection, and closing the client resolves everything still
/// pending with `Cancelled`.
pub mod client;
pub mod error;
pub mod options;
pub mod topology;
pub mod wire;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{Client, Collection, Connection, ConnectionState, Database};
pub use error::{PuenteError, PuenteResult};
pub use options::ClientOptions;
pub use topology::{SeedAddress, SeedList};
