//! Wire protocol for imaged.
//!
//! Defines the framing, message types, and serialization format used between
//! clients and the imaged server. Messages are bincode-encoded and framed as
//! `[u32 BE length][u8 tag][payload]`; over HTTP one framed request is posted
//! to [`endpoints::RPC`] and answered with one framed reply.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;

pub use codec::{ImagedCodec, FRAME_HEADER_LEN};
pub use endpoint::{endpoints, HealthResponse, InfoResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{codes, EntryInfo, ImagedMessage, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};
