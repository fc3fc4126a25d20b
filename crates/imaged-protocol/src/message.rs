use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Metadata of one stored entry as reported over the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub key: String,
    pub width: u64,
    pub height: u64,
    pub channels: u8,
    /// Color space name, e.g. `rgb` or `lab`.
    pub color: String,
    /// Sample type name, e.g. `u8` or `f32`.
    pub ty: String,
}

/// All message types in the imaged protocol.
///
/// Requests carry store operations; each is answered by exactly one reply,
/// either the matching response or [`Error`](Self::Error).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ImagedMessage {
    Hello { version: u32 },
    HelloAck { version: u32, server: String },
    /// Create a zero-filled entry. `channels` is 1..=4, `ty` a type name.
    Set { key: String, width: u64, height: u64, channels: u8, ty: String },
    GetMeta { key: String },
    List,
    Remove { key: String },
    RemoveAll,
    GetPixel { key: String, x: u64, y: u64 },
    /// One component is broadcast to R, G and B; one or three components
    /// get alpha `1.0`; four are used as given.
    SetPixel { key: String, x: u64, y: u64, components: Vec<f32> },
    Export { key: String, format: String },
    Ok,
    Meta(EntryInfo),
    Listing { entries: Vec<EntryInfo> },
    Pixel { data: [f32; 4] },
    Removed { count: u64 },
    Exported { format: String, data: Vec<u8> },
    Error { code: u32, message: String },
}

impl ImagedMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Hello { .. } => 1,
            Self::HelloAck { .. } => 2,
            Self::Set { .. } => 3,
            Self::GetMeta { .. } => 4,
            Self::List => 5,
            Self::Remove { .. } => 6,
            Self::RemoveAll => 7,
            Self::GetPixel { .. } => 8,
            Self::SetPixel { .. } => 9,
            Self::Export { .. } => 10,
            Self::Ok => 64,
            Self::Meta(_) => 65,
            Self::Listing { .. } => 66,
            Self::Pixel { .. } => 67,
            Self::Removed { .. } => 68,
            Self::Exported { .. } => 69,
            Self::Error { .. } => 255,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "Hello",
            Self::HelloAck { .. } => "HelloAck",
            Self::Set { .. } => "Set",
            Self::GetMeta { .. } => "GetMeta",
            Self::List => "List",
            Self::Remove { .. } => "Remove",
            Self::RemoveAll => "RemoveAll",
            Self::GetPixel { .. } => "GetPixel",
            Self::SetPixel { .. } => "SetPixel",
            Self::Export { .. } => "Export",
            Self::Ok => "Ok",
            Self::Meta(_) => "Meta",
            Self::Listing { .. } => "Listing",
            Self::Pixel { .. } => "Pixel",
            Self::Removed { .. } => "Removed",
            Self::Exported { .. } => "Exported",
            Self::Error { .. } => "Error",
        }
    }

    /// Whether this message is sent by clients.
    pub fn is_request(&self) -> bool {
        self.type_tag() < 64
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into() }
    }

    /// Turn an `Error` reply into `Err(RemoteError)`.
    pub fn into_result(self) -> ProtocolResult<Self> {
        match self {
            Self::Error { code, message } => Err(ProtocolError::RemoteError { code, message }),
            other => Ok(other),
        }
    }

    /// Expand `SetPixel` components into an RGBA value. `None` for counts
    /// other than 1, 3 or 4.
    pub fn rgba_from_components(components: &[f32]) -> Option<[f32; 4]> {
        match *components {
            [v] => Some([v, v, v, 1.0]),
            [r, g, b] => Some([r, g, b, 1.0]),
            [r, g, b, a] => Some([r, g, b, a]),
            _ => None,
        }
    }
}

/// Error codes carried by [`ImagedMessage::Error`].
pub mod codes {
    /// Malformed request: bad key, metadata, type name, or pixel arity.
    pub const BAD_REQUEST: u32 = 400;
    pub const NOT_FOUND: u32 = 404;
    /// The key already exists.
    pub const CONFLICT: u32 = 409;
    /// Pixel coordinate outside the image.
    pub const OUT_OF_RANGE: u32 = 416;
    /// The codec cannot produce or read the requested format.
    pub const UNSUPPORTED: u32 = 415;
    /// Another handle holds the key's lock. Safe to retry.
    pub const LOCKED: u32 = 423;
    pub const INTERNAL: u32 = 500;
    /// The store is closed.
    pub const UNAVAILABLE: u32 = 503;
}
