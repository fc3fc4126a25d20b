/// HTTP endpoint paths for the imaged protocol.
pub mod endpoints {
    /// Framed request in, framed reply out.
    pub const RPC: &str = "/v1/rpc";
    pub const HEALTH: &str = "/v1/health";
    pub const INFO: &str = "/v1/info";
    /// `GET /v1/export/{key}/{format}` returns the encoded image.
    pub const EXPORT: &str = "/v1/export";

    /// Content type of framed messages.
    pub const FRAME_CONTENT_TYPE: &str = "application/x-imaged-frame";
}

/// Health check response.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u32,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: super::message::PROTOCOL_VERSION,
        }
    }
}

/// Store summary served at [`endpoints::INFO`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InfoResponse {
    pub root: String,
    pub entries: usize,
    pub locked: usize,
    pub max_message_size: usize,
}
