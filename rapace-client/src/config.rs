use rapace_protocol::PROTOCOL_VERSION;

/// Construction-time knobs for a [`crate::Client`] (§2.1: a plain struct,
/// no env vars, no config files — the core is a library).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// The protocol version string sent as the client hello.
    pub version: String,
    /// Bounded queue capacity used for a call's response stream unless the
    /// caller supplies their own queue. `0` = unbounded.
    pub default_response_stream_capacity: usize,
    /// Whether to prefer the numeric method-ID encoding when the server's
    /// negotiated `method_id_type` is `StrNum` (either is accepted).
    pub prefer_numeric_method_ref: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            default_response_stream_capacity: 16,
            prefer_numeric_method_ref: false,
        }
    }
}
