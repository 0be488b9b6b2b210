use std::time::Duration;

use rapace_protocol::{
    CallId, MethodIdType, DEFAULT_MAX_CALL_ID, DEFAULT_MIN_CALL_ID, PROTOCOL_VERSION,
};

/// Construction-time knobs for a [`crate::Dispatcher`] (§2.1 ambient stack:
/// no env vars, no config files — a plain struct passed in by the host
/// application).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Lower bound of the call-ID range advertised to the client.
    pub min_call_id: CallId,
    /// Upper bound of the call-ID range advertised to the client.
    pub max_call_id: CallId,
    /// Bounded queue capacity used for a method's request stream unless the
    /// method overrides it at registration time. `0` = unbounded.
    pub default_request_stream_capacity: usize,
    /// How long, after cancelling every outstanding call task on transport
    /// teardown, the dispatcher waits for them to actually finish (§4.4).
    pub teardown_grace: Duration,
    /// How `method_ref` is negotiated on the wire.
    pub method_id_type: MethodIdType,
    /// The protocol version string sent in the server descriptor.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            min_call_id: DEFAULT_MIN_CALL_ID,
            max_call_id: DEFAULT_MAX_CALL_ID,
            default_request_stream_capacity: 16,
            teardown_grace: Duration::from_secs(10),
            method_id_type: MethodIdType::StrNum,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}
