use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::method::MethodDescriptor;
use crate::{CallId, DEFAULT_MAX_CALL_ID, DEFAULT_MIN_CALL_ID};

/// How a `method_ref` is encoded in `REQUEST` frames, negotiated once by the
/// server during the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MethodIdType {
    /// Always send the method name as a string.
    Str = 1,
    /// Always send the method's index into `rpc_info`.
    Num = 2,
    /// Either is accepted; the client picks.
    StrNum = 3,
}

impl MethodIdType {
    pub fn prefers_numeric(self) -> bool {
        matches!(self, MethodIdType::Num)
    }

    pub fn allows_numeric(self) -> bool {
        matches!(self, MethodIdType::Num | MethodIdType::StrNum)
    }

    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => MethodIdType::Str,
            2 => MethodIdType::Num,
            3 => MethodIdType::StrNum,
            _ => return None,
        })
    }
}

// Wire value is a plain integer (1/2/3), not the variant name, so this is
// hand-rolled rather than derived.
impl Serialize for MethodIdType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for MethodIdType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        MethodIdType::from_u8(raw)
            .ok_or_else(|| D::Error::custom(format!("unknown method_id_type: {raw}")))
    }
}

/// The one frame the client sends before anything else: `{version: "..."}`.
///
/// Unlike application frames, the handshake is map-shaped on the wire
/// (§6), so this is serialized with `rmp_serde::to_vec_named` /
/// `from_slice` rather than going through [`crate::Frame`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    pub version: String,
}

impl ClientHello {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into() }
    }

    pub fn encode(&self) -> Vec<u8> {
        rmp_serde::to_vec_named(self).expect("ClientHello always serializes")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// The server's reply to a version-compatible hello:
/// `{version, method_id_type, rpc_info, min_msgid?, max_msgid?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub version: String,
    pub method_id_type: MethodIdType,
    pub rpc_info: Vec<MethodDescriptor>,
    #[serde(default = "default_min_call_id")]
    pub min_msgid: CallId,
    #[serde(default = "default_max_call_id")]
    pub max_msgid: CallId,
}

fn default_min_call_id() -> CallId {
    DEFAULT_MIN_CALL_ID
}

fn default_max_call_id() -> CallId {
    DEFAULT_MAX_CALL_ID
}

impl ServerDescriptor {
    pub fn encode(&self) -> Vec<u8> {
        rmp_serde::to_vec_named(self).expect("ServerDescriptor always serializes")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// The server's reply on a version mismatch: `{error: "..."}`, sent instead
/// of a [`ServerDescriptor`] right before the server closes the connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeError {
    pub error: String,
}

impl HandshakeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }

    pub fn encode(&self) -> Vec<u8> {
        rmp_serde::to_vec_named(self).expect("HandshakeError always serializes")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_round_trips() {
        let hello = ClientHello::new("1.0.0");
        let back = ClientHello::decode(&hello.encode()).unwrap();
        assert_eq!(hello, back);
    }

    #[test]
    fn server_descriptor_round_trips() {
        let desc = ServerDescriptor {
            version: "1.0.0".into(),
            method_id_type: MethodIdType::StrNum,
            rpc_info: vec![MethodDescriptor::new("div(a, b)", "", false, false)],
            min_msgid: 1,
            max_msgid: 65535,
        };
        let back = ServerDescriptor::decode(&desc.encode()).unwrap();
        assert_eq!(desc, back);
    }

    #[test]
    fn server_descriptor_defaults_msgid_range_when_absent() {
        // A minimal map without min_msgid/max_msgid should still decode.
        #[derive(Serialize)]
        struct Minimal {
            version: String,
            method_id_type: MethodIdType,
            rpc_info: Vec<MethodDescriptor>,
        }
        let bytes = rmp_serde::to_vec_named(&Minimal {
            version: "1.0.0".into(),
            method_id_type: MethodIdType::Str,
            rpc_info: vec![],
        })
        .unwrap();
        let desc = ServerDescriptor::decode(&bytes).unwrap();
        assert_eq!(desc.min_msgid, DEFAULT_MIN_CALL_ID);
        assert_eq!(desc.max_msgid, DEFAULT_MAX_CALL_ID);
    }

    #[test]
    fn handshake_error_round_trips() {
        let err = HandshakeError::new("Incompatible version, server: 2.0.0");
        let back = HandshakeError::decode(&err.encode()).unwrap();
        assert_eq!(err, back);
    }
}
