use std::fmt;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Metadata describing one registered method, as carried in the handshake's
/// `rpc_info` catalog.
///
/// Always the four-element array `[signature, docstring,
/// has_request_stream, has_response_stream]` on the wire (§6), whether
/// encoded standalone or nested inside [`crate::ServerDescriptor`]. A plain
/// `#[derive(Serialize)]` would instead emit a map when the surrounding
/// `rmp_serde::Serializer` is in `to_vec_named` mode (as `ServerDescriptor`'s
/// is), since that mode applies recursively to every nested struct; the
/// manual impls below serialize as a tuple regardless of the outer
/// serializer's configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub signature: String,
    pub docstring: String,
    pub has_request_stream: bool,
    pub has_response_stream: bool,
}

impl MethodDescriptor {
    pub fn new(
        signature: impl Into<String>,
        docstring: impl Into<String>,
        has_request_stream: bool,
        has_response_stream: bool,
    ) -> Self {
        Self {
            signature: signature.into(),
            docstring: docstring.into(),
            has_request_stream,
            has_response_stream,
        }
    }
}

impl Serialize for MethodDescriptor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(4)?;
        tup.serialize_element(&self.signature)?;
        tup.serialize_element(&self.docstring)?;
        tup.serialize_element(&self.has_request_stream)?;
        tup.serialize_element(&self.has_response_stream)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for MethodDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MethodDescriptorVisitor;

        impl<'de> Visitor<'de> for MethodDescriptorVisitor {
            type Value = MethodDescriptor;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 4-element [signature, docstring, has_request_stream, has_response_stream] array")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let signature = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let docstring = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                let has_request_stream = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(2, &self))?;
                let has_response_stream = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(3, &self))?;
                Ok(MethodDescriptor {
                    signature,
                    docstring,
                    has_request_stream,
                    has_response_stream,
                })
            }
        }

        deserializer.deserialize_tuple(4, MethodDescriptorVisitor)
    }
}
