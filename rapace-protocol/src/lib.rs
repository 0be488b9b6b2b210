//! Wire-level types for the rapace RPC protocol.
//!
//! Everything in this crate is pure data: frame kinds, the frame codec, the
//! handshake records and the method descriptor shape. None of it knows about
//! call registries, queues or dispatch — that lives in `rapace-core`,
//! `rapace-server` and `rapace-client`.

mod codec;
mod frame;
mod handshake;
mod method;

pub use codec::{DecodeError, FrameDecoder};
pub use frame::{Frame, MethodRef, MsgKind};
pub use handshake::{HandshakeError, ClientHello, MethodIdType, ServerDescriptor};
pub use method::MethodDescriptor;

/// Re-exported so downstream crates never need to depend on `rmpv` directly
/// to name the payload type.
pub use rmpv::Value;

/// Call identifier ("msgid" in the reference implementation).
pub type CallId = u32;

/// `0` is reserved and never allocated to a call.
pub const RESERVED_CALL_ID: CallId = 0;

/// Default lower bound of the allocatable call-ID range.
pub const DEFAULT_MIN_CALL_ID: CallId = 1;

/// Default upper bound of the allocatable call-ID range.
pub const DEFAULT_MAX_CALL_ID: CallId = 65535;

/// Major version of the protocol carried in the handshake. Only the major
/// component is compared, mirroring the reference implementation.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Returns the major component of a dotted version string, e.g. `"1.2.3"` -> `"1"`.
pub fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_splits_on_dot() {
        assert_eq!(major_version("1.2.3"), "1");
        assert_eq!(major_version("2.0.0"), "2");
        assert_eq!(major_version("7"), "7");
    }
}
