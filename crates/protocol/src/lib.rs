//! Wire protocol: RFC 6455 framing, the HTTP upgrade handshake, and the JSON
//! envelopes exchanged over text frames.
//!
//! All application semantics live in the envelopes; `frame` and `handshake`
//! are transport plumbing shared by the gateway and its tests.

pub mod envelope;
pub mod frame;
pub mod handshake;

/// Default TCP port the gateway listens on.
pub const DEFAULT_PORT: u16 = 8090;

/// Seconds between application-level `ping` envelopes.
pub const PING_INTERVAL_SECS: u64 = 3;

/// Seconds of liveness silence after which a client is evicted.
pub const PONG_TIMEOUT_SECS: u64 = 3;
