//! Gateway core: client registry, per-connection protocol engine, broadcast
//! pipeline, and the keep-alive loop.
//!
//! Lifecycle:
//! 1. Resolve config and DB credentials
//! 2. Connect the store
//! 3. Bind the listener, spawn the keep-alive tick
//! 4. One reader task + one writer task per accepted connection
//!
//! Persistence lives behind the `loquat-store` traits; framing and envelope
//! shapes live in `loquat-protocol`.

pub mod broadcast;
pub mod dispatch;
pub mod keepalive;
pub mod server;
pub mod state;
pub mod ws;
