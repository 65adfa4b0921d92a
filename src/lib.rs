//! # linkwire
//!
//! Bidirectional TCP messaging:
//! - A server that accepts and manages many concurrent client connections
//! - A client that owns exactly one socket to such a server
//! - Asynchronous "data received" notifications on both sides
//! - Best-effort synchronous request/reply (`write_and_wait`)
//! - Liveness polling to detect peers that vanished without a clean close
//!
//! There is no framing: each delivered message is one read's worth of bytes,
//! at most `packet_size` long.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Server                                  │
//! │   Acceptor ──admit──▶ ConnectionRegistry ◀──probe── Liveness │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one per connection (or one multiplexed)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Reader                                  │
//! │            trim ─▶ ReplySlot? ─▶ EventDispatcher             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ write_and_  │          │  Observers  │
//!   │    wait     │          │  (Message)  │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod codec;

pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{WireError, Result};
pub use config::{Config, ReadMode};
pub use codec::TextCodec;
pub use network::{Client, Connection, ConnectionId, ConnectionState, Message, Server};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of linkwire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
