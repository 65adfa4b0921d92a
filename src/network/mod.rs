//! Network Module
//!
//! TCP server and client.
//!
//! ## Architecture
//! - Single acceptor thread per server
//! - Reader thread per connection, or one multiplexed reader
//! - Single liveness monitor thread per server / client
//! - Observers invoked synchronously on the detecting thread

mod acceptor;
mod client;
mod connection;
mod correlator;
mod events;
mod liveness;
mod message;
mod reader;
mod registry;
mod server;
mod session;

pub use client::Client;
pub use connection::{Connection, ConnectionId, ConnectionState, Liveness};
pub use correlator::{PendingReply, ReplySlot};
pub use events::{EventDispatcher, SubscriptionId};
pub use message::Message;
pub use registry::ConnectionRegistry;
pub use server::Server;
