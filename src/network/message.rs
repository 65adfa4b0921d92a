//! Received message
//!
//! One read operation's worth of bytes, its decoded text, and the
//! connection it came from. Not an application-level message boundary.

use std::sync::Arc;

use bytes::Bytes;

use super::connection::Connection;
use crate::error::{Result, WireError};

/// Immutable view of a received payload
#[derive(Debug, Clone)]
pub struct Message {
    payload: Bytes,
    text: String,
    connection: Arc<Connection>,
}

impl Message {
    /// Build a message, decoding `payload` with the connection's codec
    pub fn new(payload: Bytes, connection: Arc<Connection>) -> Self {
        let text = connection.codec().decode(&payload);
        Self {
            payload,
            text,
            connection,
        }
    }

    /// Raw bytes as read from the socket
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload decoded with the session codec
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Originating connection
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Write raw bytes back on the originating socket
    pub fn reply(&self, data: &[u8]) -> Result<()> {
        self.connection.send(data)
    }

    /// Write text back on the originating socket. Blank text is rejected.
    pub fn reply_text(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(WireError::BlankReply);
        }
        self.connection.send_text(text)
    }
}
