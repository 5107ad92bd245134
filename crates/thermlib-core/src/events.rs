//! Asynchronous device event types.
//!
//! Events are emitted by sensor drivers through a `tokio::sync::broadcast`
//! channel. They are diagnostic only: frames travel on their own channel, and
//! a slow subscriber may miss events without affecting acquisition.

use std::fmt;

use crate::types::ConnectionState;

/// Why a received buffer was not turned into a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Buffer length differs from the packet length.
    BadLength,
    /// First two bytes are not the packet header.
    BadHeader,
    /// Decoded fine, but the consumer had not taken the previous frame.
    Overrun,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::BadLength => "bad length",
            DropReason::BadHeader => "bad header",
            DropReason::Overrun => "consumer overrun",
        };
        write!(f, "{s}")
    }
}

/// An event emitted by a sensor driver.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The connection state changed.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The transport opened successfully.
    Connected {
        /// Port path that was opened.
        port: String,
    },

    /// Opening the transport failed; it will be retried.
    OpenRetry {
        /// Failed attempts so far in this session (1-based).
        attempt: u32,
    },

    /// A configuration command was written to the transport.
    CommandSent {
        /// The raw command frame.
        command: [u8; 4],
    },

    /// A received buffer was discarded.
    FrameDropped {
        reason: DropReason,
        /// Length of the discarded buffer.
        len: usize,
    },

    /// The session ended and the transport was closed.
    Disconnected,
}
