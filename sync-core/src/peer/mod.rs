//! Master-to-slave communication
//!
//! The wire contract both sides share, the transport seam and the retrying
//! client the master uses.

mod client;
mod protocol;
mod transport;

pub use client::{AttemptError, PeerClient, PeerError, RetryPolicy};
pub use protocol::*;
pub use transport::{HttpTransport, PeerRequest, PeerResponse, Transport, TransportError};
