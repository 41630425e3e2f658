//! Sync Engine
//!
//! Polls the local player on the master, detects what changed and pushes it
//! to the slave. Also hosts the slave's control endpoint.

mod detector;
mod events;
mod session;
mod state;
mod status;

pub use detector::*;
pub use events::*;
pub use session::*;
pub use state::*;
pub use status::*;
