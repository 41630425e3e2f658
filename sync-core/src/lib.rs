//! Pairsync - Core Library
//!
//! Mirrors the playback of one music player (the master) onto another one
//! (the slave) on the same network. The master polls its local player and
//! pushes changes; the slave runs a small control endpoint that drives its
//! own player.

/// Log at `info` when debug logging is switched on in the config, at
/// `debug` otherwise.
macro_rules! sync_log {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            ::tracing::info!($($arg)+)
        } else {
            ::tracing::debug!($($arg)+)
        }
    };
}

pub mod config;
pub mod menu;
pub mod peer;
pub mod player;
pub mod server;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::{ConfigStore, RoleKind, SyncConfig, SyncRole};
pub use player::{Player, PlayerClient};
pub use sync::{ConnectionStatus, SyncCallback, SyncSession};
