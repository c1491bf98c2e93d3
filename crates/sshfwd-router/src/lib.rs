//! Shared registries for remote forwarding
//!
//! Process-wide maps of live listeners and published HTTP routes, plus the
//! per-session listener mirror. All of them are safe to mutate from any
//! number of tunnel tasks at once.

pub mod listener;
pub mod proxy;
pub mod registry;

pub use listener::{ListenerAddr, ListenerHandle};
pub use proxy::ProxyHolder;
pub use registry::{Registry, RegistryError};

use std::sync::Arc;

/// Listener address -> live listener, used both process-wide and per session
pub type ListenerRegistry = Registry<ListenerAddr, Arc<ListenerHandle>>;

/// Hostname -> HTTP route consulted by the reverse proxy
pub type ProxyRegistry = Registry<String, ProxyHolder>;
