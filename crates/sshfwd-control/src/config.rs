//! Forwarding configuration
//!
//! Owned by the process entry point; it can be flattened into a clap parser
//! or deserialized from a config file.

use clap::Args;
use serde::Deserialize;
use std::path::PathBuf;

/// Settings consumed by the remote forwarding core
#[derive(Debug, Clone, Args, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Length of the random label of generated HTTP(S) hostnames
    #[arg(long, env = "SSHFWD_DOMAIN_LEN", default_value_t = 3)]
    pub domain_len: usize,

    /// Root domain appended to generated hostnames: {label}.{root_domain}
    #[arg(long, env = "SSHFWD_ROOT_DOMAIN", default_value = "localhost")]
    pub root_domain: String,

    /// Capacity of each session's status message buffer; messages beyond it are dropped
    #[arg(long, default_value_t = 64)]
    pub message_buffer: usize,

    /// Fresh labels to try when a generated hostname is already published
    #[arg(long, default_value_t = 5)]
    pub hostname_attempts: usize,

    /// Directory for HTTP(S) rendezvous sockets (defaults to the OS temp dir)
    #[arg(long)]
    pub socket_dir: Option<PathBuf>,

    /// Positively acknowledge successful tcpip-forward requests
    #[arg(long)]
    pub ack_success: bool,
}

impl ForwardConfig {
    /// Directory rendezvous sockets are created in
    pub fn socket_dir(&self) -> PathBuf {
        self.socket_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            domain_len: 3,
            root_domain: "localhost".to_string(),
            message_buffer: 64,
            hostname_attempts: 5,
            socket_dir: None,
            ack_success: false,
        }
    }
}
