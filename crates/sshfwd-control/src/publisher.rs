//! Subdomain publishing for HTTP(S) tunnels
//!
//! A web-port tunnel is reachable through a random hostname under the
//! configured root domain. The route lives in the shared [`ProxyRegistry`]
//! for as long as the tunnel is up.

use crate::config::ForwardConfig;
use crate::error::ForwardError;
use rand::Rng;
use sshfwd_proto::Scheme;
use sshfwd_router::{ListenerAddr, ProxyHolder, ProxyRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of subdomain labels
pub trait SubdomainGenerator: Send + Sync {
    /// Generate a label of `len` characters
    fn generate(&self, len: usize) -> String;
}

/// Random lowercase ASCII labels
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSubdomainGenerator;

impl SubdomainGenerator for RandomSubdomainGenerator {
    fn generate(&self, len: usize) -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    }
}

/// Publishes and withdraws hostname routes
pub struct SubdomainPublisher {
    proxies: ProxyRegistry,
    generator: Arc<dyn SubdomainGenerator>,
    label_len: usize,
    root_domain: String,
    attempts: usize,
}

impl SubdomainPublisher {
    pub fn new(
        proxies: ProxyRegistry,
        generator: Arc<dyn SubdomainGenerator>,
        config: &ForwardConfig,
    ) -> Self {
        Self {
            proxies,
            generator,
            label_len: config.domain_len,
            root_domain: config.root_domain.clone(),
            attempts: config.hostname_attempts.max(1),
        }
    }

    /// Full hostname for a label
    pub fn hostname(&self, label: &str) -> String {
        format!("{}.{}", label, self.root_domain).to_lowercase()
    }

    /// Publish a route to `target` under a fresh hostname
    ///
    /// Hostnames already in the route table are never overwritten; a new
    /// label is drawn instead, up to the configured number of attempts.
    pub fn publish(
        &self,
        target: &ListenerAddr,
        scheme: Scheme,
    ) -> Result<ProxyHolder, ForwardError> {
        for attempt in 1..=self.attempts {
            let host = self.hostname(&self.generator.generate(self.label_len));
            let holder = ProxyHolder {
                proxy_host: host.clone(),
                proxy_to: target.to_string(),
                scheme,
            };

            match self.proxies.insert_unique(host.clone(), holder.clone()) {
                Ok(()) => {
                    info!("✅ Published route: {}://{} -> {}", scheme, host, target);
                    return Ok(holder);
                }
                Err(_) => {
                    warn!(
                        "Hostname {} already published (attempt {}/{})",
                        host, attempt, self.attempts
                    );
                }
            }
        }

        Err(ForwardError::HostnameExhausted {
            root_domain: self.root_domain.clone(),
            attempts: self.attempts,
        })
    }

    /// Withdraw a route published by [`SubdomainPublisher::publish`]
    ///
    /// Only removes the entry if it still points at the same target. Returns
    /// whether anything was removed.
    pub fn unpublish(&self, route: &ProxyHolder) -> bool {
        let removed = self
            .proxies
            .remove_if(&route.proxy_host, |current| current.proxy_to == route.proxy_to)
            .is_some();
        if removed {
            info!("🗑️  Unpublished route: {}", route.proxy_host);
        } else {
            debug!("Route {} already withdrawn", route.proxy_host);
        }
        removed
    }
}
