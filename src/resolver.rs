//! Hostname resolution.
//!
//! The stream only needs a list of addresses for a hostname, so resolution is
//! a small object-safe trait. [`GaiResolver`] is the default, backed by the
//! system resolver through [`tokio::net::lookup_host`].

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use tokio::sync::watch;

/// What happens to an outstanding lookup when its resolver shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AbortPolicy {
    /// Fail the lookup with [`io::ErrorKind::Interrupted`].
    #[default]
    AbortOnShutdown,
    /// Let the lookup finish regardless.
    RunToCompletion,
}

/// Resolves a hostname to IP addresses.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `hostname`.
    ///
    /// A successful result must contain at least one address. Callers treat
    /// an empty list as a failed lookup.
    async fn resolve(&self, hostname: &str, policy: AbortPolicy) -> io::Result<Vec<IpAddr>>;
}

/// System resolver (getaddrinfo via tokio).
#[derive(Debug)]
pub struct GaiResolver {
    shutdown: watch::Sender<bool>,
}

impl Default for GaiResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl GaiResolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shutdown: watch::Sender::new(false),
        }
    }

    /// Fail every outstanding and future [`AbortPolicy::AbortOnShutdown`] lookup.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn lookup(hostname: &str) -> io::Result<Vec<IpAddr>> {
        let mut addrs: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((hostname, 0)).await? {
            if !addrs.contains(&addr.ip()) {
                addrs.push(addr.ip());
            }
        }
        Ok(addrs)
    }
}

/// Completes once `shutdown` flips to `true`; never completes otherwise.
async fn shut_down(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn interrupted() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "resolver shut down")
}

#[async_trait]
impl Resolver for GaiResolver {
    async fn resolve(&self, hostname: &str, policy: AbortPolicy) -> io::Result<Vec<IpAddr>> {
        tracing::trace!(%hostname, ?policy, "dns resolution starting");
        match policy {
            AbortPolicy::RunToCompletion => Self::lookup(hostname).await,
            AbortPolicy::AbortOnShutdown => {
                if self.is_shut_down() {
                    return Err(interrupted());
                }
                tokio::select! {
                    result = Self::lookup(hostname) => result,
                    () = shut_down(self.shutdown.subscribe()) => Err(interrupted()),
                }
            }
        }
    }
}
