//! Resolvers with fixed answers, recording the policy they were called with.

use std::io;
use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use parking_lot::Mutex;
use wsstream::{AbortPolicy, Resolver};

#[derive(Debug, Default)]
pub struct StaticResolver {
    addrs: Vec<IpAddr>,
    calls: Mutex<Vec<(String, AbortPolicy)>>,
}

impl StaticResolver {
    pub fn new(addrs: Vec<IpAddr>) -> Self {
        Self {
            addrs,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn localhost() -> Self {
        Self::new(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
    }

    pub fn calls(&self) -> Vec<(String, AbortPolicy)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, hostname: &str, policy: AbortPolicy) -> io::Result<Vec<IpAddr>> {
        self.calls.lock().push((hostname.to_string(), policy));
        Ok(self.addrs.clone())
    }
}

#[derive(Debug)]
pub struct FailingResolver;

#[async_trait]
impl Resolver for FailingResolver {
    async fn resolve(&self, hostname: &str, _policy: AbortPolicy) -> io::Result<Vec<IpAddr>> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such host: {hostname}"),
        ))
    }
}
