use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::Resolver;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

/// Best-effort reverse resolver for responding hops.
///
/// The engine loop is blocking, so lookups are synchronous; results are
/// cached for the life of the run and failures simply yield no hostname.
pub(crate) struct ReverseResolver {
    resolver: Resolver,
    cache: RwLock<HashMap<Ipv4Addr, Option<String>>>,
}

impl ReverseResolver {
    /// `None` when the resolver can't be constructed; the trace then
    /// reports bare addresses.
    pub fn new() -> Option<Self> {
        let resolver = Resolver::new(ResolverConfig::default(), ResolverOpts::default()).ok()?;
        Some(Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        if let Some(cached) = self.cache.read().get(&ip) {
            return cached.clone();
        }

        let hostname = match self.resolver.reverse_lookup(IpAddr::V4(ip)) {
            Ok(lookup) => lookup.iter().next().map(|name| {
                let s = name.to_string();
                // Remove trailing dot
                s.trim_end_matches('.').to_string()
            }),
            Err(_) => None,
        };

        self.cache.write().insert(ip, hostname.clone());
        hostname
    }
}
