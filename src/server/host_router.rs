//! Destination lookup by Host header

use std::sync::Arc;

use crate::config::{Config, HostConfig};

/// Maps an inbound Host header to its protected destination
#[derive(Debug, Clone)]
pub struct HostRouter {
    config: Arc<Config>,
}

impl HostRouter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// First destination with a hostname equal to `host`, ignoring case
    ///
    /// The header is compared as sent, port included.
    pub fn host_for_request(&self, host: &str) -> Option<&HostConfig> {
        self.config.hosts.iter().find(|h| {
            h.hostnames
                .iter()
                .any(|name| name.eq_ignore_ascii_case(host))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> HostRouter {
        let mut config = Config::default();
        config.hosts = vec![
            HostConfig::new(["foo.example.com", "www.foo.example.com"], "http://10.0.0.1:8080")
                .unwrap(),
            HostConfig::new(["bar.example.com"], "http://10.0.0.2").unwrap(),
            HostConfig::new(["foo.example.com"], "http://10.0.0.3").unwrap(),
        ];
        HostRouter::new(Arc::new(config))
    }

    // Test 1: matching ignores case
    #[test]
    fn test_case_insensitive_match() {
        let router = router();

        let host = router.host_for_request("Foo.Example.com").unwrap();
        assert_eq!(host.upstream, "http://10.0.0.1:8080");

        let host = router.host_for_request("BAR.EXAMPLE.COM").unwrap();
        assert_eq!(host.upstream, "http://10.0.0.2");
    }

    // Test 2: any hostname of a destination matches
    #[test]
    fn test_alternate_hostname() {
        let router = router();
        let host = router.host_for_request("www.foo.example.com").unwrap();
        assert_eq!(host.upstream, "http://10.0.0.1:8080");
    }

    // Test 3: first configured destination wins
    #[test]
    fn test_first_match_wins() {
        let router = router();
        let host = router.host_for_request("foo.example.com").unwrap();
        assert_eq!(host.upstream, "http://10.0.0.1:8080");
    }

    // Test 4: unknown or partial hosts do not match
    #[test]
    fn test_no_match() {
        let router = router();
        assert!(router.host_for_request("b.example.com").is_none());
        assert!(router.host_for_request("example.com").is_none());
        assert!(router.host_for_request("foo.example.com:8443").is_none());
        assert!(router.host_for_request("").is_none());
    }
}
