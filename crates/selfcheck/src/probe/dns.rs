use std::net::IpAddr;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use url::Url;

use super::{Probe, ProbeSetupError};
use crate::context::RunContext;
use crate::types::Measurement;

/// Resolves a host name and optionally checks every address lands in a network.
pub struct DnsProbe {
    hostname: String,
    expected: Option<IpNetwork>,
}

impl DnsProbe {
    /// `hostname` may also be a URL, in which case its host (without port) is used.
    pub fn new(hostname: &str, expected_cidr: Option<&str>) -> Result<Self, ProbeSetupError> {
        let mut host = hostname.to_string();
        if hostname.contains("://") {
            let url = Url::parse(hostname)?;
            if let Some(h) = url.host_str() {
                host = h.trim_start_matches('[').trim_end_matches(']').to_string();
            }
        }
        let expected = match expected_cidr {
            Some(cidr) if !cidr.is_empty() => {
                Some(cidr.parse::<IpNetwork>().map_err(|_| ProbeSetupError::InvalidCidr(cidr.to_string()))?)
            }
            _ => None,
        };
        Ok(Self { hostname: host, expected })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

#[async_trait]
impl Probe for DnsProbe {
    async fn check(&self, ctx: &RunContext) -> Result<Vec<Measurement>> {
        let addrs: Vec<IpAddr> = ctx
            .run(tokio::net::lookup_host((self.hostname.as_str(), 0)))
            .await??
            .map(|sa| sa.ip())
            .collect();

        if addrs.is_empty() {
            return Err(anyhow!("no addresses found"));
        }
        if let Some(net) = &self.expected {
            if let Some(outside) = addrs.iter().find(|ip| !net.contains(**ip)) {
                return Err(anyhow!("resolved address {} outside of {}", outside, net));
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_extracted_from_url() {
        let probe = DnsProbe::new("libsql://db.example.com:8080/path", None).unwrap();
        assert_eq!(probe.hostname(), "db.example.com");

        let probe = DnsProbe::new("plain.example.com", None).unwrap();
        assert_eq!(probe.hostname(), "plain.example.com");
    }

    #[test]
    fn test_expected_network_parsed() {
        let probe = DnsProbe::new("db.internal", Some("10.0.0.0/8")).unwrap();
        let net = probe.expected.unwrap();
        assert!(net.contains("10.1.2.3".parse().unwrap()));
        assert!(!net.contains("11.0.0.1".parse().unwrap()));
        assert!(!net.contains("::1".parse().unwrap()));

        let any = DnsProbe::new("db.internal", Some("0.0.0.0/0")).unwrap().expected.unwrap();
        assert!(any.contains("8.8.8.8".parse().unwrap()));

        assert!(DnsProbe::new("db.internal", Some("")).unwrap().expected.is_none());
        for bad in ["10.0.0.0/33", "nope/8", "fd00::/129"] {
            let err = DnsProbe::new("db.internal", Some(bad)).err();
            assert!(matches!(err, Some(ProbeSetupError::InvalidCidr(ref s)) if s == bad), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_literal_address_outside_network_fails() {
        let probe = DnsProbe::new("127.0.0.1", Some("10.0.0.0/8")).unwrap();
        let err = probe.check(&RunContext::background()).await.unwrap_err();
        assert_eq!(err.to_string(), "resolved address 127.0.0.1 outside of 10.0.0.0/8");

        let probe = DnsProbe::new("127.0.0.1", Some("127.0.0.0/8")).unwrap();
        assert!(probe.check(&RunContext::background()).await.unwrap().is_empty());
    }
}
