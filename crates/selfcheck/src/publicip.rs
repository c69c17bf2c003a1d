//! Public IPv4 discovery through OpenDNS.
//!
//! OpenDNS answers `myip.opendns.com` with the address the query came from,
//! the same as `dig +short myip.opendns.com @resolver1.opendns.com`.

use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Result, anyhow};
use hickory_resolver::Resolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;

use crate::context::RunContext;

const RESOLVER_HOST: &str = "resolver1.opendns.com";
const MYIP_NAME: &str = "myip.opendns.com.";

/// Ask OpenDNS which IPv4 address this host reaches the internet from.
pub async fn lookup_public_ipv4(ctx: &RunContext) -> Result<Ipv4Addr> {
    let servers: Vec<IpAddr> = ctx
        .run(tokio::net::lookup_host((RESOLVER_HOST, 53)))
        .await??
        .map(|sa| sa.ip())
        .collect();
    if servers.is_empty() {
        return Err(anyhow!("no addresses found for {RESOLVER_HOST}"));
    }

    let config =
        ResolverConfig::from_parts(None, Vec::new(), NameServerConfigGroup::from_ips_clear(&servers, 53, true));
    let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default()).build();
    let lookup = ctx.run(resolver.ipv4_lookup(MYIP_NAME)).await??;

    single_address(lookup.iter().map(|a| a.0).collect())
}

fn single_address(addrs: Vec<Ipv4Addr>) -> Result<Ipv4Addr> {
    match addrs.as_slice() {
        [addr] => Ok(*addr),
        _ => Err(anyhow!("unexpected number of public IPs: {}", addrs.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_address_accepted() {
        let addr = Ipv4Addr::new(203, 0, 113, 7);
        assert_eq!(single_address(vec![addr]).unwrap(), addr);

        let err = single_address(Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "unexpected number of public IPs: 0");

        let err = single_address(vec![addr, Ipv4Addr::new(203, 0, 113, 8)]).unwrap_err();
        assert_eq!(err.to_string(), "unexpected number of public IPs: 2");
    }

    #[tokio::test]
    async fn test_lookup_stops_on_cancelled_context() {
        let ctx = RunContext::background();
        ctx.cancel();

        let err = lookup_public_ipv4(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "context cancelled");
    }
}
