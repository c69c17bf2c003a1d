/// Probe module - the individual health checks run by the orchestrator
///
/// This module is responsible for:
/// - The `Probe` trait every check implements
/// - HTTP reachability, DNS resolution and database connectivity probes
/// - Adapting plain async closures into probes
pub mod database;
pub mod dns;
pub mod http;

pub use database::DatabaseProbe;
pub use dns::DnsProbe;
pub use http::HttpProbe;

use std::future::Future;
use std::marker::PhantomData;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::context::RunContext;
use crate::types::Measurement;

/// A single named health check.
///
/// Implementations hold no state shared across invocations and must be safe
/// to run concurrently with other probes. They are expected to honour `ctx`;
/// the orchestrator abandons them when it ends regardless.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, ctx: &RunContext) -> Result<Vec<Measurement>>;
}

/// Errors raised while building a probe, before any check runs.
#[derive(Debug, Error)]
pub enum ProbeSetupError {
    #[error("http check requires url")]
    MissingUrl,
    #[error("parsing hostname: {0}")]
    InvalidHostname(#[from] url::ParseError),
    #[error("invalid cidr {0:?}")]
    InvalidCidr(String),
    #[error("building http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("opening database: {0}")]
    Database(#[from] libsql::Error),
}

/// Probe backed by an async closure.
pub struct FnProbe<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Turn `f` into a [`Probe`].
pub fn from_fn<F, Fut>(f: F) -> FnProbe<F, Fut>
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Measurement>>> + Send,
{
    FnProbe { f, _fut: PhantomData }
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F, Fut>
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Measurement>>> + Send,
{
    async fn check(&self, ctx: &RunContext) -> Result<Vec<Measurement>> {
        (self.f)(ctx.clone()).await
    }
}
