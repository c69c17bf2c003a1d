use anyhow::{Result, anyhow};
use async_trait::async_trait;
use libsql::Database;

use super::{Probe, ProbeSetupError};
use crate::context::RunContext;
use crate::store::open_database;
use crate::types::Measurement;

/// Connects to a database, runs a trivial query and disconnects.
///
/// Connections are not pooled: each check dials a fresh one.
pub struct DatabaseProbe {
    database: Database,
}

impl DatabaseProbe {
    /// Parse and open the target once; checks only connect and ping.
    pub async fn new(url: &str, auth_token: Option<&str>) -> Result<Self, ProbeSetupError> {
        let database = open_database(url, auth_token).await?;
        Ok(Self { database })
    }
}

#[async_trait]
impl Probe for DatabaseProbe {
    async fn check(&self, ctx: &RunContext) -> Result<Vec<Measurement>> {
        let ping = async {
            let conn = self.database.connect()?;
            let mut rows = conn.query("SELECT 1", ()).await?;
            match rows.next().await? {
                Some(row) if row.get::<i64>(0)? == 1 => Ok(()),
                _ => Err(anyhow!("database ping returned no rows")),
            }
        };
        ctx.run(ping).await??;
        Ok(Vec::new())
    }
}
