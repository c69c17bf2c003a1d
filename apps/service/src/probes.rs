//! Turns configuration into the set of registered probes.

use selfcheck::probe::{DatabaseProbe, DnsProbe, HttpProbe};
use selfcheck::{Instance, ProbeOrchestrator};
use tracing::info;

use crate::config::Checks;
use crate::error::AppError;

/// Register every probe whose settings are present.
///
/// - `self_public_http`: GET on the public URL
/// - `self_private_url` and `internal_dns`: the app's own private domain
/// - `database` and `database_dns`: the database the app depends on
pub async fn build_orchestrator(checks: &Checks, instance: Instance) -> Result<ProbeOrchestrator, AppError> {
    let mut builder = ProbeOrchestrator::builder(instance).timeout(checks.timeout);

    if let Some(public_url) = &checks.public_url {
        builder = builder.probe("self_public_http", HttpProbe::new(public_url.as_str())?);
    }
    if let Some(domain) = &checks.private_domain {
        let health = format!("http://{domain}:{}/health", checks.private_port);
        builder = builder
            .probe("self_private_url", HttpProbe::new(health)?)
            .probe("internal_dns", DnsProbe::new(domain, Some(checks.private_cidr.as_str()))?);
    }
    if let Some(db_url) = &checks.database_url {
        let probe = DatabaseProbe::new(db_url, checks.database_auth_token.as_deref()).await?;
        builder = builder.probe("database", probe);
        if has_network_host(db_url) {
            builder = builder.probe("database_dns", DnsProbe::new(db_url, checks.database_cidr.as_deref())?);
        }
    }

    let orchestrator = builder.build()?;
    info!(checks = ?orchestrator.probe_names().collect::<Vec<_>>(), "checks registered");
    Ok(orchestrator)
}

/// Local database files have nothing to resolve.
fn has_network_host(db_url: &str) -> bool {
    url::Url::parse(db_url).is_ok_and(|u| u.scheme() != "file" && u.host_str().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_has_network_host() {
        assert!(has_network_host("libsql://checks.example.turso.io"));
        assert!(has_network_host("https://db.internal:8080"));
        assert!(!has_network_host("file:checks.db"));
        assert!(!has_network_host("/var/lib/checks.db"));
    }

    #[tokio::test]
    async fn test_registers_configured_checks() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("target.db");
        let checks = Checks {
            public_url: Some("https://app.example.com".into()),
            private_domain: Some("app-internal".into()),
            database_url: Some(db.to_string_lossy().to_string()),
            ..Checks::default()
        };

        let orchestrator = build_orchestrator(&checks, Instance::new("host", Utc::now())).await.unwrap();
        let names: Vec<_> = orchestrator.probe_names().collect();
        assert_eq!(names, ["self_public_http", "self_private_url", "internal_dns", "database"]);
    }

    #[tokio::test]
    async fn test_invalid_cidr_is_fatal() {
        let checks = Checks {
            private_domain: Some("app-internal".into()),
            private_cidr: "10.0.0.0".into(),
            ..Checks::default()
        };
        let err = build_orchestrator(&checks, Instance::new("host", Utc::now())).await.err();
        assert!(matches!(err, Some(AppError::ProbeSetup(_))));
    }
}
