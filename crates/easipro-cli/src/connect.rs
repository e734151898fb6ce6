//! Turning a saved config into a live server connection.

use std::sync::Arc;
use std::time::Duration;

use easipro_instruments::SessionContext;
use easipro_server::client::{AdaptiveServer, Credentials, DEFAULT_REQUEST_TIMEOUT};

use crate::config::{CredentialSource, EasiproConfig};

pub const CLIENT_ID_VAR: &str = "EASIPRO_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "EASIPRO_CLIENT_SECRET";

/// Resolve credentials from the process environment where needed.
pub fn resolve_credentials(source: &CredentialSource) -> eyre::Result<Credentials> {
    resolve_credentials_with(source, |name| std::env::var(name).ok())
}

/// Resolve credentials, reading variables through `lookup`.
pub fn resolve_credentials_with(
    source: &CredentialSource,
    lookup: impl Fn(&str) -> Option<String>,
) -> eyre::Result<Credentials> {
    match source {
        CredentialSource::Inline {
            client_id,
            client_secret,
        } => Ok(Credentials {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        }),
        CredentialSource::Environment => {
            let read = |name: &str| {
                lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| eyre::eyre!("{name} is not set"))
            };
            Ok(Credentials {
                client_id: read(CLIENT_ID_VAR)?,
                client_secret: read(CLIENT_SECRET_VAR)?,
            })
        }
    }
}

pub fn connect(config: &EasiproConfig) -> eyre::Result<AdaptiveServer> {
    let credentials = resolve_credentials(&config.credentials)?;
    let server = AdaptiveServer::new(&config.base_url, &credentials, DEFAULT_REQUEST_TIMEOUT)?;
    Ok(server)
}

pub fn session_context(config: &EasiproConfig, server: Arc<AdaptiveServer>) -> SessionContext {
    SessionContext::new(server)
        .with_round_trip_timeout(Duration::from_secs(config.round_trip_timeout_secs))
}
