//! StormForger access token resolution
//!
//! Tokens are looked up in order: the application's own `stormForger.accessToken`, a
//! token supplied by the caller (usually from the environment), the StormForger CLI
//! configuration file and finally an optional [`TokenIssuer`]. Whatever the source, the
//! result always carries a secret key reference so the trial job can read the token
//! from a Secret.

use crate::api::{Application, StormForgerAccessToken};
use crate::error::Result;
use k8s_openapi::api::core::v1::SecretKeySelector;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the Secret holding StormForger service account tokens
pub const ACCESS_TOKEN_SECRET_NAME: &str = "stormforger-service-accounts";

/// Issues a new service account token for an organization
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, organization: &str) -> Result<Option<String>>;
}

/// Ordered access token lookup
#[derive(Clone)]
pub struct CredentialChain {
    /// Token supplied by the caller, e.g. from `STORMFORGER_JWT`
    pub environment_token: Option<String>,
    /// StormForger CLI configuration, `~/.stormforger.toml` by default
    pub config_file: Option<PathBuf>,
    pub issuer: Option<Arc<dyn TokenIssuer>>,
}

impl Default for CredentialChain {
    fn default() -> Self {
        Self {
            environment_token: None,
            config_file: dirs_next::home_dir().map(|home| home.join(".stormforger.toml")),
            issuer: None,
        }
    }
}

impl std::fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialChain")
            .field("environment_token", &self.environment_token.as_ref().map(|_| "<redacted>"))
            .field("config_file", &self.config_file)
            .field("issuer", &self.issuer.is_some())
            .finish()
    }
}

impl CredentialChain {
    /// A chain that only consults the application itself
    pub fn application_only() -> Self {
        Self {
            environment_token: None,
            config_file: None,
            issuer: None,
        }
    }

    /// Resolve the effective access token for `organization`
    pub fn resolve(&self, app: &Application, organization: &str) -> Result<Option<StormForgerAccessToken>> {
        if let Some(token) = app.storm_forger.as_ref().and_then(|sf| sf.access_token.clone()) {
            debug!(source = "application", "Using StormForger access token");
            return Ok(Some(with_secret_ref(token, organization)));
        }

        if let Some(token) = self.environment_token.as_ref().filter(|t| !t.is_empty()) {
            debug!(source = "environment", "Using StormForger access token");
            return Ok(Some(literal(token, organization)));
        }

        if let Some(path) = &self.config_file {
            if let Some(token) = config_file_token(path, organization) {
                debug!(source = %path.display(), "Using StormForger access token");
                return Ok(Some(literal(&token, organization)));
            }
        }

        if let Some(issuer) = &self.issuer {
            if let Some(token) = issuer.issue(organization)? {
                debug!(source = "issuer", "Using StormForger access token");
                return Ok(Some(literal(&token, organization)));
            }
        }

        Ok(None)
    }
}

fn literal(token: &str, organization: &str) -> StormForgerAccessToken {
    with_secret_ref(
        StormForgerAccessToken {
            literal: token.to_string(),
            ..Default::default()
        },
        organization,
    )
}

/// Fill in the default secret name and use the organization as the key
fn with_secret_ref(mut token: StormForgerAccessToken, organization: &str) -> StormForgerAccessToken {
    let secret_ref = token.secret_key_ref.get_or_insert_with(SecretKeySelector::default);
    if secret_ref.name.as_deref().unwrap_or_default().is_empty() {
        secret_ref.name = Some(ACCESS_TOKEN_SECRET_NAME.to_string());
    }
    if secret_ref.key.is_empty() {
        secret_ref.key = organization.to_string();
    }
    token
}

/// Read `<org>.jwt` or the top level `jwt` from the CLI configuration
fn config_file_token(path: &Path, organization: &str) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    let config: toml::Table = match text.parse() {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable StormForger configuration");
            return None;
        }
    };

    let organization_token = config
        .get(organization)
        .and_then(|t| t.get("jwt"))
        .and_then(toml::Value::as_str);
    organization_token
        .or_else(|| config.get("jwt").and_then(toml::Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StormForger;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    struct FixedIssuer;

    impl TokenIssuer for FixedIssuer {
        fn issue(&self, organization: &str) -> Result<Option<String>> {
            Ok(Some(format!("issued-for-{organization}")))
        }
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn secret_ref(token: &StormForgerAccessToken) -> (String, String) {
        let r = token.secret_key_ref.as_ref().unwrap();
        (r.name.clone().unwrap_or_default(), r.key.clone())
    }

    #[test]
    fn test_application_token_wins() {
        let app = Application {
            storm_forger: Some(StormForger {
                organization: "acme".into(),
                access_token: Some(StormForgerAccessToken {
                    file: "token.jwt".into(),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };
        let chain = CredentialChain {
            environment_token: Some("env".into()),
            ..CredentialChain::application_only()
        };

        let token = chain.resolve(&app, "acme").unwrap().unwrap();
        assert_eq!(token.file, "token.jwt");
        assert_eq!(secret_ref(&token), ("stormforger-service-accounts".to_string(), "acme".to_string()));
    }

    #[test]
    fn test_environment_then_config_file() {
        let file = config_file("jwt = \"default-token\"\n\n[acme]\njwt = \"acme-token\"\n");
        let chain = CredentialChain {
            environment_token: None,
            config_file: Some(file.path().to_path_buf()),
            issuer: None,
        };
        let app = Application::default();

        assert_eq!(chain.resolve(&app, "acme").unwrap().unwrap().literal, "acme-token");
        assert_eq!(chain.resolve(&app, "other").unwrap().unwrap().literal, "default-token");

        let chain = CredentialChain {
            environment_token: Some("from-env".into()),
            ..chain
        };
        assert_eq!(chain.resolve(&app, "acme").unwrap().unwrap().literal, "from-env");
    }

    #[test]
    fn test_issuer_is_last_resort() {
        let chain = CredentialChain {
            issuer: Some(Arc::new(FixedIssuer)),
            ..CredentialChain::application_only()
        };
        let token = chain.resolve(&Application::default(), "acme").unwrap().unwrap();
        assert_eq!(token.literal, "issued-for-acme");

        let none = CredentialChain::application_only();
        assert!(none.resolve(&Application::default(), "acme").unwrap().is_none());
    }

    #[test]
    fn test_malformed_config_file_is_ignored() {
        let file = config_file("jwt = ");
        assert_eq!(config_file_token(file.path(), "acme"), None);
    }
}
