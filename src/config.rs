//! Settings file and API endpoint resolution.
//!
//! Settings live in `<config dir>/applura/configuration.json`. Only the API
//! server host is configurable; everything else about the workflow is driven
//! by links the server returns.
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const PROGRAM_NAME: &str = "applura";
pub const CONFIG_FILE_NAME: &str = "configuration.json";
pub const DEFAULT_API_HOSTNAME: &str = "api.ops.applura.com";
pub const API_HOST_ENV: &str = "APPLURA_API_HOST";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub server_hostname: Option<String>,
}

/// A settings value that failed validation, located by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}: {pointer}")]
pub struct InvalidSetting {
    pub message: String,
    pub pointer: String,
}

impl InvalidSetting {
    fn new(message: &str, pointer: &str) -> Self {
        Self {
            message: message.to_string(),
            pointer: pointer.to_string(),
        }
    }
}

pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(PROGRAM_NAME))
}

/// Load settings from `config_dir`. A missing file yields defaults.
pub fn load_settings(config_dir: &Path) -> Result<Settings> {
    let path = config_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no configuration file; using defaults");
        return Ok(Settings::default());
    }
    if !path.is_file() {
        return Err(anyhow!(
            "{CONFIG_FILE_NAME} is not a file: {}",
            path.display()
        ));
    }
    let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    let value: Value = serde_json::from_slice(&bytes).with_context(|| {
        format!(
            "invalid configuration: unable to parse JSON: {}",
            path.display()
        )
    })?;
    parse_settings(&value)
        .map_err(|err| anyhow!("invalid configuration: {}: {err}", path.display()))
}

fn parse_settings(value: &Value) -> Result<Settings, InvalidSetting> {
    let Value::Object(root) = value else {
        return Err(InvalidSetting::new("must contain a top-level object", ""));
    };
    for key in root.keys() {
        if key != "settings" && key != "metadata" {
            return Err(InvalidSetting::new("unrecognized property", &format!("/{key}")));
        }
    }
    let mut settings = Settings::default();
    let Some(raw) = root.get("settings") else {
        return Ok(settings);
    };
    let Value::Object(raw) = raw else {
        return Err(InvalidSetting::new("settings must be an object", "/settings"));
    };
    for key in raw.keys() {
        if key != "server" {
            return Err(InvalidSetting::new(
                "unrecognized property",
                &format!("/settings/{key}"),
            ));
        }
    }
    if let Some(server) = raw.get("server") {
        let Value::Object(server) = server else {
            return Err(InvalidSetting::new(
                "server must be an object",
                "/settings/server",
            ));
        };
        for key in server.keys() {
            if key != "hostname" {
                return Err(InvalidSetting::new(
                    "unrecognized property",
                    &format!("/settings/server/{key}"),
                ));
            }
        }
        match server.get("hostname") {
            None => {}
            Some(Value::String(hostname)) => settings.server_hostname = Some(hostname.clone()),
            Some(_) => {
                return Err(InvalidSetting::new(
                    "hostname must be a string",
                    "/settings/server/hostname",
                ))
            }
        }
    }
    Ok(settings)
}

/// Origin of the API every release workflow starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    origin: Url,
}

impl ApiEndpoint {
    /// Accepts a bare host (`api.example.com`, served over HTTPS) or a full
    /// `http://`/`https://` origin.
    pub fn from_host(host: &str) -> Result<Self> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(anyhow!("API host must be non-empty"));
        }
        let raw = if host.starts_with("https://") || host.starts_with("http://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        let origin = Url::parse(&raw).with_context(|| format!("invalid API host {host:?}"))?;
        if origin.cannot_be_a_base() || origin.host_str().is_none() {
            return Err(anyhow!("invalid API host {host:?}"));
        }
        Ok(Self { origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Build a URL from path segments; each segment is percent-encoded.
    pub fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.origin.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().extend(segments);
        }
        url
    }
}

/// Pick the API host: flag, then environment, then settings, then default.
pub fn resolve_endpoint(
    flag: Option<&str>,
    env_host: Option<String>,
    settings: &Settings,
) -> Result<ApiEndpoint> {
    let host = flag
        .map(str::to_string)
        .or(env_host.filter(|host| !host.trim().is_empty()))
        .or_else(|| settings.server_hostname.clone())
        .unwrap_or_else(|| DEFAULT_API_HOSTNAME.to_string());
    ApiEndpoint::from_host(&host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let settings = load_settings(dir.path()).expect("load settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn reads_server_hostname() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"metadata":{"generated":"2024-01-01T00:00:00Z"},"settings":{"server":{"hostname":"api.staging.test"}}}"#,
        )
        .expect("write config");
        let settings = load_settings(dir.path()).expect("load settings");
        assert_eq!(settings.server_hostname.as_deref(), Some("api.staging.test"));
    }

    #[test]
    fn malformed_json_names_the_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{").expect("write config");
        let err = load_settings(dir.path()).expect_err("malformed");
        assert!(format!("{err:#}").contains("unable to parse JSON"));
    }

    #[test]
    fn invalid_settings_report_pointer() {
        let err = parse_settings(&json!({"settings": {"bogus": 1}})).expect_err("unknown prop");
        assert_eq!(err.pointer, "/settings/bogus");
        let err = parse_settings(&json!({"settings": {"server": {"hostname": 3}}}))
            .expect_err("bad hostname");
        assert_eq!(err.pointer, "/settings/server/hostname");
        let err = parse_settings(&json!([])).expect_err("not an object");
        assert_eq!(err.message, "must contain a top-level object");
    }

    #[test]
    fn endpoint_precedence() {
        let settings = Settings {
            server_hostname: Some("from-settings.test".to_string()),
        };
        let endpoint = resolve_endpoint(Some("flag.test"), Some("env.test".into()), &settings)
            .expect("resolve");
        assert_eq!(endpoint.origin().as_str(), "https://flag.test/");
        let endpoint =
            resolve_endpoint(None, Some("env.test".into()), &settings).expect("resolve");
        assert_eq!(endpoint.origin().as_str(), "https://env.test/");
        let endpoint = resolve_endpoint(None, None, &settings).expect("resolve");
        assert_eq!(endpoint.origin().as_str(), "https://from-settings.test/");
        let endpoint = resolve_endpoint(None, None, &Settings::default()).expect("resolve");
        assert_eq!(endpoint.origin().as_str(), "https://api.ops.applura.com/");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let endpoint = ApiEndpoint::from_host("http://127.0.0.1:8080/").expect("endpoint");
        let url = endpoint.url_for(&["applications", "com.example.app", "releases"]);
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/applications/com.example.app/releases"
        );
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(ApiEndpoint::from_host("  ").is_err());
    }
}
