//! Mapping from an application domain to its release collection URL.
use super::error::WorkflowError;
use crate::config::ApiEndpoint;
use url::Url;

/// Reverse the domain's labels: `app.example.com` becomes `com.example.app`.
///
/// Leading and trailing dots are ignored; an empty label anywhere else is an
/// input error.
pub fn site_name(domain: &str) -> Result<String, WorkflowError> {
    let trimmed = domain.trim().trim_matches('.');
    if trimmed.is_empty() || trimmed.split('.').any(str::is_empty) {
        return Err(WorkflowError::input(format!(
            "invalid application domain {domain:?}"
        )));
    }
    let labels: Vec<&str> = trimmed.split('.').rev().collect();
    if let Some(label) = labels
        .iter()
        .find(|label| label.contains(['/', '?', '#']) || label.chars().any(char::is_whitespace))
    {
        return Err(WorkflowError::input(format!(
            "invalid label {label:?} in application domain {domain:?}"
        )));
    }
    Ok(labels.join("."))
}

/// `<origin>/applications/<site>/releases`
pub fn releases_url(endpoint: &ApiEndpoint, domain: &str) -> Result<Url, WorkflowError> {
    let site = site_name(domain)?;
    Ok(endpoint.url_for(&["applications", &site, "releases"]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverses_labels() {
        assert_eq!(site_name("app.example.com").expect("site"), "com.example.app");
        assert_eq!(site_name("a.b.com").expect("site"), "com.b.a");
        assert_eq!(site_name("localhost").expect("site"), "localhost");
    }

    #[test]
    fn trims_stray_dots() {
        assert_eq!(site_name(".app.example.com.").expect("site"), "com.example.app");
    }

    #[test]
    fn rejects_empty_and_malformed_domains() {
        assert!(site_name("").is_err());
        assert!(site_name(" . ").is_err());
        assert!(site_name("app.example.com/x").is_err());
        assert!(site_name("my app.com").is_err());
    }

    #[test]
    fn rejects_empty_interior_labels() {
        let err = site_name("app..example.com").expect_err("empty label");
        assert_eq!(err.to_string(), r#"invalid application domain "app..example.com""#);
        assert!(site_name("app. .com").is_err());
    }

    #[test]
    fn builds_collection_url() {
        let endpoint = ApiEndpoint::from_host("api.example.test").expect("endpoint");
        let url = releases_url(&endpoint, "app.example.com").expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.example.test/applications/com.example.app/releases"
        );
    }
}
