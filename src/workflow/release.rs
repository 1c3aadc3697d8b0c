//! Release deployment state machine.
//!
//! A deployment walks one release through
//! `Start -> Created -> Uploaded -> StatusFetched -> DeployTriggered -> Active`.
//! Only the release collection URL is built locally; every later URL comes
//! from a link in the previous response. Any failure ends the run, and stages
//! already completed are not rolled back. Re-running creates a new release.
//!
//! Nothing is retried. A transient failure during the status fetch or the
//! deploy trigger surfaces to the user like any other error.
use super::error::{ContractViolation, Stage, UploadRejection, WorkflowError};
use super::site;
use crate::api::{
    ApiRequest, Method, Transport, ARCHIVE_MEDIA_TYPE, HYPERMEDIA_MEDIA_TYPE,
};
use crate::config::ApiEndpoint;
use crate::credentials::Credentials;
use crate::jsonapi::{self, Document};
use chrono::{Local, SecondsFormat};
use std::fmt;
use std::fs;
use std::path::Path;
use url::Url;

pub const REL_SELF: &str = "self";
pub const REL_UPLOAD_FRONTEND_ARCHIVE: &str =
    "https://docs.applura.com/api/v1/link-relations/upload-front-end-archive";
pub const REL_DEPLOY_FRONTEND_ARCHIVE: &str =
    "https://docs.applura.com/api/v1/link-relations/deploy-front-end-archive";

/// Resource type of every document this workflow accepts.
pub const FRONTEND_RELEASE_TYPE: &str = "frontend-release";
pub const ACTIVE_STATUS: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    Start,
    Created,
    Uploaded,
    StatusFetched,
    DeployTriggered,
    Active,
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReleaseState::Start => "start",
            ReleaseState::Created => "created",
            ReleaseState::Uploaded => "uploaded",
            ReleaseState::StatusFetched => "status-fetched",
            ReleaseState::DeployTriggered => "deploy-triggered",
            ReleaseState::Active => "active",
        })
    }
}

/// Links returned when a release is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRelease {
    pub release_url: Url,
    pub upload_url: Url,
}

pub struct ReleaseWorkflow<'a, T> {
    transport: T,
    credentials: &'a Credentials,
    endpoint: &'a ApiEndpoint,
}

impl<'a, T: Transport> ReleaseWorkflow<'a, T> {
    pub fn new(transport: T, credentials: &'a Credentials, endpoint: &'a ApiEndpoint) -> Self {
        Self {
            transport,
            credentials,
            endpoint,
        }
    }

    /// Create, upload, and activate a release from the archive at `archive`.
    /// Returns the id of the active release.
    pub fn deploy_release(&self, domain: &str, archive: &Path) -> Result<String, WorkflowError> {
        let bytes = fs::read(archive).map_err(|source| WorkflowError::Input {
            message: format!("{} does not exist or is not readable", archive.display()),
            source: Some(source),
        })?;
        self.deploy_archive(domain, bytes)
    }

    pub fn deploy_archive(&self, domain: &str, archive: Vec<u8>) -> Result<String, WorkflowError> {
        transition(ReleaseState::Start, domain);
        let created = self.create_release(domain)?;
        transition(ReleaseState::Created, created.release_url.as_str());

        self.upload_archive(&created.upload_url, archive)?;
        transition(ReleaseState::Uploaded, created.release_url.as_str());

        let deploy_url = self.fetch_release(&created.release_url)?;
        transition(ReleaseState::StatusFetched, deploy_url.as_str());

        let document = self.trigger_deploy(&deploy_url)?;
        transition(ReleaseState::DeployTriggered, document.id());

        let release_id = verify_activation(&document)?;
        transition(ReleaseState::Active, &release_id);
        Ok(release_id)
    }

    /// POST to the site's release collection; returns the release and upload URLs.
    pub fn create_release(&self, domain: &str) -> Result<CreatedRelease, WorkflowError> {
        let stage = Stage::CreateRelease;
        let url = site::releases_url(self.endpoint, domain)?;
        let document = self.fetch_document(stage, self.api_request(Method::Post, url))?;
        let release_url = require_link(stage, &document, REL_SELF, "release")?;
        let upload_url = require_link(stage, &document, REL_UPLOAD_FRONTEND_ARCHIVE, "upload")?;
        Ok(CreatedRelease {
            release_url,
            upload_url,
        })
    }

    /// PUT the archive bytes to the upload link.
    ///
    /// The upload link is a capability URL, so no credentials are attached.
    pub fn upload_archive(&self, upload_url: &Url, archive: Vec<u8>) -> Result<(), WorkflowError> {
        let stage = Stage::UploadArchive;
        let request = ApiRequest::new(Method::Put, upload_url.clone())
            .with_header("content-type", ARCHIVE_MEDIA_TYPE)
            .with_header("content-length", archive.len().to_string())
            .with_body(archive);
        let response = self
            .transport
            .send(&request)
            .map_err(|source| WorkflowError::Transport { stage, source })?;
        if response.is_success() {
            return Ok(());
        }

        let request_headers = request.redacted_headers();
        let response_body = response.body_text();
        for (name, value) in &request_headers {
            tracing::error!("request header: {name}: {value}");
        }
        tracing::error!("response body: {response_body}");
        tracing::error!("upload URL: {upload_url}");
        Err(WorkflowError::UploadRejected(Box::new(UploadRejection {
            status: response.status,
            url: upload_url.clone(),
            request_headers,
            response_body,
        })))
    }

    /// GET the release after upload; returns the deploy link.
    pub fn fetch_release(&self, release_url: &Url) -> Result<Url, WorkflowError> {
        let stage = Stage::FetchRelease;
        let document =
            self.fetch_document(stage, self.api_request(Method::Get, release_url.clone()))?;
        require_link(stage, &document, REL_DEPLOY_FRONTEND_ARCHIVE, "deploy")
    }

    /// POST to the deploy link with no body.
    pub fn trigger_deploy(&self, deploy_url: &Url) -> Result<Document, WorkflowError> {
        self.fetch_document(
            Stage::TriggerDeploy,
            self.api_request(Method::Post, deploy_url.clone()),
        )
    }

    fn api_request(&self, method: Method, url: Url) -> ApiRequest {
        let mut request = ApiRequest::new(method, url).with_header("accept", HYPERMEDIA_MEDIA_TYPE);
        self.credentials.authorize(&mut request);
        request
    }

    /// Send an API request and decode the release document it returns.
    fn fetch_document(&self, stage: Stage, request: ApiRequest) -> Result<Document, WorkflowError> {
        let response = self
            .transport
            .send(&request)
            .map_err(|source| WorkflowError::Transport { stage, source })?;
        if !response.is_success() {
            tracing::debug!(%stage, body = %response.body_text(), "unsuccessful response");
            return Err(WorkflowError::Status {
                stage,
                status: response.status,
                url: response.url,
            });
        }
        if !response.has_media_type(HYPERMEDIA_MEDIA_TYPE) {
            let found = response
                .content_type
                .unwrap_or_else(|| "<none>".to_string());
            return Err(WorkflowError::contract(
                stage,
                ContractViolation::UnexpectedContentType(found),
            ));
        }
        let document = jsonapi::decode(&response.body, Some(response.url))
            .map_err(|source| WorkflowError::Decode { stage, source })?;
        if document.resource_type() != FRONTEND_RELEASE_TYPE {
            return Err(WorkflowError::contract(
                stage,
                ContractViolation::UnexpectedResourceType(document.resource_type().to_string()),
            ));
        }
        tracing::debug!(%stage, id = document.id(), links = ?document.links(), "decoded release document");
        Ok(document)
    }
}

/// Check the deploy response reports the release as active; returns its id.
pub fn verify_activation(document: &Document) -> Result<String, WorkflowError> {
    let stage = Stage::VerifyActivation;
    let release = document.id().to_string();
    let violation = match document.attribute_str("status") {
        Ok(Some(ACTIVE_STATUS)) => return Ok(release),
        Ok(Some(status)) => ContractViolation::NotActivated {
            release,
            status: status.to_string(),
            at: report_time(),
        },
        Ok(None) => ContractViolation::MissingStatus {
            release,
            at: report_time(),
        },
        Err(source) => ContractViolation::StatusType {
            release,
            at: report_time(),
            source,
        },
    };
    Err(WorkflowError::contract(stage, violation))
}

fn require_link(
    stage: Stage,
    document: &Document,
    relation: &'static str,
    link: &'static str,
) -> Result<Url, WorkflowError> {
    document.resolve_link(relation).ok_or_else(|| {
        WorkflowError::contract(stage, ContractViolation::MissingLink { link, relation })
    })
}

fn report_time() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn transition(state: ReleaseState, detail: &str) {
    tracing::info!(%state, detail, "release workflow");
}

#[cfg(test)]
#[path = "release_tests.rs"]
mod tests;
