//! Error types for the release workflow.
use crate::api::TransportError;
use crate::jsonapi::{AttributeTypeError, DecodeError};
use crate::util::truncate_string;
use std::fmt;
use url::Url;

/// The workflow step an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateRelease,
    UploadArchive,
    FetchRelease,
    TriggerDeploy,
    VerifyActivation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::CreateRelease => "release creation",
            Stage::UploadArchive => "archive upload",
            Stage::FetchRelease => "post-upload status",
            Stage::TriggerDeploy => "deployment",
            Stage::VerifyActivation => "activation check",
        })
    }
}

/// Broad error class, independent of the stage that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    ContractViolation,
    Transport,
    Input,
}

/// A response that decoded fine but broke the workflow's expectations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("unrecognized content type: {0}")]
    UnexpectedContentType(String),
    #[error("unexpected resource type in response document: {0:?}")]
    UnexpectedResourceType(String),
    #[error("{link} URL not found in response (relation {relation})")]
    MissingLink {
        link: &'static str,
        relation: &'static str,
    },
    #[error("deployment response document does not contain a current status; please report this error. time: {at}, release: {release}")]
    MissingStatus { release: String, at: String },
    #[error("deployed release was not activated (status {status:?}); please report this error. time: {at}, release: {release}")]
    NotActivated {
        release: String,
        status: String,
        at: String,
    },
    #[error("deployment response has an unreadable status ({source}); please report this error. time: {at}, release: {release}")]
    StatusType {
        release: String,
        at: String,
        source: AttributeTypeError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{message}")]
    Input {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error("{stage} request failed")]
    Transport {
        stage: Stage,
        #[source]
        source: TransportError,
    },
    #[error("{stage} request failed: unsuccessful response status {status} from {url}")]
    Status { stage: Stage, status: u16, url: Url },
    #[error("{0}")]
    UploadRejected(Box<UploadRejection>),
    #[error("could not decode {stage} response")]
    Decode {
        stage: Stage,
        #[source]
        source: DecodeError,
    },
    #[error("{stage} response rejected")]
    Contract {
        stage: Stage,
        #[source]
        violation: ContractViolation,
    },
}

impl WorkflowError {
    pub fn input(message: impl Into<String>) -> Self {
        WorkflowError::Input {
            message: message.into(),
            source: None,
        }
    }

    pub fn contract(stage: Stage, violation: ContractViolation) -> Self {
        WorkflowError::Contract { stage, violation }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Input { .. } => ErrorKind::Input,
            WorkflowError::Transport { .. }
            | WorkflowError::Status { .. }
            | WorkflowError::UploadRejected(_) => ErrorKind::Transport,
            WorkflowError::Decode { .. } => ErrorKind::Decode,
            WorkflowError::Contract { .. } => ErrorKind::ContractViolation,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            WorkflowError::Input { .. } => None,
            WorkflowError::UploadRejected(_) => Some(Stage::UploadArchive),
            WorkflowError::Transport { stage, .. }
            | WorkflowError::Status { stage, .. }
            | WorkflowError::Decode { stage, .. }
            | WorkflowError::Contract { stage, .. } => Some(*stage),
        }
    }
}

const DIAGNOSTIC_BODY_LIMIT: usize = 2048;

/// A rejected upload with what is needed to diagnose it.
#[derive(Debug)]
pub struct UploadRejection {
    pub status: u16,
    pub url: Url,
    /// Outgoing request headers, credentials redacted.
    pub request_headers: Vec<(String, String)>,
    pub response_body: String,
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers = self
            .request_headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        let body = truncate_string(self.response_body.trim(), DIAGNOSTIC_BODY_LIMIT);
        write!(
            f,
            "unrecognized status {} in response to upload (upload URL: {}); request headers: [{headers}]; response body: {body:?}",
            self.status, self.url
        )
    }
}
