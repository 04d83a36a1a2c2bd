use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};

use crate::{
    error::{ErrorKind, NetdocError},
    topology::ParseArtifact,
};

/// Key under which the artifact of `document_id` is stored.
pub fn artifact_key(document_id: &str) -> String {
    format!("{document_id}/parsed_data.json")
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A request to parse one uploaded diagram, as consumed from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRequest {
    pub document_id: String,
    /// Blob-store key of the uploaded diagram
    pub file_path: String,
    pub project_id: String,
}

impl ParseRequest {
    pub fn new(
        document_id: impl Into<String>,
        file_path: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        ParseRequest {
            document_id: document_id.into(),
            file_path: file_path.into(),
            project_id: project_id.into(),
        }
    }

    /// Decode and validate a queue message.
    ///
    /// Invalid JSON, a missing field, a non-string field or a blank field are all
    /// [`NetdocError::InvalidRequest`].
    pub fn from_json(bytes: &[u8]) -> Result<Self, NetdocError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| NetdocError::InvalidRequest(format!("message is not valid JSON: {e}")))?;
        let field = |name: &str| -> Result<String, NetdocError> {
            match value.get(name) {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                Some(Value::String(_)) => {
                    Err(NetdocError::InvalidRequest(format!("field '{name}' is empty")))
                }
                Some(_) => Err(NetdocError::InvalidRequest(format!(
                    "field '{name}' must be a string"
                ))),
                None => Err(NetdocError::InvalidRequest(format!("missing field '{name}'"))),
            }
        };
        Ok(ParseRequest {
            document_id: field("document_id")?,
            file_path: field("file_path")?,
            project_id: field("project_id")?,
        })
    }

    /// Best-effort `(document_id, project_id)` from a message that failed validation, so the
    /// failure can still be reported.
    pub fn salvage_ids(bytes: &[u8]) -> Option<(String, Option<String>)> {
        let value: Value = serde_json::from_slice(bytes).ok()?;
        let text = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Some((text("document_id")?, text("project_id")))
    }

    /// Last segment of `file_path`, recorded as the artifact's `filename`.
    pub fn filename(&self) -> &str {
        self.file_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_path)
    }

    pub fn output_key(&self) -> String {
        artifact_key(&self.document_id)
    }
}

impl Display for ParseRequest {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "ParseRequest({} in {}: {})",
            self.document_id, self.project_id, self.file_path
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    Failed,
}

impl Display for CompletionStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CompletionStatus::Completed => write!(f, "completed"),
            CompletionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Published once per job when it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionNotification {
    pub document_id: String,
    pub project_id: Option<String>,
    pub status: CompletionStatus,
    /// Failure classification; `None` on success
    pub error: Option<ErrorKind>,
    pub error_detail: Option<String>,
    pub parsed_path: Option<String>,
    pub shape_count: usize,
    pub connection_count: usize,
    pub page_count: usize,
    pub unresolved_count: usize,
    pub warnings: Vec<String>,
    /// Digest of the input diagram, when it was downloaded
    pub input_sha256: Option<String>,
}

impl CompletionNotification {
    pub fn completed(
        request: &ParseRequest,
        parsed_path: String,
        artifact: &ParseArtifact,
        input_sha256: String,
    ) -> Self {
        let unresolved_count = artifact.unresolved_connections.len();
        let mut warnings = Vec::new();
        if unresolved_count > 0 {
            warnings.push(
                NetdocError::UnresolvedConnections {
                    count: unresolved_count,
                }
                .kind()
                .to_string(),
            );
        }
        CompletionNotification {
            document_id: request.document_id.clone(),
            project_id: Some(request.project_id.clone()),
            status: CompletionStatus::Completed,
            error: None,
            error_detail: None,
            parsed_path: Some(parsed_path),
            shape_count: artifact.topology.shapes.len(),
            connection_count: artifact.topology.connections.len(),
            page_count: artifact.topology.page_count,
            unresolved_count,
            warnings,
            input_sha256: Some(input_sha256),
        }
    }

    pub fn failed(
        document_id: impl Into<String>,
        project_id: Option<String>,
        error: &NetdocError,
        input_sha256: Option<String>,
    ) -> Self {
        CompletionNotification {
            document_id: document_id.into(),
            project_id,
            status: CompletionStatus::Failed,
            error: Some(error.kind()),
            error_detail: Some(error.to_string()),
            parsed_path: None,
            shape_count: 0,
            connection_count: 0,
            page_count: 0,
            unresolved_count: 0,
            warnings: Vec::new(),
            input_sha256,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CompletionStatus::Completed
    }
}

impl Display for CompletionNotification {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.error {
            Some(kind) => write!(f, "{} {} ({kind})", self.document_id, self.status),
            None => write!(
                f,
                "{} {} ({} shapes, {} connections, {} unresolved)",
                self.document_id,
                self.status,
                self.shape_count,
                self.connection_count,
                self.unresolved_count
            ),
        }
    }
}
