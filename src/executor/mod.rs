//! Turns one execution request into one normalized response.
//!
//! Per request: rewrite mount paths, pull referenced input files out of the
//! store and zip them up, submit to the backend, classify the result and
//! persist any produced files into a fresh session.

pub mod paths;
pub mod status;

use crate::archive::{self, ArchiveEntry};
use crate::artifacts::is_artifact;
use crate::backend::{decode_bytes, BackendHealth, Judge0Client, Submission, SubmissionResult};
use crate::languages::Language;
use crate::store::{FileStore, StoreError};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use self::paths::{rewrite_mount_paths, REWRITE_NOTICE};
use self::status::{classify, Output};

/// Reference to a previously stored file to make available to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub session_id: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub language: &'static Language,
    pub code: String,
    pub files: Vec<FileRef>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub stdout: String,
    pub stderr: String,
    pub session_id: String,
    /// Absent when the run produced no files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<OutputFile>>,
}

struct InputFile {
    name: String,
    content: Vec<u8>,
}

pub struct Executor {
    backend: Judge0Client,
    store: Arc<dyn FileStore>,
}

impl Executor {
    pub fn new(backend: Judge0Client, store: Arc<dyn FileStore>) -> Self {
        Self { backend, store }
    }

    pub async fn health(&self) -> BackendHealth {
        self.backend.health().await
    }

    /// Run one submission. Backend failures of any kind end up in `stderr`;
    /// only store failures are returned as errors.
    #[instrument(
        skip_all,
        fields(request_id = %uuid::Uuid::new_v4(), lang = request.language.code)
    )]
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, StoreError> {
        // Minted up front so every outcome carries a usable session.
        let session_id = self.store.create_session().await?;

        let (code, rewritten) = rewrite_mount_paths(&request.code);
        if rewritten {
            debug!("Rewrote mount paths in submitted source");
        }

        let inputs = self.resolve_inputs(&request.files).await;
        let input_names: HashSet<String> = inputs
            .iter()
            .map(|f| archive::flatten_name(&f.name).unwrap_or(f.name.as_str()).to_string())
            .collect();

        let mut submission =
            Submission::new(request.language.backend_id, &code).with_args(&request.args);
        if !inputs.is_empty() {
            match archive::pack(inputs.iter().map(|f| (f.name.as_str(), f.content.as_slice()))) {
                Ok(blob) => submission = submission.with_archive(&blob),
                Err(e) => warn!(error = %e, "Failed to bundle input files, submitting without them"),
            }
        }

        let (mut output, files) = match self.backend.submit(&submission).await {
            Ok(result) => {
                let output = classify(&result);
                let files = self.store_outputs(&session_id, &result, &input_names).await?;
                (output, files)
            }
            Err(e) => {
                warn!(error = %e, "Backend call failed");
                (
                    Output {
                        stdout: String::new(),
                        stderr: e.to_string(),
                    },
                    Vec::new(),
                )
            }
        };

        if rewritten {
            output.stdout = format!("{REWRITE_NOTICE}\n{}", output.stdout);
        }

        info!(
            session_id = %session_id,
            inputs = inputs.len(),
            outputs = files.len(),
            "Execution finished"
        );

        Ok(ExecuteResponse {
            stdout: output.stdout,
            stderr: output.stderr,
            session_id,
            files: (!files.is_empty()).then_some(files),
        })
    }

    /// Look up every referenced file. Misses are logged and skipped, as are
    /// later references that reuse an already taken name.
    async fn resolve_inputs(&self, refs: &[FileRef]) -> Vec<InputFile> {
        let lookups = refs.iter().map(|file_ref| async move {
            let found = self.store.get_file(&file_ref.session_id, &file_ref.id).await;
            (file_ref, found)
        });

        let mut inputs = Vec::with_capacity(refs.len());
        let mut taken = HashSet::new();
        for (file_ref, found) in join_all(lookups).await {
            match found {
                Ok(Some(file)) => {
                    let name = if file_ref.name.is_empty() {
                        file.name
                    } else {
                        file_ref.name.clone()
                    };
                    if !taken.insert(name.clone()) {
                        warn!(
                            session_id = %file_ref.session_id,
                            file_id = %file_ref.id,
                            name = %name,
                            "Duplicate input file name, skipping"
                        );
                        continue;
                    }
                    inputs.push(InputFile {
                        name,
                        content: file.content,
                    });
                }
                Ok(None) => warn!(
                    session_id = %file_ref.session_id,
                    file_id = %file_ref.id,
                    "Input file not found, skipping"
                ),
                Err(e) => warn!(
                    session_id = %file_ref.session_id,
                    file_id = %file_ref.id,
                    error = %e,
                    "Input file lookup failed, skipping"
                ),
            }
        }
        inputs
    }

    /// Persist genuine output files from the post-execution snapshot. An
    /// unreadable snapshot counts as no output.
    async fn store_outputs(
        &self,
        session_id: &str,
        result: &SubmissionResult,
        input_names: &HashSet<String>,
    ) -> Result<Vec<OutputFile>, StoreError> {
        let Some(encoded) = result.post_execution_filesystem.as_deref() else {
            return Ok(Vec::new());
        };

        let entries = match decode_bytes(encoded)
            .map_err(|e| e.to_string())
            .and_then(|blob| archive::unpack(&blob).map_err(|e| e.to_string()))
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not read post-execution filesystem");
                return Ok(Vec::new());
            }
        };

        let mut files = Vec::new();
        for ArchiveEntry { name, content } in entries {
            if !is_artifact(&name, input_names) {
                continue;
            }
            let id = self.store.add_file(session_id, &name, content).await?;
            files.push(OutputFile { id, name });
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_omits_files_when_none() {
        let response = ExecuteResponse {
            stdout: "hi\n".into(),
            stderr: String::new(),
            session_id: "abc".into(),
            files: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("files").is_none());
        assert_eq!(json["session_id"], "abc");
    }

    #[test]
    fn file_ref_name_is_optional() {
        let parsed: FileRef = serde_json::from_str(r#"{"session_id":"s","id":"f"}"#).unwrap();
        assert_eq!(parsed.name, "");
    }
}
