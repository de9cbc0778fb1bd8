//! HTTP client for the Judge0-compatible execution backend.
//!
//! Everything crossing this boundary is base64: source and input archive on
//! the way in, output streams and the filesystem snapshot on the way out.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Execution backend unavailable: {0}")]
    Unavailable(String),

    #[error("Execution timed out: backend did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Execution backend error (HTTP {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Execution backend request failed: {0}")]
    Request(String),

    #[error("Execution backend returned an unreadable response: {0}")]
    Decode(String),
}

/// A single submission, already base64-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub source_code: String,
    pub language_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_files: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line_arguments: Option<String>,
}

impl Submission {
    pub fn new(language_id: u32, source: &str) -> Self {
        Self {
            source_code: STANDARD.encode(source),
            language_id,
            additional_files: None,
            command_line_arguments: None,
        }
    }

    pub fn with_archive(mut self, archive: &[u8]) -> Self {
        self.additional_files = Some(STANDARD.encode(archive));
        self
    }

    pub fn with_args(mut self, args: &[String]) -> Self {
        if !args.is_empty() {
            self.command_line_arguments = Some(args.join(" "));
        }
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionStatus {
    pub id: u32,
    #[serde(default)]
    pub description: String,
}

/// Raw result as returned by the backend; text fields are still base64.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionResult {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    pub status: Option<SubmissionStatus>,
    pub post_execution_filesystem: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct AboutResponse {
    version: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Decode a base64 text field. The backend wraps long base64 output in
/// newlines, so whitespace is stripped first. Undecodable input is passed
/// through as-is rather than dropped.
pub fn decode_text(field: Option<&str>) -> Option<String> {
    let raw = field?;
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(_) => Some(raw.to_string()),
    }
}

/// Decode a base64 binary field, stripping line wrapping.
pub fn decode_bytes(field: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = field.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact.as_bytes())
}

#[derive(Clone)]
pub struct Judge0Client {
    http: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl Judge0Client {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header(AUTH_HEADER, token),
            None => builder,
        }
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else if err.is_connect() {
            BackendError::Unavailable(err.to_string())
        } else {
            BackendError::Request(err.to_string())
        }
    }

    /// Submit and wait for the result in one round trip.
    pub async fn submit(&self, submission: &Submission) -> Result<SubmissionResult, BackendError> {
        let url = format!("{}/submissions?base64_encoded=true&wait=true", self.base_url);
        debug!(language_id = submission.language_id, "Submitting to backend");

        let response = self
            .request(self.http.post(&url).json(submission))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(status, response.text().await.unwrap_or_default());
            warn!(status = status.as_u16(), %message, "Backend rejected submission");
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<SubmissionResult>().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(e)
            } else {
                BackendError::Decode(e.to_string())
            }
        })
    }

    /// Probe the backend's `/about` endpoint.
    pub async fn health(&self) -> BackendHealth {
        match self.about().await {
            Ok(about) => BackendHealth {
                healthy: true,
                version: about.version,
                error: None,
            },
            Err(e) => BackendHealth {
                healthy: false,
                version: None,
                error: Some(e.to_string()),
            },
        }
    }

    async fn about(&self) -> Result<AboutResponse, BackendError> {
        let url = format!("{}/about", self.base_url);
        let response = self
            .request(self.http.get(&url))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(status, response.text().await.unwrap_or_default());
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<AboutResponse>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn error_message(status: StatusCode, body: String) -> String {
    if let Ok(ErrorBody { error: Some(error) }) = serde_json::from_str::<ErrorBody>(&body) {
        return error;
    }
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_encodes_source_and_joins_args() {
        let sub = Submission::new(71, "print('hi')")
            .with_args(&["-v".to_string(), "file.txt".to_string()])
            .with_archive(b"PK");

        assert_eq!(sub.source_code, STANDARD.encode("print('hi')"));
        assert_eq!(sub.command_line_arguments.as_deref(), Some("-v file.txt"));
        assert_eq!(sub.additional_files.as_deref(), Some("UEs="));
    }

    #[test]
    fn empty_args_and_missing_archive_are_omitted() {
        let json = serde_json::to_value(Submission::new(50, "int main(){}").with_args(&[])).unwrap();
        assert!(json.get("command_line_arguments").is_none());
        assert!(json.get("additional_files").is_none());
        assert_eq!(json["language_id"], 50);
    }

    #[test]
    fn decode_text_handles_wrapped_base64() {
        let encoded = STANDARD.encode("a fairly long line of program output that wraps");
        let (head, tail) = encoded.split_at(20);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(
            decode_text(Some(&wrapped)).as_deref(),
            Some("a fairly long line of program output that wraps")
        );
        assert_eq!(decode_text(None), None);
    }

    #[test]
    fn error_message_prefers_structured_body() {
        assert_eq!(
            error_message(StatusCode::UNPROCESSABLE_ENTITY, r#"{"error":"language not found"}"#.into()),
            "language not found"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, String::new()),
            "Bad Gateway"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
            "boom"
        );
    }
}
