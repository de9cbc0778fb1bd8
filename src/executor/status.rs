//! Maps a backend result onto stdout/stderr.

use crate::backend::{decode_text, SubmissionResult};

pub const COMPILE_FALLBACK: &str = "Compilation failed";
pub const INTERNAL_FALLBACK: &str = "Internal error occurred";

/// How a backend status id is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted, wrong answer, or anything unrecognised.
    Completed,
    CompileError,
    /// Time limit, fatal signals, non-zero exit, exec format error.
    RuntimeFailure,
    InternalError,
}

impl Outcome {
    pub fn from_status_id(id: u32) -> Self {
        match id {
            3 | 4 => Outcome::Completed,
            6 => Outcome::CompileError,
            5 | 7..=12 | 14 => Outcome::RuntimeFailure,
            13 => Outcome::InternalError,
            _ => Outcome::Completed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

pub fn classify(result: &SubmissionResult) -> Output {
    let (status_id, description) = result
        .status
        .as_ref()
        .map(|s| (s.id, s.description.as_str()))
        .unwrap_or((0, ""));

    let stdout = decode_text(result.stdout.as_deref()).unwrap_or_default();
    let stderr = decode_text(result.stderr.as_deref());

    let stderr = match Outcome::from_status_id(status_id) {
        Outcome::Completed => stderr.unwrap_or_default(),
        Outcome::CompileError => non_empty(decode_text(result.compile_output.as_deref()))
            .unwrap_or_else(|| COMPILE_FALLBACK.to_string()),
        Outcome::RuntimeFailure => {
            let mut stderr = stderr.unwrap_or_default();
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(description);
            stderr
        }
        Outcome::InternalError => non_empty(decode_text(result.message.as_deref()))
            .unwrap_or_else(|| INTERNAL_FALLBACK.to_string()),
    };

    Output { stdout, stderr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SubmissionStatus;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    fn b64(s: &str) -> Option<String> {
        Some(STANDARD.encode(s))
    }

    fn result(id: u32, description: &str) -> SubmissionResult {
        SubmissionResult {
            status: Some(SubmissionStatus {
                id,
                description: description.to_string(),
            }),
            ..SubmissionResult::default()
        }
    }

    #[test]
    fn status_ids_map_to_outcomes() {
        assert_eq!(Outcome::from_status_id(3), Outcome::Completed);
        assert_eq!(Outcome::from_status_id(4), Outcome::Completed);
        assert_eq!(Outcome::from_status_id(6), Outcome::CompileError);
        for id in [5, 7, 8, 9, 10, 11, 12, 14] {
            assert_eq!(Outcome::from_status_id(id), Outcome::RuntimeFailure, "id {id}");
        }
        assert_eq!(Outcome::from_status_id(13), Outcome::InternalError);
        assert_eq!(Outcome::from_status_id(1), Outcome::Completed);
        assert_eq!(Outcome::from_status_id(99), Outcome::Completed);
    }

    #[test]
    fn accepted_passes_streams_through() {
        let mut r = result(3, "Accepted");
        r.stdout = b64("hello\n");
        r.stderr = b64("warning\n");
        assert_eq!(
            classify(&r),
            Output {
                stdout: "hello\n".into(),
                stderr: "warning\n".into()
            }
        );
    }

    #[test]
    fn compile_error_uses_compile_output_verbatim() {
        let mut r = result(6, "Compilation Error");
        r.stdout = b64("partial");
        r.compile_output = b64("main.c:1: error: expected ';'\n");
        let out = classify(&r);
        assert_eq!(out.stderr, "main.c:1: error: expected ';'\n");
        assert_eq!(out.stdout, "partial");
    }

    #[test]
    fn compile_error_without_output_uses_fallback() {
        let mut r = result(6, "Compilation Error");
        assert_eq!(classify(&r).stderr, COMPILE_FALLBACK);
        r.compile_output = Some(String::new());
        assert_eq!(classify(&r).stderr, COMPILE_FALLBACK);
    }

    #[test]
    fn runtime_failure_appends_description() {
        let mut r = result(11, "Runtime Error (NZEC)");
        r.stderr = b64("Traceback: boom");
        assert_eq!(classify(&r).stderr, "Traceback: boom\nRuntime Error (NZEC)");

        r.stderr = b64("Traceback: boom\n");
        assert_eq!(classify(&r).stderr, "Traceback: boom\nRuntime Error (NZEC)");

        let r = result(5, "Time Limit Exceeded");
        assert_eq!(classify(&r).stderr, "Time Limit Exceeded");
    }

    #[test]
    fn internal_error_uses_message_or_fallback() {
        let mut r = result(13, "Internal Error");
        assert_eq!(classify(&r).stderr, INTERNAL_FALLBACK);
        r.message = b64("sandbox crashed");
        assert_eq!(classify(&r).stderr, "sandbox crashed");
    }

    #[test]
    fn missing_status_is_treated_as_completed() {
        let r = SubmissionResult {
            stdout: b64("out"),
            ..SubmissionResult::default()
        };
        assert_eq!(classify(&r).stdout, "out");
        assert_eq!(classify(&r).stderr, "");
    }
}
