//! Decides which files in a post-execution snapshot are user output.

use crate::languages::{DRIVER_SCRIPTS, LANGUAGES};
use std::collections::HashSet;

/// Whether `name` is one of the files the backend itself writes: a
/// language's default source file or a compile/run driver script.
pub fn is_backend_internal(name: &str) -> bool {
    DRIVER_SCRIPTS.contains(&name) || LANGUAGES.iter().any(|l| l.source_file == name)
}

/// An entry is an artifact unless it is backend-internal or one of the
/// files that was sent in with the submission. Matching is exact and
/// case-sensitive on the flattened name.
pub fn is_artifact(name: &str, input_names: &HashSet<String>) -> bool {
    !is_backend_internal(name) && !input_names.contains(name)
}
