//! Supported languages and how they map onto the execution backend.

/// A language the bridge accepts, with its backend toolchain id and the
/// filename the backend writes the submitted source to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub backend_id: u32,
    pub source_file: &'static str,
}

pub const LANGUAGES: &[Language] = &[
    Language { code: "py", backend_id: 71, source_file: "script.py" },
    Language { code: "js", backend_id: 63, source_file: "script.js" },
    Language { code: "ts", backend_id: 74, source_file: "script.ts" },
    Language { code: "c", backend_id: 50, source_file: "main.c" },
    Language { code: "cpp", backend_id: 54, source_file: "main.cpp" },
    Language { code: "java", backend_id: 62, source_file: "Main.java" },
    Language { code: "php", backend_id: 68, source_file: "script.php" },
    Language { code: "rs", backend_id: 73, source_file: "main.rs" },
    Language { code: "go", backend_id: 60, source_file: "main.go" },
    Language { code: "d", backend_id: 56, source_file: "main.d" },
    Language { code: "f90", backend_id: 59, source_file: "main.f90" },
    Language { code: "r", backend_id: 80, source_file: "script.r" },
];

/// Compile/run driver scripts the backend drops next to the source.
pub const DRIVER_SCRIPTS: &[&str] = &["compile", "run", "compile.sh", "run.sh"];

impl Language {
    /// Look up a language by its client-facing code (`py`, `cpp`, ...).
    pub fn from_code(code: &str) -> Option<&'static Language> {
        LANGUAGES.iter().find(|l| l.code == code)
    }
}
