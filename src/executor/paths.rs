//! Rewrites the client-facing mount path to the backend's working directory.
//!
//! Clients are told their files live under [`MOUNT_PATH`]; the backend runs
//! each submission in a scratch directory holding those files. `/mnt/data/x`
//! becomes `./x` and a bare `/mnt/data` becomes `.`, but only where the
//! prefix is a whole path of its own.

pub const MOUNT_PATH: &str = "/mnt/data";

pub const REWRITE_NOTICE: &str = "[Note: paths under /mnt/data were rewritten to ./ for execution]";

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Returns the rewritten source and whether anything changed.
pub fn rewrite_mount_paths(source: &str) -> (String, bool) {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    let mut rewritten = false;

    for (start, _) in source.match_indices(MOUNT_PATH) {
        let end = start + MOUNT_PATH.len();

        let before = source[..start].chars().next_back();
        if before.is_some_and(|c| is_path_char(c) || c == '/') {
            continue;
        }

        let after = source[end..].chars().next();
        let (replacement, consumed) = match after {
            Some('/') => ("./", end + 1),
            Some(c) if is_path_char(c) => continue,
            _ => (".", end),
        };

        out.push_str(&source[last..start]);
        out.push_str(replacement);
        last = consumed;
        rewritten = true;
    }

    if !rewritten {
        return (source.to_string(), false);
    }
    out.push_str(&source[last..]);
    (out, true)
}
