//! Guards against clobbering input files with driver output.
//!
//! The stats file is written with a plain overwrite, so a mistyped
//! `--stats-out` must never point at the batch being processed.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions the driver reads as input; output must never use them
const INPUT_EXTENSIONS: [&str; 2] = ["jsonl", "ndjson"];

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - Output filename must contain the required pattern (e.g., "stats")
/// - Output cannot be any of the input paths (compared after resolving symlinks)
/// - Output cannot carry an input extension
pub fn validate_output_path(output: &Path, required_pattern: &str, inputs: &[&Path]) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for input in inputs {
        if same_file(output, input) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as input '{}'",
                output.display(),
                input.display()
            );
        }
    }

    let extension = output.extension().and_then(|e| e.to_str()).unwrap_or("");
    if INPUT_EXTENSIONS.iter().any(|ext| extension.eq_ignore_ascii_case(ext)) {
        bail!(
            "Safety check failed: output '{}' has input extension '.{}'",
            output.display(),
            extension
        );
    }

    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
