use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Recursively collects every `.json` file under `root`.
///
/// Paths come back absolute and sorted lexicographically so repeated runs
/// visit files in the same order.
pub(super) fn find_json_files(root: &Path) -> Result<Vec<PathBuf>> {
    let root = std::path::absolute(root)
        .with_context(|| format!("failed to resolve {}", root.display()))?;

    let mut found = Vec::new();
    walk(&root, &mut found)?;
    found.sort();

    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?;

        if file_type.is_dir() {
            walk(&path, found)?;
            continue;
        }

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if file_type.is_file() && is_json {
            found.push(path);
        }
    }

    Ok(())
}
