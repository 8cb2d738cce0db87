use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Recursively copy the contents of `src` into `dest`, creating `dest` if needed.
/// Existing files at the same paths are overwritten.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else {
            fs::copy(&src_path, &dest_path).with_context(|| {
                format!("Failed to copy {} to {}", src_path.display(), dest_path.display())
            })?;
        }
    }
    Ok(())
}

/// Remove everything inside `dir` except entries whose name is in `keep`.
pub fn clear_dir_except(dir: &Path, keep: &[&str]) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if keep.iter().any(|k| name.as_os_str() == std::ffi::OsStr::new(k)) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
