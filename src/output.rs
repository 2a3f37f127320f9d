//! Writing results to a file.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Replace `path` with `text`.
///
/// The text goes to a temporary file next to `path` first, which is then
/// renamed over it, so `path` never holds a partial result.
pub fn write_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
