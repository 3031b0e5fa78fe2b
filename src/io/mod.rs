// src/io/mod.rs - CSV sources and sinks around the matching core
pub mod analysis_output;
pub mod contacts;
pub mod known_duplicates;
pub mod rule_output;

use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use std::fs::{self, File};
use std::path::Path;
use tempfile::NamedTempFile;

#[cfg(unix)]
const OUTPUT_FILE_MODE: u32 = 0o644;

/// Writes a CSV file with an explicit header, so header-only files are
/// produced for empty tables. The target is replaced only after every
/// row has been written; a failure leaves any previous file untouched.
pub(crate) fn write_csv_atomic<F>(path: &Path, header: &[&str], write_rows: F) -> Result<()>
where
    F: FnOnce(&mut Writer<&File>) -> Result<()>,
{
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
    let tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(tmp.as_file());
        writer
            .write_record(header)
            .with_context(|| format!("Failed to write header of {}", path.display()))?;
        write_rows(&mut writer).with_context(|| format!("Failed to write rows of {}", path.display()))?;
        writer.flush().with_context(|| format!("Failed to flush {}", path.display()))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // NamedTempFile starts at 0600.
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(OUTPUT_FILE_MODE))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    tmp.persist(path)
        .with_context(|| format!("Failed to move output into place at {}", path.display()))?;
    Ok(())
}
