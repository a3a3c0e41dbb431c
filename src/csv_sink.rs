use std::fs::File;
use std::path::{Path, PathBuf};

use csv::Writer;
use tracing::{debug, info};

use crate::error::{JobError, Result};
use crate::transform::TableRow;

/// Write `rows` with their header to `<dir>/<name>.csv`, replacing any
/// previous snapshot. Returns the path written.
pub fn write_table<R: TableRow>(dir: &Path, name: &str, rows: &[R]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| export_error(dir, e))?;
    debug!("Ensured directory: {:?}", dir);

    let path = dir.join(format!("{name}.csv"));
    let file = File::create(&path).map_err(|e| export_error(&path, e))?;
    let mut writer = Writer::from_writer(file);

    writer
        .write_record(R::headers())
        .map_err(|e| export_error(&path, e))?;
    for row in rows {
        writer
            .write_record(row.to_csv_row())
            .map_err(|e| export_error(&path, e))?;
    }
    writer.flush().map_err(|e| export_error(&path, e))?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(path)
}

fn export_error(path: &Path, err: impl std::fmt::Display) -> JobError {
    JobError::Export(format!("{}: {err}", path.display()))
}
