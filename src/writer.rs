use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::mpsc::Receiver,
};

use log::error;
use ridelog::{RawFix, RideError};

/// Write every received fix as one JSON line until the sender hangs up
pub fn write_fixes(file: &PathBuf, fix_receiver: Receiver<RawFix>) -> Result<usize, RideError> {
    let fix_file = File::create(file).map_err(|e| RideError::WriterError { source: e })?;
    let mut fix_file_writer = BufWriter::new(fix_file);
    let mut written = 0;
    for fix in &fix_receiver {
        let line = match serde_json::to_string(&fix) {
            Ok(line) => line,
            Err(e) => {
                error!("Could not serialize fix: {}", e);
                continue;
            }
        };
        match writeln!(fix_file_writer, "{}", line) {
            Ok(()) => written += 1,
            Err(e) => error!("Error while writing fix to output file: {}", e),
        }
    }
    fix_file_writer
        .flush()
        .map_err(|e| RideError::WriterError { source: e })?;
    Ok(written)
}
