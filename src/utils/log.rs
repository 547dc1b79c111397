use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::MonitorResult;
use crate::processing::detectors::PeakEvent;
use crate::processing::store::Sample;

const PEAK_HEADERS: [&str; 7] = [
    "wall_clock",
    "frame_index",
    "timestamp",
    "value",
    "classification",
    "excursion",
    "confidence_delta",
];

/// Logs a message to `<log_dir>/<filename>` with a timestamp header.
pub fn log_to_file<P: AsRef<Path>>(log_dir: P, filename: &str, message: &str) -> io::Result<()> {
    let log_dir = log_dir.as_ref();
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(filename))?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "\n--- Log entry at {} ---", timestamp)?;
    writeln!(file, "{}", message)?;
    writeln!(file, "--- End of entry ---\n")?;
    file.flush()?;

    Ok(())
}

/// Same as [`log_to_file`] with a banner around the message.
pub fn log_with_header<P: AsRef<Path>>(
    log_dir: P,
    filename: &str,
    header: &str,
    message: &str,
) -> io::Result<()> {
    let formatted_message = format!(
        "===== {} =====\n{}\n====================",
        header, message
    );
    log_to_file(log_dir, filename, &formatted_message)
}

/// Per-session record of peak events (CSV) and fatal escalations.
pub struct SessionJournal {
    log_dir: PathBuf,
    peaks_path: PathBuf,
    writer: csv::Writer<File>,
}

impl SessionJournal {
    /// Opens `<log_dir>/peaks_<YYYYmmdd_HHMMSS>.csv` and writes its header row.
    pub fn create<P: AsRef<Path>>(log_dir: P) -> MonitorResult<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let peaks_path = log_dir.join(format!("peaks_{}.csv", stamp));

        let mut writer = csv::Writer::from_path(&peaks_path)?;
        writer.write_record(PEAK_HEADERS)?;
        writer.flush()?;

        Ok(Self {
            log_dir,
            peaks_path,
            writer,
        })
    }

    pub fn peaks_path(&self) -> &Path {
        &self.peaks_path
    }

    pub fn record_peak(&mut self, sample: &Sample, event: &PeakEvent) -> MonitorResult<()> {
        self.writer.write_record(&[
            Local::now().to_rfc3339(),
            event.frame_index.to_string(),
            format!("{:.6}", sample.timestamp),
            format!("{:.6}", sample.value),
            event.classification.to_string(),
            format!("{:.6}", event.excursion),
            format!("{:.6}", event.confidence_delta),
        ])?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn record_fatal(&self, message: &str) -> io::Result<()> {
        log_with_header(&self.log_dir, "session.log", "PRODUCTION STOPPED", message)
    }
}
