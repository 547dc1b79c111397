use std::io::Write;
use std::path::Path;

use crate::config::SourceConfig;
use crate::error::MonitorResult;
use crate::processing::pipeline::Snapshot;

/// Writes the snapshot's samples as CSV rows. `presentation` clamps an
/// extra display column; the raw value column is never clamped.
pub fn write_snapshot<W: Write>(
    writer: W,
    snapshot: &Snapshot,
    presentation: &SourceConfig,
) -> MonitorResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["frame_index", "timestamp", "value", "display_value", "peak"])?;
    for sample in &snapshot.samples {
        wtr.write_record(&[
            sample.frame_index.to_string(),
            format!("{:.6}", sample.timestamp),
            format!("{:.6}", sample.value),
            format!("{:.6}", presentation.clamp_for_presentation(sample.value)),
            sample.peak.map(|p| p.to_string()).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_snapshot<P: AsRef<Path>>(
    path: P,
    snapshot: &Snapshot,
    presentation: &SourceConfig,
) -> MonitorResult<()> {
    let file = std::fs::File::create(path)?;
    write_snapshot(file, snapshot, presentation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::detectors::PeakClassification;
    use crate::processing::store::Sample;

    #[test]
    fn writes_one_row_per_sample() {
        let snapshot = Snapshot {
            samples: vec![
                Sample {
                    frame_index: 1,
                    timestamp: 0.0,
                    value: 300.0,
                    peak: None,
                },
                Sample {
                    frame_index: 2,
                    timestamp: 0.02,
                    value: 121.5,
                    peak: Some(PeakClassification::Weak),
                },
            ],
            baseline: None,
            last_peak: Some(PeakClassification::Weak),
            total_frame_count: 2,
        };
        let mut out = Vec::new();
        write_snapshot(&mut out, &snapshot, &SourceConfig::default()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "frame_index,timestamp,value,display_value,peak");
        assert_eq!(lines[1], "1,0.000000,300.000000,255.000000,");
        assert_eq!(lines[2], "2,0.020000,121.500000,121.500000,weak");
    }
}
