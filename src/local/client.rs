use colored::{ColoredString, Colorize};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use super::export::export_snapshot;
use crate::config::SourceConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::processing::detectors::PeakClassification;
use crate::processing::pipeline::Snapshot;
use crate::processing::store::Sample;

const BAR_WIDTH: f64 = 80.0;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    pub fn connect(address: &str) -> MonitorResult<Self> {
        let stream = TcpStream::connect(address)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Sends one request line and returns the reply's `data`, or the
    /// server's error as `MonitorError::Protocol`.
    pub fn request(&mut self, line: &str) -> MonitorResult<Value> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(MonitorError::Protocol("server closed the connection".to_string()));
        }
        let mut reply: Value = serde_json::from_str(&reply)?;
        if reply["ok"].as_bool() == Some(true) {
            Ok(reply["data"].take())
        } else {
            let message = reply["error"].as_str().unwrap_or("unknown error").to_string();
            Err(MonitorError::Protocol(message))
        }
    }

    pub fn snapshot(&mut self, count: Option<usize>) -> MonitorResult<Snapshot> {
        let line = match count {
            Some(count) => format!("query {}", count),
            None => "query".to_string(),
        };
        Ok(serde_json::from_value(self.request(&line)?)?)
    }
}

/// One terminal line: peak marker followed by a bar scaled to the
/// presentation range.
pub fn render_sample(sample: &Sample, presentation: &SourceConfig) -> String {
    let [low, high] = presentation.presentation_range;
    let span = (high - low).max(f64::EPSILON);
    let level = (presentation.clamp_for_presentation(sample.value) - low) / span;
    let bar = "|".repeat((level * BAR_WIDTH).round() as usize);

    let (alert, bar): (ColoredString, ColoredString) = match sample.peak {
        Some(PeakClassification::Strong) => ("Strong peak ! ".red(), bar.red()),
        Some(PeakClassification::Weak) => ("Weak peak   ! ".yellow(), bar.yellow()),
        None => ("              ".white(), bar.white()),
    };
    format!("{}{:>8} {:>9.3} {}", alert, sample.frame_index, sample.value, bar)
}

/// Samples of `snapshot` newer than `last_seen`, plus the new high-water
/// mark. A frame count below `last_seen` means the server store was reset.
fn unseen_samples(snapshot: &Snapshot, last_seen: u64) -> (Vec<Sample>, u64) {
    let seen = if snapshot.total_frame_count < last_seen {
        0
    } else {
        last_seen
    };
    let fresh: Vec<Sample> = snapshot
        .samples
        .iter()
        .filter(|s| s.frame_index > seen)
        .copied()
        .collect();
    let newest = fresh.last().map_or(seen, |s| s.frame_index);
    (fresh, newest)
}

/// Polls the server and prints every sample once, in frame order.
fn follow(client: &mut Client, presentation: &SourceConfig) -> MonitorResult<()> {
    let mut last_seen = 0u64;
    loop {
        let snapshot = client.snapshot(None)?;
        let (fresh, newest) = unseen_samples(&snapshot, last_seen);
        for sample in &fresh {
            println!("{}", render_sample(sample, presentation));
        }
        last_seen = newest;
        thread::sleep(POLL_INTERVAL);
    }
}

/// `client` follows the live signal, `client export <path>` saves the
/// current buffer, anything else is sent verbatim as one request.
pub fn run(address: &str, presentation: &SourceConfig, args: &[String]) -> MonitorResult<()> {
    let mut client = Client::connect(address)?;

    match args.first().map(String::as_str) {
        None => follow(&mut client, presentation),
        Some("export") => {
            let path = args
                .get(1)
                .ok_or_else(|| MonitorError::Protocol("export needs a file path".to_string()))?;
            let snapshot = client.snapshot(None)?;
            export_snapshot(path, &snapshot, presentation)?;
            println!("Exported {} samples to {}", snapshot.samples.len(), path);
            Ok(())
        }
        Some(_) => {
            let data = client.request(&args.join(" "))?;
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
    }
}
