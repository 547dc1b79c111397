use log::{debug, info, warn};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::{DetectorConfig, ServerConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::processing::control::ControlCommand;
use crate::processing::pipeline::Pipeline;

// -----------------------------------------------------------------------------
// LINE PROTOCOL
// -----------------------------------------------------------------------------

/// Longest request line a client may send, newline included.
pub const MAX_REQUEST_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Control(ControlCommand),
    Query(Option<usize>),
    Events,
    SetTickRate(u32),
    /// `detector` reads the settings; `detector {json}` overlays the given fields.
    Detector(Option<Value>),
    Reset,
    Quit,
}

impl Request {
    pub fn parse(line: &str) -> MonitorResult<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        if verb.is_empty() {
            return Err(MonitorError::Protocol("empty request".to_string()));
        }
        let verb = verb.to_ascii_lowercase();

        if verb == "detector" {
            if rest.is_empty() {
                return Ok(Request::Detector(None));
            }
            let changes: Value = serde_json::from_str(rest).map_err(|e| {
                MonitorError::Protocol(format!("invalid detector settings: {}", e))
            })?;
            if !changes.is_object() {
                return Err(MonitorError::Protocol(
                    "detector settings must be a JSON object".to_string(),
                ));
            }
            return Ok(Request::Detector(Some(changes)));
        }

        let mut parts = rest.split_whitespace();
        let argument = parts.next();
        if parts.next().is_some() {
            return Err(MonitorError::Protocol(format!("too many arguments in '{}'", line.trim())));
        }

        let request = match verb.as_str() {
            "query" => Request::Query(argument.map(parse_number::<usize>).transpose()?),
            "events" => Request::Events,
            "fps" => {
                let hz = argument
                    .ok_or_else(|| MonitorError::Protocol("fps needs a rate".to_string()))?;
                Request::SetTickRate(parse_number(hz)?)
            }
            "reset" => Request::Reset,
            "quit" | "exit" => Request::Quit,
            other => match ControlCommand::parse(other) {
                Some(command) => Request::Control(command),
                None => return Err(MonitorError::Protocol(format!("unknown command '{}'", other))),
            },
        };
        Ok(request)
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str) -> MonitorResult<T> {
    raw.parse()
        .map_err(|_| MonitorError::Protocol(format!("'{}' is not a valid number", raw)))
}

fn ok(data: Value) -> Value {
    json!({ "ok": true, "data": data })
}

fn failure(error: &MonitorError) -> Value {
    json!({ "ok": false, "error": error.to_string() })
}

/// Executes one request line against the pipeline and renders the JSON reply.
pub fn handle_line(pipeline: &Pipeline, line: &str) -> String {
    let reply = match Request::parse(line).and_then(|request| execute(pipeline, request)) {
        Ok(data) => ok(data),
        Err(e) => failure(&e),
    };
    reply.to_string()
}

fn execute(pipeline: &Pipeline, request: Request) -> MonitorResult<Value> {
    let data = match request {
        Request::Control(command) => serde_json::to_value(pipeline.control(command)?)?,
        Request::Query(count) => {
            let count = count.unwrap_or(pipeline.config().buffer.capacity);
            serde_json::to_value(pipeline.query(count)?)?
        }
        Request::Events => serde_json::to_value(pipeline.peak_events())?,
        Request::SetTickRate(hz) => {
            pipeline.set_tick_rate(hz)?;
            json!({ "tick_rate_hz": hz })
        }
        Request::Detector(None) => serde_json::to_value(pipeline.detector_config())?,
        Request::Detector(Some(changes)) => {
            let detector = merge_detector(pipeline.detector_config(), changes)?;
            pipeline.set_detector_config(detector)?;
            serde_json::to_value(pipeline.detector_config())?
        }
        Request::Reset => {
            pipeline.reset();
            Value::Null
        }
        Request::Quit => Value::Null,
    };
    Ok(data)
}

/// Overlays the fields present in `changes` on `current`.
fn merge_detector(current: DetectorConfig, changes: Value) -> MonitorResult<DetectorConfig> {
    let mut merged = serde_json::to_value(current)?;
    if let (Some(target), Value::Object(fields)) = (merged.as_object_mut(), changes) {
        for (key, value) in fields {
            if !target.contains_key(&key) {
                return Err(MonitorError::Protocol(format!(
                    "unknown detector setting '{}'",
                    key
                )));
            }
            target.insert(key, value);
        }
    }
    Ok(serde_json::from_value(merged)?)
}

// -----------------------------------------------------------------------------
// SERVER
// -----------------------------------------------------------------------------

pub struct Server {
    listener: TcpListener,
    pipeline: Pipeline,
    max_clients: usize,
    clients: Arc<AtomicUsize>,
}

impl Server {
    pub fn bind(pipeline: Pipeline, config: &ServerConfig) -> MonitorResult<Self> {
        let listener = TcpListener::bind(config.address())?;
        Ok(Self {
            listener,
            pipeline,
            max_clients: config.max_clients,
            clients: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> MonitorResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, one thread per client.
    pub fn serve(self) -> MonitorResult<()> {
        info!("Listening on {}", self.local_addr()?);
        for stream in self.listener.incoming() {
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            if self.clients.fetch_add(1, Ordering::AcqRel) >= self.max_clients {
                self.clients.fetch_sub(1, Ordering::AcqRel);
                warn!("Rejecting client: max clients ({}) reached", self.max_clients);
                let reply = failure(&MonitorError::Protocol("server overloaded".to_string()));
                let _ = writeln!(stream, "{}", reply);
                continue;
            }

            let pipeline = self.pipeline.clone();
            let clients = Arc::clone(&self.clients);
            thread::spawn(move || {
                let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
                info!("Client connected: {}", peer);
                if let Err(e) = handle_client(&pipeline, stream) {
                    debug!("Client {} closed with error: {}", peer, e);
                }
                clients.fetch_sub(1, Ordering::AcqRel);
                info!("Client disconnected: {}", peer);
            });
        }
        Ok(())
    }

    pub fn spawn(self) -> thread::JoinHandle<MonitorResult<()>> {
        thread::spawn(move || self.serve())
    }
}

fn handle_client(pipeline: &Pipeline, stream: TcpStream) -> MonitorResult<()> {
    let writer = stream.try_clone()?;
    serve_lines(pipeline, BufReader::new(stream), writer)
}

/// Answers one request per line until end of input, `quit`, or a line
/// longer than `MAX_REQUEST_BYTES`, which is refused and ends the session.
fn serve_lines<R: BufRead, W: Write>(
    pipeline: &Pipeline,
    mut reader: R,
    mut writer: W,
) -> MonitorResult<()> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = (&mut reader).take(MAX_REQUEST_BYTES).read_line(&mut line)?;
        if read == 0 {
            break;
        }
        if !line.ends_with('\n') && read as u64 == MAX_REQUEST_BYTES {
            let error = MonitorError::Protocol(format!(
                "request longer than {} bytes",
                MAX_REQUEST_BYTES
            ));
            writeln!(writer, "{}", failure(&error))?;
            writer.flush()?;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let quit = matches!(Request::parse(&line), Ok(Request::Quit));
        writeln!(writer, "{}", handle_line(pipeline, &line))?;
        writer.flush()?;
        if quit {
            break;
        }
    }
    Ok(())
}
