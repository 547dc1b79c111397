//! The TCP line protocol, end to end through a real socket.

use serde_json::Value;

use peak_monitor::config::{Config, ServerConfig};
use peak_monitor::error::MonitorError;
use peak_monitor::local::client::Client;
use peak_monitor::local::server::Server;
use peak_monitor::processing::scheduler::TickOutcome;
use peak_monitor::processing::source::ReplaySource;
use peak_monitor::Pipeline;

fn serve(max_clients: usize) -> (Pipeline, String) {
    let pipeline = Pipeline::new(Config::default()).unwrap();
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_clients,
    };
    let server = Server::bind(pipeline.clone(), &config).unwrap();
    let address = server.local_addr().unwrap().to_string();
    let _ = server.spawn();
    (pipeline, address)
}

#[test]
fn control_and_query_over_tcp() {
    let (pipeline, address) = serve(4);
    let source = ReplaySource::new(vec![118.0, 121.0, 119.5], true);
    let mut scheduler = pipeline.scheduler(Box::new(source));
    let mut client = Client::connect(&address).unwrap();

    let ack = client.request("start").unwrap();
    assert_eq!(ack["type"], "transition");
    assert_eq!(ack["from"], "idle");
    assert_eq!(ack["to"], "running");

    for _ in 0..5 {
        scheduler.tick();
    }

    let snapshot = client.snapshot(Some(3)).unwrap();
    assert_eq!(snapshot.samples.len(), 3);
    assert_eq!(snapshot.total_frame_count, 5);
    assert_eq!(snapshot.samples[2].value, 121.0);

    let status = client.request("status").unwrap();
    assert_eq!(status["type"], "status");
    assert_eq!(status["state"], "running");
    assert_eq!(status["buffer_size"], 5);

    let peak = client.request("peak").unwrap();
    assert_eq!(peak["has_peak"], Value::Bool(false));

    let rate = client.request("fps 30").unwrap();
    assert_eq!(rate["tick_rate_hz"], 30);
    assert_eq!(pipeline.tick_rate(), 30);

    client.request("reset").unwrap();
    assert_eq!(pipeline.status().total_frame_count, 0);
}

#[test]
fn errors_come_back_as_protocol_failures() {
    let (_pipeline, address) = serve(4);
    let mut client = Client::connect(&address).unwrap();

    match client.request("pause") {
        Err(MonitorError::Protocol(message)) => assert!(message.contains("not valid while idle")),
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(matches!(client.request("query 0"), Err(MonitorError::Protocol(_))));
    assert!(matches!(client.request("fps 500"), Err(MonitorError::Protocol(_))));
    assert!(matches!(client.request("jump"), Err(MonitorError::Protocol(_))));

    // The connection survives failed requests
    assert_eq!(client.request("events").unwrap(), Value::Array(vec![]));
}

#[test]
fn clients_share_one_pipeline() {
    let (pipeline, address) = serve(4);
    let mut first = Client::connect(&address).unwrap();
    let mut second = Client::connect(&address).unwrap();

    first.request("start").unwrap();
    let status = second.request("status").unwrap();
    assert_eq!(status["state"], "running");

    second.request("stop").unwrap();
    assert_eq!(pipeline.state().to_string(), "stopped");
}

#[test]
fn detector_settings_apply_to_next_tick() {
    let (pipeline, address) = serve(4);
    let values: Vec<f64> = std::iter::repeat(120.0).take(60).chain([123.0, 123.0]).collect();
    let mut scheduler = pipeline.scheduler(Box::new(ReplaySource::new(values, false)));
    let mut client = Client::connect(&address).unwrap();
    client.request("start").unwrap();

    for _ in 0..61 {
        scheduler.tick();
    }
    assert_eq!(client.request("events").unwrap(), Value::Array(vec![]));

    let settings = client.request(r#"detector {"peak_threshold": 2.0}"#).unwrap();
    assert_eq!(settings["peak_threshold"], 2.0);
    assert_eq!(client.request("detector").unwrap(), settings);

    assert!(matches!(scheduler.tick(), TickOutcome::Produced { peak: Some(_), .. }));
    let events = client.request("events").unwrap();
    assert_eq!(events.as_array().map(Vec::len), Some(1));
    assert_eq!(events[0]["frame_index"], 62);
}
