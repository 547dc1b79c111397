use log::{error, info};

use peak_monitor::config::{load_or_default, Config};
use peak_monitor::error::MonitorResult;
use peak_monitor::local::{client, server::Server};
use peak_monitor::processing::pipeline::Pipeline;
use peak_monitor::processing::source::{ReplaySource, SampleSource, SyntheticSource};

fn run_server(config_path: Option<&str>) -> MonitorResult<()> {
    let config = load_or_default(config_path)?;
    info!("Starting with settings: {:?}", config);

    let source: Box<dyn SampleSource> = match &config.source.replay_file {
        Some(path) => Box::new(ReplaySource::from_csv(path, true)?),
        None => Box::new(SyntheticSource::new(
            config.source.clone(),
            config.processor.seed,
        )),
    };

    let pipeline = Pipeline::new(config.clone())?;
    let _scheduler = pipeline.spawn_scheduler(source)?;
    if config.processor.auto_start {
        pipeline.start()?;
    }

    Server::bind(pipeline, &config.server)?.serve()
}

/// The client reads `config.yaml` for the server address and presentation
/// range; `PEAK_MONITOR_ADDR` overrides the address.
fn run_client(args: &[String]) -> MonitorResult<()> {
    let config: Config = load_or_default(None)?;
    let address = std::env::var("PEAK_MONITOR_ADDR").unwrap_or_else(|_| config.server.address());
    client::run(&address, &config.source, args)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        Some("server") => run_server(args.get(2).map(String::as_str)),
        Some("client") => run_client(&args[2..]),
        Some(_) => {
            println!("Invalid argument, please use 'client' or 'server'");
            Ok(())
        }
        None => {
            println!("Please specify 'client' or 'server' as argument");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
