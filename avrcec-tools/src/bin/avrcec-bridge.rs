//! avrcec-bridge
//!
//! Follows the AV receiver and turns the display on and off over HDMI-CEC
//! to match: on when a video source is selected, off when the receiver goes
//! to standby.

use avrcec::avr::{Link, TcpConnector};
use avrcec::bridge::{spawn_link, Bridge};
use avrcec::cec::client::CecClient;
use avrcec::cec::dispatch;
use avrcec::power::{ChannelWaiter, Coordinator};
use std::env;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let mut opts = avrcec_tools::common_opts();
    opts.optopt("", "cec-client", "Path to cec-client (default: cec-client)", "path");

    let args: Vec<String> = env::args().collect();

    macro_rules! die{
        ($f:expr,$($a:tt)*)=>{
        {
            die!(format!($f, $($a)*));
        }
        };
        ($msg:expr)=>{
        {
            error!("{}", $msg);
            return ExitCode::FAILURE;
        }
        };
    }
    macro_rules! die_usage{
        ($f:expr,$($a:tt)*)=>{
        {
            die_usage!(format!($f, $($a)*));
        }
        };
        ($msg:expr)=>{
        {
            let usage = format!(
                "Usage: {} [-c file] [-p port] [-v] [-d] [-t fmt] [--cec-client path] [receiver_host]",
                &args[0]
            );
            eprintln!("ERROR: {}\n{}", $msg, opts.usage(&usage));
            return ExitCode::FAILURE;
        }
        };
    }

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => die_usage!("{}", f.to_string()),
    };
    let mut config = match avrcec_tools::load_config(&matches) {
        Ok(config) => config,
        Err(msg) => die_usage!(msg),
    };
    if let Some(path) = matches.opt_str("cec-client") {
        config.bus.client = path;
    }
    avrcec_tools::init_logging(&matches);

    let (bus_send, bus_rx) = dispatch::rx_channel();
    let client = match CecClient::new(&config.bus, dispatch::dispatch_to_channel(bus_send)) {
        Ok(client) => client,
        Err(err) => die!("Failed to start {}: {}", config.bus.client, err),
    };
    info!("bus transport started as {:?}", config.bus.address);

    let connector = match TcpConnector::resolve(
        &config.receiver.host,
        config.receiver.port,
        config.receiver.read_timeout(),
    ) {
        Ok(connector) => connector,
        Err(err) => die!(err),
    };
    let receiver = &config.receiver;
    let link = match Link::open(connector, &receiver.status_query, receiver.max_line) {
        Ok(link) => link,
        Err(err) => die!(err),
    };
    let link_rx = match spawn_link(link) {
        Ok(rx) => rx,
        Err(err) => die!("Failed to start receiver link thread: {}", err),
    };

    let coordinator = Coordinator::new(
        client,
        ChannelWaiter::new(bus_rx.clone()),
        config.display.address,
        config.sources.policy(),
        config.display.retry_policy(),
    );
    let mut bridge = Bridge::new(coordinator);
    if let Err(err) = bridge.run(link_rx, bus_rx) {
        die!(err);
    }
    ExitCode::SUCCESS
}
