//! avr-monitor
//!
//! Connects to the AV receiver and logs what it reports, as interpreted by
//! the bridge, without touching the bus.

use avrcec::avr::{Link, LinkEvent, SourceEvent, SourceTracker, TcpConnector};
use std::env;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let mut opts = avrcec_tools::common_opts();
    opts.optflag("", "raw", "Also log every line received");

    let args: Vec<String> = env::args().collect();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            let usage = format!(
                "Usage: {} [-c file] [-p port] [-v] [-d] [-t fmt] [--raw] [receiver_host]",
                &args[0]
            );
            eprintln!("ERROR: {}\n{}", f, opts.usage(&usage));
            return ExitCode::FAILURE;
        }
    };
    let config = match avrcec_tools::load_config(&matches) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            return ExitCode::FAILURE;
        }
    };
    avrcec_tools::init_logging(&matches);
    let raw = matches.opt_present("raw");

    let link = TcpConnector::resolve(
        &config.receiver.host,
        config.receiver.port,
        config.receiver.read_timeout(),
    )
    .and_then(|connector| {
        Link::open(connector, &config.receiver.status_query, config.receiver.max_line)
    });
    let mut link = match link {
        Ok(link) => link,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let policy = config.sources.policy();
    let mut tracker = SourceTracker::new();
    loop {
        let line = match link.poll_line() {
            Ok(LinkEvent::Line(line)) => line,
            Ok(LinkEvent::Reconnected) => {
                info!("reconnected");
                tracker.reset();
                continue;
            }
            Err(err) => {
                error!("{}", err);
                return ExitCode::FAILURE;
            }
        };
        if raw {
            info!("<< {}", line);
        }
        match tracker.interpret(&line) {
            SourceEvent::Initial(source) => info!("source: {:?}", source),
            SourceEvent::Changed(source) => info!(
                "source changed: {:?} (would {})",
                source,
                if policy.suppresses_auto_power_on(source) {
                    "leave the display alone"
                } else {
                    "power on the display"
                }
            ),
            SourceEvent::PowerOn => info!("power on"),
            SourceEvent::Standby => info!("standby (would power off the display)"),
            SourceEvent::NoOp => {}
        }
    }
}
