use avrcec::Config;
use getopts::{Matches, Options};
use std::fmt;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};
use tracing_subscriber::EnvFilter;

/// Options shared by all tools.
pub fn common_opts() -> Options {
    let mut opts = Options::new();
    opts.optopt("c", "", "Configuration file (YAML)", "file");
    opts.optopt("p", "", "Receiver TCP port (default 23)", "port");
    opts.optflag("v", "", "Verbose output");
    opts.optflag("d", "", "Debugging output");
    opts.optopt("t", "", "Timestamp format (default '%T%.3f')", "fmt");
    opts
}

/// Renders log timestamps in local time with a chrono format string.
struct LocalTime(String);

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format(&self.0))
    }
}

/// Installs the global subscriber. `-v`/`-d` win over `RUST_LOG`.
pub fn init_logging(matches: &Matches) {
    let filter = if matches.opt_present("d") {
        EnvFilter::new("trace")
    } else if matches.opt_present("v") {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let tf = matches.opt_str("t").unwrap_or("%T%.3f".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(LocalTime(tf))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the configuration from `-c`, then applies `-p` and the receiver
/// host given as the single free argument.
pub fn load_config(matches: &Matches) -> Result<Config, String> {
    let mut config = match matches.opt_str("c") {
        Some(path) => Config::load(&path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    if let Some(port) = matches.opt_str("p") {
        config.receiver.port = port
            .parse::<u16>()
            .map_err(|_| format!("Invalid port '{}'", port))?;
    }
    match matches.free.len() {
        0 => {}
        1 => config.receiver.host = matches.free[0].clone(),
        _ => return Err("This program supports only a single receiver".to_string()),
    }
    if config.receiver.host.is_empty() {
        return Err("need receiver host".to_string());
    }
    Ok(config)
}
