use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use sse::FailurePayload;
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Milliseconds between keep-alive comments on result streams
    #[arg(long, env, default_value_t = 3000)]
    pub results_heartbeat_ms: u64,

    /// Milliseconds between keep-alive comments on event bridge streams
    #[arg(long, env, default_value_t = 10_000)]
    pub events_heartbeat_ms: u64,

    /// Payload shape of `error` frames: the failure message as text, or a
    /// `{"message": ...}` JSON object
    #[arg(
        long,
        env,
        default_value_t = FailurePayload::Message,
        value_parser = clap::builder::PossibleValuesParser::new(["message", "structured"])
            .map(|s| s.parse::<FailurePayload>().unwrap()),
        )]
    pub failure_payload: FailurePayload,

    /// Number of encoded frames that may queue ahead of a slow client
    #[arg(long, env, default_value_t = 64)]
    pub body_buffer: usize,

    /// Number of frames producers may queue ahead of the writer. Event bridge
    /// frames arriving while it is full are dropped
    #[arg(long, env, default_value_t = 256)]
    pub frame_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Parse from an explicit argument list instead of the process arguments.
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Config::try_parse_from(args)
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn results_heartbeat(&self) -> Duration {
        Duration::from_millis(self.results_heartbeat_ms)
    }

    pub fn events_heartbeat(&self) -> Duration {
        Duration::from_millis(self.events_heartbeat_ms)
    }
}
