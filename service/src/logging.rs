use crate::config::Config;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Crates whose records are shown below Trace. Records carry their module
/// target, so stream lifecycle lines read `sse::writer`, `sse::heartbeat`,
/// `sse::bridge` and so on.
const SERVICE_TARGETS: &[&str] = &["push_multiplexer", "service", "web", "sse", "events"];

pub struct Logger {}

impl Logger {
    /// Install the terminal logger at the configured level.
    ///
    /// Only this service's own targets are logged unless the level is Trace,
    /// which also lets through the HTTP stack and runtime.
    pub fn init_logger(config: &Config) {
        let level = config.log_level_filter;

        if let Err(e) = TermLogger::init(
            level,
            Self::build_log_config(level),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ) {
            eprintln!("Failed to start simplelog: {e}");
        }
    }

    fn includes_dependencies(level: LevelFilter) -> bool {
        level == LevelFilter::Trace
    }

    fn build_log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder
            .set_time_format_rfc3339()
            .set_target_level(LevelFilter::Error)
            .set_thread_level(LevelFilter::Off);

        if !Self::includes_dependencies(level) {
            for target in SERVICE_TARGETS {
                builder.add_filter_allow_str(target);
            }
        }

        builder.build()
    }
}
