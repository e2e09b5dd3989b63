//! Logging facade. Downstream crates log through the types and macros
//! re-exported here instead of depending on the logging stack directly.

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Logger};
pub use sloggers::types::Severity;

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::{Build, Config, LoggerConfig};

/// Builds a terminal logger emitting to stderr at the supplied severity.
pub fn terminal(level: Severity) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(Destination::Stderr);
    builder.build().expect("Error building terminal logger")
}

/// Builds a logger from a TOML configuration snippet, e.g.
///
/// ```toml
/// type = "terminal"
/// level = "debug"
/// destination = "stderr"
/// ```
pub fn from_toml(config: &str) -> Logger {
    let config: LoggerConfig =
        serdeconv::from_toml_str(config).expect("Error parsing logger configuration");
    config.build_logger().expect("Error building configured logger")
}

/// Logger that drops every record. Default for components constructed
/// without an explicit parent logger.
pub fn null() -> Logger {
    Logger::root(Discard, o!())
}
