use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Environment variable that, when set, overrides the verbosity given on the command line.
const LOG_ENV_VAR: &str = "METERBINDER_LOG";

/// Initializes logging, with a level derived from the given verbosity:
/// `0` is `WARN`, every increment (decrement) is one level more (less) verbose.
pub fn init(verbosity_level: i8) {
    let default_level = match verbosity_level {
        i8::MIN..=-2 => LevelFilter::Off,
        -1 => LevelFilter::Error,
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        3..=i8::MAX => LevelFilter::Trace,
    };

    let mut builder = Builder::new();
    builder.filter_level(default_level);
    builder.parse_env(Env::new().filter(LOG_ENV_VAR));
    builder.format(|buf, record| {
        writeln!(buf, "{} {:<5} [{}] {}", buf.timestamp_millis(), record.level(), record.target(), record.args())
    });
    builder.init();

    info!("Logging initialized at '{}'", log::max_level());
}
