// Call logging wrapper.
// Logs a function's name and arguments before running it, and logs its error if it fails.

use std::fmt::{Debug, Display};

use tracing::{Level, debug, error, info, trace, warn};

/// Run `f`, logging `"<name> - <args>"` at `level` first.
///
/// An `Err` is logged at error level with the same prefix and returned unchanged.
pub fn log_call<T, E, A, F>(level: Level, name: &str, args: &A, f: F) -> Result<T, E>
where
    A: Debug + ?Sized,
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    let line = format!("{} - {:?}", name, args);
    match level {
        Level::ERROR => error!("{}", line),
        Level::WARN => warn!("{}", line),
        Level::INFO => info!("{}", line),
        Level::DEBUG => debug!("{}", line),
        _ => trace!("{}", line),
    }

    f().inspect_err(|e| error!("{} - {}", line, e))
}
