//! Logging shims.
//!
//! With the `tracing` feature the macros below are `tracing`'s own. Without
//! it they expand to nothing, so the connect loop and the socket pipeline
//! carry no logging code at all. Use them as statements only.

/// Installs a `tracing-subscriber` with an uptime timer and thread ids.
///
/// The filter comes from `RUST_LOG`, falling back to `tether=debug`. Safe to
/// call more than once; only the first call installs anything. A no-op
/// without the `tracing` feature.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tether=debug"));
    let layer = fmt::layer()
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    // Already installed (several tests in one binary) is fine.
    let _ = tracing_subscriber::registry().with(layer).with(filter).try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use discard as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as warn;
