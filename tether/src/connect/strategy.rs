//! Failover policies.

use std::time::Duration;

use crate::connect::{
    AddressCursor, ChannelOpener, Interrupt, OpenError, StrategyConfig, TcpOpener,
};
use crate::net::Endpoint;
use crate::trace::{debug, error, info, warn};

/// Receives the single "no host could be reached" notification of a failed
/// [`ConnectionStrategy::connect`] call.
pub trait FatalFailureMonitor {
    /// Called once with the session name and a message listing every candidate.
    fn on_fatal_failure(&mut self, name: &str, message: &str);
}

impl<F> FatalFailureMonitor for F
where
    F: FnMut(&str, &str),
{
    fn on_fatal_failure(&mut self, name: &str, message: &str) {
        self(name, message);
    }
}

/// Policy deciding which host to try next and when to give up.
pub trait ConnectionStrategy {
    /// The connected channel type.
    type Channel;

    /// Connects to one of the hosts behind `addresses`.
    ///
    /// `did_log_in` tells the policy whether the previous connection completed
    /// its login. The cursor is moved as a side effect. Returns `None` after
    /// notifying `monitor` when every host failed, or without notification
    /// when the attempt was interrupted. Never retried internally once `None`
    /// is returned.
    fn connect(
        &mut self,
        name: &str,
        addresses: &mut dyn AddressCursor,
        did_log_in: bool,
        monitor: &mut dyn FatalFailureMonitor,
    ) -> Option<Self::Channel>;

    /// Advisory pause the caller should observe between `connect` calls.
    fn pause_before_reconnect(&self) -> Duration;
}

/// Walks the hosts in order, starting again from the primary after every
/// successful login.
///
/// # Entry position
///
/// - No resolvable current host, or the previous session logged in: start at
///   the primary.
/// - Otherwise (connected but never logged in, or merely dropped): start at
///   the host after the current one, so a host that just rejected the login
///   is not hit again straight away.
///
/// # Failure paths
///
/// A host that cannot be resolved, or that refuses / times out, is skipped.
/// If it was the last host the monitor is told and `None` is returned.
///
/// An unexpected opener error (anything but interruption) skips the host and
/// pauses for `pause_period`, but never checks for the end of the list. A
/// cluster where every host fails this way is cycled through until the
/// interrupt is raised, and the monitor is never called. This mirrors the
/// established behaviour of this policy and is kept deliberately; owners of
/// the failover contract should decide whether it ought to end in a fatal
/// failure instead.
#[derive(Debug)]
pub struct AlwaysStartOnPrimary<O = TcpOpener> {
    config: StrategyConfig,
    opener: O,
    interrupt: Interrupt,
}

impl AlwaysStartOnPrimary<TcpOpener> {
    /// Creates the policy with TCP sockets and environment defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_opener(TcpOpener)
    }
}

impl Default for AlwaysStartOnPrimary<TcpOpener> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> AlwaysStartOnPrimary<O> {
    /// Creates the policy over a custom opener, with environment defaults.
    #[must_use]
    pub fn with_opener(opener: O) -> Self {
        Self {
            config: StrategyConfig::from_env(),
            opener,
            interrupt: Interrupt::new(),
        }
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: StrategyConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the socket buffer size hint.
    #[must_use]
    pub fn tcp_buffer_size(mut self, size: usize) -> Self {
        self.config.tcp_buffer_size = size;
        self
    }

    /// Sets the per-host attempt window, also used as the retry pause.
    #[must_use]
    pub fn pause_period(mut self, period: Duration) -> Self {
        self.config.pause_period = period;
        self
    }

    /// Sets the timeout of each individual connect call.
    #[must_use]
    pub fn socket_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_connection_timeout = timeout;
        self
    }

    /// Sets the advisory pause between reconnect cycles.
    #[must_use]
    pub fn reconnect_pause(mut self, pause: Duration) -> Self {
        self.config.pause_before_reconnect = pause;
        self
    }

    /// Uses `interrupt` to cancel connect calls.
    #[must_use]
    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Returns the handle that cancels an in-progress `connect`.
    #[must_use]
    pub const fn interrupt_handle(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn settings(&self) -> &StrategyConfig {
        &self.config
    }

    /// Returns the opener.
    #[must_use]
    pub const fn opener(&self) -> &O {
        &self.opener
    }
}

impl<O: ChannelOpener> ConnectionStrategy for AlwaysStartOnPrimary<O> {
    type Channel = O::Channel;

    fn connect(
        &mut self,
        name: &str,
        addresses: &mut dyn AddressCursor,
        did_log_in: bool,
        monitor: &mut dyn FatalFailureMonitor,
    ) -> Option<O::Channel> {
        if did_log_in || addresses.current().is_none() {
            addresses.reset_to_first();
        } else {
            addresses.advance();
        }

        loop {
            let Some(endpoint) = addresses.current() else {
                warn!(session = name, index = addresses.index(), "failed to resolve address");
                if addresses.is_at_end() {
                    return exhausted(name, addresses, monitor);
                }
                addresses.advance();
                continue;
            };

            match self.opener.open(endpoint, &self.config, &self.interrupt) {
                Ok(Some(channel)) => {
                    info!(session = name, %endpoint, "connected");
                    return Some(channel);
                }
                Ok(None) => {
                    debug!(session = name, %endpoint, "unable to connect");
                    if addresses.is_at_end() {
                        return exhausted(name, addresses, monitor);
                    }
                    addresses.advance();
                }
                Err(OpenError::Interrupted) => {
                    debug!(session = name, %endpoint, "connect interrupted");
                    self.interrupt.restore();
                    return None;
                }
                Err(OpenError::Io(e)) => {
                    unexpected_failure(name, endpoint, &e);
                    addresses.advance();
                    if self.interrupt.park_timeout(self.config.pause_period) {
                        debug!(session = name, "interrupted while pausing");
                        return None;
                    }
                }
            }
        }
    }

    fn pause_before_reconnect(&self) -> Duration {
        self.config.pause_before_reconnect
    }
}

fn exhausted<C>(
    name: &str,
    addresses: &dyn AddressCursor,
    monitor: &mut dyn FatalFailureMonitor,
) -> Option<C> {
    let message = format!(
        "Failed to connect to any of these servers={}",
        addresses.all_addresses()
    );
    error!(session = name, "{message}");
    monitor.on_fatal_failure(name, &message);
    None
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn unexpected_failure(name: &str, endpoint: Endpoint, e: &std::io::Error) {
    warn!(session = name, %endpoint, error = %e, "unexpected connect failure, trying next host");
}
