//! Opening a single socket to a single endpoint.

use std::io;
use std::thread;
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

use crate::connect::{Interrupt, StrategyConfig};
use crate::net::{Endpoint, TcpChannel};
use crate::trace::{debug, trace};

/// Failure other than "host did not accept" while opening a channel.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The interrupt handle was raised during the attempt.
    #[error("connect attempt interrupted")]
    Interrupted,
    /// The socket could not be set up after the peer accepted it.
    #[error("socket setup failed: {0}")]
    Io(#[from] io::Error),
}

/// Opens channels for a connection strategy.
///
/// `Ok(None)` means the host refused or did not answer in time; strategies
/// treat it as an ordinary failover step. Errors take the strategy's
/// exceptional paths (see [`AlwaysStartOnPrimary`](super::AlwaysStartOnPrimary)).
pub trait ChannelOpener {
    /// The connected channel type.
    type Channel;

    /// Attempts to connect to `endpoint`.
    ///
    /// # Errors
    ///
    /// [`OpenError::Interrupted`] when `interrupt` is raised, [`OpenError::Io`]
    /// for any other failure. A partially set-up channel is closed before
    /// returning an error.
    fn open(
        &mut self,
        endpoint: Endpoint,
        config: &StrategyConfig,
        interrupt: &Interrupt,
    ) -> Result<Option<Self::Channel>, OpenError>;
}

/// Opens non-blocking [`TcpChannel`]s.
///
/// Within one `pause_period` window the opener keeps retrying
/// `connect(2)` with `socket_connection_timeout` each time, yielding
/// between attempts, so a host that is just coming up is still picked.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpOpener;

/// `connect_timeout` rejects a zero duration.
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_millis(1);

impl ChannelOpener for TcpOpener {
    type Channel = TcpChannel;

    fn open(
        &mut self,
        endpoint: Endpoint,
        config: &StrategyConfig,
        interrupt: &Interrupt,
    ) -> Result<Option<TcpChannel>, OpenError> {
        let deadline = Instant::now() + config.pause_period;
        let timeout = config.socket_connection_timeout.max(MIN_CONNECT_TIMEOUT);
        let addr = endpoint.as_socket_addr();

        loop {
            if interrupt.is_interrupted() {
                return Err(OpenError::Interrupted);
            }

            match std::net::TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return configure(stream, config).map(Some),
                Err(_e) => {
                    trace!(%endpoint, error = %_e, "connect attempt failed");
                }
            }

            if Instant::now() >= deadline {
                debug!(%endpoint, window = ?config.pause_period, "gave up on endpoint");
                return Ok(None);
            }
            thread::yield_now();
        }
    }
}

fn configure(stream: std::net::TcpStream, config: &StrategyConfig) -> Result<TcpChannel, OpenError> {
    let channel = TcpChannel::from_std(stream)?;
    channel.set_nodelay(true)?;
    channel.set_recv_buffer_size(config.tcp_buffer_size)?;
    channel.set_send_buffer_size(config.tcp_buffer_size)?;
    Ok(channel)
}
