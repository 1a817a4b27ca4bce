//! Candidate host list consumed by connection strategies.

use std::fmt;

use thiserror::Error;

use crate::net::Endpoint;

/// Ordered candidate hosts with a current position.
///
/// Strategies only read and move the cursor; they never own the list.
pub trait AddressCursor {
    /// Resolves the host at the current position, `None` if it cannot be resolved.
    fn current(&self) -> Option<Endpoint>;

    /// Moves back to the primary (first) host.
    fn reset_to_first(&mut self);

    /// Moves to the next host, wrapping after the last one.
    fn advance(&mut self);

    /// Number of candidate hosts.
    fn size(&self) -> usize;

    /// Zero-based current position.
    fn index(&self) -> usize;

    /// Human-readable listing of every candidate, for diagnostics.
    fn all_addresses(&self) -> String;

    /// Returns `true` when the cursor sits on the last candidate.
    fn is_at_end(&self) -> bool {
        self.index() + 1 == self.size()
    }
}

/// Error building an [`AddressList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    /// At least one host is required.
    #[error("address list is empty")]
    Empty,
}

/// `host:port` strings resolved lazily on every [`current`](AddressCursor::current).
///
/// Lazy resolution means a host whose DNS entry disappears is reported as
/// unresolvable rather than retried with a stale address.
#[derive(Debug, Clone)]
pub struct AddressList {
    hosts: Vec<String>,
    index: usize,
}

impl AddressList {
    /// Creates a cursor positioned on the first host.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Empty`] if `hosts` yields nothing.
    pub fn new<I, S>(hosts: I) -> Result<Self, AddressError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hosts: Vec<String> = hosts.into_iter().map(Into::into).collect();
        if hosts.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self { hosts, index: 0 })
    }

    /// Returns the host string at the current position.
    #[must_use]
    pub fn current_host(&self) -> &str {
        &self.hosts[self.index]
    }

    /// Returns every configured host string.
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

impl AddressCursor for AddressList {
    fn current(&self) -> Option<Endpoint> {
        Endpoint::resolve(self.current_host())
    }

    fn reset_to_first(&mut self) {
        self.index = 0;
    }

    fn advance(&mut self) {
        self.index = (self.index + 1) % self.hosts.len();
    }

    fn size(&self) -> usize {
        self.hosts.len()
    }

    fn index(&self) -> usize {
        self.index
    }

    fn all_addresses(&self) -> String {
        format!("[{}]", self.hosts.join(", "))
    }
}

impl fmt::Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{})",
            self.current_host(),
            self.index + 1,
            self.hosts.len()
        )
    }
}
