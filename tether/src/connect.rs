//! Connection establishment and failover.
//!
//! - `address`: the candidate host cursor the strategies walk.
//! - `strategy`: failover policies ([`AlwaysStartOnPrimary`]).
//! - `opener`: opening one socket to one host ([`TcpOpener`]).
//! - `interrupt`: cancelling a blocked `connect`.
//! - `config`: socket and pacing tunables.

pub mod address;
pub mod config;
pub mod interrupt;
pub mod opener;
pub mod strategy;

pub use address::{AddressCursor, AddressError, AddressList};
pub use config::{ConfigError, StrategyConfig};
pub use interrupt::Interrupt;
pub use opener::{ChannelOpener, OpenError, TcpOpener};
pub use strategy::{AlwaysStartOnPrimary, ConnectionStrategy, FatalFailureMonitor};
