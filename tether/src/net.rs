//! Network primitives.
//!
//! Resolved host endpoints and the non-blocking TCP channel handed out by the
//! connection strategy. Currently mio-based.

pub mod endpoint;
pub mod socket;

pub use endpoint::Endpoint;
pub use socket::TcpChannel;
