//! Resilient transport core for a TCP client talking to a cluster of
//! interchangeable hosts.
//!
//! - [`connect`]: restart-at-primary failover across candidate hosts.
//! - [`correlation`]: transaction-id to in-flight context map.
//! - [`pipeline`]: ring-buffered socket I/O with in-place message handling.
//! - [`net`]: endpoints and the non-blocking TCP channel.
//!
//! Logging goes through `tracing` when the `tracing` feature is enabled and
//! compiles away otherwise.

pub mod connect;
pub mod correlation;
pub mod net;
pub mod pipeline;

mod trace;

pub use trace::init_tracing;

#[doc(inline)]
pub use connect::{
    AddressCursor, AddressList, AlwaysStartOnPrimary, ConnectionStrategy, FatalFailureMonitor,
    Interrupt, StrategyConfig,
};
#[doc(inline)]
pub use correlation::{CorrelationMap, SyncCorrelationMap};
#[doc(inline)]
pub use net::{Endpoint, TcpChannel};
#[doc(inline)]
pub use pipeline::{BufferPipeline, PipelineConfig, PipelineError, TcpHandler, Transfer};
