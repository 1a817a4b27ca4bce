//! Multi-buffer socket pipeline.
//!
//! A [`BufferPipeline`] owns a channel and two rings of fixed buffers, one per
//! direction. Bytes read from the socket land straight in an inbound buffer
//! and are handed to a [`TcpHandler`] from there; the handler writes replies
//! straight into an outbound buffer, which [`BufferPipeline::write_to_socket`]
//! drains. Nothing is copied through intermediate containers except the tail
//! of a message that straddles two inbound buffers.
//!
//! # Buffer protocol
//!
//! Each ring has a fill cursor and a drain cursor. Every buffer is twice the
//! maximum message size and keeps one maximum message size in reserve: the
//! socket never fills past the first half, so a partial message can always
//! be carried into the next buffer. Once a fill buffer is down to the reserve
//! the fill cursor moves to the next buffer, unless that buffer is still being
//! drained, in which case the call makes no progress ([`Transfer::Backpressure`]).
//!
//! Only a residue shorter than one maximum message is carried over. A longer
//! one means the handler is holding messages back; the drain cursor then stays
//! where it is until the handler catches up, and the reader is throttled.

mod buffer;
mod handler;

use std::io::{self, ErrorKind, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::buffer::Ring;
pub use self::handler::{Inbound, Outbound, TcpHandler};
use crate::trace::{debug, trace};

/// Default maximum size of a single message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 << 20;

/// Raw value of [`Transfer::EndOfStream`].
pub const END_OF_STREAM: isize = -1;

/// Errors constructing or driving a [`BufferPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Fewer than two buffers per direction.
    #[error("ring of {0} buffers is too small; at least 2 are required")]
    RingTooSmall(usize),

    /// `max_message_size` of zero.
    #[error("maximum message size must be non-zero")]
    MessageSizeZero,

    /// Twice `max_message_size` overflows `usize`.
    #[error("maximum message size {0} is too large")]
    MessageSizeTooLarge(usize),

    /// The handler declared an incoming message longer than the maximum.
    #[error("message of {size} bytes exceeds the maximum of {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// A partial message does not fit in front of the next buffer's bytes.
    #[error("residue of {residue} bytes does not fit in {free} free bytes of the next buffer")]
    ResidueTooLarge { residue: usize, free: usize },
}

/// Pipeline sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Largest single message either direction carries. Buffers are twice this.
    pub max_message_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_message_size: DEFAULT_MAX_MESSAGE_SIZE }
    }
}

/// Outcome of one socket read or write.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Bytes moved; zero when the socket would block or had nothing to take.
    Bytes(usize),
    /// The fill cursor could not rotate; the socket was not touched.
    Backpressure,
    /// The peer closed the connection.
    EndOfStream,
}

impl Transfer {
    /// Byte count, `0` for backpressure, [`END_OF_STREAM`] at end of stream.
    #[inline]
    pub const fn as_raw(self) -> isize {
        match self {
            Self::Bytes(n) => n as isize,
            Self::Backpressure => 0,
            Self::EndOfStream => END_OF_STREAM,
        }
    }

    /// Bytes moved, `0` for the other outcomes.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Bytes(n) => n,
            Self::Backpressure | Self::EndOfStream => 0,
        }
    }

    /// `true` for [`Transfer::EndOfStream`].
    #[inline]
    pub const fn is_end_of_stream(self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

#[inline]
fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Socket-facing buffers for one connection.
///
/// `N` is the network context handed to the handler alongside the buffers;
/// `C` is the channel, usually a [`TcpChannel`](crate::net::TcpChannel).
/// Single owner: every operation takes `&mut self`.
#[derive(Debug)]
pub struct BufferPipeline<N, C> {
    context: N,
    channel: C,
    inbound: Ring,
    outbound: Ring,
}

impl<N, C> BufferPipeline<N, C>
where
    C: Read + Write,
{
    /// Creates a pipeline with `ring_size` buffers per direction and the
    /// default maximum message size.
    pub fn new(context: N, channel: C, ring_size: usize) -> Result<Self, PipelineError> {
        Self::with_config(context, channel, ring_size, PipelineConfig::default())
    }

    /// Creates a pipeline with an explicit [`PipelineConfig`].
    ///
    /// # Errors
    ///
    /// [`PipelineError::RingTooSmall`] for fewer than two buffers,
    /// [`PipelineError::MessageSizeZero`] or
    /// [`PipelineError::MessageSizeTooLarge`] for an unusable message size.
    pub fn with_config(
        context: N,
        channel: C,
        ring_size: usize,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        if ring_size < 2 {
            return Err(PipelineError::RingTooSmall(ring_size));
        }
        let reserve = config.max_message_size;
        if reserve == 0 {
            return Err(PipelineError::MessageSizeZero);
        }
        let capacity =
            reserve.checked_mul(2).ok_or(PipelineError::MessageSizeTooLarge(reserve))?;

        debug!(ring_size, capacity, "pipeline created");
        Ok(Self {
            context,
            channel,
            inbound: Ring::new(ring_size, capacity, reserve),
            outbound: Ring::new(ring_size, capacity, reserve),
        })
    }

    /// Network context handed to the handler.
    pub const fn context(&self) -> &N {
        &self.context
    }

    /// Mutable network context.
    pub const fn context_mut(&mut self) -> &mut N {
        &mut self.context
    }

    /// The wrapped channel.
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutable access to the wrapped channel.
    pub const fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Drops the buffers and returns the context and channel.
    pub fn into_parts(self) -> (N, C) {
        (self.context, self.channel)
    }

    /// Buffers per direction.
    pub fn ring_size(&self) -> usize {
        self.inbound.len()
    }

    /// Largest message either direction carries.
    pub const fn max_message_size(&self) -> usize {
        self.inbound.reserve()
    }

    /// Received bytes the handler has not consumed yet.
    pub fn inbound_pending(&self) -> usize {
        self.inbound.pending()
    }

    /// Produced bytes not yet written to the socket.
    pub fn outbound_pending(&self) -> usize {
        self.outbound.pending()
    }

    /// `(fill, drain)` buffer indices of the inbound ring.
    pub const fn inbound_cursors(&self) -> (usize, usize) {
        (self.inbound.fill(), self.inbound.drain())
    }

    /// `(fill, drain)` buffer indices of the outbound ring.
    pub const fn outbound_cursors(&self) -> (usize, usize) {
        (self.outbound.fill(), self.outbound.drain())
    }

    /// Reads whatever the socket has into the inbound fill buffer.
    ///
    /// Returns [`Transfer::Backpressure`] without reading when the fill
    /// buffer is full and the next one has not been drained yet.
    pub fn read_from_socket(&mut self) -> io::Result<Transfer> {
        let ring = &mut self.inbound;
        ring.reset_if_drained();
        if !ring.rotate_fill() {
            debug!(fill = ring.fill(), drain = ring.drain(), "inbound backpressure");
            return Ok(Transfer::Backpressure);
        }

        let reserve = ring.reserve();
        let buffer = ring.fill_buffer_mut();
        let limit = buffer.capacity() - reserve;
        match self.channel.read(buffer.spare_mut(limit)) {
            Ok(0) => {
                debug!("inbound end of stream");
                Ok(Transfer::EndOfStream)
            }
            Ok(n) => {
                buffer.commit(n);
                Ok(Transfer::Bytes(n))
            }
            Err(e) if is_transient(&e) => Ok(Transfer::Bytes(0)),
            Err(e) => Err(e),
        }
    }

    /// Writes pending outbound bytes from the drain buffer.
    ///
    /// One socket write per call. Returns `Bytes(0)` when there is nothing to
    /// write or the socket would block.
    pub fn write_to_socket(&mut self) -> io::Result<Transfer> {
        let ring = &mut self.outbound;
        while ring.is_sealed() && ring.drain_buffer().is_drained() {
            ring.advance_drain();
        }
        ring.reset_if_drained();

        let buffer = ring.drain_buffer();
        if buffer.is_drained() {
            return Ok(Transfer::Bytes(0));
        }
        match self.channel.write(buffer.readable()) {
            Ok(0) => {
                debug!("outbound end of stream");
                Ok(Transfer::EndOfStream)
            }
            Ok(n) => {
                ring.drain_buffer_mut().consume(n);
                if ring.is_sealed() && ring.drain_buffer().is_drained() {
                    ring.advance_drain();
                }
                ring.reset_if_drained();
                Ok(Transfer::Bytes(n))
            }
            Err(e) if is_transient(&e) => Ok(Transfer::Bytes(0)),
            Err(e) => Err(e),
        }
    }

    /// Hands received bytes to `handler` and lets it write replies.
    ///
    /// Sealed inbound buffers (the fill cursor has moved past them) are
    /// processed in order. A residue shorter than one maximum message left
    /// in a sealed buffer is moved to the front of the next one, so a message
    /// split across two buffers reaches the handler whole on the following
    /// invocation. A longer residue stays put, along with the drain cursor,
    /// until the handler consumes more of it.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MessageTooLarge`] when the handler declares (through
    /// [`Inbound::need`]) a message longer than the maximum.
    /// [`PipelineError::ResidueTooLarge`] if a residue cannot be carried over.
    pub fn handle_tcp<H>(&mut self, handler: &mut H) -> Result<(), PipelineError>
    where
        H: TcpHandler<N> + ?Sized,
    {
        let Self { context, inbound, outbound, .. } = self;
        let max = inbound.reserve();
        loop {
            if let Some(size) = dispatch(inbound, outbound, context, handler)
                && size > max
            {
                return Err(PipelineError::MessageTooLarge { size, max });
            }
            if !inbound.is_sealed() {
                break;
            }
            let residue = inbound.drain_buffer().pending();
            if residue >= max {
                debug!(residue, drain = inbound.drain(), "inbound consumer lagging");
                break;
            }
            inbound
                .stitch_residue()
                .map_err(|(residue, free)| PipelineError::ResidueTooLarge { residue, free })?;
        }
        inbound.reset_if_drained();
        Ok(())
    }
}

/// One handler invocation over the inbound drain buffer and the outbound
/// fill buffer. Returns the message length the handler declared, if any.
fn dispatch<N, H>(
    inbound: &mut Ring,
    outbound: &mut Ring,
    nc: &mut N,
    handler: &mut H,
) -> Option<usize>
where
    H: TcpHandler<N> + ?Sized,
{
    let mut received = Inbound::new(inbound.drain_buffer().readable());
    if outbound.rotate_fill() {
        let buffer = outbound.fill_buffer_mut();
        let capacity = buffer.capacity();
        let mut reply = Outbound::new(buffer.spare_mut(capacity));
        handler.process(&mut received, &mut reply, nc);
        let written = reply.written();
        buffer.commit(written);
    } else {
        debug!(fill = outbound.fill(), drain = outbound.drain(), "outbound backpressure");
        handler.process(&mut received, &mut Outbound::blocked(), nc);
    }
    let consumed = received.consumed();
    trace!(consumed, "handler returned");
    let needed = received.needed();
    inbound.drain_buffer_mut().consume(consumed);
    needed
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    const SMALL: PipelineConfig = PipelineConfig { max_message_size: 16 };

    #[derive(Debug)]
    enum Step {
        Data(Vec<u8>),
        Block,
        Eof,
    }

    /// Scripted channel. Reads follow `script`; an exhausted script blocks.
    #[derive(Debug, Default)]
    struct MockChannel {
        script: VecDeque<Step>,
        reads: usize,
        written: Vec<u8>,
        write_limit: Option<usize>,
        write_blocked: bool,
        write_closed: bool,
    }

    impl MockChannel {
        fn with(steps: impl IntoIterator<Item = Step>) -> Self {
            Self { script: steps.into_iter().collect(), ..Self::default() }
        }
    }

    impl Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            match self.script.pop_front() {
                None | Some(Step::Block) => Err(ErrorKind::WouldBlock.into()),
                Some(Step::Eof) => {
                    self.script.push_front(Step::Eof);
                    Ok(0)
                }
                Some(Step::Data(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.script.push_front(Step::Data(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.write_blocked {
                return Err(ErrorKind::WouldBlock.into());
            }
            if self.write_closed {
                return Ok(0);
            }
            let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Decodes one-byte length-prefixed frames, optionally echoing each one.
    #[derive(Debug, Default)]
    struct FrameHandler {
        frames: Vec<Vec<u8>>,
        echo: bool,
    }

    impl TcpHandler<u64> for FrameHandler {
        fn process(&mut self, inbound: &mut Inbound<'_>, outbound: &mut Outbound<'_>, nc: &mut u64) {
            loop {
                let bytes = inbound.readable();
                let Some(&len) = bytes.first() else { break };
                let total = 1 + usize::from(len);
                if bytes.len() < total {
                    break;
                }
                if self.echo && !outbound.put(&bytes[..total]) {
                    break;
                }
                self.frames.push(bytes[1..total].to_vec());
                inbound.advance(total);
                *nc += 1;
            }
        }
    }

    /// `count` frames of four payload bytes each, payload `[i; 4]`.
    fn frames(count: u8) -> Vec<u8> {
        (0..count).flat_map(|i| [4, i, i, i, i]).collect()
    }

    fn drain_all(inbound: &mut Inbound<'_>, _: &mut Outbound<'_>, seen: &mut Vec<u8>) {
        seen.extend_from_slice(inbound.readable());
        inbound.advance(inbound.remaining());
    }

    fn ignore(_: &mut Inbound<'_>, _: &mut Outbound<'_>, _: &mut ()) {}

    #[test]
    fn rejects_small_ring() {
        let err = BufferPipeline::with_config((), MockChannel::default(), 1, SMALL).unwrap_err();
        assert_eq!(err, PipelineError::RingTooSmall(1));
        assert!(BufferPipeline::new((), MockChannel::default(), 0).is_err());
    }

    #[test]
    fn rejects_zero_message_size() {
        let config = PipelineConfig { max_message_size: 0 };
        let err = BufferPipeline::with_config((), MockChannel::default(), 2, config).unwrap_err();
        assert_eq!(err, PipelineError::MessageSizeZero);
    }

    #[test]
    fn transfer_raw_values_are_distinct() {
        assert_eq!(Transfer::Bytes(7).as_raw(), 7);
        assert_eq!(Transfer::Bytes(0).as_raw(), 0);
        assert_eq!(Transfer::Backpressure.as_raw(), 0);
        assert_eq!(Transfer::EndOfStream.as_raw(), END_OF_STREAM);
        assert!(END_OF_STREAM < 0);
    }

    #[test]
    fn read_then_handle() {
        let channel = MockChannel::with([Step::Data(frames(3))]);
        let mut pipeline = BufferPipeline::with_config(0u64, channel, 2, SMALL).unwrap();
        let mut handler = FrameHandler::default();

        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(15));
        assert_eq!(pipeline.inbound_pending(), 15);
        pipeline.handle_tcp(&mut handler).unwrap();

        assert_eq!(handler.frames, vec![vec![0; 4], vec![1; 4], vec![2; 4]]);
        assert_eq!(*pipeline.context(), 3);
        assert_eq!(pipeline.inbound_pending(), 0);
    }

    #[test]
    fn would_block_is_zero_progress() {
        let channel = MockChannel::with([Step::Block]);
        let mut pipeline = BufferPipeline::with_config((), channel, 2, SMALL).unwrap();
        let transfer = pipeline.read_from_socket().unwrap();
        assert_eq!(transfer, Transfer::Bytes(0));
        assert_eq!(transfer.as_raw(), 0);
    }

    #[test]
    fn end_of_stream_sentinel() {
        let channel = MockChannel::with([Step::Data(vec![1, 2]), Step::Eof]);
        let mut pipeline = BufferPipeline::with_config((), channel, 2, SMALL).unwrap();
        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(2));
        let transfer = pipeline.read_from_socket().unwrap();
        assert!(transfer.is_end_of_stream());
        assert_eq!(transfer.as_raw(), END_OF_STREAM);
        assert_eq!(pipeline.inbound_pending(), 2);
    }

    #[test]
    fn socket_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(ErrorKind::ConnectionReset.into())
            }
        }
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut pipeline = BufferPipeline::with_config((), Broken, 2, SMALL).unwrap();
        let err = pipeline.read_from_socket().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
    }

    #[test]
    fn backpressure_leaves_socket_untouched() {
        let channel = MockChannel::with([Step::Data(vec![9; 48])]);
        let mut pipeline = BufferPipeline::with_config(Vec::new(), channel, 2, SMALL).unwrap();

        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(16));
        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(16));
        assert_eq!(pipeline.inbound_cursors(), (1, 0));

        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Backpressure);
        assert_eq!(pipeline.channel().reads, 2);
        assert_eq!(pipeline.inbound_cursors(), (1, 0));

        pipeline.handle_tcp(&mut drain_all).unwrap();
        assert_eq!(pipeline.context().len(), 32);
        assert_eq!(pipeline.inbound_cursors(), (1, 1));
        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(16));
        assert_eq!(pipeline.channel().reads, 3);
    }

    #[test]
    fn frames_straddling_buffers_arrive_whole() {
        let channel = MockChannel::with([Step::Data(frames(8))]);
        let mut pipeline = BufferPipeline::with_config(0u64, channel, 3, SMALL).unwrap();
        let mut handler = FrameHandler::default();

        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(16));
        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(16));
        pipeline.handle_tcp(&mut handler).unwrap();
        assert_eq!(handler.frames.len(), 6);
        assert_eq!(pipeline.inbound_pending(), 2);

        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(8));
        pipeline.handle_tcp(&mut handler).unwrap();

        let expected: Vec<Vec<u8>> = (0..8).map(|i| vec![i; 4]).collect();
        assert_eq!(handler.frames, expected);
        assert_eq!(pipeline.inbound_pending(), 0);
        assert_eq!(*pipeline.context(), 8);
    }

    #[test]
    fn silent_consumer_throttles_reader() {
        let channel = MockChannel::with([Step::Data(vec![0; 48])]);
        let mut pipeline = BufferPipeline::with_config((), channel, 2, SMALL).unwrap();

        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(16));
        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(16));
        pipeline.handle_tcp(&mut ignore).unwrap();
        assert_eq!(pipeline.inbound_cursors(), (1, 0));

        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Backpressure);
        assert_eq!(pipeline.channel().reads, 2);
        assert_eq!(pipeline.inbound_pending(), 32);
    }

    #[test]
    fn declared_oversized_message_is_an_error() {
        fn declare_forty(inbound: &mut Inbound<'_>, _: &mut Outbound<'_>, _: &mut ()) {
            inbound.need(40);
        }

        let channel = MockChannel::with([Step::Data(vec![40; 10])]);
        let mut pipeline = BufferPipeline::with_config((), channel, 2, SMALL).unwrap();

        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(10));
        assert_eq!(
            pipeline.handle_tcp(&mut declare_forty),
            Err(PipelineError::MessageTooLarge { size: 40, max: 16 })
        );
        assert_eq!(pipeline.inbound_pending(), 10);
    }

    #[test]
    fn blocked_writes_hold_back_frames_until_drained() {
        let input = frames(20);
        let channel = MockChannel {
            script: VecDeque::from([Step::Data(input.clone())]),
            write_blocked: true,
            ..MockChannel::default()
        };
        let mut pipeline = BufferPipeline::with_config(0u64, channel, 2, SMALL).unwrap();
        let mut handler = FrameHandler { echo: true, ..FrameHandler::default() };

        let mut throttled = false;
        for _ in 0..20 {
            match pipeline.read_from_socket().unwrap() {
                Transfer::Backpressure => {
                    throttled = true;
                    break;
                }
                Transfer::Bytes(_) => {}
                Transfer::EndOfStream => panic!("unexpected end of stream"),
            }
            pipeline.handle_tcp(&mut handler).unwrap();
            assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::Bytes(0));
        }
        assert!(throttled, "reader was never throttled");

        let reads = pipeline.channel().reads;
        assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Backpressure);
        assert_eq!(pipeline.channel().reads, reads);
        assert!(handler.frames.len() < 20);

        pipeline.channel_mut().write_blocked = false;
        for _ in 0..100 {
            if handler.frames.len() == 20 && pipeline.outbound_pending() == 0 {
                break;
            }
            let _ = pipeline.read_from_socket().unwrap();
            pipeline.handle_tcp(&mut handler).unwrap();
            while pipeline.write_to_socket().unwrap().bytes() > 0 {}
        }

        let expected: Vec<Vec<u8>> = (0..20).map(|i| vec![i; 4]).collect();
        assert_eq!(handler.frames, expected);
        assert_eq!(pipeline.channel().written, input);
        assert_eq!(*pipeline.context(), 20);
    }

    /// Echo handler that sometimes refuses to consume anything.
    #[derive(Debug, Default)]
    struct MoodyEcho {
        inner: FrameHandler,
        stalled: bool,
    }

    impl TcpHandler<u64> for MoodyEcho {
        fn process(&mut self, inbound: &mut Inbound<'_>, outbound: &mut Outbound<'_>, nc: &mut u64) {
            if !self.stalled {
                self.inner.process(inbound, outbound, nc);
            }
        }
    }

    #[test]
    fn random_chunking_stalls_and_write_refusals() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);

            let payloads: Vec<Vec<u8>> = (0..200)
                .map(|_| {
                    let len = rng.random_range(0..=15usize);
                    (0..len).map(|_| rng.random()).collect()
                })
                .collect();
            let input: Vec<u8> = payloads
                .iter()
                .flat_map(|p| std::iter::once(p.len() as u8).chain(p.iter().copied()))
                .collect();

            let mut script = VecDeque::new();
            let mut rest = input.as_slice();
            while !rest.is_empty() {
                if rng.random_bool(0.3) {
                    script.push_back(Step::Block);
                }
                let n = rng.random_range(1..=24usize).min(rest.len());
                script.push_back(Step::Data(rest[..n].to_vec()));
                rest = &rest[n..];
            }

            let channel = MockChannel {
                script,
                write_limit: Some(rng.random_range(1..=20)),
                ..MockChannel::default()
            };
            let ring_size = rng.random_range(2..=4);
            let mut pipeline =
                BufferPipeline::with_config(0u64, channel, ring_size, SMALL).unwrap();
            let mut handler = MoodyEcho {
                inner: FrameHandler { echo: true, ..FrameHandler::default() },
                stalled: false,
            };

            let mut rounds = 0;
            while handler.inner.frames.len() < payloads.len() || pipeline.outbound_pending() > 0 {
                rounds += 1;
                assert!(rounds < 100_000, "seed {seed}: no progress");

                let transfer = pipeline.read_from_socket().unwrap();
                assert!(!transfer.is_end_of_stream(), "seed {seed}");

                handler.stalled = rng.random_bool(0.3);
                pipeline
                    .handle_tcp(&mut handler)
                    .unwrap_or_else(|e| panic!("seed {seed}: {e}"));

                pipeline.channel_mut().write_blocked = rng.random_bool(0.4);
                while pipeline.write_to_socket().unwrap().bytes() > 0 {}
            }

            assert_eq!(handler.inner.frames, payloads, "seed {seed}");
            assert_eq!(pipeline.channel().written, input, "seed {seed}");
        }
    }

    #[test]
    fn drained_buffer_is_reused_from_the_start() {
        let channel = MockChannel::with((0..3).map(|_| Step::Data(vec![1; 10])));
        let mut pipeline = BufferPipeline::with_config(Vec::new(), channel, 2, SMALL).unwrap();

        for _ in 0..3 {
            assert_eq!(pipeline.read_from_socket().unwrap(), Transfer::Bytes(10));
            pipeline.handle_tcp(&mut drain_all).unwrap();
            assert_eq!(pipeline.inbound_cursors(), (0, 0));
        }
        assert_eq!(pipeline.context().len(), 30);
    }

    #[test]
    fn echoed_frames_are_written() {
        let input = frames(3);
        let channel = MockChannel::with([Step::Data(input.clone())]);
        let mut pipeline = BufferPipeline::with_config(0u64, channel, 2, SMALL).unwrap();
        let mut handler = FrameHandler { echo: true, ..FrameHandler::default() };

        let _ = pipeline.read_from_socket().unwrap();
        pipeline.handle_tcp(&mut handler).unwrap();
        assert_eq!(pipeline.outbound_pending(), 15);

        assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::Bytes(15));
        assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::Bytes(0));
        assert_eq!(pipeline.channel().written, input);
        assert_eq!(pipeline.outbound_cursors(), (0, 0));
    }

    #[test]
    fn outbound_backpressure_blocks_handler() {
        #[derive(Default)]
        struct Blaster {
            blocked: usize,
        }

        impl TcpHandler<()> for Blaster {
            fn process(&mut self, _: &mut Inbound<'_>, outbound: &mut Outbound<'_>, _: &mut ()) {
                if outbound.is_blocked() {
                    self.blocked += 1;
                } else {
                    assert!(outbound.put(&[7; 20]));
                }
            }
        }

        let mut pipeline =
            BufferPipeline::with_config((), MockChannel::default(), 2, SMALL).unwrap();
        let mut blaster = Blaster::default();

        pipeline.handle_tcp(&mut blaster).unwrap();
        pipeline.handle_tcp(&mut blaster).unwrap();
        assert_eq!(pipeline.outbound_cursors(), (1, 0));
        pipeline.handle_tcp(&mut blaster).unwrap();
        assert_eq!(blaster.blocked, 1);
        assert_eq!(pipeline.outbound_pending(), 40);

        assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::Bytes(20));
        assert_eq!(pipeline.outbound_cursors(), (1, 1));
        assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::Bytes(20));
        assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::Bytes(0));

        pipeline.handle_tcp(&mut blaster).unwrap();
        assert_eq!(blaster.blocked, 1);
        assert_eq!(pipeline.channel().written.len(), 40);
    }

    #[test]
    fn partial_writes_resume() {
        let input = frames(3);
        let channel = MockChannel {
            script: VecDeque::from([Step::Data(input.clone())]),
            write_limit: Some(4),
            ..MockChannel::default()
        };
        let mut pipeline = BufferPipeline::with_config(0u64, channel, 2, SMALL).unwrap();
        let mut handler = FrameHandler { echo: true, ..FrameHandler::default() };

        let _ = pipeline.read_from_socket().unwrap();
        pipeline.handle_tcp(&mut handler).unwrap();

        let mut total = 0;
        loop {
            match pipeline.write_to_socket().unwrap() {
                Transfer::Bytes(0) => break,
                Transfer::Bytes(n) => total += n,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(total, 15);
        assert_eq!(pipeline.channel().written, input);
    }

    #[test]
    fn blocked_write_keeps_bytes() {
        let channel = MockChannel {
            script: VecDeque::from([Step::Data(frames(1))]),
            write_blocked: true,
            ..MockChannel::default()
        };
        let mut pipeline = BufferPipeline::with_config(0u64, channel, 2, SMALL).unwrap();
        let mut handler = FrameHandler { echo: true, ..FrameHandler::default() };

        let _ = pipeline.read_from_socket().unwrap();
        pipeline.handle_tcp(&mut handler).unwrap();
        assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::Bytes(0));
        assert_eq!(pipeline.outbound_pending(), 5);

        pipeline.channel_mut().write_blocked = false;
        assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::Bytes(5));
    }

    #[test]
    fn closed_peer_on_write() {
        let channel = MockChannel {
            script: VecDeque::from([Step::Data(frames(1))]),
            write_closed: true,
            ..MockChannel::default()
        };
        let mut pipeline = BufferPipeline::with_config(0u64, channel, 2, SMALL).unwrap();
        let mut handler = FrameHandler { echo: true, ..FrameHandler::default() };

        let _ = pipeline.read_from_socket().unwrap();
        pipeline.handle_tcp(&mut handler).unwrap();
        assert_eq!(pipeline.write_to_socket().unwrap(), Transfer::EndOfStream);
    }
}
