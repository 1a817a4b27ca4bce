//! Message handler seam and the buffer views handed to it.

/// Consumes inbound bytes and produces outbound bytes in place.
///
/// Called by [`BufferPipeline::handle_tcp`] once per inbound buffer that has
/// bytes pending, and at least once per call. The handler advances `inbound`
/// past every complete message it decodes and leaves a trailing partial
/// message where it is; the pipeline carries it over.
///
/// A handler may also hold back complete messages, for instance while
/// `outbound` is blocked. The pipeline then keeps them in place and throttles
/// the socket reader until the handler catches up.
///
/// [`BufferPipeline::handle_tcp`]: super::BufferPipeline::handle_tcp
pub trait TcpHandler<N> {
    /// Decodes from `inbound`, writes replies to `outbound`.
    fn process(&mut self, inbound: &mut Inbound<'_>, outbound: &mut Outbound<'_>, nc: &mut N);
}

impl<N, F> TcpHandler<N> for F
where
    F: FnMut(&mut Inbound<'_>, &mut Outbound<'_>, &mut N),
{
    fn process(&mut self, inbound: &mut Inbound<'_>, outbound: &mut Outbound<'_>, nc: &mut N) {
        self(inbound, outbound, nc);
    }
}

/// Received bytes not yet consumed.
#[derive(Debug)]
pub struct Inbound<'a> {
    bytes: &'a [u8],
    consumed: usize,
    needed: Option<usize>,
}

impl<'a> Inbound<'a> {
    pub(crate) const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, consumed: 0, needed: None }
    }

    /// Bytes not consumed so far.
    #[inline]
    pub fn readable(&self) -> &[u8] {
        &self.bytes[self.consumed..]
    }

    /// Length of [`Self::readable`].
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.consumed
    }

    /// Bytes consumed during this call.
    #[inline]
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Marks `n` bytes as consumed. Clamped to what is left.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.remaining(), "advanced past the received bytes");
        self.consumed += n.min(self.remaining());
    }

    /// Declares that the message at the front of [`Self::readable`] is
    /// `total` bytes long and has not fully arrived.
    ///
    /// Optional. It lets the pipeline reject a message larger than the
    /// configured maximum with [`PipelineError::MessageTooLarge`] instead of
    /// waiting for bytes that can never fit.
    ///
    /// [`PipelineError::MessageTooLarge`]: super::PipelineError::MessageTooLarge
    #[inline]
    pub fn need(&mut self, total: usize) {
        self.needed = Some(total);
    }

    pub(crate) const fn needed(&self) -> Option<usize> {
        self.needed
    }
}

/// Space in the outbound buffer for the handler to write into.
///
/// Empty while the outbound ring is full; check [`Self::is_blocked`] and
/// hold back replies until the socket has drained. When not blocked it has
/// room for at least one maximum-size message.
#[derive(Debug)]
pub struct Outbound<'a> {
    space: &'a mut [u8],
    written: usize,
}

impl<'a> Outbound<'a> {
    pub(crate) fn new(space: &'a mut [u8]) -> Self {
        Self { space, written: 0 }
    }

    pub(crate) fn blocked() -> Self {
        Self { space: &mut [], written: 0 }
    }

    /// `true` when the outbound ring had no space to hand out.
    #[inline]
    pub const fn is_blocked(&self) -> bool {
        self.space.is_empty()
    }

    /// Uncommitted space.
    #[inline]
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.space[self.written..]
    }

    /// Length of [`Self::writable`].
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.space.len() - self.written
    }

    /// Bytes committed during this call.
    #[inline]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Commits `n` bytes previously written through [`Self::writable`].
    #[inline]
    pub fn commit(&mut self, n: usize) {
        debug_assert!(n <= self.remaining(), "committed past the outbound window");
        self.written += n.min(self.remaining());
    }

    /// Copies `bytes` in and commits them. Returns `false`, writing nothing,
    /// if they do not fit.
    pub fn put(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.writable()[..bytes.len()].copy_from_slice(bytes);
        self.written += bytes.len();
        true
    }
}
