//! Negotiated channel limits.
//!
//! All limits are enforced incrementally by the encoder and decoder so a
//! hostile peer can never force unbounded buffering. A limit of 0 means
//! "unbounded" by convention.

/// Default maximum reassembled message size in bytes (2 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// Default maximum wire size of a single chunk in bytes (64 KiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Default maximum chunks per message: enough for a maximum-size message
/// with headroom for security overhead.
pub const DEFAULT_MAX_CHUNK_COUNT: usize =
    (DEFAULT_MAX_MESSAGE_SIZE / DEFAULT_MAX_CHUNK_SIZE) * 2;

/// Negotiated numeric limits for one secure channel, split by direction.
///
/// "Send" limits bound what the local encoder may produce; "receive" limits
/// bound what the local decoder will accept. A value of 0 disables the
/// corresponding bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParameters {
    send_max_message_size: usize,
    send_max_chunk_size: usize,
    send_max_chunk_count: usize,
    receive_max_message_size: usize,
    receive_max_chunk_size: usize,
    receive_max_chunk_count: usize,
}

impl ChannelParameters {
    /// Create channel parameters from negotiated values.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        send_max_message_size: usize,
        send_max_chunk_size: usize,
        send_max_chunk_count: usize,
        receive_max_message_size: usize,
        receive_max_chunk_size: usize,
        receive_max_chunk_count: usize,
    ) -> Self {
        Self {
            send_max_message_size,
            send_max_chunk_size,
            send_max_chunk_count,
            receive_max_message_size,
            receive_max_chunk_size,
            receive_max_chunk_count,
        }
    }

    /// Symmetric parameters: the same limits in both directions.
    pub fn symmetric(max_message_size: usize, max_chunk_size: usize, max_chunk_count: usize) -> Self {
        Self::new(
            max_message_size,
            max_chunk_size,
            max_chunk_count,
            max_message_size,
            max_chunk_size,
            max_chunk_count,
        )
    }

    /// Maximum message size the local encoder may produce.
    pub fn send_max_message_size(&self) -> usize {
        self.send_max_message_size
    }

    /// Maximum chunk size the local encoder may produce.
    pub fn send_max_chunk_size(&self) -> usize {
        self.send_max_chunk_size
    }

    /// Maximum chunk count the local encoder may produce per message.
    pub fn send_max_chunk_count(&self) -> usize {
        self.send_max_chunk_count
    }

    /// Maximum reassembled message size the local decoder accepts.
    pub fn receive_max_message_size(&self) -> usize {
        self.receive_max_message_size
    }

    /// Maximum chunk size the local decoder accepts.
    pub fn receive_max_chunk_size(&self) -> usize {
        self.receive_max_chunk_size
    }

    /// Maximum chunk count per message the local decoder accepts.
    pub fn receive_max_chunk_count(&self) -> usize {
        self.receive_max_chunk_count
    }
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self::symmetric(
            DEFAULT_MAX_MESSAGE_SIZE,
            DEFAULT_MAX_CHUNK_SIZE,
            DEFAULT_MAX_CHUNK_COUNT,
        )
    }
}

/// Whether `value` is within `limit`, treating a limit of 0 as unbounded.
pub(crate) fn within_limit(limit: usize, value: usize) -> bool {
    limit == 0 || value <= limit
}
