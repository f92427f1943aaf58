//! Transfer configuration

use crate::driver::TransferFlags;
use core::{num::NonZeroUsize, time::Duration};

/// Default limit for [`cancel()`](crate::ChunkedBulkTransfer::cancel) and
/// [`transfer()`](crate::ChunkedBulkTransfer::transfer) waits
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default event dispatch timeslice
pub const DEFAULT_TIMESLICE: Duration = Duration::from_millis(10);

/// Configures a [`ChunkedBulkTransfer`](crate::ChunkedBulkTransfer)
///
/// ```
/// use core::{num::NonZeroUsize, time::Duration};
/// use usb_chunked_bulk::{Config, TransferFlags};
///
/// let config = Config::new(NonZeroUsize::new(16 * 1024).unwrap())
///     .timeout(Duration::from_millis(500))
///     .wait_timeout(Duration::from_secs(2))
///     .flags(TransferFlags::SHORT_NOT_OK);
/// assert_eq!(config.chunk_size().get(), 16 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    chunk_size: NonZeroUsize,
    timeout: Duration,
    wait_timeout: Duration,
    timeslice: Duration,
    flags: TransferFlags,
}

impl Config {
    /// Split transfers into operations of at most `chunk_size` bytes
    ///
    /// Operations don't time out, waits use [`DEFAULT_WAIT_TIMEOUT`], and
    /// the event loop runs in [`DEFAULT_TIMESLICE`] slices.
    pub const fn new(chunk_size: NonZeroUsize) -> Self {
        Config {
            chunk_size,
            timeout: Duration::ZERO,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            timeslice: DEFAULT_TIMESLICE,
            flags: TransferFlags::empty(),
        }
    }

    /// Set the per-operation timeout, enforced by the driver
    ///
    /// `Duration::ZERO` disables the timeout.
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long internal waits run before requesting cancellation
    pub const fn wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Set the longest single call into the driver's event dispatch
    pub const fn timeslice(mut self, timeslice: Duration) -> Self {
        self.timeslice = timeslice;
        self
    }

    pub const fn flags(mut self, flags: TransferFlags) -> Self {
        self.flags = flags;
        self
    }

    pub const fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    pub const fn operation_timeout(&self) -> Duration {
        self.timeout
    }

    pub const fn default_wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub const fn dispatch_timeslice(&self) -> Duration {
        self.timeslice
    }

    pub const fn transfer_flags(&self) -> TransferFlags {
        self.flags
    }
}

#[cfg(test)]
mod test {
    use super::{Config, DEFAULT_TIMESLICE, DEFAULT_WAIT_TIMEOUT};
    use crate::driver::TransferFlags;
    use core::{num::NonZeroUsize, time::Duration};

    #[test]
    fn defaults() {
        let config = Config::new(NonZeroUsize::new(512).unwrap());
        assert_eq!(config.chunk_size().get(), 512);
        assert_eq!(config.operation_timeout(), Duration::ZERO);
        assert_eq!(config.default_wait_timeout(), DEFAULT_WAIT_TIMEOUT);
        assert_eq!(config.dispatch_timeslice(), DEFAULT_TIMESLICE);
        assert_eq!(config.transfer_flags(), TransferFlags::empty());
    }

    #[test]
    fn setters() {
        let config = Config::new(NonZeroUsize::new(1).unwrap())
            .timeout(Duration::from_millis(3))
            .wait_timeout(Duration::from_millis(4))
            .timeslice(Duration::from_millis(5))
            .flags(TransferFlags::ADD_ZERO_PACKET);
        assert_eq!(config.operation_timeout(), Duration::from_millis(3));
        assert_eq!(config.default_wait_timeout(), Duration::from_millis(4));
        assert_eq!(config.dispatch_timeslice(), Duration::from_millis(5));
        assert_eq!(config.transfer_flags(), TransferFlags::ADD_ZERO_PACKET);
    }
}
