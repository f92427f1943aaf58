//! The chunked bulk transfer coordinator
//!
//! # Rounds
//!
//! A [`ChunkedBulkTransfer`] runs in rounds. [`submit()`](ChunkedBulkTransfer::submit)
//! starts a round by handing every planned operation to the driver, and
//! [`wait()`](ChunkedBulkTransfer::wait) ends it once the driver delivered a
//! completion for each accepted operation. Between the two, the operations
//! are *pending*: the driver may write into (or read from) the buffer, so the
//! coordinator refuses to rebind its buffer or device.
//!
//! The same plan is reused for every round. Use
//! [`set_buffer()`](ChunkedBulkTransfer::set_buffer) and
//! [`set_device()`](ChunkedBulkTransfer::set_device) to point it somewhere
//! else between rounds.
//!
//! # Results
//!
//! Every completion counts toward the end of a round, and adds its actual
//! length to [`actual_length()`](ChunkedBulkTransfer::actual_length), no
//! matter its status. Cancelled and failed operations usually moved zero
//! bytes, but a partially complete operation contributes what it moved.
//! Inspect [`completions()`](ChunkedBulkTransfer::completions) or
//! [`failed_chunks()`](ChunkedBulkTransfer::failed_chunks) to apply a
//! stricter policy.

use crate::{
    clock::Clock,
    config::Config,
    driver::{Completion, Driver, Setup},
    error::Error,
    plan::{Chunk, ChunkPlan},
    pump::{EventPump, PumpReport},
    tracker::CompletionTracker,
};
use alloc::vec::Vec;
use core::{marker::PhantomData, ptr::NonNull, slice, time::Duration};
use usb_device::endpoint::EndpointAddress;

/// A large bulk transfer, split into concurrently submitted chunks
///
/// The transfer borrows its buffer for `'buf`, and the driver may access the
/// buffer whenever operations are pending. Dropping a transfer with pending
/// operations cancels them, and blocks until the driver delivers every
/// completion.
///
/// A transfer is driven by one thread. Completions arrive on that thread,
/// from inside [`wait()`](ChunkedBulkTransfer::wait).
pub struct ChunkedBulkTransfer<'buf, D: Driver, C: Clock> {
    driver: D,
    clock: C,
    config: Config,
    device: D::Device,
    endpoint: EndpointAddress,
    /// The caller's buffer. Every chunk pointer handed to the driver, and
    /// every slice we give back to the caller, derives from this pointer.
    buffer: NonNull<[u8]>,
    plan: ChunkPlan,
    /// One operation per chunk, in plan order
    operations: Vec<D::Operation>,
    tracker: CompletionTracker,
    _buffer: PhantomData<&'buf mut [u8]>,
}

// Safety: `buffer` is the `&'buf mut [u8]` it was made from, which is `Send`.
unsafe impl<D, C> Send for ChunkedBulkTransfer<'_, D, C>
where
    D: Driver + Send,
    D::Device: Send,
    D::Operation: Send,
    C: Clock + Send,
{
}

#[cfg(feature = "std")]
impl<'buf, D: Driver> ChunkedBulkTransfer<'buf, D, crate::clock::StdClock> {
    /// Prepare a transfer of `buffer` to or from `endpoint`
    ///
    /// Allocates and configures one driver operation per chunk. Nothing is
    /// submitted until [`submit()`](Self::submit) or [`transfer()`](Self::transfer).
    pub fn new(
        driver: D,
        device: D::Device,
        endpoint: EndpointAddress,
        buffer: &'buf mut [u8],
        config: Config,
    ) -> Result<Self, Error> {
        Self::with_clock(
            driver,
            device,
            endpoint,
            buffer,
            config,
            crate::clock::StdClock::new(),
        )
    }
}

impl<'buf, D: Driver, C: Clock> ChunkedBulkTransfer<'buf, D, C> {
    /// Prepare a transfer that measures wait timeouts with `clock`
    ///
    /// See [`new()`](Self::new).
    pub fn with_clock(
        mut driver: D,
        device: D::Device,
        endpoint: EndpointAddress,
        buffer: &'buf mut [u8],
        config: Config,
        clock: C,
    ) -> Result<Self, Error> {
        let plan = ChunkPlan::new(buffer.len(), config.chunk_size());
        let mut operations = Vec::with_capacity(plan.chunk_count());
        for _ in plan.chunks() {
            match driver.allocate() {
                Ok(operation) => operations.push(operation),
                Err(err) => {
                    error!(
                        "Cannot allocate operation {} of {}: {}",
                        operations.len(),
                        plan.chunk_count(),
                        err
                    );
                    for operation in operations.drain(..) {
                        driver.release(operation);
                    }
                    return Err(Error::Allocate(err));
                }
            }
        }

        debug!(
            "Transfer of {} bytes in {} chunks of {}",
            plan.length(),
            plan.chunk_count(),
            plan.chunk_size().get()
        );

        let mut transfer = ChunkedBulkTransfer {
            driver,
            clock,
            config,
            device,
            endpoint,
            buffer: NonNull::from(buffer),
            tracker: CompletionTracker::new(&plan),
            plan,
            operations,
            _buffer: PhantomData,
        };
        transfer.configure_operations();
        Ok(transfer)
    }

    /// Point every operation at the current buffer and device
    fn configure_operations(&mut self) {
        let base = self.buffer.cast::<u8>();
        for (chunk, operation) in self.plan.chunks().iter().zip(self.operations.iter_mut()) {
            let setup = Setup {
                device: self.device,
                endpoint: self.endpoint,
                // Safety: the plan was made for a buffer of this length.
                buffer: unsafe { chunk.bind(base) },
                length: chunk.len(),
                timeout: self.config.operation_timeout(),
                flags: self.config.transfer_flags(),
                context: chunk.index(),
            };
            self.driver.configure(operation, &setup);
        }
    }

    fn is_pending(&self) -> bool {
        self.tracker.submitted() != 0
    }

    /// Submit every operation, in plan order
    ///
    /// On the first rejected operation, `submit()` stops, and asks the driver
    /// to cancel the operations that it already accepted. The error names the
    /// rejected chunk; [`submitted()`](Self::submitted) counts the accepted
    /// ones. Either way, follow up with [`wait()`](Self::wait).
    ///
    /// Returns [`Error::Pending`] if the last round wasn't waited for.
    pub fn submit(&mut self) -> Result<(), Error> {
        if self.is_pending() {
            return Err(Error::Pending);
        }

        self.tracker.reset();
        let mut result = Ok(());
        for (chunk, operation) in self.operations.iter_mut().enumerate() {
            if let Err(error) = self.driver.submit(operation) {
                error!("Cannot submit chunk {}: {}", chunk, error);
                result = Err(Error::Submit { chunk, error });
                break;
            }
            self.tracker.accepted();
        }
        self.tracker.seal();

        if result.is_err() {
            let submitted = self.tracker.submitted();
            request_cancel(&mut self.driver, &mut self.operations[..submitted]);
        }
        result
    }

    /// Cancel the pending operations, and wait for them to complete
    ///
    /// Operations that already completed keep their results. Uses the
    /// configured wait timeout; see [`Config::wait_timeout`].
    pub fn cancel(&mut self) -> PumpReport {
        let submitted = self.tracker.submitted();
        request_cancel(&mut self.driver, &mut self.operations[..submitted]);
        self.wait(self.config.default_wait_timeout())
    }

    /// Dispatch driver events until every pending operation completed
    ///
    /// Returns immediately if nothing is pending. If the wait takes longer
    /// than `timeout`, the pending operations are cancelled, and the wait
    /// continues until the driver delivers them. `wait()` never returns
    /// while the driver could still access the buffer.
    pub fn wait(&mut self, timeout: Duration) -> PumpReport {
        let submitted = self.tracker.submitted();
        if submitted == 0 {
            return PumpReport::default();
        }

        let ChunkedBulkTransfer {
            driver,
            clock,
            config,
            operations,
            tracker,
            ..
        } = self;
        let report = EventPump::new(&*clock, config.dispatch_timeslice(), timeout).run(
            driver,
            tracker,
            |driver| request_cancel(driver, &mut operations[..submitted]),
        );
        tracker.drained();
        report
    }

    /// Submit, then wait with the configured wait timeout
    ///
    /// Returns the number of bytes transferred. If submission fails, the
    /// accepted operations are still drained before the error is returned.
    pub fn transfer(&mut self) -> Result<usize, Error> {
        let submitted = self.submit();
        if let Err(Error::Pending) = submitted {
            return Err(Error::Pending);
        }
        self.wait(self.config.default_wait_timeout());
        submitted.map(|()| self.actual_length())
    }

    /// Rebind the operations to a new buffer of the same length
    ///
    /// The plan isn't recomputed. Returns the previous buffer.
    pub fn set_buffer(&mut self, buffer: &'buf mut [u8]) -> Result<&'buf mut [u8], Error> {
        if self.is_pending() {
            return Err(Error::Pending);
        }
        if buffer.len() != self.plan.length() {
            return Err(Error::BufferLength {
                expected: self.plan.length(),
                actual: buffer.len(),
            });
        }
        let previous = core::mem::replace(&mut self.buffer, NonNull::from(buffer));
        self.configure_operations();
        // Safety: `previous` came from a `&'buf mut [u8]` of the planned
        // length, and no operation points into it anymore.
        let previous = previous.cast::<u8>().as_ptr();
        Ok(unsafe { slice::from_raw_parts_mut(previous, self.plan.length()) })
    }

    /// Rebind the operations to another device
    ///
    /// Use this to reuse the plan after reopening a device.
    pub fn set_device(&mut self, device: D::Device) -> Result<(), Error> {
        if self.is_pending() {
            return Err(Error::Pending);
        }
        self.device = device;
        self.configure_operations();
        Ok(())
    }

    /// Bytes moved during the current (or last) round
    pub fn actual_length(&self) -> usize {
        self.tracker.actual_length()
    }

    /// The transfer buffer
    ///
    /// Returns `None` while operations are pending.
    pub fn buffer(&self) -> Option<&[u8]> {
        if self.is_pending() {
            return None;
        }
        // Safety: nothing pending, so the driver doesn't access the buffer.
        // The borrow of `self` keeps it that way.
        let base = self.buffer.cast::<u8>().as_ptr();
        Some(unsafe { slice::from_raw_parts(base, self.plan.length()) })
    }

    /// Mutable access to the transfer buffer
    ///
    /// Returns `None` while operations are pending.
    pub fn buffer_mut(&mut self) -> Option<&mut [u8]> {
        if self.is_pending() {
            return None;
        }
        // Safety: see buffer().
        let base = self.buffer.cast::<u8>().as_ptr();
        Some(unsafe { slice::from_raw_parts_mut(base, self.plan.length()) })
    }

    /// Operations accepted by the driver, and not yet waited for
    pub fn submitted(&self) -> usize {
        self.tracker.submitted()
    }

    /// Completions observed during the current (or last) round
    pub fn done(&self) -> usize {
        self.tracker.done()
    }

    /// Indicates that every accepted operation of the round completed
    pub fn is_completed(&self) -> bool {
        self.tracker.is_completed()
    }

    pub fn chunk_count(&self) -> usize {
        self.plan.chunk_count()
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Each chunk, with its completion from the current (or last) round
    ///
    /// The completion is `None` for chunks that weren't submitted, or that
    /// haven't completed yet.
    pub fn completions(&self) -> impl Iterator<Item = (Chunk, Option<Completion>)> + '_ {
        self.plan
            .chunks()
            .iter()
            .map(move |chunk| (*chunk, self.tracker.result(chunk.index())))
    }

    /// Chunks that completed without success during the current (or last) round
    pub fn failed_chunks(&self) -> impl Iterator<Item = (Chunk, Completion)> + '_ {
        self.completions()
            .filter_map(|(chunk, completion)| Some((chunk, completion?)))
            .filter(|(_, completion)| !completion.status.is_success())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> D::Device {
        self.device
    }

    pub fn endpoint(&self) -> EndpointAddress {
        self.endpoint
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the driver
    ///
    /// Don't dispatch events through this handle while operations are
    /// pending; only [`wait()`](Self::wait) may observe their completions.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D: Driver, C: Clock> Drop for ChunkedBulkTransfer<'_, D, C> {
    fn drop(&mut self) {
        if self.is_pending() {
            warn!(
                "Dropping transfer with {} pending operations; cancelling",
                self.tracker.submitted() - self.tracker.done()
            );
            self.cancel();
        }
        for operation in self.operations.drain(..) {
            self.driver.release(operation);
        }
    }
}

/// Ask the driver to cancel each operation
///
/// Operations that already completed are expected to fail the request.
fn request_cancel<D: Driver>(driver: &mut D, operations: &mut [D::Operation]) {
    for (chunk, operation) in operations.iter_mut().enumerate() {
        if let Err(err) = driver.cancel(operation) {
            debug!("Cannot cancel chunk {}: {}", chunk, err);
        }
    }
}
