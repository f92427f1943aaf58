//! The transport driver contract
//!
//! This crate doesn't talk to USB hardware or to a host stack itself. It
//! coordinates operations through a [`Driver`], which owns device access,
//! operation handles, and the event loop that delivers completions. A
//! libusb-style host stack maps onto the trait one function per
//! primitive: allocate / free a transfer, fill a bulk transfer, submit,
//! cancel, and handle events with a timeout.

use core::{fmt, ptr::NonNull, time::Duration};
use usb_device::endpoint::EndpointAddress;

bitflags::bitflags! {
    /// Flags applied to every operation of a transfer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TransferFlags : u8 {
        /// Report a short read as an error.
        const SHORT_NOT_OK = 1 << 0;
        /// Terminate an OUT operation that's a multiple of the max packet
        /// length with a zero length packet.
        const ADD_ZERO_PACKET = 1 << 1;
    }
}

#[cfg(feature = "defmt-03")]
impl defmt::Format for TransferFlags {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "TransferFlags({=u8:#x})", self.bits())
    }
}

/// Everything a driver needs to prepare one operation
///
/// `buffer` points at `length` bytes inside the caller's transfer buffer.
/// `context` is the chunk index that the driver hands back, unchanged, when
/// it delivers the operation's [`Completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setup<Dev> {
    pub device: Dev,
    pub endpoint: EndpointAddress,
    pub buffer: NonNull<u8>,
    pub length: usize,
    /// Per-operation timeout. `Duration::ZERO` means no timeout.
    pub timeout: Duration,
    pub flags: TransferFlags,
    pub context: usize,
}

/// Final state of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Status {
    /// Completed without error. A short transfer still counts.
    Completed,
    /// The transport failed the operation.
    Error,
    /// The per-operation timeout elapsed.
    TimedOut,
    /// Cancelled after a cancellation request.
    Cancelled,
    /// The endpoint stalled.
    Stall,
    /// The device went away.
    NoDevice,
    /// The device sent more data than requested.
    Overflow,
}

impl Status {
    /// Returns `true` for [`Status::Completed`]
    pub const fn is_success(self) -> bool {
        matches!(self, Status::Completed)
    }
}

/// Result of one operation, as delivered to a [`CompletionSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Completion {
    pub status: Status,
    /// Number of bytes the transport actually moved
    pub actual_length: usize,
}

impl Completion {
    pub const fn new(status: Status, actual_length: usize) -> Self {
        Completion {
            status,
            actual_length,
        }
    }
}

/// Errors reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum TransportError {
    Io,
    InvalidParam,
    Access,
    NoDevice,
    NotFound,
    Busy,
    Timeout,
    Overflow,
    Pipe,
    /// A signal interrupted event handling. Not a real failure; retry.
    Interrupted,
    NoMem,
    NotSupported,
    /// Any other transport specific code
    Other(i32),
}

impl TransportError {
    /// Indicates if the call should simply be retried
    pub const fn is_interrupted(self) -> bool {
        matches!(self, TransportError::Interrupted)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io => f.write_str("input/output error"),
            TransportError::InvalidParam => f.write_str("invalid parameter"),
            TransportError::Access => f.write_str("access denied"),
            TransportError::NoDevice => f.write_str("no such device"),
            TransportError::NotFound => f.write_str("entity not found"),
            TransportError::Busy => f.write_str("resource busy"),
            TransportError::Timeout => f.write_str("operation timed out"),
            TransportError::Overflow => f.write_str("overflow"),
            TransportError::Pipe => f.write_str("pipe error"),
            TransportError::Interrupted => f.write_str("system call interrupted"),
            TransportError::NoMem => f.write_str("insufficient memory"),
            TransportError::NotSupported => f.write_str("operation not supported"),
            TransportError::Other(code) => write!(f, "transport error {}", code),
        }
    }
}

/// Receives operation completions during [`Driver::dispatch`]
pub trait CompletionSink {
    /// Record the completion of the operation configured with `context`
    fn complete(&mut self, context: usize, completion: Completion);
    /// Indicates that every submitted operation has completed
    ///
    /// A driver may stop dispatching early once this returns `true`.
    fn is_completed(&self) -> bool;
}

/// A transport that can run asynchronous bulk operations
///
/// # Safety
///
/// [`configure()`](Driver::configure) hands out a raw pointer into the
/// caller's buffer. An implementation may only access the `length` bytes
/// behind `Setup::buffer`, and only between an accepted
/// [`submit()`](Driver::submit) and the delivery of that operation's
/// completion.
///
/// An implementation must eventually deliver exactly one completion, through
/// [`dispatch()`](Driver::dispatch), for every accepted submission. That
/// includes cancelled operations. Completions must only be delivered from
/// within `dispatch()`, on the calling thread.
pub unsafe trait Driver {
    /// A handle to an opened device
    type Device: Copy;
    /// A handle to one driver level operation
    type Operation;

    /// Allocate a new, unconfigured operation
    fn allocate(&mut self) -> Result<Self::Operation, TransportError>;
    /// Release an operation that isn't pending
    fn release(&mut self, operation: Self::Operation);
    /// Prepare (or re-prepare) an operation that isn't pending
    fn configure(&mut self, operation: &mut Self::Operation, setup: &Setup<Self::Device>);
    /// Hand the operation to the transport
    fn submit(&mut self, operation: &mut Self::Operation) -> Result<(), TransportError>;
    /// Ask the transport to cancel a pending operation
    ///
    /// Cancellation is asynchronous. The operation still completes through
    /// `dispatch()`.
    fn cancel(&mut self, operation: &mut Self::Operation) -> Result<(), TransportError>;
    /// Deliver pending completions to `sink`, blocking for up to `timeslice`
    fn dispatch(
        &mut self,
        timeslice: Duration,
        sink: &mut dyn CompletionSink,
    ) -> Result<(), TransportError>;
}

unsafe impl<D: Driver + ?Sized> Driver for &mut D {
    type Device = D::Device;
    type Operation = D::Operation;

    fn allocate(&mut self) -> Result<Self::Operation, TransportError> {
        (**self).allocate()
    }
    fn release(&mut self, operation: Self::Operation) {
        (**self).release(operation)
    }
    fn configure(&mut self, operation: &mut Self::Operation, setup: &Setup<Self::Device>) {
        (**self).configure(operation, setup)
    }
    fn submit(&mut self, operation: &mut Self::Operation) -> Result<(), TransportError> {
        (**self).submit(operation)
    }
    fn cancel(&mut self, operation: &mut Self::Operation) -> Result<(), TransportError> {
        (**self).cancel(operation)
    }
    fn dispatch(
        &mut self,
        timeslice: Duration,
        sink: &mut dyn CompletionSink,
    ) -> Result<(), TransportError> {
        (**self).dispatch(timeslice, sink)
    }
}
