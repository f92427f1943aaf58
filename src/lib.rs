//! Chunked USB bulk transfers
//!
//! `usb-chunked-bulk` moves a large buffer over a USB bulk endpoint by
//! splitting it into fixed size operations, submitting them all at once,
//! and waiting until every one of them completed, failed, or was cancelled.
//! To the caller, the whole exchange looks like one blocking transfer.
//!
//! The crate doesn't access USB itself. You provide a [`Driver`] that
//! wraps your host stack's asynchronous transfer API, and the
//! [`ChunkedBulkTransfer`] coordinates it:
//!
//! - one driver operation per chunk, allocated and configured up front,
//! - completions counted as they arrive, in any order,
//! - a wait loop that cancels everything on timeout or on an event error,
//!   and that only returns once the driver let go of the buffer.
//!
//! See the [`Driver`] documentation for the contract your implementation
//! must uphold.
//!
//! # Example
//!
//! A driver that fills, and completes, every operation as soon as it's
//! submitted.
//!
//! ```
//! use core::{num::NonZeroUsize, time::Duration};
//! use usb_chunked_bulk::{
//!     ChunkedBulkTransfer, Completion, CompletionSink, Config, Driver, Setup, Status,
//!     TransportError,
//! };
//! use usb_device::endpoint::EndpointAddress;
//!
//! #[derive(Default)]
//! struct Loopback {
//!     setups: Vec<Option<Setup<()>>>,
//!     ready: Vec<usize>,
//! }
//!
//! unsafe impl Driver for Loopback {
//!     type Device = ();
//!     type Operation = usize;
//!
//!     fn allocate(&mut self) -> Result<usize, TransportError> {
//!         self.setups.push(None);
//!         Ok(self.setups.len() - 1)
//!     }
//!     fn release(&mut self, _: usize) {}
//!     fn configure(&mut self, operation: &mut usize, setup: &Setup<()>) {
//!         self.setups[*operation] = Some(*setup);
//!     }
//!     fn submit(&mut self, operation: &mut usize) -> Result<(), TransportError> {
//!         self.ready.push(*operation);
//!         Ok(())
//!     }
//!     fn cancel(&mut self, _: &mut usize) -> Result<(), TransportError> {
//!         Err(TransportError::NotFound)
//!     }
//!     fn dispatch(
//!         &mut self,
//!         _: Duration,
//!         sink: &mut dyn CompletionSink,
//!     ) -> Result<(), TransportError> {
//!         for operation in self.ready.drain(..) {
//!             if let Some(setup) = self.setups[operation] {
//!                 // Pretend the device sent 0x5A bytes.
//!                 unsafe { setup.buffer.as_ptr().write_bytes(0x5A, setup.length) };
//!                 let completion = Completion::new(Status::Completed, setup.length);
//!                 sink.complete(setup.context, completion);
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut buffer = [0u8; 1000];
//! let config = Config::new(NonZeroUsize::new(256).unwrap());
//! let mut transfer = ChunkedBulkTransfer::new(
//!     Loopback::default(),
//!     (),
//!     EndpointAddress::from(0x81),
//!     &mut buffer,
//!     config,
//! )?;
//! assert_eq!(transfer.chunk_count(), 4);
//! assert_eq!(transfer.transfer()?, 1000);
//! drop(transfer);
//! assert!(buffer.iter().all(|&b| b == 0x5A));
//! # Ok::<(), usb_chunked_bulk::Error>(())
//! ```
//!
//! # Features
//!
//! - `std` (default): [`StdClock`], and `std::error::Error` for [`Error`].
//!   Without it, the crate is `no_std`, and requires `alloc`.
//! - `__log` (hidden): diagnostics through the `log` crate, for debugging.
//! - `defmt-03`: diagnostics through `defmt`, and `defmt::Format` for
//!   public types.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;
#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod clock;
mod config;
mod driver;
mod error;
mod plan;
mod pump;
mod tracker;
mod transfer;

#[cfg(test)]
mod testing;

#[cfg(feature = "std")]
pub use clock::StdClock;
pub use clock::Clock;
pub use config::{Config, DEFAULT_TIMESLICE, DEFAULT_WAIT_TIMEOUT};
pub use driver::{
    Completion, CompletionSink, Driver, Setup, Status, TransferFlags, TransportError,
};
pub use error::Error;
pub use plan::{Chunk, ChunkPlan};
pub use pump::PumpReport;
pub use transfer::ChunkedBulkTransfer;
