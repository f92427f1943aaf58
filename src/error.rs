//! Transfer errors

use crate::driver::TransportError;
use core::fmt;

/// Errors returned by a [`ChunkedBulkTransfer`](crate::ChunkedBulkTransfer)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// The driver couldn't allocate an operation.
    Allocate(TransportError),
    /// The driver rejected the operation for `chunk`.
    ///
    /// Every operation accepted before `chunk` has been asked to cancel.
    Submit {
        chunk: usize,
        error: TransportError,
    },
    /// A replacement buffer doesn't match the planned length.
    BufferLength { expected: usize, actual: usize },
    /// Operations are still pending; wait for them first.
    Pending,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Allocate(error) => write!(f, "cannot allocate operation: {}", error),
            Error::Submit { chunk, error } => {
                write!(f, "cannot submit chunk {}: {}", chunk, error)
            }
            Error::BufferLength { expected, actual } => write!(
                f,
                "buffer holds {} bytes, but the transfer needs {}",
                actual, expected
            ),
            Error::Pending => f.write_str("operations are still pending"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
