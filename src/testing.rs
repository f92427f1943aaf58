//! Scriptable driver and clock for unit tests

use crate::{
    clock::Clock,
    driver::{Completion, CompletionSink, Driver, Setup, Status, TransportError},
};
use core::{cell::Cell, time::Duration};
use std::{collections::VecDeque, vec::Vec};

/// How the fake transport finishes submitted operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Nothing completes until the test queues it
    Manual,
    /// Every accepted operation completes successfully, moving all bytes
    Echo,
}

/// The byte the fake transport writes into the chunk with `context`
pub fn fill(context: usize) -> u8 {
    (context as u8).wrapping_add(1)
}

pub struct FakeDriver {
    pub mode: Mode,
    /// Cancel requests finish the operation with `Status::Cancelled`
    pub complete_cancelled: bool,
    /// Reject the operation configured for this chunk
    pub reject: Option<(usize, TransportError)>,
    pub allocate_error: Option<TransportError>,
    /// Returned, in order, by the next dispatch calls
    pub dispatch_errors: VecDeque<TransportError>,

    /// Latest setup for each operation, indexed by operation
    pub setups: Vec<Option<Setup<u8>>>,
    /// Every setup handed to configure, in call order
    pub configured: Vec<Setup<u8>>,
    /// Operations accepted by submit, in call order
    pub submitted: Vec<usize>,
    /// Operations that received a successful cancel request
    pub cancelled: Vec<usize>,
    pub released: Vec<usize>,
    pub dispatches: usize,

    pending: Vec<usize>,
    queue: VecDeque<(usize, Completion)>,
}

impl FakeDriver {
    pub fn new(mode: Mode) -> Self {
        FakeDriver {
            mode,
            complete_cancelled: true,
            reject: None,
            allocate_error: None,
            dispatch_errors: VecDeque::new(),
            setups: Vec::new(),
            configured: Vec::new(),
            submitted: Vec::new(),
            cancelled: Vec::new(),
            released: Vec::new(),
            dispatches: 0,
            pending: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    fn context(&self, operation: usize) -> usize {
        self.setups[operation].map_or(usize::MAX, |setup| setup.context)
    }

    fn operation(&self, context: usize) -> usize {
        self.setups
            .iter()
            .position(|setup| setup.map(|setup| setup.context) == Some(context))
            .expect("no operation configured for context")
    }

    /// Queue a completion for the operation configured with `context`
    pub fn finish(&mut self, context: usize, completion: Completion) {
        let operation = self.operation(context);
        self.queue.push_back((operation, completion));
    }

    /// Operations submitted, but not yet delivered
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Contexts of the operations that were asked to cancel
    pub fn cancelled_contexts(&self) -> Vec<usize> {
        self.cancelled.iter().map(|&op| self.context(op)).collect()
    }
}

unsafe impl Driver for FakeDriver {
    type Device = u8;
    type Operation = usize;

    fn allocate(&mut self) -> Result<usize, TransportError> {
        if let Some(error) = self.allocate_error {
            return Err(error);
        }
        self.setups.push(None);
        Ok(self.setups.len() - 1)
    }

    fn release(&mut self, operation: usize) {
        assert!(
            !self.pending.contains(&operation),
            "released a pending operation"
        );
        self.released.push(operation);
    }

    fn configure(&mut self, operation: &mut usize, setup: &Setup<u8>) {
        assert!(
            !self.pending.contains(operation),
            "configured a pending operation"
        );
        self.setups[*operation] = Some(*setup);
        self.configured.push(*setup);
    }

    fn submit(&mut self, operation: &mut usize) -> Result<(), TransportError> {
        let setup = self.setups[*operation].expect("submitted an unconfigured operation");
        if let Some((context, error)) = self.reject {
            if context == setup.context {
                return Err(error);
            }
        }
        self.pending.push(*operation);
        self.submitted.push(*operation);
        if self.mode == Mode::Echo {
            self.queue
                .push_back((*operation, Completion::new(Status::Completed, setup.length)));
        }
        Ok(())
    }

    fn cancel(&mut self, operation: &mut usize) -> Result<(), TransportError> {
        if !self.pending.contains(operation) {
            return Err(TransportError::NotFound);
        }
        let first = !self.cancelled.contains(operation);
        self.cancelled.push(*operation);
        let queued = self.queue.iter().any(|(op, _)| *op == *operation);
        if first && self.complete_cancelled && !queued {
            self.queue
                .push_back((*operation, Completion::new(Status::Cancelled, 0)));
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        _: Duration,
        sink: &mut dyn CompletionSink,
    ) -> Result<(), TransportError> {
        self.dispatches += 1;
        if let Some(error) = self.dispatch_errors.pop_front() {
            return Err(error);
        }
        while let Some((operation, completion)) = self.queue.pop_front() {
            self.pending.retain(|&op| op != operation);
            let setup = self.setups[operation].expect("delivered an unconfigured operation");
            let len = completion.actual_length.min(setup.length);
            // Safety: the coordinator keeps `length` bytes behind `buffer`
            // valid until this completion is delivered.
            unsafe { setup.buffer.as_ptr().write_bytes(fill(setup.context), len) };
            sink.complete(setup.context, completion);
            if sink.is_completed() {
                break;
            }
        }
        Ok(())
    }
}

/// A clock that advances by `step` every time it's read
pub struct StepClock {
    now: Cell<Duration>,
    step: Duration,
}

impl StepClock {
    pub fn new(step: Duration) -> Self {
        StepClock {
            now: Cell::new(Duration::ZERO),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> Duration {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}
