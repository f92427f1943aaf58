//! The event loop behind `wait()`
//!
//! The pump calls into the driver's event dispatch one timeslice at a time
//! until the tracker reports that every submitted operation completed.
//! Dispatch errors and timeouts never end the loop early. They escalate to a
//! cancellation request, and the pump keeps dispatching until the driver
//! delivers the cancelled operations. Returning any earlier would leave the
//! driver holding pointers into a buffer that the caller may free.

use crate::{clock::Clock, driver::Driver, tracker::CompletionTracker};
use core::time::Duration;

/// What happened during one wait
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PumpReport {
    /// Calls into the driver's event dispatch, interrupted ones included
    pub dispatches: usize,
    /// Dispatch errors, not counting interruptions
    pub dispatch_errors: usize,
    /// Indicates that the wait outlived its timeout
    pub timed_out: bool,
    /// Number of times the pump asked for cancellation
    pub cancellations: usize,
}

pub(crate) struct EventPump<'c, C> {
    clock: &'c C,
    timeslice: Duration,
    timeout: Duration,
}

impl<'c, C: Clock> EventPump<'c, C> {
    pub fn new(clock: &'c C, timeslice: Duration, timeout: Duration) -> Self {
        EventPump {
            clock,
            timeslice,
            timeout,
        }
    }

    /// Dispatch events until `tracker` completes
    ///
    /// `cancel` requests cancellation of every submitted operation. It may be
    /// called more than once.
    pub fn run<D: Driver>(
        &self,
        driver: &mut D,
        tracker: &mut CompletionTracker,
        mut cancel: impl FnMut(&mut D),
    ) -> PumpReport {
        let start = self.clock.now();
        let mut report = PumpReport::default();

        while !tracker.is_completed() {
            report.dispatches += 1;
            match driver.dispatch(self.timeslice, tracker) {
                Ok(()) => {}
                Err(err) if err.is_interrupted() => continue,
                Err(err) => {
                    error!("Event dispatch failed: {}; cancelling transfer", err);
                    report.dispatch_errors += 1;
                    report.cancellations += 1;
                    cancel(driver);
                    continue;
                }
            }

            if tracker.is_completed() {
                break;
            }

            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed > self.timeout {
                if !report.timed_out {
                    warn!(
                        "Transfer timed out after {} ms; cancelling transfer",
                        elapsed.as_millis() as u64
                    );
                    report.timed_out = true;
                }
                report.cancellations += 1;
                cancel(driver);
            }
        }

        report
    }
}

#[cfg(test)]
mod test {
    use super::{EventPump, PumpReport};
    use crate::{
        driver::{Completion, Driver, Setup, Status, TransferFlags, TransportError},
        plan::ChunkPlan,
        testing::{fill, FakeDriver, Mode, StepClock},
        tracker::CompletionTracker,
    };
    use core::{num::NonZeroUsize, ptr::NonNull, time::Duration};
    use std::vec::Vec;
    use usb_device::endpoint::EndpointAddress;

    const SLICE: Duration = Duration::from_millis(10);

    /// Submit one single-byte operation per byte of `buffer`
    ///
    /// Returns the sealed tracker, and the operation handles.
    fn round(driver: &mut FakeDriver, buffer: &mut [u8]) -> (CompletionTracker, Vec<usize>) {
        let plan = ChunkPlan::new(buffer.len(), NonZeroUsize::MIN);
        let mut tracker = CompletionTracker::new(&plan);
        tracker.reset();
        let base = NonNull::from(buffer).cast::<u8>();
        let ops = plan
            .chunks()
            .iter()
            .map(|chunk| {
                let mut op = driver.allocate().unwrap();
                driver.configure(
                    &mut op,
                    &Setup {
                        device: 1,
                        endpoint: EndpointAddress::from(0x81),
                        buffer: unsafe { chunk.bind(base) },
                        length: chunk.len(),
                        timeout: Duration::ZERO,
                        flags: TransferFlags::empty(),
                        context: chunk.index(),
                    },
                );
                driver.submit(&mut op).unwrap();
                tracker.accepted();
                op
            })
            .collect();
        tracker.seal();
        (tracker, ops)
    }

    fn cancel_all(ops: &mut [usize]) -> impl FnMut(&mut FakeDriver) + '_ {
        move |driver| {
            for op in ops.iter_mut() {
                let _ = driver.cancel(op);
            }
        }
    }

    #[test]
    fn runs_until_complete() {
        let mut driver = FakeDriver::new(Mode::Echo);
        let mut buffer = [0u8; 3];
        let (mut tracker, mut ops) = round(&mut driver, &mut buffer);

        let clock = StepClock::new(Duration::from_millis(1));
        let report = EventPump::new(&clock, SLICE, Duration::from_secs(1)).run(
            &mut driver,
            &mut tracker,
            cancel_all(&mut ops),
        );
        assert!(tracker.is_completed());
        assert_eq!(tracker.actual_length(), 3);
        assert_eq!(
            report,
            PumpReport {
                dispatches: 1,
                dispatch_errors: 0,
                timed_out: false,
                cancellations: 0,
            }
        );
        assert!(driver.cancelled.is_empty());
        assert_eq!(buffer, [fill(0), fill(1), fill(2)]);
    }

    #[test]
    fn interrupted_dispatch_is_retried() {
        let mut driver = FakeDriver::new(Mode::Echo);
        driver.dispatch_errors.push_back(TransportError::Interrupted);
        driver.dispatch_errors.push_back(TransportError::Interrupted);
        let mut buffer = [0u8; 2];
        let (mut tracker, mut ops) = round(&mut driver, &mut buffer);

        let clock = StepClock::new(Duration::ZERO);
        let report = EventPump::new(&clock, SLICE, Duration::from_secs(1)).run(
            &mut driver,
            &mut tracker,
            cancel_all(&mut ops),
        );
        assert_eq!(report.dispatches, 3);
        assert_eq!(report.dispatch_errors, 0);
        assert_eq!(report.cancellations, 0);
        assert!(driver.cancelled.is_empty());
        assert_eq!(tracker.actual_length(), 2);
    }

    #[test]
    fn dispatch_error_escalates_to_cancel() {
        let mut driver = FakeDriver::new(Mode::Manual);
        driver.dispatch_errors.push_back(TransportError::Io);
        let mut buffer = [0u8; 2];
        let (mut tracker, mut ops) = round(&mut driver, &mut buffer);

        let clock = StepClock::new(Duration::ZERO);
        let report = EventPump::new(&clock, SLICE, Duration::from_secs(1)).run(
            &mut driver,
            &mut tracker,
            cancel_all(&mut ops),
        );
        assert_eq!(report.dispatch_errors, 1);
        assert_eq!(report.cancellations, 1);
        assert!(!report.timed_out);
        assert_eq!(driver.cancelled_contexts(), [0, 1]);
        assert!(tracker.is_completed());
        assert_eq!(tracker.result(0).unwrap().status, Status::Cancelled);
        assert_eq!(driver.pending(), 0);
    }

    #[test]
    fn timeout_cancels_but_keeps_waiting() {
        let mut driver = FakeDriver::new(Mode::Manual);
        let mut buffer = [0u8; 2];
        let (mut tracker, mut ops) = round(&mut driver, &mut buffer);
        // One operation finishes. The other never does, until cancelled.
        driver.finish(0, Completion::new(Status::Completed, 1));

        let clock = StepClock::new(Duration::from_millis(10));
        let report = EventPump::new(&clock, SLICE, Duration::from_millis(45)).run(
            &mut driver,
            &mut tracker,
            cancel_all(&mut ops),
        );
        assert!(report.timed_out);
        assert_eq!(report.cancellations, 1);
        // start = 0 ms, then reads at 10, 20, 30, 40, 50 ms
        assert_eq!(report.dispatches, 6);
        assert!(tracker.is_completed());
        assert_eq!(tracker.actual_length(), 1);
        assert_eq!(tracker.result(1).unwrap().status, Status::Cancelled);
        assert_eq!(buffer, [fill(0), 0]);
    }

    #[test]
    fn repeats_cancellation_until_delivered() {
        let mut driver = FakeDriver::new(Mode::Manual);
        driver.complete_cancelled = false;
        let mut buffer = [0u8; 1];
        let (mut tracker, mut ops) = round(&mut driver, &mut buffer);

        let clock = StepClock::new(Duration::from_millis(10));
        let pump = EventPump::new(&clock, SLICE, Duration::ZERO);
        let mut calls = 0;
        let report = pump.run(&mut driver, &mut tracker, |driver| {
            calls += 1;
            let _ = driver.cancel(&mut ops[0]);
            if calls == 3 {
                driver.finish(0, Completion::new(Status::Cancelled, 0));
            }
        });
        assert_eq!(calls, 3);
        assert_eq!(report.cancellations, 3);
        assert!(report.timed_out);
        assert!(tracker.is_completed());
    }
}
