//! Completion bookkeeping for one submit / wait round
//!
//! The tracker is only mutated through its [`CompletionSink`] implementation,
//! which the driver calls from inside `dispatch()`, and by the coordinator
//! when it starts a new round.

use crate::{
    driver::{Completion, CompletionSink},
    plan::{Chunk, ChunkPlan},
};
use alloc::{vec, vec::Vec};

pub struct CompletionTracker {
    /// Operations accepted by the driver this round
    submitted: usize,
    /// Completions observed this round
    done: usize,
    completed: bool,
    /// Sum of every completion's actual length, regardless of status
    actual_length: usize,
    /// Planned length of each chunk, the most a completion may report
    limits: Vec<usize>,
    /// One slot per chunk, indexed by the operation's context
    results: Vec<Option<Completion>>,
}

impl CompletionTracker {
    pub fn new(plan: &ChunkPlan) -> Self {
        CompletionTracker {
            submitted: 0,
            done: 0,
            completed: true,
            actual_length: 0,
            limits: plan.chunks().iter().map(Chunk::len).collect(),
            results: vec![None; plan.chunk_count()],
        }
    }

    /// Start a new round
    pub fn reset(&mut self) {
        self.submitted = 0;
        self.done = 0;
        self.completed = false;
        self.actual_length = 0;
        self.results.iter_mut().for_each(|result| *result = None);
    }

    /// Count one more accepted submission
    pub fn accepted(&mut self) {
        debug_assert!(self.submitted < self.results.len());
        self.submitted += 1;
    }

    /// Close the submission phase
    ///
    /// A round that didn't submit anything is complete immediately.
    pub fn seal(&mut self) {
        if self.done >= self.submitted {
            self.completed = true;
        }
    }

    /// Forget the accepted operations after they've all completed
    pub fn drained(&mut self) {
        debug_assert!(self.completed);
        self.submitted = 0;
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn actual_length(&self) -> usize {
        self.actual_length
    }

    pub fn result(&self, index: usize) -> Option<Completion> {
        self.results.get(index).copied().flatten()
    }
}

impl CompletionSink for CompletionTracker {
    fn complete(&mut self, context: usize, mut completion: Completion) {
        // Operations are submitted in plan order, so the accepted ones are
        // exactly 0..submitted.
        if context >= self.submitted {
            warn!(
                "Completion for chunk {} ignored; {} submitted",
                context, self.submitted
            );
            return;
        }
        let slot = &mut self.results[context];
        if slot.is_some() {
            warn!("Duplicate completion for chunk {} ignored", context);
            return;
        }
        let limit = self.limits[context];
        if completion.actual_length > limit {
            warn!(
                "Chunk {} reported {} bytes, but holds {}; clamping",
                context, completion.actual_length, limit
            );
            completion.actual_length = limit;
        }
        *slot = Some(completion);

        // Status isn't considered. Failed and cancelled operations count
        // toward `done`, and contribute their (possibly zero) length.
        self.actual_length += completion.actual_length;
        self.done += 1;
        if self.done >= self.submitted {
            self.completed = true;
        }
    }

    fn is_completed(&self) -> bool {
        self.completed
    }
}
