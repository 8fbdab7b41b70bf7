//! The ordered pipeline of entry steps.

use crate::core::Args;
use std::collections::VecDeque;

/// A unit of work for the sequencer.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Step {
    /// Enter the initial state: no exit phase, no prior state, no drain.
    Initialize,
    /// Exit the current state, enter `target` with `args`, drain its queue.
    Transition { target: String, args: Args },
}

/// Strict FIFO of pending steps.
///
/// Only one step is ever taken at a time; `running` is held for the duration
/// of a processing loop so a nested loop cannot start.
#[derive(Debug, Default)]
pub(crate) struct Sequencer {
    steps: VecDeque<Step>,
    running: bool,
}

impl Sequencer {
    pub(crate) fn seeded() -> Self {
        let mut sequencer = Self::default();
        sequencer.push(Step::Initialize);
        sequencer
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.steps.push_back(step);
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    /// Claim the processing loop. Returns false if it is already claimed.
    pub(crate) fn begin(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    pub(crate) fn next(&mut self) -> Option<Step> {
        self.steps.pop_front()
    }

    pub(crate) fn finish(&mut self) {
        self.running = false;
    }
}
