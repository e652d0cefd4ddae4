use std::sync::{Mutex, PoisonError};

use crate::{RunEvent, Stage};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: RunEvent) {}
}

/// Keeps every event in memory so an interrupted run can report how far it got.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent stage entered, if any.
    pub fn last_stage(&self) -> Option<Stage> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find_map(|event| match event {
                RunEvent::StageStarted(stage) => Some(*stage),
                _ => None,
            })
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|event| match event {
                RunEvent::StageStarted(stage) => Some(*stage),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn emit(&self, event: RunEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
