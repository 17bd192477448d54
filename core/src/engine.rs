//! The prediction scheduler: decides, on every edit, whether to request a
//! continuation now (threshold path), after a pause (debounce path), or not
//! at all; owns the single pending-suggestion slot and the generation
//! counter that fences off stale streams.
//!
//! The engine is a synchronous state machine with an injected clock. It
//! never sleeps and never touches the network: the host arms a timer from
//! [`PredictionEngine::debounce_deadline`] and calls back in, which keeps
//! every timing decision deterministic under test.

use std::time::Duration;
use std::time::Instant;

use crate::delta::TypedDeltaTracker;
use crate::overlap::is_similar;

/// Cumulative typed characters that trigger an immediate request.
const PREDICT_THRESHOLD_CHARS: u64 = 15;

/// Pause after the last edit before the debounce path fires.
const DEBOUNCE_DELAY: Duration = Duration::from_millis(1500);

/// The debounce path only arms once the document is longer than this.
const MIN_DOC_CHARS_FOR_DEBOUNCE: usize = 10;

/// Identifies one `begin_request` call. Frames carrying an older generation
/// are dropped, so a superseded stream can never resurrect its suggestion.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Threshold,
    Debounce,
    Manual,
}

impl Trigger {
    /// Manual triggers surface failures to the user; automatic ones only log.
    pub fn is_manual(self) -> bool {
        matches!(self, Trigger::Manual)
    }
}

#[derive(Debug)]
pub struct PredictionEngine {
    tracker: TypedDeltaTracker,
    /// Cumulative text of the pending suggestion; empty means none.
    suggestion: String,
    generation: Generation,
    /// Generation of the request currently driving the loading indicator.
    in_flight: Option<Generation>,
    debounce_deadline: Option<Instant>,
}

impl PredictionEngine {
    pub fn new(initial_doc_chars: usize) -> Self {
        Self {
            tracker: TypedDeltaTracker::new(initial_doc_chars),
            suggestion: String::new(),
            generation: 0,
            in_flight: None,
            debounce_deadline: None,
        }
    }

    /// Processes one edit event. Returns `Some(Trigger::Threshold)` when the
    /// caller should fire a request immediately.
    ///
    /// The typed-since counter resets whenever the threshold check runs,
    /// even if the overlap check suppressed the request. Intentional parity
    /// with the shipped behavior: continuing to type text that matches the
    /// pending suggestion will not re-request at the threshold.
    pub fn on_edit(&mut self, text: &str, now: Instant) -> Option<Trigger> {
        let doc_chars = text.chars().count();
        let typed_since = self.tracker.on_edit(doc_chars);

        let mut trigger = None;
        if typed_since >= PREDICT_THRESHOLD_CHARS {
            if !is_similar(text, self.suggestion()) {
                trigger = Some(Trigger::Threshold);
            }
            self.tracker.reset();
        }

        self.debounce_deadline = if doc_chars > MIN_DOC_CHARS_FOR_DEBOUNCE {
            Some(now + DEBOUNCE_DELAY)
        } else {
            None
        };

        trigger
    }

    /// Deadline the host should sleep until, if the debounce path is armed.
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce_deadline
    }

    /// Called when the armed deadline elapses. The overlap check runs
    /// against the text as it is *now*, not as it was when the timer was
    /// armed. Returns true when the caller should fire a request.
    pub fn poll_debounce(&mut self, text: &str, now: Instant) -> bool {
        match self.debounce_deadline {
            Some(deadline) if now >= deadline => {
                self.debounce_deadline = None;
                !is_similar(text, self.suggestion())
            }
            _ => false,
        }
    }

    /// Explicit user request: bypasses threshold and debounce checks. The
    /// caller always fires after this.
    pub fn manual_trigger(&mut self) {
        self.tracker.reset();
    }

    /// Registers a new outstanding request and supersedes every earlier one.
    pub fn begin_request(&mut self) -> Generation {
        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.generation
    }

    /// Applies one cumulative frame from the stream tagged `generation`.
    /// The previous suggestion stays visible until the first frame of the
    /// newer stream arrives, at which point it is replaced wholesale.
    /// Stale frames are dropped; returns whether the frame was applied.
    pub fn apply_frame(&mut self, generation: Generation, cumulative: &str) -> bool {
        if generation != self.generation {
            return false;
        }
        self.suggestion.clear();
        self.suggestion.push_str(cumulative);
        true
    }

    /// The stream tagged `generation` finished cleanly.
    pub fn finish_request(&mut self, generation: Generation) {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
    }

    /// The stream tagged `generation` failed. The document and any current
    /// suggestion are left untouched; only the loading indicator clears.
    pub fn fail_request(&mut self, generation: Generation) {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        if self.suggestion.is_empty() {
            None
        } else {
            Some(&self.suggestion)
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Merges the pending suggestion into `document`. Returns false when no
    /// suggestion is pending so the accept key can fall through to normal
    /// input handling. Accepting invalidates any stream still in flight:
    /// its remaining frames would otherwise re-propose text that was just
    /// merged.
    pub fn accept(&mut self, document: &mut String) -> bool {
        if self.suggestion.is_empty() {
            return false;
        }
        document.push_str(&self.suggestion);
        self.suggestion.clear();
        self.generation += 1;
        self.in_flight = None;
        self.tracker.note_accepted(document.chars().count());
        true
    }

    /// Drops the pending suggestion and invalidates any in-flight stream.
    pub fn dismiss(&mut self) {
        self.suggestion.clear();
        self.generation += 1;
        self.in_flight = None;
    }

    pub fn typed_since(&self) -> u64 {
        self.tracker.typed_since()
    }
}
