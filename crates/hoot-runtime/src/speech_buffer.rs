//! Speech buffering: decides when spoken text is complete.
//!
//! A [`SpeechBuffer`] is a two-state machine:
//!
//! ```text
//!            fragment not ending in '!'
//!           ┌──────────────┐
//!           ▼              │
//!     ┌────────────┐───────┘        ┌──────────┐
//!     │ Collecting │ ─────────────▶ │ Flushing │ ── emit accumulated text
//!     └────────────┘  ends in '!'   └──────────┘    then reset
//!           ▲                              │
//!           └──────────────────────────────┘
//! ```
//!
//! Only a *trailing* terminator flushes; a `!` inside a fragment is ordinary
//! punctuation. Empty fragments are ignored.
//!
//! [`SpeechBuffers`] keys independent buffers by session and serialises the
//! append-check-flush sequence of each call, so fragments from overlapping
//! requests never interleave. At most [`DEFAULT_MAX_SESSIONS`] sessions hold
//! unfinished text at once; opening one more discards the least recently
//! used.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use hoot_types::{SpeechRequest, Utterance};
use tracing::{debug, warn};

/// Character that closes an utterance.
pub const TERMINATOR: char = '!';

/// Sessions that may hold unfinished text at the same time.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Accumulates fragments of one speaker until an utterance is complete.
#[derive(Debug, Clone, Default)]
pub struct SpeechBuffer {
    accumulated: String,
}

impl SpeechBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `fragment`; return the complete utterance if it now ends with
    /// the terminator, leaving the buffer empty.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        if fragment.is_empty() {
            return None;
        }
        self.accumulated.push_str(fragment);
        if self.accumulated.ends_with(TERMINATOR) {
            Some(std::mem::take(&mut self.accumulated))
        } else {
            None
        }
    }

    /// Text collected so far.
    pub fn pending(&self) -> &str {
        &self.accumulated
    }

    pub fn has_pending_fragment(&self) -> bool {
        !self.accumulated.is_empty()
    }
}

#[derive(Debug, Default)]
struct Slot {
    buffer: SpeechBuffer,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Sessions {
    slots: HashMap<String, Slot>,
    /// Bumped on every submit; orders slots by recency.
    clock: u64,
}

impl Sessions {
    /// Drop the least recently used slot.
    fn evict_oldest(&mut self) {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(name, _)| name.clone());
        if let Some(name) = oldest
            && let Some(slot) = self.slots.remove(&name)
        {
            warn!(
                session = %name,
                dropped_chars = slot.buffer.pending().len(),
                "too many open speech sessions, discarding the oldest"
            );
        }
    }
}

/// Per-session speech buffers behind a single lock.
#[derive(Debug)]
pub struct SpeechBuffers {
    sessions: Mutex<Sessions>,
    max_sessions: usize,
}

impl Default for SpeechBuffers {
    fn default() -> Self {
        Self::with_max_sessions(DEFAULT_MAX_SESSIONS)
    }
}

impl SpeechBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep unfinished text for at most `max_sessions` sessions (minimum 1).
    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Feed `speech.text` into `session`'s buffer.
    ///
    /// When the buffer flushes, `on_flush` runs *while the lock is held*, so
    /// utterances are observed in the order their buffers completed. Returns
    /// whether a flush happened.
    pub fn submit<F>(&self, session: &str, speech: &SpeechRequest, on_flush: F) -> bool
    where
        F: FnOnce(Utterance),
    {
        if speech.text.is_empty() {
            return false;
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if !sessions.slots.contains_key(session) && sessions.slots.len() >= self.max_sessions {
            sessions.evict_oldest();
        }
        sessions.clock += 1;
        let now = sessions.clock;
        let slot = sessions.slots.entry(session.to_string()).or_default();
        slot.last_used = now;
        match slot.buffer.push(&speech.text) {
            Some(text) => {
                sessions.slots.remove(session);
                debug!(session, chars = text.len(), "utterance complete");
                on_flush(Utterance {
                    text,
                    rate: speech.rate,
                    pitch: speech.pitch,
                    session: session.to_string(),
                });
                true
            }
            None => {
                debug!(session, pending = slot.buffer.pending().len(), "fragment buffered");
                false
            }
        }
    }

    /// Text waiting for a terminator in `session`, if any.
    pub fn pending(&self, session: &str) -> Option<String> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .slots
            .get(session)
            .filter(|s| s.buffer.has_pending_fragment())
            .map(|s| s.buffer.pending().to_string())
    }

    /// Discard `session`'s pending text. Returns whether anything was
    /// discarded.
    pub fn clear(&self, session: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .slots
            .remove(session)
            .is_some_and(|s| s.buffer.has_pending_fragment())
    }

    /// Number of sessions holding an incomplete utterance.
    pub fn pending_sessions(&self) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.slots.values().filter(|s| s.buffer.has_pending_fragment()).count()
    }
}
