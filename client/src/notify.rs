//! User-facing notifications

use log::{error, info, warn};
use std::time::{Duration, Instant};

/// Lifetime of a note published without `persist`.
pub const TRANSIENT_NOTE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteHandle(u64);

#[derive(Debug, Clone)]
pub struct Note {
    pub handle: NoteHandle,
    pub message: String,
    pub severity: Severity,
    pub persist: bool,
    pub expires_at: Option<Instant>,
}

/// Fire-and-forget sink the session reports to.
pub trait NotificationSink {
    fn publish(&mut self, message: &str, severity: Severity, persist: bool) -> NoteHandle;

    /// Removes a note now, or after `after` has elapsed.
    fn remove(&mut self, handle: NoteHandle, after: Option<Duration>);

    fn info(&mut self, message: &str, persist: bool) -> NoteHandle {
        self.publish(message, Severity::Info, persist)
    }

    fn warning(&mut self, message: &str) -> NoteHandle {
        self.publish(message, Severity::Warning, false)
    }

    fn error(&mut self, message: &str) -> NoteHandle {
        self.publish(message, Severity::Error, false)
    }
}

/// In-process sink backing the on-screen banner.
pub struct NotificationCenter {
    notes: Vec<Note>,
    next_handle: u64,
    transient_for: Duration,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::with_transient_duration(TRANSIENT_NOTE)
    }

    pub fn with_transient_duration(transient_for: Duration) -> Self {
        Self {
            notes: Vec::new(),
            next_handle: 1,
            transient_for,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn contains(&self, handle: NoteHandle) -> bool {
        self.notes.iter().any(|n| n.handle == handle)
    }

    /// Drops notes whose removal time has passed.
    pub fn prune(&mut self) {
        self.prune_at(Instant::now());
    }

    pub fn prune_at(&mut self, now: Instant) {
        self.notes
            .retain(|note| note.expires_at.map_or(true, |at| at > now));
    }
}

impl NotificationSink for NotificationCenter {
    fn publish(&mut self, message: &str, severity: Severity, persist: bool) -> NoteHandle {
        match severity {
            Severity::Error => error!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Info | Severity::Success => info!("{}", message),
        }

        let handle = NoteHandle(self.next_handle);
        self.next_handle += 1;

        let expires_at = if persist {
            None
        } else {
            Some(Instant::now() + self.transient_for)
        };

        self.notes.push(Note {
            handle,
            message: message.to_string(),
            severity,
            persist,
            expires_at,
        });
        handle
    }

    fn remove(&mut self, handle: NoteHandle, after: Option<Duration>) {
        match after {
            None => self.notes.retain(|n| n.handle != handle),
            Some(delay) => {
                let at = Instant::now() + delay;
                if let Some(note) = self.notes.iter_mut().find(|n| n.handle == handle) {
                    note.expires_at = Some(at);
                }
            }
        }
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
