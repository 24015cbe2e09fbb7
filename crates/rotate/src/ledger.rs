//! Change ledger
//!
//! In-memory record of every rotation attempt in the current run. An
//! entry only ever moves forward: not-attempted can become failed or
//! succeeded, but a recorded outcome is never reverted and a success is
//! never overwritten.

use crate::secret::Secret;

/// The three kinds of rotation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    ApplicationUser,
    ControlPanel,
    Database,
}

impl TargetKind {
    /// Section label used in the notification.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ApplicationUser => "Application admin users",
            Self::ControlPanel => "Control panel",
            Self::Database => "Database",
        }
    }

    /// Report order is fixed so the notification is deterministic.
    pub const REPORT_ORDER: [TargetKind; 3] = [
        Self::ApplicationUser,
        Self::ControlPanel,
        Self::Database,
    ];
}

/// Outcome of one identity's rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NotAttempted,
    Failed,
    Succeeded {
        secret: Secret,
        /// The credential changed but the site config file was not
        /// updated to match; the operator must reconcile manually.
        config_stale: bool,
    },
}

/// One target identity and its outcome.
#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: TargetKind,
    pub identity: String,
    pub outcome: Outcome,
}

/// The run's change ledger. Entries are kept in registration order,
/// which is also attempt order under the sequential execution model.
#[derive(Debug, Default)]
pub struct ChangeLedger {
    entries: Vec<Entry>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity as a known target, initially not-attempted.
    /// Idempotent; registering an existing entry never resets it.
    pub fn register(&mut self, kind: TargetKind, identity: &str) {
        if self.position(kind, identity).is_none() {
            self.entries.push(Entry {
                kind,
                identity: identity.to_string(),
                outcome: Outcome::NotAttempted,
            });
        }
    }

    /// Record a failed attempt. A previously recorded success stands.
    pub fn record_failure(&mut self, kind: TargetKind, identity: &str) {
        self.register(kind, identity);
        if let Some(entry) = self.entry_mut(kind, identity) {
            if !matches!(entry.outcome, Outcome::Succeeded { .. }) {
                entry.outcome = Outcome::Failed;
            }
        }
    }

    /// Record a successful rotation. At most one success is kept per
    /// identity per run; a second success for the same identity is a
    /// caller bug and is ignored.
    pub fn record_success(
        &mut self,
        kind: TargetKind,
        identity: &str,
        secret: Secret,
        config_stale: bool,
    ) {
        self.register(kind, identity);
        if let Some(entry) = self.entry_mut(kind, identity) {
            if !matches!(entry.outcome, Outcome::Succeeded { .. }) {
                entry.outcome = Outcome::Succeeded {
                    secret,
                    config_stale,
                };
            }
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Succeeded entries for one target kind, in attempt order.
    pub fn succeeded(&self, kind: TargetKind) -> Vec<&Entry> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind && matches!(e.outcome, Outcome::Succeeded { .. }))
            .collect()
    }

    /// True when at least one rotation anywhere succeeded.
    pub fn any_succeeded(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.outcome, Outcome::Succeeded { .. }))
    }

    pub fn outcome(&self, kind: TargetKind, identity: &str) -> Option<&Outcome> {
        self.position(kind, identity)
            .map(|i| &self.entries[i].outcome)
    }

    fn position(&self, kind: TargetKind, identity: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.kind == kind && e.identity == identity)
    }

    fn entry_mut(&mut self, kind: TargetKind, identity: &str) -> Option<&mut Entry> {
        self.position(kind, identity)
            .map(move |i| &mut self.entries[i])
    }
}
