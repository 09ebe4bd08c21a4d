//! Status reconciliation: turns consecutive snapshots into notifications and refetches.
//!
//! The reconciler is synchronous and owns no tasks. The session actor feeds it one
//! observation at a time and carries out the refetch it asks for, reporting the result
//! back through [`StatusReconciler::complete_refetch`].

use crate::diff::{Classification, classify};
use crate::notify::Notification;
use locwatch_common::{
    CodeLocationEntry, LocationSnapshot, SourceError, WatchError, WorkspaceReload,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How a dependent workspace refetch should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefetchMode {
    /// Only failures are reported.
    Silent,
    /// Completion is announced as reloaded or loaded-with-errors.
    Loud,
}

/// What the session should do after one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub classification: Classification,
    /// Notifications to deliver now, in order.
    pub notifications: Vec<Notification>,
    pub refetch: Option<RefetchMode>,
}

/// Display summary of the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocationStatus {
    pub busy: bool,
    pub error_count: usize,
}

impl LocationStatus {
    /// Text shown next to the status indicator.
    pub fn message(&self) -> String {
        if self.busy {
            return "Loading definitions…".to_string();
        }
        match self.error_count {
            1 => "1 code location failed to load".to_string(),
            n => format!("{n} code locations failed to load"),
        }
    }
}

/// State owned by one status session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilerState {
    /// Snapshot delivered before the current one.
    pub previous_snapshot: Option<LocationSnapshot>,
    pub current_snapshot: LocationSnapshot,
    /// Whether any entry of the current snapshot is loading.
    pub loading: bool,
    pub refetches_in_flight: usize,
    pub observations: u64,
}

impl ReconcilerState {
    /// Locations loading, or a dependent refetch outstanding.
    pub fn busy(&self) -> bool {
        self.loading || self.refetches_in_flight > 0
    }

    pub fn error_count(&self) -> usize {
        self.current_snapshot
            .iter()
            .filter(|entry| entry.has_error)
            .count()
    }
}

/// Decides notifications and refetches for a stream of snapshots.
#[derive(Debug, Default)]
pub struct StatusReconciler {
    state: ReconcilerState,
    /// Set after a transport failure was reported, cleared by the next snapshot.
    failure_reported: bool,
}

impl StatusReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    /// Latest delivered snapshot.
    pub fn entries(&self) -> &[CodeLocationEntry] {
        &self.state.current_snapshot
    }

    /// Diff `snapshot` against the stored one, store it and return the reaction.
    ///
    /// A requested refetch counts as in flight until `complete_refetch` is called.
    pub fn observe(&mut self, snapshot: LocationSnapshot) -> Reaction {
        let classification = {
            let previous = (self.state.observations > 0)
                .then_some(self.state.current_snapshot.as_slice());
            classify(previous, &snapshot)
        };
        debug!(
            entries = snapshot.len(),
            classification = classification.name(),
            "Observed location snapshot"
        );

        self.failure_reported = false;
        self.state.loading = snapshot.iter().any(CodeLocationEntry::is_loading);
        let previous = std::mem::replace(&mut self.state.current_snapshot, snapshot);
        if self.state.observations > 0 {
            self.state.previous_snapshot = Some(previous);
        }
        self.state.observations += 1;

        let mut notifications = Vec::new();
        let refetch = match &classification {
            Classification::Initial | Classification::Unchanged => None,
            Classification::Shrunk { removed_ids } => {
                info!(removed = removed_ids.len(), "Code locations removed");
                Some(RefetchMode::Silent)
            }
            Classification::Grown { added_ids } => {
                info!(added = added_ids.len(), "Code locations added");
                notifications.push(Notification::added(added_ids.clone()));
                Some(RefetchMode::Loud)
            }
            Classification::StartedLoading { loading_ids } => {
                info!(loading = loading_ids.len(), "Code locations started loading");
                notifications.push(Notification::updating(loading_ids.clone()));
                None
            }
            Classification::FinishedLoading => {
                info!("Code locations finished loading");
                Some(RefetchMode::Loud)
            }
        };
        if refetch.is_some() {
            self.state.refetches_in_flight += 1;
        }

        Reaction {
            classification,
            notifications,
            refetch,
        }
    }

    /// Record the outcome of a refetch requested by `observe`.
    pub fn complete_refetch(
        &mut self,
        mode: RefetchMode,
        result: Result<WorkspaceReload, SourceError>,
    ) -> Option<Notification> {
        self.state.refetches_in_flight = self.state.refetches_in_flight.saturating_sub(1);
        match (mode, result) {
            (_, Err(err)) => {
                warn!(mode = ?mode, "{}", WatchError::Refetch(err.clone()));
                Some(Notification::refetch_failed(&err))
            }
            (RefetchMode::Silent, Ok(_)) => {
                debug!("Silent workspace refetch completed");
                None
            }
            (RefetchMode::Loud, Ok(reload)) if reload.has_errors() => {
                let error_count = reload.error_count();
                warn!(
                    error_count,
                    workspace_error = reload.workspace_error.as_deref(),
                    "Workspace loaded with errors"
                );
                Some(Notification::loaded_with_errors(error_count))
            }
            (RefetchMode::Loud, Ok(reload)) => {
                info!(entries = reload.entries.len(), "Definitions reloaded");
                Some(Notification::reloaded())
            }
        }
    }

    /// Record a failed observation. Only the first of a consecutive run is reported.
    pub fn observe_failure(&mut self, err: &SourceError) -> Option<Notification> {
        if self.failure_reported {
            debug!("Transport still failing: {}", err);
            return None;
        }
        warn!("{}", WatchError::Transport(err.clone()));
        self.failure_reported = true;
        Some(Notification::transport_failed(err))
    }

    /// `None` when idle without errors.
    pub fn summarize(&self) -> Option<LocationStatus> {
        let status = LocationStatus {
            busy: self.state.busy(),
            error_count: self.state.error_count(),
        };
        (status.busy || status.error_count > 0).then_some(status)
    }
}
