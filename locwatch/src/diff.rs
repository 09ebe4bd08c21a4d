//! Classification of consecutive code-location snapshots.
//!
//! Entries are matched by id, never by position. One observation always resolves to
//! exactly one [`Classification`], checked in priority order:
//! `Shrunk > Grown > StartedLoading > FinishedLoading > Unchanged`.

use locwatch_common::{CodeLocationEntry, LocationId};
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of comparing a snapshot with the one delivered before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// First observation of the session.
    Initial,
    /// At least one entry disappeared.
    Shrunk { removed_ids: Vec<LocationId> },
    /// New entries appeared and nothing is loading.
    Grown { added_ids: Vec<LocationId> },
    /// Something started loading while nothing was loading before.
    StartedLoading { loading_ids: Vec<LocationId> },
    /// Everything that was loading is done.
    FinishedLoading,
    Unchanged,
}

impl Classification {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Shrunk { .. } => "shrunk",
            Self::Grown { .. } => "grown",
            Self::StartedLoading { .. } => "started_loading",
            Self::FinishedLoading => "finished_loading",
            Self::Unchanged => "unchanged",
        }
    }
}

fn any_loading(entries: &[CodeLocationEntry]) -> bool {
    entries.iter().any(CodeLocationEntry::is_loading)
}

/// Classify `current` against `previous`.
///
/// Duplicate ids inside one snapshot are tolerated; which duplicate wins is unspecified.
pub fn classify(
    previous: Option<&[CodeLocationEntry]>,
    current: &[CodeLocationEntry],
) -> Classification {
    let Some(previous) = previous else {
        return Classification::Initial;
    };

    let previous_ids: HashSet<&LocationId> = previous.iter().map(|entry| &entry.id).collect();
    let current_ids: HashSet<&LocationId> = current.iter().map(|entry| &entry.id).collect();

    let removed_ids: Vec<LocationId> = previous
        .iter()
        .filter(|entry| !current_ids.contains(&entry.id))
        .map(|entry| entry.id.clone())
        .collect();
    if !removed_ids.is_empty() {
        return Classification::Shrunk { removed_ids };
    }

    let currently_loading = any_loading(current);
    let added_ids: Vec<LocationId> = current
        .iter()
        .filter(|entry| !previous_ids.contains(&entry.id))
        .map(|entry| entry.id.clone())
        .collect();
    if current.len() > previous.len() && !added_ids.is_empty() && !currently_loading {
        return Classification::Grown { added_ids };
    }

    let previously_loading = any_loading(previous);
    if !previously_loading && currently_loading {
        let loading_ids = current
            .iter()
            .filter(|entry| entry.is_loading())
            .map(|entry| entry.id.clone())
            .collect();
        return Classification::StartedLoading { loading_ids };
    }
    if previously_loading && !currently_loading {
        return Classification::FinishedLoading;
    }

    Classification::Unchanged
}
