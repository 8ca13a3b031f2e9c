//! Insert/update classification of candidate rows

use std::collections::HashSet;

use crate::columns::VersionedRow;
use crate::db::TargetStore;
use crate::error::Result;
use crate::models::{RowId, RowVersion};

/// Candidates split by what the target needs
#[derive(Debug)]
pub struct Classification<'a, T> {
    /// Ids the target does not hold yet
    pub to_insert: Vec<&'a T>,
    /// Ids the target holds with a version no candidate carries
    pub to_update: Vec<&'a T>,
    /// Candidates the target already holds at their current version
    pub unchanged: usize,
}

/// Classify `candidates` against the rows the target currently holds
///
/// Versions are compared by set membership only: a stored copy is stale when
/// its token is not among the candidates' tokens.
pub async fn classify<'a, T: VersionedRow>(
    candidates: &'a [T],
    target: &TargetStore<'_, T>,
) -> Result<Classification<'a, T>> {
    let ids: Vec<RowId> = candidates.iter().map(VersionedRow::id).collect();
    let candidate_versions: HashSet<RowVersion> =
        candidates.iter().map(VersionedRow::row_version).collect();

    let stored = target.versions_of(&ids).await?;
    let stale: HashSet<RowId> = stored
        .iter()
        .filter(|(_, version)| !candidate_versions.contains(*version))
        .map(|(id, _)| *id)
        .collect();

    let mut classification = Classification {
        to_insert: Vec::new(),
        to_update: Vec::new(),
        unchanged: 0,
    };
    for candidate in candidates {
        let id = candidate.id();
        if !stored.contains_key(&id) {
            classification.to_insert.push(candidate);
        } else if stale.contains(&id) {
            classification.to_update.push(candidate);
        } else {
            classification.unchanged += 1;
        }
    }

    tracing::debug!(
        "Classified {} candidates: {} to insert, {} to update, {} unchanged",
        candidates.len(),
        classification.to_insert.len(),
        classification.to_update.len(),
        classification.unchanged
    );
    Ok(classification)
}
