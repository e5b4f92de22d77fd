//! Post-import reconciliation
//!
//! Steps run in order: de-duplicate messages, rebuild the search index,
//! recreate indexes, recreate triggers, refresh thread summaries, check
//! foreign keys. The caller polls for cancellation between steps.

use tracing::{debug, error};

use super::rewrite::BulkRewrite;
use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::{messages, structure, threads};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Deduplicate,
    RebuildSearch,
    RecreateIndexes,
    RecreateTriggers,
    RefreshThreads,
    CheckForeignKeys,
}

pub const STEPS: [Step; 6] = [
    Step::Deduplicate,
    Step::RebuildSearch,
    Step::RecreateIndexes,
    Step::RecreateTriggers,
    Step::RefreshThreads,
    Step::CheckForeignKeys,
];

pub fn run(rewrite: &BulkRewrite<'_>, step: Step) -> ArchiveResult<()> {
    let conn = rewrite.conn();
    match step {
        Step::Deduplicate => {
            let removed = messages::delete_duplicates(conn)?;
            debug!(removed, "Removed duplicate messages");
        }
        Step::RebuildSearch => {
            let indexed = messages::rebuild_search_index(conn)?;
            debug!(indexed, "Rebuilt search index");
        }
        Step::RecreateIndexes => rewrite.recreate_indexes()?,
        Step::RecreateTriggers => rewrite.recreate_triggers()?,
        Step::RefreshThreads => {
            let updated = threads::refresh_summaries(conn)?;
            debug!(updated, "Refreshed thread summaries");
        }
        Step::CheckForeignKeys => {
            let violations = structure::foreign_key_violations(conn)?;
            if let Some(first) = violations.first() {
                error!(
                    count = violations.len(),
                    table = %first.table,
                    parent = %first.parent,
                    "Foreign key violations after import"
                );
                return Err(ArchiveError::CorruptImport(format!(
                    "{} foreign key violation(s), first in {} referencing {}",
                    violations.len(),
                    first.table,
                    first.parent
                )));
            }
        }
    }
    Ok(())
}
