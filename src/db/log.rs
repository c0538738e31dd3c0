use crate::db::TableId;
use crate::db::value::Value;

/// One reverse-executable mutation record.
///
/// Inserted/Deleted/Updated carry full row snapshots so rollback is a pure
/// data-driven pass that cannot fail for lack of memory, and so the commit
/// pass can feed triggers with before/after images.
#[derive(Debug, Clone)]
pub enum Change {
    Inserted { row_id: u64, after: Vec<Value> },
    Deleted { row_id: u64, before: Vec<Value> },
    Updated { row_id: u64, colmask: u32, before: Vec<Value>, after: Vec<Value> },
    /// First change of a table within the transaction; `prior` restores the
    /// table stamp on rollback.
    StampAdvance { prior: u32 },
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub depth: u32,
    pub table: TableId,
    pub change: Change,
}

/// The change log of the (single) outermost transaction. Nested
/// transactions append to the same log with their own depth tag, so a
/// nested rollback can drop just its suffix.
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: Vec<LogEntry>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push(&mut self, depth: u32, table: TableId, change: Change) {
        self.entries.push(LogEntry { depth, table, change });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Takes every entry, oldest first, for the outermost commit pass.
    pub fn drain_all(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Takes the entries recorded at `depth` or deeper, newest first, for
    /// the rollback pass of that depth.
    pub fn drain_from_depth(&mut self, depth: u32) -> Vec<LogEntry> {
        let mut undone = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());

        for entry in self.entries.drain(..) {
            if entry.depth >= depth {
                undone.push(entry);
            } else {
                kept.push(entry);
            }
        }

        self.entries = kept;
        undone.reverse();
        undone
    }

    /// Cancels pending entries of a table that is being dropped inside the
    /// transaction.
    pub fn purge_table(&mut self, table: TableId) {
        self.entries.retain(|entry| entry.table != table);
    }
}
