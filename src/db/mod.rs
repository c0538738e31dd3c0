//! In-memory table store: named typed tables with one composite index,
//! a narrow DML subset, row/column/table/transaction triggers, and
//! nestable transactions backed by a reverse-executable change log.

pub mod cond;
pub mod index;
pub mod log;
pub mod table;
pub mod trigger;
pub mod value;

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};

use crate::db::cond::Cond;
use crate::db::log::{Change, ChangeLog, LogEntry};
use crate::db::table::{ColumnDef, Table};
use crate::db::trigger::TableObserver;
use crate::db::value::Value;
use crate::error::{Error, Result};

new_key_type! {
    pub struct TableId;
}

/// The table store. All tables of the engine live here; the arbitration
/// engine writes through it so transaction rollback restores the exact
/// prior ownership snapshot.
pub struct Database {
    tables: SlotMap<TableId, Table>,
    names: HashMap<String, TableId>,
    depth: u32,
    log: ChangeLog,
    table_observers: Vec<Rc<dyn TableObserver>>,
    tx_observers: Vec<Rc<dyn TableObserver>>,
    quiesced: bool,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            tables: SlotMap::with_key(),
            names: HashMap::new(),
            depth: 0,
            log: ChangeLog::new(),
            table_observers: Vec::new(),
            tx_observers: Vec::new(),
            quiesced: false,
        }
    }

    //--------------------
    // --- Schema ---
    //--------------------

    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<ColumnDef>,
        index_columns: &[&str],
        temporary: bool,
    ) -> Result<TableId> {
        self.check_writable()?;

        if self.names.contains_key(name) {
            return Err(Error::Exists(format!("table '{}'", name)));
        }

        let table = Table::new(name, columns, index_columns, temporary)?;
        let id = self.tables.insert(table);
        self.names.insert(name.to_string(), id);

        for obs in self.table_observers.clone() {
            obs.on_table_create(name);
        }

        Ok(id)
    }

    /// Drops a table. Inside a transaction, pending change-log entries of
    /// the table are cancelled; the drop itself is not undone by rollback.
    pub fn drop_table(&mut self, id: TableId) -> Result<()> {
        self.check_writable()?;

        let name = match self.tables.get(id) {
            Some(table) => table.name().to_string(),
            None => return Err(Error::NotFound("table".to_string())),
        };

        self.log.purge_table(id);
        self.names.remove(&name);
        self.tables.remove(id);

        for obs in self.table_observers.clone() {
            obs.on_table_drop(&name);
        }

        Ok(())
    }

    pub fn find_table(&self, name: &str) -> Option<TableId> {
        self.names.get(name).copied()
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id)
    }

    pub fn describe(&self, id: TableId) -> Result<Vec<ColumnDef>> {
        Ok(self.table_ref(id)?.columns().to_vec())
    }

    pub fn table_stamp(&self, id: TableId) -> Result<u32> {
        Ok(self.table_ref(id)?.stamp())
    }

    pub fn row_count(&self, id: TableId) -> Result<usize> {
        Ok(self.table_ref(id)?.row_count())
    }

    //--------------------
    // --- DML ---
    //--------------------

    /// Inserts rows. The whole statement fails without effect if any row
    /// mismatches the schema or collides on the index.
    pub fn insert_rows(&mut self, id: TableId, rows: Vec<Vec<Value>>) -> Result<usize> {
        self.check_writable()?;

        let depth = self.depth;
        let table = self
            .tables
            .get_mut(id)
            .ok_or_else(|| Error::NotFound("table".to_string()))?;

        let mut coerced = Vec::with_capacity(rows.len());
        for row in rows {
            coerced.push(table.coerce_row(row)?);
        }

        if let Some(index) = &table.index {
            let mut batch_keys = BTreeSet::new();
            for row in &coerced {
                let key = index.key_of(row);
                if index.contains(&key) || !batch_keys.insert(key) {
                    return Err(Error::Exists(format!(
                        "index key in table '{}'",
                        table.name
                    )));
                }
            }
        }

        if coerced.is_empty() {
            return Ok(0);
        }

        Self::advance_stamp(&mut self.log, depth, id, table);

        let mut fired = Vec::new();
        let ninsert = coerced.len();

        for row in coerced {
            let row_id = table.next_row_id;
            table.next_row_id += 1;

            if let Some(index) = &mut table.index {
                let key = index.key_of(&row);
                index.insert(key, row_id);
            }
            table.rows.insert(row_id, row.clone());

            if depth == 0 {
                fired.push(row);
            } else {
                self.log.push(depth, id, Change::Inserted { row_id, after: row });
            }
        }

        if depth == 0 {
            let row_observers = table.row_observers.clone();
            let column_observers = table.column_observers.clone();
            let name = table.name.clone();
            let columns = table.columns.clone();

            for row in &fired {
                for obs in &row_observers {
                    obs.on_row_insert(&name, row);
                }
                for (cidx, obs) in &column_observers {
                    obs.on_column_change(&name, &columns[*cidx].name, None, &row[*cidx]);
                }
            }
        }

        Ok(ninsert)
    }

    /// Updates every row matching `cond` (all rows when `None`) with the
    /// given `(column, value)` assignments. Returns the number of rows
    /// actually changed.
    pub fn update_rows(
        &mut self,
        id: TableId,
        cond: Option<&Cond>,
        assignments: &[(usize, Value)],
    ) -> Result<usize> {
        self.check_writable()?;

        let depth = self.depth;
        let table = self
            .tables
            .get_mut(id)
            .ok_or_else(|| Error::NotFound("table".to_string()))?;

        let mut coerced = Vec::with_capacity(assignments.len());
        for (cidx, value) in assignments {
            let def = table.columns.get(*cidx).ok_or_else(|| {
                Error::InvalidArg(format!("column {} of table '{}'", cidx, table.name))
            })?;
            if !value.matches_type(&def.data_type) {
                return Err(Error::InvalidArg(format!(
                    "value {} does not match type of column '{}.{}'",
                    value, table.name, def.name
                )));
            }
            let mut value = value.clone();
            if let (Value::String(s), value::DataType::String { max_len }) =
                (&mut value, &def.data_type)
            {
                if s.len() > *max_len {
                    s.truncate(*max_len);
                }
            }
            coerced.push((*cidx, value));
        }

        // plan: (row_id, before, after, colmask)
        let mut planned: Vec<(u64, Vec<Value>, Vec<Value>, u32)> = Vec::new();
        for row_id in table.scan_order() {
            let row = &table.rows[&row_id];
            if let Some(c) = cond {
                if !c.matches(row) {
                    continue;
                }
            }
            let mut after = row.clone();
            let mut colmask = 0u32;
            for (cidx, value) in &coerced {
                if after[*cidx] != *value {
                    after[*cidx] = value.clone();
                    colmask |= 1 << cidx;
                }
            }
            if colmask != 0 {
                planned.push((row_id, row.clone(), after, colmask));
            }
        }

        if planned.is_empty() {
            return Ok(0);
        }

        if let Some(index) = &table.index {
            let touches_index = planned
                .iter()
                .any(|(_, _, _, mask)| index.columns().iter().any(|c| mask & (1 << c) != 0));
            if touches_index {
                let mut final_keys = BTreeSet::new();
                for (row_id, row) in &table.rows {
                    let effective = planned
                        .iter()
                        .find(|(id, ..)| id == row_id)
                        .map(|(_, _, after, _)| after)
                        .unwrap_or(row);
                    if !final_keys.insert(index.key_of(effective)) {
                        return Err(Error::Exists(format!(
                            "index key in table '{}'",
                            table.name
                        )));
                    }
                }
            }
        }

        Self::advance_stamp(&mut self.log, depth, id, table);

        let nupdate = planned.len();
        for (row_id, before, after, colmask) in planned {
            let old_key = table.index.as_ref().map(|ix| ix.key_of(&before));
            let new_key = table.index.as_ref().map(|ix| ix.key_of(&after));
            if let (Some(index), Some(old_key), Some(new_key)) =
                (&mut table.index, old_key, new_key)
            {
                if old_key != new_key {
                    index.remove(&old_key);
                    index.insert(new_key, row_id);
                }
            }
            table.rows.insert(row_id, after.clone());

            if depth == 0 {
                let column_observers = table.column_observers.clone();
                let name = table.name.clone();
                let columns = table.columns.clone();
                for (cidx, obs) in &column_observers {
                    if colmask & (1 << cidx) != 0 {
                        obs.on_column_change(
                            &name,
                            &columns[*cidx].name,
                            Some(&before[*cidx]),
                            &after[*cidx],
                        );
                    }
                }
            } else {
                self.log
                    .push(depth, id, Change::Updated { row_id, colmask, before, after });
            }
        }

        Ok(nupdate)
    }

    /// Deletes every row matching `cond` (all rows when `None`).
    pub fn delete_rows(&mut self, id: TableId, cond: Option<&Cond>) -> Result<usize> {
        self.check_writable()?;

        let depth = self.depth;
        let table = self
            .tables
            .get_mut(id)
            .ok_or_else(|| Error::NotFound("table".to_string()))?;

        let mut doomed = Vec::new();
        for row_id in table.scan_order() {
            let row = &table.rows[&row_id];
            if cond.map(|c| c.matches(row)).unwrap_or(true) {
                doomed.push(row_id);
            }
        }

        if doomed.is_empty() {
            return Ok(0);
        }

        Self::advance_stamp(&mut self.log, depth, id, table);

        let ndelete = doomed.len();
        let mut fired = Vec::new();

        for row_id in doomed {
            let before = table.rows.remove(&row_id).expect("planned row vanished");
            let key = table.index.as_ref().map(|ix| ix.key_of(&before));
            if let (Some(index), Some(key)) = (&mut table.index, key) {
                index.remove(&key);
            }

            if depth == 0 {
                fired.push(before);
            } else {
                self.log.push(depth, id, Change::Deleted { row_id, before });
            }
        }

        if depth == 0 {
            let row_observers = table.row_observers.clone();
            let name = table.name.clone();
            for row in &fired {
                for obs in &row_observers {
                    obs.on_row_delete(&name, row);
                }
            }
        }

        Ok(ndelete)
    }

    /// Selects rows matching `cond`, optionally projected to the given
    /// columns, in index order (insertion order for unindexed tables).
    pub fn select_rows(
        &self,
        id: TableId,
        cond: Option<&Cond>,
        projection: Option<&[usize]>,
    ) -> Result<Vec<Vec<Value>>> {
        let table = self.table_ref(id)?;

        if let Some(cols) = projection {
            for cidx in cols {
                if *cidx >= table.columns.len() {
                    return Err(Error::InvalidArg(format!(
                        "column {} of table '{}'",
                        cidx, table.name
                    )));
                }
            }
        }

        let mut out = Vec::new();
        for row_id in table.scan_order() {
            let row = &table.rows[&row_id];
            if cond.map(|c| c.matches(row)).unwrap_or(true) {
                match projection {
                    Some(cols) => out.push(cols.iter().map(|&c| row[c].clone()).collect()),
                    None => out.push(row.clone()),
                }
            }
        }

        Ok(out)
    }

    /// Point lookup through the table index.
    pub fn select_by_index(&self, id: TableId, key: &[Value]) -> Result<Option<Vec<Value>>> {
        let table = self.table_ref(id)?;
        let index = table
            .index
            .as_ref()
            .ok_or_else(|| Error::InvalidArg(format!("table '{}' has no index", table.name)))?;

        Ok(index.lookup(key).map(|row_id| table.rows[&row_id].clone()))
    }

    //--------------------
    // --- Transactions ---
    //--------------------

    /// Opens a (possibly nested) transaction and returns its nonzero
    /// handle. Commit and rollback must present the matching handle in
    /// LIFO order.
    pub fn begin_transaction(&mut self) -> u32 {
        self.depth += 1;
        self.depth
    }

    pub fn transaction_depth(&self) -> u32 {
        self.depth
    }

    /// Commits the transaction with the given handle. Only the outermost
    /// commit discards the change log and fires transaction/row/column
    /// triggers; a nested commit folds into its parent.
    pub fn commit_transaction(&mut self, handle: u32) -> Result<()> {
        self.check_writable()?;
        self.check_handle(handle)?;

        if self.depth > 1 {
            self.depth -= 1;
            return Ok(());
        }

        self.depth = 0;
        let entries = self.log.drain_all();
        for (_, table) in self.tables.iter_mut() {
            table.stamped_in_tx = false;
        }

        if entries.is_empty() {
            return Ok(());
        }

        for obs in self.tx_observers.clone() {
            obs.on_transaction_start();
        }

        for entry in &entries {
            self.fire_entry(entry);
        }

        for obs in self.tx_observers.clone() {
            obs.on_transaction_end();
        }

        Ok(())
    }

    /// Rolls back the transaction with the given handle, replaying its
    /// part of the change log in reverse. A nested rollback undoes only
    /// the entries recorded at its depth or deeper.
    pub fn rollback_transaction(&mut self, handle: u32) -> Result<()> {
        self.check_writable()?;
        self.check_handle(handle)?;

        let entries = self.log.drain_from_depth(handle);
        self.depth -= 1;

        for entry in entries {
            if self.undo_entry(&entry).is_err() {
                self.quiesced = true;
                ::log::error!("change-log rollback failed; table store is now read-only");
                return Err(Error::WrongState("table store quiesced".to_string()));
            }
        }

        if self.depth == 0 {
            for (_, table) in self.tables.iter_mut() {
                table.stamped_in_tx = false;
            }
        }

        Ok(())
    }

    //--------------------
    // --- Triggers ---
    //--------------------

    pub fn add_row_trigger(&mut self, id: TableId, obs: Rc<dyn TableObserver>) -> Result<()> {
        let table = self
            .tables
            .get_mut(id)
            .ok_or_else(|| Error::NotFound("table".to_string()))?;
        if !table.row_observers.iter().any(|o| Rc::ptr_eq(o, &obs)) {
            table.row_observers.push(obs);
        }
        Ok(())
    }

    pub fn remove_row_trigger(&mut self, id: TableId, obs: &Rc<dyn TableObserver>) -> Result<()> {
        let table = self
            .tables
            .get_mut(id)
            .ok_or_else(|| Error::NotFound("table".to_string()))?;
        table.row_observers.retain(|o| !Rc::ptr_eq(o, obs));
        Ok(())
    }

    pub fn add_column_trigger(
        &mut self,
        id: TableId,
        column: &str,
        obs: Rc<dyn TableObserver>,
    ) -> Result<()> {
        let table = self
            .tables
            .get_mut(id)
            .ok_or_else(|| Error::NotFound("table".to_string()))?;
        let cidx = table
            .column_index(column)
            .ok_or_else(|| Error::NotFound(format!("column '{}'", column)))?;
        if !table
            .column_observers
            .iter()
            .any(|(c, o)| *c == cidx && Rc::ptr_eq(o, &obs))
        {
            table.column_observers.push((cidx, obs));
        }
        Ok(())
    }

    pub fn add_table_trigger(&mut self, obs: Rc<dyn TableObserver>) {
        if !self.table_observers.iter().any(|o| Rc::ptr_eq(o, &obs)) {
            self.table_observers.push(obs);
        }
    }

    pub fn add_transaction_trigger(&mut self, obs: Rc<dyn TableObserver>) {
        if !self.tx_observers.iter().any(|o| Rc::ptr_eq(o, &obs)) {
            self.tx_observers.push(obs);
        }
    }

    //--------------------
    // --- Internals ---
    //--------------------

    fn table_ref(&self, id: TableId) -> Result<&Table> {
        self.tables
            .get(id)
            .ok_or_else(|| Error::NotFound("table".to_string()))
    }

    fn check_writable(&self) -> Result<()> {
        if self.quiesced {
            return Err(Error::WrongState("table store quiesced".to_string()));
        }
        Ok(())
    }

    fn check_handle(&self, handle: u32) -> Result<()> {
        if handle == 0 || handle != self.depth {
            return Err(Error::WrongState(format!(
                "transaction handle {} does not match depth {}",
                handle, self.depth
            )));
        }
        Ok(())
    }

    fn advance_stamp(log: &mut ChangeLog, depth: u32, id: TableId, table: &mut Table) {
        if depth == 0 {
            table.stamp += 1;
        } else if !table.stamped_in_tx {
            table.stamped_in_tx = true;
            log.push(depth, id, Change::StampAdvance { prior: table.stamp });
            table.stamp += 1;
        }
    }

    fn fire_entry(&self, entry: &LogEntry) {
        let Some(table) = self.tables.get(entry.table) else {
            return;
        };
        let name = table.name();

        match &entry.change {
            Change::Inserted { after, .. } => {
                for obs in &table.row_observers {
                    obs.on_row_insert(name, after);
                }
                for (cidx, obs) in &table.column_observers {
                    obs.on_column_change(name, &table.columns[*cidx].name, None, &after[*cidx]);
                }
            }
            Change::Updated { colmask, before, after, .. } => {
                for (cidx, obs) in &table.column_observers {
                    if colmask & (1 << cidx) != 0 {
                        obs.on_column_change(
                            name,
                            &table.columns[*cidx].name,
                            Some(&before[*cidx]),
                            &after[*cidx],
                        );
                    }
                }
            }
            Change::Deleted { before, .. } => {
                for obs in &table.row_observers {
                    obs.on_row_delete(name, before);
                }
            }
            Change::StampAdvance { .. } => {}
        }
    }

    fn undo_entry(&mut self, entry: &LogEntry) -> Result<()> {
        let table = self
            .tables
            .get_mut(entry.table)
            .ok_or_else(|| Error::NotFound("table".to_string()))?;

        match &entry.change {
            Change::Inserted { row_id, after } => {
                if table.rows.remove(row_id).is_none() {
                    return Err(Error::WrongState("logged row missing".to_string()));
                }
                let key = table.index.as_ref().map(|ix| ix.key_of(after));
                if let (Some(index), Some(key)) = (&mut table.index, key) {
                    index.remove(&key);
                }
            }
            Change::Deleted { row_id, before } => {
                let key = table.index.as_ref().map(|ix| ix.key_of(before));
                table.rows.insert(*row_id, before.clone());
                if let (Some(index), Some(key)) = (&mut table.index, key) {
                    index.insert(key, *row_id);
                }
            }
            Change::Updated { row_id, before, after, .. } => {
                if !table.rows.contains_key(row_id) {
                    return Err(Error::WrongState("logged row missing".to_string()));
                }
                let old_key = table.index.as_ref().map(|ix| ix.key_of(after));
                let new_key = table.index.as_ref().map(|ix| ix.key_of(before));
                table.rows.insert(*row_id, before.clone());
                if let (Some(index), Some(old_key), Some(new_key)) =
                    (&mut table.index, old_key, new_key)
                {
                    if old_key != new_key {
                        index.remove(&old_key);
                        index.insert(new_key, *row_id);
                    }
                }
            }
            Change::StampAdvance { prior } => {
                table.stamp = *prior;
                table.stamped_in_tx = false;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::DataType;
    use std::cell::RefCell;

    fn store_with_table() -> (Database, TableId) {
        let mut db = Database::new();
        let id = db
            .create_table(
                "audio_owner",
                vec![
                    ColumnDef::new("zone_id", DataType::Unsigned),
                    ColumnDef::new("zone_name", DataType::varchar(24)),
                ],
                &["zone_id"],
                true,
            )
            .unwrap();
        (db, id)
    }

    fn row(zone: u32, name: &str) -> Vec<Value> {
        vec![Value::Unsigned(zone), Value::String(name.to_string())]
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl TableObserver for Recorder {
        fn on_row_insert(&self, table: &str, row: &[Value]) {
            self.events.borrow_mut().push(format!("insert {} {}", table, row[0]));
        }
        fn on_row_delete(&self, table: &str, row: &[Value]) {
            self.events.borrow_mut().push(format!("delete {} {}", table, row[0]));
        }
        fn on_column_change(&self, _t: &str, column: &str, _b: Option<&Value>, after: &Value) {
            self.events.borrow_mut().push(format!("column {} {}", column, after));
        }
        fn on_transaction_start(&self) {
            self.events.borrow_mut().push("tx-start".to_string());
        }
        fn on_transaction_end(&self) {
            self.events.borrow_mut().push("tx-end".to_string());
        }
    }

    #[test]
    fn insert_select_update_delete_roundtrip() {
        let (mut db, id) = store_with_table();

        assert_eq!(db.insert_rows(id, vec![row(0, "driver"), row(1, "passenger")]).unwrap(), 2);
        assert_eq!(db.row_count(id).unwrap(), 2);

        let got = db
            .select_rows(id, Some(&Cond::eq(0, Value::Unsigned(1))), None)
            .unwrap();
        assert_eq!(got, vec![row(1, "passenger")]);

        assert_eq!(
            db.update_rows(
                id,
                Some(&Cond::eq(0, Value::Unsigned(1))),
                &[(1, Value::String("rear".to_string()))],
            )
            .unwrap(),
            1
        );
        assert_eq!(
            db.select_by_index(id, &[Value::Unsigned(1)]).unwrap(),
            Some(row(1, "rear"))
        );

        assert_eq!(db.delete_rows(id, Some(&Cond::eq(0, Value::Unsigned(0)))).unwrap(), 1);
        assert_eq!(db.row_count(id).unwrap(), 1);
    }

    #[test]
    fn duplicate_index_key_fails_the_statement() {
        let (mut db, id) = store_with_table();
        db.insert_rows(id, vec![row(0, "driver")]).unwrap();

        assert!(matches!(
            db.insert_rows(id, vec![row(0, "again")]),
            Err(Error::Exists(_))
        ));
        assert_eq!(db.row_count(id).unwrap(), 1);
    }

    #[test]
    fn rollback_restores_rows_index_and_stamp() {
        let (mut db, id) = store_with_table();
        db.insert_rows(id, vec![row(0, "driver")]).unwrap();
        let stamp = db.table_stamp(id).unwrap();

        let tx = db.begin_transaction();
        db.insert_rows(id, vec![row(1, "passenger")]).unwrap();
        db.update_rows(id, Some(&Cond::eq(0, Value::Unsigned(0))), &[(1, Value::String("x".to_string()))])
            .unwrap();
        db.delete_rows(id, Some(&Cond::eq(0, Value::Unsigned(0)))).unwrap();
        db.rollback_transaction(tx).unwrap();

        assert_eq!(db.select_rows(id, None, None).unwrap(), vec![row(0, "driver")]);
        assert_eq!(db.select_by_index(id, &[Value::Unsigned(0)]).unwrap(), Some(row(0, "driver")));
        assert_eq!(db.select_by_index(id, &[Value::Unsigned(1)]).unwrap(), None);
        assert_eq!(db.table_stamp(id).unwrap(), stamp);
    }

    #[test]
    fn nested_rollback_undoes_only_its_suffix() {
        let (mut db, id) = store_with_table();

        let outer = db.begin_transaction();
        db.insert_rows(id, vec![row(0, "driver")]).unwrap();

        let inner = db.begin_transaction();
        db.insert_rows(id, vec![row(1, "passenger")]).unwrap();
        db.rollback_transaction(inner).unwrap();

        db.commit_transaction(outer).unwrap();
        assert_eq!(db.select_rows(id, None, None).unwrap(), vec![row(0, "driver")]);
    }

    #[test]
    fn commit_and_rollback_require_matching_depth() {
        let (mut db, _) = store_with_table();

        assert!(db.commit_transaction(1).is_err());

        let outer = db.begin_transaction();
        let inner = db.begin_transaction();
        assert!(db.commit_transaction(outer).is_err());
        db.commit_transaction(inner).unwrap();
        db.commit_transaction(outer).unwrap();
    }

    #[test]
    fn triggers_fire_at_outermost_commit_only() {
        let (mut db, id) = store_with_table();
        let recorder = Rc::new(Recorder::default());
        db.add_row_trigger(id, recorder.clone()).unwrap();
        db.add_column_trigger(id, "zone_name", recorder.clone()).unwrap();
        db.add_transaction_trigger(recorder.clone());

        let outer = db.begin_transaction();
        db.insert_rows(id, vec![row(0, "driver")]).unwrap();
        assert!(recorder.events.borrow().is_empty());

        let inner = db.begin_transaction();
        db.delete_rows(id, None).unwrap();
        db.commit_transaction(inner).unwrap();
        assert!(recorder.events.borrow().is_empty());

        db.commit_transaction(outer).unwrap();
        let events = recorder.events.borrow().clone();
        assert_eq!(
            events,
            vec![
                "tx-start".to_string(),
                "insert audio_owner 0".to_string(),
                "column zone_name 'driver'".to_string(),
                "delete audio_owner 0".to_string(),
                "tx-end".to_string(),
            ]
        );
    }

    #[test]
    fn triggers_fire_immediately_outside_transactions() {
        let (mut db, id) = store_with_table();
        let recorder = Rc::new(Recorder::default());
        db.add_row_trigger(id, recorder.clone()).unwrap();

        db.insert_rows(id, vec![row(2, "rear")]).unwrap();
        assert_eq!(recorder.events.borrow().as_slice(), ["insert audio_owner 2"]);
    }

    #[test]
    fn duplicate_trigger_registration_is_a_noop() {
        let (mut db, id) = store_with_table();
        let recorder = Rc::new(Recorder::default());
        db.add_row_trigger(id, recorder.clone()).unwrap();
        db.add_row_trigger(id, recorder.clone()).unwrap();

        db.insert_rows(id, vec![row(0, "driver")]).unwrap();
        assert_eq!(recorder.events.borrow().len(), 1);
    }

    #[test]
    fn drop_inside_transaction_cancels_log_entries() {
        let (mut db, id) = store_with_table();

        let tx = db.begin_transaction();
        db.insert_rows(id, vec![row(0, "driver")]).unwrap();
        db.drop_table(id).unwrap();
        db.rollback_transaction(tx).unwrap();

        assert!(db.find_table("audio_owner").is_none());
    }

    #[test]
    fn stamp_advances_once_per_outermost_transaction() {
        let (mut db, id) = store_with_table();
        let base = db.table_stamp(id).unwrap();

        let tx = db.begin_transaction();
        db.insert_rows(id, vec![row(0, "a")]).unwrap();
        let inner = db.begin_transaction();
        db.insert_rows(id, vec![row(1, "b")]).unwrap();
        db.commit_transaction(inner).unwrap();
        db.commit_transaction(tx).unwrap();

        assert_eq!(db.table_stamp(id).unwrap(), base + 1);

        db.insert_rows(id, vec![row(2, "c")]).unwrap();
        db.insert_rows(id, vec![row(3, "d")]).unwrap();
        assert_eq!(db.table_stamp(id).unwrap(), base + 3);
    }
}
