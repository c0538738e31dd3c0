use crate::db::value::Value;

/// Observer interface for the four trigger kinds of the table store:
/// row insert/delete, column change, table create/drop and transaction
/// start/end. Every method has an empty default so an observer only
/// implements the events it watches.
///
/// Observers are registered as `Rc<dyn TableObserver>`; registering the
/// same `Rc` twice on the same hook is a no-op. Methods take `&self`, so an
/// observer that accumulates state does so behind its own interior
/// mutability, the same way the engine's bus listeners do.
pub trait TableObserver {
    fn on_row_insert(&self, _table: &str, _row: &[Value]) {}

    fn on_row_delete(&self, _table: &str, _row: &[Value]) {}

    /// Fired once per changed, watched column. `before` is `None` when the
    /// change comes from a row insert.
    fn on_column_change(&self, _table: &str, _column: &str, _before: Option<&Value>, _after: &Value) {
    }

    fn on_table_create(&self, _table: &str) {}

    fn on_table_drop(&self, _table: &str) {}

    fn on_transaction_start(&self) {}

    fn on_transaction_end(&self) {}
}
