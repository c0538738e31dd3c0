use std::cell::RefCell;
use std::rc::Rc;

use resource_arbiter::db::cond::Cond;
use resource_arbiter::db::table::ColumnDef;
use resource_arbiter::db::trigger::TableObserver;
use resource_arbiter::db::value::{DataType, Value};
use resource_arbiter::db::Database;
use resource_arbiter::domain::application_class::ClassOrder;
use resource_arbiter::domain::manager::ResourceManager;
use resource_arbiter::error::{Error, ErrorCode};

/// Observer that records which owner rows appear and disappear; the way
/// external readers watch committed arbitration outcomes.
#[derive(Default)]
struct OwnerWatcher {
    log: RefCell<Vec<String>>,
}

impl TableObserver for OwnerWatcher {
    fn on_row_insert(&self, table: &str, row: &[Value]) {
        self.log.borrow_mut().push(format!("+{} set {}", table, row[3]));
    }

    fn on_row_delete(&self, table: &str, row: &[Value]) {
        self.log.borrow_mut().push(format!("-{} set {}", table, row[3]));
    }
}

#[test]
fn owner_table_triggers_observe_committed_outcomes_only() {
    let mut manager = ResourceManager::new();
    manager.define_zone_attributes(Vec::new()).unwrap();
    manager.create_zone("driver", &[]).unwrap();
    manager.create_application_class("player", 3, false, false, ClassOrder::Fifo).unwrap();
    manager.register_resource("audio", false, Vec::new(), None).unwrap();

    let watcher = Rc::new(OwnerWatcher::default());
    let audio_owner = manager.database().find_table("audio_owner").unwrap();
    manager.database_mut().add_row_trigger(audio_owner, watcher.clone()).unwrap();

    let client = manager.create_client("app").unwrap();
    let rset = manager.create_resource_set(client, false, false, 3, None).unwrap();
    manager.add_resource(rset, "audio", false, &[], true).unwrap();
    manager.add_resource_set_to_class(rset, "player", "driver", 0).unwrap();

    manager.acquire(rset, 1).unwrap();
    assert_eq!(watcher.log.borrow().as_slice(), [format!("+audio_owner set {}", rset)]);

    manager.release(rset, 2).unwrap();
    assert_eq!(
        watcher.log.borrow().as_slice(),
        [format!("+audio_owner set {}", rset), format!("-audio_owner set {}", rset)]
    );
}

#[test]
fn select_supports_projection_and_conditions() {
    let mut db = Database::new();
    let table = db
        .create_table(
            "application_classes",
            vec![
                ColumnDef::new("name", DataType::varchar(24)),
                ColumnDef::new("priority", DataType::Unsigned),
            ],
            &["priority"],
            true,
        )
        .unwrap();

    db.insert_rows(
        table,
        vec![
            vec![Value::String("player".to_string()), Value::Unsigned(1)],
            vec![Value::String("phone".to_string()), Value::Unsigned(5)],
            vec![Value::String("alert".to_string()), Value::Unsigned(7)],
        ],
    )
    .unwrap();

    // index order: ascending priority
    let names = db.select_rows(table, None, Some(&[0])).unwrap();
    assert_eq!(
        names,
        vec![
            vec![Value::String("player".to_string())],
            vec![Value::String("phone".to_string())],
            vec![Value::String("alert".to_string())],
        ]
    );

    let urgent = db
        .select_rows(table, Some(&Cond::gt(1, Value::Unsigned(4))), Some(&[0]))
        .unwrap();
    assert_eq!(urgent.len(), 2);
}

#[test]
fn non_adjacent_index_columns_are_rejected() {
    let mut db = Database::new();
    let result = db.create_table(
        "t",
        vec![
            ColumnDef::new("a", DataType::Unsigned),
            ColumnDef::new("b", DataType::Unsigned),
            ColumnDef::new("c", DataType::Unsigned),
        ],
        &["a", "c"],
        true,
    );
    assert!(matches!(result, Err(Error::InvalidArg(_))));
}

#[test]
fn error_codes_map_to_the_fixed_set() {
    let mut db = Database::new();
    let table = db
        .create_table("zones", vec![ColumnDef::new("zone_id", DataType::Unsigned)], &["zone_id"], true)
        .unwrap();

    let dup = db.create_table("zones", vec![ColumnDef::new("zone_id", DataType::Unsigned)], &[], true);
    assert_eq!(dup.unwrap_err().code(), ErrorCode::Exists);

    let bad_type = db.insert_rows(table, vec![vec![Value::String("x".to_string())]]);
    assert_eq!(bad_type.unwrap_err().code(), ErrorCode::InvalidArg);

    let bad_handle = db.commit_transaction(3);
    assert_eq!(bad_handle.unwrap_err().code(), ErrorCode::WrongState);
}
