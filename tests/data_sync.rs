//! End-to-end data replication scenarios over the in-memory adapters.

use chrono::Utc;

use db_sync::adapter::{SqlRow, SqlValue};
use db_sync::config::PairSpec;
use db_sync::data::DataDiffer;
use db_sync::testing::{memory_pair, order_row, orders_table, products_table, user_row, users_table};

fn pair() -> PairSpec {
    PairSpec::new("test", "src", "dst")
}

#[tokio::test]
async fn initial_sync_loads_empty_target() {
    let (source, target) = memory_pair().await;
    let (table, rows) = users_table(&[(1, "a"), (2, "b")]);
    source.install_table(table.clone(), rows);
    target.install_table(table, vec![]);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let report = differ.initial_sync(&pair()).await;

    assert!(report.success());
    assert_eq!(report.inserted, 2);
    assert_eq!(target.rows("users").len(), 2);
    assert!(differ.state("users").is_some());
}

#[tokio::test]
async fn tick_detects_insert() {
    let (source, target) = memory_pair().await;
    let (table, rows) = users_table(&[(1, "a"), (2, "b")]);
    source.install_table(table.clone(), rows);
    target.install_table(table, vec![]);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    assert!(differ.initial_sync(&pair()).await.success());

    // Source gains a row.
    let mut rows = source.rows("users");
    rows.push(user_row(3, "c"));
    source.set_rows("users", rows);

    let report = differ.tick(&pair()).await;
    assert!(report.success());
    assert_eq!(report.inserted, 1);
    assert_eq!(report.deleted, 0);

    let target_rows = target.rows("users");
    assert_eq!(target_rows.len(), 3);
    assert!(target_rows
        .iter()
        .any(|r| r.get("id") == Some(&SqlValue::Int(3))));
}

#[tokio::test]
async fn tick_detects_delete() {
    let (source, target) = memory_pair().await;
    let (table, rows) = users_table(&[(1, "a"), (2, "b"), (3, "c")]);
    source.install_table(table.clone(), rows);
    target.install_table(table, vec![]);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    assert!(differ.initial_sync(&pair()).await.success());

    // Source loses key 2.
    let rows: Vec<SqlRow> = source
        .rows("users")
        .into_iter()
        .filter(|r| r.get("id") != Some(&SqlValue::Int(2)))
        .collect();
    source.set_rows("users", rows);

    let report = differ.tick(&pair()).await;
    assert!(report.success());
    assert_eq!(report.deleted, 1);

    let target_rows = target.rows("users");
    assert_eq!(target_rows.len(), 2);
    assert!(!target_rows
        .iter()
        .any(|r| r.get("id") == Some(&SqlValue::Int(2))));
}

#[tokio::test]
async fn tick_detects_witnessed_update() {
    let (source, target) = memory_pair().await;
    let stale = Utc::now();
    let (table, rows) = orders_table(&[(7, 10.0, stale), (8, 20.0, stale)]);
    source.install_table(table.clone(), rows);
    target.install_table(table, vec![]);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    assert!(differ.initial_sync(&pair()).await.success());

    // Row 7 updates total and advances its witness past the seeded window.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let rows: Vec<SqlRow> = source
        .rows("orders")
        .into_iter()
        .map(|r| {
            if r.get("id") == Some(&SqlValue::Int(7)) {
                order_row(7, 99.0, Utc::now())
            } else {
                r
            }
        })
        .collect();
    source.set_rows("orders", rows);

    let report = differ.tick(&pair()).await;
    assert!(report.success());
    assert_eq!(report.updated, 1);

    let updated = target
        .rows("orders")
        .into_iter()
        .find(|r| r.get("id") == Some(&SqlValue::Int(7)))
        .expect("row 7 present");
    assert_eq!(updated.get("total"), Some(&SqlValue::Float(99.0)));
}

#[tokio::test]
async fn keyless_table_truncates_and_reloads() {
    let (source, target) = memory_pair().await;
    let (table, source_rows) = products_table(&[("a", "A"), ("b", "B"), ("c", "C")]);
    let (_, target_rows) = products_table(&[("a", "A"), ("z", "Z")]);
    source.install_table(table.clone(), source_rows);
    target.install_table(table, target_rows);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let report = differ.tick(&pair()).await;

    assert!(report.success());
    assert_eq!(report.inserted, 3);
    assert_eq!(target.rows("products").len(), 3);

    let ops = target.op_log();
    let truncate = ops.iter().position(|op| op.starts_with("truncate:products"));
    let insert = ops.iter().position(|op| op.starts_with("insert:products"));
    assert!(truncate.is_some() && insert.is_some());
    assert!(truncate < insert);
}

#[tokio::test]
async fn second_tick_is_idempotent() {
    let (source, target) = memory_pair().await;
    let now = Utc::now();
    let (users, user_rows) = users_table(&[(1, "a"), (2, "b")]);
    let (orders, order_rows) = orders_table(&[(7, 10.0, now)]);
    source.install_table(users.clone(), user_rows);
    source.install_table(orders.clone(), order_rows);
    target.install_table(users, vec![]);
    target.install_table(orders, vec![]);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    assert!(differ.initial_sync(&pair()).await.success());

    let first = differ.tick(&pair()).await;
    assert!(first.success());

    let second = differ.tick(&pair()).await;
    assert!(second.success());
    assert!(
        !second.mutated(),
        "tick with no source changes performed mutations: {second:?}"
    );
}

#[tokio::test]
async fn inserts_precede_deletes_within_a_tick() {
    let (source, target) = memory_pair().await;
    let (table, source_rows) = users_table(&[(1, "a"), (3, "c")]);
    let (_, target_rows) = users_table(&[(2, "b")]);
    source.install_table(table.clone(), source_rows);
    target.install_table(table, target_rows);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let report = differ.tick(&pair()).await;
    assert!(report.success());
    assert_eq!(report.inserted, 2);
    assert_eq!(report.deleted, 1);

    let ops = target.op_log();
    let insert = ops.iter().position(|op| op.starts_with("insert:users"));
    let delete = ops.iter().position(|op| op.starts_with("delete:users"));
    assert!(insert.is_some() && delete.is_some());
    assert!(insert < delete, "inserts must complete before deletes: {ops:?}");
}

#[tokio::test]
async fn large_delete_sets_are_batched() {
    let (source, target) = memory_pair().await;
    let (table, _) = users_table(&[]);
    let target_rows: Vec<SqlRow> = (0..250).map(|i| user_row(i, "r")).collect();
    source.install_table(table.clone(), vec![]);
    target.install_table(table, target_rows);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let report = differ.tick(&pair()).await;

    assert!(report.success());
    assert_eq!(report.deleted, 250);
    assert!(target.rows("users").is_empty());

    let ops = target.op_log();
    let deletes: Vec<&String> = ops
        .iter()
        .filter(|op| op.starts_with("delete:users"))
        .collect();
    assert_eq!(
        deletes,
        vec!["delete:users:100", "delete:users:100", "delete:users:50"]
    );
}

#[tokio::test]
async fn empty_tables_are_a_noop() {
    let (source, target) = memory_pair().await;
    let (table, _) = users_table(&[]);
    source.install_table(table.clone(), vec![]);
    target.install_table(table, vec![]);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let initial = differ.initial_sync(&pair()).await;
    assert!(initial.success());
    assert!(!initial.mutated());

    let tick = differ.tick(&pair()).await;
    assert!(tick.success());
    assert!(!tick.mutated());
}

#[tokio::test]
async fn missing_target_table_is_an_error_not_an_abort() {
    let (source, target) = memory_pair().await;
    let (users, user_rows) = users_table(&[(1, "a")]);
    let (orders, order_rows) = orders_table(&[(7, 10.0, Utc::now())]);
    source.install_table(users.clone(), user_rows);
    source.install_table(orders, order_rows);
    // Target only knows about users; orders is deferred to the schema tick.
    target.install_table(users, vec![]);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let report = differ.tick(&pair()).await;

    assert!(!report.success());
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("orders"));
    // The healthy table still synced.
    assert_eq!(target.rows("users").len(), 1);
}

#[tokio::test]
async fn include_exclude_filters_limit_the_tick() {
    let (source, target) = memory_pair().await;
    let (users, user_rows) = users_table(&[(1, "a")]);
    let (orders, order_rows) = orders_table(&[(7, 10.0, Utc::now())]);
    source.install_table(users.clone(), user_rows);
    source.install_table(orders.clone(), order_rows);
    target.install_table(users, vec![]);
    target.install_table(orders, vec![]);

    let mut spec = pair();
    spec.include_tables = vec!["users".to_string()];

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let report = differ.tick(&spec).await;

    assert!(report.success());
    assert_eq!(report.tables, 1);
    assert_eq!(target.rows("users").len(), 1);
    assert!(target.rows("orders").is_empty());
}

#[tokio::test]
async fn prepopulated_keyed_target_is_reconciled_on_initial_sync() {
    let (source, target) = memory_pair().await;
    let (table, source_rows) = users_table(&[(1, "a"), (2, "b")]);
    let (_, target_rows) = users_table(&[(2, "b"), (9, "ghost")]);
    source.install_table(table.clone(), source_rows);
    target.install_table(table, target_rows);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let report = differ.initial_sync(&pair()).await;

    assert!(report.success());
    assert_eq!(report.inserted, 1);
    assert_eq!(report.deleted, 1);

    let mut ids: Vec<i64> = target
        .rows("users")
        .iter()
        .filter_map(|r| match r.get("id") {
            Some(SqlValue::Int(id)) => Some(*id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn prepopulated_keyless_target_is_left_alone_on_initial_sync() {
    let (source, target) = memory_pair().await;
    let (table, source_rows) = products_table(&[("a", "A")]);
    let (_, target_rows) = products_table(&[("z", "Z")]);
    source.install_table(table.clone(), source_rows);
    target.install_table(table, target_rows);

    let mut differ = DataDiffer::new(source.clone(), target.clone());
    let report = differ.initial_sync(&pair()).await;

    assert!(report.success());
    assert!(!report.mutated());
    assert_eq!(target.rows("products").len(), 1);
}
