//! Worker lifecycle and supervisor behavior over the in-memory adapters.

use std::sync::Arc;
use std::time::Duration;

use db_sync::adapter::{DatabaseAdapter, SqlValue};
use db_sync::config::{ConfigStore, ConnectionSpec, EngineKind, PairSpec, Settings};
use db_sync::service::SyncService;
use db_sync::testing::{memory_pair, user_row, users_table};
use db_sync::worker::{PairWorker, WorkerState};

fn spec(engine: EngineKind) -> ConnectionSpec {
    ConnectionSpec {
        engine,
        host: "localhost".to_string(),
        port: 3306,
        user: "root".to_string(),
        password: "secret".to_string(),
        database: "app".to_string(),
    }
}

/// A store holding one registered pair named "p".
fn store_with_pair(dir: &std::path::Path) -> Arc<ConfigStore> {
    let store = Arc::new(ConfigStore::open(dir).unwrap());
    store.add_connection("src", spec(EngineKind::Mysql)).unwrap();
    store
        .add_connection("dst", spec(EngineKind::Postgresql))
        .unwrap();
    store.add_pair(PairSpec::new("p", "src", "dst")).unwrap();
    store
}

fn fast_settings() -> Settings {
    Settings {
        poll_interval_secs: 1,
        schema_check_interval_secs: 3600,
        ..Settings::default()
    }
}

#[tokio::test]
async fn worker_runs_initial_sync_then_polls() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_pair(dir.path());

    let (source, target) = memory_pair().await;
    let (table, rows) = users_table(&[(1, "a"), (2, "b")]);
    source.install_table(table.clone(), rows);
    target.install_table(table, vec![]);

    let mut worker = PairWorker::with_adapters(
        store.get_pair("p").unwrap(),
        fast_settings(),
        Arc::clone(&store),
        source.clone(),
        target.clone(),
    );
    worker.start().await.unwrap();
    assert_eq!(worker.state(), WorkerState::Running);

    // Initial sync already landed.
    assert_eq!(target.rows("users").len(), 2);
    assert!(store.get_pair("p").unwrap().last_sync_at.is_some());

    // A change on the source arrives with the next data tick.
    let mut rows = source.rows("users");
    rows.push(user_row(3, "c"));
    source.set_rows("users", rows);
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(target.rows("users").len(), 3);

    worker.stop().await;
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert!(!source.is_connected());
    assert!(!target.is_connected());
}

#[tokio::test]
async fn stop_is_idempotent_in_any_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_pair(dir.path());
    let (source, target) = memory_pair().await;
    let (table, _) = users_table(&[]);
    source.install_table(table.clone(), vec![]);
    target.install_table(table, vec![]);

    let mut worker = PairWorker::with_adapters(
        store.get_pair("p").unwrap(),
        fast_settings(),
        store,
        source,
        target,
    );

    // Stop before start is a no-op.
    worker.stop().await;
    assert_eq!(worker.state(), WorkerState::Stopped);

    worker.start().await.unwrap();
    worker.stop().await;
    worker.stop().await;
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn connect_failure_aborts_start_and_closes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_pair(dir.path());
    let (source, target) = memory_pair().await;
    source.set_fail_connect(true);

    let mut worker = PairWorker::with_adapters(
        store.get_pair("p").unwrap(),
        fast_settings(),
        store,
        source,
        target.clone(),
    );

    let result = worker.start().await;
    assert!(result.is_err());
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert!(!worker.is_running());
    assert!(!target.is_connected());
}

#[tokio::test]
async fn initial_sync_failure_aborts_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_pair(dir.path());
    let (source, target) = memory_pair().await;
    // Source has a table the target lacks entirely; the initial data sync
    // cannot count rows on the target and fails the bring-up.
    let (table, rows) = users_table(&[(1, "a")]);
    source.install_table(table, rows);

    let mut pair = store.get_pair("p").unwrap();
    pair.sync_schema = false;
    pair.sync_procedures = false;
    pair.sync_triggers = false;

    let mut worker =
        PairWorker::with_adapters(pair, fast_settings(), store, source, target);
    let result = worker.start().await;
    assert!(result.is_err());
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn errors_on_one_pair_leave_the_other_ticking() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
    store.add_connection("a", spec(EngineKind::Mysql)).unwrap();
    store.add_connection("b", spec(EngineKind::Mysql)).unwrap();
    store.add_connection("c", spec(EngineKind::Mysql)).unwrap();
    store.add_connection("d", spec(EngineKind::Mysql)).unwrap();
    store.add_pair(PairSpec::new("broken", "a", "b")).unwrap();
    store.add_pair(PairSpec::new("healthy", "c", "d")).unwrap();

    // Pair "broken": a table appears on the source after start but never on
    // the target, so every data tick records an error.
    let (broken_source, broken_target) = memory_pair().await;
    let (users, _) = users_table(&[]);
    broken_source.install_table(users.clone(), vec![]);
    broken_target.install_table(users.clone(), vec![]);

    let (healthy_source, healthy_target) = memory_pair().await;
    healthy_source.install_table(users.clone(), vec![]);
    healthy_target.install_table(users, vec![]);

    let mut broken = PairWorker::with_adapters(
        store.get_pair("broken").unwrap(),
        fast_settings(),
        Arc::clone(&store),
        broken_source.clone(),
        broken_target,
    );
    let mut healthy = PairWorker::with_adapters(
        store.get_pair("healthy").unwrap(),
        fast_settings(),
        Arc::clone(&store),
        healthy_source.clone(),
        healthy_target.clone(),
    );
    broken.start().await.unwrap();
    healthy.start().await.unwrap();

    // Introduce the divergence after both initial syncs.
    let (orders, _) = db_sync::testing::orders_table(&[]);
    broken_source.install_table(orders, vec![]);
    let mut rows = healthy_source.rows("users");
    rows.push(user_row(1, "a"));
    healthy_source.set_rows("users", rows);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    // The broken pair keeps running despite its tick errors, and the healthy
    // pair converged.
    assert_eq!(broken.state(), WorkerState::Running);
    assert_eq!(healthy.state(), WorkerState::Running);
    assert!(healthy_target
        .rows("users")
        .iter()
        .any(|r| r.get("id") == Some(&SqlValue::Int(1))));

    broken.stop().await;
    healthy.stop().await;
}

#[tokio::test]
async fn service_status_reflects_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ConfigStore::open(dir.path()).unwrap());

    let service = SyncService::new(Arc::clone(&store));
    let status = service.status().await;
    assert!(!status.is_running);
    assert_eq!(status.active_workers, 0);

    // No pairs registered: the service starts with zero workers.
    service.start_all().await.unwrap();
    let status = service.status().await;
    assert!(status.is_running);
    assert!(status.pairs.is_empty());

    service.stop_all().await;
    let status = service.status().await;
    assert!(!status.is_running);
}

#[tokio::test]
async fn service_skips_pairs_that_fail_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ConfigStore::open(dir.path()).unwrap());
    // A pair whose connections point at nothing reachable; with zero
    // retries the start fails fast and is skipped.
    let unreachable = ConnectionSpec {
        engine: EngineKind::Mysql,
        host: "127.0.0.1".to_string(),
        port: 1,
        user: "nobody".to_string(),
        password: "nothing".to_string(),
        database: "missing".to_string(),
    };
    store.add_connection("a", unreachable.clone()).unwrap();
    store
        .add_connection(
            "b",
            ConnectionSpec {
                port: 2,
                ..unreachable
            },
        )
        .unwrap();
    store.add_pair(PairSpec::new("doomed", "a", "b")).unwrap();
    store
        .update_settings(db_sync::config::SettingsPatch {
            max_retries: Some(0),
            retry_delay_secs: Some(1),
            ..Default::default()
        })
        .unwrap();

    let service = SyncService::new(Arc::clone(&store));
    service.start_all().await.unwrap();

    let status = service.status().await;
    assert!(status.is_running);
    assert_eq!(status.active_workers, 0);

    service.stop_all().await;
}
