use courier_database::Database;
use courier_outbox::{
    CallArgs, Outbox, OutboxError, OutboxSettings, PublishStrategyType, ResolutionError, Signal,
    Value,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

type Calls = Arc<Mutex<Vec<CallArgs>>>;

fn open_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute_batch("CREATE TABLE orders (id INTEGER PRIMARY KEY, total INTEGER NOT NULL);")
        .unwrap();
    db
}

fn count_orders(db: &Database) -> i64 {
    db.connection()
        .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
        .unwrap()
}

/// Records every call and fails when the call carries `fail=true`.
fn recording(calls: &Calls) -> impl Fn(&CallArgs) -> courier_outbox::HandlerResult + Send + Sync + 'static {
    let calls = calls.clone();
    move |call: &CallArgs| {
        calls.lock().unwrap().push(call.clone());
        if call.keyword("fail").and_then(Value::as_bool) == Some(true) {
            Err("downstream rejected".into())
        } else {
            Ok(())
        }
    }
}

fn strategy_settings(strategy: PublishStrategyType) -> OutboxSettings {
    OutboxSettings {
        publish_strategy: strategy,
        ..OutboxSettings::default()
    }
}

#[test]
fn keep_order_relay_delivers_all_in_creation_order() {
    let db = open_db();
    let calls: Calls = Arc::default();
    let outbox = Outbox::new(OutboxSettings::default());
    let ship = outbox
        .save_to_outbox_stream("orders", Some(PublishStrategyType::KeepOrder))
        .wrap("orders.ship", recording(&calls))
        .unwrap();

    for n in 0..5i64 {
        db.atomic(|tx| {
            tx.execute("INSERT INTO orders (total) VALUES (?1)", [n])
                .map_err(courier_database::DatabaseError::from)?;
            ship.call(tx, CallArgs::new().arg(n))
        })
        .unwrap();
    }
    assert!(calls.lock().unwrap().is_empty());

    let report = outbox.relay(&db, Some("orders")).unwrap();
    assert_eq!(report.delivered.len(), 5);
    let order: Vec<_> = calls
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.positional(0).and_then(Value::as_i64))
        .collect();
    assert_eq!(order, (0..5).map(Some).collect::<Vec<_>>());

    let second = outbox.relay(&db, None).unwrap();
    assert!(second.is_idle());
    assert_eq!(calls.lock().unwrap().len(), 5);
}

#[test]
fn keep_order_failure_halts_the_stream() {
    let db = open_db();
    let calls: Calls = Arc::default();
    let outbox = Outbox::new(strategy_settings(PublishStrategyType::KeepOrder));
    let ship = outbox
        .save_to_outbox_stream("orders", None)
        .wrap("orders.ship", recording(&calls))
        .unwrap();

    ship.call_now(&db, CallArgs::new().arg("e1").kwarg("fail", true)).unwrap();
    ship.call_now(&db, CallArgs::new().arg("e2")).unwrap();

    let report = outbox.relay(&db, None).unwrap();
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.skipped, 1);
    assert!(report.is_stuck());
    assert!(report.stuck_on(Some("orders")).is_some());
    assert_eq!(db.count_outbox_events().unwrap().pending, 2);
}

#[test]
fn keep_order_halt_is_scoped_to_its_stream() {
    let db = open_db();
    let calls: Calls = Arc::default();
    let outbox = Outbox::new(strategy_settings(PublishStrategyType::KeepOrder));
    let ship = outbox
        .save_to_outbox_stream("orders", None)
        .wrap("orders.ship", recording(&calls))
        .unwrap();
    let bill = outbox
        .save_to_outbox_stream("invoices", None)
        .wrap("invoices.bill", recording(&calls))
        .unwrap();

    ship.call_now(&db, CallArgs::new().arg("o1").kwarg("fail", true)).unwrap();
    bill.call_now(&db, CallArgs::new().arg("i1")).unwrap();
    ship.call_now(&db, CallArgs::new().arg("o2")).unwrap();
    bill.call_now(&db, CallArgs::new().arg("i2")).unwrap();

    let report = outbox.relay(&db, None).unwrap();
    let seen: Vec<_> = calls
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.positional(0).and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(
        seen,
        vec![
            Some("o1".to_string()),
            Some("i1".to_string()),
            Some("i2".to_string())
        ]
    );
    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered.len(), 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.stuck.len(), 1);
    assert!(report.stuck_on(Some("orders")).is_some());
    assert!(report.stuck_on(Some("invoices")).is_none());

    let pending = db.get_pending_outbox_events(None).unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|e| e.stream.as_deref() == Some("orders")));
}

/// Insert a row the way an older schema would have, with no strategy column.
fn store_legacy(db: &Database, target: &str, call: &CallArgs) -> i64 {
    let mut record = courier_outbox::Envelope::record(
        target,
        call,
        None,
        PublishStrategyType::BestEffort,
    )
    .unwrap();
    record.strategy = None;
    db.insert_outbox_event(&record).unwrap().id
}

#[test]
fn legacy_rows_halt_under_keep_order_default() {
    let db = open_db();
    let calls: Calls = Arc::default();
    let outbox = Outbox::new(strategy_settings(PublishStrategyType::KeepOrder));
    outbox
        .register_handler("orders.ship", recording(&calls))
        .unwrap();

    let first = store_legacy(&db, "orders.ship", &CallArgs::new().arg(1i64).kwarg("fail", true));
    store_legacy(&db, "orders.ship", &CallArgs::new().arg(2i64));

    let report = outbox.relay(&db, None).unwrap();
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(report.failed, vec![first]);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.stuck_on(None).map(|s| s.event_id), Some(first));
}

#[test]
fn legacy_rows_continue_under_best_effort_default() {
    let db = open_db();
    let calls: Calls = Arc::default();
    let outbox = Outbox::new(strategy_settings(PublishStrategyType::BestEffort));
    outbox
        .register_handler("orders.ship", recording(&calls))
        .unwrap();

    let first = store_legacy(&db, "orders.ship", &CallArgs::new().arg(1i64).kwarg("fail", true));
    let second = store_legacy(&db, "orders.ship", &CallArgs::new().arg(2i64));

    let report = outbox.relay(&db, None).unwrap();
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(report.failed, vec![first]);
    assert_eq!(report.delivered, vec![second]);
    assert!(!report.is_stuck());
}

#[test]
fn legacy_row_with_missing_target_follows_the_default() {
    for (default, halts) in [
        (PublishStrategyType::KeepOrder, true),
        (PublishStrategyType::BestEffort, false),
    ] {
        let db = open_db();
        let calls: Calls = Arc::default();
        let outbox = Outbox::new(strategy_settings(default));
        outbox
            .register_handler("orders.ship", recording(&calls))
            .unwrap();

        let gone = store_legacy(&db, "orders.retired", &CallArgs::new());
        let fine = store_legacy(&db, "orders.ship", &CallArgs::new());

        let report = outbox.relay(&db, None).unwrap();
        assert_eq!(report.failed, vec![gone]);
        assert_eq!(report.is_stuck(), halts);
        if halts {
            assert!(report.delivered.is_empty());
            assert_eq!(report.skipped, 1);
            assert!(calls.lock().unwrap().is_empty());
        } else {
            assert_eq!(report.delivered, vec![fine]);
            assert_eq!(report.skipped, 0);
        }
    }
}

#[test]
fn best_effort_relay_continues_past_failures() {
    let db = open_db();
    let calls: Calls = Arc::default();
    let outbox = Outbox::new(OutboxSettings::default());
    let ship = outbox
        .save_to_outbox_stream("orders", Some(PublishStrategyType::BestEffort))
        .wrap("orders.ship", recording(&calls))
        .unwrap();

    // Both fail inline, so both are persisted for the relayer.
    ship.call_now(&db, CallArgs::new().arg("e1").kwarg("fail", true)).unwrap();
    ship.call_now(&db, CallArgs::new().arg("e2").kwarg("fail", true)).unwrap();
    let pending = db.get_pending_outbox_events(None).unwrap();
    assert_eq!(pending.len(), 2);

    // Make the second one succeed on replay.
    db.connection()
        .execute(
            "UPDATE outbox_events SET kwargs = NULL WHERE id = ?1",
            [pending[1].id],
        )
        .unwrap();
    calls.lock().unwrap().clear();

    let report = outbox.relay(&db, Some("orders")).unwrap();
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(report.failed, vec![pending[0].id]);
    assert_eq!(report.delivered, vec![pending[1].id]);
    assert!(!report.is_stuck());

    let remaining = db.get_pending_outbox_events(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, pending[0].id);
}

#[test]
fn relay_replays_arguments_unchanged() {
    let db = open_db();
    let calls: Calls = Arc::default();
    let outbox = Outbox::new(strategy_settings(PublishStrategyType::KeepOrder));
    outbox.register_type("billing.Invoice").unwrap();
    let notify = outbox
        .save_to_outbox("billing.notify", recording(&calls))
        .unwrap();

    let call = CallArgs::new()
        .arg(json!({"order": 42, "lines": [1, 2]}))
        .arg(1.5f64)
        .kwarg("a", "1")
        .kwarg("kind", Value::type_marker("billing.Invoice"));
    notify.call_now(&db, call.clone()).unwrap();

    outbox.relay(&db, None).unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![call]);
}

#[test]
fn cleaner_respects_retention() {
    let db = open_db();
    let outbox = Outbox::new(OutboxSettings::default());
    let notify = outbox
        .save_to_outbox("billing.notify", |_: &CallArgs| Ok(()))
        .unwrap();
    let failing = outbox
        .save_to_outbox("billing.fail", |_: &CallArgs| Err("down".into()))
        .unwrap();

    let outbox_persisting = Outbox::new(OutboxSettings {
        persist_all_events: true,
        ..OutboxSettings::default()
    });
    let kept = outbox_persisting
        .save_to_outbox("audit.record", |_: &CallArgs| Ok(()))
        .unwrap();

    kept.call_now(&db, CallArgs::new()).unwrap();
    notify.call_now(&db, CallArgs::new()).unwrap();
    failing.call_now(&db, CallArgs::new()).unwrap();

    let counts = db.count_outbox_events().unwrap();
    assert_eq!((counts.sent, counts.pending), (1, 1));

    let now = chrono::Utc::now();
    let cleaner = outbox.cleaner();
    assert_eq!(cleaner.clean_at(&db, now).unwrap(), 0);

    let later = now + chrono::Duration::days(15);
    assert_eq!(cleaner.clean_at(&db, later).unwrap(), 1);
    let counts = db.count_outbox_events().unwrap();
    assert_eq!((counts.sent, counts.pending), (0, 1));
}

#[test]
fn missing_target_is_captured_and_left_pending() {
    let db = open_db();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let outbox = Outbox::builder(strategy_settings(PublishStrategyType::KeepOrder))
        .capture(move |e: &OutboxError| sink.lock().unwrap().push(e.to_string()))
        .build();
    let notify = outbox
        .save_to_outbox("legacy.notify", |_: &CallArgs| Ok(()))
        .unwrap();
    notify.call_now(&db, CallArgs::new()).unwrap();

    // The module is gone after a deploy.
    assert!(outbox.registry().unregister("legacy.notify"));

    let report = outbox.relay(&db, None).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(db.count_outbox_events().unwrap().pending, 1);

    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    let expected = OutboxError::from(ResolutionError::ModuleNotFound {
        module: "legacy".to_string(),
    });
    assert_eq!(captured[0], expected.to_string());
}

#[test]
fn best_effort_only_stores_failed_inline_calls() {
    let db = open_db();
    let outbox = Outbox::new(OutboxSettings::default());
    let ok = outbox
        .save_to_outbox("mail.send", |_: &CallArgs| Ok(()))
        .unwrap();
    let broken = outbox
        .save_to_outbox("mail.bounce", |_: &CallArgs| Err("smtp down".into()))
        .unwrap();

    ok.call_now(&db, CallArgs::new().arg("hello")).unwrap();
    assert_eq!(db.count_outbox_events().unwrap().total(), 0);

    broken.call_now(&db, CallArgs::new().arg("hello")).unwrap();
    let pending = db.get_pending_outbox_events(None).unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].sent_at.is_none());
}

#[test]
fn rollback_discards_envelope_and_inline_attempt() {
    let db = open_db();
    let calls: Calls = Arc::default();
    let outbox = Outbox::new(OutboxSettings {
        persist_all_events: true,
        ..OutboxSettings::default()
    });
    let notify = outbox
        .save_to_outbox("billing.notify", recording(&calls))
        .unwrap();

    let result: Result<(), OutboxError> = db.atomic(|tx| {
        tx.execute("INSERT INTO orders (total) VALUES (10)", [])
            .map_err(courier_database::DatabaseError::from)?;
        notify.call(tx, CallArgs::new().arg("order-1"))?;
        Err(OutboxError::Configuration("abort".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(count_orders(&db), 0);
    assert_eq!(db.count_outbox_events().unwrap().total(), 0);
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn signals_follow_the_delivery_path() {
    let db = open_db();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let outbox = Outbox::new(OutboxSettings::default());
    let log = seen.clone();
    outbox.signals().subscribe_all(move |n| {
        log.lock().unwrap().push(n.signal);
        Ok(())
    });
    outbox.signals().subscribe_all(|_| Err("broken subscriber".into()));

    let calls: Calls = Arc::default();
    let notify = outbox
        .save_to_outbox("billing.notify", recording(&calls))
        .unwrap();

    notify.call_now(&db, CallArgs::new().arg("ok")).unwrap();
    notify
        .call_now(&db, CallArgs::new().arg("bad").kwarg("fail", true))
        .unwrap();
    outbox.relay(&db, None).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Signal::EventPublished,
            Signal::EventFailedToPublish,
            Signal::EventFailedToPublishByRelay,
        ]
    );
}
