use std::sync::{Arc, Mutex};

use tabula_sdk::column::{Column, ColumnFlags};
use tabula_sdk::error::EventError;
use tabula_sdk::table_fields;
use tabula_sdk::{
    Authentication, EngineError, Engine, LevelOverrides, MemoryBridge, Permission, PermissionLevel, Relation,
    Settings, SqlType, Table, TableBase, ValidationPolicy,
};

#[derive(Clone, Debug)]
struct Note {
    base: TableBase,
    title: Column<String>,
    body: Column<String>,
}

impl Table for Note {
    const NAME: &'static str = "Note";

    fn new() -> Self {
        Note {
            base: TableBase::new(Self::NAME),
            title: Column::new(SqlType::varchar(40), ColumnFlags::NONE),
            body: Column::new(SqlType::TEXT, ColumnFlags::NULLABLE),
        }
    }

    table_fields!(base; title, body);
}

#[derive(Clone, Debug)]
struct Reply {
    base: TableBase,
    text: Column<String>,
    note: Relation<Note>,
}

impl Table for Reply {
    const NAME: &'static str = "Reply";

    fn new() -> Self {
        Reply {
            base: TableBase::new(Self::NAME),
            text: Column::new(SqlType::TEXT, ColumnFlags::NONE),
            note: Relation::new(ColumnFlags::NULLABLE),
        }
    }

    table_fields!(base; text, note);
}

fn note(title: &str) -> Note {
    let mut note = Note::new();
    note.title.set(title.to_string());
    note
}

fn alice() -> Authentication {
    Authentication::principal(2, "alice")
}

fn bob() -> Authentication {
    Authentication::principal(3, "bob")
}

fn setup() -> (Engine, Arc<MemoryBridge>) {
    let bridge = Arc::new(MemoryBridge::new());
    let engine = Engine::new(bridge.clone()).unwrap();
    engine.register::<Note>().unwrap();
    (engine, bridge)
}

fn public_read() -> LevelOverrides {
    LevelOverrides {
        read: Some(PermissionLevel::All),
        ..Default::default()
    }
}

#[tokio::test]
async fn owner_reads_others_do_not() {
    let (engine, _) = setup();
    let mut row = note("mine");
    engine.insert(&mut row, Some(&alice()), LevelOverrides::default()).await.unwrap();
    let id = row.id().unwrap();

    let as_owner: Option<Note> = engine.select(Some(&alice()), id).await.unwrap();
    assert_eq!(as_owner.unwrap().title.get().unwrap(), "mine");
    assert!(engine.select::<Note>(Some(&bob()), id).await.unwrap().is_none());
    assert!(engine.select::<Note>(None, id).await.unwrap().is_none());
    assert!(engine.select::<Note>(Some(&Authentication::root()), id).await.unwrap().is_some());
}

#[tokio::test]
async fn auth_level_opens_rows_to_any_principal() {
    let (engine, _) = setup();
    let mut row = note("shared");
    let overrides = LevelOverrides {
        read: Some(PermissionLevel::Auth),
        ..Default::default()
    };
    engine.insert(&mut row, Some(&alice()), overrides).await.unwrap();
    let id = row.id().unwrap();

    assert!(engine.select::<Note>(Some(&bob()), id).await.unwrap().is_some());
    assert!(engine.select::<Note>(None, id).await.unwrap().is_none());
}

#[tokio::test]
async fn select_all_filters_in_storage_order() {
    let (engine, _) = setup();
    for (title, overrides) in [
        ("first", LevelOverrides::default()),
        ("second", public_read()),
        ("third", LevelOverrides::default()),
        ("fourth", public_read()),
    ] {
        engine.insert(&mut note(title), Some(&alice()), overrides).await.unwrap();
    }

    let titles = |rows: Vec<Note>| -> Vec<String> { rows.iter().map(|r| r.title.get().unwrap().clone()).collect() };
    assert_eq!(
        titles(engine.select_all::<Note>(Some(&bob())).await.unwrap()),
        vec!["second", "fourth"]
    );
    assert_eq!(
        titles(engine.select_all::<Note>(Some(&alice())).await.unwrap()),
        vec!["first", "second", "third", "fourth"]
    );
    assert_eq!(
        engine.select_all::<Note>(Some(&Authentication::root())).await.unwrap().len(),
        4
    );
}

#[tokio::test]
async fn update_requires_write_permission() {
    let (engine, _) = setup();
    let mut row = note("draft");
    engine.insert(&mut row, Some(&alice()), public_read()).await.unwrap();

    let mut seen_by_bob: Note = engine.select(Some(&bob()), row.id().unwrap()).await.unwrap().unwrap();
    seen_by_bob.title.set("hijacked".into());
    let err = engine.update(&mut seen_by_bob, Some(&bob())).await.unwrap_err();
    assert!(matches!(err, EngineError::Permission { operation: "update", .. }));

    row.title.set("final".into());
    engine.update(&mut row, Some(&alice())).await.unwrap();
    let stored: Note = engine.select(Some(&alice()), row.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.title.get().unwrap(), "final");
}

#[tokio::test]
async fn delete_of_never_inserted_row_fails_without_events() {
    let (engine, _) = setup();
    let fired = Arc::new(Mutex::new(0));
    let events = engine.events::<Note>().unwrap();
    for holder in [&events.before_delete, &events.after_delete] {
        let fired = fired.clone();
        holder.on(move |_| {
            let fired = fired.clone();
            async move {
                *fired.lock().unwrap() += 1;
                Ok(())
            }
        });
    }

    let err = engine
        .delete(&mut note("ghost"), Some(&Authentication::root()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotInserted { operation: "delete", .. }));
    assert_eq!(*fired.lock().unwrap(), 0);
}

#[tokio::test]
async fn delete_removes_row_for_owner_only() {
    let (engine, bridge) = setup();
    let mut row = note("bye");
    engine.insert(&mut row, Some(&alice()), public_read()).await.unwrap();
    let meta = engine.meta::<Note>().unwrap();

    let err = engine.delete(&mut row.clone(), Some(&bob())).await.unwrap_err();
    assert!(matches!(err, EngineError::Permission { operation: "delete", .. }));
    assert_eq!(bridge.len(&meta).await, 1);

    let permissions = engine.meta::<Permission>().unwrap();
    assert_eq!(bridge.len(&permissions).await, 1);

    engine.delete(&mut row, Some(&alice())).await.unwrap();
    assert_eq!(bridge.len(&meta).await, 0);
    assert_eq!(bridge.len(&permissions).await, 0);
}

#[tokio::test]
async fn create_requires_write_capability() {
    let (engine, bridge) = setup();
    let reader = alice().with_capabilities(true, false, false);
    let err = engine
        .insert(&mut note("nope"), Some(&reader), LevelOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Permission { operation: "insert", .. }));
    assert_eq!(bridge.len(&engine.meta::<Note>().unwrap()).await, 0);
}

#[tokio::test]
async fn persistent_subscribers_run_before_one_shot_ones() {
    let (engine, _) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    let events = engine.events::<Note>().unwrap();

    let once_log = log.clone();
    events.after_insert.once(move |args| async move {
        let title = args.row().map(|n: &Note| n.title.get().unwrap().clone()).unwrap_or_default();
        once_log.lock().unwrap().push(format!("once:{title}"));
        Ok(())
    });
    let on_log = log.clone();
    events.after_insert.on(move |args| {
        let on_log = on_log.clone();
        async move {
            let id = args.row().and_then(Table::id).unwrap_or_default();
            on_log.lock().unwrap().push(format!("on:{id}"));
            Ok(())
        }
    });

    engine.insert(&mut note("a"), Some(&alice()), LevelOverrides::default()).await.unwrap();
    engine.insert(&mut note("b"), Some(&alice()), LevelOverrides::default()).await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["on:1", "once:a", "on:2"]);
    assert_eq!(events.after_insert.len(), 1);
}

#[tokio::test]
async fn failing_subscriber_aborts_the_insert() {
    let (engine, bridge) = setup();
    let events = engine.events::<Note>().unwrap();
    events
        .before_insert
        .once(|_| async { Err(EventError::new("quota exceeded")) });

    let err = engine
        .insert(&mut note("blocked"), Some(&alice()), LevelOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Event(_)));
    assert_eq!(bridge.len(&engine.meta::<Note>().unwrap()).await, 0);
    assert!(events.before_insert.is_empty());

    engine.insert(&mut note("allowed"), Some(&alice()), LevelOverrides::default()).await.unwrap();
}

#[tokio::test]
async fn after_select_reports_hidden_rows_as_null() {
    let (engine, _) = setup();
    let mut row = note("secret");
    engine.insert(&mut row, Some(&alice()), LevelOverrides::default()).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.events::<Note>().unwrap().after_select.on(move |args| {
        let sink = sink.clone();
        async move {
            let rows = args.rows().map(|r| r.iter().map(Option::is_some).collect::<Vec<_>>());
            sink.lock().unwrap().push(rows.unwrap_or_default());
            Ok(())
        }
    });

    engine.select::<Note>(Some(&bob()), row.id().unwrap()).await.unwrap();
    engine.select::<Note>(Some(&alice()), row.id().unwrap()).await.unwrap();
    engine.select::<Note>(Some(&alice()), 99).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![vec![false], vec![true]]);
}

#[tokio::test]
async fn on_write_policy_rejects_invalid_rows() {
    let settings = Settings {
        validation: ValidationPolicy::OnWrite,
        ..Settings::default()
    };
    let engine = Engine::with_settings(Arc::new(MemoryBridge::new()), settings).unwrap();
    engine.register::<Note>().unwrap();

    let err = engine
        .insert(&mut Note::new(), Some(&alice()), LevelOverrides::default())
        .await
        .unwrap_err();
    match err {
        EngineError::Invalid { table, diagnostics } => {
            assert_eq!(table, "note");
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].to_string(), "Column 'title' cannot be null");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn rows_stored_with_nulls_stay_listable() {
    let (engine, _) = setup();
    engine.insert(&mut note("titled"), Some(&alice()), LevelOverrides::default()).await.unwrap();
    let mut untitled = Note::new();
    engine.insert(&mut untitled, Some(&alice()), LevelOverrides::default()).await.unwrap();

    let rows = engine.select_all::<Note>(Some(&alice())).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].title.get().unwrap(), "titled");
    assert!(rows[1].title.is_null());
    assert!(rows[1].body.is_null());
    assert_eq!(rows[1].validate().unwrap().len(), 1);

    let reread: Note = engine.select(Some(&alice()), untitled.id().unwrap()).await.unwrap().unwrap();
    assert!(reread.title.is_null());
}

#[tokio::test]
async fn resolve_leaves_missing_targets_unset() {
    let (engine, _) = setup();
    engine.register::<Reply>().unwrap();
    let mut target = note("gone soon");
    engine.insert(&mut target, Some(&alice()), LevelOverrides::default()).await.unwrap();

    let mut orphan = Reply::new();
    orphan.text.set("never stored target".into());
    orphan.note.set_key(Some(42)).unwrap();
    engine.resolve(&mut orphan, Some(&alice())).await.unwrap();
    assert!(orphan.note.is_null());
    assert_eq!(orphan.note.key_value(), Some(42));

    let mut reply = Reply::new();
    reply.text.set("after delete".into());
    reply.note.set_key(target.id()).unwrap();
    engine.delete(&mut target, Some(&alice())).await.unwrap();
    engine.resolve(&mut reply, Some(&alice())).await.unwrap();
    assert!(reply.note.is_null());
    assert_eq!(reply.note.key_value(), target.id());
}
