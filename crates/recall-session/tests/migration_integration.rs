#![allow(clippy::unwrap_used, clippy::expect_used)]

use recall_core::{Message, ToolCall};
use recall_session::{migrate_legacy_sessions, OpContext, SessionStore, SqliteSessionStore};
use serde_json::json;
use std::path::{Path, PathBuf};

struct Fixture {
    _tmp: tempfile::TempDir,
    legacy_dir: PathBuf,
    store: SqliteSessionStore,
}

async fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let legacy_dir = tmp.path().join("sessions");
    std::fs::create_dir_all(&legacy_dir).unwrap();
    let store = SqliteSessionStore::open(tmp.path().join("memory").join("sessions.db"))
        .await
        .unwrap();
    Fixture {
        _tmp: tmp,
        legacy_dir,
        store,
    }
}

fn write_session(dir: &Path, filename: &str, session: serde_json::Value) {
    let data = serde_json::to_string_pretty(&session).unwrap();
    std::fs::write(dir.join(filename), data).unwrap();
}

fn legacy(key: &str, messages: serde_json::Value) -> serde_json::Value {
    json!({
        "key": key,
        "messages": messages,
        "created": "2025-01-01T10:00:00Z",
        "updated": "2025-01-01T11:00:00Z",
    })
}

#[tokio::test]
async fn test_migrate_basic() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    let mut session = legacy(
        "test",
        json!([
            {"role": "user", "content": "hello"},
            {"role": "assistant", "content": "hi"}
        ]),
    );
    session["summary"] = json!("A greeting.");
    write_session(&fx.legacy_dir, "test.json", session);

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped, 0);

    let history = fx.store.history_with_seq(&ctx, "test").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].seq, 1);
    assert_eq!(history[0].message, Message::user("hello"));
    assert_eq!(history[1].seq, 2);
    assert_eq!(history[1].message, Message::assistant("hi"));
    assert_eq!(fx.store.get_summary(&ctx, "test").await.unwrap(), "A greeting.");
}

#[tokio::test]
async fn test_migrate_with_tool_calls() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    write_session(
        &fx.legacy_dir,
        "tools.json",
        legacy(
            "tools",
            json!([
                {
                    "role": "assistant",
                    "content": "Searching...",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"q\":\"test\"}"}
                    }]
                },
                {"role": "tool", "content": "result", "tool_call_id": "call_1"}
            ]),
        ),
    );

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 1);

    let history = fx.store.get_history(&ctx, "tools").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0].tool_calls,
        vec![ToolCall::function("call_1", "web_search", r#"{"q":"test"}"#)]
    );
    assert_eq!(history[1].tool_call_id, "call_1");
}

#[tokio::test]
async fn test_migrate_multiple_files() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    for key in ["a", "b", "c"] {
        write_session(
            &fx.legacy_dir,
            &format!("{key}.json"),
            legacy(key, json!([{"role": "user", "content": format!("msg {key}")}])),
        );
    }

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 3);

    for key in ["a", "b", "c"] {
        let history = fx.store.get_history(&ctx, key).await.unwrap();
        assert_eq!(history, vec![Message::user(format!("msg {key}"))]);
    }
}

#[tokio::test]
async fn test_invalid_json_is_skipped_and_siblings_import() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    write_session(
        &fx.legacy_dir,
        "good.json",
        legacy("good", json!([{"role": "user", "content": "ok"}])),
    );
    std::fs::write(fx.legacy_dir.join("bad.json"), "{invalid json").unwrap();
    write_session(
        &fx.legacy_dir,
        "nokey.json",
        legacy("", json!([{"role": "user", "content": "orphan"}])),
    );

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped, 2);

    assert_eq!(fx.store.get_history(&ctx, "good").await.unwrap().len(), 1);
    // Skipped files stay in place, untouched.
    assert!(fx.legacy_dir.join("bad.json").exists());
    assert!(fx.legacy_dir.join("nokey.json").exists());
}

#[tokio::test]
async fn test_migrate_renames_files() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    write_session(
        &fx.legacy_dir,
        "rename.json",
        legacy("rename", json!([{"role": "user", "content": "hi"}])),
    );
    let original = std::fs::read_to_string(fx.legacy_dir.join("rename.json")).unwrap();

    migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();

    assert!(!fx.legacy_dir.join("rename.json").exists());
    let backup = fx.legacy_dir.join("rename.json.migrated");
    assert!(backup.exists());
    assert_eq!(std::fs::read_to_string(backup).unwrap(), original);
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    write_session(
        &fx.legacy_dir,
        "idem.json",
        legacy("idem", json!([{"role": "user", "content": "once"}])),
    );

    let first = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(first.imported, 1);

    let second = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.skipped, 0);

    let history = fx.store.get_history(&ctx, "idem").await.unwrap();
    assert_eq!(history, vec![Message::user("once")]);
}

#[tokio::test]
async fn test_reprocessed_file_does_not_duplicate() {
    // Simulates a run whose rename failed: the file is seen again after its
    // data was committed.
    let fx = fixture().await;
    let ctx = OpContext::background();
    let session = legacy("retry", json!([{"role": "user", "content": "one"}]));

    write_session(&fx.legacy_dir, "retry.json", session.clone());
    migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    write_session(&fx.legacy_dir, "retry.json", session);

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(fx.store.get_history(&ctx, "retry").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_colon_in_key_uses_recorded_key() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    // File is named telegram_123 (sanitized), but the key inside is telegram:123.
    write_session(
        &fx.legacy_dir,
        "telegram_123.json",
        legacy(
            "telegram:123",
            json!([{"role": "user", "content": "from telegram"}]),
        ),
    );

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 1);

    let history = fx.store.get_history(&ctx, "telegram:123").await.unwrap();
    assert_eq!(history, vec![Message::user("from telegram")]);

    assert!(fx
        .store
        .get_history(&ctx, "telegram_123")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_missing_directory_is_not_an_error() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    let report = migrate_legacy_sessions(&ctx, fx.legacy_dir.join("absent"), &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 0);
}

#[tokio::test]
async fn test_ignores_directories_and_other_files() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    std::fs::create_dir_all(fx.legacy_dir.join("nested.json")).unwrap();
    std::fs::write(fx.legacy_dir.join("notes.txt"), "not a session").unwrap();
    write_session(
        &fx.legacy_dir,
        "done.json.migrated",
        legacy("done", json!([{"role": "user", "content": "old"}])),
    );

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 0);
    assert_eq!(report.skipped, 0);
    assert!(fx.store.get_history(&ctx, "done").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_message_list_creates_session() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    let mut session = legacy("quiet", json!([]));
    session["summary"] = json!("nothing said yet");
    write_session(&fx.legacy_dir, "quiet.json", session);

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(
        fx.store.get_summary(&ctx, "quiet").await.unwrap(),
        "nothing said yet"
    );
    assert!(fx.store.get_history(&ctx, "quiet").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_null_collections_are_imported() {
    let fx = fixture().await;
    let ctx = OpContext::background();

    let mut empty = legacy("a", serde_json::Value::Null);
    empty["summary"] = json!("only a summary");
    write_session(&fx.legacy_dir, "a.json", empty);

    write_session(
        &fx.legacy_dir,
        "b.json",
        legacy(
            "b",
            json!([
                {"role": "user", "content": "ping", "tool_calls": null},
                {"role": "assistant", "content": "pong", "tool_calls": null, "tool_call_id": ""}
            ]),
        ),
    );

    let report = migrate_legacy_sessions(&ctx, &fx.legacy_dir, &fx.store)
        .await
        .unwrap();
    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped, 0);

    assert_eq!(fx.store.get_summary(&ctx, "a").await.unwrap(), "only a summary");
    assert!(fx.store.get_history(&ctx, "a").await.unwrap().is_empty());
    assert_eq!(
        fx.store.get_history(&ctx, "b").await.unwrap(),
        vec![Message::user("ping"), Message::assistant("pong")]
    );
    assert!(!fx.legacy_dir.join("a.json").exists());
    assert!(fx.legacy_dir.join("b.json.migrated").exists());
}
