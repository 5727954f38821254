#![cfg(feature = "sqlite")]

use d1_orm::prelude::*;
use tempfile::tempdir;

async fn counter_db(options: ShimOptions) -> Result<D1Shim, OrmError> {
    let db = D1Shim::open(options).await?;
    db.exec("CREATE TABLE entries (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT UNIQUE)")
        .await?;
    Ok(db)
}

async fn count(db: &D1Shim) -> Result<i64, OrmError> {
    let n = db
        .prepare("SELECT COUNT(*) AS n FROM entries")
        .first_value("n")
        .await?;
    Ok(n.and_then(|v| v.as_int()).unwrap_or_default())
}

#[tokio::test]
async fn rollback_discards_both_writes() -> Result<(), Box<dyn std::error::Error>> {
    let db = counter_db(ShimOptions::in_memory()).await?;
    db.exec("INSERT INTO entries (label) VALUES ('seed')").await?;
    let before = count(&db).await?;

    db.exec("BEGIN TRANSACTION").await?;
    assert_eq!(db.transaction_state().await, TransactionState::Explicit);
    db.prepare("INSERT INTO entries (label) VALUES (?)").bind(params!["a"]).run().await?;
    db.prepare("INSERT INTO entries (label) VALUES (?)").bind(params!["b"]).run().await?;
    assert_eq!(count(&db).await?, before + 2);
    db.exec("ROLLBACK").await?;

    assert_eq!(db.transaction_state().await, TransactionState::Auto);
    assert_eq!(count(&db).await?, before);
    Ok(())
}

#[tokio::test]
async fn commit_keeps_both_writes() -> Result<(), Box<dyn std::error::Error>> {
    let db = counter_db(ShimOptions::in_memory()).await?;
    db.begin().await?;
    db.prepare("INSERT INTO entries (label) VALUES (?)").bind(params!["a"]).run().await?;
    db.prepare("INSERT INTO entries (label) VALUES (?)").bind(params!["b"]).run().await?;
    db.commit().await?;
    assert_eq!(count(&db).await?, 2);
    Ok(())
}

#[tokio::test]
async fn control_errors_are_transaction_errors() -> Result<(), Box<dyn std::error::Error>> {
    let db = counter_db(ShimOptions::in_memory()).await?;
    assert!(matches!(db.commit().await, Err(OrmError::Transaction(_))));
    assert!(matches!(db.exec("ROLLBACK").await, Err(OrmError::Transaction(_))));

    db.begin().await?;
    assert!(matches!(db.exec("BEGIN").await, Err(OrmError::Transaction(_))));
    db.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn savepoints_roll_back_partially() -> Result<(), Box<dyn std::error::Error>> {
    let db = counter_db(ShimOptions::in_memory()).await?;
    db.begin().await?;
    db.exec("INSERT INTO entries (label) VALUES ('kept')").await?;
    db.exec("SAVEPOINT inner_work").await?;
    db.exec("INSERT INTO entries (label) VALUES ('dropped')").await?;
    db.exec("ROLLBACK TO inner_work").await?;
    db.exec("RELEASE inner_work").await?;
    assert!(matches!(db.exec("RELEASE missing").await, Err(OrmError::Transaction(_))));
    db.commit().await?;

    let labels = db.prepare("SELECT label FROM entries").all().await?;
    assert_eq!(labels.raw(), vec![vec![SqlValue::Text("kept".into())]]);
    Ok(())
}

#[tokio::test]
async fn auto_mode_commits_each_statement_to_disk() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("auto.db");

    let writer = counter_db(ShimOptions::file(&path)).await?;
    writer.exec("INSERT INTO entries (label) VALUES ('visible')").await?;
    writer.begin().await?;
    writer.exec("INSERT INTO entries (label) VALUES ('pending')").await?;

    let reader = D1Shim::open(ShimOptions::file(&path)).await?;
    assert_eq!(count(&reader).await?, 1);

    writer.commit().await?;
    assert_eq!(count(&reader).await?, 2);
    Ok(())
}

#[tokio::test]
async fn explicit_only_detection_ignores_control_text() -> Result<(), Box<dyn std::error::Error>> {
    let options = D1Shim::builder()
        .detection(TransactionDetection::ExplicitOnly)
        .finish();
    let db = counter_db(options).await?;
    assert!(matches!(db.exec("BEGIN").await, Err(OrmError::Transaction(_))));

    db.begin().await?;
    db.exec("INSERT INTO entries (label) VALUES ('a')").await?;
    db.rollback().await?;
    assert_eq!(count(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn control_text_must_stand_alone() -> Result<(), Box<dyn std::error::Error>> {
    let db = counter_db(ShimOptions::in_memory()).await?;
    let err = db
        .prepare("BEGIN; INSERT INTO entries (label) VALUES ('x'); COMMIT")
        .run()
        .await
        .expect_err("control text with trailing statements");
    assert!(matches!(err, OrmError::Query(_)));
    assert_eq!(db.transaction_state().await, TransactionState::Auto);
    assert_eq!(count(&db).await?, 0);

    db.exec("BEGIN; INSERT INTO entries (label) VALUES ('x'); COMMIT").await?;
    assert_eq!(db.transaction_state().await, TransactionState::Auto);
    assert_eq!(count(&db).await?, 1);
    assert!(matches!(db.commit().await, Err(OrmError::Transaction(_))));
    Ok(())
}

#[tokio::test]
async fn failed_commit_keeps_the_transaction_open() -> Result<(), Box<dyn std::error::Error>> {
    let db = counter_db(ShimOptions::in_memory()).await?;
    db.exec(
        "CREATE TABLE notes (
            entry_id INTEGER REFERENCES entries (id) DEFERRABLE INITIALLY DEFERRED
        )",
    )
    .await?;

    db.begin().await?;
    db.exec("INSERT INTO notes (entry_id) VALUES (99)").await?;
    assert!(db.commit().await.is_err());
    assert_eq!(db.transaction_state().await, TransactionState::Explicit);

    db.rollback().await?;
    assert_eq!(db.transaction_state().await, TransactionState::Auto);
    let notes = db.prepare("SELECT COUNT(*) AS n FROM notes").first_value("n").await?;
    assert_eq!(notes, Some(SqlValue::Int(0)));
    Ok(())
}

#[tokio::test]
async fn begin_inside_savepoint_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let db = counter_db(ShimOptions::in_memory()).await?;
    db.exec("SAVEPOINT outer_work").await?;
    assert_eq!(db.transaction_state().await, TransactionState::Explicit);
    db.exec("INSERT INTO entries (label) VALUES ('kept')").await?;

    assert!(matches!(db.exec("BEGIN").await, Err(OrmError::Transaction(_))));
    assert!(matches!(db.begin().await, Err(OrmError::Transaction(_))));
    assert_eq!(db.transaction_state().await, TransactionState::Explicit);

    db.exec("RELEASE outer_work").await?;
    assert_eq!(db.transaction_state().await, TransactionState::Auto);
    assert_eq!(count(&db).await?, 1);
    Ok(())
}
