#![cfg(feature = "sqlite")]

use d1_orm::prelude::*;

async fn seeded() -> Result<D1Shim, OrmError> {
    let db = D1Shim::in_memory().await?;
    db.exec(
        "CREATE TABLE people (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE, age INTEGER);
         INSERT INTO people (name, age) VALUES ('alice', 30);
         INSERT INTO people (name, age) VALUES ('bob', 25);",
    )
    .await?;
    Ok(db)
}

#[tokio::test]
async fn prepare_bind_and_read() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded().await?;

    let result = db
        .prepare("SELECT name, age FROM people WHERE age > ? ORDER BY age")
        .bind(params![20])
        .all()
        .await?;
    assert!(result.success);
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.results[0].get("name"), Some(&SqlValue::Text("bob".into())));
    assert_eq!(result.meta.rows_read, 2);
    assert_eq!(result.meta.rows_written, 0);
    assert_eq!(result.meta.last_row_id, None);
    assert_eq!(
        result.raw(),
        vec![
            vec![SqlValue::Text("bob".into()), SqlValue::Int(25)],
            vec![SqlValue::Text("alice".into()), SqlValue::Int(30)],
        ]
    );

    let row = db
        .prepare("SELECT age FROM people WHERE name = ?")
        .bind(params!["alice"])
        .first()
        .await?
        .expect("alice exists");
    assert_eq!(row.get("age"), Some(&SqlValue::Int(30)));

    let missing = db
        .prepare("SELECT age FROM people WHERE name = ?")
        .bind(params!["carol"])
        .first_value("age")
        .await?;
    assert_eq!(missing, None);
    Ok(())
}

#[tokio::test]
async fn writes_fill_metadata() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded().await?;

    let insert = db
        .prepare("INSERT INTO people (name, age) VALUES (?, ?)")
        .bind(params!["carol", 41])
        .run()
        .await?;
    assert_eq!(insert.meta.last_row_id, Some(3));
    assert_eq!(insert.meta.changes, 1);
    assert_eq!(insert.meta.rows_written, 1);
    assert!(insert.results.is_empty());
    assert!(insert.meta.duration >= 0.0);

    let update = db
        .prepare("UPDATE people SET age = age + 1 WHERE age < ?")
        .bind(params![35])
        .run()
        .await?;
    assert_eq!(update.meta.changes, 2);
    assert_eq!(update.meta.last_row_id, None);

    let json = serde_json::to_value(&update)?;
    assert_eq!(json["success"], true);
    assert_eq!(json["meta"]["changes"], 2);
    assert!(json["results"].as_array().is_some_and(Vec::is_empty));
    Ok(())
}

#[tokio::test]
async fn exec_sums_metadata_across_statements() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded().await?;
    let result = db
        .exec(
            "INSERT INTO people (name) VALUES ('x');
             -- comment; with a semicolon
             INSERT INTO people (name) VALUES ('y; z');
             SELECT COUNT(*) AS n FROM people;",
        )
        .await?;
    assert_eq!(result.meta.changes, 2);
    assert_eq!(result.first().and_then(|r| r.get("n")), Some(&SqlValue::Int(4)));
    Ok(())
}

#[tokio::test]
async fn engine_failures_are_retyped() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded().await?;

    let dup = db
        .prepare("INSERT INTO people (name) VALUES (?)")
        .bind(params!["alice"])
        .run()
        .await;
    assert!(matches!(dup, Err(OrmError::Integrity(_))), "{dup:?}");

    let not_null = db.exec("INSERT INTO people (age) VALUES (1)").await;
    assert!(matches!(not_null, Err(OrmError::Integrity(_))), "{not_null:?}");

    let mismatch = db.prepare("SELECT * FROM people WHERE id = ?").all().await;
    assert!(matches!(mismatch, Err(OrmError::Query(_))), "{mismatch:?}");

    let syntax = db.exec("SELEC nonsense").await;
    assert!(matches!(syntax, Err(OrmError::Execution(_))), "{syntax:?}");
    Ok(())
}

#[tokio::test]
async fn batch_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded().await?;
    let insert = "INSERT INTO people (name) VALUES (?)";

    let results = db
        .batch(vec![
            db.prepare(insert).bind(params!["dave"]).into_bound(),
            db.prepare(insert).bind(params!["erin"]).into_bound(),
        ])
        .await?;
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].meta.last_row_id, Some(4));

    let failed = db
        .batch(vec![
            BoundStatement::new(insert, params!["frank"]),
            BoundStatement::new(insert, params!["alice"]),
        ])
        .await;
    assert!(matches!(failed, Err(OrmError::Integrity(_))));

    let count = db
        .prepare("SELECT COUNT(*) AS n FROM people")
        .first_value("n")
        .await?;
    assert_eq!(count, Some(SqlValue::Int(4)));
    Ok(())
}
