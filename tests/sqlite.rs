//! End-to-end tests against an ephemeral in-memory SQLite database. The
//! schema is seeded through `on_database_load`, the same way an embedding
//! application would.

use dbmap::mapper::on_database_load;
use dbmap::{
    connect, Condition, DeleteOptions, FindOptions, IgnoreRule, InsertOptions, MapperConfig,
    MapperError, OrderBy, Record, SaveOptions, SqlType, UpdateManyOptions,
};
use serde_json::{json, Value};

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

fn pages_config() -> MapperConfig {
    let mut config = MapperConfig::new("sqlite://:memory:");
    config.on_database_load = Some(on_database_load(|db| async move {
        db.execute(
            "CREATE TABLE pages (id INTEGER PRIMARY KEY, title VARCHAR(42) NOT NULL)",
            &[],
        )
        .await?;
        Ok(())
    }));
    config
}

async fn pages_mapper() -> dbmap::Mapper {
    connect(pages_config()).await.expect("connect")
}

#[tokio::test]
async fn derives_entity_metadata_from_schema() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity by singular name");
    assert_eq!(pages.name(), "pages");
    assert_eq!(pages.singular_name(), "page");
    assert_eq!(pages.primary_key().name, "id");
    assert!(pages.primary_key().is_auto_increment);
    assert_eq!(pages.columns().len(), 2);
    assert_eq!(pages.columns()[1].name, "title");
    assert_eq!(pages.columns()[1].sql_type, SqlType::Varchar(Some(42)));
    assert!(!pages.columns()[1].nullable);

    // table-name lookup resolves the same entity
    assert!(mapper.entity("pages").is_ok());
    mapper.dispose().await;
}

#[tokio::test]
async fn nullable_columns_survive_introspection() {
    let mut config = MapperConfig::new("sqlite://:memory:");
    config.on_database_load = Some(on_database_load(|db| async move {
        db.execute(
            "CREATE TABLE categories (id INTEGER PRIMARY KEY, description TEXT)",
            &[],
        )
        .await?;
        Ok(())
    }));
    let mapper = connect(config).await.expect("connect");
    let categories = mapper.entity("category").expect("entity");
    assert!(categories.primary_key().is_auto_increment);
    assert!(categories.columns()[1].nullable);
    mapper.dispose().await;
}

#[tokio::test]
async fn insert_then_find_round_trips() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");

    let inserted = pages
        .insert(InsertOptions::one(record(json!({"title": "Hello"}))))
        .await
        .expect("insert");
    assert_eq!(inserted, vec![json!({"id": 1, "title": "Hello"})]);

    let found = pages
        .find(FindOptions {
            criteria: vec![Condition::eq("id", json!(1))],
            ..Default::default()
        })
        .await
        .expect("find");
    assert_eq!(found, inserted);
    mapper.dispose().await;
}

#[tokio::test]
async fn insert_save_find_scenario() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");

    let inserted = pages
        .insert(InsertOptions::one(record(json!({"title": "Hello"}))))
        .await
        .expect("insert");
    assert_eq!(inserted, vec![json!({"id": 1, "title": "Hello"})]);

    let saved = pages
        .save(SaveOptions::new(record(
            json!({"id": 1, "title": "Hello World"}),
        )))
        .await
        .expect("save");
    assert_eq!(saved, json!({"id": 1, "title": "Hello World"}));

    let found = pages
        .find(FindOptions {
            criteria: vec![Condition::eq("id", json!(1))],
            ..Default::default()
        })
        .await
        .expect("find");
    assert_eq!(found, vec![json!({"id": 1, "title": "Hello World"})]);
    mapper.dispose().await;
}

#[tokio::test]
async fn save_without_key_inserts() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    let saved = pages
        .save(SaveOptions::new(record(json!({"title": "fresh"}))))
        .await
        .expect("save");
    assert_eq!(saved, json!({"id": 1, "title": "fresh"}));
    mapper.dispose().await;
}

#[tokio::test]
async fn save_with_unknown_key_is_not_found() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    let err = pages
        .save(SaveOptions::new(record(
            json!({"id": 9999, "title": "ghost"}),
        )))
        .await
        .expect_err("save must fail");
    assert!(matches!(err, MapperError::NotFound(_)), "got {err:?}");

    // nothing was silently inserted
    assert_eq!(pages.count(&vec![]).await.expect("count"), 0);
    mapper.dispose().await;
}

#[tokio::test]
async fn projection_returns_only_requested_fields() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    pages
        .insert(InsertOptions::many(vec![
            record(json!({"title": "one"})),
            record(json!({"title": "two"})),
        ]))
        .await
        .expect("insert");

    let rows = pages
        .find(FindOptions {
            fields: Some(vec!["title".to_string()]),
            ..Default::default()
        })
        .await
        .expect("find");
    assert_eq!(rows.len(), 2);
    for row in rows {
        let obj = row.as_object().expect("row object");
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("title"));
        assert!(!obj.contains_key("id"));
    }
    mapper.dispose().await;
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");

    let err = pages
        .find(FindOptions {
            fields: Some(vec!["nope".to_string()]),
            ..Default::default()
        })
        .await
        .expect_err("projection must fail");
    assert!(matches!(err, MapperError::InvalidField { .. }));

    let err = pages
        .find(FindOptions {
            criteria: vec![Condition::eq("nope", json!(1))],
            ..Default::default()
        })
        .await
        .expect_err("criteria must fail");
    assert!(matches!(err, MapperError::InvalidField { .. }));

    let err = pages
        .insert(InsertOptions::one(record(json!({"nope": 1}))))
        .await
        .expect_err("insert must fail");
    assert!(matches!(err, MapperError::InvalidField { .. }));
    mapper.dispose().await;
}

#[tokio::test]
async fn multi_insert_results_are_positional() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    let rows = pages
        .insert(InsertOptions::many(vec![
            record(json!({"title": "first"})),
            record(json!({"title": "second"})),
            record(json!({"title": "third"})),
        ]))
        .await
        .expect("insert");
    assert_eq!(
        rows,
        vec![
            json!({"id": 1, "title": "first"}),
            json!({"id": 2, "title": "second"}),
            json!({"id": 3, "title": "third"}),
        ]
    );
    mapper.dispose().await;
}

#[tokio::test]
async fn find_supports_order_limit_offset() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    pages
        .insert(InsertOptions::many(vec![
            record(json!({"title": "a"})),
            record(json!({"title": "b"})),
            record(json!({"title": "c"})),
        ]))
        .await
        .expect("insert");

    let rows = pages
        .find(FindOptions {
            order_by: vec![OrderBy::desc("id")],
            limit: Some(2),
            offset: Some(1),
            fields: Some(vec!["title".to_string()]),
            ..Default::default()
        })
        .await
        .expect("find");
    assert_eq!(rows, vec![json!({"title": "b"}), json!({"title": "a"})]);

    // offset without limit still pages correctly
    let rows = pages
        .find(FindOptions {
            order_by: vec![OrderBy::asc("id")],
            offset: Some(2),
            fields: Some(vec!["title".to_string()]),
            ..Default::default()
        })
        .await
        .expect("find");
    assert_eq!(rows, vec![json!({"title": "c"})]);
    mapper.dispose().await;
}

#[tokio::test]
async fn count_ignores_pagination_concerns() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    pages
        .insert(InsertOptions::many(vec![
            record(json!({"title": "x"})),
            record(json!({"title": "y"})),
            record(json!({"title": "x"})),
        ]))
        .await
        .expect("insert");
    assert_eq!(pages.count(&vec![]).await.expect("count"), 3);
    assert_eq!(
        pages
            .count(&vec![Condition::eq("title", json!("x"))])
            .await
            .expect("count"),
        2
    );
    mapper.dispose().await;
}

#[tokio::test]
async fn delete_returns_pre_deletion_rows() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    pages
        .insert(InsertOptions::many(vec![
            record(json!({"title": "keep"})),
            record(json!({"title": "drop"})),
        ]))
        .await
        .expect("insert");

    let deleted = pages
        .delete(DeleteOptions {
            criteria: vec![Condition::eq("title", json!("drop"))],
            fields: None,
        })
        .await
        .expect("delete");
    assert_eq!(deleted, vec![json!({"id": 2, "title": "drop"})]);
    assert_eq!(pages.count(&vec![]).await.expect("count"), 1);

    // zero matches is an empty result, not an error
    let deleted = pages
        .delete(DeleteOptions {
            criteria: vec![Condition::eq("id", json!(12345))],
            fields: None,
        })
        .await
        .expect("delete");
    assert!(deleted.is_empty());
    mapper.dispose().await;
}

#[tokio::test]
async fn update_many_applies_changes_to_matches() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    pages
        .insert(InsertOptions::many(vec![
            record(json!({"title": "draft"})),
            record(json!({"title": "draft"})),
            record(json!({"title": "published"})),
        ]))
        .await
        .expect("insert");

    let updated = pages
        .update_many(UpdateManyOptions {
            criteria: vec![Condition::eq("title", json!("draft"))],
            changes: record(json!({"title": "archived"})),
            fields: None,
        })
        .await
        .expect("update_many");
    assert_eq!(updated.len(), 2);
    for row in &updated {
        assert_eq!(row.get("title"), Some(&json!("archived")));
    }
    assert_eq!(
        pages
            .count(&vec![Condition::eq("title", json!("archived"))])
            .await
            .expect("count"),
        2
    );
    mapper.dispose().await;
}

#[tokio::test]
async fn criteria_operators_compare_and_match_sets() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity");
    pages
        .insert(InsertOptions::many(vec![
            record(json!({"title": "a"})),
            record(json!({"title": "b"})),
            record(json!({"title": "c"})),
        ]))
        .await
        .expect("insert");

    let rows = pages
        .find(FindOptions {
            criteria: vec![Condition::gt("id", json!(1))],
            fields: Some(vec!["title".to_string()]),
            ..Default::default()
        })
        .await
        .expect("find");
    assert_eq!(rows.len(), 2);

    let rows = pages
        .find(FindOptions {
            criteria: vec![Condition::is_in("id", vec![json!(1), json!(3)])],
            fields: Some(vec!["title".to_string()]),
            order_by: vec![OrderBy::asc("id")],
            ..Default::default()
        })
        .await
        .expect("find");
    assert_eq!(rows, vec![json!({"title": "a"}), json!({"title": "c"})]);

    // empty IN list matches nothing
    let rows = pages
        .find(FindOptions {
            criteria: vec![Condition::is_in("id", vec![])],
            ..Default::default()
        })
        .await
        .expect("find");
    assert!(rows.is_empty());
    mapper.dispose().await;
}

#[tokio::test]
async fn ignored_table_is_absent_from_registry() {
    let mut config = pages_config();
    config
        .ignore
        .insert("pages".to_string(), IgnoreRule::Table);
    let mapper = connect(config).await.expect("connect");
    assert!(matches!(
        mapper.entity("page"),
        Err(MapperError::UnknownEntity(_))
    ));
    assert!(matches!(
        mapper.entity("pages"),
        Err(MapperError::UnknownEntity(_))
    ));
    mapper.dispose().await;
}

#[tokio::test]
async fn ignored_columns_are_redacted() {
    let mut config = MapperConfig::new("sqlite://:memory:");
    config.on_database_load = Some(on_database_load(|db| async move {
        db.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, password TEXT)",
            &[],
        )
        .await?;
        Ok(())
    }));
    config.ignore.insert(
        "users".to_string(),
        IgnoreRule::Columns(["password".to_string()].into_iter().collect()),
    );
    let mapper = connect(config).await.expect("connect");
    let users = mapper.entity("user").expect("entity");
    assert!(users.columns().iter().all(|c| c.name != "password"));

    let inserted = users
        .insert(InsertOptions::one(record(json!({"name": "ada"}))))
        .await
        .expect("insert");
    assert_eq!(inserted, vec![json!({"id": 1, "name": "ada"})]);

    let err = users
        .find(FindOptions {
            fields: Some(vec!["password".to_string()]),
            ..Default::default()
        })
        .await
        .expect_err("redacted column must be invisible");
    assert!(matches!(err, MapperError::InvalidField { .. }));
    mapper.dispose().await;
}

#[tokio::test]
async fn auto_timestamps_stamp_on_insert_and_save() {
    let mut config = MapperConfig::new("sqlite://:memory:");
    config.on_database_load = Some(on_database_load(|db| async move {
        db.execute(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, \
             created_at DATETIME, updated_at DATETIME)",
            &[],
        )
        .await?;
        Ok(())
    }));
    let mapper = connect(config).await.expect("connect");
    let posts = mapper.entity("post").expect("entity");

    let inserted = posts
        .insert(InsertOptions::one(record(json!({"title": "t"}))))
        .await
        .expect("insert");
    let row = inserted[0].as_object().expect("row");
    assert!(row.get("created_at").is_some_and(Value::is_string));
    assert!(row.get("updated_at").is_some_and(Value::is_string));
    let first_updated = row.get("updated_at").cloned();

    let saved = posts
        .save(SaveOptions::new(record(json!({"id": 1, "title": "t2"}))))
        .await
        .expect("save");
    let row = saved.as_object().expect("row");
    // created_at untouched, updated_at restamped
    assert_eq!(row.get("created_at"), inserted[0].get("created_at"));
    assert!(row.get("updated_at").is_some_and(Value::is_string));
    assert_ne!(first_updated, None);
    mapper.dispose().await;
}

#[tokio::test]
async fn auto_timestamp_can_be_disabled() {
    let mut config = MapperConfig::new("sqlite://:memory:");
    config.auto_timestamp = false;
    config.on_database_load = Some(on_database_load(|db| async move {
        db.execute(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, created_at DATETIME)",
            &[],
        )
        .await?;
        Ok(())
    }));
    let mapper = connect(config).await.expect("connect");
    let posts = mapper.entity("post").expect("entity");
    let inserted = posts
        .insert(InsertOptions::one(record(json!({"title": "t"}))))
        .await
        .expect("insert");
    assert_eq!(inserted[0].get("created_at"), Some(&Value::Null));
    mapper.dispose().await;
}

#[tokio::test]
async fn dispose_is_idempotent_and_fails_later_operations() {
    let mapper = pages_mapper().await;
    let pages = mapper.entity("page").expect("entity").clone();
    mapper.dispose().await;
    mapper.dispose().await; // second call is a no-op

    let err = pages
        .find(FindOptions::default())
        .await
        .expect_err("operation after dispose must fail");
    assert!(matches!(err, MapperError::ConnectionClosed));

    let err = mapper
        .db
        .execute("SELECT 1", &[])
        .await
        .expect_err("raw query after dispose must fail");
    assert!(matches!(err, MapperError::ConnectionClosed));
}

#[tokio::test]
async fn raw_query_surface_is_exposed() {
    let mapper = pages_mapper().await;
    mapper
        .db
        .execute("INSERT INTO pages (title) VALUES (?)", &[dbmap::SqlValue::Text(Some("raw".into()))])
        .await
        .expect("raw insert");
    let rows = mapper
        .db
        .fetch_all("SELECT title AS title FROM pages", &[])
        .await
        .expect("raw select");
    assert_eq!(rows, vec![json!({"title": "raw"})]);
    mapper.dispose().await;
}

#[tokio::test]
async fn table_without_primary_key_fails_connect() {
    let mut config = MapperConfig::new("sqlite://:memory:");
    config.on_database_load = Some(on_database_load(|db| async move {
        db.execute("CREATE TABLE notes (body TEXT)", &[]).await?;
        Ok(())
    }));
    let err = connect(config).await.expect_err("connect must fail");
    assert!(matches!(err, MapperError::MissingPrimaryKey(table) if table == "notes"));
}

#[tokio::test]
async fn failing_database_load_aborts_connect() {
    let mut config = MapperConfig::new("sqlite://:memory:");
    config.on_database_load = Some(on_database_load(|db| async move {
        db.execute("THIS IS NOT SQL", &[]).await?;
        Ok(())
    }));
    assert!(connect(config).await.is_err());
}

#[tokio::test]
async fn configuration_errors_are_fatal() {
    let err = connect(MapperConfig::new("")).await.expect_err("no dsn");
    assert!(matches!(err, MapperError::MissingConnectionString));

    let err = connect(MapperConfig::new("mssql://localhost/db"))
        .await
        .expect_err("bad scheme");
    assert!(matches!(err, MapperError::UnsupportedDialect(scheme) if scheme == "mssql"));
}
