//! Tests that need a running PostgreSQL server (configured like in
//! `util/dev-config`). They are `#[ignore]`d so that a plain `cargo test`
//! works everywhere; run them with `cargo test -- --ignored`.

use std::{mem, sync::Arc};

use juniper::graphql_value;

use crate::{api, db::Transaction, prelude::*};
use self::util::TestDb;

mod util;

macro_rules! set {
    ($($e:expr),* $(,)?) => {
        std::collections::HashSet::from([$($e),*])
    };
}


#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running PostgreSQL server"]
async fn migrations_create_empty_posts_table() -> Result<()> {
    let db = TestDb::with_migrations().await?;
    let row = db.query_one("select count(*) from posts", &[]).await?;
    assert_eq!(row.get::<_, i64>(0), 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running PostgreSQL server"]
async fn new_posts_start_as_unpublished_drafts() -> Result<()> {
    let db = TestDb::with_migrations().await?;
    let id = db.add_draft("Nexus", "...").await?;

    let row = db.query_one(
        "select title, body, published from posts where id = $1",
        &[&id],
    ).await?;
    assert_eq!(row.get::<_, String>("title"), "Nexus");
    assert_eq!(row.get::<_, String>("body"), "...");
    assert_eq!(row.get::<_, bool>("published"), false);

    assert_eq!(db.post_ids_where_published(false).await?, set![id]);
    assert_eq!(db.post_ids_where_published(true).await?, set![]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running PostgreSQL server"]
async fn publish_updates_only_the_given_id() -> Result<()> {
    let db = TestDb::with_migrations().await?;
    let nexus = db.add_draft("Nexus", "...").await?;
    let other = db.add_draft("Other", "...").await?;

    let updated = db.execute(
        "update posts set published = true where id = $1",
        &[&nexus],
    ).await?;
    assert_eq!(updated, 1);

    assert_eq!(db.post_ids_where_published(true).await?, set![nexus]);
    assert_eq!(db.post_ids_where_published(false).await?, set![other]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running PostgreSQL server"]
async fn publish_with_missing_id_changes_nothing() -> Result<()> {
    let db = TestDb::with_migrations().await?;
    let id = db.add_draft("Nexus", "...").await?;

    let updated = db.execute(
        "update posts set published = true where id = $1",
        &[&(id + 1)],
    ).await?;
    assert_eq!(updated, 0);

    assert_eq!(db.post_ids_where_published(false).await?, set![id]);
    assert_eq!(db.post_ids_where_published(true).await?, set![]);

    Ok(())
}


// ===== Tests running against the real GraphQL schema ==========================================

/// Executes GraphQL operations against a temporary test database, one
/// transaction per operation, just like the HTTP handler does.
struct ApiTester {
    pool: deadpool_postgres::Pool,
    root: api::RootNode,
}

impl ApiTester {
    async fn new(db: &TestDb) -> Result<Self> {
        let pool = crate::db::create_pool(db.db_config()).await?;
        Ok(Self { pool, root: api::root_node() })
    }

    async fn run(
        &self,
        query: &str,
    ) -> Result<(juniper::Value, Vec<juniper::ExecutionError<juniper::DefaultScalarValue>>)> {
        let mut connection = self.pool.get().await?;
        let tx = connection.transaction().await?;

        // Same trick as in `http::handlers`: the context must not have a
        // lifetime parameter, so we pretend the transaction is `'static` and
        // verify below that no reference to it survived the execution.
        type PgTx<'a> = deadpool_postgres::Transaction<'a>;
        let tx = unsafe {
            let static_tx = mem::transmute::<PgTx<'_>, PgTx<'static>>(tx);
            Arc::new(static_tx)
        };

        let context = api::Context { db: Transaction::new(tx.clone()) };
        let result = juniper::execute(query, None, &self.root, &juniper::Variables::new(), &context)
            .await
            .map_err(|e| anyhow!("GraphQL execution failed: {e:?}"));
        drop(context);

        let tx = Arc::try_unwrap(tx)
            .unwrap_or_else(|_| panic!("GraphQL execution kept reference to transaction"));
        tx.commit().await?;

        result
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running PostgreSQL server"]
async fn create_and_publish_roundtrip() -> Result<()> {
    let db = TestDb::with_migrations().await?;
    let api = ApiTester::new(&db).await?;

    // Create a draft. The table is fresh, so the assigned id is 1.
    let (value, errors) = api.run(
        r#"mutation { createDraft(title: "Nexus", body: "...") { id title body published } }"#,
    ).await?;
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(value, graphql_value!({
        "createDraft": { "id": 1, "title": "Nexus", "body": "...", "published": false },
    }));

    // The new post is a draft and not a published post.
    let (value, errors) = api.run("{ drafts { id published } posts { id } }").await?;
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(value, graphql_value!({
        "drafts": [{ "id": 1, "published": false }],
        "posts": [],
    }));

    // Publish it: same id, title and body, but now published.
    let (value, errors) = api.run(
        r#"mutation { publish(draftId: 1) { id title body published } }"#,
    ).await?;
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(value, graphql_value!({
        "publish": { "id": 1, "title": "Nexus", "body": "...", "published": true },
    }));

    // The post moved from `drafts` to `posts`.
    let (value, errors) = api.run("{ drafts { id } posts { id title published } }").await?;
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(value, graphql_value!({
        "drafts": [],
        "posts": [{ "id": 1, "title": "Nexus", "published": true }],
    }));

    // And the stored data agrees.
    assert_eq!(db.post_ids_where_published(true).await?, set![1]);
    assert_eq!(db.post_ids_where_published(false).await?, set![]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running PostgreSQL server"]
async fn publish_is_idempotent() -> Result<()> {
    let db = TestDb::with_migrations().await?;
    let api = ApiTester::new(&db).await?;
    let id = db.add_draft("Nexus", "...").await?;

    for _ in 0..2 {
        let (value, errors) = api.run(
            &format!("mutation {{ publish(draftId: {id}) {{ id published }} }}"),
        ).await?;
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(value, graphql_value!({
            "publish": { "id": (id), "published": true },
        }));
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running PostgreSQL server"]
async fn publish_with_missing_id_is_an_error() -> Result<()> {
    let db = TestDb::with_migrations().await?;
    let api = ApiTester::new(&db).await?;
    let id = db.add_draft("Nexus", "...").await?;

    let (value, errors) = api.run(
        &format!("mutation {{ publish(draftId: {}) {{ id }} }}", id + 1),
    ).await?;

    // The error is reported for the `publish` field and the field is null.
    assert_eq!(errors.len(), 1);
    let error = format!("{errors:?}");
    assert!(error.contains("NOT_FOUND"), "unexpected error: {error}");
    assert!(error.contains(&(id + 1).to_string()), "unexpected error: {error}");
    assert_eq!(value, graphql_value!({ "publish": None }));

    // No stored data changed.
    assert_eq!(db.post_ids_where_published(false).await?, set![id]);
    assert_eq!(db.post_ids_where_published(true).await?, set![]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running PostgreSQL server"]
async fn create_draft_requires_title_and_body() -> Result<()> {
    let db = TestDb::with_migrations().await?;
    let api = ApiTester::new(&db).await?;

    // Missing required arguments are rejected by validation, before our
    // resolver runs.
    api.run(r#"mutation { createDraft(title: "No body") { id } }"#).await.unwrap_err();
    api.run(r#"mutation { createDraft(body: "No title") { id } }"#).await.unwrap_err();

    let row = db.query_one("select count(*) from posts", &[]).await?;
    assert_eq!(row.get::<_, i64>(0), 0);

    Ok(())
}
