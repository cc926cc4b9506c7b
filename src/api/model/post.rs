use futures::TryStreamExt;
use juniper::graphql_object;
use tokio_postgres::Row;

use crate::{
    api::{Context, err::{ApiResult, not_found}},
    db::util::dbargs,
};


/// A blog post. Every post starts out as an unpublished draft and is made
/// publicly visible by publishing it, exactly once. There is no way back.
pub(crate) struct Post {
    id: i32,
    title: String,
    body: String,
    published: bool,
}

#[graphql_object(Context = Context)]
impl Post {
    /// The unique ID of this post, assigned by the database on creation.
    fn id(&self) -> i32 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn body(&self) -> &str {
        &self.body
    }

    /// Whether this post is publicly visible.
    fn published(&self) -> bool {
        self.published
    }
}

impl Post {
    const COL_NAMES: &'static str = "id, title, body, published";

    fn from_row(row: Row) -> Self {
        Self {
            id: row.get(0),
            title: row.get(1),
            body: row.get(2),
            published: row.get(3),
        }
    }

    /// Loads all posts that are not published yet.
    pub(crate) async fn load_drafts(context: &Context) -> ApiResult<Vec<Self>> {
        Self::load_where_published(false, context).await
    }

    /// Loads all published posts.
    pub(crate) async fn load_published(context: &Context) -> ApiResult<Vec<Self>> {
        Self::load_where_published(true, context).await
    }

    async fn load_where_published(published: bool, context: &Context) -> ApiResult<Vec<Self>> {
        let posts = context.db
            .query_raw(
                &format!(
                    "select {} from posts where published = $1",
                    Self::COL_NAMES,
                ),
                dbargs![&published],
            )
            .await?
            .map_ok(Self::from_row)
            .try_collect()
            .await?;

        Ok(posts)
    }

    /// Inserts a new post. The id is assigned by the database, `published` is
    /// always false initially.
    pub(crate) async fn create_draft(
        title: String,
        body: String,
        context: &Context,
    ) -> ApiResult<Self> {
        let row = context.db
            .query_one(
                &format!(
                    "insert into posts (title, body, published) \
                        values ($1, $2, false) \
                        returning {}",
                    Self::COL_NAMES,
                ),
                &[&title, &body],
            )
            .await?;

        Ok(Self::from_row(row))
    }

    /// Marks the post with the given id as published, as a single update
    /// statement. A second `publish` for the same post just re-affirms the
    /// published state.
    pub(crate) async fn publish(draft_id: i32, context: &Context) -> ApiResult<Self> {
        context.db
            .query_opt(
                &format!(
                    "update posts set published = true where id = $1 returning {}",
                    Self::COL_NAMES,
                ),
                &[&draft_id],
            )
            .await?
            .map(Self::from_row)
            .ok_or_else(|| not_found!(
                key = "post.does-not-exist",
                "post with id {} does not exist",
                draft_id,
            ))
    }
}
