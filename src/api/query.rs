use juniper::graphql_object;

use super::{
    Context,
    err::ApiResult,
    model::post::Post,
};


/// The root query object.
pub(crate) struct Query;

#[graphql_object(Context = Context)]
impl Query {
    /// Returns all drafts, i.e. posts that are not published yet.
    async fn drafts(context: &Context) -> ApiResult<Vec<Post>> {
        Post::load_drafts(context).await
    }

    /// Returns all published posts.
    async fn posts(context: &Context) -> ApiResult<Option<Vec<Post>>> {
        Post::load_published(context).await.map(Some)
    }
}
