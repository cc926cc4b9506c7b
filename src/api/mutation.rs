use juniper::graphql_object;

use super::{
    Context,
    err::ApiResult,
    model::post::Post,
};


/// The root mutation object.
pub(crate) struct Mutation;

#[graphql_object(Context = Context)]
impl Mutation {
    /// Creates a new post. The new post always starts out as unpublished
    /// draft; its id is assigned by the database.
    async fn create_draft(title: String, body: String, context: &Context) -> ApiResult<Post> {
        Post::create_draft(title, body, context).await
    }

    /// Publishes the post with the given id and returns it. Publishing is a
    /// one-way transition: there is no way to turn a published post back
    /// into a draft. Errors if no post with the given id exists.
    async fn publish(draft_id: i32, context: &Context) -> ApiResult<Option<Post>> {
        Post::publish(draft_id, context).await.map(Some)
    }
}
