//! Definition of the GraphQL API.

use juniper::EmptySubscription;

use self::{
    mutation::Mutation,
    query::Query,
};

pub(crate) mod err;
pub(crate) mod model;

mod context;
mod mutation;
mod query;

pub(crate) use self::context::Context;


/// Creates and returns the API root node.
pub(crate) fn root_node() -> RootNode {
    RootNode::new(Query, Mutation, EmptySubscription::new())
}

/// Type of our API root node.
pub(crate) type RootNode = juniper::RootNode<'static, Query, Mutation, EmptySubscription<Context>>;


#[cfg(test)]
mod tests {
    use super::root_node;

    // The schema in GraphQL schema language is what API consumers build
    // against, so the exact field shapes (including nullability) are part of
    // the public contract.
    #[test]
    fn schema_exposes_expected_operations() {
        let schema = root_node().as_sdl();

        assert!(schema.contains("type Post {"));
        assert!(schema.contains("id: Int!"));
        assert!(schema.contains("title: String!"));
        assert!(schema.contains("body: String!"));
        assert!(schema.contains("published: Boolean!"));

        // `drafts` guarantees a (possibly empty) list while `posts` is
        // allowed to be absent entirely.
        assert!(schema.contains("drafts: [Post!]!"));
        assert!(schema.contains("posts: [Post!]"));
        assert!(!schema.contains("posts: [Post!]!"));

        assert!(schema.contains("createDraft(title: String!, body: String!): Post!"));
        assert!(schema.contains("publish(draftId: Int!): Post"));
        assert!(!schema.contains("publish(draftId: Int!): Post!"));
    }
}
