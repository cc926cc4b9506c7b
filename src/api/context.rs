use crate::db::Transaction;


/// The context that is accessible to every resolver in our API. It carries
/// the database transaction of the current request; resolvers never talk to
/// the database in any other way.
pub(crate) struct Context {
    pub(crate) db: Transaction,
}

impl juniper::Context for Context {}
