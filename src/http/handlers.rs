use hyper::{Body, Method, StatusCode};
use juniper::http::GraphQLBatchRequest;
use std::{
    mem,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{api, db::Transaction, prelude::*};
use super::{Context, Request, Response, response};


/// This is the main HTTP entry point, called for each incoming request.
pub(super) async fn handle(req: Request<Body>, ctx: Arc<Context>) -> Response {
    super::log::req::log(&req);
    if ctx.config.log.log_http_headers {
        super::log::headers::log(&req);
    }

    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/');

    match path {
        // The GraphQL endpoint. This is the only path for which POST is
        // allowed.
        "/graphql" if method == Method::POST => handle_api(req, &ctx).await,

        // From this point on, we only support GET and HEAD requests. All
        // others will result in 405.
        _ if method != Method::GET && method != Method::HEAD => {
            Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header("Content-Type", "text/plain; charset=UTF-8")
                .body(Body::from("405 Method not allowed"))
                .unwrap()
        }

        // The interactive GraphQL API explorer/IDE. We keep this in
        // production as it does not hurt and in particular: does not expose
        // any information that isn't already exposed by the API itself.
        "/graphiql" => graphiql(),

        "" => index(&ctx),

        path => reply_404(&method, path),
    }
}

/// Replies with a tiny plain text page naming this Quill instance. Quill has
/// no frontend of its own, so this is mostly useful to check that the server
/// is up.
fn index(ctx: &Context) -> Response {
    let body = format!(
        "{} – powered by Quill.\n\nThe GraphQL API is served at /graphql.\n",
        ctx.config.general.site_title,
    );
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; charset=UTF-8")
        .body(Body::from(body))
        .unwrap()
}

fn graphiql() -> Response {
    let html = juniper::http::graphiql::graphiql_source("/graphql", None);
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=UTF-8")
        .body(Body::from(html))
        .unwrap()
}

/// Replies with a 404 Not Found.
fn reply_404(method: &Method, path: &str) -> Response {
    debug!("Responding with 404 to {:?} '{}'", method, path);
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "text/plain; charset=UTF-8")
        .body(Body::from("404 Not found"))
        .unwrap()
}

/// Handles a request to `/graphql`.
async fn handle_api(req: Request<Body>, ctx: &Context) -> Response {
    let before = Instant::now();

    // Get a connection for this request.
    let mut connection = match ctx.db_pool.get().await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to obtain DB connection for API request: {}", e);
            return response::service_unavailable();
        }
    };

    let acquire_conn_time = before.elapsed();
    if acquire_conn_time > Duration::from_millis(5) {
        warn!("Acquiring DB connection from pool took {:.2?}", acquire_conn_time);
    }

    let tx = match connection.transaction().await {
        Ok(tx) => tx,
        Err(e) => {
            error!("Failed to start transaction for API request: {}", e);
            return response::internal_server_error();
        }
    };

    // Okay, lets take a deep breath.
    //
    // Unfortunately, `juniper` does not support contexts with a lifetime
    // parameter. However, we'd like to have one SQL transaction per API
    // request. The transaction type (`deadpool_postgres::Transaction`)
    // borrows from the DB connection (`tokio_postgres::Client`) and thus has
    // a lifetime parameter. This makes sense for the API of that library
    // since it statically prevents a number of logic bugs. But it is
    // inconvenient for us.
    //
    // Unfortunately, we think the best solution for us is to use `unsafe`
    // here to just get rid of the lifetime parameter. We can pretend that
    // the lifetime is `'static`. Of course, we then have to make sure that
    // the transaction does not outlive the borrowed connection. We do that
    // by putting the transaction into an `Arc`. That way we can check
    // whether there still exists a reference after the GraphQL execution.
    // The transaction is not `Clone` and `Arc` only gives an immutable
    // reference to the underlying value. So even a buggy resolver could not
    // move the transaction out of the `Arc`.
    //
    // Unfortunately, `connection` is not treated as borrowed after this
    // unsafe block. So we must make sure not to access it at all until we
    // get rid of the transaction (by committing it below).
    type PgTx<'a> = deadpool_postgres::Transaction<'a>;
    let tx = unsafe {
        let static_tx = mem::transmute::<PgTx<'_>, PgTx<'static>>(tx);
        Arc::new(static_tx)
    };

    let api_context = Arc::new(api::Context {
        db: Transaction::new(tx.clone()),
    });
    let out = run_graphql(&ctx.api_root, &api_context, req).await;
    let num_queries = api_context.db.num_queries();
    drop(api_context);

    // Check whether we own the last remaining handle of this Arc.
    let out = match Arc::try_unwrap(tx) {
        Err(_) => {
            // There are still other handles, meaning that a resolver
            // incorrectly stored the transaction in some static variable.
            // This is our fault and should NEVER happen. If it does happen,
            // we would have UB after this function exits. We can't have
            // that. And since panicking only brings down the current thread,
            // we have to reach for more drastic measures.
            error!("FATAL BUG: API handler kept reference to transaction. Ending process.");
            std::process::abort();
        }
        Ok(tx) => {
            match tx.commit().await {
                // If the transaction succeeded we can return the generated
                // response.
                Ok(_) => out,

                Err(e) => {
                    error!("Failed to commit transaction for API request: {}", e);
                    response::service_unavailable()
                }
            }
        }
    };

    debug!(
        "Finished /graphql query in {:.2?} (with {} SQL queries)",
        before.elapsed(),
        num_queries,
    );

    out
}

/// Reads the body of the request, executes the GraphQL request (single or
/// batch) against our schema and builds a JSON response.
async fn run_graphql(
    root_node: &api::RootNode,
    context: &api::Context,
    req: Request<Body>,
) -> Response {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to read body of API request: {e}");
            return response::bad_request(None);
        }
    };

    let gql_request = match serde_json::from_slice::<GraphQLBatchRequest>(&body) {
        Ok(r) => r,
        Err(e) => {
            debug!("Failed to deserialize GraphQL request: {e}");
            return response::bad_request(Some("invalid GraphQL request body"));
        }
    };

    // Errors in here (failed argument coercion, unknown fields, resolver
    // errors) are reported inside the response body; only a request that is
    // not valid GraphQL at all results in a 400.
    let gql_response = gql_request.execute(root_node, context).await;
    let status = if gql_response.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    let json = serde_json::to_string(&gql_response)
        .expect("failed to serialize GraphQL response");

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(json))
        .unwrap()
}
