//! This module contains a bunch of small inline modules to make it possible
//! to easily filter out individual log messages with our filter system.

use hyper::Body;
use crate::prelude::*;
use super::Request;

pub(super) mod req {
    use super::*;

    pub(crate) fn log(req: &Request<Body>) {
        trace!(
            method = ?req.method(),
            path = req.uri().path_and_query().map_or("", |pq| pq.as_str()),
            "Incoming HTTP request",
        );
    }
}


pub(super) mod headers {
    use super::*;

    pub(crate) fn log(req: &Request<Body>) {
        if tracing::enabled!(tracing::Level::TRACE) {
            let mut out = String::new();
            for (name, value) in req.headers() {
                use std::fmt::Write;
                write!(out, "\n  {}: {}", name, String::from_utf8_lossy(value.as_bytes()))
                    .expect("failed to write into string");
            }
            trace!("HTTP Headers: {}", out);
        }
    }
}
