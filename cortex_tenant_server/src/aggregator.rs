//! Reducing per-tenant outcomes to the single response returned to the client.
use bytes::Bytes;
use hyper::StatusCode;
use tracing::{debug, error};

use crate::{
    dispatcher::DispatchResult,
    forwarder::{ForwardError, RequestContext, UpstreamResponse},
};

/// Decide the response for a request whose partitions produced `results`.
///
/// * Any transport-class failure yields a 500 carrying the error text of the first one.
/// * Otherwise, the first non-2xx downstream response is passed through unchanged.
/// * Otherwise the request succeeded, and an empty 200 is returned.
///
/// Every failure is logged, not only the one selected.
pub fn aggregate(ctx: &RequestContext, results: Vec<(String, DispatchResult)>) -> UpstreamResponse {
    let total = results.len();
    let mut ok = 0;
    let mut failed: Option<ForwardError> = None;
    let mut rejected: Option<UpstreamResponse> = None;

    for (tenant, result) in results {
        match result {
            Err(e) => {
                error!(
                    src = %ctx.source,
                    req_id = %ctx.request_id,
                    %tenant,
                    error = %e,
                    "downstream write failed"
                );
                if failed.is_none() {
                    failed = Some(e);
                }
            }
            Ok(resp) if !resp.is_success() => {
                error!(
                    src = %ctx.source,
                    req_id = %ctx.request_id,
                    %tenant,
                    status = resp.status.as_u16(),
                    body = %String::from_utf8_lossy(&resp.body),
                    "downstream rejected write"
                );
                if rejected.is_none() {
                    rejected = Some(resp);
                }
            }
            Ok(_) => ok += 1,
        }
    }

    debug!(
        src = %ctx.source,
        req_id = %ctx.request_id,
        requests = total,
        requests_ok = ok,
        "downstream writes complete"
    );

    if let Some(e) = failed {
        return UpstreamResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: Bytes::from(e.to_string()),
        };
    }

    rejected.unwrap_or(UpstreamResponse {
        status: StatusCode::OK,
        body: Bytes::new(),
    })
}
