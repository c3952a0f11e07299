//! `/measure/:kb`: throughput probe for agents.
//!
//! - `GET /measure/0` answers an empty body, for round-trip timing
//! - `GET /measure/500` answers 500 KiB of zeros
//! - `POST /measure/500` accepts exactly 500 KiB
//! - `HEAD` answers headers only
//!
//! Sizes above [`MAX_LENGTH_KB`] are unknown paths.

use poem::http::{Method, StatusCode};
use poem::web::Path;
use poem::{Body, IntoResponse, Request, Response, handler};
use tracing::debug;

use crate::bridge::error::BridgeError;

/// Largest accepted size, in KiB (10 MiB).
pub const MAX_LENGTH_KB: usize = 10 * 1024;

const MAX_LENGTH_BYTES: u64 = MAX_LENGTH_KB as u64 * 1024;

fn content_length(req: &Request) -> Option<u64> {
    req.header("content-length")
        .and_then(|value| value.trim().parse().ok())
}

#[handler]
pub async fn measure(req: &Request, Path(kb): Path<String>, body: Body) -> poem::Result<Response> {
    let kb = match kb.parse::<usize>() {
        Ok(kb) if kb <= MAX_LENGTH_KB => kb,
        _ => return Err(BridgeError::NotFound.into()),
    };
    let declared = content_length(req);
    if declared.is_some_and(|length| length > MAX_LENGTH_BYTES) {
        return Err(BridgeError::PayloadTooLarge.into());
    }

    let bytes = kb * 1024;
    match *req.method() {
        Method::HEAD => Ok(StatusCode::OK.into_response()),
        Method::POST => {
            if declared != Some(bytes as u64) {
                debug!("Measure length mismatch: declared {:?}, path {}", declared, bytes);
                return Err(BridgeError::LengthMismatch.into());
            }
            let received = body
                .into_bytes()
                .await
                .map_err(|e| BridgeError::Internal(format!("failed to read measure body: {}", e)))?;
            debug!("Measure received {} byte(s)", received.len());
            Ok(StatusCode::OK.into_response())
        }
        _ => Ok(Response::builder()
            .content_type("application/octet-stream")
            .body(vec![0u8; bytes])),
    }
}
