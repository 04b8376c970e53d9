//! Shared HTTP plumbing for provider adapters.

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::Serialize;

use crate::types::ByteStream;
use crate::{GatewayError, Result};

/// Build a header map, rejecting names or values that are not valid HTTP.
pub(crate) fn header_map<'a, I>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| GatewayError::Configuration(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| GatewayError::Configuration(format!("invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// POST a JSON body and fail on any non-2xx status.
///
/// Connection failures and timeouts surface as [`GatewayError::Transport`];
/// error statuses surface as [`GatewayError::Upstream`] carrying the body.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    headers: HeaderMap,
    body: &B,
) -> Result<Response> {
    let response = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;
    check_status(response).await
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Upstream {
        status: status.as_u16(),
        body,
    })
}

/// Read a unary response body as JSON.
pub(crate) async fn read_json(response: Response) -> Result<serde_json::Value> {
    response.json().await.map_err(|e| {
        if e.is_decode() {
            GatewayError::Stream(format!("invalid JSON from upstream: {e}"))
        } else {
            GatewayError::Transport(e.to_string())
        }
    })
}

/// Expose the response body as a forward-only chunk stream.
///
/// The connection is released when the stream is exhausted or dropped.
pub(crate) fn byte_stream(response: Response) -> ByteStream {
    Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| GatewayError::Stream(e.to_string()))),
    )
}
