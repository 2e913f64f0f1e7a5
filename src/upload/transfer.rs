//! Chunked transfer of the artifact bytes

use crate::error::{Error, Result};
use crate::types::{BuildUploadSession, Event, UploadOperation};
use bytes::Bytes;
use reqwest::Method;
use tokio::sync::broadcast;

/// Byte range `[offset, offset + length)` of `artifact`, if it lies inside it
///
/// The returned chunk shares the artifact's buffer.
fn chunk(artifact: &Bytes, op: &UploadOperation, index: usize) -> Result<Bytes> {
    let invalid = || Error::InvalidUploadOperation {
        index,
        offset: op.offset,
        length: op.length,
        artifact_len: artifact.len() as u64,
    };

    let start = usize::try_from(op.offset).map_err(|_| invalid())?;
    let end = op
        .offset
        .checked_add(op.length)
        .and_then(|end| usize::try_from(end).ok())
        .ok_or_else(invalid)?;

    if end > artifact.len() {
        return Err(invalid());
    }
    Ok(artifact.slice(start..end))
}

/// Send every operation's byte range, in list order
///
/// Chunks go straight to the pre-signed targets with the server-supplied
/// method and headers; no bearer token is attached. There is no retry: the
/// first non-success status aborts the transfer.
pub async fn transfer(
    http: &reqwest::Client,
    session: &BuildUploadSession,
    artifact: &Bytes,
    events: &broadcast::Sender<Event>,
) -> Result<()> {
    let total = session.operations.len();

    for (position, op) in session.operations.iter().enumerate() {
        let index = position + 1;
        let body = chunk(artifact, op, index)?;
        let method = Method::from_bytes(op.method.as_bytes()).map_err(|_| {
            Error::MalformedResponse(format!(
                "upload operation {} has invalid method {:?}",
                index, op.method
            ))
        })?;

        let mut request = http.request(method, &op.url);
        for header in op.request_headers.iter().flatten() {
            request = request.header(header.name.as_str(), header.value.as_str());
        }

        let len = body.len();
        let response = request.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ChunkUploadFailed {
                index,
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(index, total, bytes = len, "uploaded chunk");
        events
            .send(Event::ChunkUploaded {
                index,
                total,
                bytes: op.length,
            })
            .ok();
    }

    tracing::info!(chunks = total, "finished uploading build chunks");
    Ok(())
}
