//! Writes an [`ODataResponse`] out to the transport.

use axum::body::Body;
use futures_util::TryStreamExt;
use http::Response;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::error;

use crate::service::request::ODataResponse;

/// Chunk size used when streaming response bodies.
pub const COPY_BUFFER_SIZE: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("failed to read response content: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write response content: {0}")]
    Write(#[source] std::io::Error),
}

/// Copies `reader` into `writer` in [`COPY_BUFFER_SIZE`] chunks and returns
/// the number of bytes copied.
///
/// `writer` is shut down on every path; a failure while shutting down is
/// ignored so it cannot mask the copy result.
///
/// # Errors
///
/// The first read or write failure. The copy is not retried.
pub async fn copy_content<R, W>(reader: &mut R, writer: &mut W) -> Result<u64, MaterializeError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let result = copy_chunks(reader, writer).await;
    let _ = writer.shutdown().await;
    result
}

async fn copy_chunks<R, W>(reader: &mut R, writer: &mut W) -> Result<u64, MaterializeError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buffer).await.map_err(MaterializeError::Read)?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .await
            .map_err(MaterializeError::Write)?;
        total += read as u64;
    }
    writer.flush().await.map_err(MaterializeError::Write)?;
    Ok(total)
}

/// Converts `response` into an axum response.
///
/// The status is copied as is, every header value becomes its own header
/// entry in order, and the body is streamed in [`COPY_BUFFER_SIZE`] chunks.
/// A read failure mid-stream aborts the body; the connection, not the
/// status, reports it.
#[must_use]
pub fn convert_to_http(response: ODataResponse) -> Response<Body> {
    let ODataResponse {
        status,
        headers,
        content,
    } = response;

    let body = match content {
        None => Body::empty(),
        Some(reader) => Body::from_stream(
            ReaderStream::with_capacity(reader, COPY_BUFFER_SIZE).inspect_err(|e| {
                error!(error = %e, "response body stream failed");
            }),
        ),
    };

    let mut out = Response::new(body);
    *out.status_mut() = status;
    let out_headers = out.headers_mut();
    for (name, value) in &headers {
        out_headers.append(name.clone(), value.clone());
    }
    out
}
