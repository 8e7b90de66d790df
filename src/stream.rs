//! Live view over `multipart/x-mixed-replace`.
//!
//! Each frame becomes one part headed by its content type and length. When
//! the session ends, for whatever reason, exactly one `text/plain`
//! diagnostic part is written and the body ends; nothing is raised past
//! the connection.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::convert::Infallible;

use crate::camera::Frame;
use crate::session::{LiveFeed, StreamEvent};

/// Multipart boundary token.
pub const BOUNDARY: &str = "frame";

/// Response content type for the live view.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Encode one JPEG part.
pub fn encode_frame(frame: &Frame) -> Bytes {
    encode_part("image/jpeg", frame.as_bytes())
}

/// Encode the terminal diagnostic part.
pub fn encode_diagnostic(reason: &str) -> Bytes {
    encode_part("text/plain", format!("Camera error: {}", reason).as_bytes())
}

fn encode_part(content_type: &str, payload: &[u8]) -> Bytes {
    let head = format!(
        "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        content_type,
        payload.len()
    );
    let mut part = BytesMut::with_capacity(head.len() + payload.len() + 2);
    part.put_slice(head.as_bytes());
    part.put_slice(payload);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Drives one live-view connection from a session's [`LiveFeed`].
pub struct StreamPublisher {
    body: BoxStream<'static, Result<Bytes, Infallible>>,
}

impl StreamPublisher {
    /// Publish every frame of `feed` until the session ends.
    pub fn new(feed: LiveFeed) -> Self {
        let body = stream::unfold(Some(feed), |feed| async move {
            let mut feed = feed?;
            let part = match feed.recv().await {
                Some(StreamEvent::Frame(frame)) => {
                    return Some((Ok::<_, Infallible>(encode_frame(&frame)), Some(feed)))
                }
                Some(StreamEvent::Ended(reason)) => encode_diagnostic(&reason),
                None => encode_diagnostic("camera stream closed"),
            };
            log::debug!("Live view of session #{} finished", feed.session_id());
            Some((Ok(part), None))
        });

        Self { body: body.boxed() }
    }

    /// A stream that could not start: one diagnostic part, then the end.
    pub fn failed(reason: impl Into<String>) -> Self {
        let part = encode_diagnostic(&reason.into());
        Self {
            body: stream::once(async move { Ok::<_, Infallible>(part) }).boxed(),
        }
    }

    /// The raw multipart body.
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, Infallible>> {
        self.body
    }

    /// An HTTP response streaming the multipart body.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(self.body));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        response
    }
}
