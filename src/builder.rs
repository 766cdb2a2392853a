//! Builder facade: operation queue accumulation and finalization.

use std::fmt;
use std::path::PathBuf;

use tokio::io::AsyncRead;

use crate::encoder::FormEncoder;
use crate::pipe::{self, BodyStream};
use crate::pump;

/// One deferred unit of work: a single field or file part to be written.
///
/// Nothing executes (no filesystem access, no encoding) until the pump
/// drains the queue after [`MultipartBuilder::build`].
pub(crate) enum Operation {
    /// Write a simple text field.
    Field { name: String, value: String },
    /// Stream a caller-supplied reader into a file part.
    ReaderPart {
        field_name: String,
        file_name: String,
        source: Box<dyn AsyncRead + Send + Unpin>,
    },
    /// Open a path and stream it into a file part named after the path's
    /// final component.
    FilePart { field_name: String, path: PathBuf },
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { name, value } => f
                .debug_struct("Field")
                .field("name", name)
                .field("value", value)
                .finish(),
            Self::ReaderPart {
                field_name,
                file_name,
                ..
            } => f
                .debug_struct("ReaderPart")
                .field("field_name", field_name)
                .field("file_name", file_name)
                .finish_non_exhaustive(),
            Self::FilePart { field_name, path } => f
                .debug_struct("FilePart")
                .field("field_name", field_name)
                .field("path", path)
                .finish(),
        }
    }
}

/// Deferred multipart/form-data request body builder.
///
/// Accumulates an ordered queue of operations, then
/// [`build`](Self::build) wires up the encoder and a bounded pipe, starts
/// the producer task, and returns the content type plus the readable body
/// immediately, before any operation has executed. Insertion order is
/// encoding order; multipart part order is semantically meaningful to
/// servers.
///
/// Methods consume and return `self` for chaining; the compiler enforces
/// the call-once contract of `build`.
#[derive(Debug, Default)]
pub struct MultipartBuilder {
    ops: Vec<Operation>,
}

impl MultipartBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field. Never touches the encoder at call time; any
    /// write failure surfaces from the returned body instead.
    #[must_use]
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(Operation::Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Appends one text field per value across an iterator of
    /// `(name, values)` groups, preserving iteration order.
    #[must_use]
    pub fn add_fields<N, V, I, VS>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (N, VS)>,
        N: Into<String>,
        VS: IntoIterator<Item = V>,
        V: Into<String>,
    {
        for (name, values) in fields {
            let name = name.into();
            for value in values {
                self.ops.push(Operation::Field {
                    name: name.clone(),
                    value: value.into(),
                });
            }
        }
        self
    }

    /// Appends a file part fed from `source`, declared as `file_name`.
    ///
    /// The reader is owned by the operation and read to exhaustion during
    /// body production.
    #[must_use]
    pub fn add_reader(
        mut self,
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        source: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        self.ops.push(Operation::ReaderPart {
            field_name: field_name.into(),
            file_name: file_name.into(),
            source: Box::new(source),
        });
        self
    }

    /// Appends a file part fed from the file at `path`.
    ///
    /// The filesystem is untouched at call time: the open is deferred to
    /// body production, and an open failure surfaces from the returned body
    /// with the field name and path. The declared filename is the path's
    /// final component, not the full path.
    #[must_use]
    pub fn add_file(mut self, field_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.ops.push(Operation::FilePart {
            field_name: field_name.into(),
            path: path.into(),
        });
        self
    }

    /// Finalizes the queue and starts producing the body.
    ///
    /// Returns the `multipart/form-data; boundary=<token>` content type and
    /// the readable body immediately; operations execute on a background
    /// task, in order, stopping at the first failure. `build` itself cannot
    /// fail — every production error is delivered through the body instead.
    /// The content type is always valid even if production later fails.
    ///
    /// Must be called within a tokio runtime (the producer is spawned as a
    /// task). Dropping the body without draining it terminates the producer
    /// at its next write.
    pub fn build(self) -> (String, BodyStream) {
        let (writer, body) = pipe::pipe();
        let mut encoder = FormEncoder::new(writer);
        let content_type = encoder.content_type();

        tokio::spawn(async move {
            if let Err(error) = pump::run(self.ops, &mut encoder).await {
                tracing::debug!(%error, "multipart body production failed");
                encoder.into_writer().fail(error).await;
            }
        });

        (content_type, body)
    }

    /// Convenience wrapper around [`build`](Self::build): returns a request
    /// builder with the content type set and the body wired as a stream.
    pub fn build_request(
        self,
        client: &reqwest::Client,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
    ) -> reqwest::RequestBuilder {
        let (content_type, body) = self.build();
        client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(reqwest::Body::wrap_stream(body))
    }
}

#[cfg(test)]
mod support {
    use crate::error::BuildError;
    use crate::pipe::BodyStream;
    use futures_util::StreamExt;

    /// One decoded part: raw header block and body text.
    pub(super) struct Part {
        pub headers: String,
        pub body: String,
    }

    pub(super) fn boundary_of(content_type: &str) -> &str {
        content_type
            .strip_prefix("multipart/form-data; boundary=")
            .expect("unexpected content type")
    }

    /// Minimal conformant decoder for test bodies: splits on the boundary
    /// delimiters and asserts the closing terminator is present.
    pub(super) fn split_parts(body: &str, boundary: &str) -> Vec<Part> {
        let delimiter = format!("--{boundary}");
        let segments: Vec<&str> = body.split(delimiter.as_str()).collect();
        assert_eq!(
            segments.last().copied(),
            Some("--\r\n"),
            "missing closing terminator"
        );
        segments[1..segments.len() - 1]
            .iter()
            .map(|segment| {
                let segment = segment
                    .strip_prefix("\r\n")
                    .and_then(|s| s.strip_suffix("\r\n"))
                    .expect("part not CRLF-delimited");
                let (headers, body) = segment
                    .split_once("\r\n\r\n")
                    .expect("part missing blank line");
                Part {
                    headers: headers.to_string(),
                    body: body.to_string(),
                }
            })
            .collect()
    }

    pub(super) async fn drain(mut body: BodyStream) -> Result<Vec<u8>, BuildError> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    pub(super) async fn drain_text(body: BodyStream) -> String {
        String::from_utf8(drain(body).await.expect("body production failed"))
            .expect("body not UTF-8")
    }
}


#[cfg(test)]
mod integration_tests {
    use super::MultipartBuilder;
    use super::support::{boundary_of, split_parts};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_streaming_body_through_reqwest() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let response = MultipartBuilder::new()
            .add_field("a", "1")
            .add_reader("f", "x.bin", std::io::Cursor::new(b"HELLO".to_vec()))
            .build_request(
                &client,
                reqwest::Method::POST,
                format!("{}/upload", server.uri()),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];

        let content_type = request
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .expect("content-type header missing");
        let boundary = boundary_of(content_type).to_string();

        let body = String::from_utf8(request.body.clone()).unwrap();
        let parts = split_parts(&body, &boundary);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].body, "1");
        assert_eq!(parts[1].body, "HELLO");
        assert!(parts[1].headers.contains("filename=\"x.bin\""));
    }
}
