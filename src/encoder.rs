//! Wire encoding of multipart/form-data sections.
//!
//! Output is byte-compatible with Go's `mime/multipart` writer: each part
//! opens with `--<boundary>\r\n` (preceded by `\r\n` for every part after the
//! first), headers end with a blank line, and the body is terminated by
//! `\r\n--<boundary>--\r\n`.
//!
//! Sequencing contract: at most one section is open at a time. Opening a
//! part assumes the previous one was fully written, and nothing may be
//! written after [`FormEncoder::finish`]. The pump upholds this by executing
//! operations strictly in order.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::pipe::PipeWriter;

/// Random bytes behind the boundary token (rendered as hex, so the token is
/// twice this long).
const BOUNDARY_RAW_BYTES: usize = 30;

/// Read buffer for streaming a source into an open section.
const COPY_BUF_SIZE: usize = 8 * 1024;

pub(crate) struct FormEncoder {
    boundary: String,
    writer: PipeWriter,
    parts_written: usize,
}

impl FormEncoder {
    pub(crate) fn new(writer: PipeWriter) -> Self {
        Self {
            boundary: generate_boundary(),
            writer,
            parts_written: 0,
        }
    }

    /// Content-type header value carrying this encoder's boundary token.
    ///
    /// Fixed before any byte is written; the same instance later writes the
    /// matching trailer, so token and trailer cannot diverge.
    pub(crate) fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Writes a complete text field part. Atomic from the pump's
    /// perspective: a single chunk carries delimiter, headers, and value.
    pub(crate) async fn write_field(&mut self, name: &str, value: &str) -> io::Result<()> {
        let mut part = self.open_part();
        part.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
            escape_quoted(name)
        ));
        part.push_str(value);
        self.writer.write(Bytes::from(part)).await
    }

    /// Opens a file part section. All bytes for the part must go through
    /// [`copy_from`](Self::copy_from) before the next part is opened.
    pub(crate) async fn begin_file_part(
        &mut self,
        field_name: &str,
        file_name: &str,
    ) -> io::Result<()> {
        let mut part = self.open_part();
        part.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            escape_quoted(field_name),
            escape_quoted(file_name)
        ));
        part.push_str("Content-Type: application/octet-stream\r\n\r\n");
        self.writer.write(Bytes::from(part)).await
    }

    /// Streams `source` to exhaustion into the currently open section.
    pub(crate) async fn copy_from<R>(&mut self, source: &mut R) -> io::Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            self.writer.write(Bytes::copy_from_slice(&buf[..n])).await?;
        }
    }

    /// Writes the terminal boundary marker. No writes are legal afterwards.
    pub(crate) async fn finish(&mut self) -> io::Result<()> {
        let trailer = format!("\r\n--{}--\r\n", self.boundary);
        self.writer.write(Bytes::from(trailer)).await
    }

    pub(crate) fn into_writer(self) -> PipeWriter {
        self.writer
    }

    fn open_part(&mut self) -> String {
        let lead = if self.parts_written == 0 {
            format!("--{}\r\n", self.boundary)
        } else {
            format!("\r\n--{}\r\n", self.boundary)
        };
        self.parts_written += 1;
        lead
    }
}

/// 60 lowercase hex characters; nothing in the token needs quoting under the
/// multipart boundary grammar.
fn generate_boundary() -> String {
    (0..BOUNDARY_RAW_BYTES)
        .map(|_| format!("{:02x}", rand::random::<u8>()))
        .collect()
}

/// Escapes `\` and `"` for use inside a quoted-string header parameter.
fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{FormEncoder, escape_quoted, generate_boundary};
    use crate::pipe::{BodyStream, pipe};
    use futures_util::StreamExt;

    async fn drain(mut body: BodyStream) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn boundary_is_sixty_hex_chars() {
        let boundary = generate_boundary();
        assert_eq!(boundary.len(), 60);
        assert!(boundary.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(generate_boundary(), generate_boundary());
    }

    #[test]
    fn escapes_quotes_and_backslashes() {
        assert_eq!(escape_quoted("plain"), "plain");
        assert_eq!(escape_quoted(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_quoted(r"a\b"), r"a\\b");
    }

    #[tokio::test]
    async fn field_part_bytes_are_exact() {
        let (writer, body) = pipe();
        let mut encoder = FormEncoder::new(writer);
        let boundary = encoder.content_type();
        let boundary = boundary
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_string();

        encoder.write_field("name", "value").await.unwrap();
        encoder.finish().await.unwrap();
        drop(encoder);

        let expected = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nvalue\r\n--{boundary}--\r\n"
        );
        assert_eq!(drain(body).await, expected);
    }

    #[tokio::test]
    async fn file_part_headers_declare_filename_and_content_type() {
        let (writer, body) = pipe();
        let mut encoder = FormEncoder::new(writer);

        encoder.begin_file_part("f", "x.bin").await.unwrap();
        let mut source: &[u8] = b"HELLO";
        encoder.copy_from(&mut source).await.unwrap();
        encoder.finish().await.unwrap();
        drop(encoder);

        let text = drain(body).await;
        assert!(text.contains(
            "Content-Disposition: form-data; name=\"f\"; filename=\"x.bin\"\r\nContent-Type: application/octet-stream\r\n\r\nHELLO"
        ));
    }

    #[tokio::test]
    async fn later_parts_open_with_leading_crlf() {
        let (writer, body) = pipe();
        let mut encoder = FormEncoder::new(writer);
        let content_type = encoder.content_type();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_string();

        encoder.write_field("a", "1").await.unwrap();
        encoder.write_field("b", "2").await.unwrap();
        encoder.finish().await.unwrap();
        drop(encoder);

        let text = drain(body).await;
        assert!(text.starts_with(&format!("--{boundary}\r\n")));
        assert!(text.contains(&format!("1\r\n--{boundary}\r\nContent-Disposition")));
        assert!(text.ends_with(&format!("\r\n--{boundary}--\r\n")));
    }

    #[tokio::test]
    async fn empty_form_still_emits_trailer() {
        let (writer, body) = pipe();
        let mut encoder = FormEncoder::new(writer);
        let content_type = encoder.content_type();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_string();

        encoder.finish().await.unwrap();
        drop(encoder);

        assert_eq!(drain(body).await, format!("\r\n--{boundary}--\r\n"));
    }
}
