//! Streaming HTTP multipart/form-data request body builder.
//!
//! # Architecture
//!
//! The crate is organized around a deferred operation queue:
//!
//! - [`MultipartBuilder`] - Accumulates field and file operations, then
//!   finalizes them into a content type plus a readable body
//! - [`BodyStream`] - The body under production; bytes become available as a
//!   background task executes the queued operations
//! - [`BuildError`] - The single, context-wrapped error a failed production
//!   delivers through the body
//!
//! Nothing is buffered up front and nothing touches the filesystem before
//! [`MultipartBuilder::build`]. The builder wires an encoder to a bounded
//! in-memory pipe, spawns a producer task, and hands back the read end
//! immediately. The producer executes operations strictly in queue order and
//! suspends on the pipe's backpressure when the consumer lags, so memory
//! stays bounded regardless of payload size. The first failing operation
//! aborts production; later operations never execute, and the error reaches
//! the consumer from a read rather than from `build`.
//!
//! The body is single-pass and forward-only: no rewinding, seeking, or
//! re-reading. Dropping it early terminates the producer at its next write.
//!
//! # Usage
//!
//! ```no_run
//! use multipart_builder::MultipartBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (content_type, body) = MultipartBuilder::new()
//!     .add_field("field", "value")
//!     .add_reader("reader", "file.bin", std::io::Cursor::new(b"foo bar".to_vec()))
//!     .add_file("file", "path/to/file.bin")
//!     .build();
//!
//! let response = reqwest::Client::new()
//!     .post("https://test.com/")
//!     .header(reqwest::header::CONTENT_TYPE, content_type)
//!     .body(reqwest::Body::wrap_stream(body))
//!     .send()
//!     .await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! Or build the request in one step:
//!
//! ```no_run
//! use multipart_builder::MultipartBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = reqwest::Client::new();
//! let response = MultipartBuilder::new()
//!     .add_field("field", "value")
//!     .build_request(&client, reqwest::Method::POST, "https://test.com/")
//!     .send()
//!     .await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! `build` cannot fail. Consumers must drain the body to end-of-stream and
//! check for an error while doing so: a file-open failure, a source read
//! failure, or an encoder write failure terminates the stream with a
//! [`BuildError`] describing the failing operation. A body that ends in an
//! error is incomplete - the bytes already read do not form a valid
//! multipart payload and carry no closing boundary.

mod builder;
mod encoder;
mod error;
mod pipe;
mod pump;

pub use builder::MultipartBuilder;
pub use error::BuildError;
pub use pipe::BodyStream;
