//! Error taxonomy for body production.

use std::io;
use std::path::PathBuf;

/// Failure of a single deferred operation during body production.
///
/// At most one error is produced per build: production stops at the first
/// failing operation and the error is delivered exactly once through the
/// returned [`crate::BodyStream`], never from
/// [`crate::MultipartBuilder::build`] itself.
///
/// Every variant carries enough context (which field, which file, which
/// phase) to identify the failing operation without inspecting the partial
/// body.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Writing a simple text field failed.
    #[error("failed to write field {name}={value}: {source}")]
    FieldWrite {
        name: String,
        value: String,
        source: io::Error,
    },

    /// The encoder refused to open a new file part section.
    #[error("failed to create form file {field_name} ({file_name}): {source}")]
    SectionCreate {
        field_name: String,
        file_name: String,
        source: io::Error,
    },

    /// Byte transfer from the caller-supplied source into an open section
    /// failed partway.
    #[error("failed to copy form file {field_name} ({file_name}): {source}")]
    Copy {
        field_name: String,
        file_name: String,
        source: io::Error,
    },

    /// The source file for a file-reference part could not be opened.
    /// No section is created for the part in this case.
    #[error("failed to open file {field_name} ({}): {source}", path.display())]
    FileOpen {
        field_name: String,
        path: PathBuf,
        source: io::Error,
    },

    /// Writing the closing boundary failed.
    #[error("failed to close multipart writer: {source}")]
    Finalize { source: io::Error },
}
