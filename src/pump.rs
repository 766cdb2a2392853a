//! Executes queued operations against the encoder, fail-fast.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncRead;

use crate::builder::Operation;
use crate::encoder::FormEncoder;
use crate::error::BuildError;

/// Drains the operation queue in order, stopping at the first failure.
///
/// Runs on its own task, concurrent only with the caller's read loop; no two
/// operations ever execute concurrently with each other. On success the
/// closing boundary is written; either way the caller closes the pipe write
/// end afterwards (clean drop or [`crate::pipe::PipeWriter::fail`]).
pub(crate) async fn run(
    ops: Vec<Operation>,
    encoder: &mut FormEncoder,
) -> Result<(), BuildError> {
    for op in ops {
        match op {
            Operation::Field { name, value } => {
                if let Err(source) = encoder.write_field(&name, &value).await {
                    return Err(BuildError::FieldWrite {
                        name,
                        value,
                        source,
                    });
                }
            }
            Operation::ReaderPart {
                field_name,
                file_name,
                mut source,
            } => {
                stream_part(encoder, field_name, file_name, source.as_mut()).await?;
            }
            Operation::FilePart { field_name, path } => {
                let mut file = match File::open(&path).await {
                    Ok(file) => file,
                    Err(source) => {
                        return Err(BuildError::FileOpen {
                            field_name,
                            path,
                            source,
                        });
                    }
                };
                let file_name = display_name(&path);
                // `file` drops before the next operation on every path out
                // of this arm, success or failure.
                stream_part(encoder, field_name, file_name, &mut file).await?;
            }
        }
    }

    encoder
        .finish()
        .await
        .map_err(|source| BuildError::Finalize { source })
}

/// Opens a file part section and streams `reader` into it to exhaustion.
async fn stream_part<R>(
    encoder: &mut FormEncoder,
    field_name: String,
    file_name: String,
    reader: &mut R,
) -> Result<(), BuildError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if let Err(source) = encoder.begin_file_part(&field_name, &file_name).await {
        return Err(BuildError::SectionCreate {
            field_name,
            file_name,
            source,
        });
    }
    if let Err(source) = encoder.copy_from(reader).await {
        return Err(BuildError::Copy {
            field_name,
            file_name,
            source,
        });
    }
    Ok(())
}

/// Display filename for a file-reference part: the path's final component.
fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |name| name.to_string_lossy().into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::display_name;
    use std::path::Path;

    #[test]
    fn display_name_is_final_component() {
        assert_eq!(display_name(Path::new("/tmp/report.txt")), "report.txt");
        assert_eq!(display_name(Path::new("report.txt")), "report.txt");
        assert_eq!(display_name(Path::new("a/b/c.bin")), "c.bin");
    }

    #[test]
    fn display_name_falls_back_to_whole_path() {
        assert_eq!(display_name(Path::new("/")), "/");
    }
}
