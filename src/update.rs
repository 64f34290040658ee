//! Rewriting files at the current format version.
//!
//! `update` reads a file written at any supported version and rewrites
//! it at [`crate::schema::POD5_VERSION`]. Read identifiers, row order,
//! signal bytes (copied as verbatim compressed chunks) and the file
//! identifier are preserved; the version the data was originally
//! written at is recorded so it stays observable after migration.

use std::path::{Path, PathBuf};

use crate::{
    error::Pod5Error,
    reader::Reader,
    writer::{Writer, WriterOptions},
};

/// Rewrite `input` into `output_dir` under its original file name.
/// Returns the path of the rewritten file.
pub fn update_file(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Result<PathBuf, Pod5Error> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let reader = Reader::open(input)?;
    let name = input
        .file_name()
        .ok_or_else(|| Pod5Error::Io(std::io::Error::other("input has no file name")))?;
    let dest = output_dir.join(name);

    let options = WriterOptions::default()
        .software_name(reader.writing_software().to_string())
        .file_identifier(reader.file_identifier())
        .version_pre_migration(reader.file_version_pre_migration().to_string());
    let options = if reader.signal_batch_row_count() > 0 {
        options.signal_batch_row_count(reader.signal_batch_row_count())
    } else {
        options
    };

    let mut writer = Writer::create(&dest, options)?;
    for batch in reader.read_batches() {
        let batch = batch?;
        for record in batch.reads() {
            writer.add_read_pre_compressed(&record.to_compressed_read()?)?;
        }
        // Keep the source's batch boundaries.
        writer.flush()?;
    }
    writer.close()?;
    Ok(dest)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{schema, test_util};

    #[test]
    fn test_update_preserves_content_and_identity() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("old.pod5");
        let out_dir = dir.path().join("updated");

        let info = test_util::run_info("acq-update");
        let reads = (0..7)
            .map(|n| test_util::read(n, &info, 48))
            .collect::<Vec<_>>();
        let mut writer =
            Writer::create(&src, WriterOptions::default().read_batch_size(3)).unwrap();
        writer.add_reads(&reads).unwrap();
        writer.close().unwrap();
        let source = Reader::open(&src).unwrap();

        let dest = update_file(&src, &out_dir).unwrap();
        let updated = Reader::open(&dest).unwrap();

        assert_eq!(updated.file_identifier(), source.file_identifier());
        assert_eq!(updated.file_version(), schema::POD5_VERSION);
        assert_eq!(
            updated.file_version_pre_migration(),
            source.file_version()
        );
        assert_eq!(updated.batch_count(), source.batch_count());

        let migrated = updated
            .reads()
            .map(|record| record.unwrap().to_read().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(migrated, reads);
    }
}
