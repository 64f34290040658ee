//! Parsing and building the FlatBuffers footer of a POD5 file.
//!
//! The footer is the last structured record in a POD5 file. It names the
//! file, records the writing software and format version, and lists the
//! location of every embedded table so that readers can slice the file
//! into its component Arrow streams without scanning.

use std::io::{self, Read, Seek, SeekFrom, Write};

use flatbuffers::{root, InvalidFlatbuffer};
use footer_generated::minknow::reads_format::{
    ContentType, EmbeddedFile, EmbeddedFileArgs, Footer, FooterArgs,
};

#[allow(warnings)] // Ignore warnings from generated file.
pub mod footer_generated;

/// Signature found at the very start and very end of every POD5 file.
pub const FILE_SIGNATURE: [u8; 8] = [0x8b, b'P', b'O', b'D', b'\r', b'\n', 0x1a, b'\n'];

/// Marker written immediately before the FlatBuffers footer.
pub const FOOTER_MAGIC: [u8; 8] = [b'F', b'O', b'O', b'T', b'E', b'R', 0x00, 0x00];

/// Length of the 16-byte section marker repeated between file sections.
pub const SECTION_MARKER_LEN: usize = 16;

/// Bytes that trail the footer itself: footer length (8), section marker
/// (16) and the closing signature (8).
const FOOTER_TRAILER_LEN: usize = 8 + SECTION_MARKER_LEN + FILE_SIGNATURE.len();

#[derive(thiserror::Error, Debug)]
pub enum FooterError {
    #[error("FlatBuffers error: {0}")]
    FlatBuffersError(#[from] InvalidFlatbuffer),

    #[error("Footer IO Error: {0}")]
    FooterIOError(#[from] io::Error),

    #[error("file too short to hold a footer")]
    FileTooShort,

    #[error("footer length {0} does not fit inside the file")]
    BadFooterLength(i64),

    #[error(
        "Missing list of embedded files from footer, footer is likely improperly constructed or pod5 is empty"
    )]
    ContentsMissing,

    #[error("Missing Signal table from POD5")]
    SignalTableMissing,

    #[error("Missing Read table from POD5")]
    ReadTableMissing,

    #[error("Missing Run Info table from POD5")]
    RunInfoTableMissing,
}

/// Location, size and kind of one embedded table.
#[derive(Debug, Clone, Copy)]
pub struct TableInfo {
    offset: i64,
    length: i64,
    content_type: ContentType,
}

impl TableInfo {
    pub fn new(offset: i64, length: i64, content_type: ContentType) -> Self {
        Self {
            offset,
            length,
            content_type,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn length(&self) -> i64 {
        self.length
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Read the whole table section into `buf`, which must be exactly
    /// `length` bytes long.
    pub fn read_to_buf<R: Read + Seek>(&self, reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
        reader.seek(SeekFrom::Start(self.offset as u64))?;
        reader.read_exact(buf)?;
        Ok(())
    }
}

/// An owned copy of the raw footer bytes, parsed on demand.
pub struct ParsedFooter {
    data: Vec<u8>,
}

impl ParsedFooter {
    /// Parse the footer from a full, in-memory (or memory-mapped) POD5
    /// file image.
    pub fn from_file_bytes(bytes: &[u8]) -> Result<Self, FooterError> {
        if bytes.len() < FOOTER_TRAILER_LEN + FILE_SIGNATURE.len() {
            return Err(FooterError::FileTooShort);
        }
        let len_pos = bytes.len() - FOOTER_TRAILER_LEN;
        let flen = i64::from_le_bytes(
            bytes[len_pos..len_pos + 8]
                .try_into()
                .expect("slice is 8 bytes"),
        );
        if flen <= 0 || flen as usize > len_pos {
            return Err(FooterError::BadFooterLength(flen));
        }
        let data = bytes[len_pos - flen as usize..len_pos].to_vec();
        // Parse eagerly so that a malformed footer is reported here.
        root::<Footer>(&data)?;
        Ok(Self { data })
    }

    /// Parse the footer from any seekable reader over a POD5 file.
    pub fn read_footer<R: Read + Seek>(mut reader: R) -> Result<Self, FooterError> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        if (file_len as usize) < FOOTER_TRAILER_LEN + FILE_SIGNATURE.len() {
            return Err(FooterError::FileTooShort);
        }
        reader.seek(SeekFrom::End(-(FOOTER_TRAILER_LEN as i64)))?;
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let flen = i64::from_le_bytes(buf);
        if flen <= 0 || flen as u64 + FOOTER_TRAILER_LEN as u64 > file_len {
            return Err(FooterError::BadFooterLength(flen));
        }
        reader.seek(SeekFrom::End(-(FOOTER_TRAILER_LEN as i64) - flen))?;
        let mut data = vec![0u8; flen as usize];
        reader.read_exact(&mut data)?;
        root::<Footer>(&data)?;
        Ok(Self { data })
    }

    pub fn footer(&self) -> Result<Footer<'_>, FooterError> {
        Ok(root::<Footer>(&self.data)?)
    }

    pub fn file_identifier(&self) -> Result<Option<String>, FooterError> {
        Ok(self.footer()?.file_identifier().map(str::to_string))
    }

    pub fn software(&self) -> Result<Option<String>, FooterError> {
        Ok(self.footer()?.software().map(str::to_string))
    }

    pub fn pod5_version(&self) -> Result<Option<String>, FooterError> {
        Ok(self.footer()?.pod5_version().map(str::to_string))
    }

    pub fn signal_batch_row_count(&self) -> Result<u32, FooterError> {
        Ok(self.footer()?.signal_batch_row_count())
    }

    /// All embedded tables listed by the footer, in footer order.
    pub fn tables(&self) -> Result<Vec<TableInfo>, FooterError> {
        let footer = self.footer()?;
        let contents = footer.contents().ok_or(FooterError::ContentsMissing)?;
        Ok(contents
            .iter()
            .map(|c| TableInfo::new(c.offset(), c.length(), c.content_type()))
            .collect())
    }

    fn find_table(
        &self,
        content_type: ContentType,
        err: FooterError,
    ) -> Result<TableInfo, FooterError> {
        let footer = self.footer()?;
        let contents = footer.contents().ok_or(FooterError::ContentsMissing)?;
        let efile = contents
            .iter()
            .find(|c| c.content_type() == content_type)
            .ok_or(err)?;
        Ok(TableInfo::new(efile.offset(), efile.length(), content_type))
    }

    pub fn read_table(&self) -> Result<TableInfo, FooterError> {
        self.find_table(ContentType::ReadsTable, FooterError::ReadTableMissing)
    }

    pub fn signal_table(&self) -> Result<TableInfo, FooterError> {
        self.find_table(ContentType::SignalTable, FooterError::SignalTableMissing)
    }

    pub fn run_info_table(&self) -> Result<TableInfo, FooterError> {
        self.find_table(ContentType::RunInfoTable, FooterError::RunInfoTableMissing)
    }

    /// The read-id index section, if this file carries one.
    pub fn index_table(&self) -> Result<Option<TableInfo>, FooterError> {
        let footer = self.footer()?;
        let contents = footer.contents().ok_or(FooterError::ContentsMissing)?;
        Ok(contents
            .iter()
            .find(|c| c.content_type() == ContentType::IndexTable)
            .map(|c| TableInfo::new(c.offset(), c.length(), ContentType::IndexTable)))
    }
}

/// Build a new POD5 FlatBuffers footer, used when sealing a file.
pub struct FooterBuilder {
    file_identifier: String,
    software: String,
    version: String,
    signal_batch_row_count: u32,
}

impl FooterBuilder {
    pub fn new(file_identifier: String, software: String, version: String) -> Self {
        Self {
            file_identifier,
            software,
            version,
            signal_batch_row_count: 0,
        }
    }

    pub fn signal_batch_row_count(mut self, rows: u32) -> Self {
        self.signal_batch_row_count = rows;
        self
    }

    /// Serialise the footer record for the given tables.
    pub fn build_footer(&self, tables: &[TableInfo]) -> Vec<u8> {
        let mut builder = flatbuffers::FlatBufferBuilder::new();
        let mut etables = Vec::with_capacity(tables.len());
        for table in tables {
            let efile_args = EmbeddedFileArgs {
                offset: table.offset,
                length: table.length,
                content_type: table.content_type,
                ..Default::default()
            };
            let efile = EmbeddedFile::create(&mut builder, &efile_args);
            etables.push(efile);
        }
        let contents = Some(builder.create_vector(&etables));

        let file_identifier = Some(builder.create_string(&self.file_identifier));
        let software = Some(builder.create_string(&self.software));
        let pod5_version = Some(builder.create_string(&self.version));

        let fbtable = Footer::create(
            &mut builder,
            &FooterArgs {
                file_identifier,
                software,
                pod5_version,
                signal_batch_row_count: self.signal_batch_row_count,
                contents,
            },
        );

        builder.finish_minimal(fbtable);
        builder.finished_data().to_vec()
    }

    /// Write the footer trailer:
    ///
    /// ```text
    /// <footer magic: "FOOTER\000\000">
    /// <footer>
    /// <footer length: 8 bytes little-endian signed integer>
    /// ```
    ///
    /// The caller is responsible for the section marker and the closing
    /// file signature that follow.
    pub fn write_footer<W: Write>(
        &self,
        tables: &[TableInfo],
        writer: &mut W,
    ) -> Result<(), FooterError> {
        writer.write_all(&FOOTER_MAGIC)?;
        let footer = self.build_footer(tables);
        writer.write_all(&footer)?;
        writer.write_all(&(footer.len() as i64).to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_tables() -> Vec<TableInfo> {
        vec![
            TableInfo::new(24, 4096, ContentType::SignalTable),
            TableInfo::new(4136, 2048, ContentType::ReadsTable),
            TableInfo::new(6200, 512, ContentType::RunInfoTable),
            TableInfo::new(6728, 256, ContentType::IndexTable),
        ]
    }

    #[test]
    fn test_build_and_parse() -> eyre::Result<()> {
        let builder = FooterBuilder::new(
            "67e55044-10b1-426f-9247-bb680e5fe0c8".to_string(),
            "pod5-rs".to_string(),
            "0.0.41".to_string(),
        )
        .signal_batch_row_count(100);
        let bytes = builder.build_footer(&sample_tables());

        let footer = root::<Footer>(&bytes)?;
        assert_eq!(
            footer.file_identifier(),
            Some("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
        assert_eq!(footer.software(), Some("pod5-rs"));
        assert_eq!(footer.pod5_version(), Some("0.0.41"));
        assert_eq!(footer.signal_batch_row_count(), 100);
        let contents = footer.contents().unwrap();
        assert_eq!(contents.len(), 4);
        assert_eq!(contents.get(0).content_type(), ContentType::SignalTable);
        assert_eq!(contents.get(0).offset(), 24);
        assert_eq!(contents.get(0).length(), 4096);
        Ok(())
    }

    #[test]
    fn test_footer_trailer_roundtrip() -> eyre::Result<()> {
        let builder = FooterBuilder::new(
            "00000000-0000-0000-0000-000000000000".to_string(),
            "pod5-rs".to_string(),
            "0.0.41".to_string(),
        );

        // Emulate the tail of a sealed file: some leading table bytes,
        // the footer trailer, the section marker and the signature.
        let mut file = vec![0u8; 64];
        builder.write_footer(&sample_tables(), &mut file)?;
        file.extend_from_slice(&[0xab; SECTION_MARKER_LEN]);
        file.extend_from_slice(&FILE_SIGNATURE);

        let parsed = ParsedFooter::from_file_bytes(&file)?;
        assert!(parsed.read_table().is_ok());
        assert!(parsed.signal_table().is_ok());
        assert!(parsed.run_info_table().is_ok());
        assert!(parsed.index_table()?.is_some());

        let parsed = ParsedFooter::read_footer(std::io::Cursor::new(&file))?;
        assert_eq!(parsed.signal_batch_row_count()?, 0);
        Ok(())
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(matches!(
            ParsedFooter::from_file_bytes(&[0u8; 8]),
            Err(FooterError::FileTooShort)
        ));
    }
}
