use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::domain::Row;
use crate::error::AtlasError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    /// `.tsv` (optionally gzipped) is tab-delimited, everything else commas.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".tsv") {
            Delimiter::Tab
        } else {
            Delimiter::Comma
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Tab => '\t',
        }
    }
}

pub fn split_row(line: &str, delimiter: Delimiter) -> Row {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
        return Vec::new();
    }
    line.split(delimiter.as_char()).map(str::to_string).collect()
}

/// Forward-only pull stream of rows. No quoting support: embedded delimiters
/// always split. Ends at end of input or at the first empty line. Bytes that
/// are not valid UTF-8 decode to U+FFFD, so a damaged cell reads as zero.
pub struct RowStream<R> {
    reader: R,
    buffer: Vec<u8>,
    delimiter: Delimiter,
    rows_read: usize,
    finished: bool,
}

pub type FileRowStream = RowStream<Box<dyn BufRead + Send>>;

impl FileRowStream {
    pub fn open(path: &Path) -> Result<Self, AtlasError> {
        if !path.exists() {
            return Err(AtlasError::MissingInput(path.to_path_buf()));
        }
        let file = File::open(path)
            .map_err(|err| AtlasError::Filesystem(format!("open {}: {err}", path.display())))?;
        let gzipped = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        let reader: Box<dyn BufRead + Send> = if gzipped {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(RowStream::new(reader, Delimiter::from_path(path)))
    }
}

impl RowStream<Cursor<Vec<u8>>> {
    pub fn from_text(text: &str, delimiter: Delimiter) -> Self {
        RowStream::new(Cursor::new(text.as_bytes().to_vec()), delimiter)
    }
}

impl<R: BufRead> RowStream<R> {
    pub fn new(reader: R, delimiter: Delimiter) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            delimiter,
            rows_read: 0,
            finished: false,
        }
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<R: BufRead> Iterator for RowStream<R> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.finished {
            return None;
        }
        self.buffer.clear();
        let row = match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(0) => Vec::new(),
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.buffer);
                if let Cow::Owned(_) = line {
                    tracing::warn!(row = self.rows_read, "replaced invalid UTF-8 in row");
                }
                let text: &str = &line;
                split_row(text.strip_suffix('\n').unwrap_or(text), self.delimiter)
            }
            Err(err) => {
                tracing::warn!(row = self.rows_read, "stopping stream on read error: {err}");
                Vec::new()
            }
        };
        if row.is_empty() {
            self.finished = true;
            return None;
        }
        self.rows_read += 1;
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn delimiter_from_extension() {
        assert_eq!(Delimiter::from_path(Path::new("a/taxa.csv")), Delimiter::Comma);
        assert_eq!(Delimiter::from_path(Path::new("meta.tsv")), Delimiter::Tab);
        assert_eq!(Delimiter::from_path(Path::new("META.TSV.gz")), Delimiter::Tab);
        assert_eq!(Delimiter::from_path(Path::new("tags")), Delimiter::Comma);
    }

    #[test]
    fn splits_without_quoting() {
        let row = split_row("a,\"b,c\",d\r", Delimiter::Comma);
        assert_eq!(row, vec!["a", "\"b", "c\"", "d"]);
    }

    #[test]
    fn invalid_utf8_cell_keeps_stream_going() {
        let bytes = b"S1,P1,5\nS2,P1,\xff\nS3,P1,4\n".to_vec();
        let rows: Vec<Row> = RowStream::new(Cursor::new(bytes), Delimiter::Comma).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["S2", "P1", "\u{FFFD}"]);
        assert_eq!(rows[2], vec!["S3", "P1", "4"]);
    }

    #[test]
    fn stops_at_empty_line() {
        let rows: Vec<Row> =
            RowStream::from_text("a\tb\nc\td\n\ne\tf\n", Delimiter::Tab).collect();
        assert_eq!(rows, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn two_streams_advance_independently() {
        let mut left = RowStream::from_text("1\n2\n3", Delimiter::Comma);
        let mut right = RowStream::from_text("x\ny", Delimiter::Comma);
        assert_eq!(left.next(), Some(vec!["1".to_string()]));
        assert_eq!(right.next(), Some(vec!["x".to_string()]));
        assert_eq!(left.next(), Some(vec!["2".to_string()]));
        assert_eq!(right.next(), Some(vec!["y".to_string()]));
        assert_eq!(right.next(), None);
        assert!(right.is_finished());
        assert_eq!(left.next(), Some(vec!["3".to_string()]));
        assert_eq!(left.rows_read(), 3);
    }

    #[test]
    fn reads_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.tsv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"sample\tproject\nS1\tP1\n").unwrap();
        encoder.finish().unwrap();

        let rows: Vec<Row> = FileRowStream::open(&path).unwrap().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["S1", "P1"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = FileRowStream::open(Path::new("/nonexistent/taxa.csv")).err();
        assert!(matches!(err, Some(AtlasError::MissingInput(_))));
    }
}
