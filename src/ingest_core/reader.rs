//! CSV extract reader: decodes legacy-encoded survey files into layout-tagged rows

use super::extractor::RawRow;
use encoding_rs::{SHIFT_JIS, UTF_8};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ReaderError {
    MissingInput(PathBuf),
    Io(std::io::Error),
    Csv(csv::Error),
}

impl From<std::io::Error> for ReaderError {
    fn from(err: std::io::Error) -> Self {
        ReaderError::Io(err)
    }
}

impl From<csv::Error> for ReaderError {
    fn from(err: csv::Error) -> Self {
        ReaderError::Csv(err)
    }
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::MissingInput(p) => write!(f, "Missing input: {}", p.display()),
            ReaderError::Io(e) => write!(f, "IO error: {}", e),
            ReaderError::Csv(e) => write!(f, "CSV error: {}", e),
        }
    }
}

impl std::error::Error for ReaderError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsvEncoding {
    #[default]
    ShiftJis,
    Utf8,
}

impl CsvEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsvEncoding::ShiftJis => "shift_jis",
            CsvEncoding::Utf8 => "utf-8",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "shift_jis" | "sjis" | "cp932" | "windows_31j" => Some(CsvEncoding::ShiftJis),
            "utf_8" | "utf8" => Some(CsvEncoding::Utf8),
            _ => None,
        }
    }

    /// Decode to text; malformed sequences become U+FFFD and a leading BOM is dropped
    pub fn decode(&self, bytes: &[u8]) -> String {
        let encoding = match self {
            CsvEncoding::ShiftJis => SHIFT_JIS,
            CsvEncoding::Utf8 => UTF_8,
        };
        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            log::warn!("⚠️  Malformed {} sequences replaced while decoding", self.as_str());
        }
        text.into_owned()
    }
}

pub struct CsvFileReader {
    path: PathBuf,
    layout: String,
    encoding: CsvEncoding,
    skip_lines: usize,
}

impl CsvFileReader {
    pub fn new(path: impl Into<PathBuf>, layout: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            layout: layout.into(),
            encoding: CsvEncoding::default(),
            skip_lines: 0,
        }
    }

    pub fn with_encoding(mut self, encoding: CsvEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Preamble lines (titles, notes) before the header row
    pub fn with_skip_lines(mut self, skip_lines: usize) -> Self {
        self.skip_lines = skip_lines;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &str {
        &self.layout
    }

    pub fn read(&self) -> Result<Vec<RawRow>, ReaderError> {
        if !self.path.exists() {
            return Err(ReaderError::MissingInput(self.path.clone()));
        }

        let bytes = std::fs::read(&self.path)?;
        let text = self.encoding.decode(&bytes);
        let rows = self.parse_text(&text)?;

        log::info!(
            "📖 Read {} rows from {} ({}, layout {})",
            rows.len(),
            self.path.display(),
            self.encoding.as_str(),
            self.layout
        );
        Ok(rows)
    }

    /// Parse already-decoded CSV text; rows that fail to parse are skipped
    pub fn parse_text(&self, text: &str) -> Result<Vec<RawRow>, ReaderError> {
        let body: String = text
            .lines()
            .skip(self.skip_lines)
            .collect::<Vec<_>>()
            .join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    log::debug!("Skipping malformed line {} in {}: {}", idx + 2, self.path.display(), e);
                    continue;
                }
            };

            let mut row = RawRow::new(self.layout.clone());
            for (name, value) in headers.iter().zip(record.iter()) {
                row.fields.insert(name.to_string(), value.to_string());
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "平成24年経済センサス-活動調査\n\
        単位：事業所\n\
        地域コード,産業分類コード,産業分類,表章項目,値\n\
        11100,56,各種商品小売業,事業所数,\"1,234\"\n\
        11203,50,各種商品卸売業,事業所数,77\n";

    fn create_test_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_shift_jis_with_preamble() {
        let (encoded, _, _) = SHIFT_JIS.encode(SAMPLE);
        let file = create_test_file(&encoded);

        let rows = CsvFileReader::new(file.path(), "census_2012")
            .with_skip_lines(2)
            .read()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].layout, "census_2012");
        assert_eq!(rows[0].fields["地域コード"], "11100");
        assert_eq!(rows[0].fields["産業分類"], "各種商品小売業");
        assert_eq!(rows[0].fields["値"], "1,234");
        assert_eq!(rows[1].fields["産業分類コード"], "50");
    }

    #[test]
    fn test_reads_utf8() {
        let file = create_test_file(SAMPLE.as_bytes());

        let rows = CsvFileReader::new(file.path(), "census_2012")
            .with_encoding(CsvEncoding::Utf8)
            .with_skip_lines(2)
            .read()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].fields["表章項目"], "事業所数");
    }

    #[test]
    fn test_missing_file_is_missing_input() {
        let reader = CsvFileReader::new("/nonexistent/retail_2012.csv", "census_2012");
        assert!(matches!(reader.read(), Err(ReaderError::MissingInput(_))));
    }

    #[test]
    fn test_short_rows_keep_present_fields() {
        let reader = CsvFileReader::new("inline.csv", "commerce_2007");
        let rows = reader.parse_text("a,b,c\n1,2\n").unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.len(), 2);
        assert!(!rows[0].fields.contains_key("c"));
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!(CsvEncoding::from_str("Shift_JIS"), Some(CsvEncoding::ShiftJis));
        assert_eq!(CsvEncoding::from_str("cp932"), Some(CsvEncoding::ShiftJis));
        assert_eq!(CsvEncoding::from_str("UTF-8"), Some(CsvEncoding::Utf8));
        assert_eq!(CsvEncoding::from_str("latin1"), None);
    }
}
