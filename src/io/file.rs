//! Input/Output file handling with [`InputFile`] and [`OutputFile`].
//!
//! These types abstract over reading/writing both plaintext and
//! gzip-compressed input/output. Familias exports are plain text, but
//! archived case files are frequently gzipped, so both are read through
//! a common interface.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Write;
use std::io::{self, BufWriter};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;

use crate::cursor::LineStream;
use crate::error::FamError;

/// Check if a file is a gzipped by looking for the magic numbers
fn is_gzipped_file(file_path: impl Into<PathBuf>) -> io::Result<bool> {
    let mut file = File::open(file_path.into())?;
    let mut buffer = [0; 2];
    file.read_exact(&mut buffer)?;

    Ok(buffer == [0x1f, 0x8b])
}

/// Represents an input file.
///
/// This struct is used to handle operations on an input file, such as reading from the file.
/// This abstracts how data is read in, allowing for both plaintext and gzip-compressed input
/// to be read through a common interface.
#[derive(Clone, Debug)]
pub struct InputFile {
    pub filepath: PathBuf,
}

impl InputFile {
    /// Constructs a new `InputFile`.
    ///
    /// # Arguments
    ///
    /// * `filepath` - A string slice that holds the path to the file. If the file is
    ///   gzip-compressed, `InputFile` will automatically uncompress the input.
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    /// Opens the file and returns a buffered reader.
    ///
    /// Compression is detected from the gzip magic number, not the file
    /// extension, so misnamed archives still open.
    pub fn reader(&self) -> Result<BufReader<Box<dyn Read>>, FamError> {
        if !self.filepath.exists() {
            return Err(FamError::ResourceNotFound(self.filepath.clone()));
        }
        let file = File::open(self.filepath.clone())?;
        let is_gzipped = is_gzipped_file(&self.filepath)?;
        let reader: Box<dyn Read> = if is_gzipped {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(BufReader::new(reader))
    }

    /// Read the whole file into a [`LineStream`], stripping the literal
    /// double-quote characters Familias wraps text fields in. No other
    /// escaping exists in the format.
    pub fn read_lines(&self) -> Result<LineStream, FamError> {
        let reader = self.reader()?;
        let mut lines = Vec::new();
        for result in reader.lines() {
            let line = result?;
            lines.push(line.replace('"', "").trim_end().to_string());
        }
        Ok(LineStream::new(lines))
    }
}

enum OutputDestination {
    File(PathBuf),
    Stdout,
}

/// Represents an output file.
///
/// This struct is used to handle operations on an output file, such as writing to the file.
/// This abstracts writing both plaintext and gzip-compressed files.
pub struct OutputFile {
    destination: OutputDestination,
    pub header: Option<Vec<String>>,
}

impl OutputFile {
    /// Constructs a new `OutputFile`.
    ///
    /// # Arguments
    ///
    /// * `filepath` - A string slice that holds the path to the file. If the file extension is
    ///   `.gz`, `OutputFile` will automatically write gzip-compressed output.
    /// * `header` - An optional vector of strings representing commented header lines to be written to the file.
    pub fn new(filepath: impl Into<PathBuf>, header: Option<Vec<String>>) -> Self {
        Self {
            destination: OutputDestination::File(filepath.into()),
            header,
        }
    }

    /// Constructs a new [`OutputFile`] for standard output.
    pub fn new_stdout(header: Option<Vec<String>>) -> Self {
        Self {
            destination: OutputDestination::Stdout,
            header,
        }
    }

    /// Opens the file and returns a writer.
    ///
    /// If the file path ends with ".gz", the file is treated as gzip-compressed, and the
    /// function will handle compression automatically. If a header is set, it will be written
    /// to the file.
    pub fn writer(&self) -> io::Result<Box<dyn Write>> {
        let mut writer: Box<dyn Write> = match &self.destination {
            OutputDestination::File(path) => {
                let is_gzip = path.extension().is_some_and(|ext| ext == "gz");
                if is_gzip {
                    Box::new(BufWriter::new(GzEncoder::new(
                        File::create(path)?,
                        Compression::default(),
                    )))
                } else {
                    Box::new(BufWriter::new(File::create(path)?))
                }
            }
            OutputDestination::Stdout => Box::new(BufWriter::new(io::stdout())),
        };
        // write header if one is set
        if let Some(entries) = &self.header {
            for entry in entries {
                writeln!(writer, "#{}", entry)?;
            }
        }
        Ok(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::InputFile;
    use std::io::Write;

    #[test]
    fn test_read_lines_strips_quotes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\"Output from Familias\"").unwrap();
        writeln!(file, "3").unwrap();
        file.flush().unwrap();

        let lines = InputFile::new(file.path()).read_lines().unwrap();
        assert_eq!(lines.get(1), Some("Output from Familias"));
        assert_eq!(lines.get(2), Some("3"));
        assert_eq!(lines.get(3), None);
    }

    #[test]
    fn test_missing_file_is_resource_error() {
        let result = InputFile::new("no/such/file.fam").read_lines();
        assert!(matches!(
            result,
            Err(crate::error::FamError::ResourceNotFound(_))
        ));
    }
}
