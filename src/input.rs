//! Decompressing input reader.
//!
//! Presents any number of input sources as a single stream of lines. Each source is inspected by content and
//! wrapped into a decompressing stream if one of the registered [`Codec`]s recognizes its leading bytes.

use std::fmt;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use flate2::bufread::MultiGzDecoder;
use log;

/// Input reading error.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// Source can't be opened, read or decoded.
    #[error("failed to read {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: io::Error,
    },
    /// Malformed record.
    #[error(transparent)]
    Parse(#[from] crate::record::ParseError),
}

impl InputError {
    fn io(source: &InputSource, error: io::Error) -> Self {
        InputError::Io {
            source_name: source.to_string(),
            error,
        }
    }
}

/// Input data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Regular file.
    Path(PathBuf),
    /// Process standard input.
    Stdin,
}

impl InputSource {
    /// Returns the file path if the source is a file.
    pub fn path(&self) -> Option<&Path> {
        match self {
            InputSource::Path(path) => Some(path),
            InputSource::Stdin => None,
        }
    }
}

impl From<&str> for InputSource {
    /// `-` stands for the standard input.
    fn from(arg: &str) -> Self {
        if arg == "-" {
            InputSource::Stdin
        } else {
            InputSource::Path(PathBuf::from(arg))
        }
    }
}

impl From<PathBuf> for InputSource {
    fn from(path: PathBuf) -> Self {
        InputSource::Path(path)
    }
}

impl From<&Path> for InputSource {
    fn from(path: &Path) -> Self {
        InputSource::Path(path.to_path_buf())
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Path(path) => write!(f, "{}", path.display()),
            InputSource::Stdin => write!(f, "<stdin>"),
        }
    }
}

/// Decompressing stream capability.
pub trait Codec: Send + Sync {
    /// Codec name used in logs.
    fn name(&self) -> &'static str;

    /// Checks whether the stream leading bytes belong to this codec.
    fn matches(&self, magic: &[u8]) -> bool;

    /// Wraps a raw stream into a decompressing one.
    fn wrap<'a>(&self, reader: Box<dyn BufRead + 'a>) -> Box<dyn BufRead + 'a>;
}

/// Gzip codec. Multi-member streams (including BGZF) are decoded up to the last member.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// leading bytes handed to `Codec::matches`
const PEEK_LEN: usize = 16;

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn matches(&self, magic: &[u8]) -> bool {
        magic.starts_with(&GZIP_MAGIC)
    }

    fn wrap<'a>(&self, reader: Box<dyn BufRead + 'a>) -> Box<dyn BufRead + 'a> {
        Box::new(io::BufReader::new(MultiGzDecoder::new(reader)))
    }
}

/// Opens input sources detecting their compression by content.
pub struct InputOpener {
    codecs: Vec<Box<dyn Codec>>,
    buf_size: Option<usize>,
}

impl InputOpener {
    /// Creates an opener without any codec registered.
    pub fn plain() -> Self {
        InputOpener {
            codecs: Vec::new(),
            buf_size: None,
        }
    }

    /// Registers an additional codec.
    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codecs.push(Box::new(codec));
        return self;
    }

    /// Sets the read buffer size.
    pub fn with_buf_size(mut self, buf_size: usize) -> Self {
        self.buf_size = Some(buf_size);
        return self;
    }

    /// Opens the source as a buffered line stream.
    pub fn open(&self, source: &InputSource) -> io::Result<Box<dyn BufRead>> {
        let raw: Box<dyn Read> = match source {
            InputSource::Path(path) => Box::new(fs::File::open(path)?),
            InputSource::Stdin => Box::new(io::stdin()),
        };
        self.decode(source, raw)
    }

    /// Reads the leading bytes of a raw stream and wraps it into the codec recognizing them, if any.
    fn decode<'a>(&self, source: &InputSource, mut raw: Box<dyn Read + 'a>) -> io::Result<Box<dyn BufRead + 'a>> {
        // a single read may return fewer bytes than the magic takes, pipes do that
        let mut magic = Vec::with_capacity(PEEK_LEN);
        raw.by_ref().take(PEEK_LEN as u64).read_to_end(&mut magic)?;

        let codec = self.codecs.iter().find(|codec| codec.matches(&magic));
        let stream = io::Cursor::new(magic).chain(raw);
        let reader: Box<dyn BufRead + 'a> = match self.buf_size {
            Some(buf_size) => Box::new(io::BufReader::with_capacity(buf_size, stream)),
            None => Box::new(io::BufReader::new(stream)),
        };

        return Ok(match codec {
            Some(codec) => {
                log::debug!("reading {} as {} stream", source, codec.name());
                codec.wrap(reader)
            }
            None => reader,
        });
    }
}

impl Default for InputOpener {
    fn default() -> Self {
        InputOpener::plain().with_codec(GzipCodec)
    }
}

/// Record origin: input index in the command line order and 1-based line number within that input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "memory-limit", derive(deepsize::DeepSizeOf))]
pub struct Origin {
    pub file: u32,
    pub line: u64,
}

/// Single input line without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub origin: Origin,
    pub text: Vec<u8>,
}

/// Concatenated line stream over multiple input sources.
///
/// Sources are opened lazily in order, so at most one of them is open at a time.
pub struct InputLines<'a> {
    opener: &'a InputOpener,
    sources: &'a [InputSource],
    current: Option<Box<dyn BufRead>>,
    file_idx: usize,
    line_no: u64,
    failed: bool,
}

impl<'a> InputLines<'a> {
    pub fn new(opener: &'a InputOpener, sources: &'a [InputSource]) -> Self {
        InputLines {
            opener,
            sources,
            current: None,
            file_idx: 0,
            line_no: 0,
            failed: false,
        }
    }

    fn read_line(&mut self) -> Result<Option<Line>, InputError> {
        let sources = self.sources;
        while self.file_idx < sources.len() {
            let source = &sources[self.file_idx];
            if self.current.is_none() {
                log::debug!("opening input {}", source);
                self.current = Some(self.opener.open(source).map_err(|err| InputError::io(source, err))?);
                self.line_no = 0;
            }

            if let Some(reader) = self.current.as_mut() {
                let mut text = Vec::new();
                let read = reader
                    .read_until(b'\n', &mut text)
                    .map_err(|err| InputError::io(source, err))?;

                if read > 0 {
                    if text.last() == Some(&b'\n') {
                        text.pop();
                    }
                    self.line_no += 1;
                    return Ok(Some(Line {
                        origin: Origin {
                            file: self.file_idx as u32,
                            line: self.line_no,
                        },
                        text,
                    }));
                }
            }

            log::debug!("input {} exhausted ({} lines)", source, self.line_no);
            self.current = None;
            self.file_idx += 1;
        }

        return Ok(None);
    }
}

impl<'a> Iterator for InputLines<'a> {
    type Item = Result<Line, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_line() {
            Ok(line) => line.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::{self, prelude::*};
    use std::path::PathBuf;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use rstest::*;

    use super::{Codec, InputError, InputLines, InputOpener, InputSource, Origin};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn write_plain(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn write_gzip(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
        path
    }

    fn read_with(opener: &InputOpener, sources: &[InputSource]) -> Vec<(Origin, String)> {
        InputLines::new(opener, sources)
            .map(|line| line.map(|line| (line.origin, String::from_utf8(line.text).unwrap())))
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn read_all(sources: &[InputSource]) -> Vec<(Origin, String)> {
        read_with(&InputOpener::default(), sources)
    }

    /// Yields at most one byte per read call.
    struct Trickle<R>(R);

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    /// Streams prefixed with a `BANNER` line carrying an upper-cased payload.
    struct BannerCodec;

    impl Codec for BannerCodec {
        fn name(&self) -> &'static str {
            "banner"
        }

        fn matches(&self, magic: &[u8]) -> bool {
            magic.starts_with(b"BANNER\n")
        }

        fn wrap<'a>(&self, mut reader: Box<dyn BufRead + 'a>) -> Box<dyn BufRead + 'a> {
            let mut content = Vec::new();
            reader.read_to_end(&mut content).unwrap();
            let payload = content[b"BANNER\n".len()..].to_ascii_lowercase();
            Box::new(io::Cursor::new(payload))
        }
    }

    #[rstest]
    fn test_concatenates_in_order(tmp_dir: tempfile::TempDir) {
        let a = write_plain(&tmp_dir, "a.bed", "chr1\t1\t2\nchr1\t3\t4\n");
        let empty = write_plain(&tmp_dir, "empty.bed", "");
        let b = write_plain(&tmp_dir, "b.bed", "chr2\t5\t6");

        let lines = read_all(&[a.into(), empty.into(), b.into()]);

        assert_eq!(
            lines,
            vec![
                (Origin { file: 0, line: 1 }, "chr1\t1\t2".to_string()),
                (Origin { file: 0, line: 2 }, "chr1\t3\t4".to_string()),
                (Origin { file: 2, line: 1 }, "chr2\t5\t6".to_string()),
            ]
        );
    }

    #[rstest]
    fn test_gzip_detected_by_content(tmp_dir: tempfile::TempDir) {
        let content = "chr1\t1\t2\r\nchr3\t7\t8\n";
        // misleading extensions on purpose
        let compressed = write_gzip(&tmp_dir, "data.bed", content);
        let plain = write_plain(&tmp_dir, "data.bed.gz", content);

        assert_eq!(read_all(&[compressed.into()]), read_all(&[plain.into()]));
    }

    #[rstest]
    fn test_multi_member_gzip(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("multi.gz");
        let mut file = fs::File::create(&path).unwrap();
        for chunk in ["a\n", "b\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(chunk.as_bytes()).unwrap();
            file.write_all(&encoder.finish().unwrap()).unwrap();
        }
        drop(file);

        let lines: Vec<String> = read_all(&[path.into()]).into_iter().map(|(_, text)| text).collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_gzip_detected_on_short_reads() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"chr1\t1\t2\nchr2\t3\t4\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let opener = InputOpener::default();
        let mut reader = opener
            .decode(&InputSource::Stdin, Box::new(Trickle(io::Cursor::new(compressed))))
            .unwrap();

        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "chr1\t1\t2\nchr2\t3\t4\n");
    }

    #[test]
    fn test_short_plain_stream_kept_whole() {
        let opener = InputOpener::default();
        let mut reader = opener
            .decode(&InputSource::Stdin, Box::new(Trickle(io::Cursor::new(b"\x1f".to_vec()))))
            .unwrap();

        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"\x1f");
    }

    #[rstest]
    fn test_registered_codec_selected_by_content(tmp_dir: tempfile::TempDir) {
        let encoded = write_plain(&tmp_dir, "encoded.bed", "BANNER\nCHR1\t1\t2\n");
        let plain = write_plain(&tmp_dir, "plain.bed", "CHR1\t1\t2\n");
        let opener = InputOpener::plain().with_codec(BannerCodec);

        assert_eq!(
            read_with(&opener, &[encoded.into(), plain.into()]),
            vec![
                (Origin { file: 0, line: 1 }, "chr1\t1\t2".to_string()),
                (Origin { file: 1, line: 1 }, "CHR1\t1\t2".to_string()),
            ]
        );
    }

    #[rstest]
    fn test_invalid_utf8_passes_through(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("latin1.bed");
        fs::write(&path, b"chr2\t1\t2\tgene\xe9\n").unwrap();

        let opener = InputOpener::default();
        let sources = [InputSource::from(path)];
        let lines: Vec<Vec<u8>> = InputLines::new(&opener, &sources).map(|line| line.unwrap().text).collect();

        assert_eq!(lines, vec![b"chr2\t1\t2\tgene\xe9".to_vec()]);
    }

    #[rstest]
    fn test_corrupt_gzip_is_an_error(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("broken.gz");
        fs::write(&path, [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef]).unwrap();

        let opener = InputOpener::default();
        let sources = [InputSource::from(path)];
        let result: Result<Vec<_>, _> = InputLines::new(&opener, &sources).collect();

        assert!(matches!(result, Err(InputError::Io { .. })));
    }

    #[rstest]
    fn test_missing_file_is_an_error(tmp_dir: tempfile::TempDir) {
        let opener = InputOpener::default();
        let sources = [InputSource::from(tmp_dir.path().join("missing.bed"))];
        let mut lines = InputLines::new(&opener, &sources);

        let err = lines.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("missing.bed"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_stdin_argument() {
        assert_eq!(InputSource::from("-"), InputSource::Stdin);
        assert_eq!(InputSource::from("a.bed"), InputSource::Path(PathBuf::from("a.bed")));
    }
}
