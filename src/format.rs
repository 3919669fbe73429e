//! Record file formats.

use std::fmt;
use std::path::Path;

/// Supported record file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Interval records: `chrom start end [rest...]`.
    Bed,
    /// Variant records: a `#` prefixed header followed by `chrom pos [rest...]` rows.
    Vcf,
}

const BED_SUFFIXES: [&str; 2] = [".bed", ".bed.gz"];
const VCF_SUFFIXES: [&str; 3] = [".vcf", ".vcf.gz", ".vcf.bgz"];

impl Format {
    /// Guesses the format from a file name extension.
    pub fn from_path(path: &Path) -> Option<Format> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();

        if VCF_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            Some(Format::Vcf)
        } else if BED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            Some(Format::Bed)
        } else {
            None
        }
    }

    /// Guesses the format from the first line of a file.
    pub fn sniff(first_line: &str) -> Format {
        if first_line.starts_with("##fileformat=VCF") || first_line.starts_with("#CHROM") {
            Format::Vcf
        } else {
            Format::Bed
        }
    }

    /// Whether more than one input of this format can be merged in one run.
    pub fn allows_multiple_inputs(self) -> bool {
        match self {
            Format::Bed => true,
            // headers of several files can't be combined by verbatim copying
            Format::Vcf => false,
        }
    }

    /// Header line marker, if the format has a header block.
    pub fn header_marker(self) -> Option<u8> {
        match self {
            Format::Bed => None,
            Format::Vcf => Some(b'#'),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Bed => write!(f, "bed"),
            Format::Vcf => write!(f, "vcf"),
        }
    }
}
