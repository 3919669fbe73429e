//! Chromosome name collations.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Chromosome name ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChromOrder {
    /// Version ordering: digit runs are compared by numeric value, so `chr2` sorts before `chr10`.
    /// Runs starting with a zero are treated as fractional parts, the same way GNU `strverscmp` does.
    #[default]
    Natural,
    /// Plain byte-wise ordering.
    Lexical,
}

impl ChromOrder {
    /// Compares two chromosome names.
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            ChromOrder::Natural => version_cmp(a.as_bytes(), b.as_bytes()),
            ChromOrder::Lexical => a.as_bytes().cmp(b.as_bytes()),
        }
    }
}

// scanner states
const S_N: usize = 0;
const S_I: usize = 3;
const S_F: usize = 6;
const S_Z: usize = 9;

// result kinds, anything else is a final answer
const CMP: i8 = 2;
const LEN: i8 = 3;

#[rustfmt::skip]
const NEXT_STATE: [usize; 12] = [
    // other  digit  zero
    S_N,      S_I,   S_Z,  // S_N
    S_N,      S_I,   S_I,  // S_I
    S_N,      S_F,   S_F,  // S_F
    S_N,      S_F,   S_Z,  // S_Z
];

#[rustfmt::skip]
const RESULT_TYPE: [i8; 36] = [
    // x/x  x/d  x/0  d/x  d/d  d/0  0/x  0/d  0/0
    CMP,    CMP, CMP, CMP, LEN, CMP, CMP, CMP, CMP,  // S_N
    CMP,    -1,  -1,  1,   LEN, LEN, 1,   LEN, LEN,  // S_I
    CMP,    CMP, CMP, CMP, CMP, CMP, CMP, CMP, CMP,  // S_F
    CMP,    1,   1,   -1,  CMP, CMP, -1,  CMP, CMP,  // S_Z
];

#[inline]
fn byte_at(s: &[u8], idx: usize) -> u8 {
    s.get(idx).copied().unwrap_or(0)
}

#[inline]
fn class(c: u8) -> usize {
    (c == b'0') as usize + c.is_ascii_digit() as usize
}

/// Version comparison of two byte strings with `strverscmp` semantics.
pub fn version_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let mut c1 = byte_at(a, 0);
    let mut c2 = byte_at(b, 0);
    let mut idx = 1;
    let mut state = S_N + class(c1);

    while c1 == c2 {
        if c1 == 0 {
            return Ordering::Equal;
        }
        state = NEXT_STATE[state];
        c1 = byte_at(a, idx);
        c2 = byte_at(b, idx);
        idx += 1;
        state += class(c1);
    }

    let diff = c1.cmp(&c2);
    match RESULT_TYPE[state * 3 + class(c2)] {
        CMP => diff,
        LEN => {
            // the longer digit run is the larger number
            let (mut i, mut j) = (idx, idx);
            loop {
                let digit = byte_at(a, i).is_ascii_digit();
                i += 1;
                if !digit {
                    break;
                }
                let digit = byte_at(b, j).is_ascii_digit();
                j += 1;
                if !digit {
                    return Ordering::Greater;
                }
            }
            if byte_at(b, j).is_ascii_digit() {
                Ordering::Less
            } else {
                diff
            }
        }
        fixed => fixed.cmp(&0),
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rstest::*;

    use super::{version_cmp, ChromOrder};

    #[rstest]
    #[case("chr2", "chr10", Ordering::Less)]
    #[case("2", "10", Ordering::Less)]
    #[case("10", "9", Ordering::Greater)]
    #[case("chr1", "chr1", Ordering::Equal)]
    #[case("chr1", "chr1_random", Ordering::Less)]
    #[case("chr9", "chrX", Ordering::Less)]
    #[case("1", "X", Ordering::Less)]
    #[case("X", "Y", Ordering::Less)]
    #[case("chrUn_gl000220", "chrUn_gl000211", Ordering::Greater)]
    #[case("", "1", Ordering::Less)]
    fn test_natural_order(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(ChromOrder::Natural.compare(a, b), expected);
        assert_eq!(ChromOrder::Natural.compare(b, a), expected.reverse());
    }

    #[test]
    fn test_leading_zero_runs() {
        let ordered = ["000", "00", "01", "010", "09", "0", "1", "9", "10"];
        for pair in ordered.windows(2) {
            assert_eq!(
                version_cmp(pair[0].as_bytes(), pair[1].as_bytes()),
                Ordering::Less,
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[rstest]
    #[case("chr2", "chr10", Ordering::Greater)]
    #[case("chr1", "chr2", Ordering::Less)]
    #[case("chrX", "chrX", Ordering::Equal)]
    fn test_lexical_order(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(ChromOrder::Lexical.compare(a, b), expected);
    }

    #[test]
    fn test_natural_sort_of_names() {
        let mut names = vec!["chr10", "chrX", "chr2", "chr1", "chrM", "chr22", "chr1_random"];
        names.sort_by(|a, b| ChromOrder::Natural.compare(a, b));
        assert_eq!(names, vec!["chr1", "chr1_random", "chr2", "chr10", "chr22", "chrM", "chrX"]);
    }
}
