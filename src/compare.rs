//! Record ordering.

use std::cmp::Ordering;

use crate::collate::ChromOrder;
use crate::record::Record;

/// Rule used to order records with equal sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Equal-key records keep their input order (file order, then line order).
    Stable,
    /// Equal-key records are ordered by their full line, then by input order.
    #[default]
    Verbatim,
}

/// Total order over records: chromosome, primary position, secondary position, then the tie-break rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordOrder {
    chrom_order: ChromOrder,
    tie_break: TieBreak,
}

impl RecordOrder {
    pub fn new(chrom_order: ChromOrder, tie_break: TieBreak) -> Self {
        RecordOrder { chrom_order, tie_break }
    }

    /// Compares record keys only.
    pub fn compare_keys(&self, a: &Record, b: &Record) -> Ordering {
        let (a, b) = (a.key(), b.key());

        self.chrom_order
            .compare(a.chrom, b.chrom)
            .then(a.primary.cmp(&b.primary))
            .then(a.secondary.cmp(&b.secondary))
    }

    /// Compares records.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.compare_keys(a, b).then_with(|| match self.tie_break {
            TieBreak::Stable => a.origin().cmp(&b.origin()),
            TieBreak::Verbatim => a
                .line()
                .cmp(b.line())
                .then_with(|| a.origin().cmp(&b.origin())),
        })
    }
}
