//! Pairwise alignment between a reference and a query sequence.

use crate::error::{PostAlignError, Result};
use crate::iupac::ScoringScheme;
use crate::position::{CoordinateMap, UngappedPos};
use crate::sequence::Sequence;
use serde::Serialize;

/// One column of a pairwise alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlignedPair {
    Match {
        reference: UngappedPos,
        query: UngappedPos,
    },
    /// Reference position with no query counterpart.
    Deletion { reference: UngappedPos },
    /// Query position with no reference counterpart.
    Insertion { query: UngappedPos },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    Insertion,
    Deletion,
}

impl AlignedPair {
    pub fn reference(&self) -> Option<UngappedPos> {
        match self {
            AlignedPair::Match { reference, .. } | AlignedPair::Deletion { reference } => {
                Some(*reference)
            }
            AlignedPair::Insertion { .. } => None,
        }
    }

    pub fn query(&self) -> Option<UngappedPos> {
        match self {
            AlignedPair::Match { query, .. } | AlignedPair::Insertion { query } => Some(*query),
            AlignedPair::Deletion { .. } => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, AlignedPair::Match { .. })
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, AlignedPair::Deletion { .. })
    }

    pub fn is_insertion(&self) -> bool {
        matches!(self, AlignedPair::Insertion { .. })
    }

    pub fn gap_kind(&self) -> Option<GapKind> {
        match self {
            AlignedPair::Match { .. } => None,
            AlignedPair::Deletion { .. } => Some(GapKind::Deletion),
            AlignedPair::Insertion { .. } => Some(GapKind::Insertion),
        }
    }

    fn from_raw(reference: Option<usize>, query: Option<usize>) -> Result<Self> {
        let as_pos = |side: &str, p: usize| {
            UngappedPos::new(p)
                .ok_or_else(|| PostAlignError::malformed(format!("{side} position 0 is not 1-based")))
        };
        match (reference, query) {
            (Some(r), Some(q)) => Ok(AlignedPair::Match {
                reference: as_pos("reference", r)?,
                query: as_pos("query", q)?,
            }),
            (Some(r), None) => Ok(AlignedPair::Deletion {
                reference: as_pos("reference", r)?,
            }),
            (None, Some(q)) => Ok(AlignedPair::Insertion {
                query: as_pos("query", q)?,
            }),
            (None, None) => Err(PostAlignError::malformed("pair has both sides gapped")),
        }
    }
}

/// Maximal run of consecutive gap pairs of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapRun {
    pub kind: GapKind,
    /// Index of the first pair of the run.
    pub start: usize,
    pub len: usize,
}

impl GapRun {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Maximal same-kind gap runs of a pair slice, in order.
pub fn gap_runs(pairs: &[AlignedPair]) -> Vec<GapRun> {
    let mut runs: Vec<GapRun> = Vec::new();
    for (idx, pair) in pairs.iter().enumerate() {
        let Some(kind) = pair.gap_kind() else {
            continue;
        };
        match runs.last_mut() {
            Some(run) if run.kind == kind && run.end() == idx => run.len += 1,
            _ => runs.push(GapRun {
                kind,
                start: idx,
                len: 1,
            }),
        }
    }
    runs
}

/// Column of the gapped rendering. Reference positions the alignment does
/// not pair with anything still get a column, with an empty query side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub reference: Option<UngappedPos>,
    pub query: Option<UngappedPos>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AlignmentStats {
    pub matches: usize,
    pub mismatches: usize,
    pub inserted_bases: usize,
    pub deleted_bases: usize,
    pub reference_coverage: f64,
    pub query_coverage: f64,
}

/// Ordered aligned pairs between a reference and a query.
///
/// Present reference positions strictly increase, present query positions
/// strictly increase, and every position is within its sequence length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    ref_len: usize,
    query_len: usize,
    pairs: Vec<AlignedPair>,
}

impl Alignment {
    pub fn empty(ref_len: usize, query_len: usize) -> Self {
        Self {
            ref_len,
            query_len,
            pairs: Vec::new(),
        }
    }

    /// Build from raw `(reference, query)` pairs of 1-based positions where
    /// `None` marks a gap on that side.
    pub fn build<I>(ref_len: usize, query_len: usize, raw_pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Option<usize>, Option<usize>)>,
    {
        let pairs = raw_pairs
            .into_iter()
            .enumerate()
            .map(|(idx, (r, q))| {
                AlignedPair::from_raw(r, q).map_err(|e| match e {
                    PostAlignError::MalformedAlignment { reason } => {
                        PostAlignError::malformed(format!("pair {}: {}", idx + 1, reason))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_pairs(ref_len, query_len, pairs)
    }

    /// Build from typed pairs, checking order and bounds.
    pub fn from_pairs(ref_len: usize, query_len: usize, pairs: Vec<AlignedPair>) -> Result<Self> {
        let mut last_ref: Option<UngappedPos> = None;
        let mut last_query: Option<UngappedPos> = None;
        for (idx, pair) in pairs.iter().enumerate() {
            if let Some(r) = pair.reference() {
                if r.get() > ref_len {
                    return Err(PostAlignError::malformed(format!(
                        "pair {}: reference position {} beyond length {}",
                        idx + 1,
                        r,
                        ref_len
                    )));
                }
                if last_ref.is_some_and(|last| r <= last) {
                    return Err(PostAlignError::malformed(format!(
                        "pair {}: reference position {} is not increasing",
                        idx + 1,
                        r
                    )));
                }
                last_ref = Some(r);
            }
            if let Some(q) = pair.query() {
                if q.get() > query_len {
                    return Err(PostAlignError::malformed(format!(
                        "pair {}: query position {} beyond length {}",
                        idx + 1,
                        q,
                        query_len
                    )));
                }
                if last_query.is_some_and(|last| q <= last) {
                    return Err(PostAlignError::malformed(format!(
                        "pair {}: query position {} is not increasing",
                        idx + 1,
                        q
                    )));
                }
                last_query = Some(q);
            }
        }
        Ok(Self {
            ref_len,
            query_len,
            pairs,
        })
    }

    /// Build from two rows of a multiple sequence alignment. Columns gapped
    /// in both rows are skipped.
    pub fn from_gapped_rows(reference_row: &[u8], query_row: &[u8]) -> Result<Self> {
        if reference_row.len() != query_row.len() {
            return Err(PostAlignError::malformed(format!(
                "aligned rows differ in length ({} vs {})",
                reference_row.len(),
                query_row.len()
            )));
        }
        let mut ref_pos = 0;
        let mut query_pos = 0;
        let mut raw = Vec::with_capacity(reference_row.len());
        for (&r, &q) in reference_row.iter().zip(query_row) {
            let r = (!crate::sequence::is_gap(r)).then(|| {
                ref_pos += 1;
                ref_pos
            });
            let q = (!crate::sequence::is_gap(q)).then(|| {
                query_pos += 1;
                query_pos
            });
            if r.is_some() || q.is_some() {
                raw.push((r, q));
            }
        }
        Self::build(ref_pos, query_pos, raw)
    }

    pub fn ref_len(&self) -> usize {
        self.ref_len
    }

    pub fn query_len(&self) -> usize {
        self.query_len
    }

    pub fn pairs(&self) -> &[AlignedPair] {
        &self.pairs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AlignedPair> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// First and last reference positions present in the alignment.
    pub fn ref_span(&self) -> Option<(UngappedPos, UngappedPos)> {
        let first = self.pairs.iter().find_map(|p| p.reference())?;
        let last = self.pairs.iter().rev().find_map(|p| p.reference())?;
        Some((first, last))
    }

    /// First and last query positions present in the alignment.
    pub fn query_span(&self) -> Option<(UngappedPos, UngappedPos)> {
        let first = self.pairs.iter().find_map(|p| p.query())?;
        let last = self.pairs.iter().rev().find_map(|p| p.query())?;
        Some((first, last))
    }

    /// Sub-alignment covering reference positions `[ref_start, ref_end)`.
    ///
    /// Insertions are kept only when enclosed by retained reference
    /// positions, and a deletion run that continues past either edge of the
    /// window is dropped entirely.
    pub fn between(&self, ref_start: UngappedPos, ref_end: UngappedPos) -> Alignment {
        let inside = |pair: &AlignedPair| {
            pair.reference()
                .is_some_and(|r| r >= ref_start && r < ref_end)
        };
        let Some(mut start) = self.pairs.iter().position(inside) else {
            return Alignment::empty(self.ref_len, self.query_len);
        };
        let mut end = self
            .pairs
            .iter()
            .rposition(inside)
            .map_or(start + 1, |idx| idx + 1);

        if start > 0 && self.pairs[start].is_deletion() && self.pairs[start - 1].is_deletion() {
            while start < end && self.pairs[start].is_deletion() {
                start += 1;
            }
            while start < end && self.pairs[start].is_insertion() {
                start += 1;
            }
        }
        if end < self.pairs.len()
            && start < end
            && self.pairs[end - 1].is_deletion()
            && self.pairs[end].is_deletion()
        {
            while end > start && self.pairs[end - 1].is_deletion() {
                end -= 1;
            }
            while end > start && self.pairs[end - 1].is_insertion() {
                end -= 1;
            }
        }

        Alignment {
            ref_len: self.ref_len,
            query_len: self.query_len,
            pairs: self.pairs[start..end].to_vec(),
        }
    }

    /// Gapped rendering from the first to the last reference position of
    /// the alignment.
    pub fn columns(&self) -> Vec<Column> {
        let mut columns = Vec::with_capacity(self.pairs.len());
        let mut last_ref: Option<UngappedPos> = None;
        for pair in &self.pairs {
            if let (Some(r), Some(last)) = (pair.reference(), last_ref) {
                let mut missing = last.next();
                while missing < r {
                    columns.push(Column {
                        reference: Some(missing),
                        query: None,
                    });
                    missing = missing.next();
                }
            }
            if let Some(r) = pair.reference() {
                last_ref = Some(r);
            }
            columns.push(Column {
                reference: pair.reference(),
                query: pair.query(),
            });
        }
        columns
    }

    pub fn reference_map(&self) -> CoordinateMap {
        CoordinateMap::from_columns(self.columns().into_iter().map(|c| c.reference))
    }

    pub fn query_map(&self) -> CoordinateMap {
        CoordinateMap::from_columns(self.columns().into_iter().map(|c| c.query))
    }

    /// Gapped reference and query rows over [`Alignment::columns`].
    pub fn gapped_rows(&self, reference: &Sequence, query: &Sequence) -> (Vec<u8>, Vec<u8>) {
        let columns = self.columns();
        let render = |pos: Option<UngappedPos>, seq: &Sequence| {
            pos.and_then(|p| seq.symbol_at(p)).unwrap_or(b'-')
        };
        let ref_row = columns.iter().map(|c| render(c.reference, reference)).collect();
        let query_row = columns.iter().map(|c| render(c.query, query)).collect();
        (ref_row, query_row)
    }

    /// Sum of pair scores over matched columns.
    pub fn match_score(
        &self,
        reference: &Sequence,
        query: &Sequence,
        scoring: &ScoringScheme,
    ) -> f64 {
        score_pairs(&self.pairs, reference, query, scoring)
    }

    pub fn stats(&self, reference: &Sequence, query: &Sequence) -> AlignmentStats {
        let mut stats = AlignmentStats::default();
        for pair in &self.pairs {
            match *pair {
                AlignedPair::Match {
                    reference: r,
                    query: q,
                } => {
                    if reference.symbol_at(r) == query.symbol_at(q) {
                        stats.matches += 1;
                    } else {
                        stats.mismatches += 1;
                    }
                }
                AlignedPair::Deletion { .. } => stats.deleted_bases += 1,
                AlignedPair::Insertion { .. } => stats.inserted_bases += 1,
            }
        }
        let aligned = stats.matches + stats.mismatches;
        if self.ref_len > 0 {
            stats.reference_coverage = aligned as f64 / self.ref_len as f64;
        }
        if self.query_len > 0 {
            stats.query_coverage = aligned as f64 / self.query_len as f64;
        }
        stats
    }

    /// CIGAR string using `M`, `I` and `D` operations.
    pub fn to_cigar(&self) -> String {
        let mut cigar = String::new();
        let mut current: Option<(char, usize)> = None;
        for pair in &self.pairs {
            let op = match pair {
                AlignedPair::Match { .. } => 'M',
                AlignedPair::Insertion { .. } => 'I',
                AlignedPair::Deletion { .. } => 'D',
            };
            current = match current {
                Some((prev, len)) if prev == op => Some((prev, len + 1)),
                Some((prev, len)) => {
                    cigar.push_str(&format!("{len}{prev}"));
                    Some((op, 1))
                }
                None => Some((op, 1)),
            };
        }
        if let Some((op, len)) = current {
            cigar.push_str(&format!("{len}{op}"));
        }
        cigar
    }
}

impl<'a> IntoIterator for &'a Alignment {
    type Item = &'a AlignedPair;
    type IntoIter = std::slice::Iter<'a, AlignedPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

pub(crate) fn score_pairs(
    pairs: &[AlignedPair],
    reference: &Sequence,
    query: &Sequence,
    scoring: &ScoringScheme,
) -> f64 {
    pairs
        .iter()
        .filter_map(|pair| match *pair {
            AlignedPair::Match {
                reference: r,
                query: q,
            } => Some(scoring.score(reference.symbol(r), query.symbol(q))),
            _ => None,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SeqType;

    fn pos(p: usize) -> UngappedPos {
        UngappedPos::new(p).unwrap()
    }

    fn m(r: usize, q: usize) -> AlignedPair {
        AlignedPair::Match {
            reference: pos(r),
            query: pos(q),
        }
    }

    fn d(r: usize) -> AlignedPair {
        AlignedPair::Deletion { reference: pos(r) }
    }

    fn i(q: usize) -> AlignedPair {
        AlignedPair::Insertion { query: pos(q) }
    }

    #[test]
    fn test_build_valid() {
        let aln = Alignment::build(
            4,
            4,
            vec![
                (Some(1), Some(1)),
                (None, Some(2)),
                (Some(2), Some(3)),
                (Some(3), None),
                (Some(4), Some(4)),
            ],
        )
        .unwrap();
        assert_eq!(aln.pairs(), &[m(1, 1), i(2), m(2, 3), d(3), m(4, 4)]);
        assert_eq!(aln.to_cigar(), "1M1I1M1D1M");
    }

    #[test]
    fn test_build_rejects_double_gap() {
        let err = Alignment::build(3, 3, vec![(Some(1), Some(1)), (None, None)]).unwrap_err();
        match err {
            PostAlignError::MalformedAlignment { reason } => {
                assert!(reason.contains("pair 2"));
                assert!(reason.contains("both sides gapped"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_rejects_non_monotonic_and_out_of_range() {
        assert!(Alignment::build(5, 5, vec![(Some(2), Some(1)), (Some(2), Some(2))]).is_err());
        assert!(Alignment::build(5, 5, vec![(Some(1), Some(2)), (Some(2), Some(1))]).is_err());
        assert!(Alignment::build(2, 5, vec![(Some(3), Some(1))]).is_err());
        assert!(Alignment::build(2, 5, vec![(Some(0), Some(1))]).is_err());
    }

    #[test]
    fn test_from_gapped_rows() {
        let aln = Alignment::from_gapped_rows(b"AC-GT-", b"A-TGT-").unwrap();
        assert_eq!(aln.ref_len(), 4);
        assert_eq!(aln.query_len(), 4);
        assert_eq!(aln.pairs(), &[m(1, 1), d(2), i(2), m(3, 3), m(4, 4)]);
        assert!(Alignment::from_gapped_rows(b"ACG", b"AC").is_err());
    }

    #[test]
    fn test_between_drops_boundary_insertions() {
        // I at both edges of the window [2, 4)
        let aln = Alignment::from_pairs(5, 7, vec![m(1, 1), i(2), m(2, 3), m(3, 4), i(5), m(4, 6), m(5, 7)])
            .unwrap();
        let sub = aln.between(pos(2), pos(4));
        assert_eq!(sub.pairs(), &[m(2, 3), m(3, 4)]);
    }

    #[test]
    fn test_between_keeps_enclosed_gaps() {
        let aln = Alignment::from_pairs(6, 6, vec![m(1, 1), m(2, 2), i(3), d(3), m(4, 4), m(5, 5), m(6, 6)])
            .unwrap();
        let sub = aln.between(pos(2), pos(6));
        assert_eq!(sub.pairs(), &[m(2, 2), i(3), d(3), m(4, 4), m(5, 5)]);
    }

    #[test]
    fn test_between_drops_crossing_deletion_run() {
        let aln = Alignment::from_pairs(8, 4, vec![m(1, 1), d(2), d(3), d(4), m(5, 2), m(6, 3), d(7), d(8)])
            .unwrap();
        // window starts inside the deletion run 2..=4 and ends inside 7..=8
        let sub = aln.between(pos(3), pos(8));
        assert_eq!(sub.pairs(), &[m(5, 2), m(6, 3)]);
        // a deletion run fully inside the window is kept
        let sub = aln.between(pos(2), pos(7));
        assert_eq!(sub.pairs(), &[d(2), d(3), d(4), m(5, 2), m(6, 3)]);
    }

    #[test]
    fn test_between_outside_is_empty() {
        let aln = Alignment::from_pairs(10, 2, vec![m(1, 1), m(2, 2)]).unwrap();
        let sub = aln.between(pos(5), pos(9));
        assert!(sub.is_empty());
        assert_eq!(sub.ref_len(), 10);
    }

    #[test]
    fn test_columns_fill_absent_reference_positions() {
        let aln = Alignment::from_pairs(6, 3, vec![m(2, 1), i(2), m(5, 3)]).unwrap();
        let columns = aln.columns();
        let refs: Vec<Option<usize>> = columns.iter().map(|c| c.reference.map(|p| p.get())).collect();
        assert_eq!(refs, vec![Some(2), None, Some(3), Some(4), Some(5)]);

        let reference = Sequence::new("r", "", b"ACGTAC", SeqType::Nucleotide).unwrap();
        let query = Sequence::new("q", "", b"CTA", SeqType::Nucleotide).unwrap();
        let (ref_row, query_row) = aln.gapped_rows(&reference, &query);
        assert_eq!(ref_row, b"C-GTA");
        assert_eq!(query_row, b"CT--A");

        let qmap = aln.query_map();
        assert_eq!(qmap.ungapped_to_gapped(pos(3)).map(|g| g.0), Some(4));
        let rmap = aln.reference_map();
        assert_eq!(rmap.gapped_to_ungapped(crate::position::GappedIndex(1)), None);
    }

    #[test]
    fn test_gap_runs() {
        let pairs = vec![m(1, 1), d(2), d(3), i(2), i(3), m(4, 4), d(5)];
        let runs = gap_runs(&pairs);
        assert_eq!(runs.len(), 3);
        assert_eq!((runs[0].kind, runs[0].start, runs[0].len), (GapKind::Deletion, 1, 2));
        assert_eq!((runs[1].kind, runs[1].start, runs[1].len), (GapKind::Insertion, 3, 2));
        assert_eq!((runs[2].kind, runs[2].start, runs[2].len), (GapKind::Deletion, 6, 1));
    }

    #[test]
    fn test_stats_and_score() {
        let reference = Sequence::new("r", "", b"ACGT", SeqType::Nucleotide).unwrap();
        let query = Sequence::new("q", "", b"ACTTG", SeqType::Nucleotide).unwrap();
        let aln = Alignment::from_pairs(4, 5, vec![m(1, 1), m(2, 2), m(3, 3), i(4), m(4, 5)]).unwrap();
        let stats = aln.stats(&reference, &query);
        assert_eq!(stats.matches, 2);
        assert_eq!(stats.mismatches, 2);
        assert_eq!(stats.inserted_bases, 1);
        assert!((stats.reference_coverage - 1.0).abs() < 1e-9);
        assert!((stats.query_coverage - 0.8).abs() < 1e-9);
        let score = aln.match_score(&reference, &query, &ScoringScheme::default());
        assert!((score - 0.0).abs() < 1e-9);
    }
}
