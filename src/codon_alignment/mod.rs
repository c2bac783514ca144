//! Codon-aware realignment of indels.
//!
//! Gap runs in the coding part of an alignment are moved, merged or split so
//! that each one covers whole codons of the reference reading frame:
//!
//! 1. unaligned ends of the coding part are removed;
//! 2. misplaced runs are slid through neighbouring matches to the nearest
//!    codon-aligned placement that does not lower the match score;
//! 3. whole-codon runs without such a placement take the best-scoring aligned
//!    placement inside the window;
//! 4. what remains is regrouped codon by codon, dropping frameshifted bases;
//! 5. the ends are stripped again and the result is verified.
//!
//! The non-coding prefix (reference offsets before the frame start) is never
//! touched.

mod rebuild;
mod shift;

use crate::alignment::{gap_runs, score_pairs, AlignedPair, Alignment, GapKind, GapRun};
use crate::error::{PostAlignError, Result};
use crate::iupac::ScoringScheme;
use crate::position::{ReadingFrame, UngappedPos};
use crate::sequence::{SeqType, Sequence};
use log::debug;
use serde::Serialize;

/// Which placement wins when two candidates are equally good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    Left,
    Right,
}

/// Configuration parameters for codon alignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodonAlignConfig {
    /// 0-based reference offset of the first codon
    pub frame_start: usize,
    /// Maximum distance a gap run may be shifted, in codons
    pub window_size: usize,
    pub scoring: ScoringScheme,
    pub tie_break: TieBreak,
}

impl Default for CodonAlignConfig {
    fn default() -> Self {
        Self {
            frame_start: 0,
            window_size: 5,
            scoring: ScoringScheme::default(),
            tie_break: TieBreak::Left,
        }
    }
}

impl CodonAlignConfig {
    pub fn frame(&self) -> ReadingFrame {
        ReadingFrame::new(self.frame_start)
    }
}

/// Query bases removed from the alignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub query_positions: Vec<usize>,
    pub symbols: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Leading,
    Trailing,
}

/// What the engine did to one query, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodonNote {
    /// A gap run was moved by `distance` pairs (negative is leftwards).
    Shift {
        kind: GapKind,
        ref_offset: usize,
        length: usize,
        distance: isize,
        merged: bool,
        /// Whether the new placement scores at least as well as the old one.
        equivalent: bool,
        score_delta: f64,
    },
    /// A codon with three or more query bases was re-paired.
    Realigned {
        codon: usize,
        inserted: usize,
        score_delta: f64,
    },
    FrameshiftDeletion {
        codon: usize,
        missing: usize,
        dropped: Fragment,
    },
    FrameshiftInsertion {
        before_codon: usize,
        length: usize,
        dropped: Fragment,
    },
    PartialCodon { codon: usize, dropped: Fragment },
    UnalignedEnd { side: Side, dropped: Fragment },
}

impl CodonNote {
    /// Number of query bases this note removed from the alignment.
    pub fn dropped_bases(&self) -> usize {
        match self {
            CodonNote::FrameshiftDeletion { dropped, .. }
            | CodonNote::FrameshiftInsertion { dropped, .. }
            | CodonNote::PartialCodon { dropped, .. }
            | CodonNote::UnalignedEnd { dropped, .. } => dropped.query_positions.len(),
            CodonNote::Shift { .. } | CodonNote::Realigned { .. } => 0,
        }
    }

    pub fn is_frameshift(&self) -> bool {
        matches!(
            self,
            CodonNote::FrameshiftDeletion { .. } | CodonNote::FrameshiftInsertion { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct CodonAlignment {
    pub alignment: Alignment,
    pub notes: Vec<CodonNote>,
}

pub(crate) struct Engine<'a> {
    reference: &'a Sequence,
    query: &'a Sequence,
    frame: ReadingFrame,
    config: &'a CodonAlignConfig,
}

impl Engine<'_> {
    fn score(&self, pairs: &[AlignedPair]) -> f64 {
        score_pairs(pairs, self.reference, self.query, &self.config.scoring)
    }

    fn fragment(&self, positions: &[UngappedPos]) -> Fragment {
        Fragment {
            query_positions: positions.iter().map(|p| p.get()).collect(),
            symbols: positions
                .iter()
                .map(|&p| self.query.symbol(p) as char)
                .collect(),
        }
    }

    /// Ordering key for equally scored placements; smaller is preferred.
    fn preference(&self, shift: isize) -> (usize, bool) {
        let off_side = match self.config.tie_break {
            TieBreak::Left => shift > 0,
            TieBreak::Right => shift < 0,
        };
        (shift.unsigned_abs(), off_side)
    }

    /// Remove gap pairs before the first match (unless the prefix already
    /// has one) and after the last match.
    fn strip_unaligned_ends(
        &self,
        core: Vec<AlignedPair>,
        prefix_has_match: bool,
        notes: &mut Vec<CodonNote>,
    ) -> Vec<AlignedPair> {
        let Some(first) = core.iter().position(AlignedPair::is_match) else {
            self.note_unaligned(&core, Side::Trailing, notes);
            return Vec::new();
        };
        let last = core
            .iter()
            .rposition(AlignedPair::is_match)
            .unwrap_or(first);
        let start = if prefix_has_match { 0 } else { first };
        self.note_unaligned(&core[..start], Side::Leading, notes);
        self.note_unaligned(&core[last + 1..], Side::Trailing, notes);
        core[start..=last].to_vec()
    }

    fn note_unaligned(&self, pairs: &[AlignedPair], side: Side, notes: &mut Vec<CodonNote>) {
        let dropped: Vec<UngappedPos> = pairs.iter().filter_map(AlignedPair::query).collect();
        if !dropped.is_empty() {
            notes.push(CodonNote::UnalignedEnd {
                side,
                dropped: self.fragment(&dropped),
            });
        }
    }
}

/// Reference boundary offset of every pair: its own offset for pairs with a
/// reference position; for insertions, the boundary after the nearest
/// preceding reference position (`ref_before` if none in `pairs`), or the
/// boundary before the next one.
pub(crate) fn anchors(pairs: &[AlignedPair], ref_before: Option<usize>) -> Vec<usize> {
    let mut forward: Vec<Option<usize>> = Vec::with_capacity(pairs.len());
    let mut last = ref_before;
    for pair in pairs {
        match pair.reference() {
            Some(r) => {
                forward.push(Some(r.offset()));
                last = Some(r.get());
            }
            None => forward.push(last),
        }
    }
    let mut resolved = vec![0; pairs.len()];
    let mut next: Option<usize> = None;
    for idx in (0..pairs.len()).rev() {
        if let Some(r) = pairs[idx].reference() {
            next = Some(r.offset());
        }
        resolved[idx] = forward[idx].or(next).unwrap_or(0);
    }
    resolved
}

pub(crate) fn insertion_anchor(
    pairs: &[AlignedPair],
    idx: usize,
    ref_before: Option<usize>,
) -> usize {
    pairs[..idx]
        .iter()
        .rev()
        .find_map(AlignedPair::reference)
        .map(UngappedPos::get)
        .or(ref_before)
        .or_else(|| {
            pairs[idx..]
                .iter()
                .find_map(AlignedPair::reference)
                .map(UngappedPos::offset)
        })
        .unwrap_or(0)
}

/// Index of the first pair in the coding part of the alignment.
pub(crate) fn coding_split(pairs: &[AlignedPair], frame: ReadingFrame) -> usize {
    anchors(pairs, None)
        .iter()
        .position(|&anchor| frame.is_coding(anchor))
        .unwrap_or(pairs.len())
}

/// 1-based value of the last reference position in `pairs`.
pub(crate) fn last_ref_value(pairs: &[AlignedPair]) -> Option<usize> {
    pairs
        .iter()
        .rev()
        .find_map(AlignedPair::reference)
        .map(UngappedPos::get)
}

/// Reference offset where a run starts (its anchor for insertions).
fn run_offset(pairs: &[AlignedPair], run: &GapRun, ref_before: Option<usize>) -> usize {
    match run.kind {
        GapKind::Deletion => pairs[run.start].reference().map_or(0, UngappedPos::offset),
        GapKind::Insertion => insertion_anchor(pairs, run.start, ref_before),
    }
}

/// Boundary offsets `(start, end)` spanned by a slice of deletions.
pub(crate) fn deletion_bounds(deletions: &[AlignedPair]) -> Option<(usize, usize)> {
    let first = deletions.first()?.reference()?;
    let last = deletions.last()?.reference()?;
    Some((first.offset(), last.get()))
}

pub(crate) fn run_is_aligned(
    pairs: &[AlignedPair],
    run: &GapRun,
    ref_before: Option<usize>,
    frame: ReadingFrame,
) -> bool {
    match run.kind {
        GapKind::Deletion => deletion_bounds(&pairs[run.start..run.end()])
            .is_some_and(|(start, end)| frame.is_boundary(start) && frame.is_boundary(end)),
        GapKind::Insertion => {
            run.len % 3 == 0 && frame.is_boundary(insertion_anchor(pairs, run.start, ref_before))
        }
    }
}

/// Check that every gap run in the coding part of `alignment` covers whole
/// codons of `frame`.
pub fn verify_codon_boundaries(alignment: &Alignment, frame: ReadingFrame) -> Result<()> {
    let pairs = alignment.pairs();
    let (prefix, core) = pairs.split_at(coding_split(pairs, frame));
    let ref_before = last_ref_value(prefix);
    for run in gap_runs(core) {
        if !run_is_aligned(core, &run, ref_before, frame) {
            let kind = match run.kind {
                GapKind::Deletion => "deletion",
                GapKind::Insertion => "insertion",
            };
            return Err(PostAlignError::UnresolvableFrameshift {
                ref_offset: run_offset(core, &run, ref_before),
                reason: format!(
                    "{} of {} base(s) does not cover whole codons of frame {}",
                    kind,
                    run.len,
                    frame.start()
                ),
            });
        }
    }
    Ok(())
}

/// Realign the gaps of one query so they respect codon boundaries.
pub fn codon_align(
    reference: &Sequence,
    query: &Sequence,
    alignment: &Alignment,
    config: &CodonAlignConfig,
) -> Result<CodonAlignment> {
    for seq in [reference, query] {
        if seq.seq_type() != SeqType::Nucleotide {
            return Err(PostAlignError::UnsupportedSequenceType {
                operation: "codon alignment",
                seq_type: seq.seq_type().as_str(),
            });
        }
    }
    if alignment.ref_len() != reference.length() || alignment.query_len() != query.length() {
        return Err(PostAlignError::malformed(format!(
            "alignment of '{}' spans {}/{} positions but the sequences have {}/{}",
            query.header(),
            alignment.ref_len(),
            alignment.query_len(),
            reference.length(),
            query.length()
        )));
    }

    let engine = Engine {
        reference,
        query,
        frame: config.frame(),
        config,
    };
    let pairs = alignment.pairs();
    let (prefix, core) = pairs.split_at(coding_split(pairs, engine.frame));
    let ref_before = last_ref_value(prefix);
    let prefix_has_match = prefix.iter().any(AlignedPair::is_match);

    let mut notes = Vec::new();
    let core = engine.strip_unaligned_ends(core.to_vec(), prefix_has_match, &mut notes);
    let core = engine.shift_runs(core, ref_before, &mut notes);
    let core = engine.rebuild_codons(core, ref_before, &mut notes);
    let core = engine.strip_unaligned_ends(core, prefix_has_match, &mut notes);

    let mut result = Vec::with_capacity(prefix.len() + core.len());
    result.extend_from_slice(prefix);
    result.extend(core);
    let result = Alignment::from_pairs(alignment.ref_len(), alignment.query_len(), result)?;
    verify_codon_boundaries(&result, engine.frame)?;

    debug!(
        "Codon-aligned '{}': {} -> {} pairs, {} note(s)",
        query.header(),
        alignment.len(),
        result.len(),
        notes.len()
    );
    Ok(CodonAlignment {
        alignment: result,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(p: usize) -> UngappedPos {
        UngappedPos::new(p).unwrap()
    }

    fn nt(name: &str, seq: &[u8]) -> Sequence {
        Sequence::new(name, "", seq, SeqType::Nucleotide).unwrap()
    }

    fn rows(reference: &[u8], query: &[u8]) -> (Sequence, Sequence, Alignment) {
        let aln = Alignment::from_gapped_rows(reference, query).unwrap();
        (nt("ref", reference), nt("q", query), aln)
    }

    fn rendered(reference: &Sequence, query: &Sequence, aln: &Alignment) -> (String, String) {
        let (r, q) = aln.gapped_rows(reference, query);
        (String::from_utf8(r).unwrap(), String::from_utf8(q).unwrap())
    }

    #[test]
    fn test_deletion_shifted_left_to_codon_boundary() {
        let (reference, query, aln) = rows(b"ATGGCAGCATTT", b"ATGG---CATTT");
        let result = codon_align(&reference, &query, &aln, &CodonAlignConfig::default()).unwrap();
        let (r, q) = rendered(&reference, &query, &result.alignment);
        assert_eq!(r, "ATGGCAGCATTT");
        assert_eq!(q, "ATG---GCATTT");
        assert!(matches!(
            result.notes.as_slice(),
            [CodonNote::Shift {
                kind: GapKind::Deletion,
                distance: -1,
                equivalent: true,
                ..
            }]
        ));
    }

    #[test]
    fn test_tie_break_right() {
        let (reference, query, aln) = rows(b"ATGGCAGCATTT", b"ATGG---CATTT");
        let config = CodonAlignConfig {
            tie_break: TieBreak::Right,
            ..CodonAlignConfig::default()
        };
        let result = codon_align(&reference, &query, &aln, &config).unwrap();
        let (_, q) = rendered(&reference, &query, &result.alignment);
        // distance 1 to the left still beats distance 2 to the right
        assert_eq!(q, "ATG---GCATTT");

        // a four-base insertion in a poly-A codon scores the same whether the
        // extra bases go before or after the codon
        let (reference, query, aln) = rows(b"ATGA----AACCC", b"ATGAAAAAAACCC");
        let left = codon_align(&reference, &query, &aln, &CodonAlignConfig::default()).unwrap();
        let right = codon_align(&reference, &query, &aln, &config).unwrap();
        assert_eq!(rendered(&reference, &query, &left.alignment).0, "ATG---AAACCC");
        assert_eq!(rendered(&reference, &query, &right.alignment).0, "ATGAAA---CCC");
    }

    #[test]
    fn test_wildcard_base_does_not_block_shift() {
        let reference = nt("ref", b"ATGGCAGCATTT");
        let query = nt("q", b"ATGNCATTT");
        let aln = Alignment::from_gapped_rows(b"ATGGCAGCATTT", b"ATGN---CATTT").unwrap();
        let result = codon_align(&reference, &query, &aln, &CodonAlignConfig::default()).unwrap();
        let (_, q) = rendered(&reference, &query, &result.alignment);
        assert_eq!(q, "ATG---NCATTT");
        verify_codon_boundaries(&result.alignment, ReadingFrame::new(0)).unwrap();
    }

    #[test]
    fn test_single_base_deletion_becomes_codon_deletion() {
        let (reference, query, aln) = rows(b"ATGAAACCCGGG", b"ATGAA-CCCGGG");
        let result = codon_align(&reference, &query, &aln, &CodonAlignConfig::default()).unwrap();
        let (_, q) = rendered(&reference, &query, &result.alignment);
        assert_eq!(q, "ATG---CCCGGG");
        let frameshifts: Vec<&CodonNote> =
            result.notes.iter().filter(|n| n.is_frameshift()).collect();
        assert_eq!(frameshifts.len(), 1);
        assert!(matches!(
            frameshifts[0],
            CodonNote::FrameshiftDeletion { codon: 2, missing: 1, dropped } if dropped.symbols == "AA"
        ));
    }

    #[test]
    fn test_four_base_insertion_keeps_one_codon() {
        let (reference, query, aln) = rows(b"ATG----AAACCC", b"ATGTTTGAAACCC");
        let result = codon_align(&reference, &query, &aln, &CodonAlignConfig::default()).unwrap();
        let (r, q) = rendered(&reference, &query, &result.alignment);
        assert_eq!(r, "ATG---AAACCC");
        assert_eq!(q, "ATGTTTAAACCC");
        assert!(result.notes.iter().any(|n| matches!(
            n,
            CodonNote::FrameshiftInsertion { before_codon: 2, length: 1, dropped } if dropped.symbols == "G"
        )));
    }

    #[test]
    fn test_misplaced_insertion_inside_codon_moves_to_boundary() {
        // TTT inserted after the first base of codon AAA; no equivalent shift
        // reaches a boundary because the flanks differ
        let (reference, query, aln) = rows(b"ATGA---ACCCC", b"ATGATTTACCCC");
        let result = codon_align(&reference, &query, &aln, &CodonAlignConfig::default()).unwrap();
        verify_codon_boundaries(&result.alignment, ReadingFrame::new(0)).unwrap();
        let stats = result.alignment.stats(&reference, &query);
        assert_eq!(stats.inserted_bases, 3);
        assert_eq!(stats.deleted_bases, 0);
    }

    #[test]
    fn test_prefix_is_left_alone() {
        // frame starts at offset 4; the deletion at offset 1 is non-coding
        let (reference, query, aln) = rows(b"AC-GTATGAAACCC", b"A--GTATGAA-CCC");
        let config = CodonAlignConfig {
            frame_start: 4,
            ..CodonAlignConfig::default()
        };
        let result = codon_align(&reference, &query, &aln, &config).unwrap();
        assert_eq!(&result.alignment.pairs()[..2], &aln.pairs()[..2]);
        assert_eq!(
            result.alignment.pairs()[1],
            AlignedPair::Deletion { reference: pos(2) }
        );
        verify_codon_boundaries(&result.alignment, config.frame()).unwrap();
    }

    #[test]
    fn test_unaligned_ends_are_stripped() {
        let (reference, query, aln) = rows(b"--ATGAAACCC---", b"GGATGAAACCCTTT");
        let result = codon_align(&reference, &query, &aln, &CodonAlignConfig::default()).unwrap();
        assert!(result.alignment.pairs().first().is_some_and(AlignedPair::is_match));
        assert!(result.alignment.pairs().last().is_some_and(AlignedPair::is_match));
        let sides: Vec<Side> = result
            .notes
            .iter()
            .filter_map(|n| match n {
                CodonNote::UnalignedEnd { side, .. } => Some(*side),
                _ => None,
            })
            .collect();
        assert_eq!(sides, vec![Side::Leading, Side::Trailing]);
    }

    #[test]
    fn test_idempotent() {
        let (reference, query, aln) = rows(b"ATGAAAC-CCGGGTTTAAA", b"ATGA-ACTCCG--TTTAAA");
        let config = CodonAlignConfig::default();
        let once = codon_align(&reference, &query, &aln, &config).unwrap();
        let twice = codon_align(&reference, &query, &once.alignment, &config).unwrap();
        assert_eq!(once.alignment, twice.alignment);
        assert!(twice.notes.is_empty());
    }

    #[test]
    fn test_verify_reports_misaligned_run() {
        let aln = Alignment::from_gapped_rows(b"ATGAAACCC", b"ATGA-ACCC").unwrap();
        let err = verify_codon_boundaries(&aln, ReadingFrame::new(0)).unwrap_err();
        assert!(matches!(
            err,
            PostAlignError::UnresolvableFrameshift { ref_offset: 4, .. }
        ));
    }

    #[test]
    fn test_rejects_amino_acids() {
        let reference = Sequence::new("r", "", b"MKV", SeqType::AminoAcid).unwrap();
        let query = Sequence::new("q", "", b"MKV", SeqType::AminoAcid).unwrap();
        let aln = Alignment::from_gapped_rows(b"MKV", b"MKV").unwrap();
        assert!(matches!(
            codon_align(&reference, &query, &aln, &CodonAlignConfig::default()),
            Err(PostAlignError::UnsupportedSequenceType { .. })
        ));
    }

    #[test]
    fn test_anchors() {
        let aln = Alignment::from_gapped_rows(b"--AC-GT", b"AAACTGT").unwrap();
        // leading insertions take the boundary before the first reference base
        assert_eq!(anchors(aln.pairs(), None), vec![0, 0, 0, 1, 2, 2, 3]);
        assert_eq!(coding_split(aln.pairs(), ReadingFrame::new(2)), 4);
    }
}
