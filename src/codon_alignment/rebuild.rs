use super::{anchors, CodonNote, Engine, TieBreak};
use crate::alignment::AlignedPair;
use crate::position::UngappedPos;
use std::cmp::Ordering;

/// Where a pair falls relative to the codons of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Insertion anchored on the boundary before codon `k`.
    Boundary(usize),
    Codon(usize),
}

/// A complete codon after resolution, with query bases to insert on the
/// boundary before or after it.
struct ResolvedCodon {
    before: Vec<UngappedPos>,
    pairs: Vec<AlignedPair>,
    after: Vec<UngappedPos>,
}

impl Engine<'_> {
    fn slot(&self, pair: &AlignedPair, anchor: usize) -> Slot {
        let rel = anchor.saturating_sub(self.frame.start());
        if pair.is_insertion() && rel % 3 == 0 {
            Slot::Boundary(rel / 3)
        } else {
            Slot::Codon(rel / 3)
        }
    }

    /// Regroup the coding part codon by codon so that every gap covers whole
    /// codons, dropping query bases that cannot be placed.
    pub(super) fn rebuild_codons(
        &self,
        core: Vec<AlignedPair>,
        ref_before: Option<usize>,
        notes: &mut Vec<CodonNote>,
    ) -> Vec<AlignedPair> {
        let anchors = anchors(&core, ref_before);
        let slots: Vec<Slot> = core
            .iter()
            .zip(&anchors)
            .map(|(pair, &anchor)| self.slot(pair, anchor))
            .collect();

        let mut out = Vec::with_capacity(core.len());
        let mut last_ref = ref_before;
        let mut pending: Vec<UngappedPos> = Vec::new();
        let mut boundary = 0;

        let mut idx = 0;
        while idx < core.len() {
            let slot = slots[idx];
            let mut end = idx + 1;
            while end < core.len() && slots[end] == slot {
                end += 1;
            }
            let unit = &core[idx..end];
            match slot {
                Slot::Boundary(k) => {
                    pending.extend(unit.iter().filter_map(AlignedPair::query));
                    boundary = k;
                }
                Slot::Codon(k) => {
                    if let Some(codon) = self.resolve_codon(k, unit, notes) {
                        pending.extend(codon.before);
                        self.flush_insertions(&mut pending, k, last_ref, &mut out, notes);
                        last_ref = codon
                            .pairs
                            .last()
                            .and_then(AlignedPair::reference)
                            .map(UngappedPos::get);
                        out.extend(codon.pairs);
                        pending.extend(codon.after);
                        boundary = k + 1;
                    }
                }
            }
            idx = end;
        }
        self.flush_insertions(&mut pending, boundary, last_ref, &mut out, notes);
        out
    }

    fn resolve_codon(
        &self,
        k: usize,
        unit: &[AlignedPair],
        notes: &mut Vec<CodonNote>,
    ) -> Option<ResolvedCodon> {
        let first = self.frame.codon_start(k);
        let expected = [first, first.next(), first.next().next()];
        let refs: Vec<UngappedPos> = unit.iter().filter_map(AlignedPair::reference).collect();
        let queries: Vec<UngappedPos> = unit.iter().filter_map(AlignedPair::query).collect();

        if refs != expected {
            if !queries.is_empty() {
                notes.push(CodonNote::PartialCodon {
                    codon: k + 1,
                    dropped: self.fragment(&queries),
                });
            }
            return None;
        }

        let clean = unit.len() == 3
            && (unit.iter().all(AlignedPair::is_match) || unit.iter().all(AlignedPair::is_deletion));
        if clean {
            return Some(ResolvedCodon {
                before: Vec::new(),
                pairs: unit.to_vec(),
                after: Vec::new(),
            });
        }

        let n = queries.len();
        if n < 3 {
            notes.push(CodonNote::FrameshiftDeletion {
                codon: k + 1,
                missing: 3 - n,
                dropped: self.fragment(&queries),
            });
            return Some(ResolvedCodon {
                before: Vec::new(),
                pairs: expected
                    .iter()
                    .map(|&reference| AlignedPair::Deletion { reference })
                    .collect(),
                after: Vec::new(),
            });
        }

        let paired = |offset: usize| -> Vec<AlignedPair> {
            expected
                .iter()
                .zip(&queries[offset..offset + 3])
                .map(|(&reference, &query)| AlignedPair::Match { reference, query })
                .collect()
        };
        let resolved = if n == 3 {
            ResolvedCodon {
                before: Vec::new(),
                pairs: paired(0),
                after: Vec::new(),
            }
        } else {
            let extras_after = paired(0);
            let extras_before = paired(n - 3);
            let prefer_before = match self.score(&extras_before).total_cmp(&self.score(&extras_after)) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => self.config.tie_break == TieBreak::Left,
            };
            if prefer_before {
                ResolvedCodon {
                    before: queries[..n - 3].to_vec(),
                    pairs: extras_before,
                    after: Vec::new(),
                }
            } else {
                ResolvedCodon {
                    before: Vec::new(),
                    pairs: extras_after,
                    after: queries[3..].to_vec(),
                }
            }
        };
        notes.push(CodonNote::Realigned {
            codon: k + 1,
            inserted: n - 3,
            score_delta: self.score(&resolved.pairs) - self.score(unit),
        });
        Some(resolved)
    }

    /// Emit pending insertions on the boundary before codon `k`, keeping the
    /// largest whole number of codons.
    fn flush_insertions(
        &self,
        pending: &mut Vec<UngappedPos>,
        k: usize,
        last_ref: Option<usize>,
        out: &mut Vec<AlignedPair>,
        notes: &mut Vec<CodonNote>,
    ) {
        if pending.is_empty() {
            return;
        }
        // the preceding codon may have been dropped, leaving no boundary here
        if !last_ref.is_none_or(|value| self.frame.is_boundary(value)) {
            notes.push(CodonNote::PartialCodon {
                codon: k + 1,
                dropped: self.fragment(pending),
            });
            pending.clear();
            return;
        }
        let keep = pending.len() - pending.len() % 3;
        if keep < pending.len() {
            notes.push(CodonNote::FrameshiftInsertion {
                before_codon: k + 1,
                length: pending.len() - keep,
                dropped: self.fragment(&pending[keep..]),
            });
        }
        out.extend(
            pending[..keep]
                .iter()
                .map(|&query| AlignedPair::Insertion { query }),
        );
        pending.clear();
    }
}
