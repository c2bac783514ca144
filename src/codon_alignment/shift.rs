use super::{deletion_bounds, insertion_anchor, run_is_aligned, run_offset, CodonNote, Engine};
use crate::alignment::{gap_runs, AlignedPair, GapKind, GapRun};
use crate::position::UngappedPos;
use log::trace;

const SCORE_EPSILON: f64 = 1e-9;

/// A gap run moved through `|shift|` neighbouring matches.
struct Placement {
    shift: isize,
    seg_start: usize,
    seg_end: usize,
    segment: Vec<AlignedPair>,
    score_delta: f64,
    aligned: bool,
    merged: bool,
}

impl Engine<'_> {
    /// Move misplaced gap runs onto codon boundaries: first through
    /// equivalent placements, then whole-codon runs through the best aligned
    /// placement in the window.
    pub(super) fn shift_runs(
        &self,
        mut core: Vec<AlignedPair>,
        ref_before: Option<usize>,
        notes: &mut Vec<CodonNote>,
    ) -> Vec<AlignedPair> {
        for equivalent_only in [true, false] {
            // each applied placement leaves one unaligned run fewer
            while let Some((run, placement)) = self.next_placement(&core, ref_before, equivalent_only)
            {
                notes.push(CodonNote::Shift {
                    kind: run.kind,
                    ref_offset: run_offset(&core, &run, ref_before),
                    length: run.len,
                    distance: placement.shift,
                    merged: placement.merged,
                    equivalent: placement.score_delta >= -SCORE_EPSILON,
                    score_delta: placement.score_delta,
                });
                trace!(
                    "Shifted {:?} run of {} at pair {} by {}",
                    run.kind,
                    run.len,
                    run.start,
                    placement.shift
                );
                core.splice(placement.seg_start..placement.seg_end, placement.segment);
            }
        }
        core
    }

    fn next_placement(
        &self,
        core: &[AlignedPair],
        ref_before: Option<usize>,
        equivalent_only: bool,
    ) -> Option<(GapRun, Placement)> {
        for run in gap_runs(core) {
            if run_is_aligned(core, &run, ref_before, self.frame) {
                continue;
            }
            if !equivalent_only && run.len % 3 != 0 {
                continue;
            }
            let candidates = self
                .placements(core, &run, ref_before)
                .into_iter()
                .filter(|p| p.aligned);
            let best = if equivalent_only {
                candidates
                    .filter(|p| p.score_delta >= -SCORE_EPSILON)
                    .min_by_key(|p| self.preference(p.shift))
            } else {
                candidates.min_by(|a, b| {
                    b.score_delta
                        .total_cmp(&a.score_delta)
                        .then_with(|| self.preference(a.shift).cmp(&self.preference(b.shift)))
                })
            };
            if let Some(placement) = best {
                return Some((run, placement));
            }
        }
        None
    }

    /// Every placement reachable by sliding `run` through matches, up to the
    /// window size in each direction.
    fn placements(
        &self,
        core: &[AlignedPair],
        run: &GapRun,
        ref_before: Option<usize>,
    ) -> Vec<Placement> {
        let max_shift = self.config.window_size * 3;
        let mut placements = Vec::new();

        let mut k = 0;
        while k < max_shift && run.start > k && core[run.start - k - 1].is_match() {
            k += 1;
            placements.push(self.slide(core, run, k, true, ref_before));
        }
        let mut k = 0;
        while k < max_shift && run.end() + k < core.len() && core[run.end() + k].is_match() {
            k += 1;
            placements.push(self.slide(core, run, k, false, ref_before));
        }
        placements
    }

    fn slide(
        &self,
        core: &[AlignedPair],
        run: &GapRun,
        k: usize,
        leftward: bool,
        ref_before: Option<usize>,
    ) -> Placement {
        let (seg_start, seg_end) = if leftward {
            (run.start - k, run.end())
        } else {
            (run.start, run.end() + k)
        };
        let old = &core[seg_start..seg_end];
        let refs: Vec<UngappedPos> = old.iter().filter_map(AlignedPair::reference).collect();
        let queries: Vec<UngappedPos> = old.iter().filter_map(AlignedPair::query).collect();
        let segment = relayout(run.kind, run.len, &refs, &queries, leftward);
        let score_delta = self.score(&segment) - self.score(old);

        let (aligned, merged) = match (run.kind, leftward) {
            (GapKind::Deletion, true) => {
                let neighbor = count_back(&core[..seg_start], AlignedPair::is_deletion);
                let merged_run = [&core[seg_start - neighbor..seg_start], &segment[..run.len]].concat();
                (self.deletion_aligned(&merged_run), neighbor > 0)
            }
            (GapKind::Deletion, false) => {
                let neighbor = count_forward(&core[seg_end..], AlignedPair::is_deletion);
                let merged_run =
                    [&segment[k..], &core[seg_end..seg_end + neighbor]].concat();
                (self.deletion_aligned(&merged_run), neighbor > 0)
            }
            (GapKind::Insertion, true) => {
                let neighbor = count_back(&core[..seg_start], AlignedPair::is_insertion);
                let anchor = insertion_anchor(core, seg_start - neighbor, ref_before);
                (
                    (run.len + neighbor) % 3 == 0 && self.frame.is_boundary(anchor),
                    neighbor > 0,
                )
            }
            (GapKind::Insertion, false) => {
                let neighbor = count_forward(&core[seg_end..], AlignedPair::is_insertion);
                let anchor = insertion_anchor(&segment, k, ref_before);
                (
                    (run.len + neighbor) % 3 == 0 && self.frame.is_boundary(anchor),
                    neighbor > 0,
                )
            }
        };

        Placement {
            shift: if leftward { -(k as isize) } else { k as isize },
            seg_start,
            seg_end,
            segment,
            score_delta,
            aligned,
            merged,
        }
    }

    fn deletion_aligned(&self, deletions: &[AlignedPair]) -> bool {
        deletion_bounds(deletions)
            .is_some_and(|(start, end)| self.frame.is_boundary(start) && self.frame.is_boundary(end))
    }
}

/// Rebuild a slid segment: the gap run of length `len` goes first when
/// `gaps_first`, last otherwise, and the remaining positions are matched in
/// order.
fn relayout(
    kind: GapKind,
    len: usize,
    refs: &[UngappedPos],
    queries: &[UngappedPos],
    gaps_first: bool,
) -> Vec<AlignedPair> {
    let mut segment = Vec::with_capacity(refs.len().max(queries.len()));
    match kind {
        GapKind::Deletion => {
            let k = queries.len();
            let (gap_refs, match_refs) = if gaps_first {
                (&refs[..len], &refs[len..])
            } else {
                (&refs[k..], &refs[..k])
            };
            let gaps = gap_refs
                .iter()
                .map(|&reference| AlignedPair::Deletion { reference });
            let matches = match_refs
                .iter()
                .zip(queries)
                .map(|(&reference, &query)| AlignedPair::Match { reference, query });
            if gaps_first {
                segment.extend(gaps);
                segment.extend(matches);
            } else {
                segment.extend(matches);
                segment.extend(gaps);
            }
        }
        GapKind::Insertion => {
            let k = refs.len();
            let (gap_queries, match_queries) = if gaps_first {
                (&queries[..len], &queries[len..])
            } else {
                (&queries[k..], &queries[..k])
            };
            let gaps = gap_queries
                .iter()
                .map(|&query| AlignedPair::Insertion { query });
            let matches = refs
                .iter()
                .zip(match_queries)
                .map(|(&reference, &query)| AlignedPair::Match { reference, query });
            if gaps_first {
                segment.extend(gaps);
                segment.extend(matches);
            } else {
                segment.extend(matches);
                segment.extend(gaps);
            }
        }
    }
    segment
}

fn count_back(pairs: &[AlignedPair], pred: fn(&AlignedPair) -> bool) -> usize {
    pairs.iter().rev().take_while(|p| pred(p)).count()
}

fn count_forward(pairs: &[AlignedPair], pred: fn(&AlignedPair) -> bool) -> usize {
    pairs.iter().take_while(|p| pred(p)).count()
}
