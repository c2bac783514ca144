use super::StepOptions;
use crate::collection::{AlignmentCollection, Note, ReportEntry, StepNote, StepSummary, TrimNote};
use crate::error::{PostAlignError, Result};
use crate::position::{ReadingFrame, UngappedPos};
use log::{info, warn};

const NAME: &str = "trim-by-ref";

/// Restrict every alignment to a reference window without cutting codons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimByRef {
    /// 1-based inclusive start; defaults to 1
    pub ref_start: Option<usize>,
    /// 1-based exclusive end; defaults to the reference length + 1
    pub ref_end: Option<usize>,
    pub frame_start: Option<usize>,
}

impl TrimByRef {
    pub(crate) fn from_options(options: &mut StepOptions) -> Result<Self> {
        let step = Self {
            ref_start: options.take_parsed("ref-start")?,
            ref_end: options.take_parsed("ref-end")?,
            frame_start: options.take_parsed("frame-start")?,
        };
        if step.ref_start == Some(0) {
            return Err(options.invalid("ref-start is 1-based and must be at least 1"));
        }
        if let (Some(start), Some(end)) = (step.ref_start, step.ref_end) {
            if end <= start {
                return Err(options.invalid(format!(
                    "ref-end ({end}) must be greater than ref-start ({start})"
                )));
            }
        }
        Ok(step)
    }

    /// 0-based half-open offsets of the window, narrowed inward to whole
    /// codons where it falls in the coding region.
    fn window(&self, ref_len: usize, frame: ReadingFrame) -> Result<(usize, usize)> {
        let start = self.ref_start.unwrap_or(1);
        let mut end = self.ref_end.unwrap_or(ref_len + 1);
        if end > ref_len + 1 {
            warn!("ref-end {end} is past the reference end; using {}", ref_len + 1);
            end = ref_len + 1;
        }
        if start >= end {
            return Err(PostAlignError::config(
                NAME,
                format!("window [{start}, {end}) is empty for a reference of {ref_len} bases"),
            ));
        }

        let mut start_offset = start - 1;
        let mut end_offset = end - 1;
        if frame.is_coding(start_offset) {
            start_offset = frame.ceil_boundary(start_offset);
        }
        if let Some(boundary) = frame.floor_boundary(end_offset) {
            end_offset = boundary;
        }
        Ok((start_offset, end_offset.max(start_offset)))
    }

    pub fn apply(
        &self,
        position: usize,
        collection: AlignmentCollection,
    ) -> Result<AlignmentCollection> {
        let frame = self
            .frame_start
            .map(ReadingFrame::new)
            .or(collection.reading_frame)
            .unwrap_or_default();
        let (start_offset, end_offset) = self.window(collection.reference.length(), frame)?;
        let window_start = UngappedPos::from_offset(start_offset);
        let window_end = UngappedPos::from_offset(end_offset);

        let mut collection = collection.try_map_queries(|_, mut query| {
            let trimmed = query.alignment.between(window_start, window_end);
            let dropped_pairs = query.alignment.len() - trimmed.len();
            if dropped_pairs > 0 {
                query.add_modifier(
                    position,
                    format!("{NAME}({}..{})", window_start.get(), window_end.get()),
                );
                query.notes.push(StepNote {
                    step: position,
                    processor: NAME,
                    detail: Note::Trim(TrimNote {
                        window_start: window_start.get(),
                        window_end: window_end.get(),
                        dropped_pairs,
                    }),
                });
            }
            query.alignment = trimmed;
            Ok(query)
        })?;

        let dropped_pairs = collection
            .queries
            .iter()
            .flat_map(|q| &q.notes)
            .filter(|n| n.step == position)
            .map(|n| match &n.detail {
                Note::Trim(trim) => trim.dropped_pairs,
                _ => 0,
            })
            .sum();
        info!(
            "Step {position} ({NAME}): kept reference window [{}, {}) with frame {}, dropped {} pair(s)",
            window_start.get(),
            window_end.get(),
            frame.start(),
            dropped_pairs
        );
        collection.report.push(ReportEntry {
            step: position,
            processor: NAME,
            summary: StepSummary::TrimByRef {
                ref_start: window_start.get(),
                ref_end: window_end.get(),
                dropped_pairs,
            },
        });
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::collection::QueryAlignment;
    use crate::sequence::{SeqType, Sequence};

    fn single(reference_row: &str, query_row: &str) -> AlignmentCollection {
        let (r, q) = (reference_row.as_bytes(), query_row.as_bytes());
        let reference = Sequence::new("ref", "", r, SeqType::Nucleotide).unwrap();
        let query = Sequence::new("q", "", q, SeqType::Nucleotide).unwrap();
        let alignment = Alignment::from_gapped_rows(r, q).unwrap();
        AlignmentCollection::new(reference, vec![QueryAlignment::new(0, query, alignment)])
    }

    #[test]
    fn test_window_is_narrowed_to_codons() {
        let step = TrimByRef {
            ref_start: Some(5),
            ref_end: Some(12),
            frame_start: None,
        };
        // frame 0: offsets 4..11 narrow to 6..9
        assert_eq!(step.window(12, ReadingFrame::new(0)).unwrap(), (6, 9));
        // frame 1: offsets 4..11 narrow to 4..10
        assert_eq!(step.window(12, ReadingFrame::new(1)).unwrap(), (4, 10));
        // window inside the non-coding prefix is kept as given
        let prefix = TrimByRef {
            ref_start: Some(1),
            ref_end: Some(4),
            frame_start: None,
        };
        assert_eq!(prefix.window(12, ReadingFrame::new(6)).unwrap(), (0, 3));
    }

    #[test]
    fn test_apply_drops_partial_codons_and_edge_insertions() {
        let collection = single("--ATGAAACCCGGG--", "TTATGAAACCCGGGAA");
        let step = TrimByRef {
            ref_start: Some(5),
            ref_end: None,
            frame_start: Some(0),
        };
        let result = step.apply(2, collection).unwrap();
        let query = &result.queries[0];
        let (first, last) = query.alignment.ref_span().unwrap();
        assert_eq!((first.get(), last.get()), (7, 12));
        assert!(query.alignment.pairs().iter().all(|p| p.is_match()));
        // header text, note and summary share the exclusive end
        assert_eq!(query.modifiers[0].to_string(), "2:trim-by-ref(7..13)");
        assert!(matches!(
            &query.notes[0].detail,
            Note::Trim(TrimNote {
                window_start: 7,
                window_end: 13,
                dropped_pairs: 10
            })
        ));
        assert!(matches!(
            result.report.entries()[0].summary,
            StepSummary::TrimByRef {
                ref_start: 7,
                ref_end: 13,
                dropped_pairs: 10
            }
        ));
    }

    #[test]
    fn test_default_window_drops_only_overhangs() {
        let collection = single("--ACGTAC--", "--AC-TAC--");
        let result = TrimByRef::default().apply(1, collection).unwrap();
        assert_eq!(result.queries[0].alignment.len(), 6);
        assert!(result.queries[0].notes.is_empty());

        let collection = single("--ACGTAC", "GGACGTAC");
        let result = TrimByRef::default().apply(1, collection).unwrap();
        assert_eq!(result.queries[0].alignment.len(), 6);
    }

    #[test]
    fn test_rejects_inverted_window() {
        let mut options = StepOptions::parse("trim-by-ref", "ref-start=10,ref-end=4").unwrap();
        assert!(TrimByRef::from_options(&mut options).is_err());
        let mut options = StepOptions::parse("trim-by-ref", "ref-start=0").unwrap();
        assert!(TrimByRef::from_options(&mut options).is_err());
    }
}
