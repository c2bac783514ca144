use super::StepOptions;
use crate::alignment::Alignment;
use crate::codon_alignment::anchors;
use crate::collection::{AlignmentCollection, Note, RemovalNote, ReportEntry, StepNote, StepSummary};
use crate::error::{PostAlignError, Result};
use crate::position::{ReadingFrame, UngappedPos};
use crate::sequence::Sequence;
use log::info;
use regex::Regex;

const NAME: &str = "apply-frameshift";
const FRAMESHIFT_PATTERN: &str = r"^(?P<pos>\d+)(?P<sign>[+-])(?P<length>\d+)$";

/// A known frameshift written `POS+N`: the reference carries `N` extra
/// bases after position `POS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KnownFrameshift {
    pub pos: usize,
    pub length: usize,
}

impl KnownFrameshift {
    /// Last reference position removed.
    pub fn last(&self) -> usize {
        self.pos + self.length
    }

    /// Whether the 1-based reference value falls in `POS+1..=POS+N`.
    pub fn removes(&self, value: usize) -> bool {
        value > self.pos && value <= self.last()
    }
}

impl std::fmt::Display for KnownFrameshift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.pos, self.length)
    }
}

/// Remove reference positions named by known frameshifts, together with
/// every alignment column between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFrameshift {
    /// Sorted and non-overlapping
    pub frameshifts: Vec<KnownFrameshift>,
}

impl ApplyFrameshift {
    pub(crate) fn from_options(options: &mut StepOptions) -> Result<Self> {
        let pattern = Regex::new(FRAMESHIFT_PATTERN).map_err(|e| {
            options.invalid(format!("could not compile frameshift pattern: {e}"))
        })?;
        let mut frameshifts = Vec::new();
        for value in options.take_all("frameshift") {
            let captures = pattern.captures(&value).ok_or_else(|| {
                options.invalid(format!("invalid frameshift '{value}'; expected POS+N"))
            })?;
            if &captures["sign"] == "-" {
                return Err(options.invalid(format!(
                    "frameshift '{value}' repeats reference positions; only POS+N is supported"
                )));
            }
            let parse = |key: &str| {
                captures[key]
                    .parse::<usize>()
                    .map_err(|_| options.invalid(format!("invalid frameshift '{value}'")))
            };
            let (pos, length) = (parse("pos")?, parse("length")?);
            if pos == 0 || length == 0 {
                return Err(
                    options.invalid(format!("frameshift '{value}' needs POS and N of at least 1"))
                );
            }
            frameshifts.push(KnownFrameshift { pos, length });
        }
        if frameshifts.is_empty() {
            return Err(options.invalid("at least one frameshift=POS+N is required"));
        }

        frameshifts.sort();
        for pair in frameshifts.windows(2) {
            if pair[1].pos <= pair[0].last() {
                return Err(options.invalid(format!("frameshift {} overlaps {}", pair[1], pair[0])));
            }
        }
        Ok(Self { frameshifts })
    }

    fn removes(&self, value: usize) -> bool {
        self.frameshifts.iter().any(|fs| fs.removes(value))
    }

    fn label(&self) -> String {
        let shifts: Vec<String> = self.frameshifts.iter().map(ToString::to_string).collect();
        format!("{NAME}({})", shifts.join(","))
    }

    pub fn apply(
        &self,
        position: usize,
        collection: AlignmentCollection,
    ) -> Result<AlignmentCollection> {
        let ref_len = collection.reference.length();
        if let Some(last) = self.frameshifts.last() {
            if last.last() > ref_len {
                return Err(PostAlignError::config(
                    NAME,
                    format!("frameshift {last} is past the reference end ({ref_len})"),
                ));
            }
        }

        // ref_map[value] is the new 1-based value of a kept reference position
        let mut ref_map = vec![None; ref_len + 1];
        let mut ref_symbols = Vec::with_capacity(ref_len);
        for (offset, &symbol) in collection.reference.symbols().iter().enumerate() {
            if !self.removes(offset + 1) {
                ref_symbols.push(symbol);
                ref_map[offset + 1] = Some(ref_symbols.len());
            }
        }
        let removed_ref_positions = ref_len - ref_symbols.len();
        let reference = Sequence::new(
            collection.reference.header(),
            collection.reference.description(),
            &ref_symbols,
            collection.reference.seq_type(),
        )?;
        let new_ref_len = reference.length();
        let label = self.label();

        let mut collection = collection.try_map_queries(|_, mut query| {
            let pairs = query.alignment.pairs();
            let query_len = query.query.length();
            let mut kept_query = vec![true; query_len + 1];
            let mut kept_pairs = Vec::with_capacity(pairs.len());
            let mut dropped_pairs = 0;
            for (pair, anchor) in pairs.iter().zip(anchors(pairs, None)) {
                // an insertion sits after the reference value its anchor names
                let value = pair.reference().map_or(anchor, UngappedPos::get);
                if self.removes(value) {
                    dropped_pairs += 1;
                    if let Some(q) = pair.query() {
                        kept_query[q.get()] = false;
                    }
                } else {
                    kept_pairs.push(*pair);
                }
            }

            let mut query_map = vec![None; query_len + 1];
            let mut query_symbols = Vec::with_capacity(query_len);
            for (offset, &symbol) in query.query.symbols().iter().enumerate() {
                if kept_query[offset + 1] {
                    query_symbols.push(symbol);
                    query_map[offset + 1] = Some(query_symbols.len());
                }
            }
            let dropped_query_bases = query_len - query_symbols.len();

            let raw_pairs = kept_pairs.iter().map(|pair| {
                (
                    pair.reference().and_then(|r| ref_map[r.get()]),
                    pair.query().and_then(|q| query_map[q.get()]),
                )
            });
            query.alignment = Alignment::build(new_ref_len, query_symbols.len(), raw_pairs)?;
            if dropped_query_bases > 0 {
                query.query = Sequence::new(
                    query.query.header(),
                    query.query.description(),
                    &query_symbols,
                    query.query.seq_type(),
                )?;
            }
            if dropped_pairs > 0 {
                query.add_modifier(position, label.as_str());
                query.notes.push(StepNote {
                    step: position,
                    processor: NAME,
                    detail: Note::Removal(RemovalNote {
                        removed_ref_positions,
                        dropped_pairs,
                        dropped_query_bases,
                    }),
                });
            }
            Ok(query)
        })?;

        collection.reference = reference;
        collection.reading_frame = collection.reading_frame.map(|frame| {
            let removed_before = (1..=frame.start()).filter(|&v| self.removes(v)).count();
            ReadingFrame::new(frame.start() - removed_before)
        });

        let (dropped_pairs, dropped_query_bases) = collection
            .queries
            .iter()
            .flat_map(|q| &q.notes)
            .filter(|n| n.step == position)
            .fold((0, 0), |(pairs, bases), n| match &n.detail {
                Note::Removal(removal) => (
                    pairs + removal.dropped_pairs,
                    bases + removal.dropped_query_bases,
                ),
                _ => (pairs, bases),
            });
        info!(
            "Step {position} ({NAME}): removed {removed_ref_positions} reference position(s), \
             dropped {dropped_pairs} pair(s) and {dropped_query_bases} query base(s)"
        );
        collection.report.push(ReportEntry {
            step: position,
            processor: NAME,
            summary: StepSummary::ApplyFrameshift {
                removed_ref_positions,
                ref_length: new_ref_len,
                dropped_pairs,
                dropped_query_bases,
            },
        });
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::QueryAlignment;
    use crate::processors::Processor;
    use crate::sequence::SeqType;

    fn step(spec: &str) -> Result<ApplyFrameshift> {
        match Processor::from_spec(spec)? {
            Processor::ApplyFrameshift(step) => Ok(step),
            other => panic!("wrong processor {}", other.name()),
        }
    }

    fn query(index: usize, name: &str, ref_row: &[u8], query_row: &[u8]) -> QueryAlignment {
        let sequence = Sequence::new(name, "", query_row, SeqType::Nucleotide).unwrap();
        let alignment = Alignment::from_gapped_rows(ref_row, query_row).unwrap();
        QueryAlignment::new(index, sequence, alignment)
    }

    #[test]
    fn test_from_options_sorts_and_rejects_repeats() {
        let parsed = step("apply-frameshift:frameshift=40+3,frameshift=27+1").unwrap();
        assert_eq!(
            parsed.frameshifts,
            vec![
                KnownFrameshift { pos: 27, length: 1 },
                KnownFrameshift { pos: 40, length: 3 },
            ]
        );
        assert_eq!(parsed.label(), "apply-frameshift(27+1,40+3)");

        let err = step("apply-frameshift:frameshift=27-1").unwrap_err();
        assert!(err.to_string().contains("repeats reference positions"), "{err}");
        assert!(step("apply-frameshift").is_err());
        assert!(step("apply-frameshift:frameshift=0+1").is_err());
        assert!(step("apply-frameshift:frameshift=5+0").is_err());
        assert!(step("apply-frameshift:frameshift=5").is_err());
        assert!(step("apply-frameshift:frameshift=3+3,frameshift=5+1").is_err());
    }

    #[test]
    fn test_apply_removes_reference_bases_and_their_columns() {
        let reference =
            Sequence::new("ref", "HXB2", b"ATGAAAACCCGGG", SeqType::Nucleotide).unwrap();
        let queries = vec![
            query(0, "q1", b"ATGAAAACCCGGG", b"ATGAAA-CCCGGG"),
            query(1, "q2", b"ATGAAAACCCGGG", b"ATGAAAACCCGGG"),
            // the T inserted after the removed A goes with it
            query(2, "q3", b"ATGAAAA-CCCGGG", b"ATGAAAATCCCGGG"),
            query(3, "q4", b"ATGAAAACCCGGG", b"------ACCCGGG"),
        ];
        let mut collection = AlignmentCollection::new(reference, queries);
        collection.reading_frame = Some(ReadingFrame::new(9));

        let collection = step("apply-frameshift:frameshift=6+1")
            .unwrap()
            .apply(2, collection)
            .unwrap();

        assert_eq!(collection.reference.symbols(), b"ATGAAACCCGGG");
        assert_eq!(collection.reference.description(), "HXB2");
        assert_eq!(collection.reading_frame, Some(ReadingFrame::new(8)));

        let rows: Vec<(Vec<u8>, Vec<u8>)> = collection
            .queries
            .iter()
            .map(|q| q.alignment.gapped_rows(&collection.reference, &q.query))
            .collect();
        assert_eq!(rows[0].1, b"ATGAAACCCGGG");
        assert_eq!(rows[1].1, b"ATGAAACCCGGG");
        assert_eq!(rows[2].1, b"ATGAAACCCGGG");
        assert_eq!(rows[3].1, b"------CCCGGG");
        assert!(rows.iter().all(|(r, _)| r == b"ATGAAACCCGGG"));

        let q3 = &collection.queries[2];
        assert_eq!(q3.query.symbols(), b"ATGAAACCCGGG");
        assert_eq!(q3.alignment.query_len(), 12);
        assert_eq!(q3.modifiers[0].to_string(), "2:apply-frameshift(6+1)");
        assert_eq!(
            q3.notes[0].detail,
            Note::Removal(RemovalNote {
                removed_ref_positions: 1,
                dropped_pairs: 2,
                dropped_query_bases: 2,
            })
        );

        assert_eq!(
            collection.report.entries()[0].summary,
            StepSummary::ApplyFrameshift {
                removed_ref_positions: 1,
                ref_length: 12,
                dropped_pairs: 5,
                dropped_query_bases: 4,
            }
        );
    }

    #[test]
    fn test_apply_rejects_frameshift_past_reference_end() {
        let reference = Sequence::new("ref", "", b"ATGAAA", SeqType::Nucleotide).unwrap();
        let collection =
            AlignmentCollection::new(reference, vec![query(0, "q1", b"ATGAAA", b"ATGAAA")]);
        let err = step("apply-frameshift:frameshift=5+2")
            .unwrap()
            .apply(1, collection)
            .unwrap_err();
        assert!(matches!(err, PostAlignError::InvalidConfig { .. }));
    }
}
