use super::{StepOptions, StepOutcome};
use crate::codon_alignment::anchors;
use crate::collection::{AlignmentCollection, Modifier, QueryAlignment, ReportEntry, StepSummary};
use crate::error::{PostAlignError, Result};
use crate::fasta::write_record;
use crate::position::UngappedPos;
use crate::sequence::Sequence;
use log::info;

const NAME: &str = "save-fasta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveFasta {
    /// Write the reference before every query instead of once
    pub pairwise: bool,
    /// Append the modifier history to query headers
    pub modifiers: bool,
    /// Wrap sequence lines; 0 keeps each row on one line
    pub line_width: usize,
}

impl Default for SaveFasta {
    fn default() -> Self {
        Self {
            pairwise: false,
            modifiers: true,
            line_width: 0,
        }
    }
}

impl SaveFasta {
    pub(crate) fn from_options(options: &mut StepOptions) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            pairwise: options.take_bool("pairwise")?.unwrap_or(defaults.pairwise),
            modifiers: options.take_bool("modifiers")?.unwrap_or(defaults.modifiers),
            line_width: options.take_parsed("line-width")?.unwrap_or(defaults.line_width),
        })
    }

    pub fn apply(
        &self,
        position: usize,
        mut collection: AlignmentCollection,
    ) -> Result<StepOutcome> {
        let (start, end) = rendered_window(&collection);
        let mut records = Vec::new();
        if self.pairwise {
            for query in &collection.queries {
                let (reference_row, rows) = render(&collection.reference, start, end, &[query]);
                records.push((display_header(&collection.reference), reference_row));
                records.extend(rows.into_iter().map(|row| (self.query_header(query), row)));
            }
        } else {
            let queries: Vec<&QueryAlignment> = collection.queries.iter().collect();
            let (reference_row, rows) = render(&collection.reference, start, end, &queries);
            records.push((display_header(&collection.reference), reference_row));
            for (query, row) in collection.queries.iter().zip(rows) {
                records.push((self.query_header(query), row));
            }
        }

        let mut bytes = Vec::new();
        for (header, row) in &records {
            check_record(header, row)?;
            write_record(&mut bytes, header, row, self.line_width)?;
        }

        info!(
            "Step {position} ({NAME}): {} record(s), {} byte(s)",
            records.len(),
            bytes.len()
        );
        collection.report.push(ReportEntry {
            step: position,
            processor: NAME,
            summary: StepSummary::SaveFasta {
                records: records.len(),
                bytes: bytes.len(),
            },
        });
        Ok(StepOutcome::Output { collection, bytes })
    }

    fn query_header(&self, query: &QueryAlignment) -> String {
        let header = display_header(&query.query);
        if self.modifiers && !query.modifiers.is_empty() {
            format!("{} MOD::{}", header, modifier_text(&query.modifiers))
        } else {
            header
        }
    }
}

pub(crate) fn display_header(sequence: &Sequence) -> String {
    if sequence.description().is_empty() {
        sequence.header().to_string()
    } else {
        format!("{} {}", sequence.header(), sequence.description())
    }
}

fn modifier_text(modifiers: &[Modifier]) -> String {
    modifiers
        .iter()
        .map(Modifier::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

/// Reference window `[start, end)` to render: the last trim window if the
/// collection was trimmed, the whole reference otherwise.
fn rendered_window(collection: &AlignmentCollection) -> (usize, usize) {
    let full = (1, collection.reference.length() + 1);
    collection
        .report
        .entries()
        .iter()
        .rev()
        .find_map(|entry| match entry.summary {
            StepSummary::TrimByRef {
                ref_start, ref_end, ..
            } => Some((ref_start, ref_end)),
            // earlier windows use coordinates of the old reference
            StepSummary::ApplyFrameshift { .. } => Some(full),
            _ => None,
        })
        .unwrap_or(full)
}

/// Gapped rows of the reference and every query over reference positions
/// `[start, end)`. Insertion columns are as wide as the longest insertion
/// any query has at that boundary.
fn render(
    reference: &Sequence,
    start: usize,
    end: usize,
    queries: &[&QueryAlignment],
) -> (Vec<u8>, Vec<Vec<u8>>) {
    // slot b holds insertions after reference position b
    let first_slot = start.saturating_sub(1);
    let slots = end.saturating_sub(first_slot).max(1);
    let in_window = |b: usize| b >= first_slot && b < first_slot + slots;

    let mut insertions: Vec<Vec<Vec<UngappedPos>>> = Vec::with_capacity(queries.len());
    let mut widths = vec![0usize; slots];
    for query in queries {
        let pairs = query.alignment.pairs();
        let mut per_slot: Vec<Vec<UngappedPos>> = vec![Vec::new(); slots];
        for (pair, anchor) in pairs.iter().zip(anchors(pairs, None)) {
            if let (true, Some(q)) = (pair.is_insertion(), pair.query()) {
                if in_window(anchor) {
                    per_slot[anchor - first_slot].push(q);
                }
            }
        }
        for (width, slot) in widths.iter_mut().zip(&per_slot) {
            *width = (*width).max(slot.len());
        }
        insertions.push(per_slot);
    }

    let mut reference_row = Vec::new();
    for (idx, &width) in widths.iter().enumerate() {
        reference_row.extend(std::iter::repeat_n(b'-', width));
        let b = first_slot + idx;
        if b + 1 < end {
            let symbol = UngappedPos::new(b + 1).and_then(|p| reference.symbol_at(p));
            reference_row.push(symbol.unwrap_or(b'-'));
        }
    }

    let rows = queries
        .iter()
        .zip(&insertions)
        .map(|(query, per_slot)| {
            let mut matched = vec![None; slots];
            for pair in query.alignment.pairs() {
                if let (Some(r), q) = (pair.reference(), pair.query()) {
                    if in_window(r.offset()) {
                        matched[r.offset() - first_slot] = q;
                    }
                }
            }
            let symbol = |q: UngappedPos| query.query.symbol_at(q).unwrap_or(b'-');
            let mut row = Vec::with_capacity(reference_row.len());
            for (idx, &width) in widths.iter().enumerate() {
                let inserted = &per_slot[idx];
                row.extend(inserted.iter().map(|&q| symbol(q)));
                row.extend(std::iter::repeat_n(b'-', width - inserted.len()));
                if first_slot + idx + 1 < end {
                    row.push(matched[idx].map_or(b'-', symbol));
                }
            }
            row
        })
        .collect();
    (reference_row, rows)
}

fn check_record(header: &str, row: &[u8]) -> Result<()> {
    if header.contains(['\n', '\r']) {
        return Err(PostAlignError::SerializationError {
            format: "FASTA",
            reason: format!("header {header:?} contains a line break"),
        });
    }
    if let Some(&symbol) = row.iter().find(|s| !s.is_ascii_graphic()) {
        return Err(PostAlignError::SerializationError {
            format: "FASTA",
            reason: format!(
                "record '{}' contains non-printable symbol 0x{:02x}",
                header, symbol
            ),
        });
    }
    Ok(())
}
