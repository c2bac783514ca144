use super::StepOptions;
use crate::codon_alignment::{codon_align, CodonAlignConfig, CodonNote, TieBreak};
use crate::collection::{
    AlignmentCollection, Message, MessageLevel, Note, ReportEntry, StepNote, StepSummary,
};
use crate::error::Result;
use log::info;

const NAME: &str = "codon-alignment";

#[derive(Debug, Clone, PartialEq)]
pub struct CodonAlignmentStep {
    pub config: CodonAlignConfig,
}

impl CodonAlignmentStep {
    pub(crate) fn from_options(options: &mut StepOptions) -> Result<Self> {
        let mut config = CodonAlignConfig::default();
        if let Some(frame_start) = options.take_parsed("frame-start")? {
            config.frame_start = frame_start;
        }
        if let Some(window_size) = options.take_parsed("window-size")? {
            config.window_size = window_size;
        }
        if let Some(score) = options.take_score("match-score")? {
            config.scoring.match_score = score;
        }
        if let Some(score) = options.take_score("mismatch-score")? {
            config.scoring.mismatch_score = score;
        }
        if let Some(score) = options.take_score("wildcard-score")? {
            config.scoring.wildcard_score = score;
        }
        if let Some(tie_break) = options.take("tie-break")? {
            config.tie_break = match tie_break.as_str() {
                "left" => TieBreak::Left,
                "right" => TieBreak::Right,
                other => {
                    return Err(options.invalid(format!(
                        "tie-break must be 'left' or 'right', got '{other}'"
                    )))
                }
            };
        }
        Ok(Self { config })
    }

    pub fn apply(
        &self,
        position: usize,
        collection: AlignmentCollection,
    ) -> Result<AlignmentCollection> {
        let config = self.config;
        let mut collection = collection.try_map_queries(|reference, mut query| {
            let result = codon_align(reference, &query.query, &query.alignment, &config)?;
            if result.alignment != query.alignment {
                query.add_modifier(position, NAME);
            }
            for note in result.notes {
                if let Some(warning) = frameshift_message(&note) {
                    query
                        .messages
                        .push(Message::new(MessageLevel::Warning, warning));
                }
                query.notes.push(StepNote {
                    step: position,
                    processor: NAME,
                    detail: Note::Codon(note),
                });
            }
            query.alignment = result.alignment;
            Ok(query)
        })?;

        let step_notes = || {
            collection
                .queries
                .iter()
                .flat_map(|q| &q.notes)
                .filter(|n| n.step == position)
                .filter_map(|n| match &n.detail {
                    Note::Codon(note) => Some(note),
                    _ => None,
                })
        };
        let summary = StepSummary::CodonAlignment {
            frame_start: config.frame_start,
            queries: collection.len(),
            shifted_runs: step_notes()
                .filter(|n| matches!(n, CodonNote::Shift { .. }))
                .count(),
            realigned_codons: step_notes()
                .filter(|n| matches!(n, CodonNote::Realigned { .. }))
                .count(),
            frameshifts: step_notes().filter(|n| n.is_frameshift()).count(),
            dropped_query_bases: step_notes().map(CodonNote::dropped_bases).sum(),
        };
        info!("Step {position} ({NAME}): {summary:?}");

        collection.reading_frame = Some(config.frame());
        collection.report.push(ReportEntry {
            step: position,
            processor: NAME,
            summary,
        });
        Ok(collection)
    }
}

fn frameshift_message(note: &CodonNote) -> Option<String> {
    match note {
        CodonNote::FrameshiftDeletion { codon, missing, .. } => Some(format!(
            "frameshift deletion of {missing} base(s) in codon {codon}; codon deleted"
        )),
        CodonNote::FrameshiftInsertion {
            before_codon,
            length,
            ..
        } => Some(format!(
            "frameshift insertion of {length} base(s) before codon {before_codon}; bases removed"
        )),
        _ => None,
    }
}
