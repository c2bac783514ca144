//! The value threaded through a pipeline: a reference, its aligned queries
//! and what each step did to them.

use crate::alignment::Alignment;
use crate::codon_alignment::CodonNote;
use crate::error::Result;
use crate::position::ReadingFrame;
use crate::sequence::Sequence;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Diagnostic attached to one query, surfaced in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: MessageLevel,
    pub message: String,
}

impl Message {
    pub fn new(level: MessageLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// A step that changed a query, rendered as `STEP:TEXT` in FASTA headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Modifier {
    pub step: usize,
    pub text: String,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.step, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrimNote {
    /// 1-based inclusive start of the window actually applied
    pub window_start: usize,
    /// 1-based exclusive end of the window actually applied
    pub window_end: usize,
    pub dropped_pairs: usize,
}

/// Reference columns removed by a known frameshift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalNote {
    pub removed_ref_positions: usize,
    pub dropped_pairs: usize,
    pub dropped_query_bases: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Note {
    Codon(CodonNote),
    Trim(TrimNote),
    Removal(RemovalNote),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepNote {
    pub step: usize,
    pub processor: &'static str,
    pub detail: Note,
}

/// One query with its current alignment against the reference.
#[derive(Debug, Clone)]
pub struct QueryAlignment {
    /// Position of the query in the input
    pub index: usize,
    pub query: Sequence,
    pub alignment: Alignment,
    pub modifiers: Vec<Modifier>,
    pub notes: Vec<StepNote>,
    pub messages: Vec<Message>,
}

impl QueryAlignment {
    pub fn new(index: usize, query: Sequence, alignment: Alignment) -> Self {
        Self {
            index,
            query,
            alignment,
            modifiers: Vec::new(),
            notes: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn with_message(mut self, level: MessageLevel, message: impl Into<String>) -> Self {
        self.messages.push(Message::new(level, message));
        self
    }

    pub fn add_modifier(&mut self, step: usize, text: impl Into<String>) {
        self.modifiers.push(Modifier {
            step,
            text: text.into(),
        });
    }

    pub fn name(&self) -> &str {
        self.query.header()
    }
}

/// Per-step summary recorded in the collection report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSummary {
    CodonAlignment {
        frame_start: usize,
        queries: usize,
        shifted_runs: usize,
        realigned_codons: usize,
        frameshifts: usize,
        dropped_query_bases: usize,
    },
    TrimByRef {
        ref_start: usize,
        ref_end: usize,
        dropped_pairs: usize,
    },
    ApplyFrameshift {
        removed_ref_positions: usize,
        ref_length: usize,
        dropped_pairs: usize,
        dropped_query_bases: usize,
    },
    SaveFasta {
        records: usize,
        bytes: usize,
    },
    SaveJson {
        records: usize,
        bytes: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub step: usize,
    pub processor: &'static str,
    pub summary: StepSummary,
}

/// Step entries in the order the steps ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Report(Vec<ReportEntry>);

impl Report {
    pub fn push(&mut self, entry: ReportEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct AlignmentCollection {
    pub reference: Sequence,
    pub queries: Vec<QueryAlignment>,
    /// Frame recorded by the last codon-alignment step
    pub reading_frame: Option<ReadingFrame>,
    pub report: Report,
}

impl AlignmentCollection {
    pub fn new(reference: Sequence, queries: Vec<QueryAlignment>) -> Self {
        Self {
            reference,
            queries,
            reading_frame: None,
            report: Report::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Apply `f` to every query in parallel. Results keep the input order and
    /// the first failure by input order is returned.
    pub fn try_map_queries<F>(self, f: F) -> Result<Self>
    where
        F: Fn(&Sequence, QueryAlignment) -> Result<QueryAlignment> + Sync,
    {
        let AlignmentCollection {
            reference,
            queries,
            reading_frame,
            report,
        } = self;

        let intermediate: Vec<Result<(usize, QueryAlignment)>> = queries
            .into_par_iter()
            .enumerate()
            .map(|(idx, query)| f(&reference, query).map(|query| (idx, query)))
            .collect();

        let mut ordered = Vec::with_capacity(intermediate.len());
        for entry in intermediate {
            let (idx, query) = entry?;
            ordered.push((idx, query));
        }

        ordered.sort_unstable_by_key(|(idx, _)| *idx);

        Ok(AlignmentCollection {
            reference,
            queries: ordered.into_iter().map(|(_, query)| query).collect(),
            reading_frame,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PostAlignError;
    use crate::sequence::SeqType;

    fn collection(n: usize) -> AlignmentCollection {
        let reference = Sequence::new("ref", "", b"ACGTACGT", SeqType::Nucleotide).unwrap();
        let queries = (0..n)
            .map(|i| {
                let query =
                    Sequence::new(format!("q{i}"), "", b"ACGT", SeqType::Nucleotide).unwrap();
                QueryAlignment::new(i, query, Alignment::empty(8, 4))
            })
            .collect();
        AlignmentCollection::new(reference, queries)
    }

    #[test]
    fn test_try_map_queries_keeps_input_order() {
        let mapped = collection(64)
            .try_map_queries(|reference, mut query| {
                query.add_modifier(1, format!("seen {}", reference.header()));
                Ok(query)
            })
            .unwrap();
        let indices: Vec<usize> = mapped.queries.iter().map(|q| q.index).collect();
        assert_eq!(indices, (0..64).collect::<Vec<_>>());
        assert_eq!(mapped.queries[5].modifiers[0].to_string(), "1:seen ref");
    }

    #[test]
    fn test_try_map_queries_reports_first_failure_in_input_order() {
        let err = collection(32)
            .try_map_queries(|_, query| {
                if query.index >= 7 {
                    Err(PostAlignError::malformed(format!("query {}", query.index)))
                } else {
                    Ok(query)
                }
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Malformed alignment: query 7");
    }
}
