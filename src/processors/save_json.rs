//! JSON report of a collection.
//!
//! The document carries the reference, the reading frame, the report of the
//! steps that ran before and, per query, the alignment summary with its
//! statistics, notes and messages. Gene ranges add a codon-level report per
//! gene listing amino-acid mutations and frameshifts.

use super::{StepOptions, StepOutcome};
use crate::alignment::{AlignedPair, AlignmentStats};
use crate::codon::translate_codon;
use crate::codon_alignment::CodonNote;
use crate::collection::{
    AlignmentCollection, Message, Note, QueryAlignment, ReportEntry, StepNote, StepSummary,
};
use crate::error::{PostAlignError, Result};
use crate::position::UngappedPos;
use crate::sequence::{SeqType, Sequence};
use log::info;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

const NAME: &str = "save-json";

/// A gene as one or more 1-based inclusive reference ranges, joined in
/// order before being read as codons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRange {
    pub name: String,
    pub ranges: Vec<(usize, usize)>,
}

impl GeneRange {
    /// Parse `NAME:START-END[+START-END...]`.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let (name, ranges) = text
            .split_once(':')
            .ok_or_else(|| format!("gene '{text}' must be written NAME:START-END"))?;
        if name.is_empty() {
            return Err(format!("gene '{text}' has no name"));
        }
        let ranges = ranges
            .split('+')
            .map(|range| {
                let (start, end) = range
                    .split_once('-')
                    .ok_or_else(|| format!("range '{range}' of gene {name} must be START-END"))?;
                let parse = |value: &str| {
                    value
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| format!("invalid coordinate '{value}' in gene {name}"))
                };
                let (start, end) = (parse(start)?, parse(end)?);
                if start < 1 {
                    return Err(format!("gene {name}: START must be at least 1"));
                }
                if end < start + 2 {
                    return Err(format!(
                        "gene {name}: range {start}-{end} is shorter than one codon"
                    ));
                }
                Ok((start, end))
            })
            .collect::<std::result::Result<Vec<_>, String>>()?;
        Ok(Self {
            name: name.to_string(),
            ranges,
        })
    }

    /// Reference positions of the gene, three per codon; a trailing
    /// incomplete codon is left out.
    fn codons(&self) -> Vec<[UngappedPos; 3]> {
        let positions: Vec<UngappedPos> = self
            .ranges
            .iter()
            .flat_map(|&(start, end)| (start..=end).filter_map(UngappedPos::new))
            .collect();
        positions
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }
}

impl fmt::Display for GeneRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ranges: Vec<String> = self
            .ranges
            .iter()
            .map(|(start, end)| format!("{start}-{end}"))
            .collect();
        write!(f, "{}:{}", self.name, ranges.join("+"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SaveJson {
    pub genes: Vec<GeneRange>,
    pub pretty: bool,
}

impl SaveJson {
    pub(crate) fn from_options(options: &mut StepOptions) -> Result<Self> {
        let genes = options
            .take_all("gene")
            .iter()
            .map(|text| GeneRange::parse(text))
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(|reason| options.invalid(reason))?;
        Ok(Self {
            genes,
            pretty: options.take_bool("pretty")?.unwrap_or(false),
        })
    }

    pub fn apply(
        &self,
        position: usize,
        mut collection: AlignmentCollection,
    ) -> Result<StepOutcome> {
        if !self.genes.is_empty() && collection.reference.seq_type() != SeqType::Nucleotide {
            return Err(PostAlignError::UnsupportedSequenceType {
                operation: "gene reports",
                seq_type: collection.reference.seq_type().as_str(),
            });
        }

        let reference = &collection.reference;
        let queries: Vec<QueryReport<'_>> = collection
            .queries
            .par_iter()
            .map(|query| QueryReport::new(reference, query, &self.genes))
            .collect();
        for query in &queries {
            query.check_finite()?;
        }
        let document = Document {
            reference: ReferenceInfo {
                name: reference.header(),
                description: reference.description(),
                length: reference.length(),
                seq_type: reference.seq_type().as_str(),
            },
            reading_frame: collection.reading_frame.map(|frame| frame.start()),
            steps: collection.report.entries(),
            queries,
        };

        let mut bytes = if self.pretty {
            serde_json::to_vec_pretty(&document)
        } else {
            serde_json::to_vec(&document)
        }
        .map_err(|e| PostAlignError::SerializationError {
            format: "JSON",
            reason: e.to_string(),
        })?;
        bytes.push(b'\n');
        let records = document.queries.len();

        info!("Step {position} ({NAME}): {records} record(s), {} byte(s)", bytes.len());
        collection.report.push(ReportEntry {
            step: position,
            processor: NAME,
            summary: StepSummary::SaveJson {
                records,
                bytes: bytes.len(),
            },
        });
        Ok(StepOutcome::Output { collection, bytes })
    }
}

#[derive(Serialize)]
struct Document<'a> {
    reference: ReferenceInfo<'a>,
    reading_frame: Option<usize>,
    steps: &'a [ReportEntry],
    queries: Vec<QueryReport<'a>>,
}

#[derive(Serialize)]
struct ReferenceInfo<'a> {
    name: &'a str,
    description: &'a str,
    length: usize,
    seq_type: &'static str,
}

#[derive(Serialize)]
struct AlignmentSummary {
    ref_start: Option<usize>,
    ref_end: Option<usize>,
    query_start: Option<usize>,
    query_end: Option<usize>,
    pairs: usize,
    cigar: String,
}

#[derive(Serialize)]
struct QueryReport<'a> {
    index: usize,
    name: &'a str,
    description: &'a str,
    modifiers: Vec<String>,
    alignment: AlignmentSummary,
    stats: AlignmentStats,
    notes: &'a [StepNote],
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    gene_reports: Vec<GeneReport>,
}

impl<'a> QueryReport<'a> {
    fn new(reference: &Sequence, query: &'a QueryAlignment, genes: &[GeneRange]) -> Self {
        let alignment = &query.alignment;
        let ref_span = alignment.ref_span();
        let query_span = alignment.query_span();
        QueryReport {
            index: query.index,
            name: query.query.header(),
            description: query.query.description(),
            modifiers: query.modifiers.iter().map(ToString::to_string).collect(),
            alignment: AlignmentSummary {
                ref_start: ref_span.map(|(first, _)| first.get()),
                ref_end: ref_span.map(|(_, last)| last.get()),
                query_start: query_span.map(|(first, _)| first.get()),
                query_end: query_span.map(|(_, last)| last.get()),
                pairs: alignment.len(),
                cigar: alignment.to_cigar(),
            },
            stats: alignment.stats(reference, &query.query),
            notes: &query.notes,
            messages: &query.messages,
            gene_reports: genes
                .iter()
                .map(|gene| GeneReport::new(gene, reference, query))
                .collect(),
        }
    }

    fn check_finite(&self) -> Result<()> {
        let note_scores = self.notes.iter().filter_map(|note| match &note.detail {
            Note::Codon(CodonNote::Shift { score_delta, .. })
            | Note::Codon(CodonNote::Realigned { score_delta, .. }) => Some(*score_delta),
            _ => None,
        });
        let mut values = [self.stats.reference_coverage, self.stats.query_coverage]
            .into_iter()
            .chain(note_scores);
        match values.find(|v| !v.is_finite()) {
            None => Ok(()),
            Some(value) => Err(PostAlignError::SerializationError {
                format: "JSON",
                reason: format!("query '{}' has non-finite value {value}", self.name),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct CodonReport {
    position: usize,
    ref_codon: String,
    codon: String,
    ref_amino_acids: String,
    amino_acids: String,
    inserted: String,
    is_insertion: bool,
    is_deletion: bool,
}

#[derive(Debug, Serialize)]
struct AlignedSite {
    position: usize,
    query_positions: Vec<Option<usize>>,
    length: usize,
}

#[derive(Debug, Serialize)]
struct Frameshift {
    position: usize,
    gap_length: usize,
    is_insertion: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bases: Option<String>,
}

#[derive(Debug, Serialize)]
struct GeneReport {
    gene: String,
    first_aa: Option<usize>,
    last_aa: Option<usize>,
    aligned_sites: Vec<AlignedSite>,
    mutations: Vec<CodonReport>,
    frameshifts: Vec<Frameshift>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// What the query has at one reference position: the paired base (if any)
/// and the bases inserted right after it.
#[derive(Clone, Default)]
struct Site {
    covered: bool,
    query: Option<UngappedPos>,
    inserted: Vec<UngappedPos>,
}

impl GeneReport {
    fn new(gene: &GeneRange, reference: &Sequence, query: &QueryAlignment) -> Self {
        let sites = sites(reference.length(), query.alignment.pairs());
        let site = |pos: UngappedPos| sites.get(pos.offset()).cloned().unwrap_or_default();
        let codons = gene.codons();

        // codons at either end with no query base are outside the alignment
        let has_bases = |codon: &[UngappedPos; 3]| codon.iter().any(|&p| site(p).query.is_some());
        let first = codons.iter().position(has_bases);
        let last = codons.iter().rposition(has_bases);

        let mut report = GeneReport {
            gene: gene.name.clone(),
            first_aa: None,
            last_aa: None,
            aligned_sites: Vec::new(),
            mutations: Vec::new(),
            frameshifts: Vec::new(),
            error: None,
        };
        let (Some(first), Some(last)) = (first, last) else {
            report.error = Some("Sequence is not aligned".to_string());
            return report;
        };

        for (idx, codon) in codons.iter().enumerate().take(last + 1).skip(first) {
            let aa_position = idx + 1;
            let codon_sites: Vec<Site> = codon.iter().map(|&p| site(p)).collect();
            if codon_sites.iter().any(|s| !s.covered) {
                continue;
            }
            let symbol = |q: UngappedPos| query.query.symbol_at(q).unwrap_or(b'-');
            let ref_codon: Vec<u8> = codon
                .iter()
                .map(|&p| reference.symbol_at(p).unwrap_or(b'-'))
                .collect();
            let query_codon: Vec<u8> = codon_sites
                .iter()
                .map(|s| s.query.map_or(b'-', symbol))
                .collect();
            let mut query_positions: Vec<Option<usize>> =
                codon_sites.iter().map(|s| s.query.map(UngappedPos::get)).collect();

            // only bases inserted after the codon count as inserted codons;
            // those inside it are frameshifting
            let inner_inserted: usize = codon_sites[..2].iter().map(|s| s.inserted.len()).sum();
            let trailing = &codon_sites[2].inserted;
            let all_inserted: Vec<UngappedPos> = codon_sites
                .iter()
                .flat_map(|s| s.inserted.iter().copied())
                .collect();
            query_positions.extend(all_inserted.iter().map(|p| Some(p.get())));

            let matched = codon_sites.iter().filter(|s| s.query.is_some()).count();
            let length = matched + all_inserted.len();
            let (ins_shift, del_shift) = if length > 0 && length < 3 {
                (0, 3 - length)
            } else {
                (length % 3, 0)
            };
            let kept_inserted = if inner_inserted == 0 && trailing.len() % 3 == 0 {
                trailing.len()
            } else {
                0
            };

            let codon_text = String::from_utf8_lossy(&query_codon).into_owned();
            let ref_amino_acids = translate_codon(&ref_codon);
            let amino_acids = translate_codon(&query_codon);
            let codon_report = CodonReport {
                position: aa_position,
                ref_codon: String::from_utf8_lossy(&ref_codon).into_owned(),
                is_deletion: codon_text == "---",
                codon: codon_text,
                inserted: trailing[..kept_inserted]
                    .iter()
                    .map(|&q| symbol(q) as char)
                    .collect(),
                is_insertion: kept_inserted > 0,
                ref_amino_acids,
                amino_acids,
            };
            report.first_aa.get_or_insert(aa_position);
            report.last_aa = Some(aa_position);
            report.aligned_sites.push(AlignedSite {
                position: aa_position,
                query_positions,
                length,
            });
            if ins_shift > 0 {
                let tail = &all_inserted[all_inserted.len().saturating_sub(ins_shift)..];
                report.frameshifts.push(Frameshift {
                    position: aa_position,
                    gap_length: ins_shift,
                    is_insertion: true,
                    bases: Some(tail.iter().map(|&q| symbol(q) as char).collect()),
                });
            } else if del_shift > 0 {
                report.frameshifts.push(Frameshift {
                    position: aa_position,
                    gap_length: del_shift,
                    is_insertion: false,
                    bases: None,
                });
            }
            if codon_report.ref_amino_acids != codon_report.amino_acids
                || codon_report.is_insertion
            {
                report.mutations.push(codon_report);
            }
        }
        if report.aligned_sites.is_empty() {
            report.error = Some("Sequence is not aligned".to_string());
        }
        report
    }
}

/// Per reference offset: whether the alignment covers it, the paired query
/// base and the insertions that follow it.
fn sites(ref_len: usize, pairs: &[AlignedPair]) -> Vec<Site> {
    let mut sites = vec![Site::default(); ref_len];
    let mut last: Option<usize> = None;
    for pair in pairs {
        match *pair {
            AlignedPair::Match { reference, query } => {
                if let Some(site) = sites.get_mut(reference.offset()) {
                    site.covered = true;
                    site.query = Some(query);
                }
                last = Some(reference.offset());
            }
            AlignedPair::Deletion { reference } => {
                if let Some(site) = sites.get_mut(reference.offset()) {
                    site.covered = true;
                }
                last = Some(reference.offset());
            }
            AlignedPair::Insertion { query } => {
                if let Some(site) = last.and_then(|offset| sites.get_mut(offset)) {
                    site.inserted.push(query);
                }
            }
        }
    }
    sites
}
