//! Building an [`AlignmentCollection`] from the supported input formats.

use crate::aligner::Minimap2;
use crate::alignment::Alignment;
use crate::alignment_record::AlignmentRecord;
use crate::collection::{AlignmentCollection, MessageLevel, QueryAlignment};
use crate::error::{PostAlignError, Result};
use crate::fasta::{read_rows_from_path, read_sequences, FastaRow};
use crate::paf::parse_paf_file;
use crate::sequence::{is_gap, SeqType, Sequence};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Load a multiple sequence alignment. The reference is the record named by
/// `reference` (a header, or a FASTA file whose first record names it), or
/// the first record when `None`. Every other record becomes a query.
pub fn load_msa(
    path: &str,
    reference: Option<&str>,
    seq_type: SeqType,
    skip_invalid: bool,
) -> Result<AlignmentCollection> {
    let mut rows = read_rows_from_path(path)?;
    if rows.is_empty() {
        return Err(PostAlignError::malformed(format!(
            "'{path}' contains no sequences"
        )));
    }
    let reference_idx = match reference {
        None => 0,
        Some(name) => {
            let name = reference_name(name)?;
            rows.iter().position(|row| row.name == name).ok_or_else(|| {
                PostAlignError::config("input", format!("reference '{name}' not found in '{path}'"))
            })?
        }
    };

    let mut masked = vec![0usize; rows.len()];
    if skip_invalid {
        for (row, count) in rows.iter_mut().zip(masked.iter_mut()) {
            *count = mask_invalid(row, seq_type);
        }
    }
    let reference_row = rows.remove(reference_idx);
    let reference_masked = masked.remove(reference_idx);
    if reference_masked > 0 {
        warn!(
            "Removed {} invalid symbol(s) from reference '{}'",
            reference_masked, reference_row.name
        );
    }
    let reference = reference_row.to_sequence(seq_type, false)?;

    let queries = rows
        .iter()
        .zip(masked)
        .enumerate()
        .map(|(index, (row, removed))| {
            let query = row.to_sequence(seq_type, false)?;
            let alignment = Alignment::from_gapped_rows(&reference_row.residues, &row.residues)
                .map_err(|e| match e {
                    PostAlignError::MalformedAlignment { reason } => {
                        PostAlignError::malformed(format!("'{}': {}", row.name, reason))
                    }
                    other => other,
                })?;
            let mut query = QueryAlignment::new(index, query, alignment);
            if removed > 0 {
                query = query.with_message(
                    MessageLevel::Warning,
                    format!("{removed} invalid symbol(s) removed"),
                );
            }
            Ok(query)
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Loaded MSA '{}': reference '{}' ({} columns), {} queries",
        path,
        reference.header(),
        reference_row.residues.len(),
        queries.len()
    );
    Ok(AlignmentCollection::new(reference, queries))
}

/// Load pairwise alignments from a PAF file with `cg:Z:` CIGARs. The
/// reference is the first record of `reference_fasta`; queries come from
/// `queries_fasta` and are matched to PAF records by name.
pub fn load_paf(
    paf_path: &str,
    reference_fasta: &str,
    queries_fasta: &str,
    seq_type: SeqType,
    skip_invalid: bool,
) -> Result<AlignmentCollection> {
    let reference = first_sequence(reference_fasta, seq_type, skip_invalid)?;
    let queries = read_sequences(queries_fasta, seq_type, skip_invalid)?;
    let records = parse_paf_file(paf_path)?;
    debug!("Read {} PAF records from '{}'", records.len(), paf_path);
    collect_records(reference, queries, records, |_, query| {
        query.header().to_string()
    })
}

/// Align the queries against the reference with minimap2 and load the result.
pub fn load_minimap2(
    reference_fasta: &str,
    queries_fasta: &str,
    aligner: &Minimap2,
    seq_type: SeqType,
    skip_invalid: bool,
) -> Result<AlignmentCollection> {
    if seq_type != SeqType::Nucleotide {
        return Err(PostAlignError::UnsupportedSequenceType {
            operation: "minimap2 alignment",
            seq_type: seq_type.as_str(),
        });
    }
    let reference = first_sequence(reference_fasta, seq_type, skip_invalid)?;
    let queries = read_sequences(queries_fasta, seq_type, skip_invalid)?;
    let records = aligner.align(&reference, &queries)?;
    collect_records(reference, queries, records, |index, _| index.to_string())
}

/// `name` may be a FASTA file, in which case its first record names the
/// reference.
fn reference_name(name: &str) -> Result<String> {
    if !Path::new(name).is_file() {
        return Ok(name.to_string());
    }
    read_rows_from_path(name)?
        .into_iter()
        .next()
        .map(|row| row.name)
        .ok_or_else(|| PostAlignError::config("input", format!("'{name}' contains no sequences")))
}

fn first_sequence(path: &str, seq_type: SeqType, skip_invalid: bool) -> Result<Sequence> {
    read_rows_from_path(path)?
        .first()
        .map(|row| row.to_sequence(seq_type, skip_invalid))
        .unwrap_or_else(|| {
            Err(PostAlignError::config(
                "input",
                format!("reference file '{path}' contains no sequences"),
            ))
        })
}

/// Replace invalid non-gap symbols with gaps so the row keeps its columns.
fn mask_invalid(row: &mut FastaRow, seq_type: SeqType) -> usize {
    let mut count = 0;
    for symbol in row.residues.iter_mut() {
        if !is_gap(*symbol) && !seq_type.is_valid(symbol.to_ascii_uppercase()) {
            *symbol = b'-';
            count += 1;
        }
    }
    count
}

fn collect_records<K>(
    reference: Sequence,
    queries: Vec<Sequence>,
    records: Vec<AlignmentRecord>,
    key: K,
) -> Result<AlignmentCollection>
where
    K: Fn(usize, &Sequence) -> String,
{
    let ref_len = reference.length();
    let mut by_query: FxHashMap<String, Vec<AlignmentRecord>> = FxHashMap::default();
    for record in records {
        if record.target_len != ref_len {
            return Err(PostAlignError::malformed(format!(
                "record for '{}' targets '{}' of length {}, but the reference '{}' has {} bases",
                record.query_name,
                record.target_name,
                record.target_len,
                reference.header(),
                ref_len
            )));
        }
        if record.target_name != reference.header() {
            warn!(
                "Record for '{}' targets '{}'; using reference '{}'",
                record.query_name,
                record.target_name,
                reference.header()
            );
        }
        by_query
            .entry(record.query_name.clone())
            .or_default()
            .push(record);
    }

    let mut collected = Vec::with_capacity(queries.len());
    for (index, query) in queries.into_iter().enumerate() {
        let query_len = query.length();
        let Some(records) = by_query.remove(&key(index, &query)) else {
            warn!("No alignment found for '{}'", query.header());
            collected.push(
                QueryAlignment::new(index, query, Alignment::empty(ref_len, query_len))
                    .with_message(MessageLevel::Error, "no alignment found"),
            );
            continue;
        };
        if let Some(record) = records.iter().find(|r| r.query_len != query_len) {
            return Err(PostAlignError::malformed(format!(
                "record for '{}' declares query length {}, but the sequence has {} bases",
                query.header(),
                record.query_len,
                query_len
            )));
        }
        if records.iter().any(AlignmentRecord::is_reverse) {
            warn!("Skipping reverse strand alignment of '{}'", query.header());
            collected.push(
                QueryAlignment::new(index, query, Alignment::empty(ref_len, query_len))
                    .with_message(
                        MessageLevel::Warning,
                        "reverse strand alignment is not supported",
                    ),
            );
            continue;
        }
        let (alignment, skipped) = merge_records(ref_len, query_len, records)?;
        let mut aligned = QueryAlignment::new(index, query, alignment);
        if skipped > 0 {
            aligned = aligned.with_message(
                MessageLevel::Warning,
                format!("{skipped} overlapping alignment record(s) skipped"),
            );
        }
        collected.push(aligned);
    }
    for name in by_query.keys() {
        warn!("Ignoring alignment records for unknown query '{}'", name);
    }
    Ok(AlignmentCollection::new(reference, collected))
}

/// Chain the records of one query by target start. Records overlapping the
/// previous one on either sequence are skipped. The gap between two records
/// is filled diagonally; leftover reference positions become deletions and
/// leftover query bases are left unaligned.
fn merge_records(
    ref_len: usize,
    query_len: usize,
    mut records: Vec<AlignmentRecord>,
) -> Result<(Alignment, usize)> {
    records.sort_by_key(|r| (r.target_start, r.query_start));
    let mut raw = Vec::new();
    let mut skipped = 0;
    let mut previous: Option<(usize, usize)> = None;
    for record in &records {
        record.validate()?;
        if let Some((target_end, query_end)) = previous {
            if record.target_start < target_end || record.query_start < query_end {
                debug!(
                    "Skipping record {}:{}-{} overlapping the previous one",
                    record.query_name, record.query_start, record.query_end
                );
                skipped += 1;
                continue;
            }
            let ref_gap = record.target_start - target_end;
            let query_gap = record.query_start - query_end;
            let diagonal = ref_gap.min(query_gap);
            raw.extend((1..=diagonal).map(|i| (Some(target_end + i), Some(query_end + i))));
            raw.extend((target_end + diagonal + 1..=record.target_start).map(|r| (Some(r), None)));
        }
        raw.extend(record.raw_pairs());
        previous = Some((record.target_end, record.query_end));
    }
    Ok((Alignment::build(ref_len, query_len, raw)?, skipped))
}
