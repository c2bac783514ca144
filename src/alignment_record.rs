use crate::alignment::Alignment;
use crate::cigar::{cigar_to_pairs, CigarOp};
use crate::error::{PostAlignError, Result};
use clap::ValueEnum;

/// A PAF alignment record with its CIGAR already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub query_name: String,
    pub query_len: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub target_name: String,
    pub target_len: usize,
    pub target_start: usize,
    pub target_end: usize,
    pub strand: Strand,
    pub cigar: Vec<CigarOp>,
}

/// Strand orientation for alignments
#[derive(Default, PartialEq, Eq, Clone, Copy, Debug)]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
}

impl AlignmentRecord {
    pub fn is_reverse(&self) -> bool {
        self.strand == Strand::Reverse
    }

    /// Raw `(reference, query)` pairs covered by this record.
    pub fn raw_pairs(&self) -> Vec<(Option<usize>, Option<usize>)> {
        cigar_to_pairs(&self.cigar, self.target_start, self.query_start)
    }

    /// Check that the CIGAR spans exactly the declared coordinates.
    pub fn validate(&self) -> Result<()> {
        let target_span: usize = self.cigar.iter().map(|op| op.target_delta()).sum();
        let query_span: usize = self.cigar.iter().map(|op| op.query_delta()).sum();
        if self.target_start + target_span != self.target_end
            || self.query_start + query_span != self.query_end
        {
            return Err(PostAlignError::malformed(format!(
                "CIGAR of '{}' covers {}..{} / {}..{} but the record declares {}..{} / {}..{}",
                self.query_name,
                self.target_start,
                self.target_start + target_span,
                self.query_start,
                self.query_start + query_span,
                self.target_start,
                self.target_end,
                self.query_start,
                self.query_end
            )));
        }
        Ok(())
    }

    pub fn to_alignment(&self) -> Result<Alignment> {
        self.validate()?;
        Alignment::build(self.target_len, self.query_len, self.raw_pairs())
    }
}

/// Input alignment format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlignmentFormat {
    /// Multiple sequence alignment in FASTA format
    Msa,
    /// PAF with `cg:Z:` CIGAR tags
    Paf,
    /// Align on the fly with minimap2
    Minimap2,
}

impl AlignmentFormat {
    /// Detect format from file extension
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with(".paf") || path.ends_with(".paf.gz") || path.ends_with(".paf.bgz") {
            Some(AlignmentFormat::Paf)
        } else if [".fa", ".fas", ".fasta", ".aln", ".msa"]
            .iter()
            .any(|ext| path.ends_with(ext))
        {
            Some(AlignmentFormat::Msa)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cigar::parse_cigar;

    fn record(cigar: &str, strand: Strand) -> AlignmentRecord {
        AlignmentRecord {
            query_name: "q1".to_string(),
            query_len: 10,
            query_start: 1,
            query_end: 7,
            target_name: "ref".to_string(),
            target_len: 20,
            target_start: 5,
            target_end: 12,
            strand,
            cigar: parse_cigar(cigar).unwrap(),
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            AlignmentFormat::from_path("test.paf"),
            Some(AlignmentFormat::Paf)
        );
        assert_eq!(
            AlignmentFormat::from_path("test.paf.gz"),
            Some(AlignmentFormat::Paf)
        );
        assert_eq!(
            AlignmentFormat::from_path("aligned.fasta"),
            Some(AlignmentFormat::Msa)
        );
        assert_eq!(AlignmentFormat::from_path("test.txt"), None);
    }

    #[test]
    fn test_record_to_alignment() {
        let rec = record("3M1I2D2M", Strand::Forward);
        assert!(!rec.is_reverse());
        let aln = rec.to_alignment().unwrap();
        assert_eq!(aln.to_cigar(), "3M1I2D2M");
        assert_eq!(aln.ref_span().map(|(a, b)| (a.get(), b.get())), Some((6, 12)));
        assert_eq!(aln.query_span().map(|(a, b)| (a.get(), b.get())), Some((2, 7)));
    }

    #[test]
    fn test_record_span_mismatch() {
        let rec = record("3M", Strand::Forward);
        assert!(matches!(
            rec.to_alignment(),
            Err(PostAlignError::MalformedAlignment { .. })
        ));
    }
}
