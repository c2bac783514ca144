//! Running minimap2 on the fly.

use crate::alignment_record::AlignmentRecord;
use crate::error::{PostAlignError, Result};
use crate::fasta::write_record;
use crate::paf::parse_paf;
use crate::sequence::Sequence;
use log::{debug, info};
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minimap2 {
    /// Executable to run
    pub program: String,
    /// Extra arguments placed before the input files
    pub extra_args: Vec<String>,
}

impl Default for Minimap2 {
    fn default() -> Self {
        Self {
            program: "minimap2".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl Minimap2 {
    pub fn new(program: impl Into<String>, options: Option<&str>) -> Self {
        Self {
            program: program.into(),
            extra_args: options
                .map(|o| o.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    /// Align every query against the reference. Queries are written under
    /// their index, so record `query_name`s are the decimal indices into
    /// `queries`.
    pub fn align(
        &self,
        reference: &Sequence,
        queries: &[Sequence],
    ) -> Result<Vec<AlignmentRecord>> {
        let workdir = tempfile::Builder::new()
            .prefix("postalign-minimap2-")
            .tempdir()?;
        let target_path = workdir.path().join("target.fa");
        let query_path = workdir.path().join("query.fa");
        write_fasta(&target_path, [(reference.header().to_string(), reference)])?;
        write_fasta(
            &query_path,
            queries.iter().enumerate().map(|(idx, q)| (idx.to_string(), q)),
        )?;

        info!(
            "Aligning {} queries against '{}' with {}",
            queries.len(),
            reference.header(),
            self.program
        );
        let output = Command::new(&self.program)
            .arg("-c")
            .args(&self.extra_args)
            .arg(&target_path)
            .arg(&query_path)
            .output()
            .map_err(|e| {
                PostAlignError::Aligner(format!("could not run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PostAlignError::Aligner(format!(
                "{} exited with code {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            )));
        }
        let records = parse_paf(Cursor::new(output.stdout))?;
        debug!("{} produced {} PAF records", self.program, records.len());
        Ok(records)
    }
}

fn write_fasta<'a, I>(path: &Path, records: I) -> Result<()>
where
    I: IntoIterator<Item = (String, &'a Sequence)>,
{
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    for (name, sequence) in records {
        write_record(&mut writer, &name, sequence.symbols(), 0)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SeqType;

    #[test]
    fn test_options_are_split() {
        let aligner = Minimap2::new("/opt/minimap2", Some("-x asm5  --eqx"));
        assert_eq!(aligner.program, "/opt/minimap2");
        assert_eq!(aligner.extra_args, vec!["-x", "asm5", "--eqx"]);
        assert!(Minimap2::default().extra_args.is_empty());
    }

    #[test]
    fn test_missing_program_is_an_aligner_error() {
        let reference = Sequence::new("ref", "", b"ACGT", SeqType::Nucleotide).unwrap();
        let aligner = Minimap2::new("postalign-no-such-minimap2", None);
        assert!(matches!(
            aligner.align(&reference, &[]),
            Err(PostAlignError::Aligner(_))
        ));
    }
}
