use crate::collection::AlignmentCollection;
use crate::error::{PostAlignError, Result};
use crate::processors::{Processor, StepOutcome};
use log::{debug, info};

/// The collection after the last step and the document it wrote.
#[derive(Debug)]
pub struct PipelineOutput {
    pub collection: AlignmentCollection,
    pub output: Vec<u8>,
}

/// An ordered list of processors ending in exactly one output processor.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<Processor>,
}

impl Pipeline {
    pub fn new(steps: Vec<Processor>) -> Result<Self> {
        let Some(last) = steps.last() else {
            return Err(PostAlignError::config("pipeline", "no steps given"));
        };
        if !last.is_output() {
            return Err(PostAlignError::config(
                "pipeline",
                format!(
                    "the last step must be save-fasta or save-json, not {}",
                    last.name()
                ),
            ));
        }
        if let Some((idx, step)) = steps[..steps.len() - 1]
            .iter()
            .enumerate()
            .find(|(_, step)| step.is_output())
        {
            return Err(PostAlignError::config(
                "pipeline",
                format!("output step {} ({}) must be the last step", idx + 1, step.name()),
            ));
        }
        Ok(Self { steps })
    }

    /// Parse each `--step` argument in order.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let steps = specs
            .iter()
            .map(|spec| Processor::from_spec(spec.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(steps)
    }

    pub fn steps(&self) -> &[Processor] {
        &self.steps
    }

    /// Apply every step in order, stopping at the first failure.
    pub fn run(&self, collection: AlignmentCollection) -> Result<PipelineOutput> {
        let mut collection = collection;
        for (idx, step) in self.steps.iter().enumerate() {
            let position = idx + 1;
            debug!("Running step {} ({})", position, step.name());
            let outcome = step
                .apply(position, collection)
                .map_err(|source| PostAlignError::Pipeline {
                    position,
                    processor: step.name().to_string(),
                    source: Box::new(source),
                })?;
            match outcome {
                StepOutcome::Collection(next) => collection = next,
                StepOutcome::Output {
                    collection: last,
                    bytes,
                } => {
                    info!(
                        "Pipeline finished after {} step(s), {} query alignment(s)",
                        position,
                        last.len()
                    );
                    return Ok(PipelineOutput {
                        collection: last,
                        output: bytes,
                    });
                }
            }
        }
        // only reachable if an output step did not produce output
        Err(PostAlignError::config("pipeline", "no step produced output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::collection::QueryAlignment;
    use crate::sequence::{SeqType, Sequence};

    fn collection() -> AlignmentCollection {
        let reference = Sequence::new("ref", "", b"ATGAAACCCGGG", SeqType::Nucleotide).unwrap();
        let query = Sequence::new("q1", "", b"ATGAACCCGGG", SeqType::Nucleotide).unwrap();
        let alignment = Alignment::from_gapped_rows(b"ATGAAACCCGGG", b"ATGAA-CCCGGG").unwrap();
        AlignmentCollection::new(reference, vec![QueryAlignment::new(0, query, alignment)])
    }

    #[test]
    fn test_new_checks_output_placement() {
        assert!(Pipeline::from_specs::<&str>(&[]).is_err());
        assert!(Pipeline::from_specs(&["codon-alignment"]).is_err());
        assert!(Pipeline::from_specs(&["save-fasta", "save-json"]).is_err());
        let pipeline = Pipeline::from_specs(&["codon-alignment", "save-json"]).unwrap();
        assert_eq!(pipeline.steps().len(), 2);
    }

    #[test]
    fn test_run_threads_collection_and_report() {
        let pipeline =
            Pipeline::from_specs(&["codon-alignment", "trim-by-ref:ref-start=4", "save-fasta"])
                .unwrap();
        let result = pipeline.run(collection()).unwrap();
        let processors: Vec<&str> = result
            .collection
            .report
            .entries()
            .iter()
            .map(|entry| entry.processor)
            .collect();
        assert_eq!(processors, vec!["codon-alignment", "trim-by-ref", "save-fasta"]);
        let text = String::from_utf8(result.output).unwrap();
        assert_eq!(
            text,
            ">ref\nAAACCCGGG\n>q1 MOD::1:codon-alignment|2:trim-by-ref(4..13)\n---CCCGGG\n"
        );
    }

    #[test]
    fn test_frameshift_after_trim_renders_new_reference() {
        let pipeline = Pipeline::from_specs(&[
            "trim-by-ref:ref-start=4",
            "apply-frameshift:frameshift=6+3",
            "save-fasta",
        ])
        .unwrap();
        let result = pipeline.run(collection()).unwrap();
        assert_eq!(result.collection.reference.symbols(), b"ATGAAAGGG");
        assert_eq!(result.collection.queries[0].query.symbols(), b"ATGAAGGG");
        let text = String::from_utf8(result.output).unwrap();
        assert_eq!(
            text,
            ">ref\nATGAAAGGG\n>q1 MOD::1:trim-by-ref(4..13)|2:apply-frameshift(6+3)\n---AA-GGG\n"
        );
    }

    #[test]
    fn test_failure_names_step() {
        let reference = Sequence::new("ref", "", b"MKV", SeqType::AminoAcid).unwrap();
        let query = Sequence::new("q", "", b"MKV", SeqType::AminoAcid).unwrap();
        let alignment = Alignment::from_gapped_rows(b"MKV", b"MKV").unwrap();
        let collection =
            AlignmentCollection::new(reference, vec![QueryAlignment::new(0, query, alignment)]);
        let pipeline =
            Pipeline::from_specs(&["trim-by-ref", "codon-alignment", "save-json"]).unwrap();
        let err = pipeline.run(collection).unwrap_err();
        assert!(matches!(
            err,
            PostAlignError::Pipeline {
                position: 2,
                ref processor,
                ..
            } if processor == "codon-alignment"
        ));
        assert!(matches!(
            err.root_cause(),
            PostAlignError::UnsupportedSequenceType { .. }
        ));
    }
}
