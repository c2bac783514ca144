//! Pipeline steps.
//!
//! A step is written `name` or `name:key=value,key=value`. A key without a
//! value means `true`; keys may repeat where a processor accepts a list.

mod apply_frameshift;
mod codon_alignment;
mod save_fasta;
mod save_json;
mod trim_by_ref;

pub use apply_frameshift::{ApplyFrameshift, KnownFrameshift};
pub use codon_alignment::CodonAlignmentStep;
pub use save_fasta::SaveFasta;
pub use save_json::{GeneRange, SaveJson};
pub use trim_by_ref::TrimByRef;

use crate::collection::AlignmentCollection;
use crate::error::{PostAlignError, Result};
use regex::Regex;
use std::str::FromStr;

const STEP_PATTERN: &str = r"^(?P<name>[a-z][a-z0-9-]*)(?::(?P<options>.*))?$";

/// What a step hands to the next one.
#[derive(Debug)]
pub enum StepOutcome {
    Collection(AlignmentCollection),
    /// Output processors also return the serialized document.
    Output {
        collection: AlignmentCollection,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Processor {
    CodonAlignment(CodonAlignmentStep),
    TrimByRef(TrimByRef),
    ApplyFrameshift(ApplyFrameshift),
    SaveFasta(SaveFasta),
    SaveJson(SaveJson),
}

impl Processor {
    pub const NAMES: [&'static str; 5] = [
        "codon-alignment",
        "trim-by-ref",
        "apply-frameshift",
        "save-fasta",
        "save-json",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Processor::CodonAlignment(_) => "codon-alignment",
            Processor::TrimByRef(_) => "trim-by-ref",
            Processor::ApplyFrameshift(_) => "apply-frameshift",
            Processor::SaveFasta(_) => "save-fasta",
            Processor::SaveJson(_) => "save-json",
        }
    }

    /// Whether the step produces the pipeline's output document.
    pub fn is_output(&self) -> bool {
        matches!(self, Processor::SaveFasta(_) | Processor::SaveJson(_))
    }

    /// Parse a step description such as `trim-by-ref:ref-start=790`.
    pub fn from_spec(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let step_regex = Regex::new(STEP_PATTERN).map_err(|e| {
            PostAlignError::config(spec, format!("could not compile step pattern: {e}"))
        })?;
        let captures = step_regex
            .captures(spec)
            .ok_or_else(|| PostAlignError::config(spec, "expected NAME or NAME:KEY=VALUE,..."))?;
        let name = &captures["name"];
        let mut options =
            StepOptions::parse(name, captures.name("options").map_or("", |m| m.as_str()))?;
        let processor = match name {
            "codon-alignment" => {
                Processor::CodonAlignment(CodonAlignmentStep::from_options(&mut options)?)
            }
            "trim-by-ref" => Processor::TrimByRef(TrimByRef::from_options(&mut options)?),
            "apply-frameshift" => {
                Processor::ApplyFrameshift(ApplyFrameshift::from_options(&mut options)?)
            }
            "save-fasta" => Processor::SaveFasta(SaveFasta::from_options(&mut options)?),
            "save-json" => Processor::SaveJson(SaveJson::from_options(&mut options)?),
            _ => {
                return Err(PostAlignError::config(
                    name,
                    format!("unknown processor; expected one of {}", Self::NAMES.join(", ")),
                ))
            }
        };
        options.finish()?;
        Ok(processor)
    }

    /// Run the step at 1-based `position` over the collection.
    pub fn apply(&self, position: usize, collection: AlignmentCollection) -> Result<StepOutcome> {
        match self {
            Processor::CodonAlignment(step) => {
                step.apply(position, collection).map(StepOutcome::Collection)
            }
            Processor::TrimByRef(step) => {
                step.apply(position, collection).map(StepOutcome::Collection)
            }
            Processor::ApplyFrameshift(step) => {
                step.apply(position, collection).map(StepOutcome::Collection)
            }
            Processor::SaveFasta(step) => step.apply(position, collection),
            Processor::SaveJson(step) => step.apply(position, collection),
        }
    }
}

/// Key/value options of one step, consumed as the processor reads them.
#[derive(Debug)]
pub(crate) struct StepOptions {
    processor: String,
    entries: Vec<(String, String)>,
}

impl StepOptions {
    fn parse(processor: &str, options: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for item in options.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = match item.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (item, "true"),
            };
            if key.is_empty() {
                return Err(PostAlignError::config(
                    processor,
                    format!("option '{item}' has no name"),
                ));
            }
            entries.push((key.to_string(), value.to_string()));
        }
        Ok(Self {
            processor: processor.to_string(),
            entries,
        })
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> PostAlignError {
        PostAlignError::config(&self.processor, reason)
    }

    /// Remove and return every value given for `key`.
    pub(crate) fn take_all(&mut self, key: &str) -> Vec<String> {
        let (taken, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(k, _)| k == key);
        self.entries = rest;
        taken.into_iter().map(|(_, v)| v).collect()
    }

    pub(crate) fn take(&mut self, key: &str) -> Result<Option<String>> {
        let mut values = self.take_all(key);
        match values.len() {
            0 => Ok(None),
            1 => Ok(values.pop()),
            n => Err(self.invalid(format!("option '{key}' given {n} times"))),
        }
    }

    pub(crate) fn take_parsed<T: FromStr>(&mut self, key: &str) -> Result<Option<T>> {
        match self.take(key)? {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(format!("invalid value '{value}' for '{key}'"))),
        }
    }

    pub(crate) fn take_score(&mut self, key: &str) -> Result<Option<f64>> {
        match self.take_parsed::<f64>(key)? {
            Some(value) if !value.is_finite() => {
                Err(self.invalid(format!("'{key}' must be a finite number")))
            }
            other => Ok(other),
        }
    }

    pub(crate) fn take_bool(&mut self, key: &str) -> Result<Option<bool>> {
        match self.take(key)? {
            None => Ok(None),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(self.invalid(format!("'{key}' expects true or false, got '{value}'"))),
            },
        }
    }

    /// Fail on any option no processor consumed.
    fn finish(self) -> Result<()> {
        match self.entries.first() {
            None => Ok(()),
            Some((key, _)) => Err(self.invalid(format!("unknown option '{key}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codon_alignment::TieBreak;

    #[test]
    fn test_from_spec_parses_options() {
        let step =
            Processor::from_spec("codon-alignment:frame-start=3,window-size=2,tie-break=right")
                .unwrap();
        let Processor::CodonAlignment(step) = step else {
            panic!("wrong processor");
        };
        assert_eq!(step.config.frame_start, 3);
        assert_eq!(step.config.window_size, 2);
        assert_eq!(step.config.tie_break, TieBreak::Right);

        let step = Processor::from_spec("save-fasta:pairwise,modifiers=no").unwrap();
        assert!(step.is_output());
        assert_eq!(step.name(), "save-fasta");
    }

    #[test]
    fn test_from_spec_rejects_unknown() {
        assert!(matches!(
            Processor::from_spec("realign-everything"),
            Err(PostAlignError::InvalidConfig { .. })
        ));
        let err = Processor::from_spec("trim-by-ref:ref-begin=3").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration for 'trim-by-ref': unknown option 'ref-begin'"
        );
        assert!(Processor::from_spec("save-fasta:pairwise=maybe").is_err());
        assert!(Processor::from_spec("codon-alignment:window-size=-1").is_err());
        assert!(Processor::from_spec("codon-alignment:match-score=inf").is_err());
        assert!(Processor::from_spec("Save-Fasta").is_err());
    }

    #[test]
    fn test_repeated_keys() {
        let mut options =
            StepOptions::parse("save-json", "gene=a:1-3, gene=b:4-6,pretty").unwrap();
        assert_eq!(options.take_all("gene"), vec!["a:1-3", "b:4-6"]);
        assert_eq!(options.take_bool("pretty").unwrap(), Some(true));
        options.finish().unwrap();

        let mut options = StepOptions::parse("trim-by-ref", "ref-start=1,ref-start=2").unwrap();
        assert!(options.take_parsed::<usize>("ref-start").is_err());
    }
}
