//! IUPAC nucleotide codes and pair scoring.

use serde::Serialize;

/// Unambiguous bases a nucleotide code stands for.
pub fn expand(symbol: u8) -> &'static [u8] {
    match symbol.to_ascii_uppercase() {
        b'A' => b"A",
        b'C' => b"C",
        b'G' => b"G",
        b'T' | b'U' => b"T",
        b'W' => b"AT",
        b'S' => b"CG",
        b'M' => b"AC",
        b'K' => b"GT",
        b'R' => b"AG",
        b'Y' => b"CT",
        b'B' => b"CGT",
        b'D' => b"AGT",
        b'H' => b"ACT",
        b'V' => b"ACG",
        b'N' => b"ACGT",
        _ => b"",
    }
}

pub fn is_ambiguous(symbol: u8) -> bool {
    expand(symbol).len() > 1
}

fn compatible(a: u8, b: u8) -> bool {
    let other = expand(b);
    expand(a).iter().any(|base| other.contains(base))
}

/// Scores for one aligned pair of reference and query symbols.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringScheme {
    pub match_score: f64,
    pub mismatch_score: f64,
    /// Score of an ambiguity code paired with a symbol it can stand for.
    pub wildcard_score: f64,
}

impl Default for ScoringScheme {
    fn default() -> Self {
        Self {
            match_score: 1.0,
            mismatch_score: -1.0,
            wildcard_score: 0.0,
        }
    }
}

impl ScoringScheme {
    pub fn score(&self, reference: u8, query: u8) -> f64 {
        let reference = reference.to_ascii_uppercase();
        let query = query.to_ascii_uppercase();
        if is_ambiguous(reference) || is_ambiguous(query) {
            if compatible(reference, query) {
                self.wildcard_score
            } else {
                self.mismatch_score
            }
        } else if expand(reference) == expand(query) && !expand(reference).is_empty() {
            self.match_score
        } else {
            self.mismatch_score
        }
    }
}
