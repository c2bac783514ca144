//! Codon translation with IUPAC ambiguity expansion.

use crate::iupac;
use crate::sequence::is_gap;

/// Standard genetic code, indexed by first*16 + second*4 + third with
/// A=0, C=1, G=2, T/U=3.
#[rustfmt::skip]
const STANDARD_CODE: [u8; 64] = [
    b'K', b'N', b'K', b'N',  // AA*
    b'T', b'T', b'T', b'T',  // AC*
    b'R', b'S', b'R', b'S',  // AG*
    b'I', b'I', b'M', b'I',  // AT*
    b'Q', b'H', b'Q', b'H',  // CA*
    b'P', b'P', b'P', b'P',  // CC*
    b'R', b'R', b'R', b'R',  // CG*
    b'L', b'L', b'L', b'L',  // CT*
    b'E', b'D', b'E', b'D',  // GA*
    b'A', b'A', b'A', b'A',  // GC*
    b'G', b'G', b'G', b'G',  // GG*
    b'V', b'V', b'V', b'V',  // GT*
    b'*', b'Y', b'*', b'Y',  // TA*
    b'S', b'S', b'S', b'S',  // TC*
    b'*', b'C', b'W', b'C',  // TG*
    b'L', b'F', b'L', b'F',  // TT*
];

fn base_index(base: u8) -> Option<usize> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Translate one codon.
///
/// An all-gap codon yields `-`, a partially gapped or short codon yields
/// `X`. Ambiguity codes are expanded and every amino acid they can encode is
/// returned in sorted order, so `TGN` translates to `*CW`.
pub fn translate_codon(codon: &[u8]) -> String {
    if !codon.is_empty() && codon.iter().all(|&b| is_gap(b)) {
        return "-".to_string();
    }
    if codon.len() != 3 || codon.iter().any(|&b| is_gap(b)) {
        return "X".to_string();
    }

    let choices: Vec<&[u8]> = codon.iter().map(|&b| iupac::expand(b)).collect();
    if choices.iter().any(|c| c.is_empty()) {
        return "X".to_string();
    }

    let mut amino_acids: Vec<u8> = Vec::new();
    for &first in choices[0] {
        for &second in choices[1] {
            for &third in choices[2] {
                if let (Some(a), Some(b), Some(c)) =
                    (base_index(first), base_index(second), base_index(third))
                {
                    amino_acids.push(STANDARD_CODE[a * 16 + b * 4 + c]);
                }
            }
        }
    }
    amino_acids.sort_unstable();
    amino_acids.dedup();
    String::from_utf8_lossy(&amino_acids).into_owned()
}

/// Translate a nucleotide sequence codon by codon; a trailing incomplete
/// codon becomes `X`.
pub fn translate(nucleotides: &[u8]) -> String {
    nucleotides
        .chunks(3)
        .map(translate_codon)
        .map(|aa| if aa.len() == 1 { aa } else { "X".to_string() })
        .collect()
}
