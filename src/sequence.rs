use crate::error::{PostAlignError, Result};
use crate::position::UngappedPos;
use log::warn;
use serde::Serialize;
use std::fmt;

/// Symbols that mark alignment columns rather than residues.
pub const GAP_SYMBOLS: &[u8] = b"-.";

const NUCLEOTIDES: &[u8] = b"ACGTUWSMKRYBDHVN";
const AMINO_ACIDS: &[u8] = b"ACDEFGHIKLMNPQRSTVWY*X";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeqType {
    Nucleotide,
    AminoAcid,
}

impl SeqType {
    pub fn is_valid(&self, symbol: u8) -> bool {
        match self {
            SeqType::Nucleotide => NUCLEOTIDES.contains(&symbol),
            SeqType::AminoAcid => AMINO_ACIDS.contains(&symbol),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeqType::Nucleotide => "nucleotide",
            SeqType::AminoAcid => "amino acid",
        }
    }
}

impl fmt::Display for SeqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_gap(symbol: u8) -> bool {
    GAP_SYMBOLS.contains(&symbol)
}

/// An ungapped, validated sequence. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    header: String,
    description: String,
    symbols: Vec<u8>,
    seq_type: SeqType,
}

impl Sequence {
    /// Build a sequence from raw bytes. Symbols are uppercased and gap
    /// characters are removed; anything else outside the alphabet fails.
    pub fn new(
        header: impl Into<String>,
        description: impl Into<String>,
        raw: &[u8],
        seq_type: SeqType,
    ) -> Result<Self> {
        let header = header.into();
        let mut symbols = Vec::with_capacity(raw.len());
        for (idx, &byte) in raw.iter().enumerate() {
            if is_gap(byte) {
                continue;
            }
            let symbol = byte.to_ascii_uppercase();
            if !seq_type.is_valid(symbol) {
                return Err(PostAlignError::InvalidSymbol {
                    header,
                    symbol: byte as char,
                    position: idx + 1,
                });
            }
            symbols.push(symbol);
        }
        Ok(Self {
            header,
            description: description.into(),
            symbols,
            seq_type,
        })
    }

    /// Like [`Sequence::new`] but drops invalid symbols, returning how many
    /// were removed.
    pub fn sanitized(
        header: impl Into<String>,
        description: impl Into<String>,
        raw: &[u8],
        seq_type: SeqType,
    ) -> (Self, usize) {
        let header = header.into();
        let mut dropped = 0;
        let symbols: Vec<u8> = raw
            .iter()
            .filter(|&&b| !is_gap(b))
            .map(|b| b.to_ascii_uppercase())
            .filter(|&b| {
                let keep = seq_type.is_valid(b);
                dropped += usize::from(!keep);
                keep
            })
            .collect();
        if dropped > 0 {
            warn!("Removed {} invalid symbol(s) from '{}'", dropped, header);
        }
        let sequence = Self {
            header,
            description: description.into(),
            symbols,
            seq_type,
        };
        (sequence, dropped)
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn seq_type(&self) -> SeqType {
        self.seq_type
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    pub fn length(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol_at(&self, pos: UngappedPos) -> Option<u8> {
        self.symbols.get(pos.offset()).copied()
    }

    /// Symbol at a position known to be within bounds; alignments guarantee this.
    pub(crate) fn symbol(&self, pos: UngappedPos) -> u8 {
        self.symbols[pos.offset()]
    }
}
