// lib.rs
pub mod aligner;
pub mod alignment;
pub mod alignment_record;
pub mod cigar;
pub mod codon;
pub mod codon_alignment;
pub mod collection;
pub mod error;
pub mod fasta;
pub mod input;
pub mod iupac;
pub mod paf;
pub mod pipeline;
pub mod position;
pub mod processors;
pub mod sequence;
