//! FASTA reading and writing.

use crate::error::Result;
use crate::sequence::{SeqType, Sequence};
use log::debug;
use noodles::fasta;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

/// A FASTA record as read from disk; residues may contain gap characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRow {
    pub name: String,
    pub description: String,
    pub residues: Vec<u8>,
}

impl FastaRow {
    pub fn to_sequence(&self, seq_type: SeqType, skip_invalid: bool) -> Result<Sequence> {
        if skip_invalid {
            let (sequence, _) =
                Sequence::sanitized(&self.name, &self.description, &self.residues, seq_type);
            Ok(sequence)
        } else {
            Sequence::new(&self.name, &self.description, &self.residues, seq_type)
        }
    }
}

pub fn read_rows<R: BufRead>(reader: R) -> Result<Vec<FastaRow>> {
    let mut fasta_reader = fasta::io::Reader::new(reader);
    let mut rows = Vec::new();
    for result in fasta_reader.records() {
        let record = result?;
        let name = String::from_utf8_lossy(record.name()).into_owned();
        let description = record
            .description()
            .map(|d| String::from_utf8_lossy(d).trim().to_string())
            .unwrap_or_default();
        rows.push(FastaRow {
            name,
            description,
            residues: record.sequence().as_ref().to_vec(),
        });
    }
    Ok(rows)
}

pub fn read_rows_from_path(path: &str) -> Result<Vec<FastaRow>> {
    let file = File::open(path)?;
    let rows = read_rows(BufReader::new(file))?;
    debug!("Read {} FASTA records from '{}'", rows.len(), path);
    Ok(rows)
}

/// Read ungapped sequences from a FASTA file.
pub fn read_sequences(path: &str, seq_type: SeqType, skip_invalid: bool) -> Result<Vec<Sequence>> {
    read_rows_from_path(path)?
        .iter()
        .map(|row| row.to_sequence(seq_type, skip_invalid))
        .collect()
}

/// Write one FASTA record, wrapping residues at `line_width` when non-zero.
pub fn write_record<W: Write>(
    writer: &mut W,
    header: &str,
    residues: &[u8],
    line_width: usize,
) -> io::Result<()> {
    writeln!(writer, ">{}", header)?;
    if line_width == 0 || residues.is_empty() {
        writer.write_all(residues)?;
        writer.write_all(b"\n")?;
    } else {
        for line in residues.chunks(line_width) {
            writer.write_all(line)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}
