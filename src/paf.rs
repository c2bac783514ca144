//! PAF (Pairwise Alignment Format) parsing
//!
//! Records must carry a `cg:Z:` CIGAR tag. Plain and BGZF-compressed files
//! are supported.

use crate::alignment_record::{AlignmentRecord, Strand};
use crate::cigar::parse_cigar;
use log::debug;
use noodles::bgzf;
use std::fs::File;
use std::io::{BufRead, BufReader, Error as IoError, Read, Seek, SeekFrom};
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseErr {
    #[error("Not enough fields in PAF record")]
    NotEnoughFields,
    #[error("IO error: {0}")]
    IoError(IoError),
    #[error("Invalid field: {0}")]
    InvalidField(ParseIntError),
    #[error("Invalid strand")]
    InvalidStrand,
    #[error("Invalid CIGAR format")]
    InvalidCigarFormat,
    #[error("Unsupported CIGAR operation '{0}'")]
    UnsupportedCigarOperation(char),
    #[error("PAF record for '{0}' has no cg:Z: CIGAR tag")]
    MissingCigar(String),
    #[error("{0}")]
    InvalidFormat(String),
}

const BGZF_HEADER_SIZE: usize = 18;

/// Check whether a file starts with a valid BGZF header.
/// Returns `Ok(false)` for regular gzip, too-small files, or plain text.
fn is_bgzf<R: Read + Seek>(reader: &mut R) -> std::io::Result<bool> {
    let mut header = [0u8; BGZF_HEADER_SIZE];
    let result = match reader.read_exact(&mut header) {
        Ok(()) => {
            Ok(header[0..2] == [0x1f, 0x8b]      // gzip magic
                && header[2] == 0x08              // DEFLATE
                && header[3] == 0x04              // FEXTRA
                && header[10..12] == [0x06, 0x00] // XLEN=6
                && header[12..14] == [b'B', b'C'] // BC subfield
                && header[14..16] == [0x02, 0x00]) // SLEN=2
        }
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    };
    reader.seek(SeekFrom::Start(0))?;
    result
}

/// Parse a single PAF line into an AlignmentRecord
fn parse_paf_line(line: &str) -> Result<AlignmentRecord, ParseErr> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 12 {
        return Err(ParseErr::NotEnoughFields);
    }

    let query_name = fields[0].to_string();
    let query_len = fields[1].parse::<usize>().map_err(ParseErr::InvalidField)?;
    let query_start = fields[2].parse::<usize>().map_err(ParseErr::InvalidField)?;
    let query_end = fields[3].parse::<usize>().map_err(ParseErr::InvalidField)?;
    let target_name = fields[5].to_string();
    let target_len = fields[6].parse::<usize>().map_err(ParseErr::InvalidField)?;
    let target_start = fields[7].parse::<usize>().map_err(ParseErr::InvalidField)?;
    let target_end = fields[8].parse::<usize>().map_err(ParseErr::InvalidField)?;
    let strand = match fields[4] {
        "+" => Strand::Forward,
        "-" => Strand::Reverse,
        _ => return Err(ParseErr::InvalidStrand),
    };

    let cigar = fields[12..]
        .iter()
        .find_map(|tag| tag.strip_prefix("cg:Z:"))
        .ok_or_else(|| ParseErr::MissingCigar(query_name.clone()))?;
    let cigar = parse_cigar(cigar)?;

    Ok(AlignmentRecord {
        query_name,
        query_len,
        query_start,
        query_end,
        target_name,
        target_len,
        target_start,
        target_end,
        strand,
        cigar,
    })
}

pub fn parse_paf<R: BufRead>(reader: R) -> Result<Vec<AlignmentRecord>, ParseErr> {
    let mut records = Vec::new();
    for line_result in reader.lines() {
        let line = line_result.map_err(ParseErr::IoError)?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        records.push(parse_paf_line(line)?);
    }
    Ok(records)
}

/// Parse a PAF file, transparently decompressing BGZF input.
pub fn parse_paf_file(path: &str) -> Result<Vec<AlignmentRecord>, ParseErr> {
    let mut file = File::open(path).map_err(ParseErr::IoError)?;
    let records = if is_bgzf(&mut file).map_err(ParseErr::IoError)? {
        debug!("Reading BGZF-compressed PAF '{}'", path);
        parse_paf(BufReader::new(bgzf::io::Reader::new(file)))?
    } else if [".gz", ".bgz"].iter().any(|ext| path.ends_with(ext)) {
        return Err(ParseErr::InvalidFormat(format!(
            "'{}' is regular gzip, not BGZF. Convert with: zcat '{}' | bgzip > output.paf.gz",
            path, path
        )));
    } else {
        parse_paf(BufReader::new(file))?
    };
    debug!("Parsed {} PAF records from '{}'", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const LINE: &str = "q1\t10\t0\t9\t+\tref\t20\t2\t12\t8\t10\t60\tNM:i:1\tcg:Z:3M2I3D4M";

    #[test]
    fn test_parse_paf_line() {
        let record = parse_paf_line(LINE).unwrap();
        assert_eq!(record.query_name, "q1");
        assert_eq!(record.query_len, 10);
        assert_eq!(record.target_name, "ref");
        assert_eq!(record.target_start, 2);
        assert_eq!(record.strand, Strand::Forward);
        assert_eq!(record.cigar.len(), 4);
        record.validate().unwrap();
    }

    #[test]
    fn test_parse_paf_errors() {
        assert!(matches!(
            parse_paf_line("q1\t10\t0"),
            Err(ParseErr::NotEnoughFields)
        ));
        let reverse_bad = LINE.replace("\t+\t", "\t?\t");
        assert!(matches!(
            parse_paf_line(&reverse_bad),
            Err(ParseErr::InvalidStrand)
        ));
        let no_cigar = LINE.replace("\tcg:Z:3M2I3D4M", "");
        assert!(matches!(
            parse_paf_line(&no_cigar),
            Err(ParseErr::MissingCigar(_))
        ));
        let bad_cigar = LINE.replace("3M2I", "3S2I");
        assert!(matches!(
            parse_paf_line(&bad_cigar),
            Err(ParseErr::UnsupportedCigarOperation('S'))
        ));
    }

    #[test]
    fn test_parse_paf_skips_blank_lines() {
        let input = format!("{LINE}\n\n{}\n", LINE.replace("q1", "q2"));
        let records = parse_paf(Cursor::new(input)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].query_name, "q2");
    }

    #[test]
    fn test_parse_plain_paf_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{LINE}").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let records = parse_paf_file(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_is_bgzf_rejects_plain_text() {
        let mut cursor = Cursor::new(b"not compressed at all".to_vec());
        assert!(!is_bgzf(&mut cursor).unwrap());
        assert_eq!(cursor.position(), 0);
    }
}
