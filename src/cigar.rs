use crate::alignment::Alignment;
use crate::error::Result;
use crate::paf::ParseErr;

/// A CIGAR operation packed into 32 bits: the top 3 bits hold the
/// operation, the rest its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    val: u32,
}

const LEN_BITS: u32 = 29;
const LEN_MASK: u32 = (1 << LEN_BITS) - 1;

impl CigarOp {
    pub fn new(len: u32, op: char) -> std::result::Result<Self, ParseErr> {
        let code = match op {
            '=' => 0,
            'X' => 1,
            'I' => 2,
            'D' => 3,
            'M' => 4,
            'N' => 5,
            _ => return Err(ParseErr::UnsupportedCigarOperation(op)),
        };
        if len > LEN_MASK {
            return Err(ParseErr::InvalidFormat(format!(
                "CIGAR operation length {len} is too large"
            )));
        }
        Ok(Self {
            val: (code << LEN_BITS) | len,
        })
    }

    pub fn op(&self) -> char {
        match self.val >> LEN_BITS {
            0 => '=',
            1 => 'X',
            2 => 'I',
            3 => 'D',
            4 => 'M',
            _ => 'N',
        }
    }

    pub fn len(&self) -> usize {
        (self.val & LEN_MASK) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference bases consumed.
    pub fn target_delta(&self) -> usize {
        match self.op() {
            'I' => 0,
            _ => self.len(),
        }
    }

    /// Query bases consumed.
    pub fn query_delta(&self) -> usize {
        match self.op() {
            'D' | 'N' => 0,
            _ => self.len(),
        }
    }
}

pub fn parse_cigar(cigar: &str) -> std::result::Result<Vec<CigarOp>, ParseErr> {
    let mut ops = Vec::new();
    let mut len: Option<u32> = None;

    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            let current = len.unwrap_or(0);
            len = Some(
                current
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or(ParseErr::InvalidCigarFormat)?,
            );
        } else {
            let op_len = len.take().ok_or(ParseErr::InvalidCigarFormat)?;
            ops.push(CigarOp::new(op_len, c)?);
        }
    }
    if len.is_some() {
        return Err(ParseErr::InvalidCigarFormat);
    }

    Ok(ops)
}

/// Expand CIGAR operations into raw `(reference, query)` pairs of 1-based
/// positions, starting after the given 0-based offsets.
pub fn cigar_to_pairs(
    ops: &[CigarOp],
    target_start: usize,
    query_start: usize,
) -> Vec<(Option<usize>, Option<usize>)> {
    let total: usize = ops.iter().map(|op| op.len()).sum();
    let mut pairs = Vec::with_capacity(total);
    let mut r = target_start;
    let mut q = query_start;
    for op in ops {
        for _ in 0..op.len() {
            let reference = (op.target_delta() > 0).then(|| {
                r += 1;
                r
            });
            let query = (op.query_delta() > 0).then(|| {
                q += 1;
                q
            });
            pairs.push((reference, query));
        }
    }
    pairs
}

impl Alignment {
    /// Build from a CIGAR string anchored at 0-based reference and query
    /// start offsets.
    pub fn from_cigar(
        ref_len: usize,
        query_len: usize,
        target_start: usize,
        query_start: usize,
        cigar: &str,
    ) -> Result<Self> {
        let ops = parse_cigar(cigar)?;
        Alignment::build(
            ref_len,
            query_len,
            cigar_to_pairs(&ops, target_start, query_start),
        )
    }
}
