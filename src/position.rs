use serde::Serialize;
use std::fmt;

/// 1-based position in the ungapped coordinate space of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UngappedPos(usize);

impl UngappedPos {
    /// Returns `None` for 0, which is not a valid 1-based position.
    pub fn new(pos: usize) -> Option<Self> {
        (pos >= 1).then_some(Self(pos))
    }

    /// Position from a 0-based offset.
    pub fn from_offset(offset: usize) -> Self {
        Self(offset + 1)
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// 0-based offset of this position.
    pub fn offset(self) -> usize {
        self.0 - 1
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for UngappedPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 0-based column in the gapped rendering of an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GappedIndex(pub usize);

/// Bidirectional map between gapped columns and ungapped positions for one
/// side of an alignment.
#[derive(Debug, Clone, Default)]
pub struct CoordinateMap {
    columns: Vec<Option<UngappedPos>>,
    to_column: Vec<(UngappedPos, GappedIndex)>,
}

impl CoordinateMap {
    /// Build from the per-column positions of one row, in column order.
    /// Present positions must be strictly increasing.
    pub fn from_columns<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = Option<UngappedPos>>,
    {
        let columns: Vec<Option<UngappedPos>> = columns.into_iter().collect();
        let to_column = columns
            .iter()
            .enumerate()
            .filter_map(|(idx, pos)| pos.map(|p| (p, GappedIndex(idx))))
            .collect();
        Self { columns, to_column }
    }

    /// Number of gapped columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn gapped_to_ungapped(&self, index: GappedIndex) -> Option<UngappedPos> {
        self.columns.get(index.0).copied().flatten()
    }

    pub fn ungapped_to_gapped(&self, pos: UngappedPos) -> Option<GappedIndex> {
        self.to_column
            .binary_search_by_key(&pos, |(p, _)| *p)
            .ok()
            .map(|idx| self.to_column[idx].1)
    }
}

/// Reading frame of the reference: 0-based offset of the first codon.
/// Offsets below the start belong to the non-coding prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ReadingFrame {
    start: usize,
}

impl ReadingFrame {
    pub fn new(start: usize) -> Self {
        Self { start }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn is_coding(&self, offset: usize) -> bool {
        offset >= self.start
    }

    /// Whether the boundary before `offset` is a codon boundary.
    pub fn is_boundary(&self, offset: usize) -> bool {
        offset >= self.start && (offset - self.start) % 3 == 0
    }

    /// 0-based codon index of a reference position, `None` in the prefix.
    pub fn codon_of(&self, pos: UngappedPos) -> Option<usize> {
        let offset = pos.offset();
        self.is_coding(offset).then(|| (offset - self.start) / 3)
    }

    /// First reference position of a codon.
    pub fn codon_start(&self, codon: usize) -> UngappedPos {
        UngappedPos::from_offset(self.start + codon * 3)
    }

    /// Smallest codon boundary at or after `offset`.
    pub fn ceil_boundary(&self, offset: usize) -> usize {
        if offset <= self.start {
            return self.start;
        }
        let rem = (offset - self.start) % 3;
        if rem == 0 {
            offset
        } else {
            offset + 3 - rem
        }
    }

    /// Largest codon boundary at or before `offset`, `None` inside the prefix.
    pub fn floor_boundary(&self, offset: usize) -> Option<usize> {
        (offset >= self.start).then(|| offset - (offset - self.start) % 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(p: usize) -> UngappedPos {
        UngappedPos::new(p).unwrap()
    }

    #[test]
    fn test_ungapped_pos_offsets() {
        assert!(UngappedPos::new(0).is_none());
        assert_eq!(pos(1).offset(), 0);
        assert_eq!(UngappedPos::from_offset(9).get(), 10);
        assert_eq!(pos(4).next(), pos(5));
    }

    #[test]
    fn test_coordinate_map_both_directions() {
        // Row "AC--GT": positions 1,2 then two gap columns then 3,4
        let map = CoordinateMap::from_columns(vec![
            Some(pos(1)),
            Some(pos(2)),
            None,
            None,
            Some(pos(3)),
            Some(pos(4)),
        ]);
        assert_eq!(map.width(), 6);
        assert_eq!(map.gapped_to_ungapped(GappedIndex(1)), Some(pos(2)));
        assert_eq!(map.gapped_to_ungapped(GappedIndex(2)), None);
        assert_eq!(map.gapped_to_ungapped(GappedIndex(9)), None);
        assert_eq!(map.ungapped_to_gapped(pos(3)), Some(GappedIndex(4)));
        assert_eq!(map.ungapped_to_gapped(pos(5)), None);
    }

    #[test]
    fn test_coordinate_map_with_offset_start() {
        let map = CoordinateMap::from_columns(vec![None, Some(pos(10)), Some(pos(11))]);
        assert_eq!(map.ungapped_to_gapped(pos(9)), None);
        assert_eq!(map.ungapped_to_gapped(pos(10)), Some(GappedIndex(1)));
        assert_eq!(map.ungapped_to_gapped(pos(11)), Some(GappedIndex(2)));
    }

    #[test]
    fn test_reading_frame_boundaries() {
        let frame = ReadingFrame::new(2);
        assert!(!frame.is_coding(1));
        assert!(frame.is_boundary(2));
        assert!(!frame.is_boundary(3));
        assert!(frame.is_boundary(5));
        assert_eq!(frame.codon_of(pos(2)), None);
        assert_eq!(frame.codon_of(pos(3)), Some(0));
        assert_eq!(frame.codon_of(pos(6)), Some(1));
        assert_eq!(frame.codon_start(1), pos(6));
        assert_eq!(frame.ceil_boundary(0), 2);
        assert_eq!(frame.ceil_boundary(3), 5);
        assert_eq!(frame.ceil_boundary(5), 5);
        assert_eq!(frame.floor_boundary(7), Some(5));
        assert_eq!(frame.floor_boundary(1), None);
    }
}
