//! 4x4 fiducial marker dictionary (ArUco DICT_4X4_50 layout)
//!
//! A marker is a 6x6 grid of cells: a one-cell black border around 4x4 data
//! cells. Each code stores the data cells row by row, most significant bit
//! first, with a set bit meaning a white cell.

/// Cells along one side of a marker, border included
pub const MARKER_GRID_CELLS: usize = 6;

const DATA_CELLS: usize = 4;

const DICT_4X4_50: [u16; 50] = [
    0xB532, 0x0F9A, 0x332D, 0x9946, 0x549E, 0x79CD, 0x9E2E, 0xC4F2, 0xFEDA, 0xCFC5,
    0xF915, 0x03E6, 0x1D63, 0x58DB, 0x064D, 0x5E24, 0xADC7, 0x8C22, 0x6490, 0x1246,
    0xC8D3, 0xC2BB, 0xF695, 0xD014, 0x8FD8, 0x0AAE, 0xFE31, 0x7F06, 0x95E6, 0x58AD,
    0x8965, 0x7616, 0x340D, 0x9F09, 0x0747, 0x71AA, 0x4BBC, 0x4B10, 0xBEAD, 0xE63B,
    0x46AE, 0x0F86, 0x1C7C, 0x3139, 0xDCA2, 0x2EC9, 0x6274, 0xC4A5, 0x7D28, 0x46E5,
];

/// Result of matching observed bits against the dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerMatch {
    pub id: u32,
    /// Quarter turns clockwise of the marker relative to the sampled grid
    pub rotation: u8,
    /// Number of bits that differ from the dictionary code
    pub distance: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct MarkerDictionary {
    codes: &'static [u16],
}

impl Default for MarkerDictionary {
    fn default() -> Self {
        Self::dict_4x4_50()
    }
}

impl MarkerDictionary {
    pub const fn dict_4x4_50() -> Self {
        Self { codes: &DICT_4X4_50 }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, id: u32) -> Option<u16> {
        self.codes.get(id as usize).copied()
    }

    /// Full 6x6 cell grid for a marker id, `true` meaning a black cell
    pub fn cell_pattern(&self, id: u32) -> Option<[[bool; MARKER_GRID_CELLS]; MARKER_GRID_CELLS]> {
        let code = self.code(id)?;
        let mut cells = [[true; MARKER_GRID_CELLS]; MARKER_GRID_CELLS];
        for (r, row) in cells.iter_mut().skip(1).take(DATA_CELLS).enumerate() {
            for (c, cell) in row.iter_mut().skip(1).take(DATA_CELLS).enumerate() {
                *cell = !data_bit(code, r, c);
            }
        }
        Some(cells)
    }

    /// Find the closest code over all ids and rotations.
    ///
    /// Ties go to the lowest id, then the smallest rotation. Matches further
    /// than `max_correction_bits` away are discarded.
    pub fn identify(&self, observed: u16, max_correction_bits: u32) -> Option<MarkerMatch> {
        let mut best: Option<MarkerMatch> = None;
        for (id, &code) in self.codes.iter().enumerate() {
            let mut rotated = code;
            for rotation in 0..4u8 {
                let distance = (rotated ^ observed).count_ones();
                if best.map_or(true, |b| distance < b.distance) {
                    best = Some(MarkerMatch {
                        id: id as u32,
                        rotation,
                        distance,
                    });
                }
                rotated = rotate_cw(rotated);
            }
        }
        best.filter(|m| m.distance <= max_correction_bits)
    }
}

fn data_bit(code: u16, row: usize, col: usize) -> bool {
    let shift = DATA_CELLS * DATA_CELLS - 1 - (row * DATA_CELLS + col);
    (code >> shift) & 1 == 1
}

/// Rotate a data grid a quarter turn clockwise
pub fn rotate_cw(code: u16) -> u16 {
    let mut out = 0u16;
    for r in 0..DATA_CELLS {
        for c in 0..DATA_CELLS {
            if data_bit(code, DATA_CELLS - 1 - c, r) {
                out |= 1 << (DATA_CELLS * DATA_CELLS - 1 - (r * DATA_CELLS + c));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_rotations_are_identity() {
        for &code in DICT_4X4_50.iter() {
            let back = rotate_cw(rotate_cw(rotate_cw(rotate_cw(code))));
            assert_eq!(back, code);
        }
    }

    #[test]
    fn test_rotate_moves_top_left_to_top_right() {
        // only the top-left data cell set
        let code = 0x8000;
        assert_eq!(rotate_cw(code), 0x1000);
    }

    #[test]
    fn test_every_code_identifies_as_itself() {
        let dict = MarkerDictionary::dict_4x4_50();
        for id in 0..dict.len() as u32 {
            let code = dict.code(id).unwrap();
            let m = dict.identify(code, 0).unwrap();
            assert_eq!(m.id, id);
            assert_eq!(m.rotation, 0);
            assert_eq!(m.distance, 0);
        }
    }

    #[test]
    fn test_identify_rotated_code() {
        let dict = MarkerDictionary::dict_4x4_50();
        let code = dict.code(7).unwrap();
        let observed = rotate_cw(rotate_cw(code));
        let m = dict.identify(observed, 0).unwrap();
        assert_eq!(m.id, 7);
        assert_eq!(m.rotation, 2);
    }

    #[test]
    fn test_cell_pattern_has_black_border() {
        let dict = MarkerDictionary::dict_4x4_50();
        let cells = dict.cell_pattern(7).unwrap();
        for i in 0..MARKER_GRID_CELLS {
            assert!(cells[0][i]);
            assert!(cells[MARKER_GRID_CELLS - 1][i]);
            assert!(cells[i][0]);
            assert!(cells[i][MARKER_GRID_CELLS - 1]);
        }
        // 0xC4F2 starts with two white cells
        assert!(!cells[1][1]);
        assert!(!cells[1][2]);
        assert!(cells[1][3]);
    }

    #[test]
    fn test_unknown_id() {
        assert!(MarkerDictionary::dict_4x4_50().cell_pattern(50).is_none());
    }
}
