//! Compressed offset-to-line table.
//!
//! The table is a flat sequence of `(byte increment, line increment)` pairs
//! relative to the function's first line.

use mutant_core::{Error, Result};

/// Expand a line table into `(offset, line)` pairs where a new line starts
pub fn line_starts(first_line: u32, table: &[u8]) -> Result<Vec<(usize, u32)>> {
    let mut starts = Vec::new();
    let mut last_line = None;
    let mut line = first_line;
    let mut addr = 0usize;

    for pair in table.chunks_exact(2) {
        let (byte_incr, line_incr) = (pair[0], pair[1]);
        if byte_incr != 0 {
            if last_line != Some(line) {
                starts.push((addr, line));
                last_line = Some(line);
            }
            addr += byte_incr as usize;
        }
        line = line.checked_add(line_incr as u32).ok_or_else(|| {
            Error::Decode(format!(
                "line table overflows past line {} (first line {})",
                u32::MAX,
                first_line
            ))
        })?;
    }

    if last_line != Some(line) {
        starts.push((addr, line));
    }

    Ok(starts)
}

/// Build a line table from sorted `(offset, line)` starts
pub fn encode_line_table(first_line: u32, starts: &[(usize, u32)]) -> Result<Vec<u8>> {
    let mut table = Vec::new();
    let mut prev_offset = 0usize;
    let mut prev_line = first_line;

    for &(offset, line) in starts {
        if offset < prev_offset || line < prev_line {
            return Err(Error::Validation(format!(
                "line table must be non-decreasing: ({}, {}) follows ({}, {})",
                offset, line, prev_offset, prev_line
            )));
        }
        if line == prev_line {
            continue;
        }

        let mut d_offset = offset - prev_offset;
        let mut d_line = line - prev_line;

        while d_offset > 255 {
            table.extend_from_slice(&[255, 0]);
            d_offset -= 255;
        }
        while d_line > 255 {
            table.extend_from_slice(&[d_offset as u8, 255]);
            d_offset = 0;
            d_line -= 255;
        }
        table.extend_from_slice(&[d_offset as u8, d_line as u8]);

        prev_offset = offset;
        prev_line = line;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_table() {
        let table = encode_line_table(10, &[(0, 10), (12, 11), (16, 12)]).unwrap();
        assert_eq!(table, vec![12, 1, 4, 1]);
        assert_eq!(line_starts(10, &table).unwrap(), vec![(0, 10), (12, 11), (16, 12)]);
    }

    #[test]
    fn test_first_instruction_after_header() {
        let table = encode_line_table(1, &[(0, 10), (9, 12)]).unwrap();
        assert_eq!(line_starts(1, &table).unwrap(), vec![(0, 10), (9, 12)]);
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(line_starts(7, &[]).unwrap(), vec![(0, 7)]);
    }

    #[test]
    fn test_large_increments() {
        let starts = vec![(0, 1), (600, 2), (601, 700)];
        let table = encode_line_table(1, &starts).unwrap();
        assert_eq!(line_starts(1, &table).unwrap(), starts);
    }

    #[test]
    fn test_line_overflow_is_decode_error() {
        assert!(matches!(line_starts(u32::MAX, &[1, 1]), Err(Error::Decode(_))));
        assert!(matches!(line_starts(u32::MAX - 1, &[0, 1, 0, 1]), Err(Error::Decode(_))));
        // No increment, no overflow.
        assert_eq!(line_starts(u32::MAX, &[4, 0]).unwrap(), vec![(0, u32::MAX)]);
    }

    #[test]
    fn test_decreasing_lines_rejected() {
        assert!(encode_line_table(5, &[(0, 5), (3, 4)]).is_err());
    }

    proptest! {
        #[test]
        fn prop_table_round_trip(
            first_line in 1u32..1000,
            steps in prop::collection::vec((1usize..700, 1u32..600), 0..20),
        ) {
            let mut starts = vec![(0usize, first_line)];
            let (mut offset, mut line) = (0usize, first_line);
            for (d_offset, d_line) in steps {
                offset += d_offset;
                line += d_line;
                starts.push((offset, line));
            }
            let table = encode_line_table(first_line, &starts).unwrap();
            prop_assert_eq!(line_starts(first_line, &table).unwrap(), starts);
        }
    }
}
