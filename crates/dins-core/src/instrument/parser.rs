//! Instrument parameter table parser.
//!
//! The table is whitespace-separated text with one header row and one row per
//! detector: `[detectorNumber, reserved, scatteringAngle, T0, L0, L1]`. The
//! second column is unused but must still parse as a number.

use thiserror::Error;

use crate::domain::InstrumentParamRow;

pub(super) const TABLE_COLUMNS: usize = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("instrument parameter table is empty")]
    Empty,
    #[error("instrument parameter table line {line} has {actual} columns, expected {expected}")]
    ColumnCount {
        line: usize,
        actual: usize,
        expected: usize,
    },
    #[error("instrument parameter table line {line}, column {column}: invalid number '{token}'")]
    InvalidNumber {
        line: usize,
        column: usize,
        token: String,
    },
    #[error("instrument parameter table line {line}: detector number {value} is not an integer")]
    InvalidDetectorNumber { line: usize, value: f64 },
}

/// Parses the full table, skipping the single header row.
pub fn parse_instrument_table(source: &str) -> Result<Vec<InstrumentParamRow>, TableError> {
    let mut lines = source
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    // Header row carries column labels; its content is not inspected.
    if lines.next().is_none() {
        return Err(TableError::Empty);
    }

    let mut rows = Vec::new();
    for (line_number, line) in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != TABLE_COLUMNS {
            return Err(TableError::ColumnCount {
                line: line_number,
                actual: tokens.len(),
                expected: TABLE_COLUMNS,
            });
        }
        let mut fields = [0.0_f64; TABLE_COLUMNS];
        for (column, token) in tokens.iter().enumerate() {
            fields[column] = token.parse::<f64>().map_err(|_| TableError::InvalidNumber {
                line: line_number,
                column: column + 1,
                token: (*token).to_string(),
            })?;
        }
        let detector = fields[0];
        if detector < 0.0 || detector.fract() != 0.0 {
            return Err(TableError::InvalidDetectorNumber {
                line: line_number,
                value: detector,
            });
        }
        rows.push(InstrumentParamRow {
            detector_number: detector as u32,
            scattering_angle: fields[2],
            t0: fields[3],
            l0: fields[4],
            l1: fields[5],
        });
    }
    if rows.is_empty() {
        return Err(TableError::Empty);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::{TableError, parse_instrument_table};

    const SAMPLE: &str = "det plick theta t0 L0 L1\n\
                          3 3 131.12 -0.2 11.005 0.5385\n\
                          4 4 132.31 -0.2 11.005 0.5330\n\
                          144 144 67.079 -0.4 11.005 0.7290\n";

    #[test]
    fn parses_rows_and_skips_header() {
        let rows = parse_instrument_table(SAMPLE).expect("table should parse");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].detector_number, 3);
        assert_eq!(rows[0].scattering_angle, 131.12);
        assert_eq!(rows[0].t0, -0.2);
        assert_eq!(rows[2].detector_number, 144);
        assert_eq!(rows[2].l1, 0.7290);
    }

    #[test]
    fn rejects_bad_column_count() {
        let error = parse_instrument_table("header\n3 3 131.12 -0.2 11.005\n")
            .expect_err("short row should fail");
        assert_eq!(
            error,
            TableError::ColumnCount {
                line: 2,
                actual: 5,
                expected: 6
            }
        );
    }

    #[test]
    fn rejects_malformed_numbers() {
        let error = parse_instrument_table("header\n3 3 abc -0.2 11.005 0.5385\n")
            .expect_err("bad token should fail");
        assert!(matches!(
            error,
            TableError::InvalidNumber {
                line: 2,
                column: 3,
                ..
            }
        ));
    }

    #[test]
    fn rejects_empty_table() {
        assert_eq!(parse_instrument_table(""), Err(TableError::Empty));
        assert_eq!(parse_instrument_table("header only\n"), Err(TableError::Empty));
    }
}
