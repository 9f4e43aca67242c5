//! Parser for the panel description format.
//!
//! The format is line-oriented and `;`-delimited. A panel is a sequence of
//! strings; each string starts with a header line carrying the bypass diode
//! flag and is followed by one line per cell:
//!
//! ```text
//! 1;
//! 1000;25
//! 800;25
//! 0;
//! 1000;30
//! ```
//!
//! describes a two-string panel: the first string has a bypass diode and two
//! cells at 1000 and 800 W/m2, the second has no diode and a single cell at
//! 1000 W/m2 and 30 degrees Celsius.
//!
//! A header line contains `0` or `1` before the delimiter and nothing but
//! blanks after it. A cell line contains `irradiance;temperature`, both
//! plain floating-point values. Blanks around fields are tolerated; anything
//! else is a parse error naming the offending line.

use crate::error::{PvError, Result};

/// One string of the panel as described by the input text.
#[derive(Debug, Clone, PartialEq)]
pub struct StringDescription {
    /// Whether the string is guarded by a bypass diode
    pub has_diode: bool,
    /// One `(irradiance [W/m2], temperature [C])` pair per cell, in
    /// physical order
    pub cells: Vec<(f64, f64)>,
}

/// A parsed panel description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PanelDescription {
    /// Strings in panel order
    pub strings: Vec<StringDescription>,
}

impl PanelDescription {
    /// Total number of cells across all strings.
    pub fn cell_count(&self) -> usize {
        self.strings.iter().map(|s| s.cells.len()).sum()
    }
}

/// Parse a panel description string.
pub fn parse(input: &str) -> Result<PanelDescription> {
    let mut strings: Vec<StringDescription> = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let (head, tail) = line
            .split_once(';')
            .ok_or_else(|| PvError::parse(line_no, "missing ';' delimiter"))?;

        if tail.trim().is_empty() {
            // Header line: diode flag for a new string
            let flag = head.trim();
            let has_diode = match flag {
                "0" => false,
                "1" => true,
                other => {
                    return Err(PvError::parse(
                        line_no,
                        format!("diode flag must be 0 or 1, got '{}'", other),
                    ))
                }
            };
            if let Some(prev) = strings.last() {
                if prev.cells.is_empty() {
                    return Err(PvError::parse(line_no, "previous string has no cells"));
                }
            }
            strings.push(StringDescription {
                has_diode,
                cells: Vec::new(),
            });
        } else {
            // Cell line: irradiance;temperature
            let current = strings.last_mut().ok_or_else(|| {
                PvError::parse(line_no, "cell line before any string header")
            })?;

            let irradiance: f64 = head.trim().parse().map_err(|_| {
                PvError::parse(line_no, format!("invalid irradiance '{}'", head.trim()))
            })?;
            let temperature: f64 = tail.trim().parse().map_err(|_| {
                PvError::parse(line_no, format!("invalid temperature '{}'", tail.trim()))
            })?;

            current.cells.push((irradiance, temperature));
        }
    }

    match strings.last() {
        None => Err(PvError::invalid_description("no strings in description")),
        Some(s) if s.cells.is_empty() => {
            Err(PvError::invalid_description("last string has no cells"))
        }
        Some(_) => Ok(PanelDescription { strings }),
    }
}

/// Parse a panel description file.
#[cfg(feature = "cli")]
pub fn parse_file(path: &std::path::Path) -> Result<PanelDescription> {
    let content = std::fs::read_to_string(path).map_err(|e| PvError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_strings() {
        let desc = parse("1;\n1000;25\n800;25\n0;\n1000;30\n").unwrap();
        assert_eq!(desc.strings.len(), 2);
        assert!(desc.strings[0].has_diode);
        assert_eq!(desc.strings[0].cells, vec![(1000.0, 25.0), (800.0, 25.0)]);
        assert!(!desc.strings[1].has_diode);
        assert_eq!(desc.strings[1].cells, vec![(1000.0, 30.0)]);
        assert_eq!(desc.cell_count(), 3);
    }

    #[test]
    fn test_parse_tolerates_blanks() {
        let desc = parse("  1 ;  \n\n 1000 ; 25 \n").unwrap();
        assert_eq!(desc.strings.len(), 1);
        assert_eq!(desc.strings[0].cells, vec![(1000.0, 25.0)]);
    }

    #[test]
    fn test_parse_reports_line_numbers() {
        let err = parse("1;\n1000;25\nbogus;25\n").unwrap_err();
        match err {
            PvError::ParseError { line, .. } => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_flag() {
        assert!(parse("2;\n1000;25\n").is_err());
    }

    #[test]
    fn test_parse_rejects_cell_before_header() {
        assert!(parse("1000;25\n").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_string() {
        assert!(parse("1;\n0;\n1000;25\n").is_err());
        assert!(parse("1;\n").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_delimiter() {
        let err = parse("1;\n1000 25\n").unwrap_err();
        match err {
            PvError::ParseError { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
