//! Human-readable byte sizes ("64MB", "2GB", "512KB", "4096").

use thiserror::Error;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// Longest suffixes first so "MB" wins over "B".
const UNITS: &[(&str, usize)] = &[
    ("GB", GB),
    ("MB", MB),
    ("KB", KB),
    ("G", GB),
    ("M", MB),
    ("K", KB),
    ("B", 1),
];

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size '{0}', expected a form like '64MB', '2GB', '512KB' or a byte count")]
pub struct SizeParseError(String);

/// Parses a size into bytes. Units are binary (1KB = 1024) and case-insensitive.
///
/// ```
/// use imgpipe::config::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("512kb").unwrap(), 512 * 1024);
/// assert_eq!(parse_size("64 MB").unwrap(), 64 * 1024 * 1024);
/// ```
pub fn parse_size(input: &str) -> Result<usize, SizeParseError> {
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (digits, multiplier) = UNITS
        .iter()
        .find_map(|&(suffix, mult)| upper.strip_suffix(suffix).map(|rest| (rest.trim(), mult)))
        .unwrap_or((upper.as_str(), 1));

    if digits.is_empty() {
        return Err(SizeParseError(input.to_string()));
    }
    digits
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| SizeParseError(input.to_string()))
}

/// Formats bytes with the largest unit that divides them exactly.
///
/// ```
/// use imgpipe::config::format_size;
///
/// assert_eq!(format_size(64 * 1024 * 1024), "64MB");
/// assert_eq!(format_size(1500), "1500");
/// ```
pub fn format_size(bytes: usize) -> String {
    for (suffix, unit) in [("GB", GB), ("MB", MB), ("KB", KB)] {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }
    bytes.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("1K"), Ok(KB));
        assert_eq!(parse_size("3m"), Ok(3 * MB));
        assert_eq!(parse_size("2GB"), Ok(2 * GB));
        assert_eq!(parse_size("100B"), Ok(100));
        assert_eq!(parse_size("  8 mb "), Ok(8 * MB));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("12XB").is_err());
        assert!(parse_size("-5MB").is_err());
        assert!(parse_size("1.5GB").is_err());
    }

    #[test]
    fn test_parse_overflow() {
        assert!(parse_size(&format!("{}GB", usize::MAX)).is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_size(0), "0");
        assert_eq!(format_size(KB), "1KB");
        assert_eq!(format_size(256 * MB), "256MB");
        assert_eq!(format_size(3 * GB), "3GB");
        assert_eq!(format_size(1536 * KB), "1536KB");
    }

    #[test]
    fn test_format_then_parse() {
        for bytes in [1, 4096, 64 * MB, 5 * GB] {
            assert_eq!(parse_size(&format_size(bytes)), Ok(bytes));
        }
    }
}
