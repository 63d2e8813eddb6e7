//! Delimiter and number formatting rules shared by the textual encodings
//!
//! Geometry coordinate strings and OD matrix value strings both rely on
//! single-character separators. Separators are plain characters and splitting
//! is always literal, so characters such as `+`, `*` or `^` carry no pattern
//! meaning.

use crate::{Result, XmlError};

/// Default tuple separator of delimited coordinate strings
pub const DEFAULT_TUPLE_SEPARATOR: char = ' ';
/// Default value separator inside a coordinate tuple
pub const DEFAULT_VALUE_SEPARATOR: char = ',';
/// Default decimal separator
pub const DEFAULT_DECIMAL_SEPARATOR: char = '.';
/// Default number of fraction digits when formatting numbers
pub const DEFAULT_FRACTION_DIGITS: usize = 6;
/// Largest fraction digit count that still round-trips an f64 meaningfully
pub const MAX_FRACTION_DIGITS: usize = 15;

/// Interpret a configured separator, which must be exactly one character
pub fn single_char(setting: &str, value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(XmlError::Configuration(format!(
            "{setting} must be exactly one character, got '{value}'"
        ))),
    }
}

/// Split `text` on a literal delimiter
///
/// Whitespace delimiters split on any run of whitespace, so line breaks and
/// indentation inside XML text never produce empty tokens.
pub fn split_literal(text: &str, delimiter: char) -> Vec<&str> {
    if delimiter.is_whitespace() {
        text.split_whitespace().collect()
    } else {
        text.split(delimiter).map(str::trim).collect()
    }
}

/// Separators of a delimited coordinate string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Separators {
    /// Splits the string into coordinate tuples
    pub tuple: char,
    /// Splits a tuple into its two values
    pub value: char,
    /// Decimal mark inside a value
    pub decimal: char,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            tuple: DEFAULT_TUPLE_SEPARATOR,
            value: DEFAULT_VALUE_SEPARATOR,
            decimal: DEFAULT_DECIMAL_SEPARATOR,
        }
    }
}

impl Separators {
    /// Create separators, rejecting combinations that would make the string ambiguous
    pub fn new(tuple: char, value: char, decimal: char) -> Result<Self> {
        if tuple == value || tuple == decimal || value == decimal {
            return Err(XmlError::Configuration(format!(
                "tuple '{tuple}', value '{value}' and decimal '{decimal}' separators must differ"
            )));
        }
        Ok(Self {
            tuple,
            value,
            decimal,
        })
    }

    /// Parse separators from their configured string form
    pub fn from_strs(tuple: &str, value: &str, decimal: &str) -> Result<Self> {
        Self::new(
            single_char("tuple separator", tuple)?,
            single_char("value separator", value)?,
            single_char("decimal separator", decimal)?,
        )
    }

    /// Apply per-fragment overrides (e.g. `ts`, `cs`, `decimal` attributes) on top of these
    pub fn with_overrides(
        &self,
        tuple: Option<&str>,
        value: Option<&str>,
        decimal: Option<&str>,
    ) -> Result<Self> {
        let tuple = tuple
            .map(|t| single_char("tuple separator", t))
            .transpose()?
            .unwrap_or(self.tuple);
        let value = value
            .map(|v| single_char("value separator", v))
            .transpose()?
            .unwrap_or(self.value);
        let decimal = decimal
            .map(|d| single_char("decimal separator", d))
            .transpose()?
            .unwrap_or(self.decimal);
        Self::new(tuple, value, decimal)
    }
}

/// Deterministic number presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NumberFormat {
    pub decimal_separator: char,
    pub fraction_digits: usize,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_separator: DEFAULT_DECIMAL_SEPARATOR,
            fraction_digits: DEFAULT_FRACTION_DIGITS,
        }
    }
}

impl NumberFormat {
    pub fn new(decimal_separator: char, fraction_digits: usize) -> Result<Self> {
        if fraction_digits > MAX_FRACTION_DIGITS {
            return Err(XmlError::Configuration(format!(
                "fraction digits must be at most {MAX_FRACTION_DIGITS}, got {fraction_digits}"
            )));
        }
        if decimal_separator.is_ascii_digit() || decimal_separator == '-' {
            return Err(XmlError::Configuration(format!(
                "'{decimal_separator}' cannot be used as decimal separator"
            )));
        }
        Ok(Self {
            decimal_separator,
            fraction_digits,
        })
    }

    /// Format with a fixed number of fraction digits and the configured decimal mark
    pub fn format(&self, value: f64) -> String {
        let mut formatted = format!("{:.*}", self.fraction_digits, value);
        // Rounded negatives such as -0.0000001 must not print as "-0.000000"
        if formatted.starts_with('-') && formatted[1..].chars().all(|c| c == '0' || c == '.') {
            formatted.remove(0);
        }
        if self.decimal_separator != '.' {
            formatted = formatted.replace('.', &self.decimal_separator.to_string());
        }
        formatted
    }

    /// Parse a token written with the configured decimal mark
    ///
    /// Only finite numbers are accepted.
    pub fn parse(&self, token: &str) -> Option<f64> {
        let token = token.trim();
        let value: f64 = if self.decimal_separator == '.' {
            token.parse().ok()?
        } else {
            token.replace(self.decimal_separator, ".").parse().ok()?
        };
        value.is_finite().then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_char() {
        assert_eq!(single_char("x", ",").unwrap(), ',');
        assert!(matches!(
            single_char("x", ",,"),
            Err(XmlError::Configuration(_))
        ));
        assert!(matches!(single_char("x", ""), Err(XmlError::Configuration(_))));
    }

    #[test]
    fn test_split_literal_reserved_characters() {
        assert_eq!(split_literal("1+2+3", '+'), vec!["1", "2", "3"]);
        assert_eq!(split_literal("1*2", '*'), vec!["1", "2"]);
        assert_eq!(split_literal("1^2", '^'), vec!["1", "2"]);
        assert_eq!(split_literal(" 1 2\n 3 ", ' '), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_separators_must_differ() {
        assert!(Separators::new(' ', ',', '.').is_ok());
        assert!(matches!(
            Separators::new(',', ',', '.'),
            Err(XmlError::Configuration(_))
        ));
        assert!(matches!(
            Separators::from_strs(" ", ",", ","),
            Err(XmlError::Configuration(_))
        ));
    }

    #[test]
    fn test_separator_overrides() {
        let base = Separators::default();
        let overridden = base.with_overrides(Some(";"), None, Some(",")).unwrap_err();
        assert!(matches!(overridden, XmlError::Configuration(_)));

        let overridden = base.with_overrides(Some(";"), Some(" "), None).unwrap();
        assert_eq!(overridden.tuple, ';');
        assert_eq!(overridden.value, ' ');
        assert_eq!(overridden.decimal, '.');
    }

    #[test]
    fn test_number_format() {
        let format = NumberFormat::new(',', 3).unwrap();
        assert_eq!(format.format(1.23456), "1,235");
        assert_eq!(format.format(-0.0001), "0,000");
        assert_eq!(format.parse("1,5"), Some(1.5));
        assert_eq!(format.parse("abc"), None);
        assert_eq!(NumberFormat::default().parse("inf"), None);
        assert!(NumberFormat::new('.', 16).is_err());
    }
}
