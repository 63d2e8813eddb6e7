//! Conversion settings
//!
//! [`Settings`] is the plain, user facing configuration (serializable behind
//! the `serde` feature). It is checked once by [`Settings::validate`] before
//! any parsing begins; the rest of the crate only sees [`ValidatedSettings`].

use crate::crs::{Crs, GLOBAL_COUNTRY};
use crate::ids::IdMapping;
use crate::matrix::{MatrixEncoding, MatrixTextFormat, PositionalCheck};
use crate::text::{
    DEFAULT_DECIMAL_SEPARATOR, DEFAULT_FRACTION_DIGITS, DEFAULT_TUPLE_SEPARATOR,
    DEFAULT_VALUE_SEPARATOR, NumberFormat, Separators,
};
use crate::{Result, XmlError};
use std::path::{Path, PathBuf};

pub use crate::geometry::LineEncoding;

/// User facing settings shared by readers and writers
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    /// Explicit destination CRS, wins over everything else
    pub destination_crs: Option<String>,
    /// CRS assumed when a document carries no `srsname`
    pub source_crs: Option<String>,
    /// Country whose preferred CRS is used when no destination is given
    pub country: String,
    pub tuple_separator: String,
    pub value_separator: String,
    pub decimal_separator: String,
    /// Fraction digits of written coordinates and matrix values
    pub fraction_digits: usize,
    pub id_mapping: IdMapping,
    pub line_encoding: LineEncoding,
    pub matrix_encoding: MatrixEncoding,
    pub positional_zone_check: PositionalCheck,
    pub output_dir: Option<PathBuf>,
    pub file_name: Option<String>,
    /// Format version written into the schema location
    pub version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            destination_crs: None,
            source_crs: None,
            country: GLOBAL_COUNTRY.to_string(),
            tuple_separator: DEFAULT_TUPLE_SEPARATOR.to_string(),
            value_separator: DEFAULT_VALUE_SEPARATOR.to_string(),
            decimal_separator: DEFAULT_DECIMAL_SEPARATOR.to_string(),
            fraction_digits: DEFAULT_FRACTION_DIGITS,
            id_mapping: IdMapping::default(),
            line_encoding: LineEncoding::default(),
            matrix_encoding: MatrixEncoding::default(),
            positional_zone_check: PositionalCheck::default(),
            output_dir: None,
            file_name: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Settings {
    /// Check every field and convert it into its typed form
    pub fn validate(&self) -> Result<ValidatedSettings> {
        let separators = Separators::from_strs(
            &self.tuple_separator,
            &self.value_separator,
            &self.decimal_separator,
        )?;
        let number_format = NumberFormat::new(separators.decimal, self.fraction_digits)?;

        Ok(ValidatedSettings {
            destination_crs: parse_crs(self.destination_crs.as_deref())?,
            source_crs: parse_crs(self.source_crs.as_deref())?,
            country: self.country.trim().to_string(),
            separators,
            number_format,
            id_mapping: self.id_mapping,
            line_encoding: self.line_encoding,
            matrix_encoding: self.matrix_encoding,
            positional_zone_check: self.positional_zone_check,
            output_dir: self.output_dir.clone(),
            file_name: self
                .file_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned),
            version: self.version.trim().to_string(),
        })
    }
}

fn parse_crs(code: Option<&str>) -> Result<Option<Crs>> {
    code.map(str::trim)
        .filter(|code| !code.is_empty())
        .map(Crs::from_code)
        .transpose()
}

/// Settings after validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSettings {
    pub destination_crs: Option<Crs>,
    pub source_crs: Option<Crs>,
    pub country: String,
    pub separators: Separators,
    pub number_format: NumberFormat,
    pub id_mapping: IdMapping,
    pub line_encoding: LineEncoding,
    pub matrix_encoding: MatrixEncoding,
    pub positional_zone_check: PositionalCheck,
    pub output_dir: Option<PathBuf>,
    pub file_name: Option<String>,
    pub version: String,
}

impl ValidatedSettings {
    /// Country hint, absent when blank
    pub fn country_hint(&self) -> Option<&str> {
        (!self.country.is_empty()).then_some(self.country.as_str())
    }

    /// Output directory and file name, both required to be non-blank
    pub fn output_target(&self) -> Result<(&Path, &str)> {
        let dir = self
            .output_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| XmlError::Configuration("output directory is not set".to_string()))?;
        let file_name = self
            .file_name
            .as_deref()
            .ok_or_else(|| XmlError::Configuration("output file name is not set".to_string()))?;
        Ok((dir, file_name))
    }

    /// Matrix values always use '.' so they never clash with a ',' delimiter
    pub fn matrix_format(&self) -> MatrixTextFormat {
        MatrixTextFormat {
            number: NumberFormat {
                decimal_separator: '.',
                fraction_digits: self.number_format.fraction_digits,
            },
            ..MatrixTextFormat::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let validated = Settings::default().validate().unwrap();
        assert_eq!(validated.separators, Separators::default());
        assert_eq!(validated.number_format.fraction_digits, 6);
        assert_eq!(validated.country_hint(), Some("Global"));
        assert_eq!(validated.destination_crs, None);
        assert_eq!(validated.id_mapping, IdMapping::Xml);
        assert_eq!(validated.positional_zone_check, PositionalCheck::Warn);
    }

    #[test]
    fn test_separators_are_checked() {
        let settings = Settings {
            tuple_separator: "ab".into(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(XmlError::Configuration(_))));

        let settings = Settings {
            decimal_separator: ",".into(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(XmlError::Configuration(_))));
    }

    #[test]
    fn test_fraction_digits_are_bounded() {
        let settings = Settings {
            fraction_digits: 20,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(XmlError::Configuration(_))));
    }

    #[test]
    fn test_crs_codes_are_parsed() {
        let settings = Settings {
            destination_crs: Some("epsg:32756".into()),
            source_crs: Some("  ".into()),
            ..Settings::default()
        };
        let validated = settings.validate().unwrap();
        assert_eq!(validated.destination_crs.map(|crs| crs.epsg()), Some(32756));
        assert_eq!(validated.source_crs, None);

        let settings = Settings {
            destination_crs: Some("EPSG:1".into()),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(XmlError::UnsupportedProjection(_))
        ));
    }

    #[test]
    fn test_output_target_requires_values() {
        let validated = Settings {
            output_dir: Some("out".into()),
            file_name: Some("  ".into()),
            ..Settings::default()
        }
        .validate()
        .unwrap();
        assert!(matches!(
            validated.output_target(),
            Err(XmlError::Configuration(_))
        ));

        let validated = Settings {
            output_dir: Some("out".into()),
            file_name: Some("network.xml".into()),
            ..Settings::default()
        }
        .validate()
        .unwrap();
        let (dir, name) = validated.output_target().unwrap();
        assert_eq!(dir, Path::new("out"));
        assert_eq!(name, "network.xml");
    }

    #[test]
    fn test_matrix_format_uses_dot() {
        let validated = Settings {
            tuple_separator: ";".into(),
            value_separator: " ".into(),
            decimal_separator: ",".into(),
            fraction_digits: 2,
            ..Settings::default()
        }
        .validate()
        .unwrap();
        assert_eq!(validated.number_format.decimal_separator, ',');
        assert_eq!(validated.matrix_format().number.decimal_separator, '.');
        assert_eq!(validated.matrix_format().number.fraction_digits, 2);
    }
}
