use clap::Parser;
use std::path::PathBuf;
use transport_xml_lib::ids::IdMapping;
use transport_xml_lib::matrix::{MatrixEncoding, PositionalCheck};
use transport_xml_lib::settings::LineEncoding;
use transport_xml_lib::text::{
    DEFAULT_DECIMAL_SEPARATOR, DEFAULT_FRACTION_DIGITS, DEFAULT_TUPLE_SEPARATOR,
    DEFAULT_VALUE_SEPARATOR,
};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Convert a macroscopic transport network XML file, reprojecting and re-encoding it
pub struct Args {
    /// XML file to read
    #[clap(value_name = "FILE")]
    pub input: PathBuf,

    /// Directory the converted file is written to
    #[clap(short, long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Name of the converted file (defaults to the input file name)
    #[clap(short, long)]
    pub file_name: Option<String>,

    /// Destination CRS, e.g. EPSG:32756 (wins over --country)
    #[clap(short, long)]
    pub destination_crs: Option<String>,

    /// CRS of documents without an srsname
    #[clap(short, long)]
    pub source_crs: Option<String>,

    /// Country whose preferred projection is used when no destination CRS is given
    #[clap(short, long, default_value = "Global")]
    pub country: String,

    /// Separator between coordinate tuples
    #[clap(long, default_value_t = DEFAULT_TUPLE_SEPARATOR.to_string())]
    pub tuple_separator: String,

    /// Separator between the values of one coordinate
    #[clap(long, default_value_t = DEFAULT_VALUE_SEPARATOR.to_string())]
    pub value_separator: String,

    /// Decimal mark of written coordinates
    #[clap(long, default_value_t = DEFAULT_DECIMAL_SEPARATOR.to_string())]
    pub decimal_separator: String,

    /// Fraction digits of written coordinates and matrix values (max 15)
    #[clap(long, default_value_t = DEFAULT_FRACTION_DIGITS)]
    pub fraction_digits: usize,

    /// Identifier written for every entity: internal, external or xml
    #[clap(long, default_value = "xml")]
    pub id_mapping: IdMapping,

    /// Line geometry encoding: pos_list or coordinates
    #[clap(long, default_value = "pos_list")]
    pub line_encoding: LineEncoding,

    /// OD matrix encoding: cell_by_cell, row or raw
    #[clap(long, default_value = "cell_by_cell")]
    pub matrix_encoding: MatrixEncoding,

    /// Check that numeric zone ids follow registration order: off, warn or strict
    #[clap(long, default_value = "warn")]
    pub positional_zone_check: PositionalCheck,
}

impl Args {
    /// Parse the process arguments, exiting with usage on error
    pub fn from_cli() -> Self {
        match Self::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Library settings for this invocation
    pub fn to_settings(&self) -> transport_xml_lib::Settings {
        let file_name = self.file_name.clone().or_else(|| {
            self.input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        });
        transport_xml_lib::Settings {
            destination_crs: self.destination_crs.clone(),
            source_crs: self.source_crs.clone(),
            country: self.country.clone(),
            tuple_separator: self.tuple_separator.clone(),
            value_separator: self.value_separator.clone(),
            decimal_separator: self.decimal_separator.clone(),
            fraction_digits: self.fraction_digits,
            id_mapping: self.id_mapping,
            line_encoding: self.line_encoding,
            matrix_encoding: self.matrix_encoding,
            positional_zone_check: self.positional_zone_check,
            output_dir: Some(self.output_dir.clone()),
            file_name,
            ..transport_xml_lib::Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args =
            Args::try_parse_from(["transport-xml", "in/network.xml", "-o", "out"]).unwrap();
        let settings = args.to_settings();
        assert_eq!(settings.file_name.as_deref(), Some("network.xml"));
        assert_eq!(settings.output_dir, Some(PathBuf::from("out")));
        assert_eq!(settings.country, "Global");
        assert_eq!(settings.id_mapping, IdMapping::Xml);
        assert_eq!(settings.matrix_encoding, MatrixEncoding::CellByCell);
        assert_eq!(settings.fraction_digits, DEFAULT_FRACTION_DIGITS);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_explicit_options() {
        let args = Args::try_parse_from([
            "transport-xml",
            "network.xml",
            "--output-dir",
            "out",
            "--file-name",
            "projected.xml",
            "--destination-crs",
            "EPSG:32756",
            "--id-mapping",
            "internal",
            "--line-encoding",
            "coordinates",
            "--matrix-encoding",
            "raw",
            "--positional-zone-check",
            "strict",
            "--fraction-digits",
            "3",
        ])
        .unwrap();
        let settings = args.to_settings();
        assert_eq!(settings.file_name.as_deref(), Some("projected.xml"));
        assert_eq!(settings.destination_crs.as_deref(), Some("EPSG:32756"));
        assert_eq!(settings.id_mapping, IdMapping::Internal);
        assert_eq!(settings.line_encoding, LineEncoding::Coordinates);
        assert_eq!(settings.matrix_encoding, MatrixEncoding::Raw);
        assert_eq!(settings.positional_zone_check, PositionalCheck::Strict);
        assert_eq!(settings.fraction_digits, 3);
    }

    #[test]
    fn test_output_dir_is_required() {
        assert!(Args::try_parse_from(["transport-xml", "network.xml"]).is_err());
    }

    #[test]
    fn test_rejects_unknown_modes() {
        assert!(
            Args::try_parse_from(["transport-xml", "a.xml", "-o", "out", "--id-mapping", "nope"])
                .is_err()
        );
        assert!(
            Args::try_parse_from(["transport-xml", "a.xml", "-o", "out", "--matrix-encoding", "csv"])
                .is_err()
        );
    }
}
