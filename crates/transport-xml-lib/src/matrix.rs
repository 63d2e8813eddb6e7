//! OD demand matrices and their compact textual encodings
//!
//! Three wire shapes exist and are modelled as the [`OdMatrixFragment`] sum type:
//!
//! - **Cell by cell**: explicit `(origin, destination, value)` triples, both
//!   zones addressed by reference.
//! - **Row compressed**: one delimited value string per origin. The origin is
//!   addressed by reference, but the `i`-th value (1-based) belongs to the
//!   `i`-th zone in registration order.
//! - **Raw**: the whole matrix in one string with separate origin and
//!   destination delimiters. Both axes are positional.
//!
//! Positional addressing assumes registration order and the external zone
//! numbering agree. [`PositionalCheck`] controls how a disagreement between
//! the two is reported.
//!
//! Every decoded value is multiplied by the mode's pcu factor at the single
//! point where it is committed to the dense [`DemandMatrix`].

use crate::model::ZoneRegistry;
use crate::text::{NumberFormat, single_char, split_literal};
use crate::{ConversionWarning, Result, XmlError};
use std::fmt;
use std::str::FromStr;

/// Default delimiter between values of a row or raw matrix
pub const DEFAULT_MATRIX_DELIMITER: char = ',';

/// Dense origin x destination demand table, zones in registry order
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DemandMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DemandMatrix {
    /// An all-zero `size` x `size` matrix
    pub fn new(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, origin: usize, destination: usize) -> f64 {
        self.values[origin * self.size + destination]
    }

    #[inline]
    pub fn set(&mut self, origin: usize, destination: usize, value: f64) {
        self.values[origin * self.size + destination] = value;
    }

    /// All demand leaving `origin`
    pub fn row(&self, origin: usize) -> &[f64] {
        &self.values[origin * self.size..(origin + 1) * self.size]
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// `(origin, destination, value)` for every non-zero cell in row-major order
    pub fn non_zero(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != 0.0)
            .map(|(index, value)| (index / self.size, index % self.size, *value))
    }
}

/// One explicit cell of a cell-by-cell matrix
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OdCell {
    pub origin_ref: String,
    pub destination_ref: String,
    pub value: f64,
}

/// One origin row of a row-compressed matrix
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OdRow {
    pub origin_ref: String,
    /// Per-destination values in registration order
    pub values: String,
}

/// Wire shape of an OD matrix, decided once from the parsed fragment
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OdMatrixFragment {
    CellByCell {
        cells: Vec<OdCell>,
    },
    RowCompressed {
        /// Defaults to [`DEFAULT_MATRIX_DELIMITER`]
        value_delimiter: Option<String>,
        rows: Vec<OdRow>,
    },
    Raw {
        /// Defaults to [`DEFAULT_MATRIX_DELIMITER`]
        origin_delimiter: Option<String>,
        /// Defaults to [`DEFAULT_MATRIX_DELIMITER`]
        destination_delimiter: Option<String>,
        values: String,
    },
}

impl OdMatrixFragment {
    pub fn encoding(&self) -> MatrixEncoding {
        match self {
            OdMatrixFragment::CellByCell { .. } => MatrixEncoding::CellByCell,
            OdMatrixFragment::RowCompressed { .. } => MatrixEncoding::RowCompressed,
            OdMatrixFragment::Raw { .. } => MatrixEncoding::Raw,
        }
    }
}

/// Selects the wire shape a writer produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MatrixEncoding {
    #[default]
    CellByCell,
    RowCompressed,
    Raw,
}

impl fmt::Display for MatrixEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatrixEncoding::CellByCell => "cell_by_cell",
            MatrixEncoding::RowCompressed => "row",
            MatrixEncoding::Raw => "raw",
        })
    }
}

impl FromStr for MatrixEncoding {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cell_by_cell" | "cell" | "cells" => Ok(MatrixEncoding::CellByCell),
            "row" | "rows" | "row_compressed" => Ok(MatrixEncoding::RowCompressed),
            "raw" => Ok(MatrixEncoding::Raw),
            other => Err(XmlError::Configuration(format!(
                "unknown matrix encoding '{other}' (expected cell_by_cell, row or raw)"
            ))),
        }
    }
}

/// How a disagreement between registration order and numeric zone ids is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PositionalCheck {
    Off,
    #[default]
    Warn,
    Strict,
}

impl FromStr for PositionalCheck {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(PositionalCheck::Off),
            "warn" => Ok(PositionalCheck::Warn),
            "strict" => Ok(PositionalCheck::Strict),
            other => Err(XmlError::Configuration(format!(
                "unknown positional zone check '{other}' (expected off, warn or strict)"
            ))),
        }
    }
}

/// Decodes OD matrix fragments against one zone registry
///
/// The positional consistency check runs at most once per decoder, the first
/// time a positional encoding is decoded.
#[derive(Debug)]
pub struct OdMatrixDecoder<'a> {
    zones: &'a ZoneRegistry,
    check: PositionalCheck,
    positional_checked: bool,
    warnings: Vec<ConversionWarning>,
}

/// Decode one fragment, logging positional-order warnings instead of collecting them
pub fn decode(
    fragment: &OdMatrixFragment,
    pcu_factor: f64,
    zones: &ZoneRegistry,
) -> Result<DemandMatrix> {
    let mut decoder = OdMatrixDecoder::new(zones, PositionalCheck::Warn);
    decoder.decode(fragment, pcu_factor)
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> OdMatrixDecoder<'a> {
    pub fn new(zones: &'a ZoneRegistry, check: PositionalCheck) -> Self {
        Self {
            zones,
            check,
            positional_checked: false,
            warnings: Vec::new(),
        }
    }

    /// Warnings collected so far
    pub fn take_warnings(&mut self) -> Vec<ConversionWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Decode `fragment` into a dense matrix, scaling every value by `pcu_factor`
    pub fn decode(
        &mut self,
        fragment: &OdMatrixFragment,
        pcu_factor: f64,
    ) -> Result<DemandMatrix> {
        if !(pcu_factor.is_finite() && pcu_factor > 0.0) {
            return Err(XmlError::Configuration(format!(
                "pcu factor must be a positive number, got {pcu_factor}"
            )));
        }
        let mut builder = MatrixBuilder::new(self.zones, pcu_factor);

        match fragment {
            OdMatrixFragment::CellByCell { cells } => {
                self.decode_cells(cells, &mut builder)?;
            }
            OdMatrixFragment::RowCompressed {
                value_delimiter,
                rows,
            } => {
                let delimiter = delimiter_or_default("row value delimiter", value_delimiter)?;
                self.check_positional_order()?;
                self.decode_rows(rows, delimiter, &mut builder)?;
            }
            OdMatrixFragment::Raw {
                origin_delimiter,
                destination_delimiter,
                values,
            } => {
                let origin = delimiter_or_default("origin delimiter", origin_delimiter)?;
                let destination =
                    delimiter_or_default("destination delimiter", destination_delimiter)?;
                let rows = split_raw(values, origin, destination)?;
                if rows.len() != self.zones.len() {
                    return Err(XmlError::MatrixDimensionMismatch {
                        expected: self.zones.len(),
                        found: rows.len(),
                    });
                }
                self.check_positional_order()?;
                for (row, tokens) in rows.iter().enumerate() {
                    for (column, token) in tokens.iter().enumerate() {
                        let value = parse_value(token, row, column)?;
                        builder.commit(row, column, value)?;
                    }
                }
            }
        }

        Ok(builder.finish())
    }

    fn decode_cells(&self, cells: &[OdCell], builder: &mut MatrixBuilder<'_>) -> Result<()> {
        for (index, cell) in cells.iter().enumerate() {
            let origin = self.zones.index_of(&cell.origin_ref).ok_or_else(|| {
                XmlError::UnknownZoneReference {
                    reference: cell.origin_ref.clone(),
                    context: format!("origin of cell {index}"),
                }
            })?;
            let destination = self.zones.index_of(&cell.destination_ref).ok_or_else(|| {
                XmlError::UnknownZoneReference {
                    reference: cell.destination_ref.clone(),
                    context: format!("destination of cell {index}"),
                }
            })?;
            builder.commit(origin, destination, cell.value)?;
        }
        Ok(())
    }

    fn decode_rows(
        &self,
        rows: &[OdRow],
        delimiter: char,
        builder: &mut MatrixBuilder<'_>,
    ) -> Result<()> {
        let zone_count = self.zones.len();
        for (row_index, row) in rows.iter().enumerate() {
            let origin = self.zones.index_of(&row.origin_ref).ok_or_else(|| {
                XmlError::UnknownZoneReference {
                    reference: row.origin_ref.clone(),
                    context: format!("origin of row {row_index}"),
                }
            })?;

            let tokens = split_values(&row.values, delimiter);
            if tokens.len() != zone_count {
                return Err(XmlError::NonSquareMatrix(format!(
                    "row {row_index} (origin '{}') has {} values but the zoning has {zone_count} zones",
                    row.origin_ref,
                    tokens.len()
                )));
            }

            for (column, token) in tokens.iter().enumerate() {
                let destination = self.zones.index_at_position(column + 1).ok_or_else(|| {
                    XmlError::UnknownZoneReference {
                        reference: format!("#{}", column + 1),
                        context: format!("destination position in row {row_index}"),
                    }
                })?;
                let value = parse_value(token, row_index, column)?;
                builder.commit(origin, destination, value)?;
            }
        }
        Ok(())
    }

    /// Verify that numeric zone ids follow registration order (1..N or 0..N-1)
    fn check_positional_order(&mut self) -> Result<()> {
        if self.positional_checked || self.check == PositionalCheck::Off {
            return Ok(());
        }
        self.positional_checked = true;

        let Some(numbers) = self
            .zones
            .keys()
            .map(|key| key.parse::<i64>().ok())
            .collect::<Option<Vec<_>>>()
        else {
            // Non-numeric ids carry no competing numbering
            return Ok(());
        };

        let follows = |offset: i64| {
            numbers
                .iter()
                .enumerate()
                .all(|(index, number)| *number == index as i64 + offset)
        };
        if follows(1) || follows(0) {
            return Ok(());
        }

        let (position, id) = numbers
            .iter()
            .enumerate()
            .find(|(index, number)| **number != *index as i64 + 1)
            .map(|(index, number)| (index + 1, *number))
            .unwrap_or_default();
        let detail = format!(
            "zone at registration position {position} has id {id}; compact OD matrices address zones by position"
        );

        match self.check {
            PositionalCheck::Strict => Err(XmlError::PositionalZoneMismatch(detail)),
            _ => {
                tracing::warn!("{detail}");
                self.warnings
                    .push(ConversionWarning::PositionalZoneOrder { detail });
                Ok(())
            }
        }
    }
}

/// Single commit point for decoded demand values
struct MatrixBuilder<'a> {
    zones: &'a ZoneRegistry,
    pcu_factor: f64,
    matrix: DemandMatrix,
}

impl<'a> MatrixBuilder<'a> {
    fn new(zones: &'a ZoneRegistry, pcu_factor: f64) -> Self {
        Self {
            zones,
            pcu_factor,
            matrix: DemandMatrix::new(zones.len()),
        }
    }

    fn commit(&mut self, origin: usize, destination: usize, value: f64) -> Result<()> {
        if !(value.is_finite() && value >= 0.0) {
            return Err(XmlError::NegativeDemand {
                origin: self.zones.key_of(origin).unwrap_or_default().to_string(),
                destination: self
                    .zones
                    .key_of(destination)
                    .unwrap_or_default()
                    .to_string(),
                value,
            });
        }
        self.matrix.set(origin, destination, value * self.pcu_factor);
        Ok(())
    }

    fn finish(self) -> DemandMatrix {
        self.matrix
    }
}

fn delimiter_or_default(setting: &str, delimiter: &Option<String>) -> Result<char> {
    delimiter
        .as_deref()
        .map(|d| single_char(setting, d))
        .transpose()
        .map(|d| d.unwrap_or(DEFAULT_MATRIX_DELIMITER))
}

/// Split a value string, treating an all-blank string as no values
fn split_values(text: &str, delimiter: char) -> Vec<&str> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        split_literal(text.trim(), delimiter)
    }
}

/// Split a raw matrix string into square rows of tokens
fn split_raw(values: &str, origin: char, destination: char) -> Result<Vec<Vec<&str>>> {
    if origin == destination {
        let tokens = split_values(values, origin);
        let count = tokens.len();
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = (count as f64).sqrt().round() as usize;
        if size * size != count {
            return Err(XmlError::NonSquareMatrix(format!(
                "{count} values with a shared delimiter '{origin}' cannot form a square matrix"
            )));
        }
        return Ok(tokens.chunks(size).map(<[&str]>::to_vec).collect());
    }

    let mut row_strings = split_values(values, origin);
    // A trailing origin delimiter leaves one empty row behind
    if row_strings.last().is_some_and(|row| row.is_empty()) {
        row_strings.pop();
    }
    let row_count = row_strings.len();

    row_strings
        .into_iter()
        .enumerate()
        .map(|(row, text)| {
            let tokens = split_values(text, destination);
            if tokens.len() != row_count {
                return Err(XmlError::NonSquareMatrix(format!(
                    "row {row} has {} values but the matrix has {row_count} rows",
                    tokens.len()
                )));
            }
            Ok(tokens)
        })
        .collect()
}

fn parse_value(token: &str, row: usize, column: usize) -> Result<f64> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| XmlError::MalformedMatrixValue {
            row,
            column,
            token: token.to_string(),
        })
}

/// Delimiters and number format used when encoding matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatrixTextFormat {
    /// Value delimiter of row-compressed rows
    pub value_delimiter: char,
    pub origin_delimiter: char,
    pub destination_delimiter: char,
    pub number: NumberFormat,
}

impl Default for MatrixTextFormat {
    fn default() -> Self {
        Self {
            value_delimiter: DEFAULT_MATRIX_DELIMITER,
            origin_delimiter: DEFAULT_MATRIX_DELIMITER,
            destination_delimiter: DEFAULT_MATRIX_DELIMITER,
            number: NumberFormat::default(),
        }
    }
}

/// Encode a dense matrix into the requested wire shape
///
/// `zone_refs` are the identifiers written for each zone, in registry order.
/// Values are divided by `pcu_factor`, undoing the scaling applied on decode.
/// Cell-by-cell output omits zero cells.
pub fn encode(
    matrix: &DemandMatrix,
    encoding: MatrixEncoding,
    pcu_factor: f64,
    zone_refs: &[String],
    format: &MatrixTextFormat,
) -> Result<OdMatrixFragment> {
    if matrix.size() != zone_refs.len() {
        return Err(XmlError::MatrixDimensionMismatch {
            expected: zone_refs.len(),
            found: matrix.size(),
        });
    }
    if !(pcu_factor.is_finite() && pcu_factor > 0.0) {
        return Err(XmlError::Configuration(format!(
            "pcu factor must be a positive number, got {pcu_factor}"
        )));
    }
    let unscale = |value: f64| value / pcu_factor;
    let join = |values: &[f64], delimiter: char| {
        values
            .iter()
            .map(|value| format.number.format(unscale(*value)))
            .collect::<Vec<_>>()
            .join(&delimiter.to_string())
    };

    let fragment = match encoding {
        MatrixEncoding::CellByCell => OdMatrixFragment::CellByCell {
            cells: matrix
                .non_zero()
                .map(|(origin, destination, value)| OdCell {
                    origin_ref: zone_refs[origin].clone(),
                    destination_ref: zone_refs[destination].clone(),
                    value: unscale(value),
                })
                .collect(),
        },
        MatrixEncoding::RowCompressed => OdMatrixFragment::RowCompressed {
            value_delimiter: Some(format.value_delimiter.to_string()),
            rows: (0..matrix.size())
                .map(|origin| OdRow {
                    origin_ref: zone_refs[origin].clone(),
                    values: join(matrix.row(origin), format.value_delimiter),
                })
                .collect(),
        },
        MatrixEncoding::Raw => OdMatrixFragment::Raw {
            origin_delimiter: Some(format.origin_delimiter.to_string()),
            destination_delimiter: Some(format.destination_delimiter.to_string()),
            values: (0..matrix.size())
                .map(|origin| join(matrix.row(origin), format.destination_delimiter))
                .collect::<Vec<_>>()
                .join(&format.origin_delimiter.to_string()),
        },
    };
    Ok(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Ids;
    use crate::model::Zone;

    fn registry(keys: &[&str]) -> ZoneRegistry {
        let mut zones = ZoneRegistry::new();
        for (index, key) in keys.iter().enumerate() {
            zones
                .register(Zone {
                    ids: Ids::new(index as u64).with_xml_id(Some(key.to_string())),
                    centroid: None,
                    boundary: None,
                })
                .unwrap();
        }
        zones
    }

    fn raw(values: &str, origin: &str, destination: &str) -> OdMatrixFragment {
        OdMatrixFragment::Raw {
            origin_delimiter: Some(origin.to_string()),
            destination_delimiter: Some(destination.to_string()),
            values: values.to_string(),
        }
    }

    fn refs(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_cell_by_cell_resolves_references() {
        let zones = registry(&["A", "B", "C"]);
        let fragment = OdMatrixFragment::CellByCell {
            cells: vec![
                OdCell {
                    origin_ref: "A".into(),
                    destination_ref: "C".into(),
                    value: 5.0,
                },
                OdCell {
                    origin_ref: "C".into(),
                    destination_ref: "B".into(),
                    value: 1.5,
                },
            ],
        };
        let matrix = decode(&fragment, 2.0, &zones).unwrap();
        assert_eq!(matrix.size(), 3);
        assert_eq!(matrix.get(0, 2), 10.0);
        assert_eq!(matrix.get(2, 1), 3.0);
        assert_eq!(matrix.get(1, 1), 0.0);
        assert_eq!(matrix.total(), 13.0);
    }

    #[test]
    fn test_cell_by_cell_unknown_zone() {
        let zones = registry(&["A", "B"]);
        let fragment = OdMatrixFragment::CellByCell {
            cells: vec![OdCell {
                origin_ref: "A".into(),
                destination_ref: "Z".into(),
                value: 1.0,
            }],
        };
        let error = decode(&fragment, 1.0, &zones).unwrap_err();
        match error {
            XmlError::UnknownZoneReference { reference, context } => {
                assert_eq!(reference, "Z");
                assert_eq!(context, "destination of cell 0");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_row_compressed_positional_mapping() {
        let zones = registry(&["A", "B", "C"]);
        let fragment = OdMatrixFragment::RowCompressed {
            value_delimiter: None,
            rows: vec![OdRow {
                origin_ref: "A".into(),
                values: "10,20,30".into(),
            }],
        };
        let matrix = decode(&fragment, 1.5, &zones).unwrap();
        assert_eq!(matrix.get(0, 0), 15.0);
        assert_eq!(matrix.get(0, 1), 30.0);
        assert_eq!(matrix.get(0, 2), 45.0);
        assert_eq!(matrix.row(1), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_row_compressed_maps_by_registration_order_not_id() {
        // Destination position 1 is the first registered zone ("3"), whatever its id
        let zones = registry(&["3", "1", "2"]);
        let fragment = OdMatrixFragment::RowCompressed {
            value_delimiter: Some(";".into()),
            rows: vec![OdRow {
                origin_ref: "1".into(),
                values: "7;8;9".into(),
            }],
        };
        let mut decoder = OdMatrixDecoder::new(&zones, PositionalCheck::Warn);
        let matrix = decoder.decode(&fragment, 1.0).unwrap();
        assert_eq!(matrix.get(1, 0), 7.0);
        assert_eq!(matrix.get(1, 1), 8.0);
        assert_eq!(matrix.get(1, 2), 9.0);

        let warnings = decoder.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            ConversionWarning::PositionalZoneOrder { .. }
        ));
    }

    #[test]
    fn test_positional_check_strict_and_off() {
        let zones = registry(&["2", "1"]);
        let fragment = raw("1,2,3,4", ",", ",");

        let mut strict = OdMatrixDecoder::new(&zones, PositionalCheck::Strict);
        assert!(matches!(
            strict.decode(&fragment, 1.0),
            Err(XmlError::PositionalZoneMismatch(_))
        ));

        let mut off = OdMatrixDecoder::new(&zones, PositionalCheck::Off);
        assert!(off.decode(&fragment, 1.0).is_ok());
        assert!(off.take_warnings().is_empty());
    }

    #[test]
    fn test_positional_check_accepts_consistent_numbering() {
        for keys in [&["1", "2", "3"], &["0", "1", "2"], &["x", "y", "z"]] {
            let zones = registry(keys);
            let mut decoder = OdMatrixDecoder::new(&zones, PositionalCheck::Strict);
            decoder
                .decode(&raw("0,0,0,0,0,0,0,0,0", ",", ","), 1.0)
                .unwrap();
            assert!(decoder.take_warnings().is_empty());
        }
    }

    #[test]
    fn test_row_compressed_wrong_length() {
        let zones = registry(&["A", "B", "C"]);
        let fragment = OdMatrixFragment::RowCompressed {
            value_delimiter: None,
            rows: vec![OdRow {
                origin_ref: "B".into(),
                values: "1,2".into(),
            }],
        };
        assert!(matches!(
            decode(&fragment, 1.0, &zones),
            Err(XmlError::NonSquareMatrix(_))
        ));
    }

    #[test]
    fn test_raw_square_validation() {
        let zones = registry(&["A", "B", "C"]);
        let nine = raw("1,2,3,4,5,6,7,8,9", ",", ",");
        let matrix = decode(&nine, 1.0, &zones).unwrap();
        assert_eq!(matrix.get(0, 0), 1.0);
        assert_eq!(matrix.get(1, 0), 4.0);
        assert_eq!(matrix.get(2, 2), 9.0);

        let eight = raw("1,2,3,4,5,6,7,8", ",", ",");
        assert!(matches!(
            decode(&eight, 1.0, &zones),
            Err(XmlError::NonSquareMatrix(_))
        ));
    }

    #[test]
    fn test_raw_distinct_delimiters() {
        let zones = registry(&["A", "B"]);
        let matrix = decode(&raw("1,2;3,4;", ";", ","), 1.0, &zones).unwrap();
        assert_eq!(matrix.get(0, 1), 2.0);
        assert_eq!(matrix.get(1, 0), 3.0);

        assert!(matches!(
            decode(&raw("1,2;3", ";", ","), 1.0, &zones),
            Err(XmlError::NonSquareMatrix(_))
        ));
        assert!(matches!(
            decode(&raw("1,2,3;4,5,6", ";", ","), 1.0, &zones),
            Err(XmlError::NonSquareMatrix(_))
        ));
    }

    #[test]
    fn test_raw_reserved_delimiters_are_literal() {
        let zones = registry(&["A", "B", "C"]);
        let plain = decode(&raw("1,2,3,4,5,6,7,8,9", ",", ","), 2.0, &zones).unwrap();
        for delimiter in ["+", "*", "^", "."] {
            let values = "1,2,3,4,5,6,7,8,9".replace(',', delimiter);
            let escaped = decode(&raw(&values, delimiter, delimiter), 2.0, &zones).unwrap();
            assert_eq!(escaped, plain, "delimiter {delimiter}");
        }
    }

    #[test]
    fn test_raw_dimension_must_match_zoning() {
        let zones = registry(&["A", "B", "C"]);
        assert!(matches!(
            decode(&raw("1,2,3,4", ",", ","), 1.0, &zones),
            Err(XmlError::MatrixDimensionMismatch {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let zones = registry(&["A", "B"]);
        match decode(&raw("1,2,x,4", ",", ","), 1.0, &zones).unwrap_err() {
            XmlError::MalformedMatrixValue { row, column, token } => {
                assert_eq!((row, column), (1, 0));
                assert_eq!(token, "x");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            decode(&raw("1,-2,3,4", ",", ","), 1.0, &zones),
            Err(XmlError::NegativeDemand { .. })
        ));
    }

    #[test]
    fn test_delimiters_must_be_single_characters() {
        let zones = registry(&["A"]);
        assert!(matches!(
            decode(&raw("1", ",,", ","), 1.0, &zones),
            Err(XmlError::Configuration(_))
        ));
        assert!(matches!(
            decode(&raw("1", ",", ","), 0.0, &zones),
            Err(XmlError::Configuration(_))
        ));
    }

    #[test]
    fn test_encode_decode_roundtrip_all_encodings() {
        let keys = ["A", "B", "C"];
        let zones = registry(&keys);
        let format = MatrixTextFormat {
            origin_delimiter: ';',
            ..MatrixTextFormat::default()
        };
        let original = decode(
            &raw("0,1.5,2;3,0,4.25;5,6,0", ";", ","),
            2.0,
            &zones,
        )
        .unwrap();

        for encoding in [
            MatrixEncoding::CellByCell,
            MatrixEncoding::RowCompressed,
            MatrixEncoding::Raw,
        ] {
            let fragment = encode(&original, encoding, 2.0, &refs(&keys), &format).unwrap();
            assert_eq!(fragment.encoding(), encoding);
            let decoded = decode(&fragment, 2.0, &zones).unwrap();
            assert_eq!(decoded, original, "encoding {encoding}");
            let again = encode(&decoded, encoding, 2.0, &refs(&keys), &format).unwrap();
            assert_eq!(again, fragment);
        }
    }

    #[test]
    fn test_encode_raw_text() {
        let zones = registry(&["A", "B"]);
        let matrix = decode(&raw("1,2,3,4", ",", ","), 1.0, &zones).unwrap();
        let format = MatrixTextFormat {
            origin_delimiter: '+',
            destination_delimiter: '+',
            number: NumberFormat::new('.', 1).unwrap(),
            ..MatrixTextFormat::default()
        };
        let fragment = encode(&matrix, MatrixEncoding::Raw, 1.0, &refs(&["A", "B"]), &format)
            .unwrap();
        match fragment {
            OdMatrixFragment::Raw { values, .. } => assert_eq!(values, "1.0+2.0+3.0+4.0"),
            other => panic!("unexpected fragment {other:?}"),
        }
    }

    #[test]
    fn test_encode_rejects_size_mismatch() {
        let matrix = DemandMatrix::new(2);
        assert!(matches!(
            encode(
                &matrix,
                MatrixEncoding::Raw,
                1.0,
                &refs(&["A"]),
                &MatrixTextFormat::default()
            ),
            Err(XmlError::MatrixDimensionMismatch { .. })
        ));
    }
}
