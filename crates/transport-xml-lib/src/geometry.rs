//! Wire geometry <-> `geo` geometry, with reprojection and length derivation
//!
//! The codec is bound to the CRS its coordinates live in. That CRS fixes the
//! distance metric once: geodesic on the ellipsoid for geographic systems,
//! geodesic after unprojecting for projected systems, and plain Euclidean for
//! the generic cartesian system.

use crate::crs::{Crs, CrsKind};
use crate::projection::Projection;
use crate::text::{NumberFormat, Separators, split_literal};
use crate::transform::Transform;
use crate::wire::{WireCoordinates, WireLineString, WirePoint, WirePolygon};
use crate::{ConversionWarning, Result, XmlError};
use geo::{Coord, Distance, Euclidean, Geodesic, LineString, Point, Polygon};
use std::fmt;
use std::str::FromStr;

/// Unit of an explicit link length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LengthUnit {
    #[default]
    Kilometres,
    Metres,
}

impl LengthUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LengthUnit::Kilometres => "km",
            LengthUnit::Metres => "m",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LengthUnit {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "km" | "kilometre" | "kilometres" | "kilometer" | "kilometers" => {
                Ok(LengthUnit::Kilometres)
            }
            "m" | "metre" | "metres" | "meter" | "meters" => Ok(LengthUnit::Metres),
            other => Err(XmlError::Xml(format!("unknown length unit '{other}'"))),
        }
    }
}

/// Length given explicitly on a link
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExplicitLength {
    pub value: f64,
    pub unit: LengthUnit,
}

impl ExplicitLength {
    #[inline]
    pub fn kilometres(&self) -> f64 {
        match self.unit {
            LengthUnit::Kilometres => self.value,
            LengthUnit::Metres => self.value / 1000.0,
        }
    }
}

/// Where a link length came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthOutcome {
    /// Explicit length, already in km
    Explicit(f64),
    /// Integrated along the geometry, in km
    Geometry(f64),
    /// Neither source was usable
    Unavailable,
}

impl LengthOutcome {
    /// Length in km, 0 when unavailable
    #[inline]
    pub fn km(&self) -> f64 {
        match self {
            LengthOutcome::Explicit(km) | LengthOutcome::Geometry(km) => *km,
            LengthOutcome::Unavailable => 0.0,
        }
    }

    /// The warning this outcome raises for `link`, if any
    pub fn warning(&self, link: &str) -> Option<ConversionWarning> {
        matches!(self, LengthOutcome::Unavailable).then(|| ConversionWarning::LengthUnavailable {
            link: link.to_string(),
        })
    }
}

/// How line geometry is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LineEncoding {
    #[default]
    PosList,
    Coordinates,
}

impl FromStr for LineEncoding {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pos_list" | "poslist" => Ok(LineEncoding::PosList),
            "coordinates" | "coords" => Ok(LineEncoding::Coordinates),
            other => Err(XmlError::Configuration(format!(
                "unknown line encoding '{other}' (expected pos_list or coordinates)"
            ))),
        }
    }
}

/// Distance between two coordinates of one CRS
#[derive(Debug, Clone)]
pub enum DistanceMetric {
    /// Coordinates are longitude/latitude degrees
    Geodesic,
    /// Coordinates are projected; unproject, then measure geodesically
    ProjectedGeodesic(Projection),
    /// Coordinates are planar metres
    Euclidean,
}

impl DistanceMetric {
    pub fn for_crs(crs: &Crs) -> Self {
        match crs.kind() {
            CrsKind::Geographic(_) => DistanceMetric::Geodesic,
            CrsKind::Projected(params) => {
                DistanceMetric::ProjectedGeodesic(Projection::new(params))
            }
            CrsKind::Cartesian => DistanceMetric::Euclidean,
        }
    }

    /// Distance in km
    pub fn distance_km(&self, a: Coord<f64>, b: Coord<f64>) -> Result<f64> {
        let km = match self {
            DistanceMetric::Geodesic => Geodesic.distance(Point::from(a), Point::from(b)) / 1000.0,
            DistanceMetric::ProjectedGeodesic(projection) => {
                let unproject = |c: Coord<f64>| {
                    projection.inverse(c).ok_or_else(|| {
                        XmlError::GeometryTransform(format!(
                            "({}, {}) cannot be unprojected to measure distance",
                            c.x, c.y
                        ))
                    })
                };
                let (a, b) = (unproject(a)?, unproject(b)?);
                Geodesic.distance(Point::from(a), Point::from(b)) / 1000.0
            }
            DistanceMetric::Euclidean => Euclidean.distance(Point::from(a), Point::from(b)) / 1000.0,
        };
        if km.is_finite() {
            Ok(km)
        } else {
            Err(XmlError::GeometryTransform(format!(
                "distance between ({}, {}) and ({}, {}) is not finite",
                a.x, a.y, b.x, b.y
            )))
        }
    }
}

/// Converts wire geometry to `geo` types in one CRS and back
#[derive(Debug, Clone)]
pub struct GeometryCodec {
    crs: Crs,
    metric: DistanceMetric,
    separators: Separators,
    number_format: NumberFormat,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryCodec {
    /// Codec for coordinates in `crs`, emitting `fraction_digits` digits
    pub fn new(crs: Crs, separators: Separators, fraction_digits: usize) -> Result<Self> {
        let number_format = NumberFormat::new(separators.decimal, fraction_digits)?;
        Ok(Self {
            metric: DistanceMetric::for_crs(&crs),
            crs,
            separators,
            number_format,
        })
    }

    #[inline]
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    #[inline]
    pub fn metric(&self) -> &DistanceMetric {
        &self.metric
    }

    #[inline]
    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    #[inline]
    pub fn number_format(&self) -> &NumberFormat {
        &self.number_format
    }

    /// Apply `transform` to one coordinate, identity when absent
    #[inline]
    pub fn transform(&self, coord: Coord<f64>, transform: Option<&Transform>) -> Result<Coord<f64>> {
        match transform {
            Some(transform) => transform.apply(coord),
            None => Ok(coord),
        }
    }

    /// Apply `transform` to every coordinate, never dropping one
    pub fn transform_all(
        &self,
        coords: &[Coord<f64>],
        transform: Option<&Transform>,
    ) -> Result<Vec<Coord<f64>>> {
        let Some(transform) = transform else {
            return Ok(coords.to_vec());
        };
        coords
            .iter()
            .enumerate()
            .map(|(index, coord)| {
                transform.apply(*coord).map_err(|error| match error {
                    XmlError::GeometryTransform(detail) => {
                        XmlError::GeometryTransform(format!("coordinate {index}: {detail}"))
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Pair up a flat `x y x y ...` position list
    pub fn parse_position_list(&self, values: &[f64]) -> Result<Vec<Coord<f64>>> {
        if values.len() % 2 != 0 {
            return Err(XmlError::MalformedGeometry(format!(
                "position list has an odd number of values ({})",
                values.len()
            )));
        }
        Ok(values
            .chunks_exact(2)
            .map(|pair| Coord {
                x: pair[0],
                y: pair[1],
            })
            .collect())
    }

    /// Parse a delimited coordinate string such as `1.0,2.0 3.0,4.0`
    pub fn parse_coordinates(&self, text: &str, separators: &Separators) -> Result<Vec<Coord<f64>>> {
        let number = NumberFormat {
            decimal_separator: separators.decimal,
            ..self.number_format
        };
        split_literal(text, separators.tuple)
            .into_iter()
            .filter(|tuple| !tuple.is_empty())
            .enumerate()
            .map(|(index, tuple)| {
                let values = split_literal(tuple, separators.value);
                let parsed: Option<Vec<f64>> = values.iter().map(|v| number.parse(v)).collect();
                match parsed.as_deref() {
                    Some([x, y]) => Ok(Coord { x: *x, y: *y }),
                    _ => Err(XmlError::MalformedGeometry(format!(
                        "coordinate tuple {index} '{tuple}' does not hold exactly two numbers"
                    ))),
                }
            })
            .collect()
    }

    /// Decode a point, transforming it into the codec CRS
    pub fn decode_point(&self, point: &WirePoint, transform: Option<&Transform>) -> Result<Coord<f64>> {
        match point.pos.as_slice() {
            [x, y] => self.transform(Coord { x: *x, y: *y }, transform),
            other => Err(XmlError::MalformedGeometry(format!(
                "point needs exactly two values, got {}",
                other.len()
            ))),
        }
    }

    /// Decode a line string from either wire encoding
    ///
    /// Lines with fewer than two positions are returned as they are; they
    /// carry no usable length and callers decide whether to keep them.
    pub fn decode_line(
        &self,
        line: &WireLineString,
        transform: Option<&Transform>,
    ) -> Result<LineString<f64>> {
        let coords = match line {
            WireLineString::PosList(values) => self.parse_position_list(values)?,
            WireLineString::Coordinates(coordinates) => {
                let separators = self.separators.with_overrides(
                    coordinates.tuple_separator.as_deref(),
                    coordinates.value_separator.as_deref(),
                    coordinates.decimal.as_deref(),
                )?;
                self.parse_coordinates(&coordinates.text, &separators)?
            }
        };
        Ok(LineString::new(self.transform_all(&coords, transform)?))
    }

    /// Decode a polygon from its exterior ring
    pub fn decode_polygon(
        &self,
        polygon: &WirePolygon,
        transform: Option<&Transform>,
    ) -> Result<Polygon<f64>> {
        let ring = self.parse_position_list(&polygon.exterior)?;
        if ring.len() < 4 {
            return Err(XmlError::MalformedGeometry(format!(
                "polygon ring needs at least four positions, got {}",
                ring.len()
            )));
        }
        if ring.first() != ring.last() {
            return Err(XmlError::MalformedGeometry(
                "polygon ring is not closed".to_string(),
            ));
        }
        let ring = self.transform_all(&ring, transform)?;
        Ok(Polygon::new(LineString::new(ring), Vec::new()))
    }

    /// Distance between two coordinates of the codec CRS, in km
    #[inline]
    pub fn distance_km(&self, a: Coord<f64>, b: Coord<f64>) -> Result<f64> {
        self.metric.distance_km(a, b)
    }

    /// Sum of pairwise distances, `None` without two distinct positions
    pub fn path_length_km(&self, line: &LineString<f64>) -> Result<Option<f64>> {
        let Some(first) = line.0.first() else {
            return Ok(None);
        };
        if line.0.iter().all(|coord| coord == first) {
            return Ok(None);
        }
        let mut total = 0.0;
        for pair in line.0.windows(2) {
            total += self.distance_km(pair[0], pair[1])?;
        }
        Ok(Some(total))
    }

    /// Link length: explicit value first, then the geometry, else unavailable
    pub fn length(
        &self,
        explicit: Option<&ExplicitLength>,
        geometry: Option<&LineString<f64>>,
    ) -> Result<LengthOutcome> {
        if let Some(explicit) = explicit {
            let km = explicit.kilometres();
            if !(km.is_finite() && km >= 0.0) {
                return Err(XmlError::MalformedGeometry(format!(
                    "explicit length {} {} is not a non-negative number",
                    explicit.value, explicit.unit
                )));
            }
            return Ok(LengthOutcome::Explicit(km));
        }
        match geometry {
            Some(line) => Ok(self
                .path_length_km(line)?
                .map_or(LengthOutcome::Unavailable, LengthOutcome::Geometry)),
            None => Ok(LengthOutcome::Unavailable),
        }
    }

    /// Encode a point after transforming it
    pub fn encode_point(&self, coord: Coord<f64>, transform: Option<&Transform>) -> Result<WirePoint> {
        let coord = self.transform(coord, transform)?;
        Ok(WirePoint {
            pos: vec![coord.x, coord.y],
        })
    }

    /// Encode a line string in the requested encoding after transforming it
    pub fn encode_line(
        &self,
        line: &LineString<f64>,
        transform: Option<&Transform>,
        encoding: LineEncoding,
    ) -> Result<WireLineString> {
        let coords = self.transform_all(&line.0, transform)?;
        Ok(match encoding {
            LineEncoding::PosList => WireLineString::PosList(flatten(&coords)),
            LineEncoding::Coordinates => WireLineString::Coordinates(WireCoordinates {
                text: self.format_coordinates(&coords),
                tuple_separator: Some(self.separators.tuple.to_string()),
                value_separator: Some(self.separators.value.to_string()),
                decimal: Some(self.separators.decimal.to_string()),
            }),
        })
    }

    /// Encode a polygon's exterior ring after transforming it
    pub fn encode_polygon(
        &self,
        polygon: &Polygon<f64>,
        transform: Option<&Transform>,
    ) -> Result<WirePolygon> {
        let coords = self.transform_all(&polygon.exterior().0, transform)?;
        Ok(WirePolygon {
            exterior: flatten(&coords),
        })
    }

    fn format_coordinates(&self, coords: &[Coord<f64>]) -> String {
        let value = self.separators.value.to_string();
        coords
            .iter()
            .map(|c| {
                [self.number_format.format(c.x), self.number_format.format(c.y)].join(&value)
            })
            .collect::<Vec<_>>()
            .join(&self.separators.tuple.to_string())
    }
}

fn flatten(coords: &[Coord<f64>]) -> Vec<f64> {
    coords.iter().flat_map(|c| [c.x, c.y]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::build_transform;

    fn codec(code: &str) -> GeometryCodec {
        GeometryCodec::new(Crs::from_code(code).unwrap(), Separators::default(), 6).unwrap()
    }

    fn line(coords: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(coords.to_vec())
    }

    #[test]
    fn test_odd_position_list_fails() {
        let codec = codec("EPSG:4326");
        assert!(matches!(
            codec.parse_position_list(&[1.0, 2.0, 3.0]),
            Err(XmlError::MalformedGeometry(_))
        ));
        assert_eq!(codec.parse_position_list(&[1.0, 2.0, 3.0, 4.0]).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_coordinates_with_custom_separators() {
        let codec = codec("EPSG:4326");
        let separators = Separators::new(';', ' ', ',').unwrap();
        let coords = codec
            .parse_coordinates("1,5 2,5;;3 4;", &separators)
            .unwrap();
        assert_eq!(coords, vec![Coord { x: 1.5, y: 2.5 }, Coord { x: 3.0, y: 4.0 }]);

        match codec.parse_coordinates("1,2 3", &Separators::default()) {
            Err(XmlError::MalformedGeometry(message)) => assert!(message.contains("tuple 1")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_identity_transform_leaves_coordinates() {
        let codec = codec("EPSG:4326");
        let transform = build_transform(codec.crs(), &Crs::wgs84()).unwrap();
        assert!(transform.is_none());
        let coords = vec![Coord { x: 151.2, y: -33.8 }];
        assert_eq!(codec.transform_all(&coords, transform.as_ref()).unwrap(), coords);
    }

    #[test]
    fn test_transform_error_names_coordinate() {
        let codec = codec("EPSG:3857");
        let transform = build_transform(&Crs::wgs84(), codec.crs()).unwrap();
        let coords = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 95.0 }];
        match codec.transform_all(&coords, transform.as_ref()) {
            Err(XmlError::GeometryTransform(message)) => assert!(message.contains("coordinate 1")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_geodesic_distance() {
        let codec = codec("EPSG:4326");
        let km = codec
            .distance_km(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 })
            .unwrap();
        assert!((km - 111.3195).abs() < 1e-3, "{km}");
    }

    #[test]
    fn test_projected_distance_is_ground_distance() {
        let codec = codec("EPSG:32631");
        let km = codec
            .distance_km(
                Coord { x: 500_000.0, y: 0.0 },
                Coord { x: 500_000.0, y: 1000.0 },
            )
            .unwrap();
        // Grid distance on the central meridian is scaled by k0 = 0.9996
        assert!((km - 1.0 / 0.9996).abs() < 1e-3, "{km}");
    }

    #[test]
    fn test_cartesian_distance() {
        let codec = codec("CARTESIAN");
        let km = codec
            .distance_km(Coord { x: 0.0, y: 0.0 }, Coord { x: 3000.0, y: 4000.0 })
            .unwrap();
        assert!((km - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_length_wins() {
        let codec = codec("EPSG:4326");
        let geometry = line(&[(0.0, 0.0), (0.0, 0.0279)]);
        let derived = codec.length(None, Some(&geometry)).unwrap();
        assert!(matches!(derived, LengthOutcome::Geometry(km) if (km - 3.1).abs() < 0.05));

        let explicit = ExplicitLength {
            value: 2.5,
            unit: LengthUnit::Kilometres,
        };
        assert_eq!(
            codec.length(Some(&explicit), Some(&geometry)).unwrap(),
            LengthOutcome::Explicit(2.5)
        );
    }

    #[test]
    fn test_metres_are_converted() {
        let codec = codec("EPSG:4326");
        let explicit = ExplicitLength {
            value: 2500.0,
            unit: "m".parse().unwrap(),
        };
        assert_eq!(codec.length(Some(&explicit), None).unwrap().km(), 2.5);
    }

    #[test]
    fn test_length_unavailable() {
        let codec = codec("EPSG:4326");
        let degenerate = line(&[(1.0, 1.0), (1.0, 1.0)]);
        let outcome = codec.length(None, Some(&degenerate)).unwrap();
        assert_eq!(outcome, LengthOutcome::Unavailable);
        assert_eq!(outcome.km(), 0.0);
        assert_eq!(
            outcome.warning("7"),
            Some(ConversionWarning::LengthUnavailable {
                link: "7".to_string()
            })
        );
        assert_eq!(codec.length(None, None).unwrap(), LengthOutcome::Unavailable);
    }

    #[test]
    fn test_polygon_must_be_closed() {
        let codec = codec("EPSG:4326");
        let open = WirePolygon {
            exterior: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
        };
        assert!(matches!(
            codec.decode_polygon(&open, None),
            Err(XmlError::MalformedGeometry(_))
        ));
        let closed = WirePolygon {
            exterior: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0],
        };
        assert_eq!(codec.decode_polygon(&closed, None).unwrap().exterior().0.len(), 4);
    }

    #[test]
    fn test_point_needs_two_values() {
        let codec = codec("EPSG:4326");
        assert!(codec.decode_point(&WirePoint { pos: vec![1.0] }, None).is_err());
        assert_eq!(
            codec.decode_point(&WirePoint { pos: vec![1.0, 2.0] }, None).unwrap(),
            Coord { x: 1.0, y: 2.0 }
        );
    }

    #[test]
    fn test_line_roundtrip_both_encodings() {
        let codec = GeometryCodec::new(Crs::wgs84(), Separators::new(' ', ',', '.').unwrap(), 7)
            .unwrap();
        let original = line(&[(151.2093, -33.8688), (151.2100, -33.8700), (151.2150, -33.8710)]);

        for encoding in [LineEncoding::PosList, LineEncoding::Coordinates] {
            let wire = codec.encode_line(&original, None, encoding).unwrap();
            let decoded = codec.decode_line(&wire, None).unwrap();
            assert_eq!(decoded.0.len(), original.0.len());
            for (a, b) in decoded.0.iter().zip(original.0.iter()) {
                assert!((a.x - b.x).abs() < 1e-7 && (a.y - b.y).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn test_single_position_line_has_no_length() {
        let codec = GeometryCodec::new(Crs::wgs84(), Separators::default(), 6).unwrap();
        let line = codec
            .decode_line(&WireLineString::PosList(vec![151.2, -33.8]), None)
            .unwrap();
        assert_eq!(line.0.len(), 1);
        assert_eq!(codec.length(None, Some(&line)).unwrap(), LengthOutcome::Unavailable);
    }

    #[test]
    fn test_coordinates_text_is_deterministic() {
        let codec = GeometryCodec::new(Crs::wgs84(), Separators::new(';', ' ', ',').unwrap(), 2)
            .unwrap();
        let wire = codec
            .encode_line(&line(&[(1.0, 2.0), (3.456, -0.001)]), None, LineEncoding::Coordinates)
            .unwrap();
        match wire {
            WireLineString::Coordinates(coordinates) => {
                assert_eq!(coordinates.text, "1,00 2,00;3,46 0,00");
                assert_eq!(coordinates.tuple_separator.as_deref(), Some(";"));
            }
            other => panic!("unexpected encoding {other:?}"),
        }
    }

    #[test]
    fn test_encode_reprojects() {
        let codec = codec("EPSG:4326");
        let transform = build_transform(&Crs::wgs84(), &Crs::from_code("EPSG:32631").unwrap())
            .unwrap();
        let point = codec
            .encode_point(Coord { x: 3.0, y: 0.0 }, transform.as_ref())
            .unwrap();
        assert!((point.pos[0] - 500_000.0).abs() < 1e-6);
        assert!(point.pos[1].abs() < 1e-6);
    }
}
