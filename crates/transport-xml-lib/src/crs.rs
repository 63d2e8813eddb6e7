//! Coordinate reference systems and destination CRS resolution
//!
//! A [`Crs`] is identified by its authority code (`EPSG:4326`); two CRS values
//! are equal iff their codes are equal. The catalogue covers the geographic,
//! Web Mercator, UTM-family, NZTM and Australian Lambert systems plus the
//! generic cartesian CRS used for planar data without a datum.

use crate::projection::{
    Ellipsoid, LambertConformalParams, ProjectionParams, TransverseMercatorParams,
};
use crate::{Result, XmlError};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Numeric EPSG code of the generic 2D cartesian CRS
pub const CARTESIAN_CODE: u32 = 404000;

/// Numeric EPSG code of WGS 84 geographic
pub const WGS84_CODE: u32 = 4326;

/// Country hint meaning "no country specific CRS"
pub const GLOBAL_COUNTRY: &str = "Global";

/// How coordinates of a CRS relate to the Earth
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrsKind {
    /// Longitude/latitude in degrees on an ellipsoid
    Geographic(Ellipsoid),
    /// Easting/northing in meters obtained by projecting an ellipsoid
    Projected(ProjectionParams),
    /// Planar coordinates in meters with no georeference
    Cartesian,
}

/// A coordinate reference system
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Crs {
    code: u32,
    name: String,
    kind: CrsKind,
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Crs {}

impl Hash for Crs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.code)
    }
}

impl FromStr for Crs {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self> {
        Crs::from_code(s)
    }
}

impl Crs {
    /// WGS 84 geographic (EPSG:4326)
    pub fn wgs84() -> Self {
        Self {
            code: WGS84_CODE,
            name: "WGS 84".to_string(),
            kind: CrsKind::Geographic(Ellipsoid::WGS84),
        }
    }

    /// Generic cartesian CRS for planar unit-distance computation
    pub fn cartesian() -> Self {
        Self {
            code: CARTESIAN_CODE,
            name: "Generic cartesian 2D".to_string(),
            kind: CrsKind::Cartesian,
        }
    }

    /// Parse an authority code against the catalogue
    ///
    /// Accepts `EPSG:32756`, `epsg:32756`, `32756`, the OGC URN form
    /// `urn:ogc:def:crs:EPSG::32756` and the aliases `CARTESIAN` / `GENERIC_2D`.
    pub fn from_code(code: &str) -> Result<Self> {
        let normalized = code.trim().to_ascii_uppercase();
        if normalized == "CARTESIAN" || normalized == "GENERIC_2D" {
            return Ok(Self::cartesian());
        }

        let numeric = if let Some(rest) = normalized.strip_prefix("URN:OGC:DEF:CRS:EPSG:") {
            // Optional version segment between the two colons
            rest.rsplit(':').next().unwrap_or(rest)
        } else {
            normalized.strip_prefix("EPSG:").unwrap_or(&normalized)
        };

        let epsg: u32 = numeric.trim().parse().map_err(|_| {
            XmlError::UnsupportedProjection(format!("'{code}' is not an EPSG authority code"))
        })?;
        Self::from_epsg(epsg)
    }

    /// Look up a numeric EPSG code in the catalogue
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        let (name, kind) = catalogue(epsg).ok_or_else(|| {
            XmlError::UnsupportedProjection(format!("EPSG:{epsg} is not a supported CRS"))
        })?;
        Ok(Self {
            code: epsg,
            name,
            kind,
        })
    }

    #[inline]
    pub fn epsg(&self) -> u32 {
        self.code
    }

    /// Canonical identifier (`EPSG:<code>`)
    pub fn identifier(&self) -> String {
        self.to_string()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> &CrsKind {
        &self.kind
    }

    #[inline]
    pub fn is_geographic(&self) -> bool {
        matches!(self.kind, CrsKind::Geographic(_))
    }

    /// Whether distances on this CRS follow an Earth ellipsoid (geographic or projected)
    #[inline]
    pub fn is_ellipsoidal(&self) -> bool {
        !matches!(self.kind, CrsKind::Cartesian)
    }

    #[inline]
    pub fn is_cartesian(&self) -> bool {
        matches!(self.kind, CrsKind::Cartesian)
    }
}

fn utm(datum: &str, ellipsoid: Ellipsoid, zone: u32, north: bool) -> (String, CrsKind) {
    let hemisphere = if north { 'N' } else { 'S' };
    (
        format!("{datum} / UTM zone {zone}{hemisphere}"),
        CrsKind::Projected(ProjectionParams::TransverseMercator(
            TransverseMercatorParams::utm(ellipsoid, zone, north),
        )),
    )
}

fn catalogue(epsg: u32) -> Option<(String, CrsKind)> {
    let entry = match epsg {
        WGS84_CODE => {
            let crs = Crs::wgs84();
            (crs.name, crs.kind)
        }
        4258 => ("ETRS89".to_string(), CrsKind::Geographic(Ellipsoid::GRS80)),
        4283 => ("GDA94".to_string(), CrsKind::Geographic(Ellipsoid::GRS80)),
        7844 => ("GDA2020".to_string(), CrsKind::Geographic(Ellipsoid::GRS80)),
        3857 => (
            "WGS 84 / Pseudo-Mercator".to_string(),
            CrsKind::Projected(ProjectionParams::WebMercator),
        ),
        32601..=32660 => utm("WGS 84", Ellipsoid::WGS84, epsg - 32600, true),
        32701..=32760 => utm("WGS 84", Ellipsoid::WGS84, epsg - 32700, false),
        25828..=25838 => utm("ETRS89", Ellipsoid::GRS80, epsg - 25800, true),
        28348..=28358 => {
            let (_, kind) = utm("GDA94", Ellipsoid::GRS80, epsg - 28300, false);
            (format!("GDA94 / MGA zone {}", epsg - 28300), kind)
        }
        7846..=7859 => {
            let zone = epsg - 7800;
            let (_, kind) = utm("GDA2020", Ellipsoid::GRS80, zone, false);
            (format!("GDA2020 / MGA zone {zone}"), kind)
        }
        2193 => (
            "NZGD2000 / New Zealand Transverse Mercator 2000".to_string(),
            CrsKind::Projected(ProjectionParams::TransverseMercator(
                TransverseMercatorParams {
                    ellipsoid: Ellipsoid::GRS80,
                    central_meridian: 173.0,
                    scale_factor: 0.9996,
                    false_easting: 1_600_000.0,
                    false_northing: 10_000_000.0,
                },
            )),
        ),
        3112 => (
            "GDA94 / Geoscience Australia Lambert".to_string(),
            CrsKind::Projected(ProjectionParams::LambertConformal(LambertConformalParams {
                ellipsoid: Ellipsoid::GRS80,
                standard_parallel_1: -18.0,
                standard_parallel_2: -36.0,
                latitude_of_origin: 0.0,
                central_meridian: 134.0,
                false_easting: 0.0,
                false_northing: 0.0,
            })),
        ),
        CARTESIAN_CODE => {
            let crs = Crs::cartesian();
            (crs.name, crs.kind)
        }
        _ => return None,
    };
    Some(entry)
}

/// Preferred projected CRS for a country, matched on English name or ISO 3166 code
pub fn preferred_crs_for_country(country: &str) -> Option<Crs> {
    let epsg = match country.trim().to_ascii_lowercase().as_str() {
        "australia" | "au" | "aus" => 3112,
        "new zealand" | "nz" | "nzl" => 2193,
        "germany" | "de" | "deu" => 25832,
        _ => return None,
    };
    Crs::from_epsg(epsg).ok()
}

/// Decide the destination CRS of a conversion
///
/// Precedence: an explicit destination, then the country's preferred CRS,
/// then the source CRS unchanged. Fails when none of them is available.
pub fn resolve(
    explicit_destination: Option<&Crs>,
    country_hint: Option<&str>,
    source: Option<&Crs>,
) -> Result<Crs> {
    if let Some(destination) = explicit_destination {
        return Ok(destination.clone());
    }
    if let Some(country_crs) = country_hint.and_then(preferred_crs_for_country) {
        tracing::debug!(
            "Using country specific CRS {} for '{}'",
            country_crs,
            country_hint.unwrap_or_default()
        );
        return Ok(country_crs);
    }
    source.cloned().ok_or_else(|| {
        XmlError::Configuration(
            "no destination CRS: source CRS is absent and neither an explicit nor a country CRS is configured"
                .to_string(),
        )
    })
}
