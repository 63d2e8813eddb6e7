//! Coordinate transforms between two reference systems
//!
//! Every transform goes through geographic coordinates: the source is
//! unprojected (when projected), then projected into the destination (when
//! projected). Geographic CRSs in the catalogue share one datum for this
//! purpose, so no datum shift is applied.

use crate::crs::{Crs, CrsKind};
use crate::projection::Projection;
use crate::{Result, XmlError};
use geo::Coord;

/// Pure coordinate mapping bound to a (source, destination) CRS pair
///
/// Construction evaluates the projection constants once; the transform is
/// immutable afterwards and belongs to the session that built it.
#[derive(Debug, Clone)]
pub struct Transform {
    source: Crs,
    destination: Crs,
    /// Unprojects source coordinates (None when the source is geographic)
    unproject: Option<Projection>,
    /// Projects into the destination (None when the destination is geographic)
    project: Option<Projection>,
}

/// Build the transform from `source` to `destination`
///
/// Returns `None` when both CRS have the same identifier. Pairing the generic
/// cartesian CRS with a georeferenced one has no transform path.
pub fn build_transform(source: &Crs, destination: &Crs) -> Result<Option<Transform>> {
    if source == destination {
        return Ok(None);
    }
    if source.is_cartesian() || destination.is_cartesian() {
        return Err(XmlError::UnsupportedProjection(format!(
            "no transform between {source} and {destination}: generic cartesian coordinates are not georeferenced"
        )));
    }

    tracing::debug!(
        "Building coordinate transform {} ({}) -> {} ({})",
        source,
        source.name(),
        destination,
        destination.name()
    );

    Ok(Some(Transform {
        source: source.clone(),
        destination: destination.clone(),
        unproject: projection_of(source),
        project: projection_of(destination),
    }))
}

fn projection_of(crs: &Crs) -> Option<Projection> {
    match crs.kind() {
        CrsKind::Projected(params) => Some(Projection::new(params)),
        CrsKind::Geographic(_) | CrsKind::Cartesian => None,
    }
}

impl Transform {
    #[inline]
    pub fn source(&self) -> &Crs {
        &self.source
    }

    #[inline]
    pub fn destination(&self) -> &Crs {
        &self.destination
    }

    /// Map one coordinate from the source to the destination CRS
    pub fn apply(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        if !(coord.x.is_finite() && coord.y.is_finite()) {
            return Err(XmlError::GeometryTransform(format!(
                "non-finite coordinate ({}, {})",
                coord.x, coord.y
            )));
        }

        let geographic = match &self.unproject {
            Some(projection) => projection.inverse(coord).ok_or_else(|| {
                XmlError::GeometryTransform(format!(
                    "({}, {}) cannot be unprojected from {}",
                    coord.x, coord.y, self.source
                ))
            })?,
            None => coord,
        };

        if geographic.y.abs() > 90.0 {
            return Err(XmlError::GeometryTransform(format!(
                "latitude {} of ({}, {}) is outside [-90, 90]",
                geographic.y, coord.x, coord.y
            )));
        }

        match &self.project {
            Some(projection) => projection.forward(geographic).ok_or_else(|| {
                XmlError::GeometryTransform(format!(
                    "({}, {}) has no image in {}",
                    coord.x, coord.y, self.destination
                ))
            }),
            None => Ok(geographic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crs(code: &str) -> Crs {
        Crs::from_code(code).unwrap()
    }

    #[test]
    fn test_identity_transform_is_none() {
        assert!(build_transform(&Crs::wgs84(), &crs("EPSG:4326")).unwrap().is_none());
    }

    #[test]
    fn test_cartesian_has_no_path() {
        assert!(matches!(
            build_transform(&Crs::cartesian(), &Crs::wgs84()),
            Err(XmlError::UnsupportedProjection(_))
        ));
        assert!(matches!(
            build_transform(&crs("EPSG:3857"), &Crs::cartesian()),
            Err(XmlError::UnsupportedProjection(_))
        ));
    }

    #[test]
    fn test_geographic_to_utm() {
        let transform = build_transform(&Crs::wgs84(), &crs("EPSG:32631")).unwrap().unwrap();
        let projected = transform.apply(Coord { x: 3.0, y: 0.0 }).unwrap();
        assert!((projected.x - 500_000.0).abs() < 1e-6);
        assert!(projected.y.abs() < 1e-6);
    }

    #[test]
    fn test_projected_to_projected_roundtrip() {
        let forward = build_transform(&crs("EPSG:3857"), &crs("EPSG:7856")).unwrap().unwrap();
        let backward = build_transform(&crs("EPSG:7856"), &crs("EPSG:3857")).unwrap().unwrap();
        let mercator = crate::projection::wgs84_to_mercator(-33.8688, 151.2093).unwrap();

        let mga = forward.apply(mercator).unwrap();
        let back = backward.apply(mga).unwrap();
        assert!((back.x - mercator.x).abs() < 1e-4);
        assert!((back.y - mercator.y).abs() < 1e-4);
    }

    #[test]
    fn test_numeric_failures_are_errors() {
        let transform = build_transform(&Crs::wgs84(), &crs("EPSG:3857")).unwrap().unwrap();
        assert!(matches!(
            transform.apply(Coord { x: 0.0, y: 90.0 }),
            Err(XmlError::GeometryTransform(_))
        ));
        assert!(matches!(
            transform.apply(Coord { x: 0.0, y: 91.0 }),
            Err(XmlError::GeometryTransform(_))
        ));
        assert!(matches!(
            transform.apply(Coord { x: f64::NAN, y: 0.0 }),
            Err(XmlError::GeometryTransform(_))
        ));
    }
}
