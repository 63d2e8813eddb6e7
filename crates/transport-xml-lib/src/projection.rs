//! Map projection equations used by coordinate transforms
//!
//! All functions work in degrees on the geographic side (x = longitude,
//! y = latitude) and in metres on the projected side (x = easting,
//! y = northing). Forward and inverse projections return `None` when the
//! input lies outside the projection's domain; callers turn that into a
//! transform error.

use geo::Coord;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_MERCATOR_LATITUDE: f64 = 85.05112878;

/// Precomputed constant: EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / PI;

/// Precomputed constant: 180.0 / EARTH_MERCATOR_MAX
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;

/// Precomputed constant: PI / EARTH_MERCATOR_MAX
const Y_TO_LAT_FACTOR: f64 = PI / EARTH_MERCATOR_MAX;

/// Maximum iterations for the Lambert inverse latitude
const LAMBERT_MAX_ITERATIONS: usize = 15;

/// Reference ellipsoid of a geodetic datum
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ellipsoid {
    /// Semi-major axis in meters
    pub semi_major: f64,
    /// Inverse flattening (1/f)
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        semi_major: 6378137.0,
        inverse_flattening: 298.257223563,
    };

    pub const GRS80: Ellipsoid = Ellipsoid {
        semi_major: 6378137.0,
        inverse_flattening: 298.257222101,
    };

    #[inline]
    pub fn flattening(&self) -> f64 {
        1.0 / self.inverse_flattening
    }

    /// First eccentricity
    #[inline]
    pub fn eccentricity(&self) -> f64 {
        let f = self.flattening();
        (f * (2.0 - f)).sqrt()
    }

    /// Third flattening `n = f / (2 - f)`
    #[inline]
    pub fn third_flattening(&self) -> f64 {
        let f = self.flattening();
        f / (2.0 - f)
    }
}

/// Defining parameters of a Transverse Mercator projection (latitude of origin is the equator)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransverseMercatorParams {
    pub ellipsoid: Ellipsoid,
    /// Central meridian in degrees
    pub central_meridian: f64,
    pub scale_factor: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl TransverseMercatorParams {
    /// Parameters of a UTM zone (1..=60) on the given ellipsoid
    pub fn utm(ellipsoid: Ellipsoid, zone: u32, north: bool) -> Self {
        Self {
            ellipsoid,
            central_meridian: -183.0 + 6.0 * zone as f64,
            scale_factor: 0.9996,
            false_easting: 500_000.0,
            false_northing: if north { 0.0 } else { 10_000_000.0 },
        }
    }
}

/// Defining parameters of a Lambert Conformal Conic projection with two standard parallels
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LambertConformalParams {
    pub ellipsoid: Ellipsoid,
    pub standard_parallel_1: f64,
    pub standard_parallel_2: f64,
    pub latitude_of_origin: f64,
    pub central_meridian: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

/// Projection method and its defining parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProjectionParams {
    /// Spherical Web Mercator (EPSG:3857)
    WebMercator,
    TransverseMercator(TransverseMercatorParams),
    LambertConformal(LambertConformalParams),
}

/// A projection with all derived constants computed up front
///
/// Building one evaluates the series coefficients / cone constants, so a
/// transform builds its projections once and reuses them for every coordinate.
#[derive(Debug, Clone)]
pub enum Projection {
    WebMercator,
    TransverseMercator(TransverseMercator),
    LambertConformal(LambertConformal),
}

impl Projection {
    pub fn new(params: &ProjectionParams) -> Self {
        match params {
            ProjectionParams::WebMercator => Projection::WebMercator,
            ProjectionParams::TransverseMercator(p) => {
                Projection::TransverseMercator(TransverseMercator::new(*p))
            }
            ProjectionParams::LambertConformal(p) => {
                Projection::LambertConformal(LambertConformal::new(*p))
            }
        }
    }

    /// Project a geographic coordinate (degrees) to projected meters
    pub fn forward(&self, geographic: Coord<f64>) -> Option<Coord<f64>> {
        let projected = match self {
            Projection::WebMercator => wgs84_to_mercator(geographic.y, geographic.x),
            Projection::TransverseMercator(tm) => tm.forward(geographic),
            Projection::LambertConformal(lcc) => lcc.forward(geographic),
        }?;
        finite(projected)
    }

    /// Unproject projected meters back to a geographic coordinate (degrees)
    pub fn inverse(&self, projected: Coord<f64>) -> Option<Coord<f64>> {
        let geographic = match self {
            Projection::WebMercator => {
                let (lat, lon) = mercator_to_wgs84(projected.x, projected.y);
                Some(Coord { x: lon, y: lat })
            }
            Projection::TransverseMercator(tm) => tm.inverse(projected),
            Projection::LambertConformal(lcc) => lcc.inverse(projected),
        }?;
        finite(geographic)
    }
}

#[inline(always)]
fn finite(coord: Coord<f64>) -> Option<Coord<f64>> {
    (coord.x.is_finite() && coord.y.is_finite()).then_some(coord)
}

/// Wrap a longitude difference into [-180, 180)
#[inline(always)]
pub fn normalize_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// Latitudes at or beyond the poles have no Mercator image and yield `None`.
/// Latitudes beyond [`MAX_MERCATOR_LATITUDE`] are projected as-is (outside the
/// square world extent) rather than clamped.
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Option<Coord<f64>> {
    if lat.abs() >= 90.0 {
        return None;
    }
    let x = lon * LON_TO_X_FACTOR;
    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;
    Some(Coord { x, y })
}

/// Convert Web Mercator (x, y) in meters to WGS84 (lat, lon)
///
/// # Returns
/// A tuple of (latitude, longitude) in degrees
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * X_TO_LON_FACTOR;
    let lat = (FRAC_PI_2 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees();
    (lat, lon)
}

/// Transverse Mercator using the Krüger series to fourth order in `n`
///
/// Accurate to well below a millimetre within a UTM zone.
#[derive(Debug, Clone)]
pub struct TransverseMercator {
    params: TransverseMercatorParams,
    eccentricity: f64,
    /// Rectifying radius scaled by the central scale factor
    k0_a: f64,
    alpha: [f64; 4],
    beta: [f64; 4],
    delta: [f64; 4],
}

impl TransverseMercator {
    pub fn new(params: TransverseMercatorParams) -> Self {
        let n = params.ellipsoid.third_flattening();
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;

        let rectifying_radius =
            params.ellipsoid.semi_major / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0,
            49561.0 * n4 / 161280.0,
        ];
        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0,
            4397.0 * n4 / 161280.0,
        ];
        let delta = [
            2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3 + 116.0 * n4 / 45.0,
            7.0 * n2 / 3.0 - 8.0 * n3 / 5.0 - 227.0 * n4 / 45.0,
            56.0 * n3 / 15.0 - 136.0 * n4 / 35.0,
            4279.0 * n4 / 630.0,
        ];

        Self {
            params,
            eccentricity: params.ellipsoid.eccentricity(),
            k0_a: params.scale_factor * rectifying_radius,
            alpha,
            beta,
            delta,
        }
    }

    pub fn forward(&self, geographic: Coord<f64>) -> Option<Coord<f64>> {
        let delta_lon = normalize_longitude(geographic.x - self.params.central_meridian);
        // Beyond a quarter turn from the central meridian the series diverges
        if delta_lon.abs() >= 90.0 {
            return None;
        }
        let phi = geographic.y.to_radians();
        let lambda = delta_lon.to_radians();
        let e = self.eccentricity;

        let sin_phi = phi.sin();
        // Tangent of the conformal latitude
        let t = (sin_phi.atanh() - e * (e * sin_phi).atanh()).sinh();
        let xi_prime = t.atan2(lambda.cos());
        let eta_prime = (lambda.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_prime;
        let mut eta = eta_prime;
        for (j, a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi += a * (k * xi_prime).sin() * (k * eta_prime).cosh();
            eta += a * (k * xi_prime).cos() * (k * eta_prime).sinh();
        }

        Some(Coord {
            x: self.params.false_easting + self.k0_a * eta,
            y: self.params.false_northing + self.k0_a * xi,
        })
    }

    pub fn inverse(&self, projected: Coord<f64>) -> Option<Coord<f64>> {
        let xi = (projected.y - self.params.false_northing) / self.k0_a;
        let eta = (projected.x - self.params.false_easting) / self.k0_a;

        let mut xi_prime = xi;
        let mut eta_prime = eta;
        for (j, b) in self.beta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi_prime -= b * (k * xi).sin() * (k * eta).cosh();
            eta_prime -= b * (k * xi).cos() * (k * eta).sinh();
        }

        // Conformal latitude, then the geodetic latitude from its series
        let chi = (xi_prime.sin() / eta_prime.cosh()).asin();
        let mut phi = chi;
        for (j, d) in self.delta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            phi += d * (k * chi).sin();
        }
        let lambda = eta_prime.sinh().atan2(xi_prime.cos());

        Some(Coord {
            x: normalize_longitude(self.params.central_meridian + lambda.to_degrees()),
            y: phi.to_degrees(),
        })
    }
}

/// Lambert Conformal Conic (2SP) on an ellipsoid
#[derive(Debug, Clone)]
pub struct LambertConformal {
    params: LambertConformalParams,
    eccentricity: f64,
    /// Cone constant
    n: f64,
    /// `a * F`
    a_f: f64,
    /// Radius of the parallel of origin
    rho0: f64,
}

impl LambertConformal {
    pub fn new(params: LambertConformalParams) -> Self {
        let e = params.ellipsoid.eccentricity();
        let phi1 = params.standard_parallel_1.to_radians();
        let phi2 = params.standard_parallel_2.to_radians();
        let phi0 = params.latitude_of_origin.to_radians();

        let m1 = lambert_m(phi1, e);
        let m2 = lambert_m(phi2, e);
        let t1 = lambert_t(phi1, e);
        let t2 = lambert_t(phi2, e);
        let t0 = lambert_t(phi0, e);

        let n = if (phi1 - phi2).abs() < 1e-12 {
            phi1.sin()
        } else {
            (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
        };
        let big_f = m1 / (n * t1.powf(n));
        let a_f = params.ellipsoid.semi_major * big_f;

        Self {
            params,
            eccentricity: e,
            n,
            a_f,
            rho0: a_f * t0.powf(n),
        }
    }

    pub fn forward(&self, geographic: Coord<f64>) -> Option<Coord<f64>> {
        let phi = geographic.y.to_radians();
        let delta_lon = normalize_longitude(geographic.x - self.params.central_meridian);
        let rho = self.a_f * lambert_t(phi, self.eccentricity).powf(self.n);
        let theta = self.n * delta_lon.to_radians();

        Some(Coord {
            x: self.params.false_easting + rho * theta.sin(),
            y: self.params.false_northing + self.rho0 - rho * theta.cos(),
        })
    }

    pub fn inverse(&self, projected: Coord<f64>) -> Option<Coord<f64>> {
        let dx = projected.x - self.params.false_easting;
        let dy = self.rho0 - (projected.y - self.params.false_northing);
        let sign = self.n.signum();
        let rho = sign * (dx * dx + dy * dy).sqrt();
        let theta = (sign * dx).atan2(sign * dy);
        let t = (rho / self.a_f).powf(1.0 / self.n);

        let e = self.eccentricity;
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..LAMBERT_MAX_ITERATIONS {
            let es = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
            let converged = (next - phi).abs() < 1e-12;
            phi = next;
            if converged {
                break;
            }
        }

        Some(Coord {
            x: normalize_longitude(theta.to_degrees() / self.n + self.params.central_meridian),
            y: phi.to_degrees(),
        })
    }
}

#[inline(always)]
fn lambert_m(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    phi.cos() / (1.0 - es * es).sqrt()
}

#[inline(always)]
fn lambert_t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}
