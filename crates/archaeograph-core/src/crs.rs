//! Coordinate reference systems and reprojection to WGS84.
//!
//! Only the projections the survey data actually comes in are supported:
//! geographic WGS84 (EPSG:4326), Web Mercator (EPSG:3857) and the WGS84 UTM
//! zones (EPSG:326xx north, EPSG:327xx south). Reprojection is one-way
//! (planar → lon/lat); it only feeds the derived `Lon`/`Lat` columns.
//!
//! The UTM inverse uses the Snyder series (USGS Professional Paper 1395),
//! accurate to well below the 6-decimal rounding applied downstream.

use crate::error::ImportError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    Wgs84,
    WebMercator,
    Utm { zone: u8, north: bool },
}

impl Crs {
    /// The survey's default when the container declares no CRS.
    pub const DEFAULT_SOURCE: Crs = Crs::Utm {
        zone: 36,
        north: true,
    };

    /// Parse `EPSG:<code>` (case-insensitive) or a bare EPSG code.
    pub fn parse(s: &str) -> Result<Self, ImportError> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"(?i)^\s*(?:epsg\s*:\s*)?(\d{4,5})\s*$").expect("static regex")
        });
        let code = re
            .captures(s)
            .and_then(|c| c[1].parse::<u32>().ok())
            .ok_or_else(|| ImportError::UnsupportedCrs(s.to_string()))?;
        Self::from_epsg(code)
    }

    pub fn from_epsg(code: u32) -> Result<Self, ImportError> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            other => Err(ImportError::UnsupportedCrs(format!("EPSG:{other}"))),
        }
    }

    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Utm { zone, north: true } => 32600 + zone as u32,
            Crs::Utm { zone, north: false } => 32700 + zone as u32,
        }
    }

    /// Reproject a planar `(x, y)` to `(lon, lat)` in degrees.
    pub fn to_wgs84(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::Wgs84 => (x, y),
            Crs::WebMercator => web_mercator_inverse(x, y),
            Crs::Utm { zone, north } => utm_inverse(x, y, zone, north),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl TryFrom<String> for Crs {
    type Error = ImportError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Crs::parse(&s)
    }
}

impl From<Crs> for String {
    fn from(c: Crs) -> Self {
        c.to_string()
    }
}

/// WKT encoding of a point in its source CRS, e.g. `POINT (447219.33 2045578.1)`.
pub fn point_wkt(x: f64, y: f64) -> String {
    format!("POINT ({x} {y})")
}

/// Round to 6 decimal places (~0.1 m at the equator).
pub fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

fn web_mercator_inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WGS84_A).to_degrees();
    let lat = (2.0 * (y / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

fn utm_inverse(easting: f64, northing: f64, zone: u8, north: bool) -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);

    let x = easting - UTM_FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - UTM_FALSE_NORTHING_SOUTH
    };
    let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();

    let m = y / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));
    let sq = (1.0 - e2).sqrt();
    let e1 = (1.0 - sq) / (1.0 + sq);

    // Footpoint latitude.
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin1, cos1) = phi1.sin_cos();
    let tan1 = phi1.tan();
    let c1 = ep2 * cos1 * cos1;
    let t1 = tan1 * tan1;
    let n1 = WGS84_A / (1.0 - e2 * sin1 * sin1).sqrt();
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = x / (n1 * UTM_K0);

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

    (lon.to_degrees(), lat.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn parses_epsg_forms() {
        assert_eq!(Crs::parse("EPSG:32636").unwrap(), Crs::DEFAULT_SOURCE);
        assert_eq!(Crs::parse("epsg: 4326").unwrap(), Crs::Wgs84);
        assert_eq!(Crs::parse("3857").unwrap(), Crs::WebMercator);
        assert_eq!(
            Crs::parse("EPSG:32736").unwrap(),
            Crs::Utm {
                zone: 36,
                north: false
            }
        );
        assert!(matches!(
            Crs::parse("EPSG:2056"),
            Err(ImportError::UnsupportedCrs(_))
        ));
        assert!(Crs::parse("not a crs").is_err());
    }

    #[test]
    fn central_meridian_on_equator() {
        let (lon, lat) = Crs::DEFAULT_SOURCE.to_wgs84(500_000.0, 0.0);
        assert_abs_diff_eq!(lon, 33.0, epsilon = 1e-12);
        assert_abs_diff_eq!(lat, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn utm_36n_reference_points() {
        let (lon, lat) = Crs::DEFAULT_SOURCE.to_wgs84(500_000.0, 1_990_185.542_105);
        assert_abs_diff_eq!(lon, 33.0, epsilon = 1e-7);
        assert_abs_diff_eq!(lat, 18.0, epsilon = 1e-7);

        let (lon, lat) = Crs::DEFAULT_SOURCE.to_wgs84(447_219.331_471, 2_045_578.113_584);
        assert_abs_diff_eq!(lon, 32.5, epsilon = 1e-7);
        assert_abs_diff_eq!(lat, 18.5, epsilon = 1e-7);
    }

    #[test]
    fn southern_zone_mirrors_northern() {
        let south = Crs::Utm {
            zone: 36,
            north: false,
        };
        let (lon, lat) = south.to_wgs84(500_000.0, 10_000_000.0 - 1_990_185.542_105);
        assert_abs_diff_eq!(lon, 33.0, epsilon = 1e-7);
        assert_abs_diff_eq!(lat, -18.0, epsilon = 1e-7);
    }

    #[test]
    fn web_mercator_edges() {
        let (lon, lat) = Crs::WebMercator.to_wgs84(0.0, 0.0);
        assert_abs_diff_eq!(lon, 0.0);
        assert_abs_diff_eq!(lat, 0.0);
        let (lon, _) = Crs::WebMercator.to_wgs84(20_037_508.342_789_244, 0.0);
        assert_abs_diff_eq!(lon, 180.0, epsilon = 1e-9);
    }

    #[test]
    fn point_wkt_drops_trailing_zero_fraction() {
        assert_eq!(point_wkt(500000.0, 1990185.5), "POINT (500000 1990185.5)");
    }

    #[test]
    fn round6_rounds_half_away() {
        assert_eq!(round6(32.123_456_7), 32.123_457);
        assert_eq!(round6(-18.000_000_4), -18.0);
    }

    proptest! {
        #[test]
        fn utm_output_stays_inside_its_zone(
            e in 200_000.0f64..800_000.0,
            n in 0.0f64..8_000_000.0,
            zone in 1u8..=60,
        ) {
            let (lon, lat) = Crs::Utm { zone, north: true }.to_wgs84(e, n);
            let lon0 = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
            prop_assert!(lat >= -0.001 && lat < 90.0);
            prop_assert!((lon - lon0).abs() < 15.0);
        }

        #[test]
        fn display_round_trips(code in prop::sample::select(vec![4326u32, 3857, 32601, 32636, 32660, 32701, 32760])) {
            let crs = Crs::from_epsg(code).unwrap();
            prop_assert_eq!(Crs::parse(&crs.to_string()).unwrap(), crs);
        }
    }
}
