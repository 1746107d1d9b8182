//! Utility functions for distances, coordinate validation, camera fitting and
//! search tokenization

use crate::model::Coordinate;
use geo::Rect;

/// Earth's mean radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Size in pixels of one map tile (and of the whole world at zoom 0)
pub const TILE_SIZE: f64 = 256.0;

/// Great-circle distance between two coordinates in kilometers (Haversine)
#[inline]
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let s = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * s.sqrt().asin()
}

/// Check that a coordinate is finite and within latitude ±90 / longitude ±180
#[inline]
pub fn is_valid_coordinate(coordinate: Coordinate) -> bool {
    coordinate.latitude.is_finite()
        && coordinate.longitude.is_finite()
        && coordinate.latitude.abs() <= 90.0
        && coordinate.longitude.abs() <= 180.0
}

/// Bounding rectangle (x = longitude, y = latitude) of the valid points, if any
pub fn bounds_of(points: &[Coordinate]) -> Option<Rect<f64>> {
    let mut valid = points.iter().copied().filter(|c| is_valid_coordinate(*c));
    let first = valid.next()?;

    let (mut min_lon, mut min_lat) = (first.longitude, first.latitude);
    let (mut max_lon, mut max_lat) = (first.longitude, first.latitude);
    for c in valid {
        min_lon = min_lon.min(c.longitude);
        min_lat = min_lat.min(c.latitude);
        max_lon = max_lon.max(c.longitude);
        max_lat = max_lat.max(c.latitude);
    }

    Some(Rect::new(
        geo::Coord {
            x: min_lon,
            y: min_lat,
        },
        geo::Coord {
            x: max_lon,
            y: max_lat,
        },
    ))
}

/// Latitude to normalized Web Mercator y in [0, 1] (0 = north edge)
#[inline]
fn mercator_y(lat: f64) -> f64 {
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    0.5 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / (2.0 * std::f64::consts::PI)
}

/// Zoom level at which `bounds` fits a viewport of `viewport` pixels, leaving
/// `padding` pixels free on every side.
///
/// A degenerate box (a single point) falls back to `max_zoom`.
pub fn fit_zoom(bounds: Rect<f64>, viewport: (f32, f32), padding: f32, max_zoom: f64) -> f64 {
    let usable_w = (viewport.0 - 2.0 * padding).max(1.0) as f64;
    let usable_h = (viewport.1 - 2.0 * padding).max(1.0) as f64;

    let lon_fraction = bounds.width() / 360.0;
    let lat_fraction = (mercator_y(bounds.min().y) - mercator_y(bounds.max().y)).abs();

    let zoom_x = if lon_fraction > 0.0 {
        (usable_w / (TILE_SIZE * lon_fraction)).log2()
    } else {
        f64::INFINITY
    };
    let zoom_y = if lat_fraction > 0.0 {
        (usable_h / (TILE_SIZE * lat_fraction)).log2()
    } else {
        f64::INFINITY
    };

    zoom_x.min(zoom_y).clamp(1.0, max_zoom)
}

/// Trim, treating a missing value as empty
#[inline]
pub fn clean(value: Option<&str>) -> &str {
    value.unwrap_or_default().trim()
}

/// Case-insensitive comparison key for a category label
#[inline]
pub fn category_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Split text into lowercase words made of Unicode letters and digits
pub fn words_of(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_owned)
        .collect()
}

/// True if any word of `text` starts with `query` (an empty query matches)
pub fn starts_with_word(text: &str, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    words_of(text).iter().any(|w| w.starts_with(&q))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    #[test]
    fn test_haversine_zero_distance() {
        let baku = c(40.4093, 49.8671);
        assert!(haversine_km(baku, baku).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        // One degree of latitude is ~111.2 km everywhere
        let d = haversine_km(c(10.0, 20.0), c(11.0, 20.0));
        assert!((d - 111.19).abs() < 0.1, "got {d}");
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let a = c(51.5074, -0.1278);
        let b = c(48.8566, 2.3522);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
        // London - Paris is roughly 344 km
        assert!((haversine_km(a, b) - 343.5).abs() < 2.0);
    }

    #[test]
    fn test_is_valid_coordinate() {
        assert!(is_valid_coordinate(c(0.0, 0.0)));
        assert!(is_valid_coordinate(c(90.0, -180.0)));
        assert!(!is_valid_coordinate(c(90.1, 0.0)));
        assert!(!is_valid_coordinate(c(0.0, 180.5)));
        assert!(!is_valid_coordinate(c(f64::NAN, 0.0)));
        assert!(!is_valid_coordinate(c(0.0, f64::INFINITY)));
    }

    #[test]
    fn test_bounds_of_skips_invalid() {
        let bounds = bounds_of(&[c(40.0, 49.0), c(f64::NAN, 0.0), c(41.0, 50.5)]).unwrap();
        assert_eq!(bounds.min().x, 49.0);
        assert_eq!(bounds.min().y, 40.0);
        assert_eq!(bounds.max().x, 50.5);
        assert_eq!(bounds.max().y, 41.0);

        assert!(bounds_of(&[]).is_none());
        assert!(bounds_of(&[c(100.0, 0.0)]).is_none());
    }

    #[test]
    fn test_fit_zoom_single_point_uses_max() {
        let bounds = bounds_of(&[c(40.4, 49.8)]).unwrap();
        assert_eq!(fit_zoom(bounds, (800.0, 600.0), 70.0, 16.0), 16.0);
    }

    #[test]
    fn test_fit_zoom_smaller_area_zooms_closer() {
        let city = bounds_of(&[c(40.35, 49.80), c(40.45, 49.95)]).unwrap();
        let country = bounds_of(&[c(38.5, 45.0), c(41.9, 50.6)]).unwrap();
        let z_city = fit_zoom(city, (800.0, 600.0), 70.0, 20.0);
        let z_country = fit_zoom(country, (800.0, 600.0), 70.0, 20.0);
        assert!(z_city > z_country);
    }

    #[test]
    fn test_fit_zoom_padding_reduces_zoom() {
        let bounds = bounds_of(&[c(40.35, 49.80), c(40.45, 49.95)]).unwrap();
        let tight = fit_zoom(bounds, (800.0, 600.0), 0.0, 20.0);
        let padded = fit_zoom(bounds, (800.0, 600.0), 80.0, 20.0);
        assert!(padded < tight);
    }

    #[test]
    fn test_words_of_unicode() {
        assert_eq!(words_of("Old City / Qız Qalası"), vec!["old", "city", "qız", "qalası"]);
        assert_eq!(words_of("  Cafe-42!  "), vec!["cafe", "42"]);
        assert!(words_of(" - ").is_empty());
    }

    #[test]
    fn test_starts_with_word() {
        assert!(starts_with_word("Maiden Tower", "tow"));
        assert!(starts_with_word("Maiden Tower", "  MAI "));
        assert!(!starts_with_word("Maiden Tower", "ower"));
        assert!(starts_with_word("Anything", ""));
        assert!(starts_with_word("Anything", "   "));
    }

    #[test]
    fn test_clean_and_category_key() {
        assert_eq!(clean(None), "");
        assert_eq!(clean(Some("  Museums ")), "Museums");
        assert_eq!(category_key(" Museums "), "museums");
    }
}
