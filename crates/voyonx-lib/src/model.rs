//! Catalog and route records as exchanged with the remote store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a catalog place
    PlaceId
);
string_id!(
    /// Identifier of a user's route record
    RouteId
);
string_id!(
    /// Identifier of a single route stop row
    StopId
);
string_id!(
    /// Identity handed out by the authentication provider
    UserId
);

/// A WGS84 position in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<Coordinate> for geo::Coord<f64> {
    fn from(c: Coordinate) -> Self {
        geo::Coord {
            x: c.longitude,
            y: c.latitude,
        }
    }
}

/// A point of interest from the remote catalog (read-only for the client)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub title: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "number_or_string")]
    pub latitude: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub longitude: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Place {
    #[inline]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Deep link that opens a ride-hailing request to this place
    pub fn ride_link(&self) -> String {
        format!(
            "https://bolt.eu/ride/?lat={}&lng={}",
            self.latitude, self.longitude
        )
    }
}

/// The catalog keeps coordinates as text; accept either representation.
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// The single route record owned by a user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoute {
    pub id: RouteId,
    pub user_id: UserId,
    pub title: String,
}

/// Title given to lazily created routes
pub const DEFAULT_ROUTE_TITLE: &str = "My Route";

/// One place attached to a route, with its traversal order and visited flag
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub id: StopId,
    pub route_id: RouteId,
    pub place_id: PlaceId,
    /// Zero-based, dense and unique within the route
    pub position: u32,
    /// `None` until the stop is marked visited
    #[serde(default)]
    pub visited_at: Option<DateTime<Utc>>,
}

impl RouteStop {
    #[inline]
    pub fn is_visited(&self) -> bool {
        self.visited_at.is_some()
    }
}

/// Insert payload for a new stop
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewStop {
    pub route_id: RouteId,
    pub place_id: PlaceId,
    pub position: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_coordinates_from_text() {
        let json = r#"{
            "id": "p1",
            "title": "Maiden Tower",
            "address": null,
            "latitude": "40.3661",
            "longitude": 49.8372,
            "category": "History"
        }"#;
        let place: Place = serde_json::from_str(json).unwrap();
        assert_eq!(place.id.as_str(), "p1");
        assert!((place.latitude - 40.3661).abs() < 1e-9);
        assert!((place.longitude - 49.8372).abs() < 1e-9);
        assert_eq!(place.image_url, None);
        assert_eq!(place.description, None);
    }

    #[test]
    fn test_place_rejects_garbage_coordinate() {
        let json = r#"{"id":"p1","title":"x","latitude":"north","longitude":1.0}"#;
        assert!(serde_json::from_str::<Place>(json).is_err());
    }

    #[test]
    fn test_stop_visited_roundtrip_shape() {
        let json = r#"{
            "id": "s1",
            "route_id": "r1",
            "place_id": "p1",
            "position": 2,
            "visited_at": "2026-05-01T10:30:00Z"
        }"#;
        let stop: RouteStop = serde_json::from_str(json).unwrap();
        assert!(stop.is_visited());
        assert_eq!(stop.position, 2);

        let unvisited = r#"{"id":"s2","route_id":"r1","place_id":"p2","position":0,"visited_at":null}"#;
        let stop: RouteStop = serde_json::from_str(unvisited).unwrap();
        assert!(!stop.is_visited());
    }

    #[test]
    fn test_ids_are_transparent() {
        let id = PlaceId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn test_ride_link() {
        let place = Place {
            id: "p".into(),
            title: "t".into(),
            address: None,
            description: None,
            latitude: 40.5,
            longitude: 49.25,
            category: None,
            image_url: None,
        };
        assert_eq!(place.ride_link(), "https://bolt.eu/ride/?lat=40.5&lng=49.25");
    }
}
