use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use voyonx_lib::{Coordinate, RoutingProfile, utils::is_valid_coordinate};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Voyonx - discover places on a map and walk your own route between them
pub struct Settings {
    /// Project URL of the hosted database (e.g. https://xyz.supabase.co)
    #[clap(long, env = "VOYONX_REST_URL", value_name = "URL")]
    pub rest_url: Option<String>,

    /// Public project key sent with every database request
    #[clap(long, env = "VOYONX_ANON_KEY", default_value = "", hide_env_values = true)]
    pub anon_key: String,

    /// Access token of the signed-in user
    #[clap(long, env = "VOYONX_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Id of the signed-in user (no route features without one)
    #[clap(long, env = "VOYONX_USER_ID")]
    pub user_id: Option<String>,

    /// Base URL of the directions service
    #[clap(
        long,
        env = "VOYONX_DIRECTIONS_URL",
        default_value = voyonx_lib::directions::DEFAULT_DIRECTIONS_URL
    )]
    pub directions_url: String,

    /// Access token of the directions service
    #[clap(
        long,
        env = "VOYONX_DIRECTIONS_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    pub directions_token: String,

    /// Travel mode used for route directions
    #[clap(long, env = "VOYONX_ROUTING_PROFILE", value_enum, default_value_t = ProfileArg::Walking)]
    pub routing_profile: ProfileArg,

    /// Static position used by "near me", as LAT,LON
    #[clap(long, env = "VOYONX_LOCATION", value_parser = parse_location, value_name = "LAT,LON")]
    pub location: Option<Coordinate>,

    /// File holding locally persisted data such as favorites
    #[clap(long, value_name = "FILE")]
    pub favorites_file: Option<PathBuf>,

    /// Use the in-memory store seeded with demo places instead of the hosted database
    #[clap(long, default_value = "false")]
    pub offline: bool,

    /// Ignore previously persisted state and start fresh
    #[clap(long, default_value = "false")]
    pub ignore_persisted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Walking,
    Driving,
    Cycling,
}

impl From<ProfileArg> for RoutingProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Walking => RoutingProfile::Walking,
            ProfileArg::Driving => RoutingProfile::Driving,
            ProfileArg::Cycling => RoutingProfile::Cycling,
        }
    }
}

fn parse_location(value: &str) -> Result<Coordinate, String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got {:?}", value))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("invalid latitude: {}", e))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|e| format!("invalid longitude: {}", e))?;

    let coordinate = Coordinate::new(lat, lon);
    if !is_valid_coordinate(coordinate) {
        return Err(format!("{},{} is not a position on Earth", lat, lon));
    }
    Ok(coordinate)
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Whether the hosted database is used instead of the demo catalog
    pub fn is_online(&self) -> bool {
        !self.offline && self.rest_url.as_deref().is_some_and(|url| !url.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["voyonx"];
        argv.extend_from_slice(args);
        Settings::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_location_parsing() {
        let settings = parse(&["--location", "40.37, 49.84"]);
        assert_eq!(settings.location, Some(Coordinate::new(40.37, 49.84)));

        assert!(parse_location("40.37").is_err());
        assert!(parse_location("north,49.84").is_err());
        assert!(parse_location("95.0,49.84").is_err());
    }

    #[test]
    fn test_offline_without_rest_url() {
        let settings = parse(&["--offline", "--rest-url", "https://db.example.com"]);
        assert!(!settings.is_online());

        let settings = parse(&["--rest-url", "https://db.example.com", "--user-id", "u1"]);
        assert!(settings.is_online());
        assert_eq!(settings.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_routing_profile_argument() {
        let settings = parse(&["--routing-profile", "cycling"]);
        assert_eq!(
            RoutingProfile::from(settings.routing_profile),
            RoutingProfile::Cycling
        );
    }
}
