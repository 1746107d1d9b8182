//! Directions between route stops.
//!
//! `DirectionsResolver` turns an ordered list of coordinates into a path and a
//! distance/duration summary. It cleans the input (invalid coordinates,
//! consecutive duplicates, provider coordinate ceiling), gives the provider
//! one retry after a short delay, and reports anything else as
//! `Resolution::Failed` for the caller to clear its line and summary.

use crate::model::Coordinate;
use crate::utils::is_valid_coordinate;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Most coordinates the provider accepts in one request
pub const MAX_COORDINATES: usize = 25;

/// Pause before the single retry
pub const RETRY_DELAY: Duration = Duration::from_millis(450);

/// Longest provider response body kept in an error
const MAX_ERROR_BODY: usize = 180;

pub const DEFAULT_DIRECTIONS_URL: &str = "https://api.mapbox.com";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectionsError {
    #[error("Directions request failed: {0}")]
    Http(String),

    #[error("Directions HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Directions missing geometry")]
    MissingGeometry,

    #[error("Directions decode error: {0}")]
    Decode(String),

    #[error("Directions need at least 2 coordinates, got {0}")]
    TooFewCoordinates(usize),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoutingProfile {
    #[default]
    Walking,
    Driving,
    Cycling,
}

impl RoutingProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingProfile::Walking => "walking",
            RoutingProfile::Driving => "driving",
            RoutingProfile::Cycling => "cycling",
        }
    }
}

/// Distance and duration of a resolved route
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteSummary {
    /// Kilometers, one decimal place
    pub distance_km: f64,
    /// Whole minutes
    pub duration_min: u32,
}

impl RouteSummary {
    pub fn from_meters_seconds(distance_m: f64, duration_s: f64) -> Self {
        Self {
            distance_km: (distance_m / 1000.0 * 10.0).round() / 10.0,
            duration_min: (duration_s / 60.0).round().max(0.0) as u32,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedRoute {
    pub summary: RouteSummary,
    pub geometry: Vec<Coordinate>,
}

/// Outcome of a resolve call. Never an error: failures have already been retried.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Resolved(ResolvedRoute),
    /// Fewer than 2 usable coordinates; nothing was requested
    NoRoute,
    /// Both attempts failed
    Failed,
}

impl Resolution {
    pub fn summary(&self) -> Option<RouteSummary> {
        match self {
            Resolution::Resolved(route) => Some(route.summary),
            _ => None,
        }
    }
}

/// External routing service
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Route along `path` (already cleaned, 2..=25 coordinates).
    async fn route(
        &self,
        path: &[Coordinate],
        profile: RoutingProfile,
    ) -> Result<ResolvedRoute, DirectionsError>;
}

/// Drop invalid coordinates, collapse consecutive duplicates and cap the
/// list at [`MAX_COORDINATES`].
pub fn prepare_path(points: &[Coordinate]) -> Vec<Coordinate> {
    let mut path: Vec<Coordinate> = Vec::with_capacity(points.len().min(MAX_COORDINATES));
    for point in points.iter().copied().filter(|c| is_valid_coordinate(*c)) {
        if path.last() == Some(&point) {
            continue;
        }
        path.push(point);
    }
    path.truncate(MAX_COORDINATES);
    path
}

pub struct DirectionsResolver {
    provider: Arc<dyn DirectionsProvider>,
    profile: RoutingProfile,
    retry_delay: Duration,
}

impl DirectionsResolver {
    pub fn new(provider: Arc<dyn DirectionsProvider>) -> Self {
        Self {
            provider,
            profile: RoutingProfile::default(),
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_profile(mut self, profile: RoutingProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn profile(&self) -> RoutingProfile {
        self.profile
    }

    pub async fn resolve(&self, points: &[Coordinate]) -> Resolution {
        profiling::scope!("DirectionsResolver::resolve");

        let path = prepare_path(points);
        if path.len() < 2 {
            tracing::debug!("No route: {} usable coordinates", path.len());
            return Resolution::NoRoute;
        }

        match self.provider.route(&path, self.profile).await {
            Ok(route) => return Resolution::Resolved(route),
            Err(e) => tracing::warn!("Route draw failed, retrying: {}", e),
        }

        tokio::time::sleep(self.retry_delay).await;

        match self.provider.route(&path, self.profile).await {
            Ok(route) => Resolution::Resolved(route),
            Err(e) => {
                tracing::warn!("Route draw failed again, clearing route: {}", e);
                Resolution::Failed
            }
        }
    }
}

// -------------------------------------------------------------------------
// Mapbox-compatible HTTP provider
// -------------------------------------------------------------------------

#[derive(Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Deserialize)]
struct ApiRoute {
    geometry: Option<ApiGeometry>,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Deserialize)]
struct ApiGeometry {
    coordinates: Vec<Vec<f64>>,
}

impl DirectionsResponse {
    fn into_resolved(self) -> Result<ResolvedRoute, DirectionsError> {
        let route = self
            .routes
            .into_iter()
            .next()
            .ok_or(DirectionsError::MissingGeometry)?;
        let geometry: Vec<Coordinate> = route
            .geometry
            .ok_or(DirectionsError::MissingGeometry)?
            .coordinates
            .iter()
            .filter(|c| c.len() >= 2)
            .map(|c| Coordinate::new(c[1], c[0]))
            .collect();
        if geometry.is_empty() {
            return Err(DirectionsError::MissingGeometry);
        }

        Ok(ResolvedRoute {
            summary: RouteSummary::from_meters_seconds(route.distance, route.duration),
            geometry,
        })
    }
}

pub fn build_coordinate_string(path: &[Coordinate]) -> String {
    path.iter()
        .map(|c| format!("{},{}", c.longitude, c.latitude))
        .collect::<Vec<String>>()
        .join(";")
}

/// Directions API at `{base_url}/directions/v5/mapbox/{profile}/...`
pub struct MapboxDirections {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl Default for MapboxDirections {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTIONS_URL, "")
    }
}

impl MapboxDirections {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    pub fn request_url(&self, path: &[Coordinate], profile: RoutingProfile) -> String {
        format!(
            "{}/directions/v5/mapbox/{}/{}?geometries=geojson&overview=full&access_token={}",
            self.base_url.trim_end_matches('/'),
            profile.as_str(),
            build_coordinate_string(path),
            self.access_token
        )
    }
}

#[async_trait]
impl DirectionsProvider for MapboxDirections {
    async fn route(
        &self,
        path: &[Coordinate],
        profile: RoutingProfile,
    ) -> Result<ResolvedRoute, DirectionsError> {
        if path.len() < 2 {
            return Err(DirectionsError::TooFewCoordinates(path.len()));
        }

        let response = self
            .client
            .get(self.request_url(path, profile))
            .send()
            .await
            .map_err(|e| DirectionsError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(DirectionsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<DirectionsResponse>()
            .await
            .map_err(|e| DirectionsError::Decode(e.to_string()))?
            .into_resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider answering from a script, counting calls
    #[derive(Default)]
    struct Scripted {
        answers: Mutex<VecDeque<Result<ResolvedRoute, DirectionsError>>>,
        calls: AtomicUsize,
        last_path: Mutex<Vec<Coordinate>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<ResolvedRoute, DirectionsError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DirectionsProvider for Scripted {
        async fn route(
            &self,
            path: &[Coordinate],
            _profile: RoutingProfile,
        ) -> Result<ResolvedRoute, DirectionsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_path.lock().unwrap() = path.to_vec();
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(DirectionsError::Http("script exhausted".into())))
        }
    }

    fn resolved() -> ResolvedRoute {
        ResolvedRoute {
            summary: RouteSummary::from_meters_seconds(520.0, 400.0),
            geometry: vec![Coordinate::new(40.366, 49.837), Coordinate::new(40.370, 49.838)],
        }
    }

    /// Two points roughly 500 m apart in Baku
    fn nearby_pair() -> Vec<Coordinate> {
        vec![Coordinate::new(40.3661, 49.8372), Coordinate::new(40.3706, 49.8372)]
    }

    #[test]
    fn test_prepare_path() {
        let a = Coordinate::new(40.0, 49.0);
        let b = Coordinate::new(40.1, 49.1);
        let path = prepare_path(&[
            a,
            Coordinate::new(f64::NAN, 49.0),
            a,
            Coordinate::new(91.0, 0.0),
            b,
            b,
            a,
        ]);
        assert_eq!(path, vec![a, b, a]);

        let many: Vec<Coordinate> = (0..40)
            .map(|i| Coordinate::new(40.0 + i as f64 * 0.001, 49.0))
            .collect();
        let capped = prepare_path(&many);
        assert_eq!(capped.len(), MAX_COORDINATES);
        assert_eq!(capped[24], many[24]);
    }

    #[test]
    fn test_summary_rounding() {
        let summary = RouteSummary::from_meters_seconds(1234.0, 1000.0);
        assert_eq!(summary.distance_km, 1.2);
        assert_eq!(summary.duration_min, 17);

        let short = RouteSummary::from_meters_seconds(49.0, 29.0);
        assert_eq!(short.distance_km, 0.0);
        assert_eq!(short.duration_min, 0);
    }

    #[tokio::test]
    async fn test_too_few_points_never_requests() {
        let provider = Scripted::new(vec![Ok(resolved())]);
        let resolver = DirectionsResolver::new(provider.clone());

        let a = Coordinate::new(40.0, 49.0);
        assert_eq!(resolver.resolve(&[]).await, Resolution::NoRoute);
        assert_eq!(resolver.resolve(&[a]).await, Resolution::NoRoute);
        // Duplicates collapse to a single point
        assert_eq!(resolver.resolve(&[a, a, a]).await, Resolution::NoRoute);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_degrade() {
        let provider = Scripted::new(vec![
            Err(DirectionsError::Status {
                status: 500,
                body: "upstream".into(),
            }),
            Err(DirectionsError::MissingGeometry),
        ]);
        let resolver = DirectionsResolver::new(provider.clone());

        let started = tokio::time::Instant::now();
        let resolution = resolver.resolve(&nearby_pair()).await;
        assert_eq!(resolution, Resolution::Failed);
        assert_eq!(resolution.summary(), None);
        assert_eq!(provider.calls(), 2);
        assert!(started.elapsed() >= RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let provider = Scripted::new(vec![
            Err(DirectionsError::Http("reset".into())),
            Ok(resolved()),
        ]);
        let resolver = DirectionsResolver::new(provider.clone());

        let resolution = resolver.resolve(&nearby_pair()).await;
        assert_eq!(resolution, Resolution::Resolved(resolved()));
        assert_eq!(provider.calls(), 2);
        assert_eq!(*provider.last_path.lock().unwrap(), nearby_pair());
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let provider = Scripted::new(vec![Ok(resolved())]);
        let resolver = DirectionsResolver::new(provider.clone()).with_profile(RoutingProfile::Cycling);

        assert_eq!(resolver.profile(), RoutingProfile::Cycling);
        assert!(matches!(
            resolver.resolve(&nearby_pair()).await,
            Resolution::Resolved(_)
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_request_url() {
        let directions = MapboxDirections::new("https://api.example.com/", "tok");
        let url = directions.request_url(&nearby_pair(), RoutingProfile::Walking);
        assert_eq!(
            url,
            "https://api.example.com/directions/v5/mapbox/walking/49.8372,40.3661;49.8372,40.3706?geometries=geojson&overview=full&access_token=tok"
        );
    }

    #[test]
    fn test_decode_response() {
        let body = r#"{
            "routes": [{
                "geometry": {"type": "LineString", "coordinates": [[49.8372, 40.3661], [49.8372, 40.3706]]},
                "distance": 502.4,
                "duration": 361.0
            }],
            "code": "Ok"
        }"#;
        let response: DirectionsResponse = serde_json::from_str(body).unwrap();
        let route = response.into_resolved().unwrap();
        assert_eq!(route.geometry, nearby_pair());
        assert_eq!(route.summary.distance_km, 0.5);
        assert_eq!(route.summary.duration_min, 6);
    }

    #[test]
    fn test_missing_geometry() {
        for body in [
            r#"{"routes": []}"#,
            r#"{"code": "NoRoute"}"#,
            r#"{"routes": [{"distance": 10, "duration": 5}]}"#,
            r#"{"routes": [{"geometry": {"coordinates": []}}]}"#,
        ] {
            let response: DirectionsResponse = serde_json::from_str(body).unwrap();
            assert_eq!(
                response.into_resolved(),
                Err(DirectionsError::MissingGeometry),
                "{body}"
            );
        }
    }

    #[tokio::test]
    async fn test_provider_rejects_single_point() {
        let directions = MapboxDirections::default();
        let result = directions
            .route(&[Coordinate::new(40.0, 49.0)], RoutingProfile::Walking)
            .await;
        assert_eq!(result, Err(DirectionsError::TooFewCoordinates(1)));
    }
}
