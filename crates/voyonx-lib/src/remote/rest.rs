//! PostgREST-style HTTP implementation of `RemoteStore`.
//!
//! Tables are addressed as `{base_url}/rest/v1/{table}` with filters encoded
//! as query parameters (`user_id=eq.…`, `id=in.(…)`, `order=position.asc`).
//! Every request carries the project key in `apikey` and a bearer token
//! (the user's access token when signed in, the project key otherwise).

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::model::{NewStop, Place, PlaceId, RouteId, RouteStop, StopId, UserId, UserRoute};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

const ROUTE_COLUMNS: &str = "id,user_id,title";
const STOP_COLUMNS: &str = "id,route_id,place_id,position,visited_at";
const PLACE_COLUMNS: &str = "id,title,address,description,latitude,longitude,category,image_url";

/// Longest server message kept in an error
const MAX_ERROR_BODY: usize = 180;

/// Connection settings for the hosted database
#[derive(Clone, Debug)]
pub struct RestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub base_url: String,
    /// Public project key
    pub api_key: String,
    /// Access token of the signed-in user
    pub access_token: Option<String>,
}

pub struct RestStore {
    client: reqwest::Client,
    config: RestConfig,
}

impl RestStore {
    pub fn new(config: RestConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: RestConfig) -> Self {
        Self { client, config }
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);

        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut message = response.text().await.unwrap_or_default();
        if message.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| message.is_char_boundary(*i))
                .unwrap_or(0);
            message.truncate(cut);
        }

        Err(match status {
            StatusCode::CONFLICT => RemoteError::Conflict(message),
            StatusCode::NOT_FOUND => RemoteError::NotFound(message),
            _ => RemoteError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    fn eq(value: impl std::fmt::Display) -> String {
        format!("eq.{value}")
    }

    fn id_list(ids: &[PlaceId]) -> String {
        let joined = ids
            .iter()
            .map(PlaceId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        format!("in.({joined})")
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn find_route(&self, user: &UserId) -> RemoteResult<Option<UserRoute>> {
        let request = self
            .request(Method::GET, "user_routes")
            .query(&[("select", ROUTE_COLUMNS.to_owned()), ("user_id", Self::eq(user))]);
        let routes: Vec<UserRoute> = self.fetch(request).await?;
        Ok(routes.into_iter().next())
    }

    async fn create_route(&self, user: &UserId, title: &str) -> RemoteResult<UserRoute> {
        let request = self
            .request(Method::POST, "user_routes")
            .query(&[("select", ROUTE_COLUMNS)])
            .header("Prefer", "return=representation")
            .json(&json!({ "user_id": user, "title": title }));
        let created: Vec<UserRoute> = self.fetch(request).await?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("insert returned no route".into()))
    }

    async fn list_stops(&self, route: &RouteId) -> RemoteResult<Vec<RouteStop>> {
        let request = self.request(Method::GET, "route_stops").query(&[
            ("select", STOP_COLUMNS.to_owned()),
            ("route_id", Self::eq(route)),
            ("order", "position.asc".to_owned()),
        ]);
        self.fetch(request).await
    }

    async fn insert_stop(&self, stop: NewStop) -> RemoteResult<()> {
        let request = self
            .request(Method::POST, "route_stops")
            .header("Prefer", "return=minimal")
            .json(&stop);
        self.send(request).await.map(drop)
    }

    async fn set_stop_position(&self, stop: &StopId, position: u32) -> RemoteResult<()> {
        let request = self
            .request(Method::PATCH, "route_stops")
            .query(&[("id", Self::eq(stop))])
            .json(&json!({ "position": position }));
        self.send(request).await.map(drop)
    }

    async fn set_stop_visited(
        &self,
        stop: &StopId,
        visited_at: Option<DateTime<Utc>>,
    ) -> RemoteResult<()> {
        let request = self
            .request(Method::PATCH, "route_stops")
            .query(&[("id", Self::eq(stop))])
            .json(&json!({ "visited_at": visited_at }));
        self.send(request).await.map(drop)
    }

    async fn delete_stop(&self, route: &RouteId, place: &PlaceId) -> RemoteResult<()> {
        let request = self
            .request(Method::DELETE, "route_stops")
            .query(&[("route_id", Self::eq(route)), ("place_id", Self::eq(place))]);
        self.send(request).await.map(drop)
    }

    async fn delete_all_stops(&self, route: &RouteId) -> RemoteResult<()> {
        let request = self
            .request(Method::DELETE, "route_stops")
            .query(&[("route_id", Self::eq(route))]);
        self.send(request).await.map(drop)
    }

    async fn list_places(&self) -> RemoteResult<Vec<Place>> {
        let request = self
            .request(Method::GET, "places")
            .query(&[("select", PLACE_COLUMNS)]);
        self.fetch(request).await
    }

    async fn places_by_ids(&self, ids: &[PlaceId]) -> RemoteResult<Vec<Place>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request(Method::GET, "places")
            .query(&[("select", PLACE_COLUMNS.to_owned()), ("id", Self::id_list(ids))]);
        self.fetch(request).await
    }

    async fn place(&self, id: &PlaceId) -> RemoteResult<Option<Place>> {
        let request = self
            .request(Method::GET, "places")
            .query(&[("select", PLACE_COLUMNS.to_owned()), ("id", Self::eq(id))]);
        let places: Vec<Place> = self.fetch(request).await?;
        Ok(places.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(token: Option<&str>) -> RestStore {
        RestStore::new(RestConfig {
            base_url: "https://db.example.com/".into(),
            api_key: "anon-key".into(),
            access_token: token.map(str::to_owned),
        })
    }

    #[test]
    fn test_table_url_trims_slash() {
        assert_eq!(
            store(None).table_url("places"),
            "https://db.example.com/rest/v1/places"
        );
    }

    #[test]
    fn test_filters_are_encoded_as_query() {
        let s = store(None);
        let request = s
            .request(Method::GET, "route_stops")
            .query(&[
                ("route_id", RestStore::eq("r-1")),
                ("order", "position.asc".to_owned()),
            ])
            .build()
            .unwrap();

        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("route_id".into(), "eq.r-1".into())));
        assert!(pairs.contains(&("order".into(), "position.asc".into())));
    }

    #[test]
    fn test_in_filter() {
        let ids: Vec<PlaceId> = vec!["a".into(), "b".into()];
        assert_eq!(RestStore::id_list(&ids), "in.(a,b)");
    }

    #[test]
    fn test_bearer_prefers_access_token() {
        let request = store(Some("user-token"))
            .request(Method::GET, "places")
            .build()
            .unwrap();
        assert_eq!(request.headers()["apikey"], "anon-key");
        assert_eq!(request.headers()["authorization"], "Bearer user-token");

        let anonymous = store(None).request(Method::GET, "places").build().unwrap();
        assert_eq!(anonymous.headers()["authorization"], "Bearer anon-key");
    }

    #[tokio::test]
    async fn test_places_by_empty_ids_skips_request() {
        // Unroutable host: any real request would fail
        let s = RestStore::new(RestConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "k".into(),
            access_token: None,
        });
        assert_eq!(s.places_by_ids(&[]).await.unwrap(), Vec::<Place>::new());
    }
}
