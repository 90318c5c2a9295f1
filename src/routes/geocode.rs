use axum::{
    extract::{State, Query},
    response::{IntoResponse, Json as AxumJson},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;

const USER_AGENT: &str = "AahaarSetu/1.0";
const SEARCH_LIMIT: u8 = 5;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct ReverseParams {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PlaceResult {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

fn to_results(places: Vec<NominatimPlace>) -> Vec<PlaceResult> {
    places
        .into_iter()
        .filter_map(|p| {
            let lat = p.lat.parse::<f64>().ok()?;
            let lng = p.lon.parse::<f64>().ok()?;
            Some(PlaceResult { address: p.display_name, lat, lng })
        })
        .collect()
}

fn search_url(base: &str, query: &str) -> String {
    format!(
        "{}/search?format=json&q={}&limit={}",
        base,
        url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>(),
        SEARCH_LIMIT
    )
}

/// Forward geocoding for the pickup-location picker.
pub async fn search(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params.q.unwrap_or_default();
    if query.trim().is_empty() {
        return Ok(AxumJson(serde_json::json!({ "results": [] })));
    }

    let resp = state
        .http
        .get(search_url(&state.geocoder_url, query.trim()))
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("geocode search: {}", e)))?;

    if !resp.status().is_success() {
        return Err(AppError::Upstream(format!("geocode search status {}", resp.status())));
    }

    let places: Vec<NominatimPlace> = resp
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("geocode search body: {}", e)))?;
    Ok(AxumJson(serde_json::json!({ "results": to_results(places) })))
}

pub async fn reverse(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<ReverseParams>,
) -> Result<impl IntoResponse, AppError> {
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lon) {
        return Err(AppError::validation("coordinates", "latitude/longitude out of range"));
    }

    let url = format!(
        "{}/reverse?format=json&lat={}&lon={}&zoom=18&addressdetails=1",
        state.geocoder_url, params.lat, params.lon
    );
    let resp = state
        .http
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("geocode reverse: {}", e)))?;

    if !resp.status().is_success() {
        return Err(AppError::Upstream(format!("geocode reverse status {}", resp.status())));
    }

    let place: NominatimReverse = resp
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("geocode reverse body: {}", e)))?;
    let address = place.display_name.unwrap_or_else(|| "Address not found".to_string());
    Ok(AxumJson(serde_json::json!({ "address": address, "lat": params.lat, "lng": params.lon })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_query() {
        assert_eq!(
            search_url("https://geo.example", "MG Road & 5th"),
            "https://geo.example/search?format=json&q=MG+Road+%26+5th&limit=5"
        );
    }

    #[test]
    fn unparseable_coordinates_are_dropped() {
        let places = vec![
            NominatimPlace { display_name: "Indiranagar".into(), lat: "12.97".into(), lon: "77.64".into() },
            NominatimPlace { display_name: "Nowhere".into(), lat: "n/a".into(), lon: "0".into() },
        ];
        assert_eq!(
            to_results(places),
            vec![PlaceResult { address: "Indiranagar".into(), lat: 12.97, lng: 77.64 }]
        );
    }
}
