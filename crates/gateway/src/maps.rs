//! Google Maps backed `Geocoder`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use kasir_core::config::MapsConfig;
use kasir_core::ports::{GeoError, GeoPoint, Geocoder, ResolvedAddress, RouteEstimate};

const VILLAGE_TYPE: &str = "administrative_area_level_4";
const DISTRICT_TYPE: &str = "administrative_area_level_3";

pub struct GoogleMapsGeocoder {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl GoogleMapsGeocoder {
    pub fn new(http: Client, config: &MapsConfig, api_key: SecretString) -> Self {
        Self { http, base_url: config.base_url.trim_end_matches('/').to_string(), api_key }
    }

    async fn call(&self, path: &str, query: &[(&str, String)]) -> Result<Value, GeoError> {
        let response = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .query(query)
            .query(&[("key", self.api_key.expose_secret())])
            .send()
            .await
            .map_err(|error| GeoError::Transport(error.to_string()))?;
        if !response.status().is_success() {
            return Err(GeoError::Transport(format!("{path} returned {}", response.status())));
        }
        response.json().await.map_err(|error| GeoError::Transport(error.to_string()))
    }

    async fn geocode(&self, query: &[(&str, String)], label: &str) -> Result<ResolvedAddress, GeoError> {
        let payload = self.call("geocode/json", query).await?;
        parse_geocode(&payload, label)
    }

    /// Follows the shortlink's redirects and reads the coordinates or place
    /// name out of the expanded URL.
    async fn expand_shortlink(&self, link: &str) -> Result<ResolvedAddress, GeoError> {
        let response = self
            .http
            .get(link)
            .send()
            .await
            .map_err(|error| GeoError::Transport(error.to_string()))?;
        let expanded = response.url().to_string();
        debug!(event_name = "gateway.maps.shortlink_expanded", %link, %expanded, "map link expanded");

        if let Some(point) = coordinates_in_url(&expanded) {
            let latlng = format!("{},{}", point.latitude, point.longitude);
            let mut resolved = self.geocode(&[("latlng", latlng)], link).await?;
            resolved.point = point;
            return Ok(resolved);
        }
        match place_in_url(&expanded) {
            Some(place) => self.geocode(&[("address", place)], link).await,
            None => Err(GeoError::NotFound(link.to_string())),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleMapsGeocoder {
    async fn resolve(&self, address: &str) -> Result<ResolvedAddress, GeoError> {
        let address = address.trim();
        let resolved = if address.starts_with("http") {
            self.expand_shortlink(address).await
        } else {
            self.geocode(&[("address", address.to_string())], address).await
        };
        if let Err(error) = &resolved {
            warn!(event_name = "gateway.maps.resolve_failed", error = %error, "address resolution failed");
        }
        resolved
    }

    async fn route(&self, origin: GeoPoint, destination: GeoPoint) -> Result<RouteEstimate, GeoError> {
        let query = [
            ("origins", format!("{},{}", origin.latitude, origin.longitude)),
            ("destinations", format!("{},{}", destination.latitude, destination.longitude)),
            ("mode", "driving".to_string()),
        ];
        let payload = self.call("distancematrix/json", &query).await?;
        parse_route(&payload, &format!("{},{}", destination.latitude, destination.longitude))
    }
}

fn api_status(payload: &Value) -> &str {
    payload.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN")
}

fn component_named(result: &Value, kind: &str) -> Option<String> {
    result
        .get("address_components")?
        .as_array()?
        .iter()
        .find(|component| {
            component
                .get("types")
                .and_then(Value::as_array)
                .is_some_and(|types| types.iter().any(|entry| entry.as_str() == Some(kind)))
        })
        .and_then(|component| component.get("long_name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn parse_geocode(payload: &Value, label: &str) -> Result<ResolvedAddress, GeoError> {
    match api_status(payload) {
        "OK" => {}
        "ZERO_RESULTS" => return Err(GeoError::NotFound(label.to_string())),
        other => return Err(GeoError::Transport(format!("geocoding status {other}"))),
    }
    let first = payload
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .ok_or_else(|| GeoError::NotFound(label.to_string()))?;
    let location = first.pointer("/geometry/location").ok_or_else(|| GeoError::NotFound(label.to_string()))?;
    let latitude = location.get("lat").and_then(Value::as_f64);
    let longitude = location.get("lng").and_then(Value::as_f64);
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Err(GeoError::NotFound(label.to_string()));
    };

    Ok(ResolvedAddress {
        formatted: first
            .get("formatted_address")
            .and_then(Value::as_str)
            .unwrap_or(label)
            .to_string(),
        point: GeoPoint { latitude, longitude },
        village: component_named(first, VILLAGE_TYPE),
        district: component_named(first, DISTRICT_TYPE),
    })
}

pub fn parse_route(payload: &Value, label: &str) -> Result<RouteEstimate, GeoError> {
    if api_status(payload) != "OK" {
        return Err(GeoError::Transport(format!("distance matrix status {}", api_status(payload))));
    }
    let element = payload
        .pointer("/rows/0/elements/0")
        .ok_or_else(|| GeoError::NoRoute(label.to_string()))?;
    if element.get("status").and_then(Value::as_str) != Some("OK") {
        return Err(GeoError::NoRoute(label.to_string()));
    }
    let distance = element.pointer("/distance/value").and_then(Value::as_f64);
    let duration = element.pointer("/duration/value").and_then(Value::as_f64);
    match (distance, duration) {
        (Some(distance_meters), Some(duration_seconds)) => {
            Ok(RouteEstimate { distance_meters, duration_seconds })
        }
        _ => Err(GeoError::NoRoute(label.to_string())),
    }
}

fn parse_pair(raw: &str) -> Option<GeoPoint> {
    let mut parts = raw.split(',');
    let latitude = parts.next()?.trim().parse::<f64>().ok()?;
    let longitude = parts.next()?.trim().parse::<f64>().ok()?;
    let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
    valid.then_some(GeoPoint { latitude, longitude })
}

/// Coordinates from `@lat,lng`, `q=lat,lng` or `/search/lat,lng` forms.
pub fn coordinates_in_url(url: &str) -> Option<GeoPoint> {
    if let Some((_, rest)) = url.split_once("/@") {
        if let Some(point) = parse_pair(rest) {
            return Some(point);
        }
    }
    for marker in ["q=", "query=", "ll=", "/search/"] {
        if let Some((_, rest)) = url.split_once(marker) {
            let candidate = rest.split(['&', '/', '?']).next().unwrap_or_default().replace("%2C", ",");
            if let Some(point) = parse_pair(&candidate.replace('+', "")) {
                return Some(point);
            }
        }
    }
    None
}

/// Place name from a `/place/<name>/` URL.
pub fn place_in_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/place/")?;
    let name = rest.split(['/', '?']).next()?.replace('+', " ").replace("%2C", ",");
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use kasir_core::ports::GeoError;

    use super::{coordinates_in_url, parse_geocode, parse_route, place_in_url};

    #[test]
    fn geocode_reads_village_and_district() {
        let payload = json!({
            "status": "OK",
            "results": [{
                "formatted_address": "Jl. Kusumodilagan, Jebres, Surakarta",
                "geometry": {"location": {"lat": -7.57, "lng": 110.83}},
                "address_components": [
                    {"long_name": "Jebres", "types": ["administrative_area_level_4", "political"]},
                    {"long_name": "Kecamatan Jebres", "types": ["administrative_area_level_3", "political"]}
                ]
            }]
        });

        let resolved = parse_geocode(&payload, "query").expect("resolved");
        assert_eq!(resolved.village.as_deref(), Some("Jebres"));
        assert_eq!(resolved.district.as_deref(), Some("Kecamatan Jebres"));
        assert!((resolved.point.latitude + 7.57).abs() < 1e-9);
    }

    #[test]
    fn empty_geocode_is_not_found() {
        let payload = json!({"status": "ZERO_RESULTS", "results": []});
        assert_eq!(parse_geocode(&payload, "nowhere"), Err(GeoError::NotFound("nowhere".to_string())));
    }

    #[test]
    fn route_reads_meters_and_seconds() {
        let payload = json!({
            "status": "OK",
            "rows": [{"elements": [{"status": "OK", "distance": {"value": 12400}, "duration": {"value": 1500}}]}]
        });
        let route = parse_route(&payload, "dest").expect("route");
        assert!((route.distance_km() - 12.4).abs() < 1e-9);

        let unreachable = json!({"status": "OK", "rows": [{"elements": [{"status": "ZERO_RESULTS"}]}]});
        assert!(matches!(parse_route(&unreachable, "dest"), Err(GeoError::NoRoute(_))));
    }

    #[test]
    fn expanded_links_yield_coordinates_or_place_names() {
        let at = "https://www.google.com/maps/place/Toko/@-7.5607,110.8493,17z/data=abc";
        let point = coordinates_in_url(at).expect("coordinates");
        assert!((point.longitude - 110.8493).abs() < 1e-9);

        let query = "https://maps.google.com/?q=-7.5607,110.8493&ftid=0x1";
        assert!(coordinates_in_url(query).is_some());

        let place = "https://www.google.com/maps/place/Jl.+Kusumodilagan+No.12,+Jebres/data=xyz";
        assert_eq!(coordinates_in_url(place), None);
        assert_eq!(place_in_url(place).as_deref(), Some("Jl. Kusumodilagan No.12, Jebres"));
    }
}
