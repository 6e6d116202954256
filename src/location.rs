use crate::api::{self, unwrap_list, ApiClient};
use crate::error::ApiError;
use crate::lenient;
use reqwest::Method;
use serde_json::Value;
use url::Url;

fn names(values: Vec<Value>) -> Vec<String> {
    let mut names: Vec<String> = values
        .iter()
        .filter_map(|value| match value {
            Value::Object(map) => map.get("name").and_then(lenient::as_text),
            value => lenient::as_text(value),
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

pub async fn fetch_countries(api: &ApiClient) -> Result<Vec<String>, ApiError> {
    let request = api.public(Method::GET, &["locations", "countries"])?;
    let body = api::send(request)
        .await?
        .into_result("Failed to fetch countries")?;
    Ok(names(unwrap_list(body, "countries")))
}

fn states_url(api: &ApiClient, country: &str) -> Result<Url, ApiError> {
    let mut url = api.endpoint(&["locations", "states"])?;
    url.query_pairs_mut().append_pair("country", country);
    Ok(url)
}

pub async fn fetch_states(api: &ApiClient, country: &str) -> Result<Vec<String>, ApiError> {
    let request = api.request(Method::GET, states_url(api, country)?);
    let body = api::send(request)
        .await?
        .into_result("Failed to fetch states")?;
    Ok(names(unwrap_list(body, "states")))
}

pub struct LocationOptions {
    pub countries: Result<Vec<String>, ApiError>,
    pub states: Result<Vec<String>, ApiError>,
}

/// Both lookups in flight at once. They fill separate fields, so each
/// result stands on its own.
pub async fn fetch_location_options(api: &ApiClient, country: &str) -> LocationOptions {
    let (countries, states) = futures::join!(fetch_countries(api), fetch_states(api, country));
    LocationOptions { countries, states }
}
