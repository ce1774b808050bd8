use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{PlaceId, PlaceRecord},
    error::FetchError,
    protocol::{PlaceDetailsResponse, PlaceResult, TextSearchResponse, STATUS_OK},
};
use tracing::{debug, warn};
use url::Url;

use crate::config::Settings;

const DETAIL_FIELDS: &str = "name,rating,formatted_address,photos";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub records: Vec<PlaceRecord>,
    pub next_cursor: Option<String>,
}

/// Read side of the remote places catalog. Both calls are idempotent.
#[async_trait]
pub trait PlacesApi: Send + Sync {
    async fn search_page(&self, cursor: Option<String>) -> Result<SearchPage, FetchError>;
    async fn fetch_detail(&self, id: &PlaceId) -> Result<PlaceRecord, FetchError>;
}

pub struct GooglePlacesClient {
    http: Client,
    base_url: String,
    api_key: String,
    search_query: String,
    photo_max_width: u32,
    placeholder_image_url: String,
}

impl GooglePlacesClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Url::parse(&settings.api_base_url)
            .with_context(|| format!("invalid places api base url '{}'", settings.api_base_url))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            search_query: settings.search_query.clone(),
            photo_max_width: settings.photo_max_width,
            placeholder_image_url: settings.placeholder_image_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        Url::parse(&format!("{}/{path}", self.base_url))
            .map_err(|err| FetchError::Unknown(format!("invalid endpoint url: {err}")))
    }

    pub fn photo_url(&self, photo_reference: &str) -> Result<Url, FetchError> {
        let mut url = self.endpoint("photo")?;
        url.query_pairs_mut()
            .append_pair("maxwidth", &self.photo_max_width.to_string())
            .append_pair("photoreference", photo_reference)
            .append_pair("key", &self.api_key);
        Ok(url)
    }

    fn image_url_for(&self, result: &PlaceResult) -> String {
        result
            .first_photo_reference()
            .and_then(|reference| self.photo_url(reference).ok())
            .map(String::from)
            .unwrap_or_else(|| self.placeholder_image_url.clone())
    }

    fn to_record(&self, id: PlaceId, result: PlaceResult) -> PlaceRecord {
        let image_url = self.image_url_for(&result);
        PlaceRecord {
            id,
            name: result.name,
            description: result.formatted_address,
            rating: result.rating,
            image_url,
            visited: false,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| FetchError::Unknown(format!("invalid response body: {err}")))
    }
}

fn check_status(status: &str, error_message: Option<String>) -> Result<(), FetchError> {
    if status == STATUS_OK {
        return Ok(());
    }
    warn!(
        status,
        error_message = error_message.as_deref().unwrap_or_default(),
        "places: remote api reported failure"
    );
    Err(FetchError::remote_api(status, error_message))
}

#[async_trait]
impl PlacesApi for GooglePlacesClient {
    async fn search_page(&self, cursor: Option<String>) -> Result<SearchPage, FetchError> {
        let mut url = self.endpoint("textsearch/json")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("query", &self.search_query)
                .append_pair("key", &self.api_key);
            if let Some(cursor) = cursor.as_deref() {
                query.append_pair("pagetoken", cursor);
            }
        }

        let body: TextSearchResponse = self.get_json(url).await?;
        check_status(&body.status, body.error_message)?;

        let mut records = Vec::with_capacity(body.results.len());
        for mut result in body.results {
            let Some(place_id) = result.place_id.take() else {
                warn!(name = %result.name, "places: skipping search result without place_id");
                continue;
            };
            records.push(self.to_record(PlaceId::new(place_id), result));
        }

        debug!(
            count = records.len(),
            has_next = body.next_page_token.is_some(),
            "places: search page decoded"
        );
        Ok(SearchPage {
            records,
            next_cursor: body.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    async fn fetch_detail(&self, id: &PlaceId) -> Result<PlaceRecord, FetchError> {
        let mut url = self.endpoint("details/json")?;
        url.query_pairs_mut()
            .append_pair("place_id", id.as_str())
            .append_pair("fields", DETAIL_FIELDS)
            .append_pair("key", &self.api_key);

        let body: PlaceDetailsResponse = self.get_json(url).await?;
        check_status(&body.status, body.error_message)?;

        let result = body
            .result
            .ok_or_else(|| FetchError::Unknown(format!("place {id} missing from response")))?;
        Ok(self.to_record(id.clone(), result))
    }
}

#[cfg(test)]
#[path = "tests/places_api_tests.rs"]
mod tests;
