//! HTTP client for the host application's image-browsing routes

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use image_browsing_cache::{BatchListing, FetchResponse, NewEntry, Transport, TransportError};
use image_browsing_protocol::{
    BatchRequest, BatchResponse, DeleteRequest, ListingResponse, MoveRequest, MutationResponse,
    RenameRequest,
};
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Client for the `/image-browsing/*` routes.
///
/// Listings are addressed by virtual path (`/output/cats` maps to
/// `GET /image-browsing/output/cats`). Responses carry an `ETag` that is sent
/// back as `If-None-Match` to make a read conditional.
pub struct BrowsingClient {
    http: reqwest::Client,
    base_url: String,
}

impl BrowsingClient {
    /// Prefix of every route served by the host application
    pub const ROUTE_PREFIX: &'static str = "/image-browsing";

    /// Create a client with the default 30 second timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a virtual path, each segment percent-encoded
    pub fn listing_url(&self, path: &str) -> String {
        let mut url = format!("{}{}", self.base_url, Self::ROUTE_PREFIX);
        let segments: Vec<_> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(urlencoding::encode)
            .collect();
        url.push('/');
        url.push_str(&segments.join("/"));
        url
    }

    fn route_url(&self, route: &str) -> String {
        format!("{}{}/{}", self.base_url, Self::ROUTE_PREFIX, route)
    }

    /// Read a folder listing. With a validator the read is conditional and
    /// may come back as [`FetchResponse::NotModified`].
    pub async fn list(&self, path: &str, validator: Option<&str>) -> Result<FetchResponse> {
        let mut request = self.http.get(self.listing_url(path));
        if let Some(validator) = validator {
            request = request.header(IF_NONE_MATCH, validator);
        }
        let response = request.send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(path, "Listing not modified");
            return Ok(FetchResponse::NotModified);
        }
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }

        let validator = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body: ListingResponse = decode(response).await?;
        if !body.success {
            return Err(api_error(body.error));
        }

        debug!(path, entries = body.data.len(), "Fetched listing");
        Ok(FetchResponse::Modified {
            listing: body.data,
            validator,
        })
    }

    /// Read several listings in one round trip
    pub async fn batch(&self, paths: &[String]) -> Result<HashMap<String, BatchListing>> {
        let request = BatchRequest {
            paths: paths.to_vec(),
        };
        let response = self
            .http
            .post(self.route_url("batch"))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }

        let body: BatchResponse = decode(response).await?;
        if !body.success {
            return Err(api_error(body.error));
        }

        Ok(body
            .data
            .into_iter()
            .map(|(path, item)| {
                (
                    path,
                    BatchListing {
                        listing: item.data,
                        validator: item.validator,
                    },
                )
            })
            .collect())
    }

    /// Create a folder or upload a file into `folder`
    pub async fn create(&self, folder: &str, entry: &NewEntry) -> Result<()> {
        let form = match entry {
            NewEntry::Folder { name } => Form::new().text("folders", name.clone()),
            NewEntry::File { name, contents } => Form::new().part(
                "files",
                Part::bytes(contents.clone()).file_name(name.clone()),
            ),
        };
        let response = self
            .http
            .post(self.listing_url(folder))
            .multipart(form)
            .send()
            .await?;
        check_mutation(response).await
    }

    pub async fn delete(&self, folder: &str, file_list: &[String]) -> Result<()> {
        let request = DeleteRequest {
            uri: folder.to_string(),
            file_list: file_list.to_vec(),
        };
        let response = self
            .http
            .delete(self.route_url("delete"))
            .json(&request)
            .send()
            .await?;
        check_mutation(response).await
    }

    pub async fn rename(&self, path: &str, new_path: &str) -> Result<()> {
        let request = RenameRequest {
            filename: new_path.to_string(),
        };
        let response = self
            .http
            .put(self.listing_url(path))
            .json(&request)
            .send()
            .await?;
        check_mutation(response).await
    }

    pub async fn move_entries(&self, file_list: &[String], target_folder: &str) -> Result<()> {
        let request = MoveRequest {
            file_list: file_list.to_vec(),
            target_folder: target_folder.to_string(),
        };
        let response = self
            .http
            .post(self.route_url("move"))
            .json(&request)
            .send()
            .await?;
        check_mutation(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn api_error(error: Option<String>) -> ClientError {
    ClientError::Api(error.unwrap_or_else(|| "request failed".to_string()))
}

async fn check_mutation(response: reqwest::Response) -> Result<()> {
    if !response.status().is_success() {
        return Err(ClientError::Status(response.status().as_u16()));
    }
    let body: MutationResponse = decode(response).await?;
    if !body.success {
        return Err(api_error(body.error));
    }
    Ok(())
}

#[async_trait]
impl Transport for BrowsingClient {
    async fn fetch_listing(
        &self,
        path: &str,
        validator: Option<&str>,
    ) -> std::result::Result<FetchResponse, TransportError> {
        Ok(self.list(path, validator).await?)
    }

    async fn fetch_batch(
        &self,
        paths: &[String],
    ) -> std::result::Result<HashMap<String, BatchListing>, TransportError> {
        Ok(self.batch(paths).await?)
    }

    async fn create(
        &self,
        folder: &str,
        entry: &NewEntry,
    ) -> std::result::Result<(), TransportError> {
        Ok(BrowsingClient::create(self, folder, entry).await?)
    }

    async fn delete(
        &self,
        folder: &str,
        file_list: &[String],
    ) -> std::result::Result<(), TransportError> {
        Ok(BrowsingClient::delete(self, folder, file_list).await?)
    }

    async fn rename(&self, path: &str, new_path: &str) -> std::result::Result<(), TransportError> {
        Ok(BrowsingClient::rename(self, path, new_path).await?)
    }

    async fn move_entries(
        &self,
        file_list: &[String],
        target_folder: &str,
    ) -> std::result::Result<(), TransportError> {
        Ok(BrowsingClient::move_entries(self, file_list, target_folder).await?)
    }
}
