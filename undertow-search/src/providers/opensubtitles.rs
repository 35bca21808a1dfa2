//! OpenSubtitles REST API provider.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;
use undertow_core::config::SubtitleConfig;

use super::SubtitleProvider;
use crate::errors::SubtitleSearchError;
use crate::types::{DownloadedSubtitle, SubtitleSearchResult};

/// Longest error body kept from a failed response.
const MAX_ERROR_BODY: usize = 1024;

/// Subtitle search against `api.opensubtitles.com`.
///
/// Every request carries the `Api-Key` and `User-Agent` headers and is bounded
/// by the configured timeout. Nothing is retried.
#[derive(Debug)]
pub struct OpenSubtitlesProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_download_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    attributes: SearchAttributes,
}

#[derive(Debug, Deserialize)]
struct SearchAttributes {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    ratings: f64,
    #[serde(default)]
    download_count: u64,
    #[serde(default)]
    files: Vec<SearchFile>,
}

#[derive(Debug, Deserialize)]
struct SearchFile {
    file_id: u64,
    #[serde(default)]
    file_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct DownloadRequest {
    file_id: u64,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    link: String,
    #[serde(default)]
    file_name: Option<String>,
}

impl OpenSubtitlesProvider {
    /// Creates a provider from the subtitle section of the configuration.
    ///
    /// # Errors
    /// - `SubtitleSearchError::Network` - HTTP client could not be built
    pub fn new(config: &SubtitleConfig) -> Result<Self, SubtitleSearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_download_bytes: config.max_download_bytes,
        })
    }

    fn api_key(&self) -> Result<&str, SubtitleSearchError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(SubtitleSearchError::NotConfigured)
    }

    /// Passes successful responses through, turns anything else into an
    /// `Api` error carrying the start of the body.
    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, SubtitleSearchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = read_limited(response, MAX_ERROR_BODY)
            .await
            .unwrap_or_default();
        Err(SubtitleSearchError::Api {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    fn flatten(response: SearchResponse) -> Vec<SubtitleSearchResult> {
        response
            .data
            .into_iter()
            .flat_map(|entry| {
                let attributes = entry.attributes;
                let language = attributes.language.unwrap_or_default();
                let release = attributes.release.unwrap_or_default();
                let rating = attributes.ratings;
                let downloads = attributes.download_count;

                attributes
                    .files
                    .into_iter()
                    .map(move |file| SubtitleSearchResult {
                        file_id: file.file_id,
                        file_name: file.file_name.unwrap_or_default(),
                        language: language.clone(),
                        release: release.clone(),
                        rating,
                        downloads,
                    })
            })
            .collect()
    }
}

#[async_trait]
impl SubtitleProvider for OpenSubtitlesProvider {
    async fn search(
        &self,
        query: &str,
        language: &str,
    ) -> Result<Vec<SubtitleSearchResult>, SubtitleSearchError> {
        let api_key = self.api_key()?;

        let mut params = vec![("query", query)];
        if !language.is_empty() {
            params.push(("languages", language));
        }

        let response = self
            .client
            .get(format!("{}/subtitles", self.base_url))
            .header("Api-Key", api_key)
            .query(&params)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let parsed: SearchResponse =
            response
                .json()
                .await
                .map_err(|e| SubtitleSearchError::Parse {
                    reason: format!("OpenSubtitles search response: {e}"),
                })?;

        let results = Self::flatten(parsed);
        debug!(query, language, count = results.len(), "Subtitle search finished");
        Ok(results)
    }

    async fn download(&self, file_id: u64) -> Result<DownloadedSubtitle, SubtitleSearchError> {
        let api_key = self.api_key()?;

        let response = self
            .client
            .post(format!("{}/download", self.base_url))
            .header("Api-Key", api_key)
            .json(&DownloadRequest { file_id })
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let link: DownloadResponse =
            response
                .json()
                .await
                .map_err(|e| SubtitleSearchError::Parse {
                    reason: format!("OpenSubtitles download response: {e}"),
                })?;

        let file = Self::check_status(self.client.get(link.link.as_str()).send().await?).await?;
        let content = read_limited(file, self.max_download_bytes).await?;

        debug!(file_id, bytes = content.len(), "Downloaded subtitle");
        Ok(DownloadedSubtitle {
            file_name: link.file_name.unwrap_or_else(|| format!("{file_id}.srt")),
            content,
        })
    }
}

/// Reads at most `limit` bytes of the body, dropping the rest.
async fn read_limited(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Bytes, SubtitleSearchError> {
    let mut body = BytesMut::new();
    while body.len() < limit {
        let Some(chunk) = response.chunk().await? else {
            break;
        };
        let take = chunk.len().min(limit - body.len());
        body.extend_from_slice(&chunk[..take]);
    }
    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_expands_files() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"data":[
                {"attributes":{"language":"en","release":"Movie.2019.1080p","ratings":7.5,
                  "download_count":120,"files":[{"file_id":1,"file_name":"a.srt"},{"file_id":2}]}},
                {"attributes":{"language":null,"files":[]}}
            ]}"#,
        )
        .unwrap();

        let results = OpenSubtitlesProvider::flatten(response);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_name, "a.srt");
        assert_eq!(results[1].file_id, 2);
        assert_eq!(results[1].file_name, "");
        assert_eq!(results[1].release, "Movie.2019.1080p");
        assert_eq!(results[1].downloads, 120);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let provider = OpenSubtitlesProvider::new(&SubtitleConfig::default()).unwrap();

        assert!(matches!(
            provider.search("anything", "en").await,
            Err(SubtitleSearchError::NotConfigured)
        ));
        assert!(matches!(
            provider.download(1).await,
            Err(SubtitleSearchError::NotConfigured)
        ));
    }
}
