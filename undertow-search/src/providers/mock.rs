//! Canned provider for development mode and tests.

use async_trait::async_trait;
use bytes::Bytes;

use super::SubtitleProvider;
use crate::errors::SubtitleSearchError;
use crate::types::{DownloadedSubtitle, SubtitleSearchResult};

/// Provider that answers without any network access.
///
/// Searches return two results derived from the query; downloads return a
/// short SRT file named after the requested id.
#[derive(Debug, Default)]
pub struct MockSubtitleProvider {
    unconfigured: bool,
}

impl MockSubtitleProvider {
    /// Creates a provider that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that behaves like a service without credentials.
    pub fn unconfigured() -> Self {
        Self { unconfigured: true }
    }

    fn check(&self) -> Result<(), SubtitleSearchError> {
        if self.unconfigured {
            Err(SubtitleSearchError::NotConfigured)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SubtitleProvider for MockSubtitleProvider {
    async fn search(
        &self,
        query: &str,
        language: &str,
    ) -> Result<Vec<SubtitleSearchResult>, SubtitleSearchError> {
        self.check()?;
        let stem = query.replace(' ', ".");

        Ok(vec![
            SubtitleSearchResult {
                file_id: 1001,
                file_name: format!("{stem}.{language}.srt"),
                language: language.to_string(),
                release: format!("{stem}.1080p.WEB"),
                rating: 8.0,
                downloads: 1500,
            },
            SubtitleSearchResult {
                file_id: 1002,
                file_name: format!("{stem}.{language}.hi.srt"),
                language: language.to_string(),
                release: format!("{stem}.720p.HDTV"),
                rating: 6.5,
                downloads: 300,
            },
        ])
    }

    async fn download(&self, file_id: u64) -> Result<DownloadedSubtitle, SubtitleSearchError> {
        self.check()?;

        Ok(DownloadedSubtitle {
            file_name: format!("mock-{file_id}.srt"),
            content: Bytes::from(format!(
                "1\n00:00:01,000 --> 00:00:04,000\nSubtitle {file_id}\n"
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_uses_query_and_language() {
        let results = MockSubtitleProvider::new()
            .search("Big Buck Bunny", "de")
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_name, "Big.Buck.Bunny.de.srt");
        assert!(results.iter().all(|result| result.language == "de"));
    }

    #[tokio::test]
    async fn test_unconfigured_fails() {
        let provider = MockSubtitleProvider::unconfigured();
        assert!(matches!(
            provider.download(7).await,
            Err(SubtitleSearchError::NotConfigured)
        ));
    }
}
