use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read story file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download story: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Story download returned HTTP {0}")]
    Status(u16),

    #[error("Story is not valid UTF-8")]
    Encoding,

    #[error("Story is empty")]
    Empty,
}

/// Where the story text lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorySource {
    File(PathBuf),
    Url(String),
}

impl StorySource {
    /// `http://` and `https://` select a download, anything else is a path.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            StorySource::Url(s.to_string())
        } else {
            StorySource::File(PathBuf::from(s))
        }
    }
}

/// The immutable story text a session plays through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    text: String,
}

impl Story {
    pub fn new(text: impl Into<String>) -> Result<Self, IngestError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(IngestError::Empty);
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// One paragraph per line; blank lines are dropped.
    pub fn paragraphs(&self) -> Vec<&str> {
        self.text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty())
            .collect()
    }
}

pub async fn load_story(source: &StorySource) -> Result<Story, IngestError> {
    let bytes = match source {
        StorySource::File(path) => {
            tokio::fs::read(path).await.map_err(|e| IngestError::Read {
                path: path.display().to_string(),
                source: e,
            })?
        }
        StorySource::Url(url) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?;
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(IngestError::Status(status.as_u16()));
            }
            response.bytes().await?.to_vec()
        }
    };

    let text = String::from_utf8(bytes).map_err(|_| IngestError::Encoding)?;
    let story = Story::new(text)?;

    tracing::info!(
        paragraphs = story.paragraphs().len(),
        bytes = story.text().len(),
        "Story loaded"
    );

    Ok(story)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_source_parse() {
        assert_eq!(
            StorySource::parse("https://example.com/story.txt"),
            StorySource::Url("https://example.com/story.txt".to_string())
        );
        assert_eq!(
            StorySource::parse("stories/story.txt"),
            StorySource::File(PathBuf::from("stories/story.txt"))
        );
    }

    #[test]
    fn test_paragraphs_drop_blank_lines() {
        let story = Story::new("First.\n\nSecond.\r\n   \nThird.\n").unwrap();
        assert_eq!(story.paragraphs(), vec!["First.", "Second.", "Third."]);
    }

    #[test]
    fn test_empty_story_is_rejected() {
        assert!(matches!(Story::new("  \n\n "), Err(IngestError::Empty)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("weaver-story-{}.txt", std::process::id()));
        tokio::fs::write(&path, "Alice walks.\nBob waits.\n").await.unwrap();

        let story = load_story(&StorySource::File(path.clone())).await.unwrap();
        assert_eq!(story.paragraphs().len(), 2);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_load_missing_file_is_an_error() {
        let source = StorySource::File(PathBuf::from("/definitely/not/here.txt"));
        assert!(matches!(load_story(&source).await, Err(IngestError::Read { .. })));
    }

    #[tokio::test]
    async fn test_load_from_url() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/story.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("One.\nTwo.\nThree."))
            .mount(&mock_server)
            .await;

        let source = StorySource::Url(format!("{}/story.txt", mock_server.uri()));
        let story = load_story(&source).await.unwrap();
        assert_eq!(story.paragraphs(), vec!["One.", "Two.", "Three."]);
    }

    #[tokio::test]
    async fn test_load_from_url_non_success_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let source = StorySource::Url(format!("{}/missing.txt", mock_server.uri()));
        assert!(matches!(load_story(&source).await, Err(IngestError::Status(404))));
    }
}
