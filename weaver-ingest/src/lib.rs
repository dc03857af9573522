//! Story ingestion: loads the story text and splits it into paragraphs.

pub mod story;

pub use story::{load_story, IngestError, Story, StorySource};
