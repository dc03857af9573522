//! Character extraction: asks the model for the story's cast.
//!
//! Output that does not parse, or parses into an unusable list, costs an
//! attempt; backend failures propagate. An exhausted budget yields an empty
//! list, which callers must treat as fatal for the session.

use weaver_core::completion::{CompletionBackend, CompletionError, CompletionRequest};
use weaver_core::models::Character;
use weaver_core::{bounded_attempts, parse, prompts, Attempts};

/// Acceptable only if non-empty; member completeness is checked by the parser.
fn is_usable(characters: &Vec<Character>) -> bool {
    !characters.is_empty()
}

pub struct CharacterExtractor<'a> {
    pub completion: &'a dyn CompletionBackend,
    pub max_attempts: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CharacterExtractor<'_> {
    pub async fn extract(&self, story: &str) -> Result<Vec<Character>, CompletionError> {
        Ok(self.extract_attempts(story).await?.accepted().unwrap_or_default())
    }

    pub async fn extract_attempts(
        &self,
        story: &str,
    ) -> Result<Attempts<Vec<Character>>, CompletionError> {
        let outcome = bounded_attempts(
            self.max_attempts,
            |attempt| async move {
                let raw = self
                    .completion
                    .complete(CompletionRequest {
                        messages: prompts::extraction_prompt(story),
                        temperature: self.temperature,
                        max_tokens: self.max_tokens,
                    })
                    .await?;
                let parsed = parse::parse_characters(&raw);
                if parsed.is_none() {
                    tracing::warn!(attempt, "Character list did not parse, retrying");
                }
                Ok::<_, CompletionError>(parsed)
            },
            is_usable,
        )
        .await?;

        match &outcome {
            Attempts::Accepted { value, attempts } => tracing::info!(
                characters = value.len(),
                attempts,
                "Characters extracted"
            ),
            Attempts::Exhausted { attempts } => tracing::error!(
                attempts,
                "Character extraction exhausted all attempts"
            ),
        }

        Ok(outcome)
    }
}
