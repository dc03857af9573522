//! Prompt templates for extraction, the opening scene and scene advancement.

use crate::completion::ChatMessage;
use crate::models::Character;

const EXTRACTION_TEMPLATE: &str = r#"You are a talented expert in text understanding.

Please extract a list with characters from the story, with their names, abilities and weaknesses as a list of dictionaries with the structure
{"character_name": "", "character_abilities": "", "character_weaknesses": ""}.
Do not return the response type. ONLY the response with the structure stated above, as a JSON array in plain text.

Story: {story}
Characters:
"#;

const STARTING_SYSTEM_TEMPLATE: &str = r#"I want you to act as if you are a classic text adventure game and we are playing.
I don't want you to ever break out of your character, and you must not refer to yourself in any way.
Based on this list of fragments from the story:
{fragments}
generate a short (maximum 10 sentences) description of your surroundings and things you have on you as a monologue and {max_actions} options of what actions you could do
following the structure {"description": "", "actions": []}. Respond using ONLY the response structure as JSON in plain text.

Choose the surroundings randomly from the list of fragments provided.
"#;

const ADVANCEMENT_SYSTEM_TEMPLATE: &str = r#"I want you to act as if you are a classic text adventure game and we are playing.
I don't want you to ever break out of your character, and you must not refer to yourself in any way.

You have only {steps} steps left to win or lose the game, make it count!

Based on this list of fragments from the story:
{fragments}
and the selected action generate a short (maximum 5 sentences) description of the action, how the action took place and
{max_actions} options of what actions you could do following the structure {"description": "", "actions": []} as JSON in plain text.

Rules -------------------------
Please formulate the description of the action taking into considerations the following rules:
1. The description should contain the entire action with a development and an ending;
2. The description should be consistent with the fragments from the story and the messages history;
3. The description should be at the first person present tense.

Please formulate the next actions options taking into consideration the following rules:
1. The actions should be mystical or adventurous.
2. Take into consideration previous actions and the story to have a consistent storyline;
3. The actions should be ENGAGING and should have an unexpected twist;
4. The actions should be consistent with the character's abilities and weaknesses.
5. The actions should be consistent with the character's surroundings and the story.
6. The actions should be different from each other and should have different outcomes.
7. The actions should lead to a development and a conclusion of the story and should be engaging for the user.
8. The actions should take MORE THAN ONE DAY to complete!
9. The actions should lead to an end of the story, with a conclusion that would end the storyline.
10. The actions SHOULD NOT be boring or lame!
11. The actions should be active and should involve the character in a direct way.

Rules for specific steps:
- If you have 1 steps left, please provide a final action that will end the game;
- If you have 0 steps left, please provide ONLY an ending description that would end the storyline, without actions, following the structure {"description": ""}.

------------------------------

Formulate the answer using ONLY the response structure. You should sacredly follow the above rules!
"#;

/// Human turn sent to the model. History keeps the plain character name instead.
pub fn character_question(character: &Character) -> String {
    format!(
        "You are {}. Your abilities: {}. Your weaknesses: {}.\n\nAnswer:",
        character.name, character.abilities, character.weaknesses
    )
}

pub fn action_question(character: &Character, action: &str) -> String {
    format!(
        "You are {}. You choose {}.\n\nAnswer:",
        character.name, action
    )
}

pub fn extraction_prompt(story: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::human(EXTRACTION_TEMPLATE.replace("{story}", story))]
}

pub fn starting_system_prompt(fragments: &[String], max_actions: usize) -> ChatMessage {
    ChatMessage::system(
        STARTING_SYSTEM_TEMPLATE
            .replace("{fragments}", &render_fragments(fragments))
            .replace("{max_actions}", &max_actions.to_string()),
    )
}

pub fn advancement_system_prompt(
    fragments: &[String],
    remaining_steps: u32,
    max_actions: usize,
) -> ChatMessage {
    ChatMessage::system(
        ADVANCEMENT_SYSTEM_TEMPLATE
            .replace("{steps}", &remaining_steps.to_string())
            .replace("{fragments}", &render_fragments(fragments))
            .replace("{max_actions}", &max_actions.to_string()),
    )
}

fn render_fragments(fragments: &[String]) -> String {
    if fragments.is_empty() {
        return "(no fragments found)".to_string();
    }
    fragments
        .iter()
        .enumerate()
        .map(|(i, f)| format!("[{}] {}", i + 1, f))
        .collect::<Vec<_>>()
        .join("\n")
}
