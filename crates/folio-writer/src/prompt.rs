//! Prompt construction for a single scene.

use folio_ai::GenerationRequest;
use folio_core::{project::SceneTask, words::tail_words};

const SYSTEM_PROMPT: &str = "You are a skilled novelist drafting a book one scene at a time. \
Write only the prose of the requested scene: no headings, no notes, no summaries. \
Keep voice, tense, and characters consistent with the preceding text.";

/// Words of the previous scene carried into the prompt for continuity.
const CONTEXT_WORDS: usize = 300;

const MAX_TOKENS: i64 = 8192;

/// Roughly 4 tokens per 3 words, with headroom, capped for the gateway.
fn max_tokens(target_words: i64) -> u32 {
  let tokens = target_words.clamp(100, MAX_TOKENS).saturating_mul(4) / 3 + 200;
  tokens.min(MAX_TOKENS) as u32
}

pub fn scene_request(task: &SceneTask) -> GenerationRequest {
  let project = &task.project;
  let mut prompt = format!("Book: {}\n", project.title);
  if let Some(genre) = &project.genre {
    prompt.push_str(&format!("Genre: {genre}\n"));
  }
  if let Some(description) = &project.description {
    prompt.push_str(&format!("Premise: {description}\n"));
  }
  prompt.push_str(&format!("Chapter: {}\n", task.chapter_title));

  if let Some(previous) = task.previous_text.as_deref().filter(|t| !t.trim().is_empty()) {
    prompt.push_str(&format!(
      "\nThe previous scene ended:\n\"\"\"\n{}\n\"\"\"\n",
      tail_words(previous, CONTEXT_WORDS)
    ));
  }

  prompt.push_str(&format!(
    "\nWrite the next scene (about {} words): {}\n",
    task.scene.target_words, task.scene.summary
  ));

  GenerationRequest {
    system: SYSTEM_PROMPT.to_owned(),
    prompt,
    max_tokens: max_tokens(task.scene.target_words),
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use folio_core::project::{Project, Scene, SceneStatus, WritingStatus};
  use uuid::Uuid;

  use super::*;

  fn task(previous: Option<&str>) -> SceneTask {
    let now = Utc::now();
    SceneTask {
      project:       Project {
        project_id:         Uuid::new_v4(),
        user_id:            Uuid::new_v4(),
        title:              "The Lighthouse Keeper".into(),
        genre:              Some("literary".into()),
        description:        None,
        writing_status:     WritingStatus::InProgress,
        writing_started_at: Some(now),
        writing_error:      None,
        word_count:         0,
        created_at:         now,
        updated_at:         now,
      },
      chapter_title: "Arrival".into(),
      scene:         Scene {
        scene_id:     Uuid::new_v4(),
        chapter_id:   Uuid::new_v4(),
        position:     1,
        summary:      "The keeper finds a letter".into(),
        target_words: 900,
        status:       SceneStatus::Pending,
        content:      None,
        word_count:   0,
      },
      previous_text: previous.map(str::to_owned),
    }
  }

  #[test]
  fn includes_outline_and_continuity() {
    let req = scene_request(&task(Some("The lamp guttered and went out.")));
    assert!(req.prompt.contains("Book: The Lighthouse Keeper"));
    assert!(req.prompt.contains("Genre: literary"));
    assert!(!req.prompt.contains("Premise:"));
    assert!(req.prompt.contains("Chapter: Arrival"));
    assert!(req.prompt.contains("The lamp guttered and went out."));
    assert!(req.prompt.contains("about 900 words): The keeper finds a letter"));
    assert_eq!(req.max_tokens, 1400);
  }

  #[test]
  fn first_scene_has_no_previous_block() {
    let req = scene_request(&task(None));
    assert!(!req.prompt.contains("previous scene"));
  }

  #[test]
  fn token_budget_is_bounded() {
    assert_eq!(max_tokens(0), 333);
    assert_eq!(max_tokens(100_000), 8192);
    assert_eq!(max_tokens(i64::MAX), 8192);
    assert_eq!(max_tokens(i64::MIN), 333);
  }
}
