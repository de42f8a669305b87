//! Prompt for the image description service.
//!
//! Kept separate from [`crate::pipeline::describe`] so the wording can be
//! reviewed and tested without a provider. Callers can override it through
//! [`crate::config::IngestConfig::describe_prompt`]; the placeholder
//! `{topic}` is substituted either way.

/// Default prompt sent with every extracted image.
pub const DEFAULT_DESCRIBE_PROMPT: &str = r#"You are describing an image that was extracted from a document so that a language model can use it without seeing the image.

Describe the image in detail:
- Transcribe any visible text exactly.
- For charts and graphs, state the type, the axes, the series and the values or trends shown.
- For diagrams, describe the components and how they connect.
- If the image is a slide, screenshot or scanned page, summarise its content as structured text.
- For photographs, describe the subject and any details relevant to the document.

Pay particular attention to details related to: {topic}.

Answer with the description only. Do not add commentary about the image quality or your process."#;

/// Substitute `topic` into a prompt template.
///
/// An empty topic falls back to "general".
pub fn describe_prompt(template: &str, topic: &str) -> String {
    let topic = if topic.trim().is_empty() { "general" } else { topic.trim() };
    template.replace("{topic}", topic)
}
