// Prompt templates sent to the inference backend.

/// Builds the upstream prompt. Non-blank context (the uploaded resume text) is
/// wrapped around the question; otherwise the prompt goes out unmodified.
pub fn build_prompt(prompt: &str, context: Option<&str>) -> String {
    match context {
        Some(context) if !context.trim().is_empty() => format!(
            "Based on the following resume:\n\n{context}\n\nAnswer this question: {prompt}"
        ),
        _ => prompt.to_string(),
    }
}
