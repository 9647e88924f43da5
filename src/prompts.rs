//! Prompts for the first-page document summary.
//!
//! Kept in one place so prompt changes never touch the request or parsing
//! code, and so tests can assert on the contract the parser relies on.

/// System prompt: forces a bare JSON object with the three expected keys.
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a document analyst. You receive an image of the first page of a PDF document.

Reply with ONE JSON object and nothing else:

{
  "suggestedTitle": "<a concise, professional title for the document>",
  "summary": "<a summary of the document in exactly two sentences>",
  "keyPoints": ["<3 to 5 key points found on the page>"]
}

Rules:
- All three keys are required.
- Do NOT wrap the JSON in ```json fences.
- Do NOT add commentary before or after the JSON."#;

/// User turn sent alongside the page image.
pub const ANALYSIS_USER_PROMPT: &str = "This is the first page of a PDF document. Analyze it and provide a JSON summary. \
Include a suggested professional title, a 2-sentence summary, and 3-5 key points found in this document.";
