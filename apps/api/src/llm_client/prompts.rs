// Shared prompt fragments used by more than one caller of the completion provider.
// Mode-specific system prompts live in chat::prompts.

/// Appended as a user turn when a reply looks cut off mid-sentence.
pub const CONTINUATION_INSTRUCTION: &str =
    "Continue the same answer. Finish in 1–2 sentences. No new sections.";

/// Formatting discipline shared by every mode.
pub const PLAIN_TEXT_INSTRUCTION: &str = "\
    Respond in plain text. Do NOT wrap the answer in markdown code fences. \
    Do NOT use markdown headings.";

/// Citation discipline for modes that reference the fact list.
pub const CITATION_INSTRUCTION: &str = "\
    When a statement relies on one of the facts above, cite it inline using the fact id \
    in square brackets exactly as given, e.g. [HIV-PREP-ELIG-001]. \
    Do NOT invent fact ids.";
