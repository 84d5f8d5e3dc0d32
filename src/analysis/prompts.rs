//! Prompt text for composite analysis.

pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are looking at a tall screenshot stitched together from several \
captures of the same screen, stacked top to bottom in the order they were taken. \
Respond with a single JSON object and nothing else. Use these optional string fields:\n\
- \"summary\": one or two sentences describing what the screenshot shows\n\
- \"text\": the readable text content, transcribed in reading order\n\
- \"code\": any source code visible, verbatim, without markdown fences\n\
Omit a field when it does not apply.";

pub const ANALYSIS_USER_PROMPT: &str =
    "Analyze this stitched screenshot and return the JSON object.";
