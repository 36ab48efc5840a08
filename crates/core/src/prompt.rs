//! Prompt text sent to the language model.

use crate::types::GenerationRequest;

/// System message for every generation call.
pub const SYSTEM_PROMPT: &str = "You are an expert presentation designer.";

/// Name of the image tool offered to agent-mode calls.
pub const IMAGE_TOOL_NAME: &str = "fetch_image_from_unsplash";

/// Description of the image tool offered to agent-mode calls.
pub const IMAGE_TOOL_DESCRIPTION: &str =
    "Fetch a relevant image URL from Unsplash based on a descriptive query.";

/// Prompt for a single tool-free completion that returns the slide list.
pub fn outline_prompt(request: &GenerationRequest) -> String {
    format!(
        "Create a presentation outline on the topic: \"{topic}\"\n\
         \n\
         Generate exactly {count} slides.\n\
         \n\
         Return the output ONLY as a JSON list.\n\
         Each slide must have this structure:\n\
         \n\
         {{\n  \"title\": \"...\",\n  \"bullets\": [\"...\", \"...\"],\n  \"image_query\": \"...\"\n}}\n\
         \n\
         Rules:\n\
         - Keep titles short and clear.\n\
         - Each slide must have 3 to 5 bullet points.\n\
         - image_query must be a short phrase (at most 4 words) suited to a stock photo search.\n\
         - Do NOT include markdown or explanations.\n\
         - Return ONLY valid JSON.",
        topic = request.topic,
        count = request.slide_count,
    )
}

/// Prompt for an agent run that may call the image tool per slide.
pub fn agent_prompt(request: &GenerationRequest) -> String {
    format!(
        "Create a presentation on the topic: \"{topic}\" with exactly {count} slides.\n\
         \n\
         For every slide, call the {tool} tool once with a short search phrase \
         (at most 4 words) that matches the slide.\n\
         \n\
         When all images are fetched, reply with ONLY a JSON list in which each \
         slide has this structure:\n\
         \n\
         {{\n  \"title\": \"...\",\n  \"bullets\": [\"...\", \"...\"],\n  \"image_query\": \"...\",\n  \"image_url\": \"...\"\n}}\n\
         \n\
         Rules:\n\
         - Each slide must have 3 to 5 bullet points.\n\
         - Use the exact URL the tool returned, or null if it found nothing.\n\
         - Do NOT include markdown or explanations.",
        topic = request.topic,
        count = request.slide_count,
        tool = IMAGE_TOOL_NAME,
    )
}
