//! Built-in system prompts

/// System prompt for the conversation loop
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful AI assistant with access to OpenAI. Follow these rules:
1. When given a story you will query chat.
2. Always mention your source of information.
3. If a tool returns an error, explain the error to the user clearly.";

/// System prompt for the `continue_story` tool
pub const STORY_SYSTEM_PROMPT: &str = "\
You are a helpful AI assistant with access to OpenAI.
Objective:
1. You will be given a piece of literature in which to collaborate on.
You must supply the next paragraph for it.

Follow these rules:
1. You can be creative.
2. You can be thoughtful.
3. You need to consider the central theme.
4. Who is the main character, are there any?
5. What are they doing, what will they do next?
6. If the response returns an error, explain the error to the user clearly.";

/// The configured prompt, or the built-in one when unset or blank
pub fn system_prompt(custom: Option<&str>) -> String {
    match custom.map(str::trim) {
        Some(prompt) if !prompt.is_empty() => prompt.to_string(),
        _ => DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}
