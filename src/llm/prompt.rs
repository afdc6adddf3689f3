//! Fixed texts sent to providers or spoken to the child.

const SAFETY_PROMPT: &str = "You are an elementary-school learning assistant. \
Explain everything at a 3rd-5th grade level using clear, friendly, kid-safe language. \
All content must be completely appropriate for children. \
Do not include adult themes, scary or disturbing topics, illegal activities, or personal or sensitive issues. \
If a user asks about something unsafe, gently refuse and guide them to a safe topic. \
Keep your responses concise, warm, and detailed enough for children to understand.";

pub const WELCOME_MESSAGE: &str = "This is an AI teacher based on OpenAI's ChatGPT and Google's Gemini. \
This teacher will explain everything at a 3rd to 5th grade level using clear, friendly, kid-safe language. \
Please ask your questions now.";

pub const HOMEWORK_PROMPT: &str = "Here is a picture of my homework. \
Please help me understand how to solve it step by step, and explain each step so I can learn it myself.";

/// Safety prompt, tailored to the child's age when one was given.
pub fn system_prompt(age: &str) -> String {
    let age = age.trim();
    if age.is_empty() {
        SAFETY_PROMPT.to_string()
    } else {
        format!("{SAFETY_PROMPT} For this conversation, you are speaking to a kid at the age of {age}.")
    }
}

pub fn switch_announcement(display_name: &str) -> String {
    format!("Switched to {display_name}.")
}
