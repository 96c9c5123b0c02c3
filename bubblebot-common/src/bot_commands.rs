use serde::{Deserialize, Serialize};

/// Commands encoded into inline keyboard callback data.
#[derive(Serialize, Deserialize, Debug)]
pub enum TgCommand {
    OpenMainMenu,
    AnalyzeToken,
    SupportedChains,
}

/// Routing state for incoming messages: either a `/start` deep link, a
/// pending per-user input prompt, or plain text.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum MessageCommand {
    None,
    Start(String),
    AnalyzeToken,
}
