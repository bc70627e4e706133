//! Line commands read from stdin while the watcher runs.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// App went to the background.
    Background,
    /// App returned to the foreground; triggers a full refresh.
    Foreground,
    /// Sign the configured session back in.
    Login,
    Logout,
    Status,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "bg" | "background" => Ok(Self::Background),
            "fg" | "foreground" => Ok(Self::Foreground),
            "login" => Ok(Self::Login),
            "logout" => Ok(Self::Logout),
            "status" => Ok(Self::Status),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}
