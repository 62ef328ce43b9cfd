//! Decides whether an incoming message is addressed to the bot.

/// Label placed between the user's text and the quoted message.
const QUOTE_SEPARATOR: &str = "\n\nПересланное сообщение: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub should_respond: bool,
    /// Text sent to the model: the message plus any quoted content.
    pub combined_text: String,
}

/// Route one text message.
///
/// The quoted text is always appended when present, but only `text` itself
/// is checked for the bot's name. A mention inside the quoted message does
/// not make the bot answer.
pub fn route(bot_name: &str, text: &str, quoted: Option<&str>) -> Route {
    let combined_text = match quoted.filter(|q| !q.is_empty()) {
        Some(q) => format!("{text}{QUOTE_SEPARATOR}{q}"),
        None => text.to_string(),
    };

    Route {
        should_respond: mentions(text, bot_name),
        combined_text,
    }
}

/// Case-insensitive substring match.
pub fn mentions(text: &str, bot_name: &str) -> bool {
    text.to_lowercase().contains(&bot_name.to_lowercase())
}

/// Pick the quoted source of a reply: its text, else its caption.
pub fn quoted_source<'a>(text: Option<&'a str>, caption: Option<&'a str>) -> Option<&'a str> {
    text.filter(|t| !t.is_empty())
        .or_else(|| caption.filter(|c| !c.is_empty()))
}
