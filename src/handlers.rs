//! Inbound update handlers.

use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

use crate::completion::{NO_ANSWER, Prompt};
use crate::router::{quoted_source, route};
use crate::state::BotState;
use crate::telegram::TextFormat;

/// Reply when the IAM exchange fails.
pub const TOKEN_FAILED: &str = "Произошла ошибка при получении токена.";

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "знакомство с ботом")]
    Start,
}

pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_text))
}

async fn handle_command(msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    match cmd {
        Command::Start => {
            let greeting = format!("Привет! Я {}", state.settings.bot_name);
            state
                .outbox
                .send(Recipient::Id(msg.chat.id), &greeting, TextFormat::Plain)
                .await
                .ok();
        }
    }
    Ok(())
}

async fn handle_text(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    // Unknown commands are ignored, not routed.
    if text.starts_with('/') {
        return Ok(());
    }

    let quoted = msg
        .reply_to_message()
        .and_then(|reply| quoted_source(reply.text(), reply.caption()));

    if let Some(answer) = answer_mention(&state, text, quoted).await {
        // Send failures are logged by the outbox.
        state
            .outbox
            .send(Recipient::Id(msg.chat.id), &answer, TextFormat::Markdown)
            .await
            .ok();
    }

    Ok(())
}

/// Build the reply for one text message, or `None` if the bot is not
/// addressed. Upstream failures become user-facing apology strings.
pub async fn answer_mention(state: &BotState, text: &str, quoted: Option<&str>) -> Option<String> {
    let name = &state.settings.bot_name;
    let routed = route(name, text, quoted);

    let preview: String = routed.combined_text.chars().take(100).collect();
    info!("📨 Message: \"{preview}\"");

    if !routed.should_respond {
        info!("Message does not mention \"{name}\", no reply");
        return None;
    }

    let token = match state.credentials.bearer_token().await {
        Ok(token) => token,
        Err(e) => {
            error!("Failed to get IAM token: {e}");
            return Some(TOKEN_FAILED.to_string());
        }
    };

    let prompt = Prompt::reply(name, &state.settings.bot_behavior, &routed.combined_text);
    Some(state.completion.complete(&token, &prompt, NO_ANSWER).await)
}
