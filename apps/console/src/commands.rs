use shared::domain::{ConversationId, MessageId};
use sync_engine::OutgoingContent;

/// One line of console input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Push(String),
    Select(ConversationId),
    Clear,
    Refresh(ConversationId),
    Send(OutgoingContent),
    Retry {
        conversation_id: ConversationId,
        local_id: MessageId,
    },
    Focus(bool),
    Scroll(f32),
    List,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  {json}                      apply a push event
  select <conversation>       open a conversation
  clear                       close the open conversation
  refresh <conversation>      reload history
  send <text>                 send into the open conversation
  media <url> [text]          send an attachment
  retry <conversation> <id>   resend a failed message
  focus on|off                tab focus
  scroll <px>                 distance from the bottom of the timeline
  list                        conversation list
  quit";

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.starts_with('{') {
        return Ok(Command::Push(line.to_string()));
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "select" => conversation_arg(rest).map(Command::Select),
        "clear" => Ok(Command::Clear),
        "refresh" => conversation_arg(rest).map(Command::Refresh),
        "send" => Ok(Command::Send(OutgoingContent::text(rest))),
        "media" => {
            let (url, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if url.is_empty() {
                return Err("usage: media <url> [text]".into());
            }
            Ok(Command::Send(OutgoingContent::text(text.trim()).with_media(url)))
        }
        "retry" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(conversation), Some(local_id)) => Ok(Command::Retry {
                    conversation_id: ConversationId::from(conversation),
                    local_id: MessageId::from(local_id),
                }),
                _ => Err("usage: retry <conversation> <id>".into()),
            }
        }
        "focus" => match rest {
            "on" => Ok(Command::Focus(true)),
            "off" => Ok(Command::Focus(false)),
            _ => Err("usage: focus on|off".into()),
        },
        "scroll" => rest
            .parse::<f32>()
            .map(Command::Scroll)
            .map_err(|_| "usage: scroll <px>".to_string()),
        "list" => Ok(Command::List),
        "help" | "" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn conversation_arg(rest: &str) -> Result<ConversationId, String> {
    if rest.is_empty() {
        return Err("missing conversation id".into());
    }
    Ok(ConversationId::from(rest))
}
