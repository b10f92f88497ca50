//! Chat command implementations

use std::io::Write;

use anyhow::{Context, Result};
use anya_core::{Attachment, InboundMessage, OutboundMessage, SessionOrchestrator};
use chrono::Utc;

/// Send a single message and print the reply
pub async fn cmd_chat(orchestrator: &SessionOrchestrator, user_id: &str, text: &str) -> Result<()> {
    let reply = send(orchestrator, user_id, text).await?;
    print_reply(&reply);
    Ok(())
}

/// Read messages from stdin until EOF or `/quit`
pub async fn cmd_chat_interactive(orchestrator: &SessionOrchestrator, user_id: &str) -> Result<()> {
    println!("💬 Chatting as '{}'. Type /quit to leave.", user_id);

    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        line.clear();
        if stdin.read_line(&mut line).context("Failed to read stdin")? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "/quit" | "/exit") {
            break;
        }

        let reply = send(orchestrator, user_id, text).await?;
        print_reply(&reply);
        println!();
    }

    println!("👋 Bye!");
    Ok(())
}

async fn send(orchestrator: &SessionOrchestrator, user_id: &str, text: &str) -> Result<OutboundMessage> {
    let message = InboundMessage {
        user_id: user_id.to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
    };
    orchestrator
        .handle_message(&message)
        .await
        .context("Failed to handle message")
}

fn print_reply(reply: &OutboundMessage) {
    println!("{}", reply.reply_text);
    for attachment in &reply.attachments {
        println!("   📎 {}", describe_attachment(attachment));
    }
}

/// One-line description of an attachment the terminal cannot render
pub fn describe_attachment(attachment: &Attachment) -> String {
    match attachment {
        Attachment::Dashboard { user_id } => {
            format!("dashboard for {} (anya dashboard --user {})", user_id, user_id)
        }
        Attachment::ImageRequest { prompt } => format!("image: {}", prompt),
        Attachment::PlacesLookup { context, place } => {
            format!("cheaper alternatives to {} ({})", place, context)
        }
    }
}
