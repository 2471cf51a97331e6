mod client;
mod conversation;
mod render;

use std::io::{self, Write};

use chat::UiEvent;
use colored::Colorize;

use crate::client::{ChatClient, Outcome};
use crate::conversation::Conversation;
use crate::render::{Tail, history_table, render_message};

fn now() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let conf = config::SqlChatConfig::get_or_default();
    let url = std::env::args().nth(1).unwrap_or_else(|| conf.chat_url());
    let client = ChatClient::new(url.clone());
    let mut conversation = Conversation::new();

    cliclack::intro("SQL chat")?;
    cliclack::log::remark(format!(
        "Ask about products and sales. Talking to {url}. /history shows the conversation, /quit exits."
    ))?;

    loop {
        let prompt: String = match cliclack::input("You")
            .placeholder("How many products are in category Electronics?")
            .interact()
        {
            Ok(prompt) => prompt,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => break,
            Err(err) => return Err(err.into()),
        };
        let prompt = prompt.trim();

        match prompt {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                println!("{}", history_table(&conversation));
                continue;
            }
            _ => {}
        }

        let user = conversation.push_user(prompt).id.clone();
        conversation.observe(now);
        println!(
            "{}",
            render_message(
                &conversation.messages()[conversation.messages().len() - 1],
                conversation.timestamp(&user)
            )
        );

        let mut spinner = cliclack::spinner();
        spinner.start("Fetching...");
        let mut spinning = true;
        let mut tail = Tail::new();
        let history = conversation.messages().to_vec();

        let outcome = client
            .send(&history, |event| {
                conversation.apply(&event);
                if let UiEvent::Start { message_id } = &event {
                    spinner.stop("Answer");
                    spinning = false;
                    conversation.observe(now);
                    let stamp = conversation.timestamp(message_id).unwrap_or_default();
                    println!("{} {}", "[Assistant]".blue(), stamp.dimmed());
                }
                if let Some(out) = tail.on_event(&event) {
                    print!("{out}");
                    let _ = io::stdout().flush();
                }
            })
            .await;
        if spinning {
            spinner.stop("Answer");
        }
        conversation.observe(now);

        match outcome {
            Ok(Outcome::Streamed) => println!(),
            Ok(Outcome::Reply(reply)) => {
                conversation.push_reply(reply);
                conversation.observe(now);
                let last = &conversation.messages()[conversation.messages().len() - 1];
                println!("{}\n", render_message(last, conversation.timestamp(&last.id)));
            }
            Err(err) => cliclack::log::error(format!("{err:#}"))?,
        }
    }

    cliclack::outro("Bye")?;
    Ok(())
}
