//! Sends one formatted test article to the configured general group, so a
//! deployment's token, chat id and markup can be checked without waiting
//! for a real cycle. Usage: `cargo run --bin send_probe`.

use chrono::Utc;
use cybernews_relay::article::Article;
use cybernews_relay::config::Settings;
use cybernews_relay::deliver::{Destination, MessageSender};
use cybernews_relay::telegram::{format_article, TelegramSender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let settings = Settings::from_env()?;
    let client = settings.http_client()?;
    let sender = TelegramSender::new(client, settings.telegram_bot_token.clone());

    let mut article = Article::new(
        "TheHackerNews",
        "Delivery probe: configuration check",
        Some("If you can read this, the relay can reach this group.".into()),
        "https://thehackernews.com/",
        Utc::now(),
    );
    article.translated_title = Some("Delivery probe: configuration check".into());

    let destination = Destination {
        chat_id: settings.telegram_group_id,
        topic_id: settings.telegram_topic_id,
    };
    sender.send(destination, &format_article(&article)).await?;

    println!("probe message delivered");
    Ok(())
}
