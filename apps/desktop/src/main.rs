use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{load_settings, ClientEvent, MessengerClient, WebSocketSession};
use shared::protocol::Update;
use view_model::ChatListModel;

#[derive(Parser, Debug)]
struct Args {
    /// Overrides the server URL from client.toml / environment.
    #[arg(long)]
    server_url: Option<String>,
    /// How many chats to request up front.
    #[arg(long, default_value_t = 50)]
    chat_limit: u32,
    /// Row height in pixels for the windowed chat list.
    #[arg(long, default_value_t = 64)]
    row_height: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }

    let session = WebSocketSession::connect(&settings.server_url, settings.event_capacity).await?;
    let client = MessengerClient::new(session, &settings);
    client.start();

    let chat_list = ChatListModel::new(
        Arc::clone(&client),
        args.row_height,
        settings.viewport_overscan_rows,
    )
    .await;

    let mut events = client.subscribe_events();
    client.load_chats(args.chat_limit).await?;
    println!("Connected to {}; press Ctrl-C to quit.", settings.server_url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::Update(Update::NewChat { .. } | Update::ChatOrder { .. })) => {
                    println!("-- chats ({} total) --", chat_list.rows().len());
                    for row in chat_list.visible_rows(0, 480) {
                        println!("  [{:>3}] {}", row.unread_count, row.title);
                    }
                }
                Ok(ClientEvent::TypingChanged { chat_id }) => {
                    println!("typing activity in chat {}", chat_id.0);
                }
                Ok(ClientEvent::Api(error)) => {
                    eprintln!("server error {:?}: {}", error.code, error.message);
                }
                Ok(ClientEvent::Error(message)) => {
                    eprintln!("session error: {message}");
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            },
        }
    }

    client.close();
    Ok(())
}
