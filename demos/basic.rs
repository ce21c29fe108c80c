use chat_realtime_rs::{RealtimeClient, RealtimeClientOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let url = std::env::var("CHAT_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string());
    let user_id = std::env::var("CHAT_USER_ID").unwrap_or_else(|_| "demo-user".to_string());
    let access_token = std::env::var("CHAT_TOKEN").ok();

    // Create client
    let client = RealtimeClient::new(
        &url,
        RealtimeClientOptions {
            user_id,
            access_token,
            ..Default::default()
        },
    )?;

    client.on_connection_status(|status| println!("Connection: {:?}", status.state));
    client.on_message(|message| {
        println!("[{}] {}: {}", message.kind(), message.sender_id(), message.payload())
    });
    client.on_user_online(|entry| println!("{} is online", entry.user_id));
    client.on_user_offline(|entry| println!("{} went offline", entry.user_id));
    client.on_typing_started(|event| println!("{} is typing...", event.user_id));
    client.on_error(|e| eprintln!("Error: {}", e));

    // Connect
    println!("Connecting to {}...", url);
    client.connect().await?;
    println!("Connected!");

    client.send_chat_message("hello from Rust", Some("general")).await?;

    // Keep connection alive
    tokio::signal::ctrl_c().await?;

    // Disconnect
    println!("Disconnecting...");
    client.disconnect().await?;
    println!("Disconnected!");

    Ok(())
}
