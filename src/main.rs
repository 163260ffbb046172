use std::sync::Arc;

use chatto::gateway::memory::MemoryGateway;
use chatto::{AppResult, ChatApp};

#[tokio::main]
async fn main() -> AppResult<()> {
    env_logger::init();

    let email = dotenv::var("CHATTO_EMAIL").unwrap_or_else(|_| "guest@example.com".to_owned());
    let password = dotenv::var("CHATTO_PASSWORD").unwrap_or_else(|_| "hunter222".to_owned());

    let gateway = Arc::new(MemoryGateway::new());
    gateway.add_account(&email, &password);

    let mut app = ChatApp::new(gateway);
    app.pump().await?; // initial auth state: login view

    app.login(&email, &password).await?;
    app.pump().await?;

    app.submit_message("こんにちは！").await?;
    app.pump().await?;

    println!("== {} ==", app.view().navbar_room_label);
    for link in &app.view().room_list {
        print!("{link}");
    }
    for bubble in &app.view().messages {
        print!("{bubble}");
    }

    app.logout().await?;
    app.pump().await?;

    Ok(())
}
