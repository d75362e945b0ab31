//! tdlayer-app: interactive login + update stream demo.
//!
//! Needs `libtdjson` on the linker path:
//!   TDLAYER_API_ID=... TDLAYER_API_HASH=... cargo run -p tdlayer-app --features native
//!
//! Optional: `TDLAYER_DATA_DIR` (default `tdlib`), `TDLAYER_TEST_DC=1`.

use std::io::{self, BufRead, Write};

use chrono::Local;
use tdlayer_client::{AuthorizationState, Client, Config, Credentials, Frame};

#[tokio::main]
async fn main() {
    // Enable logging: RUST_LOG=tdlayer_client=debug cargo run ...
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point, no other threads reading env
        unsafe { std::env::set_var("RUST_LOG", "tdlayer_client=info,tdlayer_engine=info,tdlayer_app=info"); }
    }
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("\n✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config_from_env()?;

    println!("🔌 Starting engine…");
    let client = Client::connect(config).await?;

    // Updates pile up during login too; keep draining them or replies stall.
    let mut updates = client.updates().ok_or("update stream already taken")?;
    let printer = tokio::spawn(async move {
        while let Some(frame) = updates.next().await {
            print_update(&frame);
        }
        println!("⚠ Update stream closed");
    });

    client.authorize(&mut Prompt).await?;
    println!("✅ Authorized");
    println!("\n👂 Listening for updates (Ctrl+C to quit) …\n");

    tokio::signal::ctrl_c().await?;
    println!("\n👋 Shutting down…");

    if let Err(e) = client.close().await {
        log::warn!("close failed: {e}");
    }
    client.destroy().await;
    printer.await?;
    Ok(())
}

fn config_from_env() -> Result<Config, Box<dyn std::error::Error>> {
    let api_id: i32 = std::env::var("TDLAYER_API_ID")
        .map_err(|_| "set TDLAYER_API_ID (https://my.telegram.org)")?
        .parse()?;
    let api_hash = std::env::var("TDLAYER_API_HASH")
        .map_err(|_| "set TDLAYER_API_HASH (https://my.telegram.org)")?;

    let mut config = Config::new(api_id, api_hash);
    let data_dir = std::env::var("TDLAYER_DATA_DIR").unwrap_or_else(|_| "tdlib".into());
    config.parameters.database_directory = format!("{data_dir}/db");
    config.parameters.files_directory    = format!("{data_dir}/files");
    config.parameters.use_test_dc        = std::env::var("TDLAYER_TEST_DC").is_ok_and(|v| v == "1");
    config.parameters.device_model       = "tdlayer-app".into();
    config.log_verbosity = Some(1);
    Ok(config)
}

fn print_update(frame: &Frame) {
    let now  = Local::now().format("%H:%M:%S");
    let kind = frame.kind().unwrap_or("?");
    match kind {
        "updateAuthorizationState" => {
            let state = frame.message.get("authorization_state")
                .and_then(|s| s.get("@type"))
                .and_then(|t| t.as_str())
                .and_then(AuthorizationState::from_type);
            match state {
                Some(state) => println!("[{now}] 🔐 {state}"),
                None        => println!("[{now}] 🔐 {kind}"),
            }
        }
        "updateNewMessage" => {
            let message = frame.message.get("message");
            let id   = message.and_then(|m| m.get("id")).cloned().unwrap_or_default();
            let text = message
                .and_then(|m| m.get("content"))
                .and_then(|c| c.get("text"))
                .and_then(|t| t.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            println!("[{now}] 📨 New message [id={id}]: {text}");
        }
        _ => println!("[{now}] ⚙️  {kind}"),
    }
}

// ─── Credentials from stdin ───────────────────────────────────────────────────

struct Prompt;

impl Credentials for Prompt {
    fn phone_number(&mut self) -> io::Result<String> {
        prompt("📱 Phone number (international format): ")
    }

    fn code(&mut self) -> io::Result<String> {
        prompt("Enter the code you received: ")
    }

    fn password(&mut self, hint: Option<&str>) -> io::Result<String> {
        prompt(&format!("2FA password (hint: {}): ", hint.unwrap_or("(no hint)")))
    }
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
