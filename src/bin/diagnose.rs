use olympiad_client::api::ApiClient;
use olympiad_client::config::{ClientConfig, CONFIG_PATH_ENV};
use olympiad_client::models::User;
use olympiad_client::storage::{Stored, TOKEN_KEY, USER_KEY};
use olympiad_client::user;
use reqwest::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Olympiad client - Diagnostics Tool");
    println!("=====================================");
    println!();

    let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.json".to_string());
    let config = ClientConfig::load(&config_path)?;

    println!("🌐 Backend: {}", config.backend.url);
    println!("💾 Session store: {}", config.storage.path);
    println!();

    // Test 1: backend reachability
    println!("Test 1: Checking backend...");
    let client = Client::new();
    match client
        .get(format!("{}/_health", config.backend.url))
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            println!("✅ Backend is reachable (status {})", response.status());
        }
        Ok(response) => {
            println!("⚠️  Backend answered with status {}", response.status());
        }
        Err(e) => {
            println!("❌ Backend is not reachable: {}", e);
            return Ok(());
        }
    }
    println!();

    // Test 2: stored session
    println!("Test 2: Checking stored session...");
    let api = ApiClient::from_config(&config);
    let storage = api.storage();
    println!("   Keys: {:?}", storage.keys());

    let stored_user = match storage.get::<User>(USER_KEY) {
        Some(Stored::Decoded(user)) => {
            println!("✅ Stored user: {} <{}> ({:?})", user.name(), user.email, user.role_type);
            Some(user)
        }
        Some(Stored::Raw(raw)) => {
            let preview: String = raw.chars().take(40).collect();
            println!("❌ Stored user is not valid: {}", preview);
            None
        }
        None => {
            println!("ℹ️  No stored user");
            None
        }
    };

    let token = storage.get::<String>(TOKEN_KEY).map(Stored::into_string);
    match &token {
        Some(token) => println!("🔑 Token: {}...", token.chars().take(10).collect::<String>()),
        None => println!("ℹ️  No stored token"),
    }
    println!();

    if token.is_none() {
        return Ok(());
    }

    // Test 3: token validity
    println!("Test 3: Verifying token against backend...");
    match user::fetch_me(&api).await {
        Ok(me) => {
            println!("✅ Token is valid for user {}", me.id);
            if let Some(stored) = stored_user {
                if stored != me {
                    println!("⚠️  Stored user differs from backend profile; run `whoami --refresh`");
                }
            }
        }
        Err(e) => println!("❌ Token rejected: {}", e),
    }

    Ok(())
}
