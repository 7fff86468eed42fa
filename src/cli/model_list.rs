//! Model listing functionality
//!
//! Lists the models a provider offers, newest first.

use chrono::DateTime;
use std::error::Error;

use crate::api::models::{fetch_models, sort_models};
use crate::core::config::Config;
use crate::core::providers::resolve_session;

pub async fn list_models(provider: Option<String>) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let session = resolve_session(&config, provider.as_deref())?;

    let client = reqwest::Client::new();
    let mut response = fetch_models(
        &client,
        &session.base_url,
        &session.api_key,
        &session.provider_id,
    )
    .await?;
    sort_models(&mut response.data);

    println!("Available models for {}", session.provider_display_name);
    if let Some(default_model) = config.get_default_model(&session.provider_id) {
        println!("Default model: {default_model} (from config)");
    }
    println!();

    for model in &response.data {
        let when = model
            .created
            .and_then(|epoch| DateTime::from_timestamp(epoch as i64, 0))
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .or_else(|| model.created_at.clone());

        match when {
            Some(when) => println!("  {:<44} {when}", model.id),
            None => println!("  {}", model.id),
        }
    }

    println!();
    println!("{} models", response.data.len());
    Ok(())
}
