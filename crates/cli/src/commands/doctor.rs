//! `touchline doctor` — Diagnose configuration and upstream services.

use std::path::Path;
use std::sync::Arc;
use touchline_config::AppConfig;
use touchline_core::provider::Provider;
use touchline_tools::{GoogleSearchBackend, SearchClient};

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Touchline Doctor — System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    let default_path = AppConfig::config_dir().join("config.toml");
    let path = config_path.unwrap_or(&default_path);
    if !path.exists() {
        println!("  ⚠️  No config file at {} — using defaults", path.display());
    }
    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue found. Fix the config and run again.");
            return Ok(());
        }
    };

    let missing = config.missing_credentials();
    for credential in ["GOOGLE_API_KEY", "GOOGLE_CUSTOM_SEARCH_API_KEY", "GOOGLE_CUSTOM_SEARCH_ENGINE_ID"] {
        if missing.contains(&credential) {
            println!("  ⚠️  {credential} not set");
            issues += 1;
        } else {
            println!("  ✅ {credential} set");
        }
    }

    let provider = touchline_providers::build_from_config(&config.llm);
    match provider.health_check().await {
        Ok(true) => println!("  ✅ Language model reachable ({} / {})", provider.name(), config.llm.model),
        Ok(false) => {
            println!("  ⚠️  Language model not available ({})", provider.name());
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Language model check failed: {e}");
            issues += 1;
        }
    }

    if config.search.is_configured() {
        let backend = Arc::new(GoogleSearchBackend::from_config(&config.search)?);
        let search = SearchClient::new(backend, &config.search);
        match search.search("premier league table").await {
            Ok(outcome) => println!(
                "  ✅ Web search reachable ({} results)",
                outcome.sources.len()
            ),
            Err(e) => {
                println!("  ❌ Web search failed: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  Web search skipped: credentials missing");
    }

    match touchline_memory::build_from_config(&config.session).await {
        Ok(store) => {
            let count = store.len().await.unwrap_or_default();
            println!("  ✅ Session store '{}' ready ({count} conversations)", store.name());
            store.teardown().await?;
        }
        Err(e) => {
            println!("  ❌ Session store failed: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
