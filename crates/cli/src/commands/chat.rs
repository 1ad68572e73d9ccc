//! `touchline chat` — Interactive or single-message chat in this process.

use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use touchline_agent::TurnOutcome;

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    let missing = config.missing_credentials();
    if !missing.is_empty() {
        eprintln!();
        eprintln!("  Running degraded, not set: {}", missing.join(", "));
        eprintln!("  Put them in the environment or a .env file in this directory.");
        eprintln!();
    }

    let orchestrator = touchline_gateway::build_orchestrator(&config).await?;
    let welcome = orchestrator.chat(None, "").await?;
    let id = welcome.conversation_id.clone();

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = orchestrator.chat(Some(&id), &msg).await?;
        eprint!("\r              \r");
        print_outcome(&outcome);
    } else {
        // Interactive mode
        println!();
        println!("  ╔══════════════════════════════════════════════╗");
        println!("  ║        Touchline — Interactive Mode          ║");
        println!("  ╚══════════════════════════════════════════════╝");
        println!();
        println!("  Model:     {} ({})", config.llm.model, config.llm.provider);
        println!("  Search:    {}", if config.search.is_configured() { "on" } else { "off" });
        println!("  Type 'exit' or Ctrl+D to quit.");
        println!();
        print_outcome(&welcome);

        prompt()?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if matches!(line, "exit" | "quit") {
                break;
            }
            if line.is_empty() {
                prompt()?;
                continue;
            }

            eprint!("  ...");
            let result = orchestrator.chat(Some(&id), line).await;
            eprint!("\r     \r");
            match result {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => {
                    eprintln!("  [Error] {e}");
                    println!();
                }
            }
            prompt()?;
        }

        println!();
        println!("  Goodbye! 👋");
        println!();
    }

    orchestrator.store().teardown().await?;
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_outcome(outcome: &TurnOutcome) {
    for turn in &outcome.messages {
        let agent = turn.agent.as_deref().unwrap_or("Touchline");
        println!();
        for line in turn.text.lines() {
            println!("  {agent} > {line}");
        }
        if let Some(decision) = turn.grounding.as_ref().filter(|d| !d.sources.is_empty()) {
            println!("  Sources ({}):", decision.reason.code());
            for source in &decision.sources {
                println!("    - {} <{}>", source.title, source.link);
            }
        }
    }
    if let Some(error) = &outcome.error {
        tracing::debug!(%error, "Turn not committed");
    }
    println!();
}

