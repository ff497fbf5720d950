//! `ledgerbridge chat` — Interactive session over a fixture directory.
//!
//! Each line is one turn. The assembled context is printed where an LLM
//! answer would go, so routing and follow-up behaviour can be watched turn
//! by turn. Ctrl+C cancels the turn in flight.

use ledgerbridge_context::ContextAssembler;
use ledgerbridge_context::session_keys::CREATED_AT;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::pipeline;

pub async fn run(config_path: Option<&Path>, data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = pipeline::load_config(config_path)?;
    let assembler = pipeline::build(&config, data_dir)?;
    let mut session_id = uuid::Uuid::new_v4().to_string();

    println!();
    println!("  LedgerBridge — Interactive Mode");
    println!();
    println!("  Data:      {}", data_dir.display());
    println!("  Session:   {session_id}");
    println!("  Budget:    {} tokens", config.truncation.max_context_tokens);
    println!();
    println!("  Commands:  /clear  /stats  /sessions  /quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => {
                assembler.clear_session(&session_id);
                session_id = uuid::Uuid::new_v4().to_string();
                println!("  Session cleared. New session: {session_id}");
            }
            "/stats" => print_stats(&assembler),
            "/sessions" => print_sessions(&assembler),
            message => turn(&assembler, &session_id, message).await,
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

async fn turn(assembler: &ContextAssembler, session_id: &str, message: &str) {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let context = assembler.prepare_turn(session_id, message, &cancel).await;
    interrupt.abort();

    println!();
    println!(
        "  [rule: {:?}, domains: {}]",
        context.rule,
        context
            .domains
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    for line in context.render().lines() {
        println!("  {line}");
    }
    if !context.metadata.drops.is_empty() {
        println!(
            "  [trimmed to ~{} / {} tokens]",
            context.metadata.total_tokens, context.metadata.budget
        );
    }
    println!();

    if let Err(e) = assembler.finish_turn(&context, None) {
        eprintln!("  [Error] {e}");
    }
}

fn print_stats(assembler: &ContextAssembler) {
    let cache = assembler.accounting().stats();
    let sessions = assembler.sessions().stats();
    println!(
        "  Cache:     {} hits / {} lookups ({:.0}%), {} entries",
        cache.hits,
        cache.total,
        cache.hit_rate * 100.0,
        cache.entries
    );
    println!(
        "  Sessions:  {} live, {} keys",
        sessions.sessions, sessions.keys
    );
}

fn print_sessions(assembler: &ContextAssembler) {
    let sessions = assembler.sessions().list_sessions(CREATED_AT);
    if sessions.is_empty() {
        println!("  No live sessions.");
        return;
    }
    for info in sessions {
        println!(
            "  {}  keys={}  expires_in={}s  created={}",
            info.session_id,
            info.key_count,
            info.remaining_secs,
            info.created_at.as_deref().unwrap_or("-")
        );
    }
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
