//! `ledgerbridge ask` — Assemble context for one message.

use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::pipeline;

pub async fn run(
    config_path: Option<&Path>,
    data_dir: &Path,
    session: Option<String>,
    message: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = pipeline::load_config(config_path)?;
    let assembler = pipeline::build(&config, data_dir)?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let cancel = CancellationToken::new();
    let context = assembler.prepare_turn(&session_id, message, &cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&context)?);
    } else {
        print!("{}", context.render());
        eprintln!(
            "  [{} rows, ~{} / {} tokens, rule: {:?}]",
            context.record_count(),
            context.metadata.total_tokens,
            context.metadata.budget,
            context.rule
        );
    }

    assembler.finish_turn(&context, None)?;
    Ok(())
}
