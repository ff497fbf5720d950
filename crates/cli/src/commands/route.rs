//! `ledgerbridge route` — Show the routing decision for a message.

use ledgerbridge_context::DomainRouter;
use ledgerbridge_context::session_keys::LAST_DOMAINS_LOADED;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::pipeline;

pub fn run(
    config_path: Option<&Path>,
    message: &str,
    last: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let config = pipeline::load_config(config_path)?;
    let router = DomainRouter::new(&config.routing);

    let mut memory = HashMap::new();
    if !last.is_empty() {
        memory.insert(
            LAST_DOMAINS_LOADED.to_string(),
            Value::Array(last.iter().cloned().map(Value::String).collect()),
        );
    }

    let decision = router.route_explained(message, &memory);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
