//! `ledgerbridge extract` — Show entities found in a message.

use ledgerbridge_context::EntityExtractor;
use std::path::Path;

use crate::pipeline;

pub fn run(config_path: Option<&Path>, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = pipeline::load_config(config_path)?;
    let entities = EntityExtractor::new(&config.extraction).extract(message);
    println!("{}", serde_json::to_string_pretty(&entities)?);
    Ok(())
}
