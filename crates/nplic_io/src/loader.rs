use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::parser::{Script, parse_script};

/// Loads and parses a scenario script.
pub fn load_script<P: AsRef<Path>>(path: P) -> Result<Script> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to open script {}", path.display()))?;
    parse_script(&text).with_context(|| format!("Invalid script {}", path.display()))
}
