use super::{emit_json, read_script};
use crate::advisor::{suggest_with_fallback, AdviceRequest};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(script_path: &Path, symbol: &str, timeframe: &str) -> Result<()> {
    let request = AdviceRequest {
        script: read_script(script_path)?,
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
    };
    let suggestions = suggest_with_fallback(None, &request);
    info!("{} parameter suggestions", suggestions.len());
    emit_json(&serde_json::json!({ "suggestions": suggestions }), None)
}
