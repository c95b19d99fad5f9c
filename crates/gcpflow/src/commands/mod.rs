pub mod cluster;
pub mod config;
pub mod disk;
pub mod instance;
pub mod nodepool;

use gcpflow_cloud::{Location, NodeTaint, TaintEffect};
use gcpflow_core::OperationDispatcher;
use std::collections::BTreeMap;

/// `key=value` 形式の引数をパース
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("key=value 形式で指定してください: {}", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("キーが空です: {}", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// `key=value[:EFFECT]` 形式の taint をパース（EFFECT 省略時は NO_SCHEDULE）
pub fn parse_taint(s: &str) -> Result<NodeTaint, String> {
    let (pair, effect) = match s.split_once(':') {
        Some((pair, effect)) => (
            pair,
            effect
                .trim()
                .parse::<TaintEffect>()
                .map_err(|e| e.to_string())?,
        ),
        None => (s, TaintEffect::default()),
    };
    let (key, value) = parse_key_val(pair)?;
    Ok(NodeTaint::new(key, value, effect))
}

pub fn into_map(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().collect()
}

/// 指定がなければデフォルトロケーション
pub fn location_or_default(dispatcher: &OperationDispatcher, raw: Option<String>) -> Location {
    match raw.filter(|s| !s.trim().is_empty()) {
        Some(raw) => Location::resolve(raw.trim()),
        None => dispatcher.default_location().clone(),
    }
}
