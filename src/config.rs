//! Configuration: built-in defaults, JSON/YAML file loading, dotted `--set key.path=value`
//! overrides, and canonical hashing for the reproducibility manifest.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, mark};

/// Build the built-in default configuration as a JSON value, mirroring the parameter defaults
/// scattered across the strategy/postprocess/orchestrator modules so `--dump-effective-config`
/// has one place to read them from.
pub fn defaults() -> Value {
    serde_json::json!({
        "strategy": "silence",
        "silence": {"threshold_db": -30.0, "min_silence_sec": 0.5},
        "energy": {
            "frame_ms": 30, "hop_ms": 10, "smooth_ms": 100,
            "threshold_rms": 0.02, "min_speech_sec": 0.20, "min_silence_sec": 0.35
        },
        "vad": {
            "aggressiveness": 2, "frame_ms": 30, "sample_rate": 16000,
            "min_speech_sec": 0.20, "min_silence_sec": 0.35
        },
        "postprocess": {
            "pad_sec": 0.0, "min_seg_sec": 0.2, "max_seg_sec": 30.0,
            "low_energy_threshold": 0.01, "strict_isolated_short": false
        },
        "auto_strategy": {
            "enabled": false,
            "order": ["silence", "vad", "energy"],
            "min_segments": 2,
            "min_speech_total_sec": 3.0,
            "max_speech_ratio": 0.9
        },
        "validate": {"strict": false, "max_errors": 0},
        "export": {"timeline": false, "csv": false, "mask": false, "mask_bin_ms": 1000},
    })
}

/// Load a JSON or YAML configuration file, selected by extension.
pub fn load_file(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| mark(ErrorKind::Config, anyhow::anyhow!("failed to read {}: {e}", path.display())))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "json" => serde_json::from_str(&text)
            .map_err(|e| mark(ErrorKind::Config, anyhow::anyhow!("invalid JSON config: {e}"))),
        "yaml" | "yml" => serde_yaml::from_str(&text)
            .map_err(|e| mark(ErrorKind::Config, anyhow::anyhow!("invalid YAML config: {e}"))),
        other => Err(mark(
            ErrorKind::Config,
            anyhow::anyhow!("unsupported config file extension: {other:?}"),
        )),
    }
}

/// Deep-merge `overlay` into `base`, `overlay` winning on scalar conflicts.
pub fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                merge(base_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

/// Auto-type a `--set` value: case-insensitive `true`/`false` to bool, an optionally
/// `-`-prefixed all-digit string to an integer, else attempt a float parse, else the string.
pub fn autotype(raw: &str) -> Value {
    let lower = raw.to_ascii_lowercase();
    if lower == "true" {
        return Value::Bool(true);
    }
    if lower == "false" {
        return Value::Bool(false);
    }
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// Apply one `dotted.key=value` override onto `config`, auto-typing `value`.
pub fn set_nested_value(config: &mut Value, dotted_key: &str, raw_value: &str) -> Result<()> {
    let typed = autotype(raw_value);
    let parts: Vec<&str> = dotted_key.split('.').collect();
    if parts.is_empty() {
        bail!("empty --set key");
    }

    let mut cursor = config;
    for part in &parts[..parts.len() - 1] {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        cursor = cursor
            .as_object_mut()
            .unwrap()
            .entry(part.to_string())
            .or_insert(Value::Object(Map::new()));
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Map::new());
    }
    cursor
        .as_object_mut()
        .unwrap()
        .insert(parts[parts.len() - 1].to_string(), typed);
    Ok(())
}

/// Canonicalize `config` (sorted keys, compact separators) and return its JSON text, matching
/// `json.dumps(config, sort_keys=True, separators=(",", ":"))`.
pub fn canonicalize(config: &Value) -> String {
    fn to_sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.iter().map(|(k, v)| (k.clone(), to_sorted(v))).collect();
                let mut out = Map::new();
                for (k, v) in sorted {
                    out.insert(k, v);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(to_sorted).collect()),
            other => other.clone(),
        }
    }

    let sorted = to_sorted(config);
    serde_json::to_string(&sorted).expect("canonical JSON serialization cannot fail")
}

/// SHA-256 over the canonical JSON of `config`, hex-encoded.
pub fn compute_config_hash(config: &Value) -> String {
    let canonical = canonicalize(config);
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build the fully merged, effective configuration: defaults < file < `--set` overrides.
pub fn build_effective(
    file_path: Option<&Path>,
    overrides: &[(String, String)],
) -> Result<Value> {
    let mut config = defaults();

    if let Some(path) = file_path {
        let from_file = load_file(path)?;
        merge(&mut config, &from_file);
    }

    for (key, value) in overrides {
        set_nested_value(&mut config, key, value)
            .with_context(|| format!("failed to apply --set {key}={value}"))?;
    }

    Ok(config)
}
