use facegate_core::{DEFAULT_MAX_IMAGE_BYTES, DEFAULT_THRESHOLD};
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite template database.
    pub db_path: PathBuf,
    /// Directory containing the ONNX model file.
    pub model_dir: PathBuf,
    /// Model file name inside `model_dir`.
    pub model_file: String,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f64,
    /// Largest image accepted for extraction, in bytes.
    pub max_image_bytes: usize,
    /// Run one repair pass over all stored templates at startup.
    pub scan_on_startup: bool,
    /// Register on the system bus instead of the session bus.
    pub system_bus: bool,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let db_path = var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("templates.db"));

        let model_dir = var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("models"));

        Self {
            db_path,
            model_dir,
            model_file: var("FACEGATE_MODEL_FILE")
                .unwrap_or_else(|| facegate_models::DEFAULT_MODEL_FILE.to_string()),
            similarity_threshold: threshold(var("FACEGATE_SIMILARITY_THRESHOLD")),
            max_image_bytes: parsed(
                var("FACEGATE_MAX_IMAGE_BYTES"),
                DEFAULT_MAX_IMAGE_BYTES,
            ),
            scan_on_startup: flag(var("FACEGATE_SCAN_ON_STARTUP"), false),
            system_bus: flag(var("FACEGATE_SYSTEM_BUS"), false),
        }
    }

    /// Path to the feature extraction model.
    pub fn model_path(&self) -> String {
        self.model_dir
            .join(&self.model_file)
            .to_string_lossy()
            .into_owned()
    }
}

fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn flag(value: Option<String>, default: bool) -> bool {
    value.map(|v| v != "0").unwrap_or(default)
}

/// A cosine threshold outside [-1, 1] could never (or always) match.
fn threshold(value: Option<String>) -> f64 {
    let t = parsed(value, DEFAULT_THRESHOLD);
    if t.is_finite() && (-1.0..=1.0).contains(&t) {
        t
    } else {
        tracing::warn!(
            value = t,
            default = DEFAULT_THRESHOLD,
            "FACEGATE_SIMILARITY_THRESHOLD out of range; using default"
        );
        DEFAULT_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[("HOME", "/home/alice")]);
        assert_eq!(
            c.db_path,
            PathBuf::from("/home/alice/.local/share/facegate/templates.db")
        );
        assert_eq!(c.similarity_threshold, DEFAULT_THRESHOLD);
        assert_eq!(c.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
        assert!(!c.scan_on_startup);
        assert!(!c.system_bus);
        assert!(c.model_path().ends_with("facegate/models/face_feature.onnx"));
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("FACEGATE_DB_PATH", "/var/lib/facegate/t.db"),
            ("FACEGATE_MODEL_DIR", "/opt/models"),
            ("FACEGATE_MODEL_FILE", "arc.onnx"),
            ("FACEGATE_SIMILARITY_THRESHOLD", "0.6"),
            ("FACEGATE_MAX_IMAGE_BYTES", "1024"),
            ("FACEGATE_SCAN_ON_STARTUP", "1"),
            ("FACEGATE_SYSTEM_BUS", "1"),
        ]);
        assert_eq!(c.db_path, PathBuf::from("/var/lib/facegate/t.db"));
        assert_eq!(c.model_path(), "/opt/models/arc.onnx");
        assert_eq!(c.similarity_threshold, 0.6);
        assert_eq!(c.max_image_bytes, 1024);
        assert!(c.scan_on_startup);
        assert!(c.system_bus);
    }

    #[test]
    fn test_out_of_range_threshold_falls_back() {
        let c = config(&[("FACEGATE_SIMILARITY_THRESHOLD", "1.5")]);
        assert_eq!(c.similarity_threshold, DEFAULT_THRESHOLD);
        let c = config(&[("FACEGATE_SIMILARITY_THRESHOLD", "NaN")]);
        assert_eq!(c.similarity_threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_unparsable_values_use_defaults() {
        let c = config(&[("FACEGATE_MAX_IMAGE_BYTES", "lots")]);
        assert_eq!(c.max_image_bytes, DEFAULT_MAX_IMAGE_BYTES);
    }
}
