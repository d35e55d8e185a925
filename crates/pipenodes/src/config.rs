//! Helpers for reading factory configuration values.

use pipecore::{AlgorithmError, Extent};
use piperuntime::AlgorithmConfig;

pub(crate) fn f64_or(config: &AlgorithmConfig, key: &str, default: f64) -> Result<f64, AlgorithmError> {
    match config.get(key) {
        None => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| {
            AlgorithmError::Configuration(format!("'{}' must be a number, got {}", key, value))
        }),
    }
}

pub(crate) fn i64_or(config: &AlgorithmConfig, key: &str, default: i64) -> Result<i64, AlgorithmError> {
    match config.get(key) {
        None => Ok(default),
        Some(value) => value.as_i64().ok_or_else(|| {
            AlgorithmError::Configuration(format!("'{}' must be an integer, got {}", key, value))
        }),
    }
}

/// An extent given either as `[a, b, c, d, e, f]` or as `"a,b,c,d,e,f"`.
pub(crate) fn extent(config: &AlgorithmConfig, key: &str) -> Result<Option<Extent>, AlgorithmError> {
    let Some(value) = config.get(key) else {
        return Ok(None);
    };
    let invalid = || {
        AlgorithmError::Configuration(format!("'{}' must be six integers, got {}", key, value))
    };
    match value {
        serde_json::Value::String(s) => s.parse::<Extent>().map(Some).map_err(|_| invalid()),
        serde_json::Value::Array(items) => {
            let values: Option<Vec<i64>> = items.iter().map(|v| v.as_i64()).collect();
            values
                .as_deref()
                .and_then(Extent::from_slice)
                .map(Some)
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extent_accepts_array_and_string() {
        let mut config = AlgorithmConfig::new();
        config.insert("a".to_string(), json!([0, 9, 0, 9, 0, 0]));
        config.insert("b".to_string(), json!("0,4,0,4,0,0"));
        config.insert("c".to_string(), json!([0, 1]));

        assert_eq!(extent(&config, "a").unwrap(), Some(Extent::new(0, 9, 0, 9, 0, 0)));
        assert_eq!(extent(&config, "b").unwrap(), Some(Extent::new(0, 4, 0, 4, 0, 0)));
        assert!(extent(&config, "c").is_err());
        assert_eq!(extent(&config, "missing").unwrap(), None);
    }

    #[test]
    fn test_numbers_with_defaults() {
        let mut config = AlgorithmConfig::new();
        config.insert("scale".to_string(), json!(2.5));
        config.insert("radius".to_string(), json!("wide"));

        assert_eq!(f64_or(&config, "scale", 1.0).unwrap(), 2.5);
        assert_eq!(f64_or(&config, "shift", 1.0).unwrap(), 1.0);
        assert!(i64_or(&config, "radius", 1).is_err());
    }
}
