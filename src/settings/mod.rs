use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Persisted mapping of which physical controller backs which axis label.
/// Field names match the historical on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSerials {
    #[serde(rename = "serialX")]
    pub serial_x: String,
    #[serde(rename = "serialY")]
    pub serial_y: String,
}

/// A serial identifier is exactly eight ASCII digits.
pub fn is_valid_serial(serial: &str) -> bool {
    serial.len() == 8 && serial.chars().all(|c| c.is_ascii_digit())
}

impl SavedSerials {
    pub fn validate(&self) -> anyhow::Result<()> {
        for serial in [&self.serial_x, &self.serial_y] {
            if !is_valid_serial(serial) {
                anyhow::bail!("Invalid serial number: {:?}", serial);
            }
        }
        Ok(())
    }
}

pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<SavedSerials> {
    let raw = tokio::fs::read_to_string(path.as_ref()).await?;
    let saved: SavedSerials = serde_json::from_str(&raw)?;
    saved.validate()?;
    Ok(saved)
}

pub async fn save(path: impl AsRef<Path>, serials: &SavedSerials) -> anyhow::Result<()> {
    serials.validate()?;
    let raw = serde_json::to_string_pretty(serials)?;
    tokio::fs::write(path.as_ref(), raw).await?;
    info!("Saved serial numbers to {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_format() {
        assert!(is_valid_serial("29251927"));
        assert!(!is_valid_serial("2925192"));
        assert!(!is_valid_serial("292519270"));
        assert!(!is_valid_serial("2925192a"));
        assert!(!is_valid_serial(""));
    }

    #[test]
    fn test_parses_historical_field_names() {
        let raw = r#"{"serialX": "29251927", "serialY": "29251900"}"#;
        let saved: SavedSerials = serde_json::from_str(raw).unwrap();
        assert_eq!(saved.serial_x, "29251927");
        assert_eq!(saved.serial_y, "29251900");
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved_serial_numbers.json");

        let serials = SavedSerials {
            serial_x: "29251927".to_string(),
            serial_y: "29251900".to_string(),
        };
        save(&path, &serials).await.unwrap();

        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded, serials);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_serials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved_serial_numbers.json");
        tokio::fs::write(&path, r#"{"serialX": "abc", "serialY": "29251900"}"#)
            .await
            .unwrap();

        assert!(load(&path).await.is_err());
    }
}
