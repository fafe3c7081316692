//! `.env` file persistence
//!
//! Only the keys being written are touched; comments, ordering and other
//! entries are preserved.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// `.env` in the current working directory
pub fn default_path() -> PathBuf {
    PathBuf::from(".env")
}

/// Parse an existing `.env` file; a missing file is empty
pub fn read(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.with_context(|| format!("Failed to parse {}", path.display()))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

/// Set `key=value`, replacing an existing assignment or appending a new line
pub fn upsert(path: &Path, key: &str, value: &str) -> Result<()> {
    let existing = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };

    let prefix = format!("{}=", key);
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let bare = line.trim_start();
            let bare = bare.strip_prefix("export ").unwrap_or(bare);
            if !replaced && bare.starts_with(&prefix) {
                replaced = true;
                format!("{}={}", key, value)
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(format!("{}={}", key, value));
    }

    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::debug!(key, path = %path.display(), replaced, "Updated .env entry");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        upsert(&path, "WALLET_PRIVATE_KEY", "0xabc").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "WALLET_PRIVATE_KEY=0xabc\n");
    }

    #[test]
    fn test_upsert_replaces_existing_line_and_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# keys\nANTHROPIC_API_KEY=sk-ant\nWALLET_PRIVATE_KEY=0xold\nDEBUG=false\n",
        )
        .unwrap();

        upsert(&path, "WALLET_PRIVATE_KEY", "0xnew").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# keys\nANTHROPIC_API_KEY=sk-ant\nWALLET_PRIVATE_KEY=0xnew\nDEBUG=false\n"
        );
    }

    #[test]
    fn test_upsert_appends_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "OPENAI_API_KEY=sk-test").unwrap();

        upsert(&path, "WALLET_PRIVATE_KEY", "0x01").unwrap();

        let vars = read(&path).unwrap();
        assert_eq!(vars.get("OPENAI_API_KEY").map(String::as_str), Some("sk-test"));
        assert_eq!(vars.get("WALLET_PRIVATE_KEY").map(String::as_str), Some("0x01"));
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join(".env")).unwrap().is_empty());
    }
}
