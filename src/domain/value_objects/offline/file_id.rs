use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// リモート側ファイル（ドキュメント・スプレッドシート等）の識別子
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    const MAX_LENGTH: usize = 256;

    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("File ID cannot be empty".to_string());
        }
        if value.len() > Self::MAX_LENGTH {
            return Err(format!(
                "File ID too long (max {} characters)",
                Self::MAX_LENGTH
            ));
        }
        Ok(())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl TryFrom<String> for FileId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for FileId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_ids() {
        assert!(FileId::new("   ".into()).is_err());
        assert!(FileId::new("x".repeat(257)).is_err());
        assert_eq!(FileId::new("doc-1".into()).unwrap().as_str(), "doc-1");
    }

    #[test]
    fn deserialization_runs_validation() {
        assert!(serde_json::from_str::<FileId>("\"\"").is_err());
        let id: FileId = serde_json::from_str("\"file-42\"").unwrap();
        assert_eq!(id.to_string(), "file-42");
    }
}
