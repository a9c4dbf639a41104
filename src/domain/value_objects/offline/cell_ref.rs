use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A1 形式のセル参照（列は英字、行は 1 始まりの数字）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef(String);

impl CellRef {
    const MAX_COLUMN_LETTERS: usize = 3;

    pub fn new(value: String) -> Result<Self, String> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(value: &str) -> Result<(), String> {
        let split = value
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| format!("Invalid cell reference: {value}"))?;
        let (column, row) = value.split_at(split);

        if column.is_empty()
            || column.len() > Self::MAX_COLUMN_LETTERS
            || !column.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(format!("Invalid cell reference: {value}"));
        }
        if row.is_empty() || row.starts_with('0') || !row.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid cell reference: {value}"));
        }
        Ok(())
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CellRef> for String {
    fn from(cell: CellRef) -> Self {
        cell.0
    }
}

impl TryFrom<String> for CellRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_validates() {
        assert_eq!(CellRef::new(" b12 ".into()).unwrap().as_str(), "B12");
        assert_eq!(CellRef::new("AAA1".into()).unwrap().as_str(), "AAA1");

        for invalid in ["", "12", "A", "A0", "AAAA1", "A1B", "1A"] {
            assert!(CellRef::new(invalid.into()).is_err(), "{invalid} accepted");
        }
    }
}
