use super::FileType;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditType {
    Content,
    Title,
    Cell,
    Formula,
}

impl EditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditType::Content => "content",
            EditType::Title => "title",
            EditType::Cell => "cell",
            EditType::Formula => "formula",
        }
    }

    /// フルスナップショットを送る種別（同一ファイル内で後勝ち）
    pub fn is_snapshot(&self) -> bool {
        matches!(self, EditType::Content | EditType::Title)
    }

    pub fn applies_to(&self, file_type: FileType) -> bool {
        match self {
            EditType::Content => file_type == FileType::Document,
            EditType::Cell | EditType::Formula => file_type == FileType::Spreadsheet,
            EditType::Title => true,
        }
    }
}

impl fmt::Display for EditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EditType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(EditType::Content),
            "title" => Ok(EditType::Title),
            "cell" => Ok(EditType::Cell),
            "formula" => Ok(EditType::Formula),
            other => Err(format!("Unknown edit type: {other}")),
        }
    }
}
