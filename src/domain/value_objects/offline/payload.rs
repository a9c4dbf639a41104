use super::{CellRef, EditType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 編集内容。ドキュメントはフルスナップショット、スプレッドシートはセル単位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditPayload {
    Content {
        content: String,
    },
    Title {
        title: String,
    },
    Cell {
        cell_ref: CellRef,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formula: Option<String>,
    },
}

impl EditPayload {
    pub fn content(content: impl Into<String>) -> Self {
        EditPayload::Content {
            content: content.into(),
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        EditPayload::Title {
            title: title.into(),
        }
    }

    pub fn cell(cell_ref: CellRef, value: Value, formula: Option<String>) -> Self {
        EditPayload::Cell {
            cell_ref,
            value,
            formula,
        }
    }

    /// ペイロードから決まる編集種別
    pub fn edit_type(&self) -> EditType {
        match self {
            EditPayload::Content { .. } => EditType::Content,
            EditPayload::Title { .. } => EditType::Title,
            EditPayload::Cell { formula: None, .. } => EditType::Cell,
            EditPayload::Cell {
                formula: Some(_), ..
            } => EditType::Formula,
        }
    }

    pub fn to_json_string(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("Failed to encode edit payload: {e}"))
    }

    pub fn from_json_str(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid edit payload: {e}"))
    }
}
