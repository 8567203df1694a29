use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An architecture entity in the catalog. Owned by the backend; this crate
/// only reads it. Fields the client does not know about are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub card_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Envelope returned by `GET /cards`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardList {
    pub data: Vec<Card>,
    #[serde(default)]
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_card_list_keeps_unknown_fields() {
        let list: CardList = serde_json::from_value(json!({
            "data": [
                {
                    "id": "c1",
                    "name": "Billing API",
                    "type": "Application",
                    "lifecyclePhase": "Active",
                    "tags": ["payments"],
                    "qualityScore": 87
                }
            ],
            "total": 1
        }))
        .unwrap();

        assert_eq!(list.total, 1);
        let card = &list.data[0];
        assert_eq!(card.card_type, "Application");
        assert_eq!(card.lifecycle_phase.as_deref(), Some("Active"));
        assert_eq!(card.extra["qualityScore"], json!(87));
    }
}
