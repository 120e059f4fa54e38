use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Entity classes reconciled into the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexType {
    #[serde(rename = "recipes")]
    Recipes,
    #[serde(rename = "meals")]
    Meals,
    #[serde(rename = "valid_ingredients")]
    ValidIngredients,
    #[serde(rename = "valid_instruments")]
    ValidInstruments,
    #[serde(rename = "valid_preparations")]
    ValidPreparations,
    #[serde(rename = "valid_measurement_units")]
    ValidMeasurementUnits,
    #[serde(rename = "valid_ingredient_states")]
    ValidIngredientStates,
    #[serde(rename = "valid_vessels")]
    ValidVessels,
    #[serde(rename = "users")]
    Users,
    #[serde(rename = "valid_ingredient_measurement_units")]
    ValidIngredientMeasurementUnits,
    #[serde(rename = "valid_measurement_unit_conversions")]
    ValidMeasurementUnitConversions,
    #[serde(rename = "valid_preparation_instruments")]
    ValidPreparationInstruments,
    #[serde(rename = "valid_ingredient_preparations")]
    ValidIngredientPreparations,
}

impl IndexType {
    pub const ALL: [IndexType; 13] = [
        IndexType::Recipes,
        IndexType::Meals,
        IndexType::ValidIngredients,
        IndexType::ValidInstruments,
        IndexType::ValidPreparations,
        IndexType::ValidMeasurementUnits,
        IndexType::ValidIngredientStates,
        IndexType::ValidVessels,
        IndexType::Users,
        IndexType::ValidIngredientMeasurementUnits,
        IndexType::ValidMeasurementUnitConversions,
        IndexType::ValidPreparationInstruments,
        IndexType::ValidIngredientPreparations,
    ];

    /// Wire name, also used as the index name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recipes => "recipes",
            Self::Meals => "meals",
            Self::ValidIngredients => "valid_ingredients",
            Self::ValidInstruments => "valid_instruments",
            Self::ValidPreparations => "valid_preparations",
            Self::ValidMeasurementUnits => "valid_measurement_units",
            Self::ValidIngredientStates => "valid_ingredient_states",
            Self::ValidVessels => "valid_vessels",
            Self::Users => "users",
            Self::ValidIngredientMeasurementUnits => "valid_ingredient_measurement_units",
            Self::ValidMeasurementUnitConversions => "valid_measurement_unit_conversions",
            Self::ValidPreparationInstruments => "valid_preparation_instruments",
            Self::ValidIngredientPreparations => "valid_ingredient_preparations",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown index type: '{0}'")]
pub struct UnknownIndexType(pub String);

impl FromStr for IndexType {
    type Err = UnknownIndexType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        IndexType::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| UnknownIndexType(s.to_string()))
    }
}

/// Control message driving one reconciliation action.
///
/// `delete = false` means upsert. `any` carries a preserialized payload and
/// is ignored by the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRequest {
    #[serde(rename = "rowID")]
    pub row_id: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
    #[serde(default)]
    pub delete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<serde_json::Value>,
}

impl IndexRequest {
    pub fn upsert(row_id: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            row_id: row_id.into(),
            index_type,
            delete: false,
            any: None,
        }
    }

    pub fn delete(row_id: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            delete: true,
            ..Self::upsert(row_id, index_type)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_type_names_match_serde() {
        for index_type in IndexType::ALL {
            assert_eq!(
                serde_json::to_value(index_type).unwrap(),
                json!(index_type.as_str())
            );
            assert_eq!(index_type.as_str().parse::<IndexType>().unwrap(), index_type);
        }
    }

    #[test]
    fn test_index_type_parse_unknown() {
        assert!("webhooks".parse::<IndexType>().is_err());
    }

    #[test]
    fn test_index_request_wire_shape() {
        let request = IndexRequest::upsert("r1", IndexType::Recipes);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"rowID": "r1", "type": "recipes", "delete": false})
        );
    }

    #[test]
    fn test_index_request_delete_defaults_to_false() {
        let request: IndexRequest =
            serde_json::from_value(json!({"rowID": "u1", "type": "users"})).unwrap();
        assert_eq!(request, IndexRequest::upsert("u1", IndexType::Users));
    }

    #[test]
    fn test_index_request_keeps_any_payload() {
        let request: IndexRequest = serde_json::from_value(
            json!({"rowID": "m1", "type": "meals", "delete": true, "any": {"k": 1}}),
        )
        .unwrap();
        assert!(request.delete);
        assert_eq!(request.any, Some(json!({"k": 1})));
    }
}
