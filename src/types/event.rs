use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{
    Meal, Recipe, User, ValidIngredient, ValidIngredientMeasurementUnit,
    ValidIngredientPreparation, ValidIngredientState, ValidInstrument, ValidMeasurementUnit,
    ValidMeasurementUnitConversion, ValidPreparation, ValidPreparationInstrument, ValidVessel,
};

macro_rules! service_event_types {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Event type carried by a [`DataChangeMessage`].
        ///
        /// Serialized as its snake_case wire name. Names this build does not
        /// know are preserved in `Other`.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum ServiceEventType {
            $($variant,)+
            Other(String),
        }

        impl ServiceEventType {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $name,)+
                    Self::Other(name) => name,
                }
            }
        }

        impl From<&str> for ServiceEventType {
            fn from(name: &str) -> Self {
                match name {
                    $($name => Self::$variant,)+
                    other => Self::Other(other.to_string()),
                }
            }
        }
    };
}

service_event_types! {
    UserSignedUp => "user_signed_up",
    UserArchived => "user_archived",
    EmailAddressChanged => "email_address_changed",
    UsernameChanged => "username_changed",
    UserDetailsChanged => "user_details_changed",
    UserEmailAddressVerified => "user_email_address_verified",
    UserLoggedIn => "user_logged_in",
    UserLoggedOut => "user_logged_out",
    PasswordChanged => "password_changed",
    TwoFactorSecretVerified => "two_factor_secret_verified",
    TwoFactorDeactivated => "two_factor_deactivated",
    TwoFactorSecretChanged => "two_factor_secret_changed",
    PasswordResetTokenCreated => "password_reset_token_created",
    PasswordResetTokenRedeemed => "password_reset_token_redeemed",
    UsernameReminderRequested => "username_reminder_requested",
    UserChangedActiveHousehold => "user_changed_active_household",
    UserEmailAddressVerificationEmailRequested => "user_email_address_verification_email_requested",
    HouseholdMemberRemoved => "household_member_removed",
    HouseholdMembershipPermissionsUpdated => "household_membership_permissions_updated",
    HouseholdOwnershipTransferred => "household_ownership_transferred",
    OAuth2ClientCreated => "oauth2_client_created",
    OAuth2ClientArchived => "oauth2_client_archived",

    RecipeCreated => "recipe_created",
    RecipeUpdated => "recipe_updated",
    RecipeArchived => "recipe_archived",
    MealCreated => "meal_created",
    MealUpdated => "meal_updated",
    MealArchived => "meal_archived",

    ValidIngredientCreated => "valid_ingredient_created",
    ValidIngredientUpdated => "valid_ingredient_updated",
    ValidIngredientArchived => "valid_ingredient_archived",
    ValidInstrumentCreated => "valid_instrument_created",
    ValidInstrumentUpdated => "valid_instrument_updated",
    ValidInstrumentArchived => "valid_instrument_archived",
    ValidPreparationCreated => "valid_preparation_created",
    ValidPreparationUpdated => "valid_preparation_updated",
    ValidPreparationArchived => "valid_preparation_archived",
    ValidMeasurementUnitCreated => "valid_measurement_unit_created",
    ValidMeasurementUnitUpdated => "valid_measurement_unit_updated",
    ValidMeasurementUnitArchived => "valid_measurement_unit_archived",
    ValidIngredientStateCreated => "valid_ingredient_state_created",
    ValidIngredientStateUpdated => "valid_ingredient_state_updated",
    ValidIngredientStateArchived => "valid_ingredient_state_archived",
    ValidVesselCreated => "valid_vessel_created",
    ValidVesselUpdated => "valid_vessel_updated",
    ValidVesselArchived => "valid_vessel_archived",

    ValidIngredientMeasurementUnitCreated => "valid_ingredient_measurement_unit_created",
    ValidIngredientMeasurementUnitUpdated => "valid_ingredient_measurement_unit_updated",
    ValidIngredientMeasurementUnitArchived => "valid_ingredient_measurement_unit_archived",
    ValidMeasurementUnitConversionCreated => "valid_measurement_unit_conversion_created",
    ValidMeasurementUnitConversionUpdated => "valid_measurement_unit_conversion_updated",
    ValidMeasurementUnitConversionArchived => "valid_measurement_unit_conversion_archived",
    ValidPreparationInstrumentCreated => "valid_preparation_instrument_created",
    ValidPreparationInstrumentUpdated => "valid_preparation_instrument_updated",
    ValidPreparationInstrumentArchived => "valid_preparation_instrument_archived",
    ValidIngredientPreparationCreated => "valid_ingredient_preparation_created",
    ValidIngredientPreparationUpdated => "valid_ingredient_preparation_updated",
    ValidIngredientPreparationArchived => "valid_ingredient_preparation_archived",
}

impl ServiceEventType {
    /// Account and membership events stay private to the platform; every
    /// other event may fire a household's webhooks.
    pub fn triggers_webhooks(&self) -> bool {
        !matches!(
            self,
            Self::UserSignedUp
                | Self::UserArchived
                | Self::TwoFactorSecretVerified
                | Self::TwoFactorDeactivated
                | Self::TwoFactorSecretChanged
                | Self::PasswordResetTokenCreated
                | Self::PasswordResetTokenRedeemed
                | Self::PasswordChanged
                | Self::EmailAddressChanged
                | Self::UsernameChanged
                | Self::UserDetailsChanged
                | Self::UsernameReminderRequested
                | Self::UserLoggedIn
                | Self::UserLoggedOut
                | Self::UserChangedActiveHousehold
                | Self::UserEmailAddressVerified
                | Self::UserEmailAddressVerificationEmailRequested
                | Self::HouseholdMemberRemoved
                | Self::HouseholdMembershipPermissionsUpdated
                | Self::HouseholdOwnershipTransferred
                | Self::OAuth2ClientCreated
                | Self::OAuth2ClientArchived
        )
    }
}

impl fmt::Display for ServiceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ServiceEventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServiceEventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

/// Event emitted by every write path.
///
/// At most one entity field is populated, matching the event type's domain.
/// User lifecycle events identify the user through `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChangeMessage {
    pub event_type: ServiceEventType,
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(rename = "householdID", default, skip_serializing_if = "String::is_empty")]
    pub household_id: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<Recipe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal: Option<Meal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_ingredient: Option<ValidIngredient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_instrument: Option<ValidInstrument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_preparation: Option<ValidPreparation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_measurement_unit: Option<ValidMeasurementUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_ingredient_state: Option<ValidIngredientState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_vessel: Option<ValidVessel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_ingredient_measurement_unit: Option<ValidIngredientMeasurementUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_measurement_unit_conversion: Option<ValidMeasurementUnitConversion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_preparation_instrument: Option<ValidPreparationInstrument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_ingredient_preparation: Option<ValidIngredientPreparation>,
}

impl DataChangeMessage {
    /// A message with no entity payload.
    pub fn new(event_type: ServiceEventType, user_id: impl Into<String>) -> Self {
        Self {
            event_type,
            user_id: user_id.into(),
            household_id: String::new(),
            context: HashMap::new(),
            user: None,
            recipe: None,
            meal: None,
            valid_ingredient: None,
            valid_instrument: None,
            valid_preparation: None,
            valid_measurement_unit: None,
            valid_ingredient_state: None,
            valid_vessel: None,
            valid_ingredient_measurement_unit: None,
            valid_measurement_unit_conversion: None,
            valid_preparation_instrument: None,
            valid_ingredient_preparation: None,
        }
    }

    pub fn with_household(mut self, household_id: impl Into<String>) -> Self {
        self.household_id = household_id.into();
        self
    }

    pub fn with_recipe(mut self, recipe: Recipe) -> Self {
        self.recipe = Some(recipe);
        self
    }

    pub fn with_meal(mut self, meal: Meal) -> Self {
        self.meal = Some(meal);
        self
    }

    pub fn with_valid_ingredient(mut self, valid_ingredient: ValidIngredient) -> Self {
        self.valid_ingredient = Some(valid_ingredient);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_value(ServiceEventType::ValidIngredientCreated).unwrap(),
            json!("valid_ingredient_created")
        );
        assert_eq!(
            ServiceEventType::from("recipe_archived"),
            ServiceEventType::RecipeArchived
        );
    }

    #[test]
    fn test_unknown_event_type_is_preserved() {
        let parsed: ServiceEventType = serde_json::from_value(json!("webhook_created")).unwrap();
        assert_eq!(parsed, ServiceEventType::Other("webhook_created".to_string()));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), json!("webhook_created"));
    }

    #[test]
    fn test_data_change_message_wire_shape() {
        let message = DataChangeMessage::new(ServiceEventType::RecipeCreated, "u1")
            .with_household("h1")
            .with_recipe(Recipe {
                id: "r1".to_string(),
                name: "Soup".to_string(),
                ..Default::default()
            });

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["eventType"], "recipe_created");
        assert_eq!(value["userID"], "u1");
        assert_eq!(value["householdID"], "h1");
        assert_eq!(value["recipe"]["id"], "r1");
        assert!(value.get("meal").is_none());
        assert!(value.get("context").is_none());
    }

    #[test]
    fn test_webhook_eligibility() {
        assert!(ServiceEventType::RecipeCreated.triggers_webhooks());
        assert!(ServiceEventType::MealArchived.triggers_webhooks());
        assert!(ServiceEventType::Other("meal_plan_created".to_string()).triggers_webhooks());
        assert!(!ServiceEventType::UserSignedUp.triggers_webhooks());
        assert!(!ServiceEventType::PasswordResetTokenCreated.triggers_webhooks());
        assert!(!ServiceEventType::OAuth2ClientArchived.triggers_webhooks());
    }

    #[test]
    fn test_data_change_message_survives_codec() {
        let created_at = Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 5).unwrap();
        let mut message = DataChangeMessage::new(ServiceEventType::ValidIngredientUpdated, "u1")
            .with_household("h1")
            .with_valid_ingredient(ValidIngredient {
                id: "i1".to_string(),
                name: "Whole milk".to_string(),
                plural_name: "Whole milks".to_string(),
                maximum_ideal_storage_temperature_in_celsius: Some(4.5),
                minimum_ideal_storage_temperature_in_celsius: Some(0.1),
                contains_dairy: true,
                is_liquid: true,
                created_at,
                last_updated_at: Some(created_at),
                ..Default::default()
            });
        message.context.insert("source".to_string(), json!("api"));
        message.context.insert("quantity".to_string(), json!(2.25));
        message.context.insert("tags".to_string(), json!(["dairy", "fridge"]));

        let decoded: DataChangeMessage = codec::decode(&codec::encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_data_change_message_decodes_minimal_payload() {
        let message: DataChangeMessage =
            serde_json::from_value(json!({"eventType": "user_signed_up", "userID": "u9"})).unwrap();
        assert_eq!(message.event_type, ServiceEventType::UserSignedUp);
        assert_eq!(message.user_id, "u9");
        assert!(message.recipe.is_none());
        assert!(message.household_id.is_empty());
    }
}
