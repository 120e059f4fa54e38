//! Data-change routing.
//!
//! Turns `DataChangeMessage`s from the data-changes topic into index
//! requests on the indexing topic. Entity events index their own entity;
//! archive events delete it. User lifecycle events reindex the acting user.
//! With a [`WebhookFanout`] attached, each change also requests executions
//! of the household's webhooks.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::webhooks::WebhookFanout;
use super::{IndexRequest, IndexType};
use crate::bus::{BusError, JsonHandler, MessageHandler, Publisher};
use crate::types::{DataChangeMessage, ServiceEventType};

/// Errors from routing one data-change message.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("{event_type} event carries no entity payload")]
    MissingPayload { event_type: String },

    #[error("User event carries no user ID")]
    MissingUserId,

    #[error("Failed to publish index request: {0}")]
    Publish(#[source] BusError),
}

impl RouterError {
    /// Malformed messages are dropped; publish failures are retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::MissingPayload { .. } | Self::MissingUserId)
    }
}

impl From<RouterError> for BusError {
    fn from(e: RouterError) -> Self {
        if e.is_permanent() {
            BusError::Rejected(e.to_string())
        } else {
            BusError::Handler(e.to_string())
        }
    }
}

fn entity_id(event_type: &ServiceEventType, id: Option<&str>) -> Result<String, RouterError> {
    match id {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(RouterError::MissingPayload {
            event_type: event_type.to_string(),
        }),
    }
}

/// Maps each entity's created/updated/archived events to its index.
macro_rules! route_entity_events {
    ($message:expr; $($field:ident: $created:ident, $updated:ident, $archived:ident => $index:ident),+ $(,)?) => {
        match &$message.event_type {
            $(
                ServiceEventType::$created | ServiceEventType::$updated => Some((
                    IndexType::$index,
                    entity_id(
                        &$message.event_type,
                        $message.$field.as_ref().map(|e| e.id.as_str()),
                    )?,
                    false,
                )),
                ServiceEventType::$archived => Some((
                    IndexType::$index,
                    entity_id(
                        &$message.event_type,
                        $message.$field.as_ref().map(|e| e.id.as_str()),
                    )?,
                    true,
                )),
            )+
            _ => None,
        }
    };
}

/// The index request a data-change message calls for, if any.
pub fn index_request_for(message: &DataChangeMessage) -> Result<Option<IndexRequest>, RouterError> {
    use ServiceEventType as E;

    let user_event = match message.event_type {
        E::UserSignedUp
        | E::EmailAddressChanged
        | E::UsernameChanged
        | E::UserDetailsChanged
        | E::UserEmailAddressVerified => Some(false),
        E::UserArchived => Some(true),
        _ => None,
    };

    if let Some(delete) = user_event {
        let user_id = if message.user_id.is_empty() {
            message.user.as_ref().map(|u| u.id.clone()).unwrap_or_default()
        } else {
            message.user_id.clone()
        };
        if user_id.is_empty() {
            return Err(RouterError::MissingUserId);
        }
        return Ok(Some(IndexRequest {
            delete,
            ..IndexRequest::upsert(user_id, IndexType::Users)
        }));
    }

    let routed = route_entity_events!(message;
        recipe: RecipeCreated, RecipeUpdated, RecipeArchived => Recipes,
        meal: MealCreated, MealUpdated, MealArchived => Meals,
        valid_ingredient:
            ValidIngredientCreated, ValidIngredientUpdated, ValidIngredientArchived
            => ValidIngredients,
        valid_instrument:
            ValidInstrumentCreated, ValidInstrumentUpdated, ValidInstrumentArchived
            => ValidInstruments,
        valid_preparation:
            ValidPreparationCreated, ValidPreparationUpdated, ValidPreparationArchived
            => ValidPreparations,
        valid_measurement_unit:
            ValidMeasurementUnitCreated, ValidMeasurementUnitUpdated, ValidMeasurementUnitArchived
            => ValidMeasurementUnits,
        valid_ingredient_state:
            ValidIngredientStateCreated, ValidIngredientStateUpdated, ValidIngredientStateArchived
            => ValidIngredientStates,
        valid_vessel: ValidVesselCreated, ValidVesselUpdated, ValidVesselArchived => ValidVessels,
        valid_ingredient_measurement_unit:
            ValidIngredientMeasurementUnitCreated,
            ValidIngredientMeasurementUnitUpdated,
            ValidIngredientMeasurementUnitArchived
            => ValidIngredientMeasurementUnits,
        valid_measurement_unit_conversion:
            ValidMeasurementUnitConversionCreated,
            ValidMeasurementUnitConversionUpdated,
            ValidMeasurementUnitConversionArchived
            => ValidMeasurementUnitConversions,
        valid_preparation_instrument:
            ValidPreparationInstrumentCreated,
            ValidPreparationInstrumentUpdated,
            ValidPreparationInstrumentArchived
            => ValidPreparationInstruments,
        valid_ingredient_preparation:
            ValidIngredientPreparationCreated,
            ValidIngredientPreparationUpdated,
            ValidIngredientPreparationArchived
            => ValidIngredientPreparations,
    );

    Ok(routed.map(|(index_type, row_id, delete)| IndexRequest {
        delete,
        ..IndexRequest::upsert(row_id, index_type)
    }))
}

/// Consumes data-change messages and publishes index requests.
pub struct DataChangeRouter {
    publisher: Arc<Publisher>,
    webhooks: Option<WebhookFanout>,
}

impl DataChangeRouter {
    /// `publisher` targets the indexing topic.
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self {
            publisher,
            webhooks: None,
        }
    }

    /// Also fan each change out to household webhooks.
    pub fn with_webhooks(mut self, webhooks: WebhookFanout) -> Self {
        self.webhooks = Some(webhooks);
        self
    }

    /// Route one message. Returns the published index request, if any.
    ///
    /// Webhook fan-out runs alongside and is best-effort: its failures are
    /// logged and never fail the message, so a redelivery cannot duplicate
    /// the index request.
    pub async fn route(
        &self,
        message: &DataChangeMessage,
    ) -> Result<Option<IndexRequest>, RouterError> {
        let (indexed, ()) = tokio::join!(
            self.request_indexing(message),
            self.request_webhooks(message)
        );
        indexed
    }

    async fn request_webhooks(&self, message: &DataChangeMessage) {
        let Some(webhooks) = &self.webhooks else {
            return;
        };
        match webhooks.fan_out(message).await {
            Ok(0) => {}
            Ok(count) => info!(
                event_type = %message.event_type,
                household_id = %message.household_id,
                count,
                "Requested webhook executions"
            ),
            Err(e) => warn!(event_type = %message.event_type, error = %e, "Webhook fan-out failed"),
        }
    }

    async fn request_indexing(
        &self,
        message: &DataChangeMessage,
    ) -> Result<Option<IndexRequest>, RouterError> {
        let Some(request) = index_request_for(message)? else {
            debug!(event_type = %message.event_type, "Event has no search representation");
            return Ok(None);
        };

        self.publisher
            .publish(&request)
            .await
            .map_err(RouterError::Publish)?;

        info!(
            event_type = %message.event_type,
            index_type = %request.index_type,
            row_id = %request.row_id,
            delete = request.delete,
            "Routed data change to search indexing"
        );
        Ok(Some(request))
    }

    /// Wrap this router as a bus handler for JSON-encoded data-change messages.
    pub fn handler(self: Arc<Self>) -> Arc<dyn MessageHandler> {
        Arc::new(JsonHandler::<DataChangeMessage, _>::new(
            move |message: DataChangeMessage| {
                let router = self.clone();
                async move {
                    router
                        .route(&message)
                        .await
                        .map(|_| ())
                        .map_err(BusError::from)
                }
            },
        ))
    }
}

/// Best-effort emitter of data-change messages for domain write paths.
#[derive(Clone)]
pub struct ChangeNotifier {
    publisher: Arc<Publisher>,
}

impl ChangeNotifier {
    /// `publisher` targets the data-changes topic.
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self { publisher }
    }

    /// Publish in the background. Failures are logged and never reach the
    /// caller.
    pub fn notify(&self, message: DataChangeMessage) -> JoinHandle<()> {
        self.publisher.publish_async(message)
    }
}
