//! Test utilities and mock implementations.
//!
//! This module provides mock implementations of core traits for testing
//! without requiring a database or a search cluster.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::indexing::IndexType;
use crate::search::{self, MemorySearch, SearchBackend, SearchError};
use crate::storage::{
    Result as StorageResult, SearchDataManager, StorageError, WebhookDataManager,
};
use crate::types::{
    Meal, Recipe, RecipeStep, RecipeStepIngredient, RecipeStepInstrument, User, ValidIngredient,
    ValidIngredientMeasurementUnit, ValidIngredientPreparation, ValidIngredientState,
    ValidInstrument, ValidMeasurementUnit, ValidMeasurementUnitConversion, ValidPreparation,
    ValidPreparationInstrument, ValidVessel, Webhook,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The recipe used across indexing tests: one step boiling water in a pot.
pub fn soup_recipe() -> Recipe {
    Recipe {
        id: "r1".to_string(),
        name: "Soup".to_string(),
        description: "warm".to_string(),
        steps: vec![RecipeStep {
            id: "s1".to_string(),
            index: 0,
            preparation: ValidPreparation {
                id: "p1".to_string(),
                name: "boil".to_string(),
                ..Default::default()
            },
            ingredients: vec![RecipeStepIngredient {
                id: "i1".to_string(),
                name: "water".to_string(),
                ..Default::default()
            }],
            instruments: vec![RecipeStepInstrument {
                id: "t1".to_string(),
                name: "pot".to_string(),
                ..Default::default()
            }],
            vessels: vec![],
            belongs_to_recipe: "r1".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

// ============================================================================
// Call journal
// ============================================================================

/// A side effect observed by a mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Upsert { index: String, id: String },
    Delete { index: String, id: String },
    Wipe { index: String },
    Mark { index_type: IndexType, id: String },
}

/// Ordered record of calls, shareable between mocks so cross-mock ordering
/// can be asserted.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }
}

// ============================================================================
// Mock data manager
// ============================================================================

#[derive(Default)]
struct Rows {
    recipes: HashMap<String, Recipe>,
    meals: HashMap<String, Meal>,
    valid_ingredients: HashMap<String, ValidIngredient>,
    valid_instruments: HashMap<String, ValidInstrument>,
    valid_preparations: HashMap<String, ValidPreparation>,
    valid_measurement_units: HashMap<String, ValidMeasurementUnit>,
    valid_ingredient_states: HashMap<String, ValidIngredientState>,
    valid_vessels: HashMap<String, ValidVessel>,
    users: HashMap<String, User>,
    valid_ingredient_measurement_units: HashMap<String, ValidIngredientMeasurementUnit>,
    valid_measurement_unit_conversions: HashMap<String, ValidMeasurementUnitConversion>,
    valid_preparation_instruments: HashMap<String, ValidPreparationInstrument>,
    valid_ingredient_preparations: HashMap<String, ValidIngredientPreparation>,
    /// Keyed by (household, trigger event).
    webhooks: HashMap<(String, String), Vec<Webhook>>,
}

#[derive(Default)]
struct MockState {
    rows: Mutex<Rows>,
    /// `None` reports `NotFound` for the whole table.
    needs_indexing: Mutex<HashMap<IndexType, Option<Vec<String>>>>,
    fetches: AtomicUsize,
    fail_fetches: AtomicBool,
    fail_marks: AtomicBool,
}

/// In-memory [`SearchDataManager`]. Clones share state.
///
/// Marking a row as indexed records a [`Call::Mark`] and removes the row
/// from its needs-indexing list.
#[derive(Clone, Default)]
pub struct MockDataManager {
    state: Arc<MockState>,
    journal: Journal,
}

macro_rules! with_rows {
    ($($with:ident($field:ident: $ty:ty)),+ $(,)?) => {
        impl MockDataManager {
            $(
                pub fn $with(self, row: $ty) -> Self {
                    lock(&self.state.rows).$field.insert(row.id.clone(), row);
                    self
                }
            )+
        }
    };
}

with_rows! {
    with_recipe(recipes: Recipe),
    with_meal(meals: Meal),
    with_valid_ingredient(valid_ingredients: ValidIngredient),
    with_valid_instrument(valid_instruments: ValidInstrument),
    with_valid_preparation(valid_preparations: ValidPreparation),
    with_valid_measurement_unit(valid_measurement_units: ValidMeasurementUnit),
    with_valid_ingredient_state(valid_ingredient_states: ValidIngredientState),
    with_valid_vessel(valid_vessels: ValidVessel),
    with_user(users: User),
    with_valid_ingredient_measurement_unit(
        valid_ingredient_measurement_units: ValidIngredientMeasurementUnit
    ),
    with_valid_measurement_unit_conversion(
        valid_measurement_unit_conversions: ValidMeasurementUnitConversion
    ),
    with_valid_preparation_instrument(valid_preparation_instruments: ValidPreparationInstrument),
    with_valid_ingredient_preparation(valid_ingredient_preparations: ValidIngredientPreparation),
}

impl MockDataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A data manager recording into an existing journal.
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            state: Arc::default(),
            journal,
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Register `webhook` for `household_id`, firing on `event_type`.
    pub fn with_webhook(self, household_id: &str, event_type: &str, webhook: Webhook) -> Self {
        lock(&self.state.rows)
            .webhooks
            .entry((household_id.to_string(), event_type.to_string()))
            .or_default()
            .push(webhook);
        self
    }

    pub fn set_ids_needing_indexing(&self, index_type: IndexType, ids: &[&str]) {
        lock(&self.state.needs_indexing).insert(
            index_type,
            Some(ids.iter().map(|id| id.to_string()).collect()),
        );
    }

    /// Report `NotFound` when listing `index_type`.
    pub fn ids_not_found(&self, index_type: IndexType) {
        lock(&self.state.needs_indexing).insert(index_type, None);
    }

    /// Fail every read, including needs-indexing listings.
    pub fn fail_fetches(&self) {
        self.state.fail_fetches.store(true, Ordering::SeqCst);
    }

    pub fn fail_marks(&self) {
        self.state.fail_marks.store(true, Ordering::SeqCst);
    }

    /// Number of single-row reads attempted.
    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    /// Rows marked as indexed, in order.
    pub fn marked(&self) -> Vec<(IndexType, String)> {
        self.journal
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Mark { index_type, id } => Some((index_type, id)),
                _ => None,
            })
            .collect()
    }

    fn injected_failure() -> StorageError {
        StorageError::Backend("injected failure".to_string())
    }

    fn fetch<T>(
        &self,
        entity: &'static str,
        id: &str,
        pick: impl FnOnce(&Rows) -> Option<T>,
    ) -> StorageResult<T> {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_fetches.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        pick(&lock(&self.state.rows)).ok_or_else(|| StorageError::not_found(entity, id))
    }
}

#[async_trait]
impl SearchDataManager for MockDataManager {
    async fn get_recipe(&self, id: &str) -> StorageResult<Recipe> {
        self.fetch("recipe", id, |rows| rows.recipes.get(id).cloned())
    }

    async fn get_meal(&self, id: &str) -> StorageResult<Meal> {
        self.fetch("meal", id, |rows| rows.meals.get(id).cloned())
    }

    async fn get_valid_ingredient(&self, id: &str) -> StorageResult<ValidIngredient> {
        self.fetch("valid ingredient", id, |rows| {
            rows.valid_ingredients.get(id).cloned()
        })
    }

    async fn get_valid_instrument(&self, id: &str) -> StorageResult<ValidInstrument> {
        self.fetch("valid instrument", id, |rows| {
            rows.valid_instruments.get(id).cloned()
        })
    }

    async fn get_valid_preparation(&self, id: &str) -> StorageResult<ValidPreparation> {
        self.fetch("valid preparation", id, |rows| {
            rows.valid_preparations.get(id).cloned()
        })
    }

    async fn get_valid_measurement_unit(&self, id: &str) -> StorageResult<ValidMeasurementUnit> {
        self.fetch("valid measurement unit", id, |rows| {
            rows.valid_measurement_units.get(id).cloned()
        })
    }

    async fn get_valid_ingredient_state(&self, id: &str) -> StorageResult<ValidIngredientState> {
        self.fetch("valid ingredient state", id, |rows| {
            rows.valid_ingredient_states.get(id).cloned()
        })
    }

    async fn get_valid_vessel(&self, id: &str) -> StorageResult<ValidVessel> {
        self.fetch("valid vessel", id, |rows| rows.valid_vessels.get(id).cloned())
    }

    async fn get_user(&self, id: &str) -> StorageResult<User> {
        self.fetch("user", id, |rows| rows.users.get(id).cloned())
    }

    async fn get_valid_ingredient_measurement_unit(
        &self,
        id: &str,
    ) -> StorageResult<ValidIngredientMeasurementUnit> {
        self.fetch("valid ingredient measurement unit", id, |rows| {
            rows.valid_ingredient_measurement_units.get(id).cloned()
        })
    }

    async fn get_valid_measurement_unit_conversion(
        &self,
        id: &str,
    ) -> StorageResult<ValidMeasurementUnitConversion> {
        self.fetch("valid measurement unit conversion", id, |rows| {
            rows.valid_measurement_unit_conversions.get(id).cloned()
        })
    }

    async fn get_valid_preparation_instrument(
        &self,
        id: &str,
    ) -> StorageResult<ValidPreparationInstrument> {
        self.fetch("valid preparation instrument", id, |rows| {
            rows.valid_preparation_instruments.get(id).cloned()
        })
    }

    async fn get_valid_ingredient_preparation(
        &self,
        id: &str,
    ) -> StorageResult<ValidIngredientPreparation> {
        self.fetch("valid ingredient preparation", id, |rows| {
            rows.valid_ingredient_preparations.get(id).cloned()
        })
    }

    async fn get_ids_that_need_search_indexing(
        &self,
        index_type: IndexType,
    ) -> StorageResult<Vec<String>> {
        if self.state.fail_fetches.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        match lock(&self.state.needs_indexing).get(&index_type) {
            Some(Some(ids)) => Ok(ids.clone()),
            Some(None) => Err(StorageError::not_found(index_type.as_str(), "*")),
            None => Ok(Vec::new()),
        }
    }

    async fn mark_as_indexed(&self, index_type: IndexType, id: &str) -> StorageResult<()> {
        if self.state.fail_marks.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        if let Some(Some(ids)) = lock(&self.state.needs_indexing).get_mut(&index_type) {
            ids.retain(|pending| pending != id);
        }
        self.journal.record(Call::Mark {
            index_type,
            id: id.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl WebhookDataManager for MockDataManager {
    async fn get_webhooks_for_household_and_event(
        &self,
        household_id: &str,
        event_type: &str,
    ) -> StorageResult<Vec<Webhook>> {
        if self.state.fail_fetches.load(Ordering::SeqCst) {
            return Err(Self::injected_failure());
        }
        let key = (household_id.to_string(), event_type.to_string());
        Ok(lock(&self.state.rows)
            .webhooks
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Recording search backend
// ============================================================================

/// [`MemorySearch`] that journals writes and can be told to fail upserts.
#[derive(Clone, Default)]
pub struct RecordingSearch {
    inner: MemorySearch,
    journal: Journal,
    upsert_failure: Arc<Mutex<Option<u16>>>,
    upsert_attempts: Arc<AtomicUsize>,
}

impl RecordingSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend recording into an existing journal.
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Fail every upsert with HTTP `status`. 5xx and 429 are transient.
    pub fn fail_upserts(&self, status: u16) {
        *lock(&self.upsert_failure) = Some(status);
    }

    pub fn heal(&self) {
        *lock(&self.upsert_failure) = None;
    }

    /// Upserts attempted, failed ones included.
    pub fn upsert_attempts(&self) -> usize {
        self.upsert_attempts.load(Ordering::SeqCst)
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.inner.document(index, id).await
    }
}

#[async_trait]
impl SearchBackend for RecordingSearch {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn upsert(&self, index: &str, id: &str, document: Value) -> search::Result<()> {
        self.upsert_attempts.fetch_add(1, Ordering::SeqCst);
        let failure = *lock(&self.upsert_failure);
        if let Some(status) = failure {
            return Err(SearchError::Status {
                status,
                body: "injected failure".to_string(),
            });
        }

        self.inner.upsert(index, id, document).await?;
        self.journal.record(Call::Upsert {
            index: index.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> search::Result<()> {
        self.inner.delete(index, id).await?;
        self.journal.record(Call::Delete {
            index: index.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    async fn search(&self, index: &str, query: &str) -> search::Result<Vec<Value>> {
        self.inner.search(index, query).await
    }

    async fn wipe(&self, index: &str) -> search::Result<()> {
        self.inner.wipe(index).await?;
        self.journal.record(Call::Wipe {
            index: index.to_string(),
        });
        Ok(())
    }
}
