//! PostgreSQL data manager.
//!
//! Single-table reads are built with sea-query. Recipe steps and meal
//! components are loaded with hand-written joins.

use std::time::Duration;

use async_trait::async_trait;
use sea_query::{Asterisk, Cond, Expr, PostgresQueryBuilder, Query};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use super::schema::{Children, Searchable, Table, WebhookTriggerEvents, Webhooks};
use super::{Result, SearchDataManager, StorageError, WebhookDataManager};
use crate::config::DatabaseConfig;
use crate::indexing::IndexType;
use crate::types::{
    Meal, MealComponent, Recipe, RecipeStep, RecipeStepIngredient, RecipeStepInstrument,
    RecipeStepVessel, User, ValidIngredient, ValidIngredientMeasurementUnit,
    ValidIngredientPreparation, ValidIngredientState, ValidInstrument, ValidMeasurementUnit,
    ValidMeasurementUnitConversion, ValidPreparation, ValidPreparationInstrument, ValidVessel,
    Webhook,
};

const RECIPE_STEPS_QUERY: &str = r#"
SELECT
    recipe_steps.id,
    recipe_steps.index,
    recipe_steps.notes,
    recipe_steps.explicit_instructions,
    recipe_steps.optional,
    recipe_steps.belongs_to_recipe,
    valid_preparations.id AS preparation_id,
    valid_preparations.name AS preparation_name,
    valid_preparations.description AS preparation_description,
    valid_preparations.icon_path AS preparation_icon_path,
    valid_preparations.past_tense AS preparation_past_tense,
    valid_preparations.slug AS preparation_slug,
    valid_preparations.yields_nothing AS preparation_yields_nothing,
    valid_preparations.restrict_to_ingredients AS preparation_restrict_to_ingredients,
    valid_preparations.minimum_ingredient_count AS preparation_minimum_ingredient_count,
    valid_preparations.maximum_ingredient_count AS preparation_maximum_ingredient_count,
    valid_preparations.created_at AS preparation_created_at,
    valid_preparations.last_updated_at AS preparation_last_updated_at,
    valid_preparations.archived_at AS preparation_archived_at
FROM recipes
    JOIN recipe_steps ON recipes.id = recipe_steps.belongs_to_recipe
    JOIN valid_preparations ON recipe_steps.preparation_id = valid_preparations.id
WHERE recipes.archived_at IS NULL
    AND recipe_steps.archived_at IS NULL
    AND recipes.id = $1
ORDER BY recipe_steps.index
"#;

const MEAL_COMPONENTS_QUERY: &str = r#"
SELECT
    recipes.*,
    meal_components.meal_component_type,
    meal_components.scale
FROM meal_components
    JOIN recipes ON meal_components.recipe_id = recipes.id
WHERE meal_components.archived_at IS NULL
    AND recipes.archived_at IS NULL
    AND meal_components.meal_id = $1
ORDER BY meal_components.created_at
"#;

/// PostgreSQL implementation of [`SearchDataManager`].
pub struct PostgresDataManager {
    pool: PgPool,
    batch_size: u64,
    reindex_after_hours: u32,
}

impl PostgresDataManager {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool, batch_size: u64, reindex_after_hours: u32) -> Self {
        Self {
            pool,
            batch_size,
            reindex_after_hours,
        }
    }

    /// Open a pool, failing with `ConnectTimeout` if the database does not
    /// answer within the configured window.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        info!(max_connections = config.max_connections, "Connecting to PostgreSQL");

        let pool = tokio::time::timeout(
            timeout,
            PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(timeout)
                .connect(&config.url),
        )
        .await
        .map_err(|_| StorageError::ConnectTimeout(timeout))??;

        Ok(Self::new(
            pool,
            config.indexing_batch_size,
            config.reindex_after_hours,
        ))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_live_row(&self, table: Table, entity: &'static str, id: &str) -> Result<PgRow> {
        let query = Query::select()
            .column(Asterisk)
            .from(table)
            .and_where(Expr::col(Searchable::Id).eq(id))
            .and_where(Expr::col(Searchable::ArchivedAt).is_null())
            .to_string(PostgresQueryBuilder);

        sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found(entity, id))
    }

    async fn fetch_children(&self, table: Table, step_ids: &[String]) -> Result<Vec<PgRow>> {
        if step_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = Query::select()
            .column(Asterisk)
            .from(table)
            .and_where(Expr::col(Children::BelongsToRecipeStep).is_in(step_ids.iter().cloned()))
            .and_where(Expr::col(Searchable::ArchivedAt).is_null())
            .to_string(PostgresQueryBuilder);

        Ok(sqlx::query(&query).fetch_all(&self.pool).await?)
    }

    async fn recipe_steps(&self, recipe_id: &str) -> Result<Vec<RecipeStep>> {
        let rows = sqlx::query(RECIPE_STEPS_QUERY)
            .bind(recipe_id)
            .fetch_all(&self.pool)
            .await?;

        let mut steps = rows
            .iter()
            .map(recipe_step_from_row)
            .collect::<Result<Vec<_>>>()?;
        let step_ids: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();

        let ingredients = self
            .fetch_children(Table::RecipeStepIngredients, &step_ids)
            .await?;
        let instruments = self
            .fetch_children(Table::RecipeStepInstruments, &step_ids)
            .await?;
        let vessels = self.fetch_children(Table::RecipeStepVessels, &step_ids).await?;

        for row in &ingredients {
            let ingredient = RecipeStepIngredient {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                ingredient_id: row.try_get("ingredient_id")?,
                quantity_notes: row.try_get("quantity_notes")?,
                ingredient_notes: row.try_get("ingredient_notes")?,
                optional: row.try_get("optional")?,
                belongs_to_recipe_step: row.try_get("belongs_to_recipe_step")?,
            };
            if let Some(step) = steps
                .iter_mut()
                .find(|s| s.id == ingredient.belongs_to_recipe_step)
            {
                step.ingredients.push(ingredient);
            }
        }

        for row in &instruments {
            let instrument = RecipeStepInstrument {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                instrument_id: row.try_get("instrument_id")?,
                notes: row.try_get("notes")?,
                optional: row.try_get("optional")?,
                belongs_to_recipe_step: row.try_get("belongs_to_recipe_step")?,
            };
            if let Some(step) = steps
                .iter_mut()
                .find(|s| s.id == instrument.belongs_to_recipe_step)
            {
                step.instruments.push(instrument);
            }
        }

        for row in &vessels {
            let vessel = RecipeStepVessel {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                vessel_id: row.try_get("vessel_id")?,
                notes: row.try_get("notes")?,
                belongs_to_recipe_step: row.try_get("belongs_to_recipe_step")?,
            };
            if let Some(step) = steps
                .iter_mut()
                .find(|s| s.id == vessel.belongs_to_recipe_step)
            {
                step.vessels.push(vessel);
            }
        }

        Ok(steps)
    }
}

#[async_trait]
impl SearchDataManager for PostgresDataManager {
    async fn get_recipe(&self, id: &str) -> Result<Recipe> {
        let row = self.fetch_live_row(Table::Recipes, "recipe", id).await?;
        let mut recipe = recipe_from_row(&row)?;
        recipe.steps = self.recipe_steps(id).await?;
        Ok(recipe)
    }

    /// Component recipes carry their header fields only; steps are not loaded.
    async fn get_meal(&self, id: &str) -> Result<Meal> {
        let row = self.fetch_live_row(Table::Meals, "meal", id).await?;
        let mut meal = Meal {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_by_user: row.try_get("created_by_user")?,
            min_estimated_portions: row.try_get("min_estimated_portions")?,
            max_estimated_portions: row.try_get("max_estimated_portions")?,
            eligible_for_meal_plans: row.try_get("eligible_for_meal_plans")?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            archived_at: row.try_get("archived_at")?,
            components: Vec::new(),
        };

        let rows = sqlx::query(MEAL_COMPONENTS_QUERY)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            meal.components.push(MealComponent {
                recipe: recipe_from_row(row)?,
                component_type: row.try_get("meal_component_type")?,
                recipe_scale: row.try_get("scale")?,
            });
        }

        Ok(meal)
    }

    async fn get_valid_ingredient(&self, id: &str) -> Result<ValidIngredient> {
        let row = self
            .fetch_live_row(Table::ValidIngredients, "valid ingredient", id)
            .await?;
        valid_ingredient_from_row(&row)
    }

    async fn get_valid_instrument(&self, id: &str) -> Result<ValidInstrument> {
        let row = self
            .fetch_live_row(Table::ValidInstruments, "valid instrument", id)
            .await?;
        valid_instrument_from_row(&row)
    }

    async fn get_valid_preparation(&self, id: &str) -> Result<ValidPreparation> {
        let row = self
            .fetch_live_row(Table::ValidPreparations, "valid preparation", id)
            .await?;
        valid_preparation_from_row(&row, "")
    }

    async fn get_valid_measurement_unit(&self, id: &str) -> Result<ValidMeasurementUnit> {
        let row = self
            .fetch_live_row(Table::ValidMeasurementUnits, "valid measurement unit", id)
            .await?;
        valid_measurement_unit_from_row(&row)
    }

    async fn get_valid_ingredient_state(&self, id: &str) -> Result<ValidIngredientState> {
        let row = self
            .fetch_live_row(Table::ValidIngredientStates, "valid ingredient state", id)
            .await?;
        Ok(ValidIngredientState {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            plural_name: row.try_get("plural_name")?,
            past_tense: row.try_get("past_tense")?,
            description: row.try_get("description")?,
            icon_path: row.try_get("icon_path")?,
            slug: row.try_get("slug")?,
            attribute_type: row.try_get("attribute_type")?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }

    async fn get_valid_vessel(&self, id: &str) -> Result<ValidVessel> {
        let row = self
            .fetch_live_row(Table::ValidVessels, "valid vessel", id)
            .await?;
        Ok(ValidVessel {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            plural_name: row.try_get("plural_name")?,
            description: row.try_get("description")?,
            icon_path: row.try_get("icon_path")?,
            slug: row.try_get("slug")?,
            shape: row.try_get("shape")?,
            capacity: row.try_get("capacity")?,
            width_in_millimeters: row.try_get("width_in_millimeters")?,
            length_in_millimeters: row.try_get("length_in_millimeters")?,
            height_in_millimeters: row.try_get("height_in_millimeters")?,
            usable_for_storage: row.try_get("usable_for_storage")?,
            display_in_summary_lists: row.try_get("display_in_summary_lists")?,
            include_in_generated_instructions: row.try_get("include_in_generated_instructions")?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }

    async fn get_user(&self, id: &str) -> Result<User> {
        let row = self.fetch_live_row(Table::Users, "user", id).await?;
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email_address: row.try_get("email_address")?,
            account_status: row.try_get("user_account_status")?,
            avatar_src: row.try_get("avatar_src")?,
            service_role: row.try_get("service_role")?,
            email_address_verified_at: row.try_get("email_address_verified_at")?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }

    async fn get_valid_ingredient_measurement_unit(
        &self,
        id: &str,
    ) -> Result<ValidIngredientMeasurementUnit> {
        let row = self
            .fetch_live_row(
                Table::ValidIngredientMeasurementUnits,
                "valid ingredient measurement unit",
                id,
            )
            .await?;
        let ingredient_id: String = row.try_get("valid_ingredient_id")?;
        let unit_id: String = row.try_get("valid_measurement_unit_id")?;

        Ok(ValidIngredientMeasurementUnit {
            id: row.try_get("id")?,
            notes: row.try_get("notes")?,
            ingredient: self.get_valid_ingredient(&ingredient_id).await?,
            measurement_unit: self.get_valid_measurement_unit(&unit_id).await?,
            minimum_allowable_quantity: row.try_get("minimum_allowable_quantity")?,
            maximum_allowable_quantity: row.try_get("maximum_allowable_quantity")?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }

    async fn get_valid_measurement_unit_conversion(
        &self,
        id: &str,
    ) -> Result<ValidMeasurementUnitConversion> {
        let row = self
            .fetch_live_row(
                Table::ValidMeasurementUnitConversions,
                "valid measurement unit conversion",
                id,
            )
            .await?;
        let from_id: String = row.try_get("from_unit")?;
        let to_id: String = row.try_get("to_unit")?;
        let only_for: Option<String> = row.try_get("only_for_ingredient")?;

        let only_for_ingredient = match only_for {
            Some(ingredient_id) => Some(self.get_valid_ingredient(&ingredient_id).await?),
            None => None,
        };

        Ok(ValidMeasurementUnitConversion {
            id: row.try_get("id")?,
            notes: row.try_get("notes")?,
            from: self.get_valid_measurement_unit(&from_id).await?,
            to: self.get_valid_measurement_unit(&to_id).await?,
            only_for_ingredient,
            modifier: row.try_get("modifier")?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }

    async fn get_valid_preparation_instrument(
        &self,
        id: &str,
    ) -> Result<ValidPreparationInstrument> {
        let row = self
            .fetch_live_row(
                Table::ValidPreparationInstruments,
                "valid preparation instrument",
                id,
            )
            .await?;
        let preparation_id: String = row.try_get("valid_preparation_id")?;
        let instrument_id: String = row.try_get("valid_instrument_id")?;

        Ok(ValidPreparationInstrument {
            id: row.try_get("id")?,
            notes: row.try_get("notes")?,
            preparation: self.get_valid_preparation(&preparation_id).await?,
            instrument: self.get_valid_instrument(&instrument_id).await?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }

    async fn get_valid_ingredient_preparation(
        &self,
        id: &str,
    ) -> Result<ValidIngredientPreparation> {
        let row = self
            .fetch_live_row(
                Table::ValidIngredientPreparations,
                "valid ingredient preparation",
                id,
            )
            .await?;
        let ingredient_id: String = row.try_get("valid_ingredient_id")?;
        let preparation_id: String = row.try_get("valid_preparation_id")?;

        Ok(ValidIngredientPreparation {
            id: row.try_get("id")?,
            notes: row.try_get("notes")?,
            ingredient: self.get_valid_ingredient(&ingredient_id).await?,
            preparation: self.get_valid_preparation(&preparation_id).await?,
            created_at: row.try_get("created_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }

    async fn get_ids_that_need_search_indexing(
        &self,
        index_type: IndexType,
    ) -> Result<Vec<String>> {
        let query = needs_indexing_query(index_type, self.reindex_after_hours, self.batch_size);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(%index_type, count = ids.len(), "Rows needing search indexing");

        Ok(ids)
    }

    async fn mark_as_indexed(&self, index_type: IndexType, id: &str) -> Result<()> {
        let query = mark_as_indexed_query(index_type, id);
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookDataManager for PostgresDataManager {
    async fn get_webhooks_for_household_and_event(
        &self,
        household_id: &str,
        event_type: &str,
    ) -> Result<Vec<Webhook>> {
        let query = webhooks_for_event_query(household_id, event_type);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let webhooks = rows
            .iter()
            .map(|row| webhook_from_row(row, event_type))
            .collect::<Result<Vec<_>>>()?;
        debug!(household_id, event_type, count = webhooks.len(), "Webhooks for event");

        Ok(webhooks)
    }
}

fn webhooks_for_event_query(household_id: &str, event_type: &str) -> String {
    Query::select()
        .columns([
            (Webhooks::Table, Webhooks::Id),
            (Webhooks::Table, Webhooks::Name),
            (Webhooks::Table, Webhooks::ContentType),
            (Webhooks::Table, Webhooks::Url),
            (Webhooks::Table, Webhooks::Method),
            (Webhooks::Table, Webhooks::CreatedAt),
            (Webhooks::Table, Webhooks::LastUpdatedAt),
            (Webhooks::Table, Webhooks::ArchivedAt),
            (Webhooks::Table, Webhooks::BelongsToHousehold),
        ])
        .from(Webhooks::Table)
        .inner_join(
            WebhookTriggerEvents::Table,
            Expr::col((WebhookTriggerEvents::Table, WebhookTriggerEvents::BelongsToWebhook))
                .equals((Webhooks::Table, Webhooks::Id)),
        )
        .and_where(Expr::col((Webhooks::Table, Webhooks::ArchivedAt)).is_null())
        .and_where(
            Expr::col((WebhookTriggerEvents::Table, WebhookTriggerEvents::ArchivedAt)).is_null(),
        )
        .and_where(Expr::col((Webhooks::Table, Webhooks::BelongsToHousehold)).eq(household_id))
        .and_where(
            Expr::col((WebhookTriggerEvents::Table, WebhookTriggerEvents::TriggerEvent))
                .eq(event_type),
        )
        .to_string(PostgresQueryBuilder)
}

fn webhook_from_row(row: &PgRow, event_type: &str) -> Result<Webhook> {
    Ok(Webhook {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        method: row.try_get("method")?,
        content_type: row.try_get("content_type")?,
        events: vec![event_type.to_string()],
        belongs_to_household: row.try_get("belongs_to_household")?,
        created_at: row.try_get("created_at")?,
        last_updated_at: row.try_get("last_updated_at")?,
        archived_at: row.try_get("archived_at")?,
    })
}

/// Live rows never indexed, edited since last indexed, or indexed longer
/// ago than `reindex_after_hours`.
fn needs_indexing_query(index_type: IndexType, reindex_after_hours: u32, limit: u64) -> String {
    Query::select()
        .column(Searchable::Id)
        .from(Table::for_index(index_type))
        .cond_where(
            Cond::all()
                .add(Expr::col(Searchable::ArchivedAt).is_null())
                .add(
                    Cond::any()
                        .add(Expr::col(Searchable::LastIndexedAt).is_null())
                        .add(
                            Expr::col(Searchable::LastIndexedAt)
                                .lt(Expr::col(Searchable::LastUpdatedAt)),
                        )
                        .add(Expr::col(Searchable::LastIndexedAt).lt(Expr::cust(format!(
                            "NOW() - INTERVAL '{reindex_after_hours} hours'"
                        )))),
                ),
        )
        .limit(limit)
        .to_string(PostgresQueryBuilder)
}

fn mark_as_indexed_query(index_type: IndexType, id: &str) -> String {
    Query::update()
        .table(Table::for_index(index_type))
        .value(Searchable::LastIndexedAt, Expr::current_timestamp())
        .and_where(Expr::col(Searchable::Id).eq(id))
        .to_string(PostgresQueryBuilder)
}

fn recipe_from_row(row: &PgRow) -> Result<Recipe> {
    Ok(Recipe {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        source: row.try_get("source")?,
        description: row.try_get("description")?,
        created_by_user: row.try_get("created_by_user")?,
        min_estimated_portions: row.try_get("min_estimated_portions")?,
        max_estimated_portions: row.try_get("max_estimated_portions")?,
        created_at: row.try_get("created_at")?,
        last_updated_at: row.try_get("last_updated_at")?,
        archived_at: row.try_get("archived_at")?,
        steps: Vec::new(),
    })
}

fn recipe_step_from_row(row: &PgRow) -> Result<RecipeStep> {
    let index: i32 = row.try_get("index")?;
    Ok(RecipeStep {
        id: row.try_get("id")?,
        index: u32::try_from(index).map_err(|_| StorageError::Decode {
            entity: "recipe step",
            message: format!("negative step index {index}"),
        })?,
        preparation: valid_preparation_from_row(row, "preparation_")?,
        notes: row.try_get("notes")?,
        explicit_instructions: row.try_get("explicit_instructions")?,
        optional: row.try_get("optional")?,
        belongs_to_recipe: row.try_get("belongs_to_recipe")?,
        ingredients: Vec::new(),
        instruments: Vec::new(),
        vessels: Vec::new(),
    })
}

fn valid_preparation_from_row(row: &PgRow, prefix: &str) -> Result<ValidPreparation> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(ValidPreparation {
        id: row.try_get(col("id").as_str())?,
        name: row.try_get(col("name").as_str())?,
        description: row.try_get(col("description").as_str())?,
        icon_path: row.try_get(col("icon_path").as_str())?,
        past_tense: row.try_get(col("past_tense").as_str())?,
        slug: row.try_get(col("slug").as_str())?,
        yields_nothing: row.try_get(col("yields_nothing").as_str())?,
        restrict_to_ingredients: row.try_get(col("restrict_to_ingredients").as_str())?,
        minimum_ingredient_count: row.try_get(col("minimum_ingredient_count").as_str())?,
        maximum_ingredient_count: row.try_get(col("maximum_ingredient_count").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
        last_updated_at: row.try_get(col("last_updated_at").as_str())?,
        archived_at: row.try_get(col("archived_at").as_str())?,
    })
}

fn valid_ingredient_from_row(row: &PgRow) -> Result<ValidIngredient> {
    Ok(ValidIngredient {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        plural_name: row.try_get("plural_name")?,
        description: row.try_get("description")?,
        warning: row.try_get("warning")?,
        icon_path: row.try_get("icon_path")?,
        slug: row.try_get("slug")?,
        shopping_suggestions: row.try_get("shopping_suggestions")?,
        storage_instructions: row.try_get("storage_instructions")?,
        maximum_ideal_storage_temperature_in_celsius: row
            .try_get("maximum_ideal_storage_temperature_in_celsius")?,
        minimum_ideal_storage_temperature_in_celsius: row
            .try_get("minimum_ideal_storage_temperature_in_celsius")?,
        contains_dairy: row.try_get("contains_dairy")?,
        contains_peanut: row.try_get("contains_peanut")?,
        contains_tree_nut: row.try_get("contains_tree_nut")?,
        contains_egg: row.try_get("contains_egg")?,
        contains_wheat: row.try_get("contains_wheat")?,
        contains_shellfish: row.try_get("contains_shellfish")?,
        contains_sesame: row.try_get("contains_sesame")?,
        contains_fish: row.try_get("contains_fish")?,
        contains_gluten: row.try_get("contains_gluten")?,
        contains_soy: row.try_get("contains_soy")?,
        contains_alcohol: row.try_get("contains_alcohol")?,
        animal_flesh: row.try_get("animal_flesh")?,
        animal_derived: row.try_get("animal_derived")?,
        is_measured_volumetrically: row.try_get("volumetric")?,
        is_liquid: row.try_get("is_liquid")?,
        restrict_to_preparations: row.try_get("restrict_to_preparations")?,
        created_at: row.try_get("created_at")?,
        last_updated_at: row.try_get("last_updated_at")?,
        archived_at: row.try_get("archived_at")?,
    })
}

fn valid_instrument_from_row(row: &PgRow) -> Result<ValidInstrument> {
    Ok(ValidInstrument {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        plural_name: row.try_get("plural_name")?,
        description: row.try_get("description")?,
        icon_path: row.try_get("icon_path")?,
        slug: row.try_get("slug")?,
        usable_for_storage: row.try_get("usable_for_storage")?,
        display_in_summary_lists: row.try_get("display_in_summary_lists")?,
        include_in_generated_instructions: row.try_get("include_in_generated_instructions")?,
        created_at: row.try_get("created_at")?,
        last_updated_at: row.try_get("last_updated_at")?,
        archived_at: row.try_get("archived_at")?,
    })
}

fn valid_measurement_unit_from_row(row: &PgRow) -> Result<ValidMeasurementUnit> {
    Ok(ValidMeasurementUnit {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        plural_name: row.try_get("plural_name")?,
        description: row.try_get("description")?,
        icon_path: row.try_get("icon_path")?,
        slug: row.try_get("slug")?,
        volumetric: row.try_get("volumetric")?,
        universal: row.try_get("universal")?,
        metric: row.try_get("metric")?,
        imperial: row.try_get("imperial")?,
        created_at: row.try_get("created_at")?,
        last_updated_at: row.try_get("last_updated_at")?,
        archived_at: row.try_get("archived_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_indexing_query_filters_live_stale_rows() {
        let sql = needs_indexing_query(IndexType::Recipes, 24, 1000);
        assert!(sql.starts_with(r#"SELECT "id" FROM "recipes""#), "{sql}");
        assert!(sql.contains(r#""archived_at" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""last_indexed_at" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""last_indexed_at" < "last_updated_at""#), "{sql}");
        assert!(sql.contains("NOW() - INTERVAL '24 hours'"), "{sql}");
        assert!(sql.ends_with("LIMIT 1000"), "{sql}");
    }

    #[test]
    fn test_needs_indexing_query_uses_index_table() {
        let sql = needs_indexing_query(IndexType::ValidPreparationInstruments, 6, 10);
        assert!(sql.contains(r#"FROM "valid_preparation_instruments""#), "{sql}");
        assert!(sql.contains("INTERVAL '6 hours'"), "{sql}");
    }

    #[test]
    fn test_webhooks_for_event_query_joins_live_triggers() {
        let sql = webhooks_for_event_query("h1", "meal_created");
        assert!(sql.starts_with(r#"SELECT "webhooks"."id", "webhooks"."name""#), "{sql}");
        assert!(
            sql.contains(r#"INNER JOIN "webhook_trigger_events" ON "webhook_trigger_events"."belongs_to_webhook" = "webhooks"."id""#),
            "{sql}"
        );
        assert!(sql.contains(r#""webhooks"."archived_at" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""webhook_trigger_events"."archived_at" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""webhooks"."belongs_to_household" = 'h1'"#), "{sql}");
        assert!(sql.contains(r#""webhook_trigger_events"."trigger_event" = 'meal_created'"#), "{sql}");
    }

    #[tokio::test]
    async fn test_connect_gives_up_within_timeout() {
        let config = DatabaseConfig {
            url: "postgres://sous@127.0.0.1:1/sous".to_string(),
            connect_timeout_secs: 1,
            ..Default::default()
        };

        let started = std::time::Instant::now();
        let result = PostgresDataManager::connect(&config).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    }

    #[test]
    fn test_mark_as_indexed_query() {
        let sql = mark_as_indexed_query(IndexType::Users, "u1");
        assert!(sql.starts_with(r#"UPDATE "users" SET "last_indexed_at" = "#), "{sql}");
        assert!(sql.ends_with(r#"WHERE "id" = 'u1'"#), "{sql}");
    }
}
