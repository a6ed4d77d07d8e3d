//! Create/update/delete of raw materials, recipes and finished goods.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::info;

use costbook_events::{EventBus, EventEnvelope};
use costbook_goods::{
    ChangeFinishedGoodStatus, CreateFinishedGood, DeleteFinishedGood, FinishedGoodCommand,
    FinishedGoodId, FinishedGoodStatus, UpdateFinishedGood,
};
use costbook_materials::{
    DeleteRawMaterial, LegacyValuation, RawMaterialCommand, RawMaterialId, RegisterRawMaterial,
    UnitOfMeasure, UpdateRawMaterial,
};
use costbook_recipes::{
    AddRecipeLine, CreateRecipe, DeleteRecipe, RecipeCommand, RecipeId, RecipeLine, RecipeLineId,
    RemoveRecipeLine, ReplaceRecipeLines, UpdateRecipe, UpdateRecipeLine,
};

use super::{
    CostingEngine, EngineError, empty_finished_good, empty_raw_material, empty_recipe,
};
use crate::event_store::EventStore;

/// Input for [`CostingEngine::create_finished_good`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFinishedGood {
    pub name: String,
    pub recipe_id: RecipeId,
    pub margin_percent: Decimal,
    pub status: FinishedGoodStatus,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// Editable fields of a finished good (status changes separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedGoodDetails {
    pub name: String,
    pub recipe_id: RecipeId,
    pub margin_percent: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl<S, B> CostingEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub async fn create_raw_material(
        &self,
        name: impl Into<String>,
        unit: UnitOfMeasure,
        legacy: Option<LegacyValuation>,
    ) -> Result<RawMaterialId, EngineError> {
        let raw_material_id = RawMaterialId::generate();
        let command = RawMaterialCommand::Register(RegisterRawMaterial {
            raw_material_id,
            name: name.into(),
            unit,
            legacy,
            occurred_at: Utc::now(),
        });
        self.execute(
            "raw material",
            raw_material_id.aggregate_id(),
            costbook_materials::raw_material::AGGREGATE_TYPE,
            command,
            empty_raw_material,
        )
        .await?;

        info!(%raw_material_id, "raw material registered");
        Ok(raw_material_id)
    }

    pub async fn update_raw_material(
        &self,
        raw_material_id: RawMaterialId,
        name: impl Into<String>,
        unit: UnitOfMeasure,
    ) -> Result<(), EngineError> {
        let command = RawMaterialCommand::Update(UpdateRawMaterial {
            raw_material_id,
            name: name.into(),
            unit,
            occurred_at: Utc::now(),
        });
        self.execute(
            "raw material",
            raw_material_id.aggregate_id(),
            costbook_materials::raw_material::AGGREGATE_TYPE,
            command,
            empty_raw_material,
        )
        .await?;
        Ok(())
    }

    /// Recipes that still reference the material keep costing it at 0 and
    /// report it as unresolved.
    pub async fn delete_raw_material(&self, raw_material_id: RawMaterialId) -> Result<(), EngineError> {
        let command = RawMaterialCommand::Delete(DeleteRawMaterial {
            raw_material_id,
            occurred_at: Utc::now(),
        });
        self.execute(
            "raw material",
            raw_material_id.aggregate_id(),
            costbook_materials::raw_material::AGGREGATE_TYPE,
            command,
            empty_raw_material,
        )
        .await?;

        info!(%raw_material_id, "raw material deleted");
        Ok(())
    }

    pub async fn create_recipe(
        &self,
        name: impl Into<String>,
        batch_yield: Decimal,
        lines: Vec<RecipeLine>,
    ) -> Result<RecipeId, EngineError> {
        let recipe_id = RecipeId::generate();
        let command = RecipeCommand::Create(CreateRecipe {
            recipe_id,
            name: name.into(),
            batch_yield,
            lines,
            occurred_at: Utc::now(),
        });
        self.recipe_command(recipe_id, command).await?;

        info!(%recipe_id, "recipe created");
        Ok(recipe_id)
    }

    pub async fn update_recipe(
        &self,
        recipe_id: RecipeId,
        name: impl Into<String>,
        batch_yield: Decimal,
    ) -> Result<(), EngineError> {
        let command = RecipeCommand::Update(UpdateRecipe {
            recipe_id,
            name: name.into(),
            batch_yield,
            occurred_at: Utc::now(),
        });
        self.recipe_command(recipe_id, command).await
    }

    pub async fn add_recipe_line(&self, recipe_id: RecipeId, line: RecipeLine) -> Result<(), EngineError> {
        let command = RecipeCommand::AddLine(AddRecipeLine {
            recipe_id,
            line,
            occurred_at: Utc::now(),
        });
        self.recipe_command(recipe_id, command).await
    }

    pub async fn update_recipe_line(
        &self,
        recipe_id: RecipeId,
        line: RecipeLine,
    ) -> Result<(), EngineError> {
        let command = RecipeCommand::UpdateLine(UpdateRecipeLine {
            recipe_id,
            line,
            occurred_at: Utc::now(),
        });
        self.recipe_command(recipe_id, command).await
    }

    pub async fn remove_recipe_line(
        &self,
        recipe_id: RecipeId,
        line_id: RecipeLineId,
    ) -> Result<(), EngineError> {
        let command = RecipeCommand::RemoveLine(RemoveRecipeLine {
            recipe_id,
            line_id,
            occurred_at: Utc::now(),
        });
        self.recipe_command(recipe_id, command).await
    }

    pub async fn replace_recipe_lines(
        &self,
        recipe_id: RecipeId,
        lines: Vec<RecipeLine>,
    ) -> Result<(), EngineError> {
        let command = RecipeCommand::ReplaceLines(ReplaceRecipeLines {
            recipe_id,
            lines,
            occurred_at: Utc::now(),
        });
        self.recipe_command(recipe_id, command).await
    }

    pub async fn delete_recipe(&self, recipe_id: RecipeId) -> Result<(), EngineError> {
        let command = RecipeCommand::Delete(DeleteRecipe {
            recipe_id,
            occurred_at: Utc::now(),
        });
        self.recipe_command(recipe_id, command).await?;

        info!(%recipe_id, "recipe deleted");
        Ok(())
    }

    async fn recipe_command(&self, recipe_id: RecipeId, command: RecipeCommand) -> Result<(), EngineError> {
        self.execute(
            "recipe",
            recipe_id.aggregate_id(),
            costbook_recipes::recipe::AGGREGATE_TYPE,
            command,
            empty_recipe,
        )
        .await?;
        Ok(())
    }

    /// The referenced recipe must exist when the good is created.
    pub async fn create_finished_good(
        &self,
        new: NewFinishedGood,
    ) -> Result<FinishedGoodId, EngineError> {
        self.load_recipe(new.recipe_id).await?;

        let finished_good_id = FinishedGoodId::generate();
        let command = FinishedGoodCommand::Create(CreateFinishedGood {
            finished_good_id,
            name: new.name,
            recipe_id: new.recipe_id,
            margin_percent: new.margin_percent,
            status: new.status,
            category: new.category,
            description: new.description,
            occurred_at: Utc::now(),
        });
        self.finished_good_command(finished_good_id, command).await?;

        info!(%finished_good_id, "finished good created");
        Ok(finished_good_id)
    }

    pub async fn update_finished_good(
        &self,
        finished_good_id: FinishedGoodId,
        details: FinishedGoodDetails,
    ) -> Result<(), EngineError> {
        self.load_recipe(details.recipe_id).await?;

        let command = FinishedGoodCommand::Update(UpdateFinishedGood {
            finished_good_id,
            name: details.name,
            recipe_id: details.recipe_id,
            margin_percent: details.margin_percent,
            category: details.category,
            description: details.description,
            occurred_at: Utc::now(),
        });
        self.finished_good_command(finished_good_id, command).await
    }

    pub async fn change_finished_good_status(
        &self,
        finished_good_id: FinishedGoodId,
        status: FinishedGoodStatus,
    ) -> Result<(), EngineError> {
        let command = FinishedGoodCommand::ChangeStatus(ChangeFinishedGoodStatus {
            finished_good_id,
            status,
            occurred_at: Utc::now(),
        });
        self.finished_good_command(finished_good_id, command).await
    }

    pub async fn delete_finished_good(&self, finished_good_id: FinishedGoodId) -> Result<(), EngineError> {
        let command = FinishedGoodCommand::Delete(DeleteFinishedGood {
            finished_good_id,
            occurred_at: Utc::now(),
        });
        self.finished_good_command(finished_good_id, command).await?;

        info!(%finished_good_id, "finished good deleted");
        Ok(())
    }

    pub(crate) async fn finished_good_command(
        &self,
        finished_good_id: FinishedGoodId,
        command: FinishedGoodCommand,
    ) -> Result<(), EngineError> {
        self.execute(
            "finished good",
            finished_good_id.aggregate_id(),
            costbook_goods::finished_good::AGGREGATE_TYPE,
            command,
            empty_finished_good,
        )
        .await?;
        Ok(())
    }
}
