use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use costbook_core::{
    Aggregate, AggregateRoot, DomainError, Entity, find_entity, find_entity_mut, typed_id,
};
use costbook_events::Event;
use costbook_materials::RawMaterialId;

/// Stream type for recipe event streams.
pub const AGGREGATE_TYPE: &str = "recipes.recipe";

typed_id!(
    /// Recipe identifier.
    RecipeId
);

typed_id!(
    /// Identifier of a line within a recipe.
    RecipeLineId
);

/// One ingredient of a recipe: a raw material and the quantity one batch uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub line_id: RecipeLineId,
    pub raw_material_id: RawMaterialId,
    pub quantity: Decimal,
}

impl RecipeLine {
    pub fn new(raw_material_id: RawMaterialId, quantity: Decimal) -> Self {
        Self {
            line_id: RecipeLineId::generate(),
            raw_material_id,
            quantity,
        }
    }
}

impl Entity for RecipeLine {
    type Id = RecipeLineId;

    fn id(&self) -> &Self::Id {
        &self.line_id
    }
}

/// Aggregate root: Recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    id: RecipeId,
    name: String,
    batch_yield: Decimal,
    lines: Vec<RecipeLine>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Recipe {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RecipeId) -> Self {
        Self {
            id,
            name: String::new(),
            batch_yield: Decimal::ZERO,
            lines: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> RecipeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finished units one full batch produces.
    pub fn batch_yield(&self) -> Decimal {
        self.batch_yield
    }

    pub fn lines(&self) -> &[RecipeLine] {
        &self.lines
    }

    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn line(&self, line_id: RecipeLineId) -> Option<&RecipeLine> {
        find_entity(&self.lines, &line_id)
    }
}

impl AggregateRoot for Recipe {
    type Id = RecipeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRecipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecipe {
    pub recipe_id: RecipeId,
    pub name: String,
    pub batch_yield: Decimal,
    pub lines: Vec<RecipeLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRecipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecipe {
    pub recipe_id: RecipeId,
    pub name: String,
    pub batch_yield: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddRecipeLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRecipeLine {
    pub recipe_id: RecipeId,
    pub line: RecipeLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRecipeLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecipeLine {
    pub recipe_id: RecipeId,
    pub line: RecipeLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveRecipeLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRecipeLine {
    pub recipe_id: RecipeId,
    pub line_id: RecipeLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplaceRecipeLines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceRecipeLines {
    pub recipe_id: RecipeId,
    pub lines: Vec<RecipeLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteRecipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRecipe {
    pub recipe_id: RecipeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipeCommand {
    Create(CreateRecipe),
    Update(UpdateRecipe),
    AddLine(AddRecipeLine),
    UpdateLine(UpdateRecipeLine),
    RemoveLine(RemoveRecipeLine),
    ReplaceLines(ReplaceRecipeLines),
    Delete(DeleteRecipe),
}

/// Event: RecipeCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeCreated {
    pub recipe_id: RecipeId,
    pub name: String,
    pub batch_yield: Decimal,
    pub lines: Vec<RecipeLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecipeUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeUpdated {
    pub recipe_id: RecipeId,
    pub name: String,
    pub batch_yield: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecipeLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLineAdded {
    pub recipe_id: RecipeId,
    pub line: RecipeLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecipeLineUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLineUpdated {
    pub recipe_id: RecipeId,
    pub line: RecipeLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecipeLineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLineRemoved {
    pub recipe_id: RecipeId,
    pub line_id: RecipeLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecipeLinesReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLinesReplaced {
    pub recipe_id: RecipeId,
    pub lines: Vec<RecipeLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecipeDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDeleted {
    pub recipe_id: RecipeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipeEvent {
    RecipeCreated(RecipeCreated),
    RecipeUpdated(RecipeUpdated),
    RecipeLineAdded(RecipeLineAdded),
    RecipeLineUpdated(RecipeLineUpdated),
    RecipeLineRemoved(RecipeLineRemoved),
    RecipeLinesReplaced(RecipeLinesReplaced),
    RecipeDeleted(RecipeDeleted),
}

impl Event for RecipeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RecipeEvent::RecipeCreated(_) => "recipes.recipe.created",
            RecipeEvent::RecipeUpdated(_) => "recipes.recipe.updated",
            RecipeEvent::RecipeLineAdded(_) => "recipes.recipe.line_added",
            RecipeEvent::RecipeLineUpdated(_) => "recipes.recipe.line_updated",
            RecipeEvent::RecipeLineRemoved(_) => "recipes.recipe.line_removed",
            RecipeEvent::RecipeLinesReplaced(_) => "recipes.recipe.lines_replaced",
            RecipeEvent::RecipeDeleted(_) => "recipes.recipe.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RecipeEvent::RecipeCreated(e) => e.occurred_at,
            RecipeEvent::RecipeUpdated(e) => e.occurred_at,
            RecipeEvent::RecipeLineAdded(e) => e.occurred_at,
            RecipeEvent::RecipeLineUpdated(e) => e.occurred_at,
            RecipeEvent::RecipeLineRemoved(e) => e.occurred_at,
            RecipeEvent::RecipeLinesReplaced(e) => e.occurred_at,
            RecipeEvent::RecipeDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Recipe {
    type Command = RecipeCommand;
    type Event = RecipeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RecipeEvent::RecipeCreated(e) => {
                self.id = e.recipe_id;
                self.name = e.name.clone();
                self.batch_yield = e.batch_yield;
                self.lines = e.lines.clone();
                self.created = true;
            }
            RecipeEvent::RecipeUpdated(e) => {
                self.name = e.name.clone();
                self.batch_yield = e.batch_yield;
            }
            RecipeEvent::RecipeLineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            RecipeEvent::RecipeLineUpdated(e) => {
                if let Some(line) = find_entity_mut(&mut self.lines, &e.line.line_id) {
                    *line = e.line.clone();
                }
            }
            RecipeEvent::RecipeLineRemoved(e) => {
                self.lines.retain(|l| l.line_id != e.line_id);
            }
            RecipeEvent::RecipeLinesReplaced(e) => {
                self.lines = e.lines.clone();
            }
            RecipeEvent::RecipeDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RecipeCommand::Create(cmd) => self.handle_create(cmd),
            RecipeCommand::Update(cmd) => self.handle_update(cmd),
            RecipeCommand::AddLine(cmd) => self.handle_add_line(cmd),
            RecipeCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            RecipeCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            RecipeCommand::ReplaceLines(cmd) => self.handle_replace_lines(cmd),
            RecipeCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(())
}

fn validate_yield(batch_yield: Decimal) -> Result<(), DomainError> {
    if batch_yield <= Decimal::ZERO {
        return Err(DomainError::invalid_quantity("yield must be positive"));
    }
    Ok(())
}

fn validate_line(line: &RecipeLine) -> Result<(), DomainError> {
    if line.quantity <= Decimal::ZERO {
        return Err(DomainError::invalid_quantity(format!(
            "line {} quantity must be positive",
            line.line_id
        )));
    }
    Ok(())
}

fn validate_lines(lines: &[RecipeLine]) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for line in lines {
        validate_line(line)?;
        if !seen.insert(line.line_id) {
            return Err(DomainError::validation(format!(
                "duplicate line id {}",
                line.line_id
            )));
        }
    }
    Ok(())
}

impl Recipe {
    fn ensure_exists(&self, recipe_id: RecipeId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found());
        }
        if self.id != recipe_id {
            return Err(DomainError::invariant("recipe_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRecipe) -> Result<Vec<RecipeEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("recipe already exists"));
        }
        validate_name(&cmd.name)?;
        validate_yield(cmd.batch_yield)?;
        validate_lines(&cmd.lines)?;

        Ok(vec![RecipeEvent::RecipeCreated(RecipeCreated {
            recipe_id: cmd.recipe_id,
            name: cmd.name.trim().to_string(),
            batch_yield: cmd.batch_yield,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateRecipe) -> Result<Vec<RecipeEvent>, DomainError> {
        self.ensure_exists(cmd.recipe_id)?;
        validate_name(&cmd.name)?;
        validate_yield(cmd.batch_yield)?;

        Ok(vec![RecipeEvent::RecipeUpdated(RecipeUpdated {
            recipe_id: cmd.recipe_id,
            name: cmd.name.trim().to_string(),
            batch_yield: cmd.batch_yield,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddRecipeLine) -> Result<Vec<RecipeEvent>, DomainError> {
        self.ensure_exists(cmd.recipe_id)?;
        validate_line(&cmd.line)?;
        if self.line(cmd.line.line_id).is_some() {
            return Err(DomainError::conflict("recipe line already exists"));
        }

        Ok(vec![RecipeEvent::RecipeLineAdded(RecipeLineAdded {
            recipe_id: cmd.recipe_id,
            line: cmd.line.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateRecipeLine) -> Result<Vec<RecipeEvent>, DomainError> {
        self.ensure_exists(cmd.recipe_id)?;
        validate_line(&cmd.line)?;
        if self.line(cmd.line.line_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![RecipeEvent::RecipeLineUpdated(RecipeLineUpdated {
            recipe_id: cmd.recipe_id,
            line: cmd.line.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveRecipeLine) -> Result<Vec<RecipeEvent>, DomainError> {
        self.ensure_exists(cmd.recipe_id)?;
        if self.line(cmd.line_id).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![RecipeEvent::RecipeLineRemoved(RecipeLineRemoved {
            recipe_id: cmd.recipe_id,
            line_id: cmd.line_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replace_lines(
        &self,
        cmd: &ReplaceRecipeLines,
    ) -> Result<Vec<RecipeEvent>, DomainError> {
        self.ensure_exists(cmd.recipe_id)?;
        validate_lines(&cmd.lines)?;

        Ok(vec![RecipeEvent::RecipeLinesReplaced(RecipeLinesReplaced {
            recipe_id: cmd.recipe_id,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteRecipe) -> Result<Vec<RecipeEvent>, DomainError> {
        self.ensure_exists(cmd.recipe_id)?;
        Ok(vec![RecipeEvent::RecipeDeleted(RecipeDeleted {
            recipe_id: cmd.recipe_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
