use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field::FieldChange;

/// Globally unique item identifier.
pub type ItemId = Uuid;

/// Field identifier, stable across all items of a template.
pub type FieldId = Uuid;

/// Template identifier.
pub type TemplateId = Uuid;

/// Branch identifier.
pub type BranchId = Uuid;

/// Language code, e.g. "en" or "da-DK".
pub type Language = String;

/// 1-based version number within a language.
pub type Version = i32;

/// Well-known template identifiers.
pub mod template_ids {
    use super::TemplateId;
    use uuid::Uuid;

    /// Template that defines language entries. Saving an item of this
    /// template invalidates the cached language list.
    pub const LANGUAGE: TemplateId = Uuid::from_u128(0xF68F_13A6_3395_426A_B9A1_FA2D_C60D_94EB);
}

/// Immutable snapshot of an item's row-level identity, taken when a change
/// set is built and passed into a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: ItemId,
    pub name: String,
    pub template_id: TemplateId,
    pub branch_id: BranchId,
}

impl ItemDefinition {
    pub fn new(
        id: ItemId,
        name: impl Into<String>,
        template_id: TemplateId,
        branch_id: BranchId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            template_id,
            branch_id,
        }
    }
}

/// Language/version cursor and save mode of the in-memory item a change
/// set was built against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemContext {
    pub language: Language,
    pub version: Version,
    /// The caller replaces the item's entire field set for this
    /// language/version instead of applying incremental changes.
    pub save_all: bool,
}

impl ItemContext {
    pub fn new(language: impl Into<Language>, version: Version) -> Self {
        Self {
            language: language.into(),
            version,
            save_all: false,
        }
    }
}

/// Property-level changes for a save. Fields left as `None` keep the value
/// from the [`ItemDefinition`] snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub name: Option<String>,
    pub template_id: Option<TemplateId>,
    pub branch_id: Option<BranchId>,
}

/// The delta applied by one save: optional property changes plus an ordered
/// list of field changes, with the context of the item they were built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    pub context: ItemContext,
    pub properties: Option<PropertyUpdate>,
    pub field_changes: Vec<FieldChange>,
}

impl ItemChanges {
    pub fn new(context: ItemContext) -> Self {
        Self {
            context,
            properties: None,
            field_changes: Vec::new(),
        }
    }

    pub fn has_properties_changed(&self) -> bool {
        self.properties.is_some()
    }

    pub fn has_fields_changed(&self) -> bool {
        !self.field_changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_changes_report_nothing_changed() {
        let changes = ItemChanges::new(ItemContext::new("en", 1));
        assert!(!changes.has_properties_changed());
        assert!(!changes.has_fields_changed());
    }

    #[test]
    fn property_update_flags_changes() {
        let mut changes = ItemChanges::new(ItemContext::new("en", 1));
        changes.properties = Some(PropertyUpdate {
            name: Some("renamed".into()),
            ..Default::default()
        });
        assert!(changes.has_properties_changed());
        assert!(!changes.has_fields_changed());
    }

    #[test]
    fn field_change_flags_changes() {
        let mut changes = ItemChanges::new(ItemContext::new("en", 1));
        changes
            .field_changes
            .push(FieldChange::new(Uuid::new_v4(), "en", 1, "value"));
        assert!(changes.has_fields_changed());
    }
}
