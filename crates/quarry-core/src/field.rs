use serde::{Deserialize, Serialize};

use crate::item::{FieldId, Language, Version};
use crate::sharing::SharingType;

/// Schema definition of a single template field, as far as the save path
/// needs it: identity plus the configured sharing policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateField {
    pub id: FieldId,
    pub name: String,
    pub shared: bool,
    pub unversioned: bool,
}

impl TemplateField {
    pub fn new(id: FieldId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            shared: false,
            unversioned: false,
        }
    }

    /// Storage scope configured for this field. Shared wins when both
    /// flags are set.
    pub fn sharing_type(&self) -> SharingType {
        if self.shared {
            SharingType::Shared
        } else if self.unversioned {
            SharingType::Unversioned
        } else {
            SharingType::Versioned
        }
    }
}

/// One field mutation within an item save.
///
/// `definition` is `None` when the template field was deleted between
/// building the change set and saving it; sharing resolution then falls
/// back to the default-sharing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_id: FieldId,
    pub language: Language,
    pub version: Version,
    pub value: String,
    pub original_value: String,
    /// Delete the field's rows instead of writing `value`.
    pub remove_field: bool,
    /// `value`/`original_value` hold blob stream identifiers.
    pub is_blob: bool,
    pub definition: Option<TemplateField>,
}

impl FieldChange {
    pub fn new(
        field_id: FieldId,
        language: impl Into<Language>,
        version: Version,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field_id,
            language: language.into(),
            version,
            value: value.into(),
            original_value: String::new(),
            remove_field: false,
            is_blob: false,
            definition: None,
        }
    }

    pub fn with_definition(mut self, definition: TemplateField) -> Self {
        self.definition = Some(definition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn sharing_precedence_shared_wins() {
        let mut field = TemplateField::new(Uuid::new_v4(), "icon");
        field.shared = true;
        field.unversioned = true;
        assert_eq!(field.sharing_type(), SharingType::Shared);
    }

    #[test]
    fn sharing_unversioned_without_shared() {
        let mut field = TemplateField::new(Uuid::new_v4(), "display name");
        field.unversioned = true;
        assert_eq!(field.sharing_type(), SharingType::Unversioned);
    }

    #[test]
    fn sharing_defaults_to_versioned() {
        let field = TemplateField::new(Uuid::new_v4(), "text");
        assert_eq!(field.sharing_type(), SharingType::Versioned);
    }
}
