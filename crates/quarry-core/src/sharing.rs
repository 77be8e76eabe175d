use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::item::FieldId;

/// Storage scope of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharingType {
    /// One value per item, independent of language and version.
    Shared,
    /// One value per item and language.
    Unversioned,
    /// One value per item, language and version.
    Versioned,
    /// The field's definition could not be resolved; every scope must be
    /// considered a candidate.
    Unknown,
}

/// Field ids that keep a known sharing scope even when their template
/// definition is unavailable.
pub mod field_ids {
    use super::FieldId;
    use uuid::Uuid;

    /// Revision stamp written on every save.
    pub const REVISION: FieldId = Uuid::from_u128(0x8CDC_337E_A112_42FB_BBB4_4143_751E_123F);
    /// Last-updated timestamp.
    pub const UPDATED: FieldId = Uuid::from_u128(0xD9CF_14B1_FA16_4BA6_9288_E8A9_D6DC_DC8C);
    /// Last-updated-by actor.
    pub const UPDATED_BY: FieldId = Uuid::from_u128(0xBADD_9CF9_53E0_4D0C_BCC0_2D78_4C28_2F6A);
    /// Creation timestamp.
    pub const CREATED: FieldId = Uuid::from_u128(0x25BE_D78C_4957_4165_998A_CA1B_52F6_7497);
}

/// Fallback sharing table for fields whose template definition is gone.
///
/// Keyed by field id; a miss resolves to [`SharingType::Unknown`], which
/// makes the save path treat every scope as a candidate instead of
/// guessing one.
#[derive(Debug, Clone, Default)]
pub struct DefaultFieldSharing {
    entries: HashMap<FieldId, SharingType>,
}

impl DefaultFieldSharing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-seeded with the system fields every item carries.
    pub fn standard() -> Self {
        let mut sharing = Self::new();
        sharing.register(field_ids::REVISION, SharingType::Versioned);
        sharing.register(field_ids::UPDATED, SharingType::Versioned);
        sharing.register(field_ids::UPDATED_BY, SharingType::Versioned);
        sharing.register(field_ids::CREATED, SharingType::Versioned);
        sharing
    }

    pub fn register(&mut self, field_id: FieldId, sharing: SharingType) {
        self.entries.insert(field_id, sharing);
    }

    /// Sharing scope recorded for a field, or `Unknown` when the field has
    /// no entry.
    pub fn get(&self, field_id: FieldId) -> SharingType {
        self.entries
            .get(&field_id)
            .copied()
            .unwrap_or(SharingType::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn registered_field_resolves_to_its_entry() {
        let mut sharing = DefaultFieldSharing::new();
        let field_id = Uuid::new_v4();
        sharing.register(field_id, SharingType::Unversioned);
        assert_eq!(sharing.get(field_id), SharingType::Unversioned);
    }

    #[test]
    fn unregistered_field_resolves_unknown() {
        let sharing = DefaultFieldSharing::new();
        assert_eq!(sharing.get(Uuid::new_v4()), SharingType::Unknown);
    }

    #[test]
    fn standard_table_knows_system_fields() {
        let sharing = DefaultFieldSharing::standard();
        assert_eq!(sharing.get(field_ids::REVISION), SharingType::Versioned);
        assert_eq!(sharing.get(field_ids::UPDATED), SharingType::Versioned);
    }
}
