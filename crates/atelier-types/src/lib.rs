//! Shared type definitions for the Atelier client-side store.
//!
//! This crate is the single source of truth for every persisted entity and
//! for the structured results handed back to the UI layer. Types flow
//! downstream to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`collection`] -- The closed set of collection names
//! - [`enums`] -- Enumerations used inside entities (ticket status, shapes, themes)
//! - [`structs`] -- Persisted entity structs and the [`Entity`] trait
//! - [`transfer`] -- Export snapshots, import/migration results, storage statistics

pub mod collection;
pub mod enums;
pub mod structs;
pub mod transfer;

// Re-export all public types at crate root for convenience.
pub use collection::{Collection, UnknownCollection};
pub use enums::{Connector, NodeShape, Priority, Theme, TicketStatus, TicketType};
pub use structs::{
    Checklist, ChecklistPage, Entity, MetadataEntry, MindMap, MindMapNode, Pan, Palette, Skill,
    SkillCategory, SkillsProfile, Ticket, ToolConfig, USER_PREFERENCES_KEY, UserPreferences,
};
pub use transfer::{
    DataExport, EXPORT_FORMAT_VERSION, ExportData, ImportOptions, ImportResult, LastMigration,
    MigrationResult, StorageStats,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the UI layer.

    #[test]
    fn export_bindings() {
        // ts-rs writes the bindings when `export_all` runs. The files land
        // in `bindings/` relative to the crate root.
        use ts_rs::TS;

        // Collections and enums
        let _ = crate::collection::Collection::export_all();
        let _ = crate::enums::Priority::export_all();
        let _ = crate::enums::TicketStatus::export_all();
        let _ = crate::enums::TicketType::export_all();
        let _ = crate::enums::NodeShape::export_all();
        let _ = crate::enums::Connector::export_all();
        let _ = crate::enums::Theme::export_all();

        // Entities
        let _ = crate::structs::Palette::export_all();
        let _ = crate::structs::Ticket::export_all();
        let _ = crate::structs::MindMapNode::export_all();
        let _ = crate::structs::Pan::export_all();
        let _ = crate::structs::MindMap::export_all();
        let _ = crate::structs::ChecklistPage::export_all();
        let _ = crate::structs::Checklist::export_all();
        let _ = crate::structs::Skill::export_all();
        let _ = crate::structs::SkillCategory::export_all();
        let _ = crate::structs::SkillsProfile::export_all();
        let _ = crate::structs::ToolConfig::export_all();
        let _ = crate::structs::UserPreferences::export_all();
        let _ = crate::structs::MetadataEntry::export_all();

        // Transfer and results
        let _ = crate::transfer::DataExport::export_all();
        let _ = crate::transfer::ExportData::export_all();
        let _ = crate::transfer::ImportOptions::export_all();
        let _ = crate::transfer::ImportResult::export_all();
        let _ = crate::transfer::MigrationResult::export_all();
        let _ = crate::transfer::LastMigration::export_all();
        let _ = crate::transfer::StorageStats::export_all();
    }
}
