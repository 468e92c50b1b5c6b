//! Export/import bundle
//!
//! A bundle is a self-contained JSON snapshot of macros, categories and the
//! active set. Importing never overwrites: ids that already exist, and
//! macros that would take a role their group already has, are skipped and
//! counted.

use crate::coordinator::{ActivationOutcome, Coordinator, EngineEvent, Resolution};
use crate::model::{validate_trigger, MacroCategory, MacroDefinition, DEFAULT_CATEGORY_ID};
use crate::store::Document;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Bundle format version written by this build
pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub macros: Vec<MacroDefinition>,
    #[serde(default)]
    pub categories: Vec<MacroCategory>,
    #[serde(default)]
    pub active_macro_ids: Vec<String>,
}

impl ExportBundle {
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize bundle")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write bundle: {}", path.display()))?;
        info!("📦 Exported {} macro(s) to {}", self.macros.len(), path.display());
        Ok(())
    }

    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read bundle: {}", path.display()))?;
        let bundle: ExportBundle = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse bundle: {}", path.display()))?;
        if bundle.version > BUNDLE_VERSION {
            warn!(
                "Bundle version {} is newer than supported version {}",
                bundle.version, BUNDLE_VERSION
            );
        }
        Ok(bundle)
    }
}

/// Imported/skipped counts for one bundle section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionCount {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub macros: SectionCount,
    pub categories: SectionCount,
    pub active: SectionCount,
}

impl Coordinator {
    /// Snapshot everything into a bundle
    pub async fn export_bundle(&self) -> ExportBundle {
        let state = self.state.read().await;
        ExportBundle {
            version: BUNDLE_VERSION,
            exported_at: Utc::now(),
            macros: state.store.to_records(),
            categories: state.store.categories().to_vec(),
            active_macro_ids: state.active.to_vec(),
        }
    }

    /// Merge a bundle into the current state
    ///
    /// Active ids go through the normal activation path; an id that is
    /// already active, or whose activation would conflict, is skipped.
    pub async fn import_bundle(&self, bundle: ExportBundle) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        {
            let mut state = self.state.write().await;

            for category in bundle.categories {
                if state.store.has_category(&category.id) {
                    debug!("Import: category '{}' exists, skipping", category.id);
                    report.categories.skipped += 1;
                    continue;
                }
                state.store.add_category(category)?;
                report.categories.imported += 1;
            }

            for mut def in bundle.macros {
                if state.store.contains(&def.id) {
                    debug!("Import: macro '{}' exists, skipping", def.id);
                    report.macros.skipped += 1;
                    continue;
                }
                if let Err(reason) = validate_trigger(&def.trigger) {
                    warn!("Import: macro '{}' has a malformed trigger: {}", def.id, reason);
                    report.macros.skipped += 1;
                    continue;
                }
                if let Some(group) = &def.group_id {
                    let role = def.role_or_standard();
                    let taken = state
                        .store
                        .members_of_key(group)
                        .into_iter()
                        .any(|m| m.role_or_standard() == role);
                    if taken {
                        warn!(
                            "Import: macro '{}' duplicates role {} in group '{}', skipping",
                            def.id, role, group
                        );
                        report.macros.skipped += 1;
                        continue;
                    }
                }
                if !state.store.has_category(def.category()) {
                    def.category_id = Some(DEFAULT_CATEGORY_ID.to_string());
                }
                state.store.upsert(def);
                report.macros.imported += 1;
            }
        }

        if report.categories.imported > 0 {
            self.persist(&[Document::Categories]).await?;
            self.notify(EngineEvent::CategoriesChanged);
        }
        if report.macros.imported > 0 {
            self.persist(&[Document::Macros]).await?;
            self.notify(EngineEvent::MacrosChanged);
        }

        let mut seen = HashSet::new();
        let mut activated_here: HashSet<String> = HashSet::new();
        for id in bundle.active_macro_ids {
            if !seen.insert(id.clone()) {
                report.active.skipped += 1;
                continue;
            }
            // Pulled in by an earlier member of the same group
            if activated_here.contains(&id) {
                report.active.imported += 1;
                continue;
            }
            if self.is_active(&id).await {
                report.active.skipped += 1;
                continue;
            }

            match self.activate(&id).await? {
                ActivationOutcome::Activated(group) if group.activated.contains(&id) => {
                    activated_here.extend(group.activated);
                    report.active.imported += 1;
                }
                ActivationOutcome::Pending(pending) => {
                    debug!("Import: activation of '{}' conflicts, skipping", id);
                    self.resolve(pending, Resolution::Cancel).await?;
                    report.active.skipped += 1;
                }
                _ => report.active.skipped += 1,
            }
        }

        info!(
            "📦 Imported macros {}/{} skipped, categories {}/{} skipped, active {}/{} skipped",
            report.macros.imported,
            report.macros.skipped,
            report.categories.imported,
            report.categories.skipped,
            report.active.imported,
            report.active.skipped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ConsoleBackend;
    use crate::model::{MacroRole, MacroTrigger};
    use crate::store::MemoryStorage;
    use std::sync::Arc;

    async fn coordinator() -> Coordinator {
        Coordinator::load(Arc::new(MemoryStorage::new()), Arc::new(ConsoleBackend::new("test")))
            .await
            .unwrap()
    }

    fn pad(id: &str, note: u8) -> MacroDefinition {
        MacroDefinition::new(id, MacroTrigger::note_on(0, note))
    }

    #[tokio::test]
    async fn test_export_import_into_empty_engine() {
        let source = coordinator().await;
        source
            .create_category(MacroCategory::new("live", "Live", "#ff0000"))
            .await
            .unwrap();
        source.save_macro(pad("a", 36).in_category("live")).await.unwrap();
        source.save_macro(pad("b", 37)).await.unwrap();
        source.activate("a").await.unwrap();

        let bundle = source.export_bundle().await;
        assert_eq!(bundle.version, BUNDLE_VERSION);
        assert_eq!(bundle.active_macro_ids, vec!["a"]);

        let target = coordinator().await;
        let report = target.import_bundle(bundle).await.unwrap();
        assert_eq!(report.macros, SectionCount { imported: 2, skipped: 0 });
        // "default" already exists in every engine
        assert_eq!(report.categories, SectionCount { imported: 1, skipped: 1 });
        assert_eq!(report.active, SectionCount { imported: 1, skipped: 0 });
        assert_eq!(target.active_ids().await, vec!["a"]);
        assert_eq!(target.get_macro("a").await.unwrap().category(), "live");
    }

    #[tokio::test]
    async fn test_existing_id_is_skipped_and_unchanged() {
        let target = coordinator().await;
        let mut original = pad("a", 36);
        original.name = Some("original".to_string());
        target.save_macro(original).await.unwrap();

        let mut incoming = pad("a", 99);
        incoming.name = Some("incoming".to_string());
        let bundle = ExportBundle {
            version: BUNDLE_VERSION,
            exported_at: Utc::now(),
            macros: vec![incoming, pad("b", 40), pad("b", 41)],
            categories: Vec::new(),
            active_macro_ids: Vec::new(),
        };

        let report = target.import_bundle(bundle).await.unwrap();
        assert_eq!(report.macros, SectionCount { imported: 1, skipped: 2 });

        let kept = target.get_macro("a").await.unwrap();
        assert_eq!(kept.name.as_deref(), Some("original"));
        assert_eq!(kept.trigger.note, Some(36));
        assert_eq!(target.get_macro("b").await.unwrap().trigger.note, Some(40));
    }

    #[tokio::test]
    async fn test_conflicting_active_ids_are_skipped() {
        let target = coordinator().await;
        target.save_macro(pad("live", 36)).await.unwrap();
        target.activate("live").await.unwrap();

        let bundle = ExportBundle {
            version: BUNDLE_VERSION,
            exported_at: Utc::now(),
            macros: vec![pad("clash", 36), pad("free", 37)],
            categories: Vec::new(),
            active_macro_ids: vec!["clash".to_string(), "free".to_string(), "live".to_string()],
        };

        let report = target.import_bundle(bundle).await.unwrap();
        assert_eq!(report.active, SectionCount { imported: 1, skipped: 2 });
        assert_eq!(target.active_ids().await, vec!["free", "live"]);
        assert!(target.pending_tokens().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_group_role_is_skipped() {
        let target = coordinator().await;
        let encoder = vec![
            MacroDefinition::new("inc", MacroTrigger::control_change(1, 10))
                .in_group("enc", MacroRole::EncoderIncrement),
            MacroDefinition::new("dec", MacroTrigger::control_change(1, 11))
                .in_group("enc", MacroRole::EncoderDecrement),
        ];
        target.save_group("enc", encoder).await.unwrap();

        let bundle = ExportBundle {
            version: BUNDLE_VERSION,
            exported_at: Utc::now(),
            macros: vec![
                MacroDefinition::new("inc2", MacroTrigger::control_change(1, 12))
                    .in_group("enc", MacroRole::EncoderIncrement),
                MacroDefinition::new("click", MacroTrigger::note_on(1, 32))
                    .in_group("enc", MacroRole::EncoderClick),
            ],
            categories: Vec::new(),
            active_macro_ids: Vec::new(),
        };

        let report = target.import_bundle(bundle).await.unwrap();
        assert_eq!(report.macros, SectionCount { imported: 1, skipped: 1 });
        assert!(target.get_macro("inc2").await.is_none());
        assert_eq!(target.group_members("enc").await.len(), 3);

        let outcome = target.activate_group("enc").await.unwrap();
        assert_eq!(outcome.report().unwrap().activated.len(), 3);
    }

    #[tokio::test]
    async fn test_bundle_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.json");

        let source = coordinator().await;
        source.save_macro(pad("a", 36)).await.unwrap();
        let bundle = source.export_bundle().await;
        bundle.save_to_file(&path).await.unwrap();

        let loaded = ExportBundle::load_from_file(&path).await.unwrap();
        assert_eq!(loaded, bundle);
        assert!(ExportBundle::load_from_file(dir.path().join("missing.json"))
            .await
            .is_err());
    }
}
