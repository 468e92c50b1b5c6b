//! Persistence - JSON documents over a [`StoragePort`] with self-healing load
//!
//! Loading never fails because of corrupted data: duplicate macro ids,
//! dangling active ids, a missing default category and unparsable documents
//! are repaired in memory and the cleaned documents are written back
//! immediately. Only storage I/O errors propagate.

use super::active_set::ActiveSet;
use super::macro_store::MacroStore;
use super::ordering::OrderingMap;
use super::storage::{Document, StoragePort};
use crate::model::{MacroCategory, MacroDefinition};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the load had to repair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Macro records dropped because their id was already loaded
    pub duplicate_macros: usize,
    /// Active ids that referenced no stored macro
    pub dangling_active: Vec<String>,
    /// The default category had to be recreated
    pub default_category_restored: bool,
    /// Documents that could not be parsed and were reset
    pub corrupt_documents: Vec<Document>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self == &LoadReport::default()
    }
}

/// Everything the coordinator needs at startup
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub store: MacroStore,
    pub active: ActiveSet,
    pub ordering: OrderingMap,
    pub report: LoadReport,
}

enum Decoded<T> {
    Missing,
    Parsed(T),
    Corrupt,
}

/// Typed access to the persisted documents
#[derive(Clone)]
pub struct Persistence {
    port: Arc<dyn StoragePort>,
}

impl Persistence {
    pub fn new(port: Arc<dyn StoragePort>) -> Self {
        Self { port }
    }

    async fn decode<T: DeserializeOwned>(&self, doc: Document) -> Result<Decoded<T>> {
        let Some(raw) = self
            .port
            .read(doc.key())
            .await
            .with_context(|| format!("Failed to read '{}'", doc))?
        else {
            return Ok(Decoded::Missing);
        };

        match serde_json::from_slice::<T>(&raw) {
            Ok(value) => Ok(Decoded::Parsed(value)),
            Err(e) => {
                error!("Persisted '{}' is unparsable, resetting it: {}", doc, e);
                // Keep the broken bytes around for manual recovery
                if let Err(e) = self.port.write(&doc.corrupt_key(), raw).await {
                    warn!("Failed to back up corrupt '{}': {}", doc, e);
                }
                Ok(Decoded::Corrupt)
            }
        }
    }

    async fn encode<T: Serialize + ?Sized>(&self, doc: Document, value: &T) -> Result<()> {
        let json = serde_json::to_vec(value)
            .with_context(|| format!("Failed to serialize '{}'", doc))?;
        self.port
            .write(doc.key(), json)
            .await
            .with_context(|| format!("Failed to write '{}'", doc))
    }

    /// Load and repair all documents
    pub async fn load(&self) -> Result<LoadedState> {
        let mut report = LoadReport::default();

        let (records, macros_dirty) = match self.decode::<Vec<MacroDefinition>>(Document::Macros).await? {
            Decoded::Parsed(records) => (records, false),
            Decoded::Missing => (Vec::new(), false),
            Decoded::Corrupt => {
                report.corrupt_documents.push(Document::Macros);
                (Vec::new(), true)
            }
        };

        let (categories, mut categories_dirty) =
            match self.decode::<Vec<MacroCategory>>(Document::Categories).await? {
                Decoded::Parsed(categories) => (categories, false),
                Decoded::Missing => (Vec::new(), false),
                Decoded::Corrupt => {
                    report.corrupt_documents.push(Document::Categories);
                    (Vec::new(), true)
                }
            };

        let (mut active, mut active_dirty) = match self.decode::<ActiveSet>(Document::ActiveSet).await? {
            Decoded::Parsed(active) => (active, false),
            Decoded::Missing => (ActiveSet::new(), false),
            Decoded::Corrupt => {
                report.corrupt_documents.push(Document::ActiveSet);
                (ActiveSet::new(), true)
            }
        };

        let (ordering, ordering_dirty) = match self.decode::<OrderingMap>(Document::Ordering).await? {
            Decoded::Parsed(ordering) => (ordering, false),
            Decoded::Missing => (OrderingMap::new(), false),
            Decoded::Corrupt => {
                report.corrupt_documents.push(Document::Ordering);
                (OrderingMap::new(), true)
            }
        };

        let (mut store, duplicates) = MacroStore::from_records(records, categories);
        report.duplicate_macros = duplicates;
        if duplicates > 0 {
            warn!("Dropped {} macro record(s) with duplicate ids", duplicates);
        }

        if store.ensure_default_category() {
            report.default_category_restored = true;
            categories_dirty = true;
            debug!("Default category was missing, recreated it");
        }

        report.dangling_active = active.retain_known(&store);
        if !report.dangling_active.is_empty() {
            warn!(
                "Dropped {} active id(s) referencing missing macros: {:?}",
                report.dangling_active.len(),
                report.dangling_active
            );
            active_dirty = true;
        }

        if duplicates > 0 || macros_dirty {
            self.save_macros(&store).await?;
        }
        if categories_dirty {
            self.save_categories(&store).await?;
        }
        if active_dirty {
            self.save_active(&active).await?;
        }
        if ordering_dirty {
            self.save_ordering(&ordering).await?;
        }

        info!(
            "Loaded {} macro(s), {} categories, {} active",
            store.len(),
            store.categories().len(),
            active.len()
        );

        Ok(LoadedState {
            store,
            active,
            ordering,
            report,
        })
    }

    pub async fn save_macros(&self, store: &MacroStore) -> Result<()> {
        self.encode(Document::Macros, &store.to_records()).await
    }

    pub async fn save_categories(&self, store: &MacroStore) -> Result<()> {
        self.encode(Document::Categories, store.categories()).await
    }

    pub async fn save_active(&self, active: &ActiveSet) -> Result<()> {
        self.encode(Document::ActiveSet, active).await
    }

    pub async fn save_ordering(&self, ordering: &OrderingMap) -> Result<()> {
        self.encode(Document::Ordering, ordering).await
    }
}
