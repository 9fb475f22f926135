//! Whitelist of legitimate merchants and products.
//!
//! Entries double as launch input: the selected rows decide what a patrol
//! searches for, and `allowed_shops` tells detection which storefronts are
//! legitimate. Entries persist to a JSON file; row selection is session
//! state and resets on restart.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// One whitelist row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistEntry {
    pub id: String,
    pub official_merchant_name: String,
    pub product_name: String,
    /// Kept as entered; the GUI treats price as free text.
    pub price: String,
    #[serde(default)]
    pub allowed_shops: Vec<String>,
}

/// Editable scalar fields of an entry. `allowed_shops` has its own
/// add/remove operations instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhitelistField {
    OfficialMerchantName,
    ProductName,
    Price,
}

#[derive(Debug, Error, PartialEq)]
pub enum WhitelistError {
    #[error("whitelist entry not found: {id}")]
    EntryNotFound { id: String },
    #[error("shop index {index} out of range for entry {id}")]
    ShopIndexOutOfRange { id: String, index: usize },
    #[error("failed to persist whitelist: {0}")]
    Persist(String),
}

/// Snapshot handed to the GUI: display-ordered entries plus which are
/// currently part of the launch selection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistView {
    pub entries: Vec<WhitelistEntry>,
    pub selected_ids: Vec<String>,
}

#[derive(Default)]
struct WhitelistState {
    entries: Vec<WhitelistEntry>,
    selected: HashSet<String>,
}

/// Shared, clonable whitelist manager backed by a JSON file.
#[derive(Clone)]
pub struct WhitelistManager {
    state: Arc<RwLock<WhitelistState>>,
    path: Arc<PathBuf>,
}

impl WhitelistManager {
    /// Loads the whitelist from `path`. A missing file seeds the demo entry
    /// (pre-selected, so a first launch works without setup) and writes it
    /// out; an unreadable or malformed file is an error rather than silent
    /// data loss.
    pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let state = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let bytes = tokio::fs::read(&path).await?;
            let entries: Vec<WhitelistEntry> = serde_json::from_slice(&bytes)?;
            info!(path = %path.display(), entries = entries.len(), "loaded whitelist");
            WhitelistState { entries, selected: HashSet::new() }
        } else {
            let entries = seed_entries();
            let selected = entries.iter().map(|e| e.id.clone()).collect();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, serde_json::to_vec_pretty(&entries)?).await?;
            info!(path = %path.display(), "seeded new whitelist");
            WhitelistState { entries, selected }
        };
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            path: Arc::new(path),
        })
    }

    async fn save(&self, entries: &[WhitelistEntry]) -> Result<(), WhitelistError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| WhitelistError::Persist(e.to_string()))?;
        tokio::fs::write(self.path.as_ref(), bytes)
            .await
            .map_err(|e| WhitelistError::Persist(e.to_string()))
    }

    pub async fn view(&self) -> WhitelistView {
        let state = self.state.read().await;
        let selected_ids = state
            .entries
            .iter()
            .filter(|e| state.selected.contains(&e.id))
            .map(|e| e.id.clone())
            .collect();
        WhitelistView { entries: state.entries.clone(), selected_ids }
    }

    pub async fn entries(&self) -> Vec<WhitelistEntry> {
        self.state.read().await.entries.clone()
    }

    /// Selected entries in display order.
    pub async fn selected_entries(&self) -> Vec<WhitelistEntry> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .filter(|e| state.selected.contains(&e.id))
            .cloned()
            .collect()
    }

    /// Appends a blank row and returns it.
    pub async fn add(&self) -> Result<WhitelistEntry, WhitelistError> {
        let entry = WhitelistEntry {
            id: Uuid::new_v4().to_string(),
            official_merchant_name: String::new(),
            product_name: String::new(),
            price: String::new(),
            allowed_shops: Vec::new(),
        };
        let mut state = self.state.write().await;
        state.entries.push(entry.clone());
        self.save(&state.entries).await?;
        Ok(entry)
    }

    /// Sets one scalar field and returns the updated entry.
    pub async fn update_field(
        &self,
        id: &str,
        field: WhitelistField,
        value: String,
    ) -> Result<WhitelistEntry, WhitelistError> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| WhitelistError::EntryNotFound { id: id.to_owned() })?;
        match field {
            WhitelistField::OfficialMerchantName => entry.official_merchant_name = value,
            WhitelistField::ProductName => entry.product_name = value,
            WhitelistField::Price => entry.price = value,
        }
        let updated = entry.clone();
        self.save(&state.entries).await?;
        Ok(updated)
    }

    /// Removes a row. The id also leaves the selection set, so a removed
    /// entry can never linger in a launch.
    pub async fn remove(&self, id: &str) -> Result<(), WhitelistError> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|e| e.id != id);
        if state.entries.len() == before {
            return Err(WhitelistError::EntryNotFound { id: id.to_owned() });
        }
        state.selected.remove(id);
        self.save(&state.entries).await
    }

    /// Flips selection for a row; returns the new selected state.
    pub async fn toggle_select(&self, id: &str) -> Result<bool, WhitelistError> {
        let mut state = self.state.write().await;
        if !state.entries.iter().any(|e| e.id == id) {
            return Err(WhitelistError::EntryNotFound { id: id.to_owned() });
        }
        if state.selected.remove(id) {
            Ok(false)
        } else {
            state.selected.insert(id.to_owned());
            Ok(true)
        }
    }

    /// Selects every row; returns how many are now selected.
    pub async fn select_all(&self) -> usize {
        let mut state = self.state.write().await;
        let ids: Vec<String> = state.entries.iter().map(|e| e.id.clone()).collect();
        state.selected = ids.into_iter().collect();
        state.selected.len()
    }

    /// Clears the selection; returns how many rows were deselected.
    pub async fn clear_selection(&self) -> usize {
        let mut state = self.state.write().await;
        let n = state.selected.len();
        state.selected.clear();
        n
    }

    /// Adds a shop to an entry's allowed list. Input is trimmed; an empty
    /// result is ignored and reported as `Ok(false)`.
    pub async fn add_shop(&self, id: &str, shop: &str) -> Result<bool, WhitelistError> {
        let shop = shop.trim();
        if shop.is_empty() {
            return Ok(false);
        }
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| WhitelistError::EntryNotFound { id: id.to_owned() })?;
        entry.allowed_shops.push(shop.to_owned());
        self.save(&state.entries).await?;
        Ok(true)
    }

    /// Removes the shop at `index` from an entry's allowed list.
    pub async fn remove_shop(&self, id: &str, index: usize) -> Result<(), WhitelistError> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| WhitelistError::EntryNotFound { id: id.to_owned() })?;
        if index >= entry.allowed_shops.len() {
            return Err(WhitelistError::ShopIndexOutOfRange { id: id.to_owned(), index });
        }
        entry.allowed_shops.remove(index);
        self.save(&state.entries).await
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

/// Demo row shipped on first run, mirroring the product's sample data.
fn seed_entries() -> Vec<WhitelistEntry> {
    vec![WhitelistEntry {
        id: "1".to_owned(),
        official_merchant_name: "官方出版社".to_owned(),
        product_name: "2025法考全套资料".to_owned(),
        price: "299".to_owned(),
        allowed_shops: vec![
            "官方旗舰店".to_owned(),
            "正版分销商".to_owned(),
            "法律社直营".to_owned(),
        ],
    }]
}
