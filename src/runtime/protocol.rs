use serde::{Deserialize, Serialize};

use crate::inject::WasmAsset;

/// Messages pushed to the page over the HMR channel, JSON-encoded with a
/// `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HmrMessage {
    /// Full page reload.
    Reload,
    /// Swap one module in place, keeping its saved state.
    WasmReload {
        module_id: String,
        #[serde(alias = "new_wasm_url")]
        wasm_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
        /// URL of the instance being replaced. Without it every instance
        /// of `module_id` is disposed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replaces: Option<String>,
    },
    /// Components sharing a style scope changed.
    ComponentUpdate { component_id: String },
    /// Replace the page's injected styles.
    StyleUpdate { content: String, hash: String },
    /// A rebuild failed; the page keeps running the old modules.
    Error { message: String },
}

impl HmrMessage {
    pub fn wasm_reload(module_id: impl Into<String>, asset: &WasmAsset) -> Self {
        HmrMessage::WasmReload {
            module_id: module_id.into(),
            wasm_url: asset.wasm_path.clone(),
            hash: Some(asset.hash.clone()),
            replaces: None,
        }
    }

    /// Swaps the single instance loaded from `old` for `new`, leaving the
    /// page's other modules running.
    pub fn wasm_swap(module_id: impl Into<String>, old: &WasmAsset, new: &WasmAsset) -> Self {
        HmrMessage::WasmReload {
            module_id: module_id.into(),
            wasm_url: new.wasm_path.clone(),
            hash: Some(new.hash.clone()),
            replaces: Some(old.wasm_path.clone()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
