use std::collections::BTreeSet;

use serde_json::Value;

use genmedia_core::config::ResolverConfig;
use genmedia_core::graph::NodeData;
use genmedia_core::types::ArtifactId;

const REF_SUFFIX: &str = "Ref";
const LOCATOR_SUFFIX: &str = "Url";
const EXISTS_SUFFIX: &str = "Exists";
const NESTED_MAP: &str = "outputs";

/// Which node data fields hold artifact ids, and what their companions are
/// called.
///
/// Two places are scanned: the configured top-level keys (`imageRef`, ...)
/// and every string-valued key ending in `Ref` inside the `outputs` map.
#[derive(Debug, Clone)]
pub struct ReferenceConvention {
    top_level_keys: Vec<String>,
}

impl ReferenceConvention {
    pub fn new(top_level_keys: Vec<String>) -> Self {
        Self { top_level_keys }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.reference_keys.clone())
    }

    /// `imageRef` -> `imageUrl`. Keys without the suffix get `Url` appended
    /// so the companion never overwrites the reference itself.
    pub fn locator_key(&self, key: &str) -> String {
        match key.strip_suffix(REF_SUFFIX) {
            Some(stem) => format!("{}{}", stem, LOCATOR_SUFFIX),
            None => format!("{}{}", key, LOCATOR_SUFFIX),
        }
    }

    /// `imageRef` -> `imageRefExists`.
    pub fn exists_key(&self, key: &str) -> String {
        format!("{}{}", key, EXISTS_SUFFIX)
    }

    /// Top-level reference keys present in `data`.
    pub fn top_level_refs<'a>(
        &'a self,
        data: &'a NodeData,
    ) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.top_level_keys
            .iter()
            .filter_map(move |key| data.get(key).map(|value| (key.as_str(), value)))
    }

    /// String-valued `*Ref` keys of the nested `outputs` map.
    pub fn nested_refs<'a>(&self, data: &'a NodeData) -> impl Iterator<Item = (&'a str, &'a str)> {
        data.get(NESTED_MAP)
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|outputs| outputs.iter())
            .filter(|(key, _)| key.ends_with(REF_SUFFIX))
            .filter_map(|(key, value)| value.as_str().map(|id| (key.as_str(), id)))
    }

    pub fn nested_map_key(&self) -> &'static str {
        NESTED_MAP
    }

    /// Whether the node carries any reference field at all.
    pub fn has_refs(&self, data: &NodeData) -> bool {
        self.top_level_refs(data).next().is_some() || self.nested_refs(data).next().is_some()
    }

    /// Every distinct artifact id referenced by `data`, added to `ids`.
    ///
    /// Non-string values under a top-level key are not ids and are skipped.
    pub fn collect_ids(&self, data: &NodeData, ids: &mut BTreeSet<ArtifactId>) {
        for (_, value) in self.top_level_refs(data) {
            if let Some(id) = value.as_str() {
                ids.insert(ArtifactId::from(id));
            }
        }
        for (_, id) in self.nested_refs(data) {
            ids.insert(ArtifactId::from(id));
        }
    }
}

impl Default for ReferenceConvention {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}
