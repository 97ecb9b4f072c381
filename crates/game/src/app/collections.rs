use std::collections::{BTreeMap, BTreeSet};

use engine::{AreaDefId, ContentDatabase};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Shared (role-independent) hidden-object state for one area. Either twin's
/// finds count for both.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct AreaCollectionState {
    found: BTreeSet<String>,
    trophy: bool,
    postcard: bool,
    audio: bool,
}

/// Full shared-collection state keyed by area defName. Carried whole on
/// every collections event so observers never diff partial updates, and
/// persisted as-is in the save record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CollectionsSnapshot {
    pub finds_by_area: BTreeMap<String, Vec<String>>,
    pub trophies_by_area: Vec<String>,
    pub postcards_by_area: Vec<String>,
    pub audio_by_area: Vec<String>,
    pub camp_upgrades: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectionsChange {
    None,
    Updated { trophy_awarded: bool },
}

impl CollectionsChange {
    pub(crate) fn is_updated(self) -> bool {
        matches!(self, CollectionsChange::Updated { .. })
    }
}

#[derive(Debug, Error)]
pub(crate) enum CollectionsError {
    #[error("unknown area def id {area:?}; content validation should have caught this")]
    UnknownArea { area: AreaDefId },
    #[error("'{find}' is not a declared find of area '{area}'")]
    UnknownFind { area: String, find: String },
}

#[derive(Debug, Default)]
pub(crate) struct CollectionsSystem {
    by_area: BTreeMap<AreaDefId, AreaCollectionState>,
    camp_upgrades: BTreeSet<String>,
}

impl CollectionsSystem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Idempotent add. Completing the area's find set awards the trophy as a
    /// side effect, exactly once.
    pub(crate) fn record_find(
        &mut self,
        content: &ContentDatabase,
        area: AreaDefId,
        find_id: &str,
    ) -> Result<CollectionsChange, CollectionsError> {
        let area_def = content
            .area(area)
            .ok_or(CollectionsError::UnknownArea { area })?;
        if !area_def.has_find(find_id) {
            return Err(CollectionsError::UnknownFind {
                area: area_def.def_name.clone(),
                find: find_id.to_string(),
            });
        }
        let state = self.by_area.entry(area).or_default();
        if !state.found.insert(find_id.to_string()) {
            return Ok(CollectionsChange::None);
        }

        let mut trophy_awarded = false;
        if !state.trophy && state.found.len() == area_def.finds.len() {
            state.trophy = true;
            trophy_awarded = true;
            info!(area = %area_def.def_name, "area_trophy_awarded");
        }
        Ok(CollectionsChange::Updated { trophy_awarded })
    }

    /// Idempotent; the "serene action" postcard trigger.
    pub(crate) fn record_postcard(
        &mut self,
        content: &ContentDatabase,
        area: AreaDefId,
    ) -> Result<CollectionsChange, CollectionsError> {
        content
            .area(area)
            .ok_or(CollectionsError::UnknownArea { area })?;
        let state = self.by_area.entry(area).or_default();
        if state.postcard {
            return Ok(CollectionsChange::None);
        }
        state.postcard = true;
        Ok(CollectionsChange::Updated {
            trophy_awarded: false,
        })
    }

    pub(crate) fn record_audio_unlock(
        &mut self,
        content: &ContentDatabase,
        area: AreaDefId,
    ) -> Result<CollectionsChange, CollectionsError> {
        content
            .area(area)
            .ok_or(CollectionsError::UnknownArea { area })?;
        let state = self.by_area.entry(area).or_default();
        if state.audio {
            return Ok(CollectionsChange::None);
        }
        state.audio = true;
        Ok(CollectionsChange::Updated {
            trophy_awarded: false,
        })
    }

    pub(crate) fn record_camp_upgrade(&mut self, upgrade_id: &str) -> CollectionsChange {
        if self.camp_upgrades.insert(upgrade_id.to_string()) {
            CollectionsChange::Updated {
                trophy_awarded: false,
            }
        } else {
            CollectionsChange::None
        }
    }

    pub(crate) fn find_count(&self, area: AreaDefId) -> usize {
        self.by_area
            .get(&area)
            .map(|state| state.found.len())
            .unwrap_or(0)
    }

    pub(crate) fn is_found(&self, area: AreaDefId, find_id: &str) -> bool {
        self.by_area
            .get(&area)
            .is_some_and(|state| state.found.contains(find_id))
    }

    pub(crate) fn trophy_awarded(&self, area: AreaDefId) -> bool {
        self.by_area.get(&area).is_some_and(|state| state.trophy)
    }

    pub(crate) fn postcard_awarded(&self, area: AreaDefId) -> bool {
        self.by_area.get(&area).is_some_and(|state| state.postcard)
    }

    pub(crate) fn audio_unlocked(&self, area: AreaDefId) -> bool {
        self.by_area.get(&area).is_some_and(|state| state.audio)
    }

    pub(crate) fn snapshot(&self, content: &ContentDatabase) -> CollectionsSnapshot {
        let mut snapshot = CollectionsSnapshot::default();
        for (area, state) in &self.by_area {
            let Some(area_def) = content.area(*area) else {
                continue;
            };
            let name = area_def.def_name.clone();
            if !state.found.is_empty() {
                snapshot
                    .finds_by_area
                    .insert(name.clone(), state.found.iter().cloned().collect());
            }
            if state.trophy {
                snapshot.trophies_by_area.push(name.clone());
            }
            if state.postcard {
                snapshot.postcards_by_area.push(name.clone());
            }
            if state.audio {
                snapshot.audio_by_area.push(name);
            }
        }
        snapshot.camp_upgrades = self.camp_upgrades.iter().cloned().collect();
        snapshot
    }

    /// Save-restore entry point; trusts the caller to have resolved ids.
    pub(crate) fn restore_area(&mut self, area: AreaDefId, state: AreaCollectionState) {
        self.by_area.insert(area, state);
    }

    pub(crate) fn restore_camp_upgrades(
        &mut self,
        upgrades: impl IntoIterator<Item = String>,
    ) {
        self.camp_upgrades = upgrades.into_iter().collect();
    }

    pub(crate) fn reset(&mut self) {
        self.by_area.clear();
        self.camp_upgrades.clear();
    }
}

impl AreaCollectionState {
    pub(crate) fn from_saved(
        found: impl IntoIterator<Item = String>,
        trophy: bool,
        postcard: bool,
        audio: bool,
    ) -> Self {
        Self {
            found: found.into_iter().collect(),
            trophy,
            postcard,
            audio,
        }
    }
}
