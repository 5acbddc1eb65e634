/// Read-only world view handed to the bridge by the game.
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::entity::{Entity, EntityId};

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("duplicate entity id {0:?}")]
    DuplicateId(EntityId),
}

/// World state passed by the game to the narration bridge.
///
/// The bridge only ever holds a shared borrow, so narration cannot change
/// anything the game has decided.
#[derive(Clone, Copy)]
pub struct WorldState<'a> {
    pub entities: &'a HashMap<EntityId, Entity>,
}

impl<'a> WorldState<'a> {
    pub fn new(entities: &'a HashMap<EntityId, Entity>) -> Self {
        Self { entities }
    }

    pub fn get(&self, id: EntityId) -> Option<&'a Entity> {
        self.entities.get(&id)
    }

    /// Resolve an NDL entity key.
    ///
    /// Tried in order: exact handle, case-insensitive name, the last
    /// dotted segment as a handle (`npc.innkeeper`), then a numeric id.
    /// Ties are broken by lowest id so resolution never depends on map order.
    pub fn resolve(&self, key: &str) -> Option<&'a Entity> {
        if let Some(e) = self.first_where(|e| e.handle == key) {
            return Some(e);
        }
        let folded = key.to_lowercase();
        if let Some(e) = self.first_where(|e| e.name.to_lowercase() == folded) {
            return Some(e);
        }
        if let Some((_, last)) = key.rsplit_once('.') {
            if let Some(e) = self.first_where(|e| e.handle == last) {
                return Some(e);
            }
        }
        key.parse::<u64>()
            .ok()
            .and_then(|id| self.entities.get(&EntityId(id)))
    }

    fn first_where<F>(&self, pred: F) -> Option<&'a Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        self.entities
            .values()
            .filter(|e| pred(*e))
            .min_by_key(|e| e.id)
    }

    /// Entities sorted by id, for deterministic iteration.
    pub fn sorted(&self) -> Vec<&'a Entity> {
        let mut all: Vec<&Entity> = self.entities.values().collect();
        all.sort_by_key(|e| e.id);
        all
    }
}

/// Load a list of entities from a RON file into an id-keyed table.
pub fn load_entities_from_ron(path: &Path) -> Result<HashMap<EntityId, Entity>, WorldError> {
    let contents = std::fs::read_to_string(path)?;
    parse_entities_ron(&contents)
}

/// Parse a RON list of entities into an id-keyed table.
pub fn parse_entities_ron(input: &str) -> Result<HashMap<EntityId, Entity>, WorldError> {
    let list: Vec<Entity> = ron::from_str(input)?;
    let mut entities = HashMap::with_capacity(list.len());
    for entity in list {
        let id = entity.id;
        if entities.insert(id, entity).is_some() {
            return Err(WorldError::DuplicateId(id));
        }
    }
    Ok(entities)
}
