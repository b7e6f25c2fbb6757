use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A single visual variant of an actor, e.g. the "angry" face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorAttribute {
    pub attribute_id: String,
    /// Opaque asset key, resolved by the presentation layer.
    pub asset: String,
}

/// All variants of one attribute type ("face", "outfit", ...).
///
/// In a script: `~ actor_attributes("<attribute_type_id>:<attribute_id>")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeArray {
    pub attribute_type_id: String,
    #[serde(default)]
    pub attributes: Vec<ActorAttribute>,
}

/// A character the script can address with `~ actor("<actor_id>")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorDefinition {
    pub actor_id: String,
    pub display_name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeArray>,
}

/// A named group of actor definitions, typically one file per chapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorCollection {
    pub actors: Vec<ActorDefinition>,
}

impl ActorCollection {
    pub fn load_from_ron(path: &Path) -> Result<ActorCollection, ActorError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<ActorCollection, ActorError> {
        let actors: Vec<ActorDefinition> = ron::from_str(input)?;
        Ok(Self { actors })
    }
}

#[derive(Debug, Clone)]
struct ActorEntry {
    definition: ActorDefinition,
    default_attribute_per_type: FxHashMap<String, ActorAttribute>,
}

/// Lookup table from script actor ids to definitions and attributes.
///
/// The first registration of an actor id wins; later collections only add
/// attributes that are not registered yet. The first attribute listed for
/// each type becomes that type's default.
#[derive(Debug, Clone, Default)]
pub struct ActorRegistry {
    actors: FxHashMap<String, ActorEntry>,
    attributes: FxHashMap<(String, String, String), ActorAttribute>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_collection(&mut self, collection: &ActorCollection) {
        for actor in &collection.actors {
            let actor_id = actor.actor_id.clone();
            let entry = self
                .actors
                .entry(actor_id.clone())
                .or_insert_with(|| ActorEntry {
                    definition: actor.clone(),
                    default_attribute_per_type: FxHashMap::default(),
                });

            for array in &actor.attributes {
                let type_id = &array.attribute_type_id;
                for attribute in &array.attributes {
                    self.attributes
                        .entry((
                            actor_id.clone(),
                            type_id.clone(),
                            attribute.attribute_id.clone(),
                        ))
                        .or_insert_with(|| attribute.clone());
                }

                if let Some(first) = array.attributes.first() {
                    entry
                        .default_attribute_per_type
                        .entry(type_id.clone())
                        .or_insert_with(|| first.clone());
                }
            }
        }
    }

    /// Forget every attribute contributed by the collection's actors.
    pub fn release_collection(&mut self, collection: &ActorCollection) {
        for actor in &collection.actors {
            for array in &actor.attributes {
                for attribute in &array.attributes {
                    self.attributes.remove(&(
                        actor.actor_id.clone(),
                        array.attribute_type_id.clone(),
                        attribute.attribute_id.clone(),
                    ));
                }
            }
        }
    }

    pub fn release_all(&mut self) {
        self.attributes.clear();
    }

    pub fn try_get_actor(&self, actor_id: &str) -> Option<&ActorDefinition> {
        self.actors.get(actor_id).map(|entry| &entry.definition)
    }

    /// Find an attribute, falling back to the actor's default for the type
    /// when `attribute_id` is not registered (or left empty by the script).
    pub fn try_get_attribute(
        &self,
        actor_id: &str,
        attribute_type_id: &str,
        attribute_id: &str,
    ) -> Option<&ActorAttribute> {
        let key = (
            actor_id.to_string(),
            attribute_type_id.to_string(),
            attribute_id.to_string(),
        );
        if let Some(attribute) = self.attributes.get(&key) {
            return Some(attribute);
        }

        let fallback = self
            .actors
            .get(actor_id)
            .and_then(|entry| entry.default_attribute_per_type.get(attribute_type_id));

        if fallback.is_none() {
            log::error!(
                "no attribute found for actor=\"{}\", type=\"{}\", attribute=\"{}\"",
                actor_id,
                attribute_type_id,
                attribute_id
            );
        }
        fallback
    }
}
