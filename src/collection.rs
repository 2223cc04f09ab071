//! Entities returned by a one-to-many traversal, keyed by id in read order.

use crate::entity::{Entity, FlattenOptions, Related};
use crate::error::Result;
use crate::id::Id;
use indexmap::IndexMap;
use serde_json::Value;

#[derive(Clone, Debug, Default)]
pub struct Collection {
    items: IndexMap<Id, Entity>,
}

impl FromIterator<Entity> for Collection {
    fn from_iter<T: IntoIterator<Item = Entity>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|e| (e.id().clone(), e)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = indexmap::map::Values<'a, Id, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.values()
    }
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// One slot per entity; `None` where the field is absent.
    pub fn get(&self, field: &str) -> Vec<Option<&Value>> {
        self.items.values().map(|e| e.get(field)).collect()
    }

    pub fn pos(&self, index: usize) -> Option<&Entity> {
        self.items.get_index(index).map(|(_, e)| e)
    }

    pub fn all(&self) -> Vec<&Entity> {
        self.items.values().collect()
    }

    pub fn id(&self, id: &Id) -> Option<&Entity> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.items.values()
    }

    /// Everything attached under `alias` across the collection, as one
    /// collection. Entities that never read that relationship contribute
    /// nothing.
    pub fn select(&self, alias: &str) -> Collection {
        let mut out = Collection::new();
        for entity in self.items.values() {
            match entity.attached(alias) {
                Some(Related::One(Some(e))) => {
                    out.items.insert(e.id().clone(), e.clone());
                }
                Some(Related::Many(c)) => {
                    for e in c {
                        out.items.insert(e.id().clone(), e.clone());
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// [`Entity::read_in`] on every member concurrently. Results line up
    /// with [`Collection::pos`].
    pub async fn read_in(&mut self, selector: &str, filters: Option<&Value>) -> Vec<Result<Related>> {
        futures::future::join_all(
            self.items
                .values_mut()
                .map(|e| e.read_in(selector, filters)),
        )
        .await
    }

    pub fn flatten(&self, opts: FlattenOptions) -> Vec<Value> {
        self.items.values().map(|e| e.flatten(opts)).collect()
    }
}
