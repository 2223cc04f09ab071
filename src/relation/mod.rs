//! Selector resolution: which model a selector names, who owns the foreign
//! key, and how many rows the traversal yields.

use crate::error::ConfigError;
use crate::schema::{alias_to_ref, is_ref_field, ref_to_alias, Cardinality, ModelDescriptor, Registry};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Which side of the relationship owns the foreign key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The current model owns `_<alias>_ref`.
    To,
    /// The target model owns a reference back to the current model.
    From,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// Name the traversal result is attached under.
    pub alias: String,
    pub target: String,
    pub direction: Direction,
    /// Foreign-key field; on the current model for `To`, on the target for `From`.
    pub ref_field: String,
    pub cardinality: Cardinality,
    /// Set when the target declared no cardinality and MANY was assumed.
    pub ambiguous: bool,
}

/// Side-table of resolved selectors keyed by (model, selector). Schemas are
/// frozen once the registry is built, so entries never go stale.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: RwLock<HashMap<(String, String), Arc<Relation>>>,
}

impl Resolver {
    pub fn resolve(
        &self,
        registry: &Registry,
        model: &str,
        selector: &str,
    ) -> Result<Arc<Relation>, ConfigError> {
        let key = (model.to_string(), selector.to_string());
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }
        let relation = Arc::new(resolve_uncached(registry, model, selector)?);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.entry(key).or_insert(relation).clone())
    }
}

fn unknown(model: &str, selector: &str) -> ConfigError {
    ConfigError::UnknownSelector {
        model: model.to_string(),
        selector: selector.to_string(),
    }
}

fn resolve_uncached(
    registry: &Registry,
    model: &str,
    selector: &str,
) -> Result<Relation, ConfigError> {
    let current = registry.model(model)?;
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(unknown(model, selector));
    }

    if let Some((target, back)) = selector.split_once(':') {
        return resolve_from(registry, current, selector, target, Some(back));
    }

    let alias = ref_to_alias(selector).unwrap_or_else(|| selector.to_lowercase());

    if let Some(target) = current.transmodel(&alias) {
        let target = registry.model(target)?;
        return Ok(Relation {
            ref_field: alias_to_ref(&alias),
            alias,
            target: target.name().to_string(),
            direction: Direction::To,
            cardinality: Cardinality::One,
            ambiguous: false,
        });
    }

    let ref_field = alias_to_ref(&alias);
    if current.has_field(&ref_field) {
        let target = registry
            .by_alias(&alias)
            .ok_or_else(|| unknown(model, selector))?;
        return Ok(Relation {
            alias,
            target: target.name().to_string(),
            direction: Direction::To,
            ref_field,
            cardinality: Cardinality::One,
            ambiguous: false,
        });
    }

    if is_ref_field(selector) {
        return Err(unknown(model, selector));
    }
    resolve_from(registry, current, selector, selector, None)
}

/// `Target` or `Target:back`: the target owns `_<back>_ref` pointing at us.
/// Without an explicit back-alias the current model's name is tried first,
/// then each ancestor's, nearest first.
fn resolve_from(
    registry: &Registry,
    current: &ModelDescriptor,
    selector: &str,
    target: &str,
    back: Option<&str>,
) -> Result<Relation, ConfigError> {
    let other = registry
        .get(target)
        .or_else(|| registry.by_plural(target))
        .ok_or_else(|| unknown(current.name(), selector))?;

    let back = match back {
        Some(b) if !b.trim().is_empty() => b.trim().to_lowercase(),
        Some(_) => return Err(unknown(current.name(), selector)),
        None => std::iter::once(current.name())
            .chain(current.ancestors().iter().rev().map(String::as_str))
            .map(str::to_lowercase)
            .find(|b| other.has_field(&alias_to_ref(b)))
            .ok_or_else(|| unknown(current.name(), selector))?,
    };
    let ref_field = alias_to_ref(&back);
    if !other.has_field(&ref_field) {
        return Err(unknown(current.name(), selector));
    }

    let (cardinality, ambiguous) = match other.relation(&back) {
        Some(c) => (c, false),
        None => {
            tracing::warn!(
                model = %current.name(),
                selector = %selector,
                target = %other.name(),
                "no cardinality declared for '{}' on {}, assuming MANY",
                back,
                other.name()
            );
            (Cardinality::Many, true)
        }
    };

    Ok(Relation {
        alias: selector.to_string(),
        target: other.name().to_string(),
        direction: Direction::From,
        ref_field,
        cardinality,
        ambiguous,
    })
}
