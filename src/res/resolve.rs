use crate::error::{Error, Result};
use crate::res::config::Configuration;
use crate::res::table::{Candidate, EntryValue, ResourceTable};
use crate::res::value::{ResId, Value};
use std::collections::HashSet;

/// Hops followed through reference values before giving up.
pub const MAX_REFERENCE_DEPTH: usize = 20;

/// A fully resolved resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    /// The id the terminal value was found under.
    pub id: ResId,
    pub value: Value,
    /// The value rendered as text, with strings taken from the table pool.
    pub text: String,
}

/// Picks entries for a target configuration and follows references.
#[derive(Clone, Copy, Debug)]
pub struct Resolver<'a> {
    table: &'a ResourceTable,
    target: Option<Configuration>,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a ResourceTable) -> Self {
        Self {
            table,
            target: None,
            max_depth: MAX_REFERENCE_DEPTH,
        }
    }

    pub fn with_target(mut self, target: Configuration) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn table(&self) -> &'a ResourceTable {
        self.table
    }

    pub fn target(&self) -> Option<&Configuration> {
        self.target.as_ref()
    }

    /// Chooses the entry of `id` best matching the target.
    ///
    /// Compatible candidates compete on specificity and the first declared
    /// wins a tie. Without a target, or when nothing is compatible, the first
    /// all-wildcard candidate is used, then the first declared one.
    pub fn select(&self, id: ResId) -> Result<&'a Candidate> {
        let candidates = self.table.candidates(id);
        if let Some(target) = &self.target {
            let mut best: Option<&'a Candidate> = None;
            for candidate in candidates
                .iter()
                .filter(|c| c.config.is_compatible_with(target))
            {
                match best {
                    Some(b) if !candidate.config.is_more_specific_than(&b.config) => {}
                    _ => best = Some(candidate),
                }
            }
            if let Some(best) = best {
                return Ok(best);
            }
            if !candidates.is_empty() {
                log::debug!("no entry of {} matches {}, using the default", id, target);
            }
        }
        candidates
            .iter()
            .find(|c| c.config.is_default())
            .or_else(|| candidates.first())
            .ok_or(Error::ResourceNotFound(id))
    }

    /// Resolves `id` to a terminal value, following references.
    ///
    /// A complex entry resolves to a reference to itself, rendered by name.
    pub fn resolve(&self, id: ResId) -> Result<Resolved> {
        let mut current = id;
        let mut hops = 0;
        loop {
            let candidate = self.select(current)?;
            let value = match &candidate.entry.value {
                EntryValue::Complex { .. } => {
                    return Ok(Resolved {
                        id: current,
                        value: Value::Reference(current),
                        text: self.reference_text(current),
                    })
                }
                EntryValue::Simple(value) => *value,
            };
            match value.reference() {
                Some(next) => {
                    hops += 1;
                    if hops > self.max_depth {
                        return Err(Error::ReferenceTooDeep {
                            id,
                            limit: self.max_depth,
                        });
                    }
                    log::trace!("{} -> {}", current, next);
                    current = next.or_package(current.package());
                }
                None => {
                    return Ok(Resolved {
                        id: current,
                        value,
                        text: self.render(&value),
                    })
                }
            }
        }
    }

    /// Renders a terminal value, taking strings from the table pool.
    pub fn render(&self, value: &Value) -> String {
        value.render(Some(self.table.strings()))
    }

    /// `@type/key` when the table names `id`, `@0x…` otherwise.
    pub fn reference_text(&self, id: ResId) -> String {
        match self.table.entry_name(id) {
            Some(name) => format!("@{}", name),
            None => format!("@{}", id),
        }
    }

    /// The merged slots of the style `id` and its ancestors. A slot set on a
    /// descendant hides the same slot on an ancestor. Slots keep the order in
    /// which the oldest ancestor declared them.
    pub fn style(&self, id: ResId) -> Result<Vec<(ResId, Value)>> {
        let mut visited = HashSet::new();
        let mut chain = vec![];
        let mut current = id;
        loop {
            if !visited.insert(current) {
                return Err(Error::CyclicStyleReference(current));
            }
            let candidate = match self.select(current) {
                Ok(candidate) => candidate,
                Err(Error::ResourceNotFound(missing)) if current != id => {
                    log::debug!("style parent {} of {} is not in the table", missing, id);
                    break;
                }
                Err(err) => return Err(err),
            };
            let next = match &candidate.entry.value {
                EntryValue::Complex { parent, map } => {
                    chain.push(map);
                    *parent
                }
                EntryValue::Simple(value) => value.reference().unwrap_or_default(),
            };
            if next.is_null() {
                break;
            }
            current = next.or_package(current.package());
        }

        let mut merged: Vec<(ResId, Value)> = vec![];
        for map in chain.into_iter().rev() {
            for (name, value) in map {
                match merged.iter_mut().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = *value,
                    None => merged.push((*name, *value)),
                }
            }
        }
        Ok(merged)
    }

    /// The value of `attr` as seen through the style `style`.
    pub fn style_attribute(&self, style: ResId, attr: ResId) -> Result<Option<Value>> {
        Ok(self
            .style(style)?
            .into_iter()
            .find(|(name, _)| *name == attr)
            .map(|(_, value)| value))
    }
}
