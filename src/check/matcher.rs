use rustc_hash::FxHashSet;

use crate::index::SchemaSupplier;
use crate::types::{EntityKind, LabelId, PropId, Result};

/// Returns whether every key of `props` is in `keys` or equals `exempt`.
pub fn has_schema_properties(keys: &FxHashSet<PropId>, props: &[PropId], exempt: Option<PropId>) -> bool {
    props
        .iter()
        .all(|prop| Some(*prop) == exempt || keys.contains(prop))
}

/// Lazily yields the descriptors an entity falls under.
///
/// A descriptor matches when its entity kind is the entity's, its label is
/// one of the entity's labels, and its keys are all present. The entity's
/// key set is loaded at most once, on the first label hit, so entities that
/// carry no indexed label never have their properties read.
pub fn matching<'d, 'l, D, I, F>(
    kind: EntityKind,
    labels: &'l [LabelId],
    descriptors: I,
    exempt: Option<PropId>,
    load_keys: F,
) -> MatchingDescriptors<'l, I::IntoIter, F>
where
    D: SchemaSupplier + 'd,
    I: IntoIterator<Item = &'d D>,
    F: FnOnce() -> Result<FxHashSet<PropId>>,
{
    MatchingDescriptors {
        kind,
        labels,
        descriptors: descriptors.into_iter(),
        exempt,
        load_keys: Some(load_keys),
        keys: None,
        failed: false,
    }
}

/// Iterator returned by [`matching`].
pub struct MatchingDescriptors<'l, I, F> {
    kind: EntityKind,
    labels: &'l [LabelId],
    descriptors: I,
    exempt: Option<PropId>,
    load_keys: Option<F>,
    keys: Option<FxHashSet<PropId>>,
    failed: bool,
}

impl<I, F> MatchingDescriptors<'_, I, F> {
    /// Returns whether the key set has been loaded.
    pub fn keys_loaded(&self) -> bool {
        self.keys.is_some()
    }
}

impl<'d, D, I, F> Iterator for MatchingDescriptors<'_, I, F>
where
    D: SchemaSupplier + 'd,
    I: Iterator<Item = &'d D>,
    F: FnOnce() -> Result<FxHashSet<PropId>>,
{
    type Item = Result<&'d D>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for descriptor in self.descriptors.by_ref() {
            let schema = descriptor.schema();
            if schema.entity != self.kind || !self.labels.contains(&schema.label) {
                continue;
            }
            if self.keys.is_none() {
                let load = self.load_keys.take()?;
                match load() {
                    Ok(keys) => self.keys = Some(keys),
                    Err(err) => {
                        self.failed = true;
                        return Some(Err(err));
                    }
                }
            }
            let keys = self.keys.as_ref()?;
            if has_schema_properties(keys, &schema.props, self.exempt) {
                return Some(Ok(descriptor));
            }
        }
        None
    }
}
