//! Flag maps and the per-class registry.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::{Bits, FLAG_BUDGET};
use crate::error::ConfigurationError;

/// Assigns bits to the dirty labels of one view class.
///
/// Labels get bits in declaration order. Once every label is declared the
/// builder is turned into an immutable [`FlagMap`].
///
/// ```rust
/// use trellis_core::flags::FlagMapBuilder;
///
/// let mut builder = FlagMapBuilder::new("node");
/// builder.declare("position", &["TRANSLATE"])?;
/// builder.declare("size", &["RESIZE", "RENDER"])?;
/// builder.init(&["RENDER"])?;
/// let flags = builder.build();
///
/// assert_eq!(flags.bit("TRANSLATE"), 1 << 0);
/// assert_eq!(flags.change_bits(["size"]), (1 << 1) | (1 << 2));
/// # Ok::<(), trellis_core::ConfigurationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FlagMapBuilder {
    class: String,
    labels: IndexMap<String, Bits>,
    attributes: IndexMap<String, Bits>,
    init: Bits,
}

impl FlagMapBuilder {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            labels: IndexMap::new(),
            attributes: IndexMap::new(),
            init: 0,
        }
    }

    /// Declare that a change of `attribute` dirties `labels`.
    pub fn declare(
        &mut self,
        attribute: &str,
        labels: &[&str],
    ) -> Result<&mut Self, ConfigurationError> {
        let bits = self.bit_for(labels)?;
        *self.attributes.entry(attribute.to_owned()).or_default() |= bits;
        Ok(self)
    }

    /// Declare the labels delivered on a view's first render.
    pub fn init(&mut self, labels: &[&str]) -> Result<&mut Self, ConfigurationError> {
        self.init |= self.bit_for(labels)?;
        Ok(self)
    }

    /// Union of the bits for `labels`, assigning a fresh bit to every label
    /// not seen before.
    pub fn bit_for(&mut self, labels: &[&str]) -> Result<Bits, ConfigurationError> {
        let mut bits = 0;
        for label in labels {
            if let Some(bit) = self.labels.get(*label) {
                bits |= bit;
                continue;
            }
            let shift = self.labels.len() as u32;
            if shift >= FLAG_BUDGET {
                return Err(ConfigurationError::FlagBudgetExceeded {
                    class: self.class.clone(),
                    budget: FLAG_BUDGET,
                });
            }
            let bit = 1 << shift;
            self.labels.insert((*label).to_owned(), bit);
            bits |= bit;
        }
        Ok(bits)
    }

    pub fn build(self) -> FlagMap {
        FlagMap {
            class: self.class,
            labels: self.labels,
            attributes: self.attributes,
            init: self.init,
        }
    }
}

/// The immutable label and attribute table of one view class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagMap {
    class: String,
    labels: IndexMap<String, Bits>,
    attributes: IndexMap<String, Bits>,
    init: Bits,
}

impl FlagMap {
    /// An empty map for classes that declare no labels.
    pub fn empty(class: impl Into<String>) -> Self {
        FlagMapBuilder::new(class).build()
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// The bit of a single label, or 0 if the class never declared it.
    pub fn bit(&self, label: &str) -> Bits {
        self.labels.get(label).copied().unwrap_or(0)
    }

    /// Union of the bits of `labels`. Unknown labels contribute nothing.
    pub fn bits(&self, labels: &[&str]) -> Bits {
        labels.iter().fold(0, |acc, label| acc | self.bit(label))
    }

    pub fn has_flag(&self, mask: Bits, label: &str) -> bool {
        mask & self.bit(label) != 0
    }

    pub fn clear_flag(&self, mask: Bits, label: &str) -> Bits {
        mask & !self.bit(label)
    }

    /// Bits dirtied by a set of changed attributes.
    pub fn change_bits<'a>(&self, changed: impl IntoIterator<Item = &'a str>) -> Bits {
        changed
            .into_iter()
            .filter_map(|attribute| self.attributes.get(attribute))
            .fold(0, |acc, bits| acc | bits)
    }

    /// Bits delivered on a view's first render.
    pub fn init_bits(&self) -> Bits {
        self.init
    }

    /// Declared labels in bit order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, Bits)> {
        self.labels.iter().map(|(label, bit)| (label.as_str(), *bit))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Per-class flag tables, built the first time a class is used.
///
/// The registry belongs to one scheduler. Maps are shared with the view
/// records of that class and never change after they are built.
#[derive(Debug, Default)]
pub struct FlagRegistry {
    classes: HashMap<String, Arc<FlagMap>>,
}

impl FlagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the map of `class`, running `declare` to build it on first use.
    pub fn flags_for<F>(&mut self, class: &str, declare: F) -> Result<Arc<FlagMap>, ConfigurationError>
    where
        F: FnOnce(&mut FlagMapBuilder) -> Result<(), ConfigurationError>,
    {
        if let Some(map) = self.classes.get(class) {
            return Ok(Arc::clone(map));
        }
        let mut builder = FlagMapBuilder::new(class);
        declare(&mut builder)?;
        let map = Arc::new(builder.build());
        debug!(class, labels = map.len(), "built flag map");
        self.classes.insert(class.to_owned(), Arc::clone(&map));
        Ok(map)
    }

    pub fn get(&self, class: &str) -> Option<&Arc<FlagMap>> {
        self.classes.get(class)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
