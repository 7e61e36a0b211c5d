//! Canonical, deduplicated sets of component ids.
//!
//! Ids are kept in descending order so two signatures built from the same set
//! in any insertion order compare and hash equal. The signature is the key
//! that memoizes archetypes inside a world.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::component::{component_id, component_name, Component, ComponentId, INVALID_COMPONENT};

const HASH_PRIME: u32 = 53;
const GROWTH_HEADROOM: usize = 4;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct TypeSignature {
    ids: Vec<ComponentId>,
}

impl TypeSignature {
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Builder form of [`add`](Self::add).
    pub fn with<T: Component>(mut self) -> Self {
        self.add_id(component_id::<T>());
        self
    }

    pub fn add<T: Component>(&mut self) -> &mut Self {
        self.add_id(component_id::<T>())
    }

    pub fn remove<T: Component>(&mut self) -> &mut Self {
        self.remove_id(component_id::<T>())
    }

    pub fn has<T: Component>(&self) -> bool {
        self.has_id(component_id::<T>())
    }

    /// Insert `id` with a single swap pass; duplicates and id 0 are ignored.
    pub fn add_id(&mut self, id: ComponentId) -> &mut Self {
        if id == INVALID_COMPONENT {
            return self;
        }
        let mut carry = id;
        for slot in self.ids.iter_mut() {
            if *slot == carry {
                return self;
            }
            if carry > *slot {
                std::mem::swap(slot, &mut carry);
            }
        }
        if self.ids.len() == self.ids.capacity() {
            self.ids.reserve(self.ids.len() + GROWTH_HEADROOM);
        }
        self.ids.push(carry);
        self
    }

    pub fn remove_id(&mut self, id: ComponentId) -> &mut Self {
        if let Some(pos) = self.ids.iter().position(|&existing| existing == id) {
            self.ids.remove(pos);
        }
        self
    }

    pub fn has_id(&self, id: ComponentId) -> bool {
        self.ids.contains(&id)
    }

    /// True when the two signatures share at least one id.
    pub fn has_any(&self, other: &TypeSignature) -> bool {
        other.ids.iter().any(|&id| self.has_id(id))
    }

    /// True when every id of `other` is present here.
    pub fn has_all(&self, other: &TypeSignature) -> bool {
        other.ids.iter().all(|&id| self.has_id(id))
    }

    /// Replace the contents with a copy of `other`.
    pub fn copy_from(&mut self, other: &TypeSignature) {
        self.ids.clear();
        self.ids.extend_from_slice(&other.ids);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ComponentId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.ids.iter().copied()
    }

    /// Polynomial hash over the ordered ids.
    pub fn signature_hash(&self) -> u32 {
        let mut power: u32 = 1;
        let mut hash: u32 = 0;
        for &id in &self.ids {
            power = power.wrapping_mul(HASH_PRIME);
            hash = hash.wrapping_add(id.wrapping_mul(power));
        }
        hash
    }
}

impl Hash for TypeSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.signature_hash());
    }
}

impl FromIterator<ComponentId> for TypeSignature {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        let mut signature = TypeSignature::new();
        for id in iter {
            signature.add_id(id);
        }
        signature
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", component_name(*id))?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeSignature{:?}", self.ids)
    }
}
