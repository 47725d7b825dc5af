use std::any::TypeId;
use std::collections::HashMap;
use std::mem;

use super::{hash_name, Component, Desc, Hooks, Layout, LayoutTag};
use crate::entity::{Entity, Kind};

/// The index of a descriptor inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompId(pub u32);

/// Largest alignment a SoA component may have.
pub(crate) const MAX_SOA_ALIGN: usize = 16;

/// Interns component descriptors for one world.
///
/// The registry only stores descriptors;
/// the world allocates the entity that stands for each component.
#[derive(Default)]
pub struct Registry {
    descs:     Vec<Desc>,
    by_type:   HashMap<TypeId, CompId>,
    by_entity: HashMap<Entity, CompId>,
    by_name:   HashMap<String, CompId>,
}

impl Registry {
    /// Registers `T` as the component identified by `entity`.
    ///
    /// # Panics
    /// Panics if `T` was already registered,
    /// or if its name collides with another component.
    pub(crate) fn add<T: Component>(&mut self, entity: Entity) -> &Desc {
        let type_id = TypeId::of::<T>();
        assert!(!self.by_type.contains_key(&type_id), "{} is already registered", T::name());

        let layout = match T::LAYOUT {
            LayoutTag::Aos => Layout::Aos,
            LayoutTag::Soa => {
                let fields = T::soa_fields();
                assert!(!fields.is_empty(), "SoA component {} has no fields", T::name());
                assert!(
                    mem::align_of::<T>() <= MAX_SOA_ALIGN,
                    "SoA component {} is aligned beyond {MAX_SOA_ALIGN} bytes",
                    T::name()
                );
                Layout::Soa(fields)
            }
        };

        let comp_id = self.insert(Desc {
            comp_id: CompId(0),
            entity,
            size: mem::size_of::<T>().try_into().expect("component too large"),
            align: mem::align_of::<T>().try_into().expect("component alignment too large"),
            name: T::name().to_string(),
            hash: hash_name(T::name()),
            kind: T::KIND,
            layout,
            hooks: Hooks::of::<T>(),
            type_id: Some(type_id),
        });
        self.by_type.insert(type_id, comp_id);
        self.get(comp_id).expect("just inserted")
    }

    /// Registers an untyped plain-data component.
    ///
    /// Values are zero-initialized and copied bytewise.
    pub(crate) fn add_raw(
        &mut self,
        entity: Entity,
        name: &str,
        size: u32,
        align: u32,
        kind: Kind,
    ) -> &Desc {
        assert!(align.is_power_of_two(), "alignment {align} of {name} is not a power of two");

        let comp_id = self.insert(Desc {
            comp_id: CompId(0),
            entity,
            size,
            align,
            name: name.to_string(),
            hash: hash_name(name),
            kind,
            layout: Layout::Aos,
            hooks: Hooks::default(),
            type_id: None,
        });
        self.get(comp_id).expect("just inserted")
    }

    fn insert(&mut self, mut desc: Desc) -> CompId {
        assert!(
            !self.by_name.contains_key(&desc.name),
            "component name {:?} is already registered",
            desc.name
        );

        let comp_id = CompId(self.descs.len().try_into().expect("too many components"));
        desc.comp_id = comp_id;
        self.by_entity.insert(desc.entity, comp_id);
        self.by_name.insert(desc.name.clone(), comp_id);
        self.descs.push(desc);

        log::trace!("registered component {comp_id:?}");
        comp_id
    }

    /// Looks up a descriptor by its index.
    pub fn get(&self, comp_id: CompId) -> Option<&Desc> {
        self.descs.get(usize::try_from(comp_id.0).ok()?)
    }

    /// Looks up the descriptor of the component identified by `entity`.
    pub fn by_entity(&self, entity: Entity) -> Option<&Desc> {
        self.by_entity.get(&entity).and_then(|&id| self.get(id))
    }

    /// Looks up the descriptor of `T`.
    pub fn by_type<T: Component>(&self) -> Option<&Desc> {
        self.by_type.get(&TypeId::of::<T>()).and_then(|&id| self.get(id))
    }

    /// Looks up a descriptor by component name.
    pub fn by_name(&self, name: &str) -> Option<&Desc> {
        self.by_name.get(name).and_then(|&id| self.get(id))
    }

    /// Iterates over all descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Desc> + '_ { self.descs.iter() }

    /// Number of registered components.
    pub fn len(&self) -> usize { self.descs.len() }

    /// Whether no component was registered.
    pub fn is_empty(&self) -> bool { self.descs.is_empty() }
}
