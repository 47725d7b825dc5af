use std::sync::atomic::{AtomicUsize, Ordering};
use std::mem;

use super::{Component, Hooks, Layout, Registry};
use crate::entity::{Entity, Kind};
use crate::test_util::{self, Health, Position, SoaPosition, UniqueCounter};

fn fake_entity(index: u32) -> Entity { Entity::new(index, 0, false, false, Kind::Generic) }

#[test]
fn test_register_once() {
    test_util::init();

    let mut registry = Registry::default();
    let desc = registry.add::<Position>(fake_entity(100));
    assert_eq!(desc.size as usize, mem::size_of::<Position>());
    assert_eq!(desc.align as usize, mem::align_of::<Position>());
    assert_eq!(desc.kind, Kind::Generic);
    assert_eq!(desc.layout, Layout::Aos);
    let comp_id = desc.comp_id;

    registry.add::<Health>(fake_entity(101));

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.by_type::<Position>().map(|desc| desc.comp_id), Some(comp_id));
    assert_eq!(registry.by_entity(fake_entity(100)).map(|desc| desc.comp_id), Some(comp_id));
    assert_eq!(registry.by_name(Position::name()).map(|desc| desc.comp_id), Some(comp_id));
    assert!(registry.by_name("no such component").is_none());
}

#[test]
#[should_panic = "is already registered"]
fn test_register_twice() {
    let mut registry = Registry::default();
    registry.add::<Position>(fake_entity(100));
    registry.add::<Position>(fake_entity(101));
}

#[test]
fn test_register_unique_and_soa() {
    let mut registry = Registry::default();

    let desc = registry.add::<UniqueCounter>(fake_entity(100));
    assert_eq!(desc.kind, Kind::Unique);

    let desc = registry.add::<SoaPosition>(fake_entity(101));
    match &desc.layout {
        Layout::Soa(fields) => {
            assert_eq!(fields.len(), 3);
            assert_eq!(fields.iter().map(|field| field.size).sum::<u32>(), 12);
        }
        Layout::Aos => panic!("SoaPosition should use the SoA layout"),
    }
}

#[test]
fn test_register_raw() {
    let mut registry = Registry::default();
    let desc = registry.add_raw(fake_entity(100), "raw.blob", 24, 8, Kind::Generic);
    assert_eq!(desc.size, 24);
    assert!(desc.hooks.ctor.is_none());
    assert!(desc.type_id.is_none());
    assert_eq!(registry.by_name("raw.blob").map(|desc| desc.entity), Some(fake_entity(100)));
}

static DROPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default, Clone)]
struct Droppy(#[allow(dead_code)] Box<u32>);

impl Drop for Droppy {
    fn drop(&mut self) { DROPS.fetch_add(1, Ordering::SeqCst); }
}

impl Component for Droppy {}

#[test]
fn test_hooks() {
    let hooks = Hooks::of::<Droppy>();
    let ctor = hooks.ctor.expect("typed components have a ctor");
    let dtor = hooks.dtor.expect("Droppy needs drop");
    let clone = hooks.clone.expect("typed components have a clone hook");

    let mut a = mem::MaybeUninit::<Droppy>::uninit();
    let mut b = mem::MaybeUninit::<Droppy>::uninit();
    unsafe {
        ctor(a.as_mut_ptr().cast());
        *(*a.as_mut_ptr()).0 = 7;
        clone(a.as_ptr().cast(), b.as_mut_ptr().cast());
        assert_eq!(*(*b.as_ptr()).0, 7);

        let before = DROPS.load(Ordering::SeqCst);
        dtor(a.as_mut_ptr().cast());
        dtor(b.as_mut_ptr().cast());
        assert_eq!(DROPS.load(Ordering::SeqCst), before + 2);
    }

    assert!(Hooks::of::<Position>().dtor.is_none());
}
