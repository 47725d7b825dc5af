//! A recycling slot table addressed by entity index.

use xias::Xias;

use super::GEN_MASK;

/// The last generation a slot can reach before it is retired.
const MAX_GENERATION: u32 = GEN_MASK as u32;


enum State<T> {
    Alive(T),
    Free { next: Option<u32> },
}

struct Slot<T> {
    generation: u32,
    state:      State<T>,
}

/// Stores one value per live index, reusing freed indices in LIFO order.
pub(crate) struct Slots<T> {
    slots:     Vec<Slot<T>>,
    /// Head of the intrusive free list.
    free_head: Option<u32>,
    alive:     usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self { Self { slots: Vec::new(), free_head: None, alive: 0 } }
}

impl<T> Slots<T> {
    /// Allocates a slot for `value`, returning its index and generation.
    pub(crate) fn alloc(&mut self, value: T) -> (u32, u32) {
        self.alive += 1;

        if let Some(index) = self.free_head {
            let slot = self.slots.get_mut(index.small_int::<usize>()).expect("free list is consistent");
            let next = match slot.state {
                State::Free { next } => next,
                State::Alive(_) => panic!("slot {index} in the free list is alive"),
            };
            self.free_head = next;
            slot.state = State::Alive(value);
            return (index, slot.generation);
        }

        let index: u32 = self.slots.len().small_int();
        self.slots.push(Slot { generation: 0, state: State::Alive(value) });
        (index, 0)
    }

    /// Frees the slot at `index` and bumps its generation.
    ///
    /// A slot whose generation is exhausted is retired instead of recycled,
    /// so a reused index always comes back with a strictly greater generation.
    ///
    /// # Panics
    /// Panics if the slot is not alive.
    pub(crate) fn free(&mut self, index: u32) -> T {
        let slot = self.slots.get_mut(index.small_int::<usize>()).expect("index out of bounds");
        let state = std::mem::replace(&mut slot.state, State::Free { next: None });
        let value = match state {
            State::Alive(value) => value,
            State::Free { .. } => panic!("slot {index} is freed twice"),
        };
        self.alive -= 1;

        if slot.generation == MAX_GENERATION {
            log::debug!("retiring slot {index} with exhausted generations");
            return value;
        }
        slot.generation += 1;
        slot.state = State::Free { next: self.free_head };
        self.free_head = Some(index);
        value
    }

    /// Returns the value at `index` if the slot is alive.
    pub(crate) fn get(&self, index: u32) -> Option<&T> {
        match &self.slots.get(index.small_int::<usize>())?.state {
            State::Alive(value) => Some(value),
            State::Free { .. } => None,
        }
    }

    /// Returns the value at `index` if the slot is alive.
    pub(crate) fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        match &mut self.slots.get_mut(index.small_int::<usize>())?.state {
            State::Alive(value) => Some(value),
            State::Free { .. } => None,
        }
    }

    /// The current generation of the slot, whether alive or free.
    pub(crate) fn generation(&self, index: u32) -> Option<u32> {
        self.slots.get(index.small_int::<usize>()).map(|slot| slot.generation)
    }

    /// Number of live slots.
    pub(crate) fn alive(&self) -> usize { self.alive }

    /// Number of slots ever allocated, live or free.
    pub(crate) fn len(&self) -> usize { self.slots.len() }

    /// Iterates over live slots.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (u32, u32, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match &slot.state {
            State::Alive(value) => Some((index.small_int(), slot.generation, value)),
            State::Free { .. } => None,
        })
    }
}
