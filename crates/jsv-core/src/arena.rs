use std::{fmt, marker::PhantomData, ops::Index};

/// Typed slot number inside an [`Arena`].
///
/// The phantom parameter keeps a handle issued by one arena from indexing an arena of another
/// element type.
pub struct ArenaId<T> {
    slot: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArenaId<T> {
    const fn from_slot(slot: usize) -> Self {
        Self {
            slot: slot as u32,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.slot as usize
    }
}

impl<T> Copy for ArenaId<T> {}

impl<T> Clone for ArenaId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for ArenaId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<T> Eq for ArenaId<T> {}

impl<T> std::hash::Hash for ArenaId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
    }
}

impl<T> fmt::Debug for ArenaId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.slot)
    }
}

/// Append-only storage; handles stay valid for as long as the arena lives.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn alloc(&mut self, value: T) -> ArenaId<T> {
        self.slots.push(value);
        ArenaId::from_slot(self.slots.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: ArenaId<T>) -> Option<&T> {
        self.slots.get(id.index())
    }

    /// Iterates in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaId<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(slot, value)| (ArenaId::from_slot(slot), value))
    }
}

impl<T> Index<ArenaId<T>> for Arena<T> {
    type Output = T;

    fn index(&self, id: ArenaId<T>) -> &T {
        &self.slots[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn filled(words: &[&'static str]) -> (Arena<&'static str>, Vec<ArenaId<&'static str>>) {
        let mut arena = Arena::new(words.len());
        let ids = words.iter().map(|word| arena.alloc(*word)).collect();
        (arena, ids)
    }

    #[rstest]
    #[case(&[], 0)]
    #[case(&["type"], 1)]
    #[case(&["type", "const", "required"], 3)]
    fn test_alloc_issues_sequential_slots(#[case] words: &[&'static str], #[case] len: usize) {
        let (arena, ids) = filled(words);

        assert_eq!(arena.len(), len);
        assert_eq!(arena.is_empty(), len == 0);
        assert_eq!(
            ids.iter().map(|id| id.index()).collect::<Vec<_>>(),
            (0..len).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_lookup() {
        let (arena, ids) = filled(&["minLength", "maxLength"]);

        assert_eq!(arena[ids[1]], "maxLength");
        assert_eq!(arena.get(ids[0]), Some(&"minLength"));
        assert_eq!(arena.get(ArenaId::from_slot(2)), None);
        assert_eq!(
            arena.iter().map(|(id, word)| (id, *word)).collect::<Vec<_>>(),
            vec![(ids[0], "minLength"), (ids[1], "maxLength")]
        );
    }
}
