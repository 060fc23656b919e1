use std::{
    fmt,
    num::ParseIntError,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

/// Identifier of a menu item or separator.
///
/// Identifiers are handed out in strictly increasing order and never reused,
/// not even for hidden items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MenuId(u64);

impl MenuId {
    /// Carried by items created after their tray was dropped. Never allocated.
    pub const DETACHED: MenuId = MenuId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MenuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MenuId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Lock-free source of [`MenuId`]s, starting at 1.
///
/// The counter is 64 bits wide, so it does not run out within the life of a
/// process and never wraps back to [`MenuId::DETACHED`].
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: AtomicU64,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self::starting_after(0)
    }

    const fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    pub fn allocate(&self) -> MenuId {
        MenuId(self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, sync::Arc, thread};

    #[test]
    fn starts_at_one_and_increases() {
        let ids = IdAllocator::new();
        assert_eq!(ids.allocate(), MenuId::new(1));
        assert_eq!(ids.allocate(), MenuId::new(2));
        assert!(ids.allocate() > MenuId::new(2));
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let ids = Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..500).map(|_| ids.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "{id} allocated twice");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }

    #[test]
    fn keeps_counting_past_u32_range() {
        let ids = IdAllocator::starting_after(u64::from(u32::MAX) - 1);
        assert_eq!(ids.allocate(), MenuId::new(u64::from(u32::MAX)));
        assert_eq!(ids.allocate(), MenuId::new(u64::from(u32::MAX) + 1));
    }

    #[test]
    fn parses_from_native_string_ids() {
        assert_eq!("42".parse::<MenuId>().unwrap(), MenuId::new(42));
        assert!("sep".parse::<MenuId>().is_err());
    }
}
