use std::sync::atomic::{AtomicU64, Ordering};

static NEXT: AtomicU64 = AtomicU64::new(0);

/// Identity handed out once per call to `new`, unique for the life of the process.
#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug, PartialOrd, Ord)]
pub(crate) struct UID {
    num: u64
}

impl UID {
    pub(crate) fn new() -> UID {
        UID {
            num: NEXT.fetch_add(1, Ordering::Relaxed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UID;

    #[test]
    fn ids_are_distinct() {
        let a = UID::new();
        let b = UID::new();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
