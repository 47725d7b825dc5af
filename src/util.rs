//! Small helpers shared across modules.

/// Borrows two distinct elements of a slice mutably.
///
/// # Panics
/// Panics if `a == b` or either index is out of bounds.
pub(crate) fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "cannot borrow the same element twice");
    if a < b {
        let (left, right) = slice.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::pair_mut;

    #[test]
    fn test_pair_mut_both_orders() {
        let mut values = [1, 2, 3];
        let (a, b) = pair_mut(&mut values, 2, 0);
        std::mem::swap(a, b);
        assert_eq!(values, [3, 2, 1]);
    }

    #[test]
    #[should_panic = "cannot borrow the same element twice"]
    fn test_pair_mut_same_index() {
        let mut values = [1, 2, 3];
        let _ = pair_mut(&mut values, 1, 1);
    }
}
