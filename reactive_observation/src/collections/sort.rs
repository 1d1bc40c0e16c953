//! Sorting that keeps a collection and its index map in lockstep.
//!
//! A library sort cannot be used on an observed array: it would reorder the
//! elements without telling us where each one came from. This quicksort moves
//! every element together with its index-map entry, so after sorting, each
//! entry still names the original position of the element beside it.

use std::cmp::Ordering;

/// Ranges at most this long are finished with insertion sort.
const INSERTION_SORT_THRESHOLD: usize = 10;

struct Parallel<'a, T> {
    values: &'a mut [T],
    origins: &'a mut [isize],
}

impl<T> Parallel<'_, T> {
    #[inline(always)]
    fn swap(&mut self, a: usize, b: usize) {
        self.values.swap(a, b);
        self.origins.swap(a, b);
    }

    #[inline(always)]
    fn cmp<F>(&self, compare: &mut F, a: usize, b: usize) -> Ordering
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        compare(&self.values[a], &self.values[b])
    }
}

/// Sorts `values`, applying every exchange to `origins` as well.
pub(crate) fn sort_parallel<T, F>(
    values: &mut [T],
    origins: &mut [isize],
    mut compare: F,
) where
    F: FnMut(&T, &T) -> Ordering,
{
    debug_assert_eq!(values.len(), origins.len());
    let len = values.len().min(origins.len());
    let mut slices = Parallel {
        values: &mut values[..len],
        origins: &mut origins[..len],
    };
    quick_sort(&mut slices, 0, len, &mut compare);
}

fn insertion_sort<T, F>(
    slices: &mut Parallel<'_, T>,
    from: usize,
    to: usize,
    compare: &mut F,
) where
    F: FnMut(&T, &T) -> Ordering,
{
    for i in from + 1..to {
        let mut j = i;
        while j > from && slices.cmp(compare, j - 1, j) == Ordering::Greater {
            slices.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Sorts `from..to`, recursing into the smaller partition and looping over the
/// larger one.
fn quick_sort<T, F>(
    slices: &mut Parallel<'_, T>,
    mut from: usize,
    mut to: usize,
    compare: &mut F,
) where
    F: FnMut(&T, &T) -> Ordering,
{
    loop {
        if to - from <= INSERTION_SORT_THRESHOLD {
            insertion_sort(slices, from, to, compare);
            return;
        }

        // median of three: afterwards first <= middle <= last
        let third = from + ((to - from) >> 1);
        let last = to - 1;
        if slices.cmp(compare, from, last) == Ordering::Greater {
            slices.swap(from, last);
        }
        if slices.cmp(compare, from, third) == Ordering::Greater {
            slices.swap(from, third);
        }
        if slices.cmp(compare, third, last) == Ordering::Greater {
            slices.swap(third, last);
        }

        // park the pivot right after the (already partitioned) first element
        let mut low_end = from + 1;
        slices.swap(third, low_end);

        // invariant: from..low_end < pivot, low_end..i == pivot, high_start..to
        // > pivot, and values[low_end] is always an element equal to the pivot
        let mut high_start = last;
        let mut i = low_end + 1;
        'partition: while i < high_start {
            match slices.cmp(compare, i, low_end) {
                Ordering::Less => {
                    slices.swap(i, low_end);
                    low_end += 1;
                }
                Ordering::Equal => {}
                Ordering::Greater => {
                    let mut order;
                    loop {
                        high_start -= 1;
                        if high_start == i {
                            break 'partition;
                        }
                        order = slices.cmp(compare, high_start, low_end);
                        if order != Ordering::Greater {
                            break;
                        }
                    }
                    slices.swap(i, high_start);
                    if order == Ordering::Less {
                        slices.swap(i, low_end);
                        low_end += 1;
                    }
                }
            }
            i += 1;
        }

        if to - high_start < low_end - from {
            quick_sort(slices, high_start, to, compare);
            to = low_end;
        } else {
            quick_sort(slices, from, low_end, compare);
            from = high_start;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sort_parallel;

    fn pseudo_random(len: usize, seed: u64) -> Vec<i64> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) % 50) as i64
            })
            .collect()
    }

    fn check(values: Vec<i64>) {
        let original = values.clone();
        let mut sorted = values;
        let mut origins: Vec<isize> = (0..sorted.len() as isize).collect();
        sort_parallel(&mut sorted, &mut origins, |a, b| a.cmp(b));

        let mut expected = original.clone();
        expected.sort();
        assert_eq!(sorted, expected);
        for (value, origin) in sorted.iter().zip(&origins) {
            assert_eq!(original[*origin as usize], *value);
        }
        let mut seen = origins.clone();
        seen.sort();
        assert_eq!(seen, (0..original.len() as isize).collect::<Vec<_>>());
    }

    #[test]
    fn small_input_uses_insertion_sort() {
        let mut values = vec![3, 1, 2];
        let mut origins = vec![0, 1, 2];
        sort_parallel(&mut values, &mut origins, |a, b| a.cmp(b));
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(origins, vec![1, 2, 0]);
    }

    #[test]
    fn large_inputs_keep_origins_attached() {
        for (len, seed) in [(11, 1), (64, 7), (257, 42), (1000, 3)] {
            check(pseudo_random(len, seed));
        }
    }

    #[test]
    fn presorted_reversed_and_constant_inputs() {
        check((0..200).collect());
        check((0..200).rev().collect());
        check(vec![5; 100]);
    }

    #[test]
    fn sentinels_move_with_their_values() {
        let mut values = vec!["d", "a", "c", "b"];
        let mut origins = vec![0, -2, 1, -2];
        sort_parallel(&mut values, &mut origins, |a, b| a.cmp(b));
        assert_eq!(values, vec!["a", "b", "c", "d"]);
        assert_eq!(origins, vec![-2, -2, 1, 0]);
    }
}
