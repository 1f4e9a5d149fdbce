use std::mem;
use std::slice;

/// A list of `T` optimized for lists that are almost always empty or hold
/// a single element.
///
/// NFA construction produces huge numbers of per-state edge lists, and the
/// overwhelming majority of them have zero or one entry. `SmallList` keeps
/// the single element inline and only allocates backing storage once a
/// second element shows up. Iteration is always in insertion order.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum SmallList<T> {
    /// No elements.
    #[default]
    Zero,
    /// Exactly one element, stored inline.
    One(T),
    /// Two or more elements.
    Many(Vec<T>),
}

impl<T: PartialEq> SmallList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        SmallList::Zero
    }

    /// Number of elements in the list.
    pub fn len(&self) -> usize {
        match self {
            SmallList::Zero => 0,
            SmallList::One(_) => 1,
            SmallList::Many(v) => v.len(),
        }
    }

    /// True if the list has no elements.
    pub fn is_empty(&self) -> bool {
        matches!(self, SmallList::Zero)
    }

    /// Appends an element at the end of the list.
    pub fn add(&mut self, e: T) {
        match mem::take(self) {
            SmallList::Zero => *self = SmallList::One(e),
            SmallList::One(first) => *self = SmallList::Many(vec![first, e]),
            SmallList::Many(mut v) => {
                v.push(e);
                *self = SmallList::Many(v);
            }
        }
    }

    /// Inserts an element at position `i`, shifting later elements. An `i`
    /// at or past the end appends.
    pub fn insert(&mut self, i: usize, e: T) {
        match mem::take(self) {
            SmallList::Zero => *self = SmallList::One(e),
            SmallList::One(first) => {
                *self = SmallList::Many(if i == 0 {
                    vec![e, first]
                } else {
                    vec![first, e]
                });
            }
            SmallList::Many(mut v) => {
                if i < v.len() {
                    v.insert(i, e);
                } else {
                    v.push(e);
                }
                *self = SmallList::Many(v);
            }
        }
    }

    /// Removes the first occurrence of `e`. A list left with a single
    /// element drops its backing storage and goes back to inline form.
    ///
    /// # Panics
    ///
    /// If `e` is not in the list.
    pub fn remove(&mut self, e: &T) {
        match self {
            SmallList::Zero => panic!("element not in list"),
            SmallList::One(first) => {
                if *first != *e {
                    panic!("element not in list");
                }
                *self = SmallList::Zero;
            }
            SmallList::Many(v) => {
                match v.iter().position(|x| x == e) {
                    Some(i) => {
                        v.remove(i);
                    }
                    None => panic!("element not in list"),
                }
                if v.len() == 1 {
                    let last = v.pop().unwrap();
                    *self = SmallList::One(last);
                }
            }
        }
    }

    /// Removes all elements, dropping any backing storage.
    pub fn clear(&mut self) {
        *self = SmallList::Zero;
    }

    /// Returns a reference to the element at position `i`.
    ///
    /// # Panics
    ///
    /// If `i` is out of bounds.
    pub fn at(&self, i: usize) -> &T {
        match self {
            SmallList::One(first) if i == 0 => first,
            SmallList::Many(v) if i < v.len() => &v[i],
            _ => panic!("{} out of bounds", i),
        }
    }

    /// Returns an iterator over the elements, first to last.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        match self {
            SmallList::Zero => [].iter(),
            SmallList::One(first) => slice::from_ref(first).iter(),
            SmallList::Many(v) => v.iter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::SmallList;

    #[test]
    fn grows_through_the_three_shapes() {
        let mut l = SmallList::new();
        assert_eq!(l.len(), 0);
        assert!(l.is_empty());

        l.add(10);
        assert_eq!(l, SmallList::One(10));
        assert_eq!(l.len(), 1);

        l.add(20);
        l.add(30);
        assert_eq!(l, SmallList::Many(vec![10, 20, 30]));
        assert_eq!(l.len(), 3);
        assert_eq!(l.iter().copied().collect::<Vec<_>>(), vec![10, 20, 30]);
    }

    #[test]
    fn insert_positions() {
        let mut l = SmallList::new();
        l.insert(0, 2);
        l.insert(0, 1);
        l.insert(5, 3);
        assert_eq!(l.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn remove_collapses_to_inline() {
        let mut l = SmallList::new();
        l.add(1);
        l.add(2);
        l.add(3);

        l.remove(&2);
        assert_eq!(l, SmallList::Many(vec![1, 3]));

        l.remove(&1);
        assert_eq!(l, SmallList::One(3));

        l.remove(&3);
        assert_eq!(l, SmallList::Zero);
    }

    #[test]
    #[should_panic(expected = "element not in list")]
    fn remove_absent() {
        let mut l = SmallList::new();
        l.add(1);
        l.remove(&2);
    }

    #[test]
    fn clear_resets_from_any_shape() {
        let mut l = SmallList::new();
        l.add(1);
        l.add(2);
        l.clear();
        assert_eq!(l, SmallList::Zero);

        l.add(7);
        l.clear();
        assert_eq!(l, SmallList::Zero);
    }

    #[test]
    fn at_indexes_in_order() {
        let mut l = SmallList::new();
        l.add(5);
        assert_eq!(*l.at(0), 5);
        l.add(6);
        assert_eq!(*l.at(1), 6);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn at_out_of_bounds() {
        let mut l = SmallList::new();
        l.add(1);
        l.at(1);
    }
}
