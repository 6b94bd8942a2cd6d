//! Helper functions and data types

use std::{cmp::Ordering, fmt::Debug, hash::Hash, sync::Arc};

/// A shareable closure identified by its name. Equality, ordering and hashing
/// only look at the name, so two columns computed by differently-named
/// functions never collide.
#[derive(Clone)]
pub struct NamedFn<I, O> {
    name: String,
    func: Arc<dyn Fn(I) -> O + Send + Sync + 'static>,
}

impl<I, O> NamedFn<I, O> {
    pub fn new<N, F>(name: N, func: F) -> Self
    where
        N: Into<String>,
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self { name: name.into(), func: Arc::new(func) }
    }

    #[inline]
    pub fn call(&self, input: I) -> O {
        (self.func)(input)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<I, O> Debug for NamedFn<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<fn {}>", self.name)
    }
}

impl<I, O> PartialEq for NamedFn<I, O> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<I, O> Eq for NamedFn<I, O> {}

impl<I, O> PartialOrd for NamedFn<I, O> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I, O> Ord for NamedFn<I, O> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl<I, O> Hash for NamedFn<I, O> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Median of `values`, or 0 if `values` is empty. NaNs sort last.
pub fn median_of_floats(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
