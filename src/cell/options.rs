use std::sync::Arc;

pub(crate) type EqualityFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Construction options for observables and computeds.
///
/// # Examples
///
/// ```
/// use ripple::{observable_with, Options};
///
/// let temperature = observable_with(
///     21.5_f64,
///     Options::new()
///         .id("temperature")
///         .is_equal(|a: &f64, b: &f64| (a - b).abs() < 0.01),
/// );
/// assert_eq!(temperature.get(), 21.5);
/// ```
pub struct Options<T> {
    pub(crate) id: Option<String>,
    pub(crate) is_equal: Option<EqualityFn<T>>,
}

impl<T> Options<T> {
    /// Empty options: no id, `PartialEq` change detection.
    pub fn new() -> Self {
        Options {
            id: None,
            is_equal: None,
        }
    }

    /// Register the cell under `id` in the runtime's registry.
    ///
    /// Construction by id is idempotent: a later construction call with the
    /// same id returns the already-live instance.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Replace the change-detection function.
    ///
    /// A write or recomputation whose result compares equal to the previous
    /// value is stored but does not propagate.
    pub fn is_equal<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.is_equal = Some(Arc::new(f));
        self
    }
}

impl<T> Default for Options<T> {
    fn default() -> Self {
        Options::new()
    }
}

impl<T: PartialEq> Options<T> {
    pub(crate) fn equality(&self) -> EqualityFn<T> {
        self.is_equal
            .clone()
            .unwrap_or_else(|| Arc::new(|a: &T, b: &T| a == b))
    }
}
