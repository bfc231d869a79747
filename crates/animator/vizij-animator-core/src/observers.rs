//! Synchronous multi-subscriber dispatch.

use crate::ids::ObserverId;

type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// Callbacks invoked in registration order.
pub struct Observable<T> {
    next_id: u32,
    observers: Vec<(ObserverId, Callback<T>)>,
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            observers: Vec::new(),
        }
    }
}

impl<T> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<T> Observable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, callback: impl FnMut(&T) + Send + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.observers.push((id, Box::new(callback)));
        id
    }

    /// Returns false if the id was not registered.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    pub fn notify(&mut self, value: &T) {
        for (_, cb) in self.observers.iter_mut() {
            cb(value);
        }
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
