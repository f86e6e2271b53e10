use std::sync::Arc;

/// Observer notified after a committed edit changes the store.
///
/// `key` is `None` when the edit cleared the store.
pub trait ChangeListener: Send + Sync {
    fn on_changed(&self, key: Option<&str>);
}

impl<F> ChangeListener for F
where
    F: Fn(Option<&str>) + Send + Sync,
{
    fn on_changed(&self, key: Option<&str>) {
        self(key)
    }
}

/// Handle returned on registration; pass it back to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<dyn ChangeListener>)>,
}

impl Listeners {
    pub(crate) fn register(&mut self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn ChangeListener>> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}
