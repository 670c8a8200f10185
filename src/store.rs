use crate::schema::{Client, PdfTemplate};

/// Anything held in a [`SessionStore`] under a string key.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Client {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for PdfTemplate {
    fn key(&self) -> &str {
        &self.id
    }
}

/// In-memory keyed collection for the session. Caller-owned: constructed at
/// session start, passed by reference to whichever component needs it, and
/// dropped at session end. Nothing here touches durable storage.
#[derive(Default)]
pub struct SessionStore<T: Keyed> {
    items: Vec<T>,
}

pub type ClientStore = SessionStore<Client>;
pub type TemplateStore = SessionStore<PdfTemplate>;

impl<T: Keyed> SessionStore<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Inserts an item, replacing any existing item with the same key in
    /// place so first-insertion order is preserved.
    pub fn insert(&mut self, item: T) {
        match self
            .items
            .iter_mut()
            .find(|existing| existing.key() == item.key())
        {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.iter().find(|item| item.key() == key)
    }

    pub fn all(&self) -> &[T] {
        &self.items
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.iter().any(|item| item.key() == key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.key() != key);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
