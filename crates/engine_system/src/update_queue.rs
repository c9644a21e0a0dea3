//! Arena-backed update queue.
//!
//! A doubly linked list whose nodes live in a [`Slab`], plus a side index
//! from runtime id to slab key. Append, removal by id and rotation are all
//! O(1), and no node ever owns the entity it names.

use std::collections::HashMap;

use engine_component::{RuntimeId, TypeIdentity};
use slab::Slab;

#[derive(Debug)]
struct Node {
    id: RuntimeId,
    type_identity: TypeIdentity,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered set of entities that want per-tick callbacks.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    nodes: Slab<Node>,
    index: HashMap<RuntimeId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl UpdateQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entity. Returns `false` if it is already queued.
    pub fn push_back(&mut self, id: RuntimeId, type_identity: TypeIdentity) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        let key = self.nodes.insert(Node {
            id,
            type_identity,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        self.index.insert(id, key);
        true
    }

    /// Remove an entity. Returns `false` if it was not queued.
    pub fn remove(&mut self, id: RuntimeId) -> bool {
        match self.index.remove(&id) {
            Some(key) => {
                self.unlink(key);
                true
            }
            None => false,
        }
    }

    /// Take the entry at the front of the queue.
    pub fn pop_front(&mut self) -> Option<(RuntimeId, TypeIdentity)> {
        let key = self.head?;
        let node = self.unlink(key);
        self.index.remove(&node.id);
        Some((node.id, node.type_identity))
    }

    /// Keep only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(RuntimeId, TypeIdentity) -> bool) -> usize {
        let mut removed = 0;
        let mut cursor = self.head;
        while let Some(key) = cursor {
            let node = &self.nodes[key];
            cursor = node.next;
            if !keep(node.id, node.type_identity) {
                let id = node.id;
                self.index.remove(&id);
                self.unlink(key);
                removed += 1;
            }
        }
        removed
    }

    /// Returns `true` if the entity is queued.
    #[must_use]
    pub fn contains(&self, id: RuntimeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Returns the number of queued entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterate the queued runtime ids front to back.
    pub fn iter(&self) -> impl Iterator<Item = RuntimeId> + '_ {
        std::iter::successors(self.head, |&key| self.nodes[key].next)
            .map(|key| self.nodes[key].id)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    fn unlink(&mut self, key: usize) -> Node {
        let node = self.nodes.remove(key);
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TY: TypeIdentity = TypeIdentity::from_name("test::Ship");

    fn ids(queue: &UpdateQueue) -> Vec<u64> {
        queue.iter().map(RuntimeId::id).collect()
    }

    #[test]
    fn test_push_is_idempotent() {
        let mut queue = UpdateQueue::new();
        assert!(queue.push_back(RuntimeId(1), TY));
        assert!(!queue.push_back(RuntimeId(1), TY));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_from_middle_and_ends() {
        let mut queue = UpdateQueue::new();
        for i in 1..=5 {
            queue.push_back(RuntimeId(i), TY);
        }
        assert!(queue.remove(RuntimeId(3)));
        assert!(queue.remove(RuntimeId(1)));
        assert!(queue.remove(RuntimeId(5)));
        assert!(!queue.remove(RuntimeId(5)));
        assert_eq!(ids(&queue), vec![2, 4]);

        queue.push_back(RuntimeId(6), TY);
        assert_eq!(ids(&queue), vec![2, 4, 6]);
    }

    #[test]
    fn test_rotation_preserves_order() {
        let mut queue = UpdateQueue::new();
        for i in 1..=3 {
            queue.push_back(RuntimeId(i), TY);
        }
        let (id, ty) = queue.pop_front().unwrap();
        assert_eq!(id, RuntimeId(1));
        queue.push_back(id, ty);
        assert_eq!(ids(&queue), vec![2, 3, 1]);
    }

    #[test]
    fn test_retain() {
        let mut queue = UpdateQueue::new();
        let other = TypeIdentity::from_name("test::Rock");
        queue.push_back(RuntimeId(1), TY);
        queue.push_back(RuntimeId(2), other);
        queue.push_back(RuntimeId(3), TY);

        assert_eq!(queue.retain(|_, ty| ty == TY), 1);
        assert_eq!(ids(&queue), vec![1, 3]);
        assert!(!queue.contains(RuntimeId(2)));
    }

    #[test]
    fn test_pop_until_empty() {
        let mut queue = UpdateQueue::new();
        queue.push_back(RuntimeId(1), TY);
        queue.push_back(RuntimeId(2), TY);
        assert_eq!(queue.pop_front().map(|(id, _)| id), Some(RuntimeId(1)));
        assert_eq!(queue.pop_front().map(|(id, _)| id), Some(RuntimeId(2)));
        assert_eq!(queue.pop_front(), None);
        assert!(queue.is_empty());

        queue.push_back(RuntimeId(3), TY);
        assert_eq!(ids(&queue), vec![3]);
    }
}
