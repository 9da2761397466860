//! Intrusive circular doubly-linked list of waiter events.
//!
//! A node is either a list *container* (the sentinel head, holding no event)
//! or a list *element* (owning exactly one event). A node whose links point
//! back at itself is a singleton: an empty container, or an element which is
//! not in any list.
//!
//! The one unusual requirement is [`EventNode::extract`]: it removes an
//! element from whatever list holds it, or does nothing if it is already a
//! singleton. Both a waiter timing out and a `signal()` picking that waiter
//! may try to unlink the same node, and only the first one should.
//!
//! Every operation is O(1) and touches only the node and its direct
//! neighbors, so the debug checks validate local link consistency instead of
//! walking the list. None of this is synchronized: callers serialize all
//! access to a list and its nodes with the backend's private lock.

use crate::event::AutoResetEvent;
use core::{cell::Cell, marker::PhantomData, ptr::NonNull};

pub(crate) struct EventNode<E> {
    event: Option<E>,
    next: Cell<NonNull<Self>>,
    prev: Cell<NonNull<Self>>,
}

impl<E> EventNode<E> {
    /// Heap allocate a container singleton.
    fn alloc() -> NonNull<Self> {
        let node = Box::new(Self {
            event: None,
            next: Cell::new(NonNull::dangling()),
            prev: Cell::new(NonNull::dangling()),
        });

        let node = NonNull::from(Box::leak(node));
        unsafe {
            node.as_ref().next.set(node);
            node.as_ref().prev.set(node);
        }
        node
    }

    /// Heap allocate an element singleton owning a fresh event.
    pub(crate) fn new_element() -> NonNull<Self>
    where
        E: AutoResetEvent,
    {
        let node = Self::alloc();
        unsafe { Self::init_list_element(node) };
        node
    }

    /// Permanently turn a container into a list element.
    unsafe fn init_list_element(node: NonNull<Self>)
    where
        E: AutoResetEvent,
    {
        let event = &mut (*node.as_ptr()).event;
        debug_assert!(event.is_none());
        *event = Some(E::default());
    }

    /// Free a singleton element along with its event.
    ///
    /// # Safety
    ///
    /// `node` must have come from [`new_element`](Self::new_element), be a
    /// singleton, and not be used again.
    pub(crate) unsafe fn destroy(node: NonNull<Self>) {
        debug_assert!(Self::validate_as_item(node));
        debug_assert!(Self::is_singleton(node));
        drop(Box::from_raw(node.as_ptr()));
    }

    /// The event owned by an element.
    ///
    /// # Safety
    ///
    /// `node` must be a live element and must outlive `'a`.
    pub(crate) unsafe fn event<'a>(node: NonNull<Self>) -> &'a E {
        match &(*node.as_ptr()).event {
            Some(event) => event,
            None => unreachable!("list container has no event"),
        }
    }

    /// # Safety
    ///
    /// `node` and its neighbors must be live.
    pub(crate) unsafe fn is_singleton(node: NonNull<Self>) -> bool {
        debug_assert!(Self::validate_links(node));
        node.as_ref().next.get() == node
    }

    /// Unlink an element from the list containing it, if any.
    ///
    /// Always leaves the node a singleton and hands it back, so calling it a
    /// second time is a no-op.
    ///
    /// # Safety
    ///
    /// `node` and its neighbors must be live, and no other thread may touch
    /// the surrounding list concurrently.
    pub(crate) unsafe fn extract(node: NonNull<Self>) -> NonNull<Self> {
        debug_assert!(Self::validate_as_item(node));
        if !Self::is_singleton(node) {
            let (next, prev) = (node.as_ref().next.get(), node.as_ref().prev.get());

            // Stitch the neighbors together.
            next.as_ref().prev.set(prev);
            prev.as_ref().next.set(next);

            node.as_ref().next.set(node);
            node.as_ref().prev.set(node);
        }

        debug_assert!(Self::is_singleton(node));
        node
    }

    unsafe fn validate_as_item(node: NonNull<Self>) -> bool {
        node.as_ref().event.is_some() && Self::validate_links(node)
    }

    unsafe fn validate_as_list(node: NonNull<Self>) -> bool {
        node.as_ref().event.is_none() && Self::validate_links(node)
    }

    /// Both neighbors point back at `node`. Deliberately not an O(n) walk.
    unsafe fn validate_links(node: NonNull<Self>) -> bool {
        let (next, prev) = (node.as_ref().next.get(), node.as_ref().prev.get());
        next.as_ref().prev.get() == node && prev.as_ref().next.get() == node
    }
}

/// A circular list rooted at a heap allocated container node.
///
/// The list owns its elements: dropping it frees every element still linked
/// into it. The container lives on the heap so the list can move without
/// invalidating the elements' links to it.
pub(crate) struct EventList<E> {
    head: NonNull<EventNode<E>>,
    _owns: PhantomData<Box<EventNode<E>>>,
}

unsafe impl<E: Send> Send for EventList<E> {}

impl<E> Default for EventList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Drop for EventList<E> {
    fn drop(&mut self) {
        while let Some(node) = self.pop_front() {
            unsafe { EventNode::destroy(node) };
        }

        unsafe {
            debug_assert!(EventNode::validate_as_list(self.head));
            debug_assert!(EventNode::is_singleton(self.head));
            drop(Box::from_raw(self.head.as_ptr()));
        }
    }
}

impl<E> EventList<E> {
    pub(crate) fn new() -> Self {
        Self {
            head: EventNode::alloc(),
            _owns: PhantomData,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        unsafe {
            debug_assert!(EventNode::validate_as_list(self.head));
            EventNode::is_singleton(self.head)
        }
    }

    /// Link a singleton element in as the most recently added one.
    ///
    /// # Safety
    ///
    /// `node` must be a live singleton element from
    /// [`EventNode::new_element`]. The list takes ownership of it.
    pub(crate) unsafe fn push_back(&mut self, node: NonNull<EventNode<E>>) {
        debug_assert!(EventNode::validate_as_list(self.head));
        debug_assert!(EventNode::validate_as_item(node));
        debug_assert!(EventNode::is_singleton(node));

        let head = self.head.as_ref();
        let tail = head.prev.get();

        node.as_ref().prev.set(tail);
        node.as_ref().next.set(self.head);
        tail.as_ref().next.set(node);
        head.prev.set(node);

        debug_assert!(node != self.head && EventNode::validate_links(node));
    }

    /// Unlink the least recently added element, handing its ownership back.
    pub(crate) fn pop_front(&mut self) -> Option<NonNull<EventNode<E>>> {
        if self.is_empty() {
            return None;
        }
        unsafe { Some(EventNode::extract(self.head.as_ref().next.get())) }
    }

    /// Unlink the most recently added element, handing its ownership back.
    pub(crate) fn pop_back(&mut self) -> Option<NonNull<EventNode<E>>> {
        if self.is_empty() {
            return None;
        }
        unsafe { Some(EventNode::extract(self.head.as_ref().prev.get())) }
    }

    /// Number of elements, found by walking the list.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }

    /// Walk the whole list checking every link, unlike the local checks.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let mut prev = self.head;
        for node in self.iter() {
            unsafe {
                if node.as_ref().prev.get() != prev || !EventNode::validate_as_item(node) {
                    return false;
                }
            }
            prev = node;
        }
        unsafe { self.head.as_ref().prev.get() == prev && EventNode::validate_as_list(self.head) }
    }

    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = NonNull<EventNode<E>>> + '_ {
        let head = self.head;
        let mut current = unsafe { head.as_ref().next.get() };
        core::iter::from_fn(move || {
            if current == head {
                return None;
            }
            let node = current;
            current = unsafe { node.as_ref().next.get() };
            Some(node)
        })
    }
}
