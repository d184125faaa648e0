//! Size observation for the preview: a small view-node arena with scoped
//! subscriptions, and the observer that turns size changes and host events
//! into relayout triggers.
//!
//! Delivery is pull-based. `ViewTree::resize` only records the change; a
//! subscriber sees it on its next `take`, coalesced to the latest size.

use crate::types::Size;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Generic,
    /// The box whose size drives wrapping and fitting.
    PreviewContainer,
    ClipWrapper,
    ContentRoot,
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    role: Role,
    size: Size,
}

#[derive(Debug)]
struct Watcher {
    id: u64,
    node: NodeId,
    pending: Option<Size>,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: Vec<Node>,
    watchers: Vec<Watcher>,
    next_watcher: u64,
}

/// Shared handle to the view arena. Cloning shares the same tree.
#[derive(Debug, Clone, Default)]
pub struct ViewTree {
    inner: Rc<RefCell<TreeState>>,
}

impl ViewTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, parent: Option<NodeId>, role: Role, size: Size) -> NodeId {
        let mut state = self.inner.borrow_mut();
        let id = NodeId(state.nodes.len());
        state.nodes.push(Node { parent, role, size });
        id
    }

    /// Records a new box size; watchers of `node` see it on their next poll.
    pub fn resize(&self, node: NodeId, size: Size) {
        let mut state = self.inner.borrow_mut();
        let Some(entry) = state.nodes.get_mut(node.0) else {
            return;
        };
        if entry.size == size {
            return;
        }
        entry.size = size;
        for watcher in state.watchers.iter_mut().filter(|w| w.node == node) {
            watcher.pending = Some(size);
        }
    }

    pub fn size(&self, node: NodeId) -> Option<Size> {
        self.inner.borrow().nodes.get(node.0).map(|n| n.size)
    }

    pub fn role(&self, node: NodeId) -> Option<Role> {
        self.inner.borrow().nodes.get(node.0).map(|n| n.role)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.borrow().nodes.get(node.0).and_then(|n| n.parent)
    }

    /// Nearest ancestor of `node`, itself included, carrying `role`.
    pub fn closest(&self, node: NodeId, role: Role) -> Option<NodeId> {
        let state = self.inner.borrow();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let entry = state.nodes.get(id.0)?;
            if entry.role == role {
                return Some(id);
            }
            cursor = entry.parent;
        }
        None
    }

    /// Starts watching `node`. The current size is pending right away.
    pub fn observe(&self, node: NodeId) -> Subscription {
        let mut state = self.inner.borrow_mut();
        let id = state.next_watcher;
        state.next_watcher += 1;
        let pending = state.nodes.get(node.0).map(|n| n.size);
        state.watchers.push(Watcher { id, node, pending });
        Subscription {
            tree: Rc::downgrade(&self.inner),
            id,
            node,
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.borrow().watchers.len()
    }
}

/// A live size watch; detaches from the tree when dropped.
#[derive(Debug)]
pub struct Subscription {
    tree: Weak<RefCell<TreeState>>,
    id: u64,
    node: NodeId,
}

impl Subscription {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Latest undelivered size, if the box changed since the last call.
    pub fn take(&self) -> Option<Size> {
        let tree = self.tree.upgrade()?;
        let mut state = tree.borrow_mut();
        state
            .watchers
            .iter_mut()
            .find(|w| w.id == self.id)
            .and_then(|w| w.pending.take())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(tree) = self.tree.upgrade() {
            if let Ok(mut state) = tree.try_borrow_mut() {
                state.watchers.retain(|w| w.id != self.id);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    ContentReplaced,
    SettingsChanged,
    ContainerResized(Size),
}

/// Collects relayout triggers for one content node.
///
/// Every trigger asks for the same work (re-wrap and re-fit every paragraph),
/// so a poll hands back only the most recent one.
#[derive(Debug, Default)]
pub struct LayoutObserver {
    container: Option<NodeId>,
    subscription: Option<Subscription>,
    queued: Option<Trigger>,
    suspended: bool,
}

impl LayoutObserver {
    /// Binds to the nearest preview container above `content`. Without one
    /// the observer stays inert and layout keeps its natural flow.
    pub fn attach(tree: &ViewTree, content: NodeId) -> Self {
        let container = tree.closest(content, Role::PreviewContainer);
        if container.is_none() {
            tracing::debug!(?content, "no preview container, auto-fit disabled");
        }
        Self {
            container,
            subscription: container.map(|node| tree.observe(node)),
            queued: None,
            suspended: false,
        }
    }

    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    pub fn is_active(&self) -> bool {
        self.container.is_some()
    }

    pub fn notify(&mut self, trigger: Trigger) {
        if self.container.is_some() {
            self.queued = Some(trigger);
        }
    }

    pub fn poll(&mut self) -> Option<Trigger> {
        if self.suspended {
            return None;
        }
        if let Some(size) = self.subscription.as_ref().and_then(Subscription::take) {
            self.queued = Some(Trigger::ContainerResized(size));
        }
        self.queued.take()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Holds back triggers until [`resume`](Self::resume).
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Ends a suspension and returns whatever arrived meanwhile.
    pub fn resume(&mut self) -> Option<Trigger> {
        self.suspended = false;
        self.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_container() -> (ViewTree, NodeId, NodeId) {
        let tree = ViewTree::new();
        let root = tree.insert(None, Role::Generic, Size::new(2000.0, 2000.0));
        let container = tree.insert(
            Some(root),
            Role::PreviewContainer,
            Size::new(1920.0, 1080.0),
        );
        let content = tree.insert(Some(container), Role::ContentRoot, Size::ZERO);
        (tree, container, content)
    }

    #[test]
    fn closest_includes_the_node_itself() {
        let (tree, container, content) = tree_with_container();
        assert_eq!(tree.closest(content, Role::PreviewContainer), Some(container));
        assert_eq!(
            tree.closest(container, Role::PreviewContainer),
            Some(container)
        );
        assert_eq!(tree.closest(content, Role::ClipWrapper), None);
    }

    #[test]
    fn subscription_sees_initial_size_then_coalesced_changes() {
        let (tree, container, _) = tree_with_container();
        let sub = tree.observe(container);
        assert_eq!(sub.take(), Some(Size::new(1920.0, 1080.0)));
        assert_eq!(sub.take(), None);

        tree.resize(container, Size::new(1000.0, 1000.0));
        tree.resize(container, Size::new(1080.0, 1920.0));
        assert_eq!(sub.take(), Some(Size::new(1080.0, 1920.0)));
        assert_eq!(sub.take(), None);

        tree.resize(container, Size::new(1080.0, 1920.0));
        assert_eq!(sub.take(), None);
    }

    #[test]
    fn dropping_subscription_detaches_watcher() {
        let (tree, container, _) = tree_with_container();
        let sub = tree.observe(container);
        assert_eq!(tree.watcher_count(), 1);
        drop(sub);
        assert_eq!(tree.watcher_count(), 0);
    }

    #[test]
    fn observer_without_container_is_inert() {
        let tree = ViewTree::new();
        let content = tree.insert(None, Role::ContentRoot, Size::ZERO);
        let mut observer = LayoutObserver::attach(&tree, content);
        assert!(!observer.is_active());
        observer.notify(Trigger::ContentReplaced);
        assert_eq!(observer.poll(), None);
        assert_eq!(tree.watcher_count(), 0);
    }

    #[test]
    fn observer_reports_initial_and_later_resizes() {
        let (tree, container, content) = tree_with_container();
        let mut observer = LayoutObserver::attach(&tree, content);
        assert_eq!(observer.container(), Some(container));
        assert_eq!(
            observer.poll(),
            Some(Trigger::ContainerResized(Size::new(1920.0, 1080.0)))
        );
        assert_eq!(observer.poll(), None);

        observer.notify(Trigger::SettingsChanged);
        assert_eq!(observer.poll(), Some(Trigger::SettingsChanged));
    }

    #[test]
    fn suspended_observer_replays_on_resume() {
        let (tree, container, content) = tree_with_container();
        let mut observer = LayoutObserver::attach(&tree, content);
        observer.poll();

        observer.suspend();
        tree.resize(container, Size::new(1080.0, 1080.0));
        assert_eq!(observer.poll(), None);
        assert_eq!(
            observer.resume(),
            Some(Trigger::ContainerResized(Size::new(1080.0, 1080.0)))
        );
        assert!(!observer.is_suspended());
    }
}
