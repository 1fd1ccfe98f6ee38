//! Missions group nodes into a tree; the logic tree is the rooted registry the
//! brain evaluates once per tick.

use anyhow::Result;
use tracing::{debug, info};

use crate::core::task::{Evaluation, Invalidation, Node};

/// An ordered group of nodes evaluated depth-first.
///
/// A pass stops at the first child whose handler fired, so the tree takes at
/// most one step per tick. An [`Invalidation::All`] from any child bubbles up
/// unchanged.
pub struct Mission {
    name: &'static str,
    children: Vec<Box<dyn Node>>,
}

impl Mission {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    /// Wrap a single node in a mission named after it.
    pub fn of<N: Node + 'static>(node: N) -> Self {
        let mut mission = Self::new(node.name());
        mission.push(node);
        mission
    }

    pub fn push<N: Node + 'static>(&mut self, node: N) -> &mut Self {
        self.children.push(Box::new(node));
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn clear(&mut self) {
        self.children.clear();
    }
}

impl Node for Mission {
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&mut self) -> Result<Evaluation> {
        for child in &mut self.children {
            let eval = child.evaluate()?;
            if eval.acted() || eval.scope == Invalidation::All {
                return Ok(eval);
            }
        }
        Ok(Evaluation::IDLE)
    }

    fn invalidate(&mut self) {
        for child in &mut self.children {
            child.invalidate();
        }
    }
}

/// Root of the task tree.
pub struct LogicTree {
    root: Mission,
}

impl Default for LogicTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicTree {
    pub fn new() -> Self {
        Self {
            root: Mission::new("root"),
        }
    }

    pub fn register<N: Node + 'static>(&mut self, node: N) {
        info!(node = node.name(), "registering node");
        self.root.push(node);
    }

    /// Drop every registered node. The only way nodes are destroyed.
    pub fn clear(&mut self) {
        debug!(nodes = self.root.len(), "clearing logic tree");
        self.root.clear();
    }

    /// Mark every node stale without destroying any.
    pub fn invalidate(&mut self) {
        debug!("invalidating logic tree");
        self.root.invalidate();
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// One evaluation pass. A tree-wide invalidation is applied before returning.
    pub fn evaluate(&mut self) -> Result<Evaluation> {
        let eval = self.root.evaluate()?;
        if eval.scope == Invalidation::All {
            self.invalidate();
        }
        Ok(eval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{Fired, Task};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task_with(
        name: &'static str,
        state: Option<u8>,
        scope: Invalidation,
        invalidations: Arc<AtomicUsize>,
    ) -> Task<u8> {
        let mut task = Task::new(name, move || Ok(state));
        task.register(|_| true, move |_| Ok(scope))
            .on_invalidate(move || {
                invalidations.fetch_add(1, Ordering::SeqCst);
            });
        task
    }

    #[test]
    fn pass_stops_at_first_acting_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tree = LogicTree::new();
        tree.register(task_with("idle", None, Invalidation::None, Arc::clone(&counter)));
        tree.register(task_with("first", Some(1), Invalidation::None, Arc::clone(&counter)));
        tree.register(task_with("second", Some(2), Invalidation::None, Arc::clone(&counter)));

        let eval = tree.evaluate().expect("evaluate");
        assert_eq!(eval.task, Some("first"));
        assert_eq!(eval.fired, Some(Fired::Rule(0)));
    }

    #[test]
    fn all_scope_invalidates_every_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tree = LogicTree::new();
        tree.register(task_with("closer", Some(1), Invalidation::All, Arc::clone(&counter)));
        tree.register(task_with("other", Some(2), Invalidation::None, Arc::clone(&counter)));

        tree.evaluate().expect("evaluate");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(tree.len(), 2, "invalidation never destroys tasks");
    }

    #[test]
    fn nested_missions_bubble_tree_invalidation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut inner = Mission::new("inner");
        inner.push(task_with("leaf", Some(1), Invalidation::All, Arc::clone(&counter)));
        let mut tree = LogicTree::new();
        tree.register(inner);
        tree.register(task_with("sibling", Some(2), Invalidation::None, Arc::clone(&counter)));

        let eval = tree.evaluate().expect("evaluate");
        assert_eq!(eval.task, Some("leaf"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_is_the_only_way_to_drop_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tree = LogicTree::new();
        tree.register(Mission::of(task_with(
            "solo",
            Some(1),
            Invalidation::None,
            Arc::clone(&counter),
        )));
        tree.invalidate();
        assert_eq!(tree.len(), 1);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.evaluate().expect("evaluate"), Evaluation::IDLE);
    }
}
