//! Queued units of simulated user action.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::trace;

/// A primitive action exposed by the client bindings.
///
/// Both calls must return promptly and be safe to repeat; motion and timing
/// inside the client are the implementation's concern.
pub trait Primitive: Send + Sync {
    /// Perform the action. Returns whether it took effect.
    fn attempt(&self) -> bool;

    /// Move toward the action's target without committing it.
    fn hover(&self) {}
}

/// Adapts a closure into a [`Primitive`].
pub struct FnPrimitive<F>(pub F);

impl<F> Primitive for FnPrimitive<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn attempt(&self) -> bool {
        (self.0)()
    }
}

/// Input variant. Consecutive inputs of different kinds pay the switch delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Mouse click or menu interaction on an on-screen target.
    Pointer,
    /// Typed key sequence.
    Keys,
    /// Opaque client call (bank helpers, spell activation, ...).
    Callback,
    /// Contested action such as attacking an entity.
    Contested,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputKind::Pointer => "pointer",
            InputKind::Keys => "keys",
            InputKind::Callback => "callback",
            InputKind::Contested => "contested",
        };
        f.write_str(name)
    }
}

/// One queued input with attempt/success tracking.
pub struct InputTarget {
    kind: InputKind,
    label: Option<String>,
    action: Arc<dyn Primitive>,
    attempted: AtomicBool,
    attempting: AtomicBool,
    successful: AtomicBool,
    attempts: AtomicU32,
}

/// Shared handle returned to producers.
pub type InputHandle = Arc<InputTarget>;

impl InputTarget {
    pub fn new(kind: InputKind, label: Option<String>, action: Arc<dyn Primitive>) -> Self {
        Self {
            kind,
            label,
            action,
            attempted: AtomicBool::new(false),
            attempting: AtomicBool::new(false),
            successful: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_attempted(&self) -> bool {
        self.attempted.load(Ordering::Acquire)
    }

    pub fn is_attempting(&self) -> bool {
        self.attempting.load(Ordering::Acquire)
    }

    /// Terminal once true.
    pub fn is_successful(&self) -> bool {
        self.successful.load(Ordering::Acquire)
    }

    /// How many times the action has been attempted. Callers cap retries with this.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub(crate) fn attempt(&self) -> bool {
        if self.is_successful() {
            return true;
        }
        self.attempting.store(true, Ordering::Release);
        let ok = self.action.attempt();
        self.attempts.fetch_add(1, Ordering::AcqRel);
        self.successful.store(ok, Ordering::Release);
        self.attempted.store(true, Ordering::Release);
        self.attempting.store(false, Ordering::Release);
        trace!(kind = %self.kind, label = ?self.label, ok, "input attempted");
        ok
    }

    pub(crate) fn hover(&self) {
        self.action.hover();
    }
}

impl fmt::Debug for InputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputTarget")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("attempted", &self.is_attempted())
            .field("successful", &self.is_successful())
            .field("attempts", &self.attempts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_terminal() {
        let target = InputTarget::new(
            InputKind::Callback,
            Some("close bank".to_string()),
            Arc::new(FnPrimitive(|| true)),
        );
        assert!(!target.is_attempted());
        assert!(target.attempt());
        assert!(target.attempt());
        assert!(target.is_successful());
        assert_eq!(target.attempts(), 1, "successful targets are not re-run");
    }

    #[test]
    fn failed_attempt_is_marked_attempted_but_not_successful() {
        let target = InputTarget::new(InputKind::Keys, None, Arc::new(FnPrimitive(|| false)));
        assert!(!target.attempt());
        assert!(target.is_attempted());
        assert!(!target.is_successful());
        assert!(!target.is_attempting());
    }
}
