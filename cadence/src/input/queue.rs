//! FIFO input dispatch queue with humanized timing.
//!
//! Producers on any thread enqueue targets; the driving loop calls
//! [`InputQueue::pump`] once per tick to service the head. Queue mutation takes
//! the write lock, inspection takes the read lock, and no lock is held while an
//! action runs.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, trace};

use crate::input::target::{FnPrimitive, InputHandle, InputKind, InputTarget, Primitive};
use crate::input::timing::{Clock, TimingPolicy};

type SuccessHook = Box<dyn Fn(&InputTarget) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct LastInput {
    at_ms: Option<u64>,
    kind: Option<InputKind>,
}

/// What a single [`InputQueue::pump`] call did with the head target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStep {
    /// Queue was empty.
    Empty,
    /// A timing gate deferred the head to a later tick.
    Deferred,
    /// The head was attempted for the first time.
    Attempted { ok: bool },
    /// The head had failed and was re-attempted.
    Retried { ok: bool },
    /// The head had succeeded and was dequeued.
    Completed,
    /// The head is mid-attempt; nothing to do.
    Busy,
}

impl PumpStep {
    /// `false` only when there was nothing to do.
    pub fn had_work(self) -> bool {
        self != PumpStep::Empty
    }
}

pub struct InputQueue {
    queue: RwLock<VecDeque<InputHandle>>,
    last: Mutex<LastInput>,
    timing: TimingPolicy,
    clock: Arc<dyn Clock>,
    on_success: RwLock<Vec<SuccessHook>>,
}

impl InputQueue {
    pub fn new(timing: TimingPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: RwLock::new(VecDeque::new()),
            last: Mutex::new(LastInput::default()),
            timing,
            clock,
            on_success: RwLock::new(Vec::new()),
        }
    }

    /// Run `hook` each time a target is dequeued as successful.
    pub fn on_success<F>(&self, hook: F)
    where
        F: Fn(&InputTarget) + Send + Sync + 'static,
    {
        self.on_success.write().push(Box::new(hook));
    }

    pub fn timing(&self) -> &TimingPolicy {
        &self.timing
    }

    /// Append `target` to the tail and hand it back for inspection.
    pub fn enqueue(&self, target: InputTarget) -> InputHandle {
        let handle = Arc::new(target);
        self.queue.write().push_back(Arc::clone(&handle));
        trace!(kind = %handle.kind(), label = ?handle.label(), "input enqueued");
        handle
    }

    pub fn click(&self, action: Arc<dyn Primitive>) -> InputHandle {
        self.enqueue(InputTarget::new(InputKind::Pointer, None, action))
    }

    /// Pointer interaction with a named menu option.
    pub fn interact(&self, action: Arc<dyn Primitive>, option: &str) -> InputHandle {
        self.enqueue(InputTarget::new(
            InputKind::Pointer,
            Some(option.to_string()),
            action,
        ))
    }

    pub fn type_keys(&self, action: Arc<dyn Primitive>, text: &str) -> InputHandle {
        self.enqueue(InputTarget::new(
            InputKind::Keys,
            Some(text.to_string()),
            action,
        ))
    }

    pub fn combat(&self, action: Arc<dyn Primitive>) -> InputHandle {
        self.enqueue(InputTarget::new(InputKind::Contested, None, action))
    }

    /// Queue an opaque client call.
    pub fn callback<F>(&self, label: Option<&str>, call: F) -> InputHandle
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.enqueue(InputTarget::new(
            InputKind::Callback,
            label.map(str::to_string),
            Arc::new(FnPrimitive(call)),
        ))
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.read().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Target at `offset` from the head, if any.
    pub fn peek(&self, offset: usize) -> Option<InputHandle> {
        self.queue.read().get(offset).cloned()
    }

    pub fn last_input_kind(&self) -> Option<InputKind> {
        self.last.lock().kind
    }

    /// Drop every queued target.
    pub fn wipe(&self) {
        let mut queue = self.queue.write();
        if !queue.is_empty() {
            debug!(dropped = queue.len(), "wiping input queue");
        }
        queue.clear();
    }

    /// Service the head of the queue. Returns `false` when there was nothing
    /// to do.
    pub fn pump(&self) -> bool {
        self.pump_step().had_work()
    }

    /// [`Self::pump`] with the detail of what happened.
    #[instrument(level = "trace", skip_all)]
    pub fn pump_step(&self) -> PumpStep {
        let Some(head) = self.peek(0) else {
            return PumpStep::Empty;
        };

        if head.is_attempted() {
            if !head.is_successful() {
                debug!(kind = %head.kind(), attempts = head.attempts(), "re-attempting input");
                let ok = head.attempt();
                return PumpStep::Retried { ok };
            }
            debug!(kind = %head.kind(), label = ?head.label(), "input successful");
            let now = self.clock.now_ms();
            self.last.lock().at_ms = Some(now);
            if self.peek(1).is_some() {
                debug!("hovering next input");
                self.act_on_target(&head, true);
            }
            self.last.lock().kind = Some(head.kind());
            self.pop_if_head(&head);
            let hooks = self.on_success.read();
            for hook in &*hooks {
                hook(&*head);
            }
            return PumpStep::Completed;
        }

        if head.is_attempting() {
            return PumpStep::Busy;
        }
        match self.act_on_target(&head, false) {
            Some(ok) => PumpStep::Attempted { ok },
            None => PumpStep::Deferred,
        }
    }

    /// Apply the timing policy to `target`. Returns the attempt result, or
    /// `None` when nothing was attempted (deferred, or a hover).
    fn act_on_target(&self, target: &InputTarget, hover: bool) -> Option<bool> {
        let now = self.clock.now_ms();
        let last = *self.last.lock();
        let delay = last.at_ms.map_or(u64::MAX, |at| now.saturating_sub(at));

        if !hover && last.kind != Some(target.kind()) {
            let threshold = self.timing.switch_threshold_ms();
            if delay <= threshold {
                trace!(delay, threshold, kind = %target.kind(), "deferring input kind switch");
                return None;
            }
        }

        if target.kind() == InputKind::Pointer {
            if hover {
                target.hover();
                return None;
            }
            let min_click = self.timing.min_click_ms();
            if delay > min_click {
                return Some(target.attempt());
            }
            trace!(delay, min_click, "deferring click");
            return None;
        }

        if !hover && !target.is_attempting() {
            return Some(target.attempt());
        }
        None
    }

    fn pop_if_head(&self, head: &InputHandle) {
        let mut queue = self.queue.write();
        if queue.front().is_some_and(|front| Arc::ptr_eq(front, head)) {
            queue.pop_front();
        }
    }
}
