//! Declarative tasks: desired state in, first matching handler out.
//!
//! A [`Task`] owns a desired-state function and an ordered rule list. Each
//! evaluation computes the desired state once, fires at most one handler, and
//! reports how much cached state must be recomputed via [`Invalidation`].

use anyhow::{Context, Result};
use tracing::{debug, trace, warn};

/// How much cached state a handler invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Invalidation {
    /// Leave cached observations in place.
    #[default]
    None,
    /// Drop the observations this task computes its desired state from.
    SelfOnly,
    /// Invalidate every task in the containing tree.
    All,
}

/// Which rule fired during an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// The desired state was `None` and the satisfied rule ran.
    Satisfied,
    /// The explicit rule at this registration index ran.
    Rule(usize),
    /// No explicit rule matched and the default ran.
    Default,
}

/// Result of evaluating a node once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Name of the task whose handler fired, if any.
    pub task: Option<&'static str>,
    pub fired: Option<Fired>,
    pub scope: Invalidation,
}

impl Evaluation {
    /// Nothing matched; nothing to invalidate.
    pub const IDLE: Evaluation = Evaluation {
        task: None,
        fired: None,
        scope: Invalidation::None,
    };

    pub fn acted(&self) -> bool {
        self.fired.is_some()
    }
}

/// A member of the logic tree.
pub trait Node: Send {
    fn name(&self) -> &'static str;

    /// Run one evaluation pass.
    fn evaluate(&mut self) -> Result<Evaluation>;

    /// Mark cached state stale. Never destroys the node.
    fn invalidate(&mut self);
}

type DesiredFn<T> = Box<dyn FnMut() -> Result<Option<T>> + Send>;
type Predicate<T> = Box<dyn Fn(&T) -> bool + Send>;
type Handler<T> = Box<dyn FnMut(&T) -> Result<Invalidation> + Send>;
type SatisfiedHandler = Box<dyn FnMut() -> Result<Invalidation> + Send>;
type Hook = Box<dyn FnMut() + Send>;

struct Rule<T> {
    predicate: Predicate<T>,
    handler: Handler<T>,
}

/// A task generic over its desired-state type.
///
/// Rules are evaluated in registration order and the first match wins. The
/// order is part of the contract: registering the same rules in a different
/// order can change which handler fires.
pub struct Task<T> {
    name: &'static str,
    desired: DesiredFn<T>,
    satisfied: Option<SatisfiedHandler>,
    rules: Vec<Rule<T>>,
    default: Option<Handler<T>>,
    hooks: Vec<Hook>,
    snapshot: Option<Option<T>>,
}

impl<T: Send + 'static> Task<T> {
    pub fn new<F>(name: &'static str, desired: F) -> Self
    where
        F: FnMut() -> Result<Option<T>> + Send + 'static,
    {
        Self {
            name,
            desired: Box::new(desired),
            satisfied: None,
            rules: Vec::new(),
            default: None,
            hooks: Vec::new(),
            snapshot: None,
        }
    }

    /// Append a rule whose handler reports its own invalidation scope.
    pub fn register<P, H>(&mut self, predicate: P, handler: H) -> &mut Self
    where
        P: Fn(&T) -> bool + Send + 'static,
        H: FnMut(&T) -> Result<Invalidation> + Send + 'static,
    {
        self.rules.push(Rule {
            predicate: Box::new(predicate),
            handler: Box::new(handler),
        });
        self
    }

    /// Append a side-effecting rule with an implicit [`Invalidation::None`].
    pub fn register_effect<P, H>(&mut self, predicate: P, mut handler: H) -> &mut Self
    where
        P: Fn(&T) -> bool + Send + 'static,
        H: FnMut(&T) -> Result<()> + Send + 'static,
    {
        self.register(predicate, move |state| {
            handler(state)?;
            Ok(Invalidation::None)
        })
    }

    /// Rule fired when the desired state is `None` (goal already holds).
    pub fn register_satisfied<H>(&mut self, handler: H) -> &mut Self
    where
        H: FnMut() -> Result<Invalidation> + Send + 'static,
    {
        if self.satisfied.is_some() {
            warn!(task = self.name, "replacing satisfied handler");
        }
        self.satisfied = Some(Box::new(handler));
        self
    }

    /// Fallback fired when no explicit rule matches a non-`None` state.
    pub fn register_default<H>(&mut self, handler: H) -> &mut Self
    where
        H: FnMut(&T) -> Result<Invalidation> + Send + 'static,
    {
        if self.default.is_some() {
            warn!(task = self.name, "replacing default handler");
        }
        self.default = Some(Box::new(handler));
        self
    }

    /// Run `hook` whenever this task is invalidated (typically: drop a cache).
    pub fn on_invalidate<H>(&mut self, hook: H) -> &mut Self
    where
        H: FnMut() + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Desired state, computed at most once until the next evaluation or
    /// invalidation.
    pub fn desired_state(&mut self) -> Result<Option<&T>> {
        if self.snapshot.is_none() {
            let state = (self.desired)()
                .with_context(|| format!("compute desired state for task '{}'", self.name))?;
            self.snapshot = Some(state);
        }
        Ok(self.snapshot.as_ref().and_then(Option::as_ref))
    }

    fn dispatch(&mut self, state: Option<&T>) -> Result<Option<(Fired, Invalidation)>> {
        let Some(state) = state else {
            return match self.satisfied.as_mut() {
                Some(handler) => Ok(Some((Fired::Satisfied, handler()?))),
                None => Ok(None),
            };
        };
        for (index, rule) in self.rules.iter_mut().enumerate() {
            if (rule.predicate)(state) {
                return Ok(Some((Fired::Rule(index), (rule.handler)(state)?)));
            }
        }
        match self.default.as_mut() {
            Some(handler) => Ok(Some((Fired::Default, handler(state)?))),
            None => Ok(None),
        }
    }
}

impl<T: Send + 'static> Node for Task<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn evaluate(&mut self) -> Result<Evaluation> {
        self.snapshot = None;
        self.desired_state()?;
        let snapshot = self.snapshot.take().flatten();
        let dispatched = self
            .dispatch(snapshot.as_ref())
            .with_context(|| format!("handler fault in task '{}'", self.name))?;
        self.snapshot = Some(snapshot);

        let Some((fired, scope)) = dispatched else {
            trace!(task = self.name, "no rule matched");
            return Ok(Evaluation::IDLE);
        };
        debug!(task = self.name, ?fired, ?scope, "task handler fired");
        if scope == Invalidation::SelfOnly {
            self.invalidate();
        }
        Ok(Evaluation {
            task: Some(self.name),
            fired: Some(fired),
            scope,
        })
    }

    fn invalidate(&mut self) {
        self.snapshot = None;
        for hook in &mut self.hooks {
            hook();
        }
    }
}
