//! Publish/subscribe module bus and module-lifecycle supervision.
//!
//! Modules register once at startup and communicate only through published
//! messages. Dispatch is cooperative: exactly one handler runs at a time and
//! runs to completion, so shared state mutation stays trivially race-free.
//! A handler may publish while being invoked; such messages are enqueued and
//! drained in publish order after the current delivery finishes.

use std::collections::{HashMap, VecDeque};

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::{
    app_context::AppState,
    config::Config,
    message::{Message, MessageKind, Payload},
};

/// Lifecycle state of a registered module.
///
/// `Stopped` is terminal: a stopped module receives no further messages and
/// its resources are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Init,
    Started,
    Paused,
    Stopped,
}

/// Result of a module's one-time setup.
pub enum InitOutcome {
    /// Setup finished, start receiving messages.
    Ready,
    /// A required external resource is not available yet; stay paused and
    /// retry on a later evaluation pass.
    Deferred,
}

/// What the bus should do with a module after a handled message.
pub enum Verdict {
    Continue,
    /// Poison pill: transition this module to `Stopped` and release it.
    Poison,
}

/// A named unit of behavior driven by bus messages.
#[async_trait]
pub trait Module: Send {
    fn name(&self) -> &'static str;

    /// Message kinds this module receives while started.
    fn subscriptions(&self) -> &'static [MessageKind];

    /// Hard precondition checked once at registration; a module that is not
    /// enabled is never added to the bus.
    fn enabled(&self, _state: &AppState, _config: &Config) -> bool {
        true
    }

    /// Soft precondition re-checked by the bus after every delivered
    /// message; flips the module between `Started` and `Paused`.
    fn evaluate(&self, _state: &AppState, _config: &Config) -> bool {
        true
    }

    /// One-time setup. An error is a poison pill.
    async fn init(&mut self, ctx: &mut BusContext<'_>) -> Result<InitOutcome>;

    async fn handle(&mut self, msg: &Message, ctx: &mut BusContext<'_>) -> Result<Verdict>;

    /// Called once when the module transitions to `Stopped`.
    async fn destroy(&mut self) {}
}

/// Per-invocation view of the world handed to a module.
///
/// Carries the shared state and configuration, the publish queue, and a
/// read-only snapshot of every module's lifecycle state for weak
/// dependency lookups.
pub struct BusContext<'a> {
    pub state: &'a mut AppState,
    pub config: &'a mut Config,
    sender: &'static str,
    outbox: &'a mut VecDeque<Message>,
    registry: &'a [(&'static str, ModuleState)],
}

impl<'a> BusContext<'a> {
    /// Context detached from a running bus, for driving module internals
    /// directly in tests.
    #[cfg(test)]
    pub(crate) fn detached(
        state: &'a mut AppState,
        config: &'a mut Config,
        outbox: &'a mut VecDeque<Message>,
        registry: &'a [(&'static str, ModuleState)],
    ) -> Self {
        Self {
            state,
            config,
            sender: "test",
            outbox,
            registry,
        }
    }

    /// Publishes a message on behalf of the invoked module. Delivery happens
    /// after the current handler returns.
    pub fn publish(&mut self, payload: Payload) {
        self.outbox.push_back(Message::from_module(self.sender, payload));
    }

    /// Weak, non-owning lookup of another module's lifecycle state.
    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.registry
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, s)| *s)
    }
}

struct ModuleSlot {
    name: &'static str,
    state: ModuleState,
    /// False until `init` has returned `Ready`; a paused-uninitialized
    /// module gets its init retried instead of being resumed.
    initialized: bool,
    module: Option<Box<dyn Module>>,
}

/// Process-wide dispatcher and module supervisor.
#[derive(Default)]
pub struct ModuleBus {
    modules: Vec<ModuleSlot>,
    subscribers: HashMap<MessageKind, Vec<usize>>,
    queue: VecDeque<Message>,
}

impl ModuleBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module in `Init` state. Names must be unique; a module whose
    /// `enabled` precondition fails is skipped entirely.
    pub fn register(
        &mut self,
        module: Box<dyn Module>,
        state: &AppState,
        config: &Config,
    ) -> Result<()> {
        let name = module.name();
        if self.modules.iter().any(|slot| slot.name == name) {
            bail!("Module '{name}' is already registered");
        }
        if !module.enabled(state, config) {
            info!("Module '{name}' disabled, skipping registration");
            return Ok(());
        }
        self.modules.push(ModuleSlot {
            name,
            state: ModuleState::Init,
            initialized: false,
            module: Some(module),
        });
        Ok(())
    }

    /// Weak lookup of a module's lifecycle state. Unregistered (or skipped)
    /// names yield `None`.
    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.modules
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.state)
    }

    /// Forces a module to `Stopped`.
    pub async fn poison(&mut self, name: &str) {
        if let Some(idx) = self.modules.iter().position(|slot| slot.name == name) {
            self.stop_module(idx).await;
        }
    }

    /// Runs the initial evaluation pass and drains anything published by
    /// module setup.
    pub async fn start(&mut self, state: &mut AppState, config: &mut Config) {
        self.evaluation_pass(state, config).await;
        self.drain(state, config).await;
    }

    /// Publishes a message and synchronously delivers it (and everything
    /// published while handling it) to current subscribers.
    pub async fn dispatch(&mut self, msg: Message, state: &mut AppState, config: &mut Config) {
        self.queue.push_back(msg);
        self.drain(state, config).await;
    }

    /// Stops every remaining module, in registration order.
    pub async fn shutdown(&mut self) {
        for idx in 0..self.modules.len() {
            if self.modules[idx].state != ModuleState::Stopped {
                self.stop_module(idx).await;
            }
        }
    }

    async fn drain(&mut self, state: &mut AppState, config: &mut Config) {
        while let Some(msg) = self.queue.pop_front() {
            self.deliver(&msg, state, config).await;
            self.evaluation_pass(state, config).await;
        }
    }

    async fn deliver(&mut self, msg: &Message, state: &mut AppState, config: &mut Config) {
        let Some(subs) = self.subscribers.get(&msg.kind()).cloned() else {
            return;
        };
        for idx in subs {
            if self.modules[idx].state != ModuleState::Started {
                continue;
            }
            let name = self.modules[idx].name;
            let Some(mut module) = self.modules[idx].module.take() else {
                continue;
            };
            let registry = self.registry_snapshot();
            let mut ctx = BusContext {
                state,
                config,
                sender: name,
                outbox: &mut self.queue,
                registry: &registry,
            };
            let verdict = module.handle(msg, &mut ctx).await;
            self.modules[idx].module = Some(module);
            match verdict {
                Ok(Verdict::Continue) => {}
                Ok(Verdict::Poison) => self.stop_module(idx).await,
                Err(e) => error!("Module '{name}' failed to handle {:?}: {e:#}", msg.kind()),
            }
        }
    }

    /// Re-checks every module's `evaluate` predicate, initializing modules
    /// whose turn has come and pausing/resuming the rest.
    async fn evaluation_pass(&mut self, state: &mut AppState, config: &mut Config) {
        for idx in 0..self.modules.len() {
            let slot = &self.modules[idx];
            match (slot.state, slot.initialized) {
                (ModuleState::Init, _) | (ModuleState::Paused, false) => {
                    let runnable = self.modules[idx]
                        .module
                        .as_ref()
                        .is_some_and(|m| m.evaluate(state, config));
                    if runnable {
                        self.init_module(idx, state, config).await;
                    }
                }
                (ModuleState::Started, true) => {
                    let runnable = self.modules[idx]
                        .module
                        .as_ref()
                        .is_some_and(|m| m.evaluate(state, config));
                    if !runnable {
                        debug!("Module '{}' paused", self.modules[idx].name);
                        self.modules[idx].state = ModuleState::Paused;
                    }
                }
                (ModuleState::Paused, true) => {
                    let runnable = self.modules[idx]
                        .module
                        .as_ref()
                        .is_some_and(|m| m.evaluate(state, config));
                    if runnable {
                        debug!("Module '{}' resumed", self.modules[idx].name);
                        self.modules[idx].state = ModuleState::Started;
                    }
                }
                _ => {}
            }
        }
    }

    async fn init_module(&mut self, idx: usize, state: &mut AppState, config: &mut Config) {
        let name = self.modules[idx].name;
        let Some(mut module) = self.modules[idx].module.take() else {
            return;
        };
        let registry = self.registry_snapshot();
        let mut ctx = BusContext {
            state,
            config,
            sender: name,
            outbox: &mut self.queue,
            registry: &registry,
        };
        let outcome = module.init(&mut ctx).await;
        self.modules[idx].module = Some(module);
        match outcome {
            Ok(InitOutcome::Ready) => {
                for kind in self.modules[idx]
                    .module
                    .as_ref()
                    .map(|m| m.subscriptions())
                    .unwrap_or_default()
                {
                    self.subscribers.entry(*kind).or_default().push(idx);
                }
                self.modules[idx].state = ModuleState::Started;
                self.modules[idx].initialized = true;
                info!("Module '{name}' started");
            }
            Ok(InitOutcome::Deferred) => {
                self.modules[idx].state = ModuleState::Paused;
                debug!("Module '{name}' init deferred");
            }
            Err(e) => {
                warn!("Module '{name}' failed to init: {e:#}");
                self.stop_module(idx).await;
            }
        }
    }

    async fn stop_module(&mut self, idx: usize) {
        if self.modules[idx].state == ModuleState::Stopped {
            return;
        }
        self.modules[idx].state = ModuleState::Stopped;
        if let Some(mut module) = self.modules[idx].module.take() {
            module.destroy().await;
        }
        info!("Module '{}' stopped", self.modules[idx].name);
    }

    fn registry_snapshot(&self) -> Vec<(&'static str, ModuleState)> {
        self.modules
            .iter()
            .map(|slot| (slot.name, slot.state))
            .collect()
    }
}
