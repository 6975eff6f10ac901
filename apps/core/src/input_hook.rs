use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::keyboard_hook::{HookError, KeyboardHook};
use crate::model::{KeyEvent, KeyTransition, ModifierState, Verdict};

// Returns true to let the key event propagate.
pub type KeyboardHandler = Arc<dyn Fn(KeyTransition, u32, ModifierState) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutPolicy {
    #[default]
    AllMustAllow,
    FirstSubscriber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Unarmed,
    Armed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub events: u64,
    pub swallowed: u64,
    pub faults: u64,
}

pub struct InputHookBridge {
    subscribers: RwLock<Vec<(SubscriptionId, KeyboardHandler)>>,
    next_id: AtomicU64,
    policy: FanOutPolicy,
    state: Mutex<HookState>,
    events: AtomicU64,
    swallowed: AtomicU64,
    faults: AtomicU64,
}

impl Default for InputHookBridge {
    fn default() -> Self {
        Self::new(FanOutPolicy::default())
    }
}

impl InputHookBridge {
    pub fn new(policy: FanOutPolicy) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            policy,
            state: Mutex::new(HookState::Unarmed),
            events: AtomicU64::new(0),
            swallowed: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> FanOutPolicy {
        self.policy
    }

    pub fn subscribe(&self, handler: KeyboardHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, handler));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn on_key_event(&self, event: KeyEvent) -> Verdict {
        self.events.fetch_add(1, Ordering::Relaxed);

        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<KeyboardHandler> = {
            let subscribers = self.subscribers.read();
            match self.policy {
                FanOutPolicy::AllMustAllow => {
                    subscribers.iter().map(|(_, h)| Arc::clone(h)).collect()
                }
                FanOutPolicy::FirstSubscriber => subscribers
                    .first()
                    .map(|(_, h)| Arc::clone(h))
                    .into_iter()
                    .collect(),
            }
        };

        for handler in handlers {
            if self.consult(&handler, event) == Verdict::Swallow {
                self.swallowed.fetch_add(1, Ordering::Relaxed);
                return Verdict::Swallow;
            }
        }
        Verdict::Allow
    }

    fn consult(&self, handler: &KeyboardHandler, event: KeyEvent) -> Verdict {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler(event.transition, event.key_code, event.modifiers)
        }));
        match outcome {
            Ok(allow) => Verdict::from_allow(allow),
            Err(_) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(key_code = event.key_code, "keyboard handler panicked; allowing event");
                Verdict::Allow
            }
        }
    }

    pub fn arm(self: &Arc<Self>, hook: &mut dyn KeyboardHook) -> Result<(), HookError> {
        let mut state = self.state.lock();
        if *state == HookState::Armed {
            return Err(HookError::AlreadyInstalled);
        }
        let bridge = Arc::clone(self);
        hook.install(Arc::new(move |event| bridge.on_key_event(event)))?;
        *state = HookState::Armed;
        info!(policy = ?self.policy, "keyboard hook armed");
        Ok(())
    }

    pub fn disarm(&self, hook: &mut dyn KeyboardHook) -> Result<(), HookError> {
        let mut state = self.state.lock();
        if *state == HookState::Unarmed {
            return Ok(());
        }
        hook.uninstall()?;
        *state = HookState::Unarmed;
        info!("keyboard hook disarmed");
        Ok(())
    }

    pub fn state(&self) -> HookState {
        *self.state.lock()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            events: self.events.load(Ordering::Relaxed),
            swallowed: self.swallowed.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}
