use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use waypoint_core::input_hook::{FanOutPolicy, HookState, InputHookBridge, KeyboardHandler};
use waypoint_core::keyboard_hook::{HookError, KeyboardHook, MockKeyboardHook};
use waypoint_core::model::{KeyEvent, KeyTransition, ModifierState, Verdict};

const VK_SPACE: u32 = 0x20;

fn key_down(key_code: u32) -> KeyEvent {
    KeyEvent {
        transition: KeyTransition::KeyDown,
        key_code,
        modifiers: ModifierState::default(),
    }
}

fn handler(allow: bool, calls: &Arc<AtomicUsize>) -> KeyboardHandler {
    let calls = Arc::clone(calls);
    Arc::new(move |_: KeyTransition, _: u32, _: ModifierState| {
        calls.fetch_add(1, Ordering::SeqCst);
        allow
    })
}

#[test]
fn no_subscribers_allows_every_event() {
    let bridge = InputHookBridge::default();
    assert_eq!(bridge.on_key_event(key_down(VK_SPACE)), Verdict::Allow);
    assert_eq!(bridge.stats().events, 1);
}

#[test]
fn panicking_subscriber_fails_open() {
    let bridge = InputHookBridge::default();
    bridge.subscribe(Arc::new(|_: KeyTransition, _: u32, _: ModifierState| -> bool {
        panic!("handler bug")
    }));

    assert_eq!(bridge.on_key_event(key_down(VK_SPACE)), Verdict::Allow);
    assert_eq!(bridge.stats().faults, 1);
}

#[test]
fn panicking_subscriber_does_not_skip_later_ones() {
    let calls = Arc::new(AtomicUsize::new(0));
    let bridge = InputHookBridge::default();
    bridge.subscribe(Arc::new(|_: KeyTransition, _: u32, _: ModifierState| -> bool {
        panic!("handler bug")
    }));
    bridge.subscribe(handler(false, &calls));

    assert_eq!(bridge.on_key_event(key_down(VK_SPACE)), Verdict::Swallow);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn all_must_allow_stops_at_first_swallow() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));
    let bridge = InputHookBridge::new(FanOutPolicy::AllMustAllow);
    bridge.subscribe(handler(true, &first));
    bridge.subscribe(handler(false, &second));
    bridge.subscribe(handler(true, &third));

    assert_eq!(bridge.on_key_event(key_down(VK_SPACE)), Verdict::Swallow);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 0);
    assert_eq!(bridge.stats().swallowed, 1);
}

#[test]
fn first_subscriber_policy_ignores_later_handlers() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let bridge = InputHookBridge::new(FanOutPolicy::FirstSubscriber);
    bridge.subscribe(handler(true, &first));
    bridge.subscribe(handler(false, &second));

    assert_eq!(bridge.on_key_event(key_down(VK_SPACE)), Verdict::Allow);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[test]
fn unsubscribed_handler_is_no_longer_consulted() {
    let calls = Arc::new(AtomicUsize::new(0));
    let bridge = InputHookBridge::default();
    let id = bridge.subscribe(handler(false, &calls));

    assert!(bridge.unsubscribe(id));
    assert_eq!(bridge.on_key_event(key_down(VK_SPACE)), Verdict::Allow);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn handler_sees_transition_key_and_modifiers() {
    let bridge = InputHookBridge::default();
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let sink = Arc::clone(&seen);
    bridge.subscribe(Arc::new(move |transition: KeyTransition, key: u32, mods: ModifierState| {
        *sink.lock() = Some((transition, key, mods));
        true
    }));

    let event = KeyEvent {
        transition: KeyTransition::SysKeyDown,
        key_code: VK_SPACE,
        modifiers: ModifierState {
            alt: true,
            ..ModifierState::default()
        },
    };
    bridge.on_key_event(event);

    let (transition, key, mods) = seen.lock().expect("handler should run");
    assert_eq!(transition, KeyTransition::SysKeyDown);
    assert_eq!(key, VK_SPACE);
    assert!(mods.alt);
    assert!(!mods.ctrl);
}

#[test]
fn arm_routes_hook_events_through_bridge() {
    let calls = Arc::new(AtomicUsize::new(0));
    let bridge = Arc::new(InputHookBridge::default());
    bridge.subscribe(handler(false, &calls));
    let mut hook = MockKeyboardHook::default();

    assert_eq!(hook.inject(key_down(VK_SPACE)), Verdict::Allow);
    bridge.arm(&mut hook).unwrap();
    assert_eq!(bridge.state(), HookState::Armed);
    assert_eq!(hook.inject(key_down(VK_SPACE)), Verdict::Swallow);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    bridge.disarm(&mut hook).unwrap();
    assert_eq!(bridge.state(), HookState::Unarmed);
    assert!(!hook.is_installed());
    assert_eq!(hook.inject(key_down(VK_SPACE)), Verdict::Allow);
}

#[test]
fn arming_twice_is_rejected() {
    let bridge = Arc::new(InputHookBridge::default());
    let mut hook = MockKeyboardHook::default();

    bridge.arm(&mut hook).unwrap();
    assert_eq!(bridge.arm(&mut hook), Err(HookError::AlreadyInstalled));
    assert_eq!(hook.installs(), 1);
}
