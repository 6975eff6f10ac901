use std::sync::Arc;

use crate::model::{KeyEvent, Verdict};

pub type HookCallback = Arc<dyn Fn(KeyEvent) -> Verdict + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("keyboard hook already installed")]
    AlreadyInstalled,
    #[error("keyboard hook install failed: {0}")]
    InstallFailed(String),
    #[error("keyboard hook uninstall failed: {0}")]
    UninstallFailed(String),
}

pub trait KeyboardHook: Send {
    fn install(&mut self, callback: HookCallback) -> Result<(), HookError>;
    fn uninstall(&mut self) -> Result<(), HookError>;
    fn is_installed(&self) -> bool;
}

#[derive(Default)]
pub struct MockKeyboardHook {
    callback: Option<HookCallback>,
    installs: usize,
}

impl MockKeyboardHook {
    pub fn inject(&self, event: KeyEvent) -> Verdict {
        match &self.callback {
            Some(callback) => callback(event),
            None => Verdict::Allow,
        }
    }

    pub fn installs(&self) -> usize {
        self.installs
    }
}

impl KeyboardHook for MockKeyboardHook {
    fn install(&mut self, callback: HookCallback) -> Result<(), HookError> {
        if self.callback.is_some() {
            return Err(HookError::AlreadyInstalled);
        }
        self.callback = Some(callback);
        self.installs += 1;
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        self.callback = None;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.callback.is_some()
    }
}

#[cfg(not(target_os = "windows"))]
#[derive(Default)]
pub struct NoopKeyboardHook {
    installed: bool,
}

#[cfg(not(target_os = "windows"))]
impl KeyboardHook for NoopKeyboardHook {
    fn install(&mut self, _callback: HookCallback) -> Result<(), HookError> {
        if self.installed {
            return Err(HookError::AlreadyInstalled);
        }
        self.installed = true;
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        self.installed = false;
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.installed
    }
}

#[cfg(target_os = "windows")]
pub use windows::WindowsKeyboardHook;

#[cfg(target_os = "windows")]
mod windows {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::thread::JoinHandle;

    use parking_lot::RwLock;
    use tracing::{error, info};
    use windows_sys::Win32::Foundation::{GetLastError, LPARAM, LRESULT, WPARAM};
    use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows_sys::Win32::System::Threading::GetCurrentThreadId;
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
        GetAsyncKeyState, VIRTUAL_KEY, VK_CONTROL, VK_LWIN, VK_MENU, VK_RWIN, VK_SHIFT,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
        TranslateMessage, UnhookWindowsHookEx, HC_ACTION, KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL,
        WM_QUIT,
    };

    use super::{HookCallback, HookError, KeyboardHook};
    use crate::model::{KeyEvent, KeyTransition, ModifierState, Verdict};

    // Low-level hook procedures carry no user data, so the callback lives here.
    static ACTIVE_CALLBACK: RwLock<Option<HookCallback>> = parking_lot::const_rwlock(None);

    #[derive(Default)]
    pub struct WindowsKeyboardHook {
        thread: Option<JoinHandle<()>>,
        thread_id: u32,
    }

    impl KeyboardHook for WindowsKeyboardHook {
        fn install(&mut self, callback: HookCallback) -> Result<(), HookError> {
            if self.thread.is_some() || ACTIVE_CALLBACK.read().is_some() {
                return Err(HookError::AlreadyInstalled);
            }
            *ACTIVE_CALLBACK.write() = Some(callback);

            let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, String>>();
            let handle = std::thread::Builder::new()
                .name("keyboard-hook".to_string())
                .spawn(move || hook_thread(ready_tx))
                .map_err(|e| {
                    *ACTIVE_CALLBACK.write() = None;
                    HookError::InstallFailed(format!("failed to spawn hook thread: {e}"))
                })?;

            match ready_rx.recv() {
                Ok(Ok(thread_id)) => {
                    self.thread_id = thread_id;
                    self.thread = Some(handle);
                    info!(thread_id, "low-level keyboard hook installed");
                    Ok(())
                }
                Ok(Err(message)) => {
                    let _ = handle.join();
                    *ACTIVE_CALLBACK.write() = None;
                    Err(HookError::InstallFailed(message))
                }
                Err(_) => {
                    let _ = handle.join();
                    *ACTIVE_CALLBACK.write() = None;
                    Err(HookError::InstallFailed(
                        "hook thread exited before reporting".to_string(),
                    ))
                }
            }
        }

        fn uninstall(&mut self) -> Result<(), HookError> {
            let Some(handle) = self.thread.take() else {
                return Ok(());
            };
            let posted = unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
            *ACTIVE_CALLBACK.write() = None;
            if posted == 0 {
                let code = unsafe { GetLastError() };
                return Err(HookError::UninstallFailed(format!(
                    "PostThreadMessageW failed with error {code}"
                )));
            }
            handle
                .join()
                .map_err(|_| HookError::UninstallFailed("hook thread panicked".to_string()))
        }

        fn is_installed(&self) -> bool {
            self.thread.is_some()
        }
    }

    impl Drop for WindowsKeyboardHook {
        fn drop(&mut self) {
            if let Err(error) = self.uninstall() {
                error!("{error}");
            }
        }
    }

    fn hook_thread(ready: mpsc::Sender<Result<u32, String>>) {
        let hook = unsafe {
            let module = GetModuleHandleW(std::ptr::null());
            SetWindowsHookExW(WH_KEYBOARD_LL, Some(low_level_keyboard_proc), module, 0)
        };
        if hook.is_null() {
            let code = unsafe { GetLastError() };
            let _ = ready.send(Err(format!("SetWindowsHookExW failed with error {code}")));
            return;
        }
        let _ = ready.send(Ok(unsafe { GetCurrentThreadId() }));

        let mut msg: MSG = unsafe { std::mem::zeroed() };
        loop {
            let status = unsafe { GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) };
            if status <= 0 {
                break;
            }
            unsafe {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        unsafe {
            UnhookWindowsHookEx(hook);
        }
    }

    unsafe extern "system" fn low_level_keyboard_proc(
        code: i32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        if code == HC_ACTION as i32 {
            if let Some(transition) = KeyTransition::from_message(wparam as u32) {
                let info = &*(lparam as *const KBDLLHOOKSTRUCT);
                let event = KeyEvent {
                    transition,
                    key_code: info.vkCode,
                    modifiers: current_modifiers(),
                };
                let verdict = catch_unwind(AssertUnwindSafe(|| {
                    let callback = ACTIVE_CALLBACK.read().clone();
                    callback.map_or(Verdict::Allow, |callback| callback(event))
                }))
                .unwrap_or(Verdict::Allow);
                if verdict == Verdict::Swallow {
                    return 1;
                }
            }
        }
        CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
    }

    fn current_modifiers() -> ModifierState {
        ModifierState {
            ctrl: pressed(VK_CONTROL),
            shift: pressed(VK_SHIFT),
            alt: pressed(VK_MENU),
            win: pressed(VK_LWIN) || pressed(VK_RWIN),
        }
    }

    fn pressed(key: VIRTUAL_KEY) -> bool {
        let state = unsafe { GetAsyncKeyState(key as i32) };
        (state as u16 & 0x8000) != 0
    }
}

pub fn default_keyboard_hook() -> Box<dyn KeyboardHook> {
    #[cfg(target_os = "windows")]
    {
        Box::new(WindowsKeyboardHook::default())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(NoopKeyboardHook::default())
    }
}
