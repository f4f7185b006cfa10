use crate::config::Config;
use crate::error::HookInstallError;
use crate::services::HookEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Only one global hook may exist per process.
static HOOK_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Trait for hook backends that can run in different modes
pub trait HookBackend: Send {
    /// Install the process-wide hook and start routing events through `engine`
    fn install(self: Box<Self>, engine: Arc<HookEngine>) -> Result<HookHandle, HookInstallError>;
}

/// Factory function to create an appropriate hook backend based on the dry_run flag
pub fn create_hook_backend(config: Arc<Config>, dry_run: bool) -> Box<dyn HookBackend> {
    if dry_run {
        Box::new(super::dry_run::DryRunHook::new())
    } else {
        Box::new(super::evdev_hook::EvdevHook::new(config))
    }
}

/// Place of the single active hook; freed on drop
pub(super) struct HookSlot(());

impl HookSlot {
    pub(super) fn acquire() -> Result<Self, HookInstallError> {
        HOOK_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| HookSlot(()))
            .map_err(|_| HookInstallError::AlreadyInstalled)
    }
}

impl Drop for HookSlot {
    fn drop(&mut self) {
        HOOK_ACTIVE.store(false, Ordering::Release);
    }
}

/// Handle of an installed hook.
///
/// Uninstalling is idempotent; dropping the handle uninstalls as well.
pub struct HookHandle {
    backend: &'static str,
    task: Option<JoinHandle<()>>,
    slot: Option<HookSlot>,
}

impl HookHandle {
    pub(super) fn new(backend: &'static str, task: JoinHandle<()>, slot: HookSlot) -> Self {
        Self {
            backend,
            task: Some(task),
            slot: Some(slot),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn is_installed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Дождаться самопроизвольного завершения задачи перехвата (например, устройство отключено)
    pub async fn stopped(&mut self) {
        match self.task.as_mut() {
            Some(task) => {
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        warn!("Задача перехвата '{}' завершилась аварийно: {}", self.backend, e);
                    }
                }
                self.task = None;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Снять перехват и дождаться освобождения устройства
    pub async fn uninstall(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Задача перехвата '{}' завершилась с ошибкой: {}", self.backend, e);
                }
            }
            info!("Перехват '{}' снят", self.backend);
        }
        self.slot = None;
    }
}

impl Drop for HookHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            // Освобождение устройства произойдёт при уничтожении задачи рантаймом
            task.abort();
            info!("Перехват '{}' снят при уничтожении дескриптора", self.backend);
        }
    }
}
