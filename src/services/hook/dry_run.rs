use crate::debug_if_enabled;
use crate::error::HookInstallError;
use crate::events::{Decision, RawKeyEvent};
use crate::services::HookEngine;
use std::sync::Arc;
use tracing::{debug, info};

use super::r#trait::{HookBackend, HookHandle, HookSlot};

/// Перехватчик без устройства: прогоняет заранее заданные события через движок и ждёт
pub struct DryRunHook {
    script: Vec<RawKeyEvent>,
}

impl DryRunHook {
    pub fn new() -> Self {
        info!("Инициализация DryRunHook");
        Self { script: Vec::new() }
    }

    #[cfg(test)]
    pub fn with_script(script: Vec<RawKeyEvent>) -> Self {
        Self { script }
    }

    async fn run_impl(script: Vec<RawKeyEvent>, engine: Arc<HookEngine>) {
        info!("Dry-run режим - перехват работает в режиме эмуляции");
        info!("Активных подмен: {}", engine.table().len());

        for event in script {
            if engine.process(event) == Decision::PassThrough {
                debug_if_enabled!("[DRY RUN] Проброс {}", event);
                engine.synthesize(event.code, event.state);
            }
        }

        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            debug!("Перехват работает в dry-run режиме");
        }
    }
}

impl Default for DryRunHook {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBackend for DryRunHook {
    fn install(self: Box<Self>, engine: Arc<HookEngine>) -> Result<HookHandle, HookInstallError> {
        let slot = HookSlot::acquire()?;
        let task = tokio::spawn(Self::run_impl(self.script, engine));
        Ok(HookHandle::new("dry-run", task, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{KeyCode, KeyState};
    use crate::services::hook_engine::testing::engine_with;
    use std::time::Duration;

    // Единственный тест, устанавливающий перехват: слот глобален для процесса
    #[tokio::test]
    async fn test_hook_lifecycle_is_exclusive_and_idempotent() {
        let (engine, _, injector) = engine_with(&[(30, 48)]);
        let script = vec![
            RawKeyEvent::genuine(KeyCode(30), KeyState::Pressed),
            RawKeyEvent::genuine(KeyCode(46), KeyState::Pressed),
            RawKeyEvent::genuine(KeyCode(46), KeyState::Released),
            RawKeyEvent::genuine(KeyCode(30), KeyState::Released),
        ];

        let mut handle = Box::new(DryRunHook::with_script(script))
            .install(Arc::clone(&engine))
            .expect("first install succeeds");
        assert_eq!(handle.backend(), "dry-run");

        let second = Box::new(DryRunHook::new()).install(Arc::clone(&engine));
        assert!(matches!(second, Err(HookInstallError::AlreadyInstalled)));

        // Ждём, пока скрипт будет прогнан
        for _ in 0..100 {
            if injector.events().len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            injector.events(),
            vec![
                (KeyCode(48), KeyState::Pressed),
                (KeyCode(46), KeyState::Pressed),
                (KeyCode(46), KeyState::Released),
                (KeyCode(48), KeyState::Released),
            ]
        );
        assert!(handle.is_installed());

        handle.uninstall().await;
        assert!(!handle.is_installed());
        handle.uninstall().await;

        let mut again = Box::new(DryRunHook::new())
            .install(engine)
            .expect("install after uninstall succeeds");
        again.uninstall().await;
    }
}
