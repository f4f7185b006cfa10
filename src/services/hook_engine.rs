//! HookEngine: the per-event decision function.
//!
//! Every key transition observed by the installed hook goes through
//! [`HookEngine::process`] exactly once, on the hook's single callback task.
//! The engine never remaps an event it synthesized itself; that check runs
//! before any table lookup and is the only thing preventing remap loops.
//!
//! The route of a key is fixed at key-down: its repeats and its release follow
//! the same route even if the table or the capture changes while it is held.

use crate::{debug_if_enabled, trace_if_enabled};
use crate::error::Result;
use crate::events::{Decision, KeyCode, KeyState, RawKeyEvent};
use crate::services::{CaptureSession, MappingTable};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Injects key events into the OS input stream, tagged as the engine's own.
pub trait KeyInjector: Send + Sync {
    fn inject(&self, code: KeyCode, state: KeyState) -> Result<()>;
}

/// Счётчики обработанных событий
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookStats {
    pub seen: u64,
    pub synthesized_seen: u64,
    pub remapped: u64,
    pub passed_through: u64,
    pub suppressed: u64,
}

pub struct HookEngine {
    table: Arc<MappingTable>,
    injector: Arc<dyn KeyInjector>,
    capture: RwLock<Option<Arc<CaptureSession>>>,
    /// Решение, принятое при нажатии каждой удерживаемой клавиши
    held: Mutex<HashMap<KeyCode, Decision>>,
    seen: AtomicU64,
    synthesized_seen: AtomicU64,
    remapped: AtomicU64,
    passed_through: AtomicU64,
    suppressed: AtomicU64,
}

impl HookEngine {
    pub fn new(table: Arc<MappingTable>, injector: Arc<dyn KeyInjector>) -> Self {
        info!("Инициализация HookEngine");
        Self {
            table,
            injector,
            capture: RwLock::new(None),
            held: Mutex::new(HashMap::new()),
            seen: AtomicU64::new(0),
            synthesized_seen: AtomicU64::new(0),
            remapped: AtomicU64::new(0),
            passed_through: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    pub fn table(&self) -> &Arc<MappingTable> {
        &self.table
    }

    pub fn injector(&self) -> &Arc<dyn KeyInjector> {
        &self.injector
    }

    /// Решение по одному событию. Для `Remap` целевая клавиша уже инъецирована.
    pub fn process(&self, event: RawKeyEvent) -> Decision {
        self.seen.fetch_add(1, Ordering::Relaxed);

        if event.is_synthesized {
            self.synthesized_seen.fetch_add(1, Ordering::Relaxed);
            self.passed_through.fetch_add(1, Ordering::Relaxed);
            return Decision::PassThrough;
        }

        let decision = match event.state {
            KeyState::Pressed => {
                let decision = self.decide_press(&event);
                self.held.lock().insert(event.code, decision);
                decision
            }
            KeyState::Repeat => {
                let recorded = self.held.lock().get(&event.code).copied();
                recorded.unwrap_or_else(|| self.route_by_table(event.code))
            }
            KeyState::Released => {
                let recorded = self.held.lock().remove(&event.code);
                recorded.unwrap_or_else(|| self.route_by_table(event.code))
            }
        };

        match decision {
            Decision::Remap(target) => {
                debug_if_enabled!("Подмена {} -> {} ({:?})", event.code, target, event.state);
                self.synthesize(target, event.state);
                self.remapped.fetch_add(1, Ordering::Relaxed);
            }
            Decision::PassThrough => {
                trace_if_enabled!("Пропуск {} ({:?})", event.code, event.state);
                self.passed_through.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Suppress => {
                debug_if_enabled!("Поглощено записью: {} ({:?})", event.code, event.state);
                self.suppressed.fetch_add(1, Ordering::Relaxed);
            }
        }

        decision
    }

    /// Клавиша, записанная сессией, никуда не отправляется
    fn decide_press(&self, event: &RawKeyEvent) -> Decision {
        if let Some(session) = self.capture.read().as_ref() {
            if session.observe(event) {
                return Decision::Suppress;
            }
        }
        self.route_by_table(event.code)
    }

    /// Для клавиш, нажатых до установки перехвата
    fn route_by_table(&self, code: KeyCode) -> Decision {
        match self.table.lookup(code) {
            Some(target) => Decision::Remap(target),
            None => Decision::PassThrough,
        }
    }

    /// Инъецировать событие; ошибка только логируется, колбэк перехвата не должен падать
    pub fn synthesize(&self, code: KeyCode, state: KeyState) {
        if let Err(e) = self.injector.inject(code, state) {
            error!("Не удалось инъецировать {} ({:?}): {}", code, state, e);
        }
    }

    /// Направлять сырые события в сессию записи, пока жив guard
    pub fn attach_capture(self: &Arc<Self>, session: Arc<CaptureSession>) -> CaptureAttachment {
        *self.capture.write() = Some(session);
        debug_if_enabled!("Сессия записи подключена к перехватчику");
        CaptureAttachment {
            engine: Arc::clone(self),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.read().is_some()
    }

    pub fn stats(&self) -> HookStats {
        HookStats {
            seen: self.seen.load(Ordering::Relaxed),
            synthesized_seen: self.synthesized_seen.load(Ordering::Relaxed),
            remapped: self.remapped.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
        }
    }
}

/// Отключает сессию записи от перехватчика при уничтожении
pub struct CaptureAttachment {
    engine: Arc<HookEngine>,
}

impl Drop for CaptureAttachment {
    fn drop(&mut self) {
        *self.engine.capture.write() = None;
        debug_if_enabled!("Сессия записи отключена от перехватчика");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Инжектор, который только запоминает события
    #[derive(Default)]
    pub struct RecordingInjector {
        events: Mutex<Vec<(KeyCode, KeyState)>>,
    }

    impl RecordingInjector {
        pub fn events(&self) -> Vec<(KeyCode, KeyState)> {
            self.events.lock().clone()
        }
    }

    impl KeyInjector for RecordingInjector {
        fn inject(&self, code: KeyCode, state: KeyState) -> Result<()> {
            self.events.lock().push((code, state));
            Ok(())
        }
    }

    pub fn engine_with(
        mappings: &[(u16, u16)],
    ) -> (Arc<HookEngine>, Arc<MappingTable>, Arc<RecordingInjector>) {
        let table = Arc::new(MappingTable::new());
        for &(source, target) in mappings {
            table.set_mapping(KeyCode(source), KeyCode(target));
        }
        let injector = Arc::new(RecordingInjector::default());
        let engine = Arc::new(HookEngine::new(Arc::clone(&table), injector.clone()));
        (engine, table, injector)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::engine_with;
    use super::*;
    use crate::services::CapturePhase;

    const A: u16 = 30;
    const B: u16 = 48;
    const C: u16 = 46;

    #[test]
    fn test_mapped_key_is_suppressed_and_target_synthesized_in_order() {
        let (engine, _, injector) = engine_with(&[(A, B)]);

        let down = engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed));
        let up = engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Released));

        assert_eq!(down, Decision::Remap(KeyCode(B)));
        assert_eq!(up, Decision::Remap(KeyCode(B)));
        assert_eq!(
            injector.events(),
            vec![(KeyCode(B), KeyState::Pressed), (KeyCode(B), KeyState::Released)]
        );
        assert_eq!(engine.stats().passed_through, 0);
    }

    #[test]
    fn test_repeat_is_synthesized_as_repeat() {
        let (engine, _, injector) = engine_with(&[(A, B)]);
        engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Repeat));

        assert_eq!(injector.events(), vec![(KeyCode(B), KeyState::Repeat)]);
    }

    #[test]
    fn test_unmapped_key_passes_through_without_synthesis() {
        let (engine, _, injector) = engine_with(&[(A, B)]);

        let decision = engine.process(RawKeyEvent::genuine(KeyCode(C), KeyState::Pressed));

        assert_eq!(decision, Decision::PassThrough);
        assert!(injector.events().is_empty());
        assert_eq!(engine.stats().passed_through, 1);
    }

    #[test]
    fn test_synthesized_events_always_pass_through() {
        // A -> B и B -> A: без проверки флага получился бы бесконечный цикл
        let (engine, _, injector) = engine_with(&[(A, B), (B, A), (C, C)]);

        for code in [A, B, C] {
            for state in [KeyState::Pressed, KeyState::Repeat, KeyState::Released] {
                let decision = engine.process(RawKeyEvent::synthesized(KeyCode(code), state));
                assert_eq!(decision, Decision::PassThrough);
            }
        }

        assert!(injector.events().is_empty());
        assert_eq!(engine.stats().synthesized_seen, 9);
        assert_eq!(engine.stats().remapped, 0);
    }

    #[test]
    fn test_synthesized_output_fed_back_does_not_chain() {
        let (engine, _, injector) = engine_with(&[(A, B), (B, C)]);

        engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed));
        // Бэкенд увидит собственное событие B с флагом синтеза
        let (code, state) = injector.events()[0];
        let echoed = engine.process(RawKeyEvent::synthesized(code, state));

        assert_eq!(echoed, Decision::PassThrough);
        assert_eq!(injector.events(), vec![(KeyCode(B), KeyState::Pressed)]);
    }

    #[test]
    fn test_self_mapping_synthesizes_same_key_once() {
        let (engine, _, injector) = engine_with(&[(A, A)]);

        assert_eq!(
            engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed)),
            Decision::Remap(KeyCode(A))
        );
        assert_eq!(
            engine.process(RawKeyEvent::synthesized(KeyCode(A), KeyState::Pressed)),
            Decision::PassThrough
        );
        assert_eq!(injector.events().len(), 1);
    }

    #[test]
    fn test_capture_consumes_recorded_keys_while_table_suspended() {
        let (engine, table, injector) = engine_with(&[(A, B)]);
        let session = Arc::new(CaptureSession::new());

        let guard = table.suspend();
        session.begin();
        let attachment = engine.attach_capture(Arc::clone(&session));

        // Записанные клавиши поглощаются вместе с отпусканием
        assert_eq!(
            engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed)),
            Decision::Suppress
        );
        assert_eq!(
            engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Released)),
            Decision::Suppress
        );
        assert_eq!(
            engine.process(RawKeyEvent::genuine(KeyCode(C), KeyState::Pressed)),
            Decision::Suppress
        );

        drop(attachment);
        drop(guard);

        assert_eq!(
            engine.process(RawKeyEvent::genuine(KeyCode(C), KeyState::Released)),
            Decision::Suppress
        );
        assert!(injector.events().is_empty());
        assert_eq!(engine.stats().suppressed, 4);
        assert_eq!(session.phase(), CapturePhase::Completed);
        assert_eq!(session.source_key(), Some(KeyCode(A)));
        assert_eq!(session.target_key(), Some(KeyCode(C)));
        assert!(!engine.is_capturing());

        // После снятия приостановки подмена снова работает
        assert_eq!(
            engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed)),
            Decision::Remap(KeyCode(B))
        );
    }

    #[test]
    fn test_capture_never_sees_synthesized_events() {
        let (engine, _, _) = engine_with(&[]);
        let session = Arc::new(CaptureSession::new());
        session.begin();
        let _attachment = engine.attach_capture(Arc::clone(&session));

        engine.process(RawKeyEvent::synthesized(KeyCode(A), KeyState::Pressed));

        assert_eq!(session.phase(), CapturePhase::AwaitingSource);
    }

    #[test]
    fn test_release_follows_press_after_mapping_removed() {
        let (engine, table, injector) = engine_with(&[(A, B)]);

        let down = engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed));
        table.remove_mapping(KeyCode(A));
        let repeat = engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Repeat));
        let up = engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Released));

        assert_eq!(down, Decision::Remap(KeyCode(B)));
        assert_eq!(repeat, Decision::Remap(KeyCode(B)));
        assert_eq!(up, Decision::Remap(KeyCode(B)));
        assert_eq!(
            injector.events(),
            vec![
                (KeyCode(B), KeyState::Pressed),
                (KeyCode(B), KeyState::Repeat),
                (KeyCode(B), KeyState::Released),
            ]
        );

        // Следующее нажатие уже видит новую таблицу
        assert_eq!(
            engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed)),
            Decision::PassThrough
        );
    }

    #[test]
    fn test_release_follows_press_after_mapping_added() {
        let (engine, table, injector) = engine_with(&[]);

        let down = engine.process(RawKeyEvent::genuine(KeyCode(C), KeyState::Pressed));
        table.set_mapping(KeyCode(C), KeyCode(B));
        let up = engine.process(RawKeyEvent::genuine(KeyCode(C), KeyState::Released));

        assert_eq!(down, Decision::PassThrough);
        assert_eq!(up, Decision::PassThrough);
        assert!(injector.events().is_empty());
    }

    #[test]
    fn test_key_not_recorded_by_finished_capture_is_routed_normally() {
        let (engine, _, injector) = engine_with(&[(C, B)]);
        let session = Arc::new(CaptureSession::new());
        session.begin();
        let _attachment = engine.attach_capture(Arc::clone(&session));

        engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed));
        engine.process(RawKeyEvent::genuine(KeyCode(A), KeyState::Pressed));
        assert!(session.success());

        // Сессия завершена: третья клавиша идёт обычным путём
        assert_eq!(
            engine.process(RawKeyEvent::genuine(KeyCode(C), KeyState::Pressed)),
            Decision::Remap(KeyCode(B))
        );
        assert_eq!(injector.events(), vec![(KeyCode(B), KeyState::Pressed)]);
    }
}
