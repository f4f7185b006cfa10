use crate::debug_if_enabled;
use crate::events::{KeyCode, KeyState, RawKeyEvent};
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::watch;
use tracing::info;

/// Фаза записи новой подмены
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    AwaitingSource,
    AwaitingTarget,
    Completed,
    Cancelled,
}

impl CapturePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CapturePhase::Completed | CapturePhase::Cancelled)
    }
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CapturePhase::Idle => "ожидание запуска",
            CapturePhase::AwaitingSource => "нажмите исходную клавишу",
            CapturePhase::AwaitingTarget => "нажмите целевую клавишу",
            CapturePhase::Completed => "завершено",
            CapturePhase::Cancelled => "отменено",
        };
        f.write_str(text)
    }
}

#[derive(Debug)]
struct CaptureState {
    phase: CapturePhase,
    source_key: Option<KeyCode>,
    target_key: Option<KeyCode>,
}

impl CaptureState {
    fn idle() -> Self {
        Self {
            phase: CapturePhase::Idle,
            source_key: None,
            target_key: None,
        }
    }
}

/// Одноразовый автомат записи пары "исходная клавиша -> целевая клавиша".
///
/// Получает от перехватчика сырые события, пока подмены приостановлены.
/// Политику для `source == target` не применяет - это решает потребитель.
pub struct CaptureSession {
    state: Mutex<CaptureState>,
    phase_tx: watch::Sender<CapturePhase>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        let (phase_tx, _) = watch::channel(CapturePhase::Idle);
        Self {
            state: Mutex::new(CaptureState::idle()),
            phase_tx,
        }
    }

    /// Сбросить в `Idle` и забыть частично записанные клавиши
    pub fn reset(&self) {
        *self.state.lock() = CaptureState::idle();
        self.publish(CapturePhase::Idle);
        debug_if_enabled!("Сессия записи сброшена");
    }

    /// Открыть запрос исходной клавиши
    pub fn begin(&self) {
        let mut state = self.state.lock();
        if state.phase == CapturePhase::Idle {
            state.phase = CapturePhase::AwaitingSource;
            drop(state);
            self.publish(CapturePhase::AwaitingSource);
            info!("Запись подмены: {}", CapturePhase::AwaitingSource);
        }
    }

    /// Прервать запись; из `Idle` и завершённых фаз ничего не происходит
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        match state.phase {
            CapturePhase::AwaitingSource | CapturePhase::AwaitingTarget => {
                state.phase = CapturePhase::Cancelled;
                drop(state);
                self.publish(CapturePhase::Cancelled);
                info!("Запись подмены отменена");
            }
            _ => {}
        }
    }

    /// Подать событие от перехватчика; `true`, если клавиша записана
    pub fn observe(&self, event: &RawKeyEvent) -> bool {
        if event.is_synthesized || event.state != KeyState::Pressed {
            return false;
        }

        let mut state = self.state.lock();
        let next = match state.phase {
            CapturePhase::Idle | CapturePhase::AwaitingSource => {
                state.source_key = Some(event.code);
                CapturePhase::AwaitingTarget
            }
            CapturePhase::AwaitingTarget => {
                state.target_key = Some(event.code);
                CapturePhase::Completed
            }
            CapturePhase::Completed | CapturePhase::Cancelled => return false,
        };
        state.phase = next;
        drop(state);

        info!("Запись подмены: записана {}, далее: {}", event.code, next);
        self.publish(next);
        true
    }

    pub fn phase(&self) -> CapturePhase {
        self.state.lock().phase
    }

    /// Обе клавиши записаны
    pub fn success(&self) -> bool {
        self.state.lock().phase == CapturePhase::Completed
    }

    pub fn source_key(&self) -> Option<KeyCode> {
        self.state.lock().source_key
    }

    pub fn target_key(&self) -> Option<KeyCode> {
        self.state.lock().target_key
    }

    /// Дождаться `Completed` или `Cancelled`
    pub async fn wait_finished(&self) -> CapturePhase {
        let mut rx = self.phase_tx.subscribe();
        // `watch::Ref` держит заимствование `rx`, поэтому копируем фазу до выхода
        let phase = match rx.wait_for(|phase| phase.is_terminal()).await {
            Ok(phase) => *phase,
            // Отправитель живёт столько же, сколько сессия
            Err(_) => self.phase(),
        };
        phase
    }

    fn publish(&self, phase: CapturePhase) {
        self.phase_tx.send_replace(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn down(code: u16) -> RawKeyEvent {
        RawKeyEvent::genuine(KeyCode(code), KeyState::Pressed)
    }

    #[test]
    fn test_capture_scenario_records_both_keys() {
        let session = CaptureSession::new();
        session.reset();

        session.observe(&down(65));
        assert_eq!(session.phase(), CapturePhase::AwaitingTarget);
        assert!(!session.success());

        session.observe(&down(66));
        assert_eq!(session.phase(), CapturePhase::Completed);
        assert!(session.success());
        assert_eq!(session.source_key(), Some(KeyCode(65)));
        assert_eq!(session.target_key(), Some(KeyCode(66)));
    }

    #[test]
    fn test_observe_reports_only_recorded_keys() {
        let session = CaptureSession::new();
        session.begin();

        assert!(session.observe(&down(30)));
        assert!(session.observe(&down(46)));
        // Третья клавиша уже не нужна сессии
        assert!(!session.observe(&down(48)));
        assert_eq!(session.target_key(), Some(KeyCode(46)));
    }

    #[test]
    fn test_begin_moves_idle_to_awaiting_source() {
        let session = CaptureSession::new();
        session.begin();
        assert_eq!(session.phase(), CapturePhase::AwaitingSource);

        session.observe(&down(30));
        assert_eq!(session.phase(), CapturePhase::AwaitingTarget);
    }

    #[test]
    fn test_ignores_key_up_repeat_and_synthesized_events() {
        let session = CaptureSession::new();
        session.begin();

        assert!(!session.observe(&RawKeyEvent::genuine(KeyCode(30), KeyState::Released)));
        assert!(!session.observe(&RawKeyEvent::genuine(KeyCode(30), KeyState::Repeat)));
        assert!(!session.observe(&RawKeyEvent::synthesized(KeyCode(30), KeyState::Pressed)));

        assert_eq!(session.phase(), CapturePhase::AwaitingSource);
        assert_eq!(session.source_key(), None);
    }

    #[test]
    fn test_same_key_twice_is_reported_as_captured() {
        let session = CaptureSession::new();
        session.begin();
        session.observe(&down(30));
        session.observe(&down(30));

        assert!(session.success());
        assert_eq!(session.source_key(), session.target_key());
    }

    #[test]
    fn test_cancel_from_awaiting_target_keeps_partial_source() {
        let session = CaptureSession::new();
        session.begin();
        session.observe(&down(30));
        session.cancel();

        assert_eq!(session.phase(), CapturePhase::Cancelled);
        assert!(!session.success());
        assert_eq!(session.source_key(), Some(KeyCode(30)));

        // После отмены события игнорируются
        session.observe(&down(48));
        assert_eq!(session.target_key(), None);
    }

    #[test]
    fn test_cancel_in_idle_or_completed_is_noop() {
        let session = CaptureSession::new();
        session.cancel();
        assert_eq!(session.phase(), CapturePhase::Idle);

        session.observe(&down(30));
        session.observe(&down(48));
        session.cancel();
        assert_eq!(session.phase(), CapturePhase::Completed);
    }

    #[test]
    fn test_reset_clears_previous_capture() {
        let session = CaptureSession::new();
        session.observe(&down(30));
        session.observe(&down(48));
        session.reset();

        assert_eq!(session.phase(), CapturePhase::Idle);
        assert_eq!(session.source_key(), None);
        assert_eq!(session.target_key(), None);
        assert!(!session.success());
    }

    #[tokio::test]
    async fn test_wait_finished_resolves_on_completion() {
        let session = Arc::new(CaptureSession::new());
        session.begin();

        let feeder = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            feeder.observe(&down(58));
            feeder.observe(&down(1));
        });

        let phase = tokio::time::timeout(Duration::from_secs(2), session.wait_finished())
            .await
            .expect("capture should finish");
        assert_eq!(phase, CapturePhase::Completed);
    }

    #[tokio::test]
    async fn test_wait_finished_resolves_on_cancel() {
        let session = Arc::new(CaptureSession::new());
        session.begin();

        let canceller = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let phase = tokio::time::timeout(Duration::from_secs(2), session.wait_finished())
            .await
            .expect("capture should finish");
        assert_eq!(phase, CapturePhase::Cancelled);
    }
}
