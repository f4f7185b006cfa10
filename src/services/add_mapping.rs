use crate::config::CaptureConfig;
use crate::events::{KeyCode, Mapping};
use crate::services::{CapturePhase, CaptureSession, HookEngine};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Решает, можно ли перезаписать существующую подмену новой целью
#[async_trait::async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn confirm_replace(&self, source: KeyCode, current: KeyCode, proposed: KeyCode) -> bool;
}

/// Итог добавления подмены
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(Mapping),
    Replaced { mapping: Mapping, previous: KeyCode },
    AlreadyExists(Mapping),
    Declined(Mapping),
    SelfMapping(KeyCode),
    Cancelled,
}

impl fmt::Display for AddOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddOutcome::Added(mapping) => write!(f, "добавлена подмена {}", mapping),
            AddOutcome::Replaced { mapping, previous } => {
                write!(f, "подмена {} заменена (было -> {})", mapping, previous.label())
            }
            AddOutcome::AlreadyExists(mapping) => {
                write!(f, "подмена {} уже существует, ничего не изменено", mapping)
            }
            AddOutcome::Declined(mapping) => write!(f, "перезапись отклонена: {}", mapping),
            AddOutcome::SelfMapping(code) => {
                write!(f, "подмена клавиши {} на саму себя отклонена", code.label())
            }
            AddOutcome::Cancelled => write!(f, "запись подмены отменена"),
        }
    }
}

/// Запись новой подмены с клавиатуры и применение политики конфликтов.
///
/// На время записи таблица приостановлена целиком, поэтому сессия видит сырые клавиши.
pub struct AddMappingWorkflow {
    engine: Arc<HookEngine>,
    session: Arc<CaptureSession>,
    resolver: Arc<dyn ConflictResolver>,
    settings: CaptureConfig,
}

impl AddMappingWorkflow {
    pub fn new(
        engine: Arc<HookEngine>,
        session: Arc<CaptureSession>,
        resolver: Arc<dyn ConflictResolver>,
        settings: CaptureConfig,
    ) -> Self {
        Self {
            engine,
            session,
            resolver,
            settings,
        }
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    /// Записать две клавиши и применить результат к таблице
    pub async fn run(&self) -> AddOutcome {
        let captured = self.capture().await;

        match captured {
            Some(mapping) => self.apply(mapping).await,
            None => AddOutcome::Cancelled,
        }
    }

    async fn capture(&self) -> Option<Mapping> {
        let table = Arc::clone(self.engine.table());
        let _suspended = table.suspend();

        self.session.reset();
        self.session.begin();
        let _attachment = self.engine.attach_capture(Arc::clone(&self.session));

        let phase = match tokio::time::timeout(self.settings.timeout(), self.session.wait_finished()).await {
            Ok(phase) => phase,
            Err(_) => {
                warn!("Запись подмены не завершена за {} с", self.settings.timeout_secs);
                self.session.cancel();
                self.session.phase()
            }
        };

        if phase != CapturePhase::Completed {
            return None;
        }

        match (self.session.source_key(), self.session.target_key()) {
            (Some(source), Some(target)) => Some(Mapping::new(source, target)),
            _ => None,
        }
    }

    /// Политика конфликтов для уже записанной пары
    pub async fn apply(&self, mapping: Mapping) -> AddOutcome {
        if self.settings.reject_self_mapping && mapping.is_self_mapping() {
            info!("Подмена {} на саму себя отклонена настройками", mapping.source.label());
            return AddOutcome::SelfMapping(mapping.source);
        }

        let table = self.engine.table();
        let outcome = match table.get(mapping.source) {
            Some(current) if current == mapping.target => AddOutcome::AlreadyExists(mapping),
            Some(current) => {
                let confirmed = self.settings.auto_confirm_replace
                    || self
                        .resolver
                        .confirm_replace(mapping.source, current, mapping.target)
                        .await;

                if confirmed {
                    table.set_mapping(mapping.source, mapping.target);
                    AddOutcome::Replaced {
                        mapping,
                        previous: current,
                    }
                } else {
                    AddOutcome::Declined(mapping)
                }
            }
            None => {
                table.set_mapping(mapping.source, mapping.target);
                AddOutcome::Added(mapping)
            }
        };

        info!("Итог записи: {}", outcome);
        outcome
    }
}
