use crate::debug_if_enabled;
use crate::events::{KeyCode, Mapping};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Таблица активных подмен, общая для потока перехвата и управляющего кода.
///
/// Responsibilities (strict):
/// - Hold at most one target per source key.
/// - Serve lookups from the hook path with a read lock held for a single `get`.
/// - Publish every mutation as a fresh immutable snapshot (copy-on-write), so a
///   lookup observes either the old table or the new one, never a half-written one.
/// - Do NOT decide conflict or confirmation policy; `set_mapping` is an unconditional upsert.
pub struct MappingTable {
    snapshot: RwLock<Arc<HashMap<KeyCode, KeyCode>>>,
    suspended: AtomicUsize,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingTable {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            suspended: AtomicUsize::new(0),
        }
    }

    /// Предзаполнение из сохранённых настроек; при повторе источника побеждает последняя пара
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = Mapping>,
    {
        let map: HashMap<KeyCode, KeyCode> = pairs
            .into_iter()
            .map(|mapping| (mapping.source, mapping.target))
            .collect();

        info!("Таблица подмен инициализирована: {} записей", map.len());

        Self {
            snapshot: RwLock::new(Arc::new(map)),
            suspended: AtomicUsize::new(0),
        }
    }

    /// Поиск цели для клавиши. Во время приостановки всегда `None`.
    pub fn lookup(&self, source: KeyCode) -> Option<KeyCode> {
        if self.is_suspended() {
            return None;
        }
        self.snapshot.read().get(&source).copied()
    }

    /// Добавить или перезаписать подмену (последняя запись побеждает)
    pub fn set_mapping(&self, source: KeyCode, target: KeyCode) {
        let previous = self.mutate(|map| map.insert(source, target));
        match previous {
            Some(old) if old != target => {
                info!("Подмена {} перезаписана: {} -> {}", source.label(), old.label(), target.label())
            }
            Some(_) => debug_if_enabled!("Подмена {} уже указывает на {}", source.label(), target.label()),
            None => info!("Добавлена подмена {} -> {}", source.label(), target.label()),
        }
    }

    /// Удалить подмену; отсутствие записи не является ошибкой
    pub fn remove_mapping(&self, source: KeyCode) {
        // Не публикуем новый снимок, если удалять нечего
        if !self.snapshot.read().contains_key(&source) {
            debug_if_enabled!("Подмены для {} нет, удалять нечего", source.label());
            return;
        }

        if let Some(target) = self.mutate(|map| map.remove(&source)) {
            info!("Удалена подмена {} -> {}", source.label(), target.label());
        }
    }

    /// Очистить таблицу целиком
    pub fn remove_all_mappings(&self) {
        let count = {
            let mut guard = self.snapshot.write();
            let count = guard.len();
            *guard = Arc::new(HashMap::new());
            count
        };
        info!("Удалены все подмены ({} шт.)", count);
    }

    /// Текущие подмены, отсортированные по исходной клавише
    pub fn snapshot(&self) -> Vec<Mapping> {
        let current = Arc::clone(&self.snapshot.read());
        let mut mappings: Vec<Mapping> = current
            .iter()
            .map(|(&source, &target)| Mapping::new(source, target))
            .collect();
        mappings.sort();
        mappings
    }

    /// Цель, записанная в таблице, без учёта приостановки
    pub fn get(&self, source: KeyCode) -> Option<KeyCode> {
        self.snapshot.read().get(&source).copied()
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Временно отключить все подмены, не трогая содержимое таблицы.
    ///
    /// Пока жив хотя бы один guard, `lookup` возвращает `None` и перехватчик видит сырые клавиши.
    pub fn suspend(self: &Arc<Self>) -> SuspendGuard {
        let depth = self.suspended.fetch_add(1, Ordering::AcqRel) + 1;
        info!("Подмены приостановлены (уровень {})", depth);
        SuspendGuard {
            table: Arc::clone(self),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire) > 0
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut HashMap<KeyCode, KeyCode>) -> R) -> R {
        let mut guard = self.snapshot.write();
        // Читатели, успевшие склонировать Arc, продолжают видеть старый снимок
        f(Arc::make_mut(&mut guard))
    }
}

/// Снимает приостановку таблицы при уничтожении
pub struct SuspendGuard {
    table: Arc<MappingTable>,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        let previous = self.table.suspended.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            info!("Подмены снова активны");
        }
    }
}
