pub mod keyboard;

pub use keyboard::{KeyCode, KeyState, Mapping, RawKeyEvent};

/// Результат обработки одного события перехватчиком
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Событие передаётся дальше без изменений
    PassThrough,
    /// Исходное событие подавлено, вместо него инъецирована целевая клавиша
    Remap(KeyCode),
    /// Событие забрала сессия записи; дальше оно не уходит
    Suppress,
}
