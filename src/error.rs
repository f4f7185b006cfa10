use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyswapError {
    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка uinput: {0}")]
    Uinput(#[from] uinput::Error),

    #[error("Ошибка файла маппингов: {0}")]
    Settings(String),

    #[error("Неизвестная клавиша: {0}")]
    InvalidKey(String),

    #[error("Устройство не найдено: {0}")]
    DeviceNotFound(String),

    #[error("Недостаточно прав доступа: {0}")]
    Permission(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

/// Причины, по которым глобальный перехват не может быть установлен.
///
/// Любая из них фатальна для команды `run`: без перехвата подмена клавиш невозможна.
#[derive(Error, Debug)]
pub enum HookInstallError {
    #[error("клавиатурное устройство не найдено: {0}")]
    DeviceNotFound(String),

    #[error("ОС отказала в захвате устройства: {0}")]
    Denied(String),

    #[error("перехват уже активен в этом процессе")]
    AlreadyInstalled,

    #[error("не удалось создать виртуальную клавиатуру: {0}")]
    Injector(String),
}

impl KeyswapError {
    pub fn device_not_found<T>(msg: impl Into<String>) -> Result<T> {
        Err(KeyswapError::DeviceNotFound(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, KeyswapError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! keyswap_error {
    (device_not_found, $($arg:tt)*) => {
        $crate::error::KeyswapError::DeviceNotFound(format!($($arg)*))
    };
    (permission, $($arg:tt)*) => {
        $crate::error::KeyswapError::Permission(format!($($arg)*))
    };
    (invalid_key, $($arg:tt)*) => {
        $crate::error::KeyswapError::InvalidKey(format!($($arg)*))
    };
    (settings, $($arg:tt)*) => {
        $crate::error::KeyswapError::Settings(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::KeyswapError::Internal(format!($($arg)*))
    };
}
