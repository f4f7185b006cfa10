use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// Путь к /dev/input/event* либо "auto"
    pub device_path: String,
    /// Имя виртуальной клавиатуры uinput; устройство с этим именем никогда не захватывается
    pub virtual_device_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingsConfig {
    /// Файл с сохранёнными подменами
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    pub timeout_secs: u64,
    #[serde(default)]
    pub reject_self_mapping: bool,
    #[serde(default)]
    pub auto_confirm_replace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device_path: "auto".to_string(),
            virtual_device_name: "keyswap virtual keyboard".to_string(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("keyswap-mappings.toml"),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            reject_self_mapping: false,
            auto_confirm_replace: false,
        }
    }
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        // Отсутствующий файл не ошибка: остаются значения по умолчанию и переменные окружения
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("KEYSWAP_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "full" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        if self.input.device_path.is_empty() {
            anyhow::bail!("input.device_path не может быть пустым (используйте \"auto\")");
        }

        if self.input.virtual_device_name.trim().is_empty() {
            anyhow::bail!("input.virtual_device_name не может быть пустым");
        }

        if self.settings.path.as_os_str().is_empty() {
            anyhow::bail!("settings.path не может быть пустым");
        }

        // Валидация настроек записи подмены
        if self.capture.timeout_secs == 0 {
            anyhow::bail!("capture.timeout_secs должно быть больше 0");
        }

        if self.capture.timeout_secs > 600 {
            anyhow::bail!("capture.timeout_secs должно быть не больше 600");
        }

        Ok(())
    }
}
