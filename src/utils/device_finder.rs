use crate::error::{KeyswapError, Result};
use crate::keyswap_error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Устройства, которые никогда не являются клавиатурой для перехвата
const NOT_A_KEYBOARD: &[&str] = &["mouse", "deathadder", "touchpad", "trackpoint", "consumer control"];

/// Поиск физической клавиатуры для эксклюзивного захвата
pub struct DeviceFinder;

impl DeviceFinder {
    /// Найти клавиатуру; устройство с именем `exclude_name` (наша виртуальная клавиатура) пропускается
    pub fn find_keyboard_device(device_path: &str, exclude_name: &str) -> Result<PathBuf> {
        if device_path != "auto" {
            let path = PathBuf::from(device_path);
            return if path.exists() {
                info!("Используется указанное устройство: {:?}", path);
                Ok(path)
            } else {
                KeyswapError::device_not_found(format!("Указанное устройство не найдено: {:?}", path))
            };
        }

        info!("Автопоиск клавиатуры...");

        if let Ok(device) = Self::find_by_id(exclude_name) {
            info!("Клавиатура найдена по ID: {:?}", device);
            return Ok(device);
        }

        if let Ok(device) = Self::find_by_event_devices(exclude_name) {
            info!("Клавиатура найдена среди event устройств: {:?}", device);
            return Ok(device);
        }

        KeyswapError::device_not_found(
            "Не удалось найти клавиатуру. Укажите input.device_path или добавьте пользователя в группу 'input'",
        )
    }

    /// Приоритет ссылки в /dev/input/by-id; `None` - не клавиатура
    fn by_id_priority(link_name: &str) -> Option<u8> {
        let lower = link_name.to_lowercase();
        if !lower.contains("event") || NOT_A_KEYBOARD.iter().any(|word| lower.contains(word)) {
            return None;
        }

        if lower.ends_with("event-kbd") {
            Some(100)
        } else if lower.contains("keyboard") {
            Some(50)
        } else if lower.contains("kbd") {
            Some(10)
        } else {
            None
        }
    }

    fn find_by_id(exclude_name: &str) -> Result<PathBuf> {
        let by_id_dir = Path::new("/dev/input/by-id");
        if !by_id_dir.exists() {
            debug!("Директория {:?} не существует", by_id_dir);
            return KeyswapError::device_not_found("by-id недоступна");
        }

        let entries = fs::read_dir(by_id_dir)
            .map_err(|e| keyswap_error!(permission, "Нет доступа к {:?}: {}", by_id_dir, e))?;

        let mut candidates = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(link_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(priority) = Self::by_id_priority(link_name) else {
                continue;
            };

            if Self::is_keyboard_device(&path, exclude_name) {
                debug!("Кандидат: {} (приоритет {})", link_name, priority);
                candidates.push((path, priority));
            }
        }

        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        match candidates.into_iter().next() {
            Some((path, _)) => Ok(path),
            None => KeyswapError::device_not_found("В by-id нет клавиатур"),
        }
    }

    fn find_by_event_devices(exclude_name: &str) -> Result<PathBuf> {
        let input_dir = Path::new("/dev/input");
        let entries = fs::read_dir(input_dir)
            .map_err(|e| keyswap_error!(permission, "Нет доступа к {:?}: {}", input_dir, e))?;

        let mut event_devices: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("event"))
            })
            .collect();

        // event2 раньше event10
        event_devices.sort_by_key(|path| Self::event_number(path));

        for path in event_devices {
            debug!("Проверяем устройство: {:?}", path);
            if Self::is_keyboard_device(&path, exclude_name) {
                return Ok(path);
            }
        }

        KeyswapError::device_not_found("Среди event устройств нет доступной клавиатуры")
    }

    fn event_number(path: &Path) -> u32 {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("event"))
            .and_then(|n| n.parse().ok())
            .unwrap_or(u32::MAX)
    }

    fn is_keyboard_device(path: &Path, exclude_name: &str) -> bool {
        let device = match evdev::Device::open(path) {
            Ok(device) => device,
            Err(e) => {
                debug!("Не удалось открыть {:?}: {}", path, e);
                return false;
            }
        };

        let name = device.name().unwrap_or("Unknown");
        if name == exclude_name {
            debug!("Пропускаем собственную виртуальную клавиатуру {:?}", path);
            return false;
        }

        let lower = name.to_lowercase();
        if NOT_A_KEYBOARD.iter().any(|word| lower.contains(word)) {
            debug!("Исключаем {:?} ({})", path, name);
            return false;
        }

        let is_keyboard = device.supported_keys().is_some_and(|keys| {
            keys.contains(evdev::KeyCode::KEY_A)
                && keys.contains(evdev::KeyCode::KEY_SPACE)
                && keys.contains(evdev::KeyCode::KEY_ENTER)
                && keys.iter().count() > 20
        });

        if is_keyboard {
            info!("Устройство {:?} ({}) подходит как клавиатура", path, name);
        } else if lower.contains("keyboard") {
            warn!("{:?} ({}) называется клавиатурой, но не имеет основных клавиш", path, name);
        }

        is_keyboard
    }
}
