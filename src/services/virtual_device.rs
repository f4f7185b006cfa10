use crate::error::{KeyswapError, Result};
use crate::events::{KeyCode, KeyState};
use crate::services::KeyInjector;
use parking_lot::Mutex;
use tracing::{debug, info};

const EV_SYN: i32 = 0;
const EV_KEY: i32 = 1;

/// Виртуальная клавиатура uinput, через которую идут все события после перехвата.
///
/// Устройство с её именем никогда не захватывается перехватчиком, иначе
/// собственный вывод вернулся бы на вход.
pub struct VirtualDevice {
    device: Mutex<Option<uinput::Device>>,
    device_name: String,
    dry_run: bool,
}

impl VirtualDevice {
    pub fn new(device_name: &str, dry_run: bool) -> Result<Self> {
        info!("Инициализация VirtualDevice '{}' (dry_run: {})", device_name, dry_run);

        let device = if dry_run {
            None
        } else {
            Some(Self::create_virtual_device(device_name)?)
        };

        Ok(Self {
            device: Mutex::new(device),
            device_name: device_name.to_string(),
            dry_run,
        })
    }

    fn create_virtual_device(device_name: &str) -> Result<uinput::Device> {
        info!("Создание виртуального устройства uinput '{}' для инъекции клавиш", device_name);

        let virtual_device = uinput::default()?
            .name(device_name)?
            .event(uinput::event::Keyboard::All)?
            .create()
            .map_err(|e| {
                KeyswapError::Internal(format!(
                    "Не удалось создать виртуальное устройство '{}': {}",
                    device_name, e
                ))
            })?;

        info!("Виртуальное устройство '{}' создано успешно", device_name);
        Ok(virtual_device)
    }

    /// Записать событие клавиши и SYN_REPORT
    pub fn send_key(&self, code: KeyCode, state: KeyState) -> Result<()> {
        if self.dry_run {
            info!("[DRY RUN] Виртуальное событие: {} {:?}", code, state);
            return Ok(());
        }

        let mut guard = self.device.lock();
        let device = guard
            .as_mut()
            .ok_or_else(|| KeyswapError::Internal("Виртуальное устройство недоступно".to_string()))?;

        let keycode = code.value() as i32;
        device.write(EV_KEY, keycode, state.evdev_value()).map_err(|e| {
            KeyswapError::Internal(format!("Не удалось отправить событие клавиши {}: {}", keycode, e))
        })?;
        device
            .write(EV_SYN, 0, 0)
            .map_err(|e| KeyswapError::Internal(format!("Не удалось синхронизировать события: {}", e)))?;

        debug!("Виртуальное событие {} {:?} отправлено", code, state);
        Ok(())
    }

}

impl KeyInjector for VirtualDevice {
    fn inject(&self, code: KeyCode, state: KeyState) -> Result<()> {
        self.send_key(code, state)
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if !self.dry_run {
            info!("Закрытие виртуального устройства '{}'", self.device_name);
        }
    }
}
