use crate::config::Config;
use crate::debug_if_enabled;
use crate::error::HookInstallError;
use crate::events::{Decision, KeyCode, KeyState, RawKeyEvent};
use crate::services::{HookEngine, KeyInjector};
use crate::utils::DeviceFinder;
use evdev::{Device, EventStream, EventType, InputEvent};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::r#trait::{HookBackend, HookHandle, HookSlot};

/// Глобальный перехват через эксклюзивный захват (EVIOCGRAB) физической клавиатуры.
///
/// Пока устройство захвачено, его события не видит никто, кроме нас: пропуск
/// события означает его повторную отправку через виртуальную клавиатуру.
pub struct EvdevHook {
    config: Arc<Config>,
}

impl EvdevHook {
    pub fn new(config: Arc<Config>) -> Self {
        info!("Инициализация EvdevHook");
        Self { config }
    }

    fn open_and_grab(&self) -> Result<Device, HookInstallError> {
        let own_name = self.config.input.virtual_device_name.as_str();
        let device_path = DeviceFinder::find_keyboard_device(&self.config.input.device_path, own_name)
            .map_err(|e| HookInstallError::DeviceNotFound(e.to_string()))?;

        let mut device = Device::open(&device_path).map_err(|e| {
            HookInstallError::DeviceNotFound(format!(
                "Не удалось открыть устройство {:?}: {}",
                device_path, e
            ))
        })?;

        // Захват собственной виртуальной клавиатуры замкнул бы вывод на вход
        if device.name() == Some(own_name) {
            return Err(HookInstallError::Denied(format!(
                "{:?} - собственная виртуальная клавиатура keyswap",
                device_path
            )));
        }

        match device.grab() {
            Ok(_) => {
                Self::log_grabbed_device(&device);
                Ok(device)
            }
            Err(e) => {
                Self::log_grab_error(&device_path, &e);
                Err(HookInstallError::Denied(format!(
                    "Не удалось захватить устройство эксклюзивно: {}. Device busy - устройство уже захвачено другим процессом",
                    e
                )))
            }
        }
    }

    async fn run_impl(mut keyboard: GrabbedKeyboard, engine: Arc<HookEngine>) {
        info!("EvdevHook запущен, начинаем чтение событий");
        info!("Активных подмен: {}", engine.table().len());

        let mut held = HeldKeys::new(Arc::clone(engine.injector()));

        loop {
            let event = match keyboard.stream.next_event().await {
                Ok(event) => event,
                Err(e) => {
                    error!("Ошибка чтения событий, перехват остановлен: {}", e);
                    break;
                }
            };

            let Some(raw) = translate_event(&event) else {
                debug_if_enabled!("Пропуск не-клавиатурного события: {:?}", event);
                continue;
            };

            match engine.process(raw) {
                Decision::PassThrough => {
                    engine.synthesize(raw.code, raw.state);
                    held.track(raw.code, raw.state);
                }
                Decision::Remap(target) => held.track(target, raw.state),
                Decision::Suppress => {}
            }
        }
    }

    fn log_grabbed_device(device: &Device) {
        info!("Устройство: {}", device.name().unwrap_or("Unknown"));
        info!("Физический путь: {:?}", device.physical_path());
        info!("Уникальный ID: {:?}", device.unique_name());
        info!("Устройство захвачено эксклюзивно");
    }

    fn log_grab_error(device_path: &Path, e: &std::io::Error) {
        warn!(
            "Не удалось захватить устройство {}: {}",
            device_path.display(),
            e
        );
        warn!("Попробуйте:");
        warn!("1. Проверить, не запущен ли уже другой экземпляр keyswap");
        warn!("2. Добавить пользователя в группу input: sudo usermod -a -G input $USER");
        warn!("3. Перезайти в систему после добавления в группу");
    }
}

impl HookBackend for EvdevHook {
    fn install(self: Box<Self>, engine: Arc<HookEngine>) -> Result<HookHandle, HookInstallError> {
        let slot = HookSlot::acquire()?;
        let device = self.open_and_grab()?;

        let stream = device.into_event_stream().map_err(|e| {
            HookInstallError::Denied(format!("Не удалось подписаться на события устройства: {}", e))
        })?;

        let keyboard = GrabbedKeyboard { stream };
        let task = tokio::spawn(Self::run_impl(keyboard, engine));
        Ok(HookHandle::new("evdev", task, slot))
    }
}

/// Событие захваченного физического устройства; наш собственный вывод сюда не попадает
pub(crate) fn translate_event(event: &InputEvent) -> Option<RawKeyEvent> {
    if event.event_type() != EventType::KEY {
        return None;
    }

    match KeyState::from_evdev_value(event.value()) {
        Some(state) => Some(RawKeyEvent::genuine(KeyCode(event.code()), state)),
        None => {
            debug!("Неизвестное значение события: {}", event.value());
            None
        }
    }
}

struct GrabbedKeyboard {
    stream: EventStream,
}

impl Drop for GrabbedKeyboard {
    fn drop(&mut self) {
        info!("Освобождение захваченного устройства");
        if let Err(e) = self.stream.device_mut().ungrab() {
            warn!("Не удалось освободить устройство: {}", e);
        }
    }
}

/// Клавиши, нажатые на виртуальной клавиатуре; при остановке перехвата отпускаются
struct HeldKeys {
    injector: Arc<dyn KeyInjector>,
    pressed: HashSet<KeyCode>,
}

impl HeldKeys {
    fn new(injector: Arc<dyn KeyInjector>) -> Self {
        Self {
            injector,
            pressed: HashSet::new(),
        }
    }

    fn track(&mut self, code: KeyCode, state: KeyState) {
        if state.is_key_down() {
            self.pressed.insert(code);
        } else {
            self.pressed.remove(&code);
        }
    }
}

impl Drop for HeldKeys {
    fn drop(&mut self) {
        if self.pressed.is_empty() {
            return;
        }
        info!("Отпускание {} удерживаемых клавиш", self.pressed.len());
        for code in self.pressed.drain() {
            if let Err(e) = self.injector.inject(code, KeyState::Released) {
                error!("Не удалось отпустить {}: {}", code, e);
            }
        }
    }
}
