use crate::error::Result;
use crate::keyswap_error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{info, warn};

const INPUT_DIR: &str = "/dev/input";
const UINPUT_DEVICE: &str = "/dev/uinput";

/// Проверить доступ к /dev/input и /dev/uinput до установки перехвата
pub fn check_permissions() -> Result<()> {
    info!("Проверка прав доступа...");

    check_input_devices_access()?;
    check_uinput_access()?;
    check_not_root();

    info!("Проверка прав доступа завершена");
    Ok(())
}

fn check_input_devices_access() -> Result<()> {
    if !Path::new(INPUT_DIR).exists() {
        return Err(keyswap_error!(permission, "Директория {} не существует", INPUT_DIR));
    }

    fs::read_dir(INPUT_DIR).map_err(|e| {
        keyswap_error!(
            permission,
            "Нет доступа к {}: {}. Добавьте пользователя в группу 'input'",
            INPUT_DIR,
            e
        )
    })?;

    info!("Доступ к {} подтверждён", INPUT_DIR);
    Ok(())
}

fn check_uinput_access() -> Result<()> {
    if !Path::new(UINPUT_DEVICE).exists() {
        // Модуль может быть загружен позже; создание виртуальной клавиатуры сообщит точную причину
        warn!("{} не существует, возможно модуль uinput не загружен", UINPUT_DEVICE);
        return Ok(());
    }

    let metadata = fs::metadata(UINPUT_DEVICE).map_err(|e| {
        keyswap_error!(permission, "Не удалось проверить права {}: {}", UINPUT_DEVICE, e)
    })?;

    if !mode_allows_group_or_other(metadata.permissions().mode()) {
        return Err(keyswap_error!(
            permission,
            "Нет прав доступа к {}. Добавьте пользователя в группу 'uinput' или 'input'",
            UINPUT_DEVICE
        ));
    }

    info!("Доступ к {} подтверждён", UINPUT_DEVICE);
    Ok(())
}

/// Устройство открыто группе или всем (обычно 660 или 666)
fn mode_allows_group_or_other(mode: u32) -> bool {
    mode & 0o060 != 0 || mode & 0o006 != 0
}

fn check_not_root() {
    match std::env::var("USER") {
        Ok(user) if user == "root" => {
            warn!("Keyswap запущен от имени root");
            for line in setup_commands() {
                warn!("   {}", line);
            }
        }
        Ok(user) => info!("Запущено от имени пользователя: {}", user),
        Err(_) => warn!("Не удалось определить пользователя"),
    }
}

/// Команды настройки доступа для обычного пользователя
pub fn setup_commands() -> Vec<&'static str> {
    vec![
        "sudo usermod -a -G input,uinput $USER",
        "sudo modprobe uinput",
        "echo 'uinput' | sudo tee /etc/modules-load.d/uinput.conf",
        "(затем перезайдите в систему)",
    ]
}
