use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Преобразование имён клавиш в evdev коды и обратно
pub struct KeyNames;

// Каноническое имя -> код. Порядок определяет вывод `keyswap keys`.
const CANONICAL: &[(&str, u16)] = &[
    // Буквенные клавиши
    ("a", 30),
    ("b", 48),
    ("c", 46),
    ("d", 32),
    ("e", 18),
    ("f", 33),
    ("g", 34),
    ("h", 35),
    ("i", 23),
    ("j", 36),
    ("k", 37),
    ("l", 38),
    ("m", 50),
    ("n", 49),
    ("o", 24),
    ("p", 25),
    ("q", 16),
    ("r", 19),
    ("s", 31),
    ("t", 20),
    ("u", 22),
    ("v", 47),
    ("w", 17),
    ("x", 45),
    ("y", 21),
    ("z", 44),
    // Цифровые клавиши (верхний ряд)
    ("1", 2),
    ("2", 3),
    ("3", 4),
    ("4", 5),
    ("5", 6),
    ("6", 7),
    ("7", 8),
    ("8", 9),
    ("9", 10),
    ("0", 11),
    // Специальные клавиши
    ("escape", 1),
    ("backspace", 14),
    ("tab", 15),
    ("enter", 28),
    ("space", 57),
    ("capslock", 58),
    ("numlock", 69),
    ("compose", 127),
    // Знаки пунктуации
    ("minus", 12),
    ("equal", 13),
    ("leftbrace", 26),
    ("rightbrace", 27),
    ("semicolon", 39),
    ("apostrophe", 40),
    ("grave", 41),
    ("backslash", 43),
    ("comma", 51),
    ("dot", 52),
    ("slash", 53),
    ("102nd", 86),
    // Модификаторы (подменяются как обычные клавиши, без аккордов)
    ("leftctrl", 29),
    ("leftshift", 42),
    ("rightshift", 54),
    ("leftalt", 56),
    ("rightctrl", 97),
    ("rightalt", 100),
    ("leftmeta", 125),
    ("rightmeta", 126),
    // Навигация/редакция
    ("home", 102),
    ("up", 103),
    ("pageup", 104),
    ("left", 105),
    ("right", 106),
    ("end", 107),
    ("down", 108),
    ("pagedown", 109),
    ("insert", 110),
    ("delete", 111),
    // Системные
    ("printscreen", 99),
    ("scrolllock", 70),
    ("pause", 119),
    // Функциональные клавиши
    ("f1", 59),
    ("f2", 60),
    ("f3", 61),
    ("f4", 62),
    ("f5", 63),
    ("f6", 64),
    ("f7", 65),
    ("f8", 66),
    ("f9", 67),
    ("f10", 68),
    ("f11", 87),
    ("f12", 88),
    // Numpad
    ("kp0", 82),
    ("kp1", 79),
    ("kp2", 80),
    ("kp3", 81),
    ("kp4", 75),
    ("kp5", 76),
    ("kp6", 77),
    ("kp7", 71),
    ("kp8", 72),
    ("kp9", 73),
    ("kpdecimal", 83),
    ("kpdivide", 98),
    ("kpmultiply", 55),
    ("kpadd", 78),
    ("kpsubtract", 74),
    ("kpenter", 96),
    // Мультимедиа
    ("mute", 113),
    ("volumedown", 114),
    ("volumeup", 115),
    ("nextsong", 163),
    ("playpause", 164),
    ("previoussong", 165),
];

// Дополнительные имена, которые принимаются на вход, но не выводятся
const ALIASES: &[(&str, u16)] = &[
    ("esc", 1),
    ("return", 28),
    ("caps", 58),
    ("ctrl", 29),
    ("shift", 42),
    ("alt", 56),
    ("altgr", 100),
    ("super", 125),
    ("meta", 125),
    ("win", 125),
    ("menu", 127),
    ("sysrq", 99),
    ("period", 52),
    ("pgup", 104),
    ("pgdn", 109),
    ("del", 111),
    ("ins", 110),
];

static NAME_TO_CODE: Lazy<HashMap<&'static str, u16>> = Lazy::new(|| {
    CANONICAL
        .iter()
        .chain(ALIASES.iter())
        .map(|&(name, code)| (name, code))
        .collect()
});

static CODE_TO_NAME: Lazy<HashMap<u16, &'static str>> =
    Lazy::new(|| CANONICAL.iter().map(|&(name, code)| (code, name)).collect());

impl KeyNames {
    /// Получить evdev код клавиши по её имени
    pub fn translate(key_name: &str) -> Result<u16, String> {
        let normalized = key_name.to_lowercase();
        NAME_TO_CODE
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| format!("Unknown key: {}", key_name))
    }

    /// Получить каноническое имя клавиши по evdev коду
    pub fn reverse_translate(keycode: u16) -> Option<&'static str> {
        CODE_TO_NAME.get(&keycode).copied()
    }

    /// Все канонические имена в порядке таблицы
    pub fn all() -> impl Iterator<Item = (&'static str, u16)> {
        CANONICAL.iter().copied()
    }
}
