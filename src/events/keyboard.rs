use crate::error::{KeyswapError, Result};
use crate::mappings::KeyNames;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Состояние клавиши
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyState {
    Pressed,
    Released,
    Repeat,
}

impl KeyState {
    /// Значение поля `value` события EV_KEY
    pub fn from_evdev_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Released),
            1 => Some(KeyState::Pressed),
            2 => Some(KeyState::Repeat),
            _ => None,
        }
    }

    pub fn evdev_value(self) -> i32 {
        match self {
            KeyState::Released => 0,
            KeyState::Pressed => 1,
            KeyState::Repeat => 2,
        }
    }

    /// Автоповтор считается нажатием
    pub fn is_key_down(self) -> bool {
        !matches!(self, KeyState::Released)
    }
}

/// Код клавиши (evdev коды)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Человекочитаемое имя, если код есть в таблице имён
    pub fn name(&self) -> Option<&'static str> {
        KeyNames::reverse_translate(self.0)
    }

    /// Имя клавиши либо `#<код>` - форма, которую принимает `from_str`
    pub fn label(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => format!("#{}", self.0),
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "KEY_{} ({})", self.0, name),
            None => write!(f, "KEY_{}", self.0),
        }
    }
}

impl FromStr for KeyCode {
    type Err = KeyswapError;

    /// Имя клавиши, `#<код>` или десятичный код.
    ///
    /// Имена проверяются раньше чисел: "1" - клавиша единицы (код 2).
    /// Коды 0..9 вводятся только как `#0`..`#9`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || crate::keyswap_error!(invalid_key, "'{}'", trimmed);

        if let Some(code) = trimmed.strip_prefix('#') {
            return code.parse::<u16>().map(KeyCode).map_err(|_| invalid());
        }

        if let Ok(code) = KeyNames::translate(trimmed) {
            return Ok(KeyCode(code));
        }

        trimmed.parse::<u16>().map(KeyCode).map_err(|_| invalid())
    }
}

/// Сырое событие клавиатуры на границе с ОС
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub code: KeyCode,
    pub state: KeyState,
    /// Событие было сгенерировано самим приложением
    pub is_synthesized: bool,
}

impl RawKeyEvent {
    pub fn new(code: KeyCode, state: KeyState, is_synthesized: bool) -> Self {
        Self {
            code,
            state,
            is_synthesized,
        }
    }

    pub fn genuine(code: KeyCode, state: KeyState) -> Self {
        Self::new(code, state, false)
    }

    pub fn synthesized(code: KeyCode, state: KeyState) -> Self {
        Self::new(code, state, true)
    }

    pub fn is_key_down(&self) -> bool {
        self.state.is_key_down()
    }
}

impl fmt::Display for RawKeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?}{}",
            self.code,
            self.state,
            if self.is_synthesized { " [synth]" } else { "" }
        )
    }
}

/// Правило подмены: `source` заменяется на `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mapping {
    pub source: KeyCode,
    pub target: KeyCode,
}

impl Mapping {
    pub fn new(source: KeyCode, target: KeyCode) -> Self {
        Self { source, target }
    }

    pub fn is_self_mapping(&self) -> bool {
        self.source == self.target
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.label(), self.target.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state_from_evdev() {
        assert_eq!(KeyState::from_evdev_value(0), Some(KeyState::Released));
        assert_eq!(KeyState::from_evdev_value(1), Some(KeyState::Pressed));
        assert_eq!(KeyState::from_evdev_value(2), Some(KeyState::Repeat));
        assert_eq!(KeyState::from_evdev_value(7), None);
    }

    #[test]
    fn test_repeat_counts_as_key_down() {
        assert!(KeyState::Pressed.is_key_down());
        assert!(KeyState::Repeat.is_key_down());
        assert!(!KeyState::Released.is_key_down());
    }

    #[test]
    fn test_key_code_parse_by_name_and_number() {
        assert_eq!("a".parse::<KeyCode>().unwrap(), KeyCode(30));
        assert_eq!("CapsLock".parse::<KeyCode>().unwrap(), KeyCode(58));
        assert_eq!(" 183 ".parse::<KeyCode>().unwrap(), KeyCode(183));
        assert!("no_such_key".parse::<KeyCode>().is_err());
    }

    #[test]
    fn test_explicit_code_form_reaches_low_codes() {
        // Без решётки цифра - это клавиша цифры
        assert_eq!("1".parse::<KeyCode>().unwrap(), KeyCode(2));
        assert_eq!("#1".parse::<KeyCode>().unwrap(), KeyCode(1));
        assert_eq!("#0".parse::<KeyCode>().unwrap(), KeyCode(0));
        assert_eq!(" #700 ".parse::<KeyCode>().unwrap(), KeyCode(700));
        assert!("#".parse::<KeyCode>().is_err());
        assert!("#esc".parse::<KeyCode>().is_err());

        // Подпись без имени читается обратно в тот же код
        let unnamed = KeyCode(700);
        assert_eq!(unnamed.label().parse::<KeyCode>().unwrap(), unnamed);
    }

    #[test]
    fn test_key_code_label() {
        assert_eq!(KeyCode(1).label(), "escape");
        assert_eq!(KeyCode(700).label(), "#700");
        assert_eq!(KeyCode(700).to_string(), "KEY_700");
    }

    #[test]
    fn test_mapping_display_and_self_mapping() {
        let mapping = Mapping::new(KeyCode(58), KeyCode(1));
        assert_eq!(mapping.to_string(), "capslock -> escape");
        assert!(!mapping.is_self_mapping());
        assert!(Mapping::new(KeyCode(30), KeyCode(30)).is_self_mapping());
    }
}
