use crate::error::{KeyswapError, Result};
use crate::events::{KeyCode, Mapping};
use crate::keyswap_error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Клавиша в файле: имя или числовой код
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
enum KeySpec {
    Code(u16),
    Name(String),
}

impl KeySpec {
    fn resolve(&self) -> Result<KeyCode> {
        match self {
            KeySpec::Code(code) => Ok(KeyCode(*code)),
            KeySpec::Name(name) => name.parse(),
        }
    }

    fn from_key(code: KeyCode) -> Self {
        match code.name() {
            Some(name) => KeySpec::Name(name.to_string()),
            None => KeySpec::Code(code.value()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct MappingEntry {
    source: KeySpec,
    target: KeySpec,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct MappingsFile {
    #[serde(default)]
    mappings: Vec<MappingEntry>,
}

/// Хранилище подмен между запусками
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Загрузить пары в порядке файла. Отсутствующий файл - пустой список.
    pub fn load(&self) -> Result<Vec<Mapping>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Файл подмен {:?} не найден, начинаем с пустой таблицы", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(KeyswapError::Io(e)),
        };

        let file: MappingsFile = toml::from_str(&content)
            .map_err(|e| keyswap_error!(settings, "{:?}: {}", self.path, e))?;

        let mut mappings = Vec::with_capacity(file.mappings.len());
        for (i, entry) in file.mappings.iter().enumerate() {
            let source = entry
                .source
                .resolve()
                .map_err(|e| keyswap_error!(settings, "подмена #{}: источник: {}", i + 1, e))?;
            let target = entry
                .target
                .resolve()
                .map_err(|e| keyswap_error!(settings, "подмена #{}: цель: {}", i + 1, e))?;
            mappings.push(Mapping::new(source, target));
        }

        info!("Загружено {} подмен из {:?}", mappings.len(), self.path);
        Ok(mappings)
    }

    /// Записать снимок через временный файл и rename
    pub fn save(&self, mappings: &[Mapping]) -> Result<()> {
        let file = MappingsFile {
            mappings: mappings
                .iter()
                .map(|mapping| MappingEntry {
                    source: KeySpec::from_key(mapping.source),
                    target: KeySpec::from_key(mapping.target),
                })
                .collect(),
        };

        let content = toml::to_string_pretty(&file)
            .map_err(|e| keyswap_error!(settings, "сериализация: {}", e))?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!("Файл подмен записан: {:?}", self.path);
        info!("Сохранено {} подмен в {:?}", mappings.len(), self.path);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "keyswap-mappings.toml".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("mappings.toml"));

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("mappings.toml"));
        let mappings = vec![
            Mapping::new(KeyCode(58), KeyCode(1)),
            Mapping::new(KeyCode(30), KeyCode(700)),
        ];

        store.save(&mappings).unwrap();

        assert_eq!(store.load().unwrap(), mappings);
        assert!(!dir.path().join("mappings.toml.tmp").exists());
    }

    #[test]
    fn test_known_keys_are_written_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.toml");
        let store = SettingsStore::new(&path);

        store
            .save(&[Mapping::new(KeyCode(58), KeyCode(700))])
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("source = \"capslock\""));
        assert!(content.contains("target = 700"));
    }

    #[test]
    fn test_load_accepts_names_aliases_and_codes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.toml");
        fs::write(
            &path,
            r#"
[[mappings]]
source = "CapsLock"
target = "esc"

[[mappings]]
source = 183
target = "f1"
"#,
        )
        .unwrap();

        let mappings = SettingsStore::new(&path).load().unwrap();

        assert_eq!(
            mappings,
            vec![
                Mapping::new(KeyCode(58), KeyCode(1)),
                Mapping::new(KeyCode(183), KeyCode(59)),
            ]
        );
    }

    #[test]
    fn test_unknown_key_name_is_reported_with_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.toml");
        fs::write(
            &path,
            "[[mappings]]\nsource = \"a\"\ntarget = \"b\"\n\n[[mappings]]\nsource = \"nope\"\ntarget = \"b\"\n",
        )
        .unwrap();

        let err = SettingsStore::new(&path).load().unwrap_err();

        assert!(err.to_string().contains("#2"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.toml");
        fs::write(&path, "mappings = 5").unwrap();

        assert!(SettingsStore::new(&path).load().is_err());
    }
}
