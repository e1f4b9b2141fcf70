use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use anyhow::Context;
use debounce::EventDebouncer;
use log::{error, warn};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

/// Owns the in-memory copy of a RON config file and writes changes back to disk.
pub struct ConfigManager<T> {
    path: PathBuf,
    current: Arc<RwLock<T>>,
    debouncer: EventDebouncer<SaveConfigEvent>,
}

const CONFIG_DEBOUNCE_DURATION_MS: u64 = 200;

pub trait Config:
    Sized + Default + Clone + Send + Sync + Serialize + for<'a> Deserialize<'a> + 'static
{
    fn file_name() -> &'static str;

    fn is_valid(&self) -> bool {
        true
    }

    fn create_manager() -> anyhow::Result<ConfigManager<Self>> {
        Self::create_manager_at(PathBuf::from(Self::file_name()))
    }

    fn create_manager_at(path: PathBuf) -> anyhow::Result<ConfigManager<Self>> {
        let mut manager = ConfigManager::new(path);
        manager
            .load_if_exists()
            .with_context(|| format!("Failed to load config from {:?}", manager.path()))?;
        Ok(manager)
    }
}

#[derive(Clone, Copy, PartialEq)]
struct SaveConfigEvent;

fn write_config_file<T: Config>(path: &Path, config: &T) -> anyhow::Result<()> {
    let serialized = ron::ser::to_string_pretty(config, PrettyConfig::default())?;
    let mut writer =
        File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    writer.write_all(serialized.as_bytes())?;
    Ok(())
}

impl<T> ConfigManager<T>
where
    T: Config,
{
    pub fn new(path: PathBuf) -> Self {
        let current = Arc::new(RwLock::new(T::default()));
        let current_clone = current.clone();
        let path_clone = path.clone();

        let save_config = move |_event: SaveConfigEvent| {
            let config = current_clone
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            if !config.is_valid() {
                warn!("Attempted to write invalid config to {:?}", &path_clone);
                return;
            }

            if let Err(e) = write_config_file(&path_clone, &config) {
                error!("Failed to save config: {e:#}");
            }
        };

        Self {
            path,
            current,
            debouncer: EventDebouncer::new(
                Duration::from_millis(CONFIG_DEBOUNCE_DURATION_MS),
                save_config,
            ),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Arc<RwLock<T>> {
        self.current.clone()
    }

    pub fn snapshot(&self) -> T {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Loads the file if it exists. A file that parses but fails validation is
    /// ignored and the defaults stay in place.
    pub fn load_if_exists(&mut self) -> anyhow::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let config_data = std::fs::read_to_string(&self.path)?;
        if config_data.trim().is_empty() {
            return Ok(());
        }

        let config: T = ron::from_str(&config_data)
            .with_context(|| format!("Failed to parse config from {:?}", &self.path))?;

        if !config.is_valid() {
            warn!(
                "Config in {:?} is invalid, falling back to defaults",
                &self.path
            );
            return Ok(());
        }

        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clone_from(&config);
        Ok(())
    }

    pub fn update_and_save<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut T),
    {
        {
            let mut config = self.current.write().unwrap_or_else(PoisonError::into_inner);
            update_fn(&mut *config);
        }
        self.debouncer.put(SaveConfigEvent);
    }

    /// Writes the current config immediately, bypassing the debouncer.
    pub fn save_now(&self) -> anyhow::Result<()> {
        let config = self.snapshot();
        anyhow::ensure!(
            config.is_valid(),
            "Refusing to write invalid config to {:?}",
            &self.path
        );
        write_config_file(&self.path, &config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct TestConfig {
        buffer_count: u32,
        label: String,
    }

    impl Config for TestConfig {
        fn file_name() -> &'static str {
            "test.ron"
        }

        fn is_valid(&self) -> bool {
            self.label != "invalid"
        }
    }

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "marker_engine_{}_{}.ron",
            name,
            std::process::id()
        ))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = temp_config_path("missing");
        let _ = std::fs::remove_file(&path);

        let manager = TestConfig::create_manager_at(path).unwrap();
        assert_eq!(manager.snapshot(), TestConfig::default());
    }

    #[test]
    fn test_loads_partial_file() {
        let path = temp_config_path("partial");
        std::fs::write(&path, "(buffer_count: 3)").unwrap();

        let manager = TestConfig::create_manager_at(path.clone()).unwrap();
        assert_eq!(manager.snapshot().buffer_count, 3);
        assert_eq!(manager.snapshot().label, "");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let path = temp_config_path("invalid");
        std::fs::write(&path, "(buffer_count: 9, label: \"invalid\")").unwrap();

        let manager = TestConfig::create_manager_at(path.clone()).unwrap();
        assert_eq!(manager.snapshot(), TestConfig::default());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let path = temp_config_path("garbage");
        std::fs::write(&path, "this is not ron {").unwrap();

        assert!(TestConfig::create_manager_at(path.clone()).is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_now_writes_current_values() {
        let path = temp_config_path("save");
        let _ = std::fs::remove_file(&path);

        let manager = TestConfig::create_manager_at(path.clone()).unwrap();
        {
            let config = manager.get();
            config.write().unwrap().buffer_count = 7;
        }
        manager.save_now().unwrap();

        let reloaded = TestConfig::create_manager_at(path.clone()).unwrap();
        assert_eq!(reloaded.snapshot().buffer_count, 7);

        std::fs::remove_file(&path).unwrap();
    }
}
