//! CLI-over-file settings merge

use std::path::PathBuf;

use crate::config::Settings;

/// Values the CLI layer may force over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db: Option<PathBuf>,
    pub threads: Option<usize>,
    pub batch_size: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub max_depth: Option<u32>,
    pub ignore: Option<Vec<String>>,
}

pub fn merge_cli_with_settings(mut settings: Settings, overrides: CliOverrides) -> Settings {
    if let Some(db) = overrides.db {
        settings.db = db;
    }
    if let Some(threads) = overrides.threads {
        settings.threads = threads;
    }
    if let Some(batch_size) = overrides.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(capacity) = overrides.queue_capacity {
        settings.queue_capacity = Some(capacity);
    }
    if let Some(max_depth) = overrides.max_depth {
        settings.max_depth = max_depth;
    }
    if let Some(ignore) = overrides.ignore {
        settings.ignore = ignore;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_overrides_keeps_settings() {
        let settings = Settings::default();
        let merged = merge_cli_with_settings(settings.clone(), CliOverrides::default());
        assert_eq!(merged, settings);
    }

    #[test]
    fn cli_values_win_over_file_values() {
        let mut settings = Settings::default();
        settings.batch_size = 10;
        settings.ignore = vec!["dist".into()];

        let merged = merge_cli_with_settings(
            settings,
            CliOverrides {
                batch_size: Some(99),
                ignore: Some(vec!["build".into()]),
                max_depth: Some(5),
                ..CliOverrides::default()
            },
        );
        assert_eq!(merged.batch_size, 99);
        assert_eq!(merged.ignore, vec!["build".to_string()]);
        assert_eq!(merged.max_depth, 5);
    }
}
