//! INI parsing: `Ini` -> `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields. Every
//! key is optional; missing keys keep their defaults.

use ini::{Ini, Properties};
use std::path::PathBuf;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

const SIZE_HINT: &str = "expected format like '64MB', '2GB', '512KB' or a byte count";

/// Parses an `Ini` into a `ConfigFile`, overlaying values onto the defaults.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = non_empty(section, "directory") {
            config.cache.directory = expand_tilde(v);
        }
        if let Some(v) = section.get("memory_size") {
            config.cache.memory_size = size_value("cache", "memory_size", v)?;
        }
        if let Some(v) = section.get("disk_size") {
            config.cache.disk_size = size_value("cache", "disk_size", v)?;
        }
    }

    if let Some(section) = ini.section(Some("pipeline")) {
        if let Some(v) = section.get("download_concurrency") {
            config.pipeline.download_concurrency =
                positive_value("pipeline", "download_concurrency", v)?;
        }
        if let Some(v) = section.get("decode_concurrency") {
            config.pipeline.decode_concurrency =
                positive_value("pipeline", "decode_concurrency", v)?;
        }
        if let Some(v) = section.get("pause_download") {
            config.pipeline.pause_download = bool_value("pipeline", "pause_download", v)?;
        }
    }

    if let Some(section) = ini.section(Some("network")) {
        if let Some(v) = section.get("timeout") {
            config.network.timeout = positive_value("network", "timeout", v)? as u64;
        }
    }

    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn size_value(section: &str, key: &str, value: &str) -> Result<usize, ConfigFileError> {
    parse_size(value).map_err(|_| ConfigFileError::invalid(section, key, value, SIZE_HINT))
}

fn positive_value(section: &str, key: &str, value: &str) -> Result<usize, ConfigFileError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigFileError::invalid(
            section,
            key,
            value,
            "must be a positive integer",
        )),
    }
}

fn bool_value(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigFileError::invalid(
            section,
            key,
            value,
            "must be true or false",
        )),
    }
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_gives_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_full_ini() {
        let config = parse(
            r#"
[cache]
directory = /var/cache/imgpipe
memory_size = 128MB
disk_size = 1GB

[pipeline]
download_concurrency = 4
decode_concurrency = 2
pause_download = yes

[network]
timeout = 10

[logging]
directory = /var/log/imgpipe
file = pipe.log
"#,
        )
        .unwrap();

        assert_eq!(config.cache.directory, PathBuf::from("/var/cache/imgpipe"));
        assert_eq!(config.cache.memory_size, 128 * 1024 * 1024);
        assert_eq!(config.cache.disk_size, 1024 * 1024 * 1024);
        assert_eq!(config.pipeline.download_concurrency, 4);
        assert_eq!(config.pipeline.decode_concurrency, 2);
        assert!(config.pipeline.pause_download);
        assert_eq!(config.network.timeout, 10);
        assert_eq!(config.logging.directory, PathBuf::from("/var/log/imgpipe"));
        assert_eq!(config.logging.file, "pipe.log");
    }

    #[test]
    fn test_blank_directory_keeps_default() {
        let config = parse("[cache]\ndirectory =\n").unwrap();
        assert_eq!(config.cache.directory, default_cache_directory());
    }

    #[test]
    fn test_invalid_size() {
        match parse("[cache]\ndisk_size = huge\n") {
            Err(ConfigFileError::InvalidValue {
                section,
                key,
                value,
                ..
            }) => {
                assert_eq!(section, "cache");
                assert_eq!(key, "disk_size");
                assert_eq!(value, "huge");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(matches!(
            parse("[pipeline]\ndownload_concurrency = 0\n"),
            Err(ConfigFileError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        assert!(matches!(
            parse("[pipeline]\npause_download = maybe\n"),
            Err(ConfigFileError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/cache"), home.join("cache"));
        }
    }

    #[test]
    fn test_timeout_default() {
        assert_eq!(
            parse("[network]\n").unwrap().network.timeout,
            DEFAULT_REQUEST_TIMEOUT_SECS
        );
    }
}
