//! INI serialization: `ConfigFile` -> commented INI string.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Renders a commented INI that round-trips through the parser.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[cache]
; Disk cache directory for downloaded bytes
; If empty, defaults to the platform cache directory (e.g. ~/.cache/imgpipe)
directory = {}
; Memory cache size for decoded images (default: 64MB)
; Supports: KB, MB, GB suffixes or a plain byte count
memory_size = {}
; Disk cache size (default: 256MB)
disk_size = {}

[pipeline]
; Concurrent downloads across all requests (default: 8)
download_concurrency = {}
; Concurrent decodes across all requests (default: number of CPU cores)
decode_concurrency = {}
; Serve only from cache; requests that would hit the network are canceled
pause_download = {}

[network]
; HTTP timeout per request, in seconds (default: 30)
timeout = {}

[logging]
; Log directory and file name
directory = {}
file = {}
"#,
        path_to_string(&config.cache.directory),
        format_size(config.cache.memory_size),
        format_size(config.cache.disk_size),
        config.pipeline.download_concurrency,
        config.pipeline.decode_concurrency,
        config.pipeline.pause_download,
        config.network.timeout,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

/// Writes paths under the home directory as `~/...`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            return format!("~/{}", rest.display());
        }
    }
    path.display().to_string()
}
