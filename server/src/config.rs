use std::path::PathBuf;

/// Process configuration, read once at startup from the environment.
/// Mirrors the teacher's preference for plain `std::env::var` parsing over a
/// config-file/clap layer -- this hub takes no CLI arguments (spec'd as
/// "none beyond invocation with environment variables").
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub debug_logs: bool,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);
        let debug_logs = std::env::var("REALTIME_DEBUG_LOGS")
            .map(|value| value == "true")
            .unwrap_or(false);
        let data_dir = std::env::var("REALTIME_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/rooms"));
        let log_dir = data_dir
            .parent()
            .map(|parent| parent.join("logs"))
            .unwrap_or_else(|| PathBuf::from("data/logs"));
        Self { port, debug_logs, data_dir, log_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        std::env::remove_var("PORT");
        std::env::remove_var("REALTIME_DEBUG_LOGS");
        std::env::remove_var("REALTIME_DATA_DIR");
        let config = Config::from_env();
        assert_eq!(config.port, 8080);
        assert!(!config.debug_logs);
        assert_eq!(config.data_dir, PathBuf::from("data/rooms"));
    }
}
