use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address
    pub bind_addr: String,

    /// Port to listen on
    pub port: u16,

    /// Name the server uses as the prefix of its own replies
    pub server_name: String,

    /// Message of the day, one entry per line
    pub motd: Vec<String>,

    /// Maximum simultaneous connections
    pub max_connections: usize,

    /// Lines that may wait in a client's outbound queue before new ones are
    /// dropped
    pub write_queue_size: usize,

    /// Initial write buffer capacity (per connection)
    pub connection_buffer_size: usize,

    /// TCP nodelay
    pub tcp_nodelay: bool,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 6667,
            server_name: "irc.localhost".to_string(),
            motd: vec!["Welcome to ircd-server.".to_string()],
            max_connections: 1024,
            write_queue_size: 256,
            connection_buffer_size: 4 * 1024, // 4KB
            tcp_nodelay: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing keys take their default value.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ircd_server::Config;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::from_file("config.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be > 0");
        }

        if self.server_name.is_empty() || self.server_name.contains(' ') {
            anyhow::bail!("server_name must be non-empty and contain no spaces");
        }

        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be > 0");
        }

        if self.write_queue_size == 0 {
            anyhow::bail!("write_queue_size must be > 0");
        }

        if self.connection_buffer_size < 512 {
            anyhow::bail!("connection_buffer_size must be >= 512");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server_name = "irc example".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.write_queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("port = 7000\nserver_name = \"irc.test\"\n").unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.server_name, "irc.test");
        assert_eq!(config.write_queue_size, Config::default().write_queue_size);
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("ircd-config-{}.toml", std::process::id()));
        let mut config = Config::default();
        config.motd = vec!["line one".to_string(), "line two".to_string()];
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.motd, config.motd);
        assert_eq!(loaded.port, config.port);
    }
}
