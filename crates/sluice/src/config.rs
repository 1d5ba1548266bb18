use serde::Deserialize;

/// Optional on-disk configuration, looked up at
/// `{config_dir}/sluice/config.toml`.
///
/// Every field is optional; CLI flags and environment variables take
/// precedence.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub rest_url: Option<String>,
    /// Domain assigned to tunnels created with neither a name nor domains.
    pub default_domain: Option<String>,
}

impl FileConfig {
    /// Load the default config file, or an empty config when there is none.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = dirs::config_dir()
            .map(|dir| dir.join("sluice").join("config.toml"))
            .filter(|path| path.exists());

        match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                let content = std::fs::read_to_string(&path)?;
                Ok(toml::from_str(&content)?)
            }
            None => Ok(Self::default()),
        }
    }
}
