#[derive(serde::Deserialize, Debug)]
pub struct Env {
    pub environment_name: String,
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

impl Env {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(envy::prefixed("ENV_").from_env::<Self>()?)
    }

    pub fn reports_to_sentry(&self) -> bool {
        self.environment_name != "local" && self.sentry_dsn.is_some()
    }
}
