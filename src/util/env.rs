use std::sync::LazyLock;

use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);
pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = ENV_VARS.get_or_try_init(|| async { Env::new() }).await?;
    Ok(match var {
        Var::BotToken => &vars.bot_token,
        Var::InternalToken => &vars.internal_token,
        Var::DatabaseUrl => &vars.database_url,
        Var::ApiPort => &vars.api_port,
        Var::DefaultTimezone => &vars.default_timezone,
        Var::GiftXp => &vars.gift_xp,
        Var::ConnectPrompt => &vars.connect_prompt,
        Var::SourceStatusUrl => &vars.source_status_url,
    })
}

#[derive(Debug, Clone)]
pub struct Env {
    pub bot_token: String,
    pub internal_token: String,
    pub database_url: String,
    pub api_port: String,
    pub default_timezone: String,
    pub gift_xp: String,
    pub connect_prompt: String,
    pub source_status_url: String,
}

#[derive(Debug)]
pub enum Var {
    BotToken,
    InternalToken,
    DatabaseUrl,
    ApiPort,
    DefaultTimezone,
    GiftXp,
    ConnectPrompt,
    SourceStatusUrl,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

const DEFAULT_DB_URL: &str = "sqlite://tokboard.db?mode=rwc";
const DEFAULT_PROMPT: &str =
    "link your live handle with the connect command to appear on the board and earn roles";
const DEFAULT_STATUS_URL: &str = "https://www.tiktok.com";

impl Env {
    pub fn new() -> EnvResult<Self> {
        // pull .env into the process environment first so both sources
        // resolve through one lookup
        _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> EnvResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> EnvResult<String> {
            lookup(name).ok_or_else(|| EnvErr::MissingValue(name.to_string()))
        };
        let defaulted =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            internal_token: required("INTERNAL_TOKEN")?,
            database_url: defaulted("DATABASE_URL", DEFAULT_DB_URL),
            api_port: defaulted("API_PORT", "8080"),
            default_timezone: defaulted("DEFAULT_TIMEZONE", "Etc/UTC"),
            gift_xp: defaulted("GIFT_XP", "100"),
            connect_prompt: defaulted("CONNECT_PROMPT", DEFAULT_PROMPT),
            source_status_url: defaulted("SOURCE_STATUS_URL", DEFAULT_STATUS_URL),
        })
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error("missing required environment value '{0}'")]
    MissingValue(String),

    #[error("malformed environment value '{0}': {1}")]
    Malformed(String, String),
}
