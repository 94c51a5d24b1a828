use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use weld::{Dependencies, InjectionToken, Provider, StdError};

/// Token of the application [`Config`], provided by [`base_module`](crate::base_module).
pub static CONFIG: LazyLock<InjectionToken<Arc<Config>>> =
    LazyLock::new(|| InjectionToken::new("CONFIG"));

/// JSON configuration split into named sections.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub(crate) configs: BTreeMap<String, serde_json::Value>,
}

/// Typed configuration section stored under a fixed key.
pub trait ConfigSection: DeserializeOwned {
    fn key() -> &'static str;
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserializes the section `name`. A missing section deserializes from
    /// `null`, so optional sections can be read as `Option<T>`.
    pub fn get<T>(&self, name: impl AsRef<str>) -> Result<T, StdError>
    where
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(
            self.configs
                .get(name.as_ref())
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        )?)
    }

    pub fn section<T>(&self) -> Result<T, StdError>
    where
        T: ConfigSection,
    {
        self.get(T::key())
    }

    pub fn set<T>(&mut self, name: impl Into<String>, value: T) -> Result<(), StdError>
    where
        T: Serialize,
    {
        self.configs
            .insert(name.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `value` can not be represented as JSON.
    pub fn with<T>(mut self, name: impl Into<String>, value: T) -> Self
    where
        T: Serialize,
    {
        self.configs
            .insert(name.into(), serde_json::to_value(value).unwrap());
        self
    }

    /// Fallible form of [`with`](Self::with).
    pub fn try_with<T>(mut self, name: impl Into<String>, value: T) -> Result<Self, StdError>
    where
        T: Serialize,
    {
        self.set(name, value)?;
        Ok(self)
    }

    /// Deep-merges `other` into `self`: objects are merged key by key, arrays
    /// are concatenated and everything else is replaced.
    pub fn merge_from(&mut self, other: Self) -> Result<(), StdError> {
        for (key, value) in other.configs {
            let entry = self.configs.entry(key);
            merge_json_from(entry.or_insert(serde_json::Value::Null), value)?;
        }
        Ok(())
    }

    pub fn parse<T>(text: T) -> Result<Self, StdError>
    where
        T: AsRef<str>,
    {
        Ok(serde_json::from_str(text.as_ref())?)
    }

    pub async fn parse_file(path: impl AsRef<Path>) -> Result<Self, StdError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(text)
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }
}

/// Binds `token` to the section `T` read from the [`CONFIG`] singleton.
///
/// ```rust
/// use std::sync::Arc;
/// use serde::Deserialize;
/// use weld::{InjectionToken, Testing};
/// use weld_base::{Config, ConfigSection, base_module, config_section_provider};
///
/// #[derive(Deserialize)]
/// struct ServerConfig {
///     port: u16,
/// }
///
/// impl ConfigSection for ServerConfig {
///     fn key() -> &'static str {
///         "server"
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let server = InjectionToken::<Arc<ServerConfig>>::new("SERVER_CONFIG");
/// let config = Config::parse(r#"{"server": {"port": 8080}}"#)?;
///
/// let container = Testing::create()
///     .import(base_module(config))
///     .provider(config_section_provider(&server))
///     .compile()
///     .await?;
///
/// assert_eq!(container.get(&server).await?.port, 8080);
/// # Ok(())
/// # }
/// ```
pub fn config_section_provider<T>(token: &InjectionToken<Arc<T>>) -> Provider
where
    T: ConfigSection + Send + Sync + 'static,
{
    Provider::provide(token).use_factory(Dependencies::new().inject(&*CONFIG), |resolved| {
        let config: Arc<Config> = resolved.get(0)?;
        Ok(Arc::new(config.section::<T>()?))
    })
}

fn merge_json_from(lhs: &mut serde_json::Value, rhs: serde_json::Value) -> Result<(), StdError> {
    match lhs {
        serde_json::Value::Object(l) => match rhs {
            serde_json::Value::Object(r) => {
                for (key, value) in r {
                    let entry = l.entry(key);
                    merge_json_from(entry.or_insert(serde_json::Value::Null), value)?;
                }
            }
            _ => *lhs = rhs,
        },
        serde_json::Value::Array(l) => match rhs {
            serde_json::Value::Array(r) => {
                l.extend(r);
            }
            _ => *lhs = rhs,
        },
        _ => *lhs = rhs,
    }
    Ok(())
}
