use std::env;
use std::error;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("couldn't parse the value of {0:?} environment variable as UTF-8 string")]
    NotUtf8(String),

    #[error("couldn't parse the value of {0:?} environment variable: {1}")]
    ParsingFailed(String, #[source] Box<dyn error::Error + Send + Sync>),

    #[error("environment variable {0:?} is not a flag: {1:?}")]
    NotAFlag(String, String),
}

fn read_env_var(name: &str) -> Result<Option<String>, Error> {
    env::var_os(name)
        .map(|value| {
            value
                .into_string()
                .map_err(|_| Error::NotUtf8(name.to_string()))
        })
        .transpose()
}

pub fn parse_env_var<T: FromStr>(name: &str) -> Result<Option<T>, Error>
where
    T::Err: error::Error + Send + Sync + 'static,
{
    read_env_var(name)?
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|err| Error::ParsingFailed(name.to_string(), Box::new(err)))
        })
        .transpose()
}

/// Reads a boolean switch. Accepts `1/0`, `true/false`, `yes/no` and `on/off`.
pub fn parse_env_flag(name: &str) -> Result<Option<bool>, Error> {
    let Some(value) = read_env_var(name)? else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(Error::NotAFlag(name.to_string(), value)),
    }
}
