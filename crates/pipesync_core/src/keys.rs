//! Pipe identity keys.

use crate::error::{PipeError, PipeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The identity triple of a pipe: connector, metric, optional location.
///
/// Displayed and parsed as `connector:metric` or
/// `connector:metric:location`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipeKeys {
    /// The source connector the pipe's data comes from.
    pub connector: String,
    /// What the pipe measures or carries.
    pub metric: String,
    /// Optional disambiguating location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl PipeKeys {
    /// Creates keys with no location.
    pub fn new(connector: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            connector: connector.into(),
            metric: metric.into(),
            location: None,
        }
    }

    /// Sets the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Validates that connector and metric are non-empty and contain no
    /// separator characters.
    pub fn validate(&self) -> PipeResult<()> {
        for (field, value) in [("connector", &self.connector), ("metric", &self.metric)] {
            if value.is_empty() {
                return Err(PipeError::invalid_keys(format!("{field} key is empty")));
            }
            if value.contains(':') {
                return Err(PipeError::invalid_keys(format!(
                    "{field} key contains ':': {value}"
                )));
            }
        }
        if let Some(location) = &self.location {
            if location.contains(':') {
                return Err(PipeError::invalid_keys(format!(
                    "location key contains ':': {location}"
                )));
            }
        }
        Ok(())
    }

    /// A filesystem/SQL-safe slug of the triple, used for table naming.
    pub fn slug(&self) -> String {
        let mut slug = format!("{}_{}", sanitize(&self.connector), sanitize(&self.metric));
        if let Some(location) = &self.location {
            slug.push('_');
            slug.push_str(&sanitize(location));
        }
        slug
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

impl fmt::Display for PipeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}:{}:{}", self.connector, self.metric, location),
            None => write!(f, "{}:{}", self.connector, self.metric),
        }
    }
}

impl FromStr for PipeKeys {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let keys = match parts.as_slice() {
            [connector, metric] => PipeKeys::new(*connector, *metric),
            [connector, metric, location] => {
                PipeKeys::new(*connector, *metric).with_location(*location)
            }
            _ => {
                return Err(PipeError::invalid_keys(format!(
                    "expected connector:metric[:location], got {s}"
                )))
            }
        };
        keys.validate()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse() {
        let keys = PipeKeys::new("plugin_weather", "temperature").with_location("oslo");
        assert_eq!(keys.to_string(), "plugin_weather:temperature:oslo");
        let parsed: PipeKeys = keys.to_string().parse().unwrap();
        assert_eq!(parsed, keys);

        let short: PipeKeys = "sql_main:orders".parse().unwrap();
        assert_eq!(short.location, None);
    }

    #[test]
    fn validation_rejects_empty_and_separators() {
        assert!(PipeKeys::new("", "m").validate().is_err());
        assert!(PipeKeys::new("a:b", "m").validate().is_err());
        assert!("too:many:parts:here".parse::<PipeKeys>().is_err());
    }

    #[test]
    fn slug_is_sql_safe() {
        let keys = PipeKeys::new("plugin-weather", "Temp C").with_location("St. Olaf");
        assert_eq!(keys.slug(), "plugin_weather_temp_c_st__olaf");
    }
}
