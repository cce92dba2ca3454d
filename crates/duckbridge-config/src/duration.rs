use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Deserialize a human duration such as `"10s"` or `"5m"`
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(raw.as_str()).map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

/// Optional variant of [`deserialize`]
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| {
            duration_str::parse(raw.as_str())
                .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
        })
        .transpose()
}
