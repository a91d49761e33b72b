use serde::de::DeserializeOwned;

/// Combined diagnostics produced while loading and validating a Ward config.
///
/// Loading is best effort: callers always get a `WardConfig` when the TOML
/// deserializes, plus whatever problems were found along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDiagnostics {
    /// Keys the schema does not recognize, as full dotted paths (`monitor.warn_pct`).
    pub unknown_keys: Vec<String>,
    /// Values that are accepted but probably not what the user meant.
    pub warnings: Vec<ConfigWarning>,
    /// Values that would make the runtime misbehave.
    pub errors: Vec<ConfigValidationError>,
}

impl ConfigDiagnostics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unknown_keys.is_empty() && self.warnings.is_empty() && self.errors.is_empty()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn extend_validation(&mut self, validation: ValidationDiagnostics) {
        self.warnings.extend(validation.warnings);
        self.errors.extend(validation.errors);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationDiagnostics {
    pub warnings: Vec<ConfigWarning>,
    pub errors: Vec<ConfigValidationError>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    InvalidValue {
        toml_path: String,
        message: String,
    },
    LoggingLevelInvalid {
        value: String,
        normalized: String,
    },
    /// A watch action list names an id the scheduler catalog does not know.
    UnknownAction {
        toml_path: String,
        action: String,
    },
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    InvalidValue {
        toml_path: String,
        message: String,
    },
    ThresholdsOutOfOrder {
        section: &'static str,
        warning_pct: f64,
        critical_pct: f64,
    },
}

pub(crate) fn deserialize_toml_with_unknown_keys<T: DeserializeOwned>(
    text: &str,
) -> Result<(T, Vec<String>), toml::de::Error> {
    let mut unknown = Vec::<String>::new();
    let deserializer = toml::de::Deserializer::new(text);
    let value = serde_ignored::deserialize(deserializer, |path| {
        unknown.push(normalize_serde_ignored_path(path));
    })?;
    unknown.sort();
    unknown.dedup();
    Ok((value, unknown))
}

fn normalize_serde_ignored_path(path: serde_ignored::Path) -> String {
    // Root paths render with a leading `.`; Ward's config has no arrays, so
    // nothing else needs rewriting.
    path.to_string().trim_start_matches('.').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn unknown_key_paths_are_dotted() {
        #[derive(Debug, Deserialize)]
        struct Root {
            #[allow(dead_code)]
            monitor: Monitor,
        }

        #[derive(Debug, Deserialize)]
        struct Monitor {
            #[allow(dead_code)]
            warning_pct: f64,
        }

        let text = r#"
[monitor]
warning_pct = 80
warn_pct = 1
"#;

        let (_value, unknown) = deserialize_toml_with_unknown_keys::<Root>(text).expect("parse");
        assert_eq!(unknown, vec!["monitor.warn_pct"]);
    }
}
