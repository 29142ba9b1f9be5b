#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("reading settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// `field` is the camelCase path as written in the settings file.
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// The offending field, for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { field, .. } => Some(*field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_names_the_field() {
        let err = SettingsError::invalid("urgency.lowPdrPenalty", "must be within (0, 1]");
        assert_eq!(err.field(), Some("urgency.lowPdrPenalty"));
        assert_eq!(err.to_string(), "urgency.lowPdrPenalty: must be within (0, 1]");
    }

    #[test]
    fn io_and_json_have_no_field() {
        let io: SettingsError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(io.field().is_none());
        let json: SettingsError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(json.to_string().starts_with("settings JSON"));
    }
}
