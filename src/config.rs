use crate::common::{PROFILE_TABLE_NAME_DEFAULT, TABLE_NAME_DEFAULT};
use std::str::FromStr;
use thiserror::Error;

pub const COLLECTION_ID_DEFAULT: &str = "face-collection-prod";
pub const IDENTITY_INDEX_DEFAULT: &str = "EmployeeID-ObservedAt-index";
pub const MAX_CANDIDATES_DEFAULT: u32 = 1;

/// What a pipeline does with a resolved face. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Search the enrollment collection and write an attendance record.
    Attendance,
    /// Enroll the face into the collection and write an employee profile.
    Registration,
}

impl Mode {
    pub fn default_threshold(&self) -> f32 {
        match self {
            Mode::Attendance => 95.0,
            Mode::Registration => 90.0,
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attendance" => Ok(Mode::Attendance),
            "registration" => Ok(Mode::Registration),
            _ => Err(ConfigError::Invalid {
                name: "PIPELINE_MODE",
                value: s.into(),
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("MATCH_THRESHOLD must be within 0..=100, got {0}")]
    ThresholdOutOfRange(f32),
    #[error("MAX_CANDIDATES must be at least 1")]
    NoCandidates,
    #[error("DAILY_LIMIT must be at least 1 when set")]
    ZeroDailyLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub mode: Mode,
    pub collection_id: String,
    pub table_name: String,
    pub profile_table_name: String,
    /// Confidence floor on the 0..=100 scale
    pub match_threshold: f32,
    pub max_candidates: u32,
    /// Commit a `NoMatch` record instead of dropping unmatched faces
    pub audit_unmatched: bool,
    /// Max `Matched` records per identity per UTC day
    pub daily_limit: Option<u32>,
    pub identity_index: String,
}

impl PipelineConfig {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            collection_id: COLLECTION_ID_DEFAULT.into(),
            table_name: TABLE_NAME_DEFAULT.into(),
            profile_table_name: PROFILE_TABLE_NAME_DEFAULT.into(),
            match_threshold: mode.default_threshold(),
            max_candidates: MAX_CANDIDATES_DEFAULT,
            audit_unmatched: true,
            daily_limit: None,
            identity_index: IDENTITY_INDEX_DEFAULT.into(),
        }
    }

    pub fn from_env(mode: Mode) -> Result<Self, ConfigError> {
        Self::from_lookup(mode, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        mode: Mode,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::new(mode);

        if let Some(val) = lookup("COLLECTION_ID") {
            config.collection_id = val;
        }
        if let Some(val) = lookup("TABLE_NAME") {
            config.table_name = val;
        }
        if let Some(val) = lookup("PROFILE_TABLE_NAME") {
            config.profile_table_name = val;
        }
        if let Some(val) = lookup("IDENTITY_INDEX") {
            config.identity_index = val;
        }
        if let Some(val) = parse_var::<f32>(&lookup, "MATCH_THRESHOLD")? {
            config.match_threshold = val;
        }
        if let Some(val) = parse_var::<u32>(&lookup, "MAX_CANDIDATES")? {
            config.max_candidates = val;
        }
        if let Some(val) = lookup("AUDIT_UNMATCHED") {
            config.audit_unmatched = parse_bool("AUDIT_UNMATCHED", &val)?;
        }
        config.daily_limit = parse_var::<u32>(&lookup, "DAILY_LIMIT")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.match_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.match_threshold));
        }
        if self.max_candidates < 1 {
            return Err(ConfigError::NoCandidates);
        }
        if self.daily_limit == Some(0) {
            return Err(ConfigError::ZeroDailyLimit);
        }

        Ok(())
    }
}

pub fn parse_var<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(val) if val.trim().is_empty() => Ok(None),
        Some(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: val }),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.into(),
        }),
    }
}
