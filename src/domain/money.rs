use {
    super::error::PipelineError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Amount in minor currency units (paise). Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub fn new(minor: i64) -> Result<Self, PipelineError> {
        if minor <= 0 {
            return Err(PipelineError::Validation(format!(
                "amount must be positive, got: {minor}"
            )));
        }
        Ok(Self(minor))
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    /// Parse a major-unit decimal string (`"249.00"`, `"249.5"`, `"249"`)
    /// without going through floats. More than two decimals is rejected.
    pub fn from_major_str(raw: &str) -> Result<Self, PipelineError> {
        let invalid = || PipelineError::Validation(format!("invalid major amount: {raw}"));
        let raw_trimmed = raw.trim();
        let (whole, frac) = raw_trimmed.split_once('.').unwrap_or((raw_trimmed, ""));
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || frac.len() > 2 || !all_digits(whole) || !all_digits(frac) {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };
        let minor = whole
            .checked_mul(100)
            .and_then(|m| m.checked_add(frac))
            .ok_or_else(invalid)?;
        Self::new(minor)
    }

    /// Exact major-unit rendering (`24900` -> `"249.00"`). No floats involved.
    pub fn to_major_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl TryFrom<i64> for MinorUnits {
    type Error = PipelineError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MinorUnits> for i64 {
    fn from(value: MinorUnits) -> Self {
        value.0
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
