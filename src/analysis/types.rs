use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractKind {
    RiseFall,
    MatchesDiffers,
    OverUnder,
    EvenOdd,
}

impl ContractKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::RiseFall => "RISE_FALL",
            ContractKind::MatchesDiffers => "MATCHES_DIFFERS",
            ContractKind::OverUnder => "OVER_UNDER",
            ContractKind::EvenOdd => "EVEN_ODD",
        }
    }

    /// Kinds that classify by last digit rather than price movement.
    pub fn is_digit_based(&self) -> bool {
        !matches!(self, ContractKind::RiseFall)
    }

    pub fn requires_target_digit(&self) -> bool {
        matches!(self, ContractKind::MatchesDiffers | ContractKind::OverUnder)
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RISE_FALL" => Ok(ContractKind::RiseFall),
            "MATCHES_DIFFERS" => Ok(ContractKind::MatchesDiffers),
            "OVER_UNDER" => Ok(ContractKind::OverUnder),
            "EVEN_ODD" => Ok(ContractKind::EvenOdd),
            other => Err(format!("Unknown contract kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub kind: ContractKind,
    #[serde(default)]
    pub target_digit: Option<u8>,
}

impl ContractSpec {
    pub fn new(kind: ContractKind, target_digit: Option<u8>) -> Self {
        Self { kind, target_digit }
    }

    pub fn rise_fall() -> Self {
        Self::new(ContractKind::RiseFall, None)
    }

    pub fn matches_differs(digit: u8) -> Self {
        Self::new(ContractKind::MatchesDiffers, Some(digit))
    }

    pub fn over_under(digit: u8) -> Self {
        Self::new(ContractKind::OverUnder, Some(digit))
    }

    pub fn even_odd() -> Self {
        Self::new(ContractKind::EvenOdd, None)
    }

    /// The target digit the kind needs, or `None` for kinds that ignore it.
    pub fn validate(&self) -> Result<Option<u8>, ValidationError> {
        if !self.kind.requires_target_digit() {
            return Ok(None);
        }
        match self.target_digit {
            None => Err(ValidationError::MissingTargetDigit(self.kind)),
            Some(d) if d > 9 => Err(ValidationError::TargetDigitOutOfRange(d)),
            Some(d) => Ok(Some(d)),
        }
    }

    /// Win/loss labels as shown next to the percentages.
    pub fn labels(&self) -> (String, String) {
        let digit = self.target_digit.map(|d| d.to_string()).unwrap_or_default();
        match self.kind {
            ContractKind::RiseFall => ("RISE".to_string(), "FALL".to_string()),
            ContractKind::MatchesDiffers => (format!("MATCHES {}", digit), format!("DIFFERS {}", digit)),
            ContractKind::OverUnder => (format!("OVER {}", digit), format!("UNDER {}", digit)),
            ContractKind::EvenOdd => ("EVEN".to_string(), "ODD".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub win_label: String,
    pub win_probability: f64,
    pub loss_label: String,
    pub loss_probability: f64,
    pub win_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigitDistribution {
    pub counts: [usize; 10],
    pub percentages: [f64; 10],
    pub total: usize,
}

impl DigitDistribution {
    pub fn percentage(&self, digit: u8) -> f64 {
        self.percentages.get(digit as usize).copied().unwrap_or(0.0)
    }
}

/// Everything produced by one completed request, delivered in one piece.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub request_id: u64,
    pub symbol: String,
    pub contract: ContractSpec,
    pub tick_count: usize,
    /// Server time of the newest tick, when the history carried times.
    pub last_tick_epoch: Option<i64>,
    pub result: AnalysisResult,
    pub distribution: Option<DigitDistribution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target_digit() {
        assert_eq!(ContractSpec::rise_fall().validate(), Ok(None));
        assert_eq!(ContractSpec::new(ContractKind::EvenOdd, Some(42)).validate(), Ok(None));
        assert_eq!(ContractSpec::over_under(9).validate(), Ok(Some(9)));
        assert_eq!(
            ContractSpec::new(ContractKind::MatchesDiffers, None).validate(),
            Err(ValidationError::MissingTargetDigit(ContractKind::MatchesDiffers))
        );
        assert_eq!(
            ContractSpec::matches_differs(10).validate(),
            Err(ValidationError::TargetDigitOutOfRange(10))
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(ContractSpec::matches_differs(5).labels(), ("MATCHES 5".to_string(), "DIFFERS 5".to_string()));
        assert_eq!(ContractSpec::over_under(4).labels(), ("OVER 4".to_string(), "UNDER 4".to_string()));
        assert_eq!(ContractSpec::rise_fall().labels(), ("RISE".to_string(), "FALL".to_string()));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("over_under".parse::<ContractKind>(), Ok(ContractKind::OverUnder));
        assert!("DIGIT_SUM".parse::<ContractKind>().is_err());
        assert!(!ContractKind::RiseFall.is_digit_based());
        assert!(ContractKind::EvenOdd.is_digit_based());
    }
}
