use crate::analysis::types::{AnalysisResult, ContractKind, ContractSpec, DigitDistribution};
use crate::data::types::TickBuffer;
use crate::error::ValidationError;

/// Last digit of the price's fixed 2-decimal representation.
///
/// This is a formatting policy, not arithmetic rounding: `-3.1` → `"-3.10"` → 0.
/// Values exactly halfway between two cents round away from zero
/// (`0.125` → `"0.13"`).
pub fn last_digit(price: f64) -> Option<u8> {
    // exact halves of a cent are odd multiples of 1/8
    let eighths = price.abs() * 8.0;
    if eighths.fract() == 0.0 && eighths % 2.0 == 1.0 {
        let cents = (eighths as u128 * 25 + 1) / 2;
        return Some((cents % 10) as u8);
    }

    let formatted = format!("{:.2}", price);
    formatted
        .chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
}

/// Empirical win/loss probabilities for `spec` over adjacent tick pairs.
pub fn analyze(buffer: &TickBuffer, spec: &ContractSpec) -> Result<AnalysisResult, ValidationError> {
    let target = spec.validate()?;
    let (win_label, loss_label) = spec.labels();

    let prices: Vec<f64> = buffer.prices().collect();
    let digits: Vec<Option<u8>> = prices.iter().map(|p| last_digit(*p)).collect();

    let mut win_count = 0usize;
    let mut total_count = 0usize;

    for i in 1..prices.len() {
        let outcome = match spec.kind {
            ContractKind::RiseFall => {
                let (prev, current) = (prices[i - 1], prices[i]);
                if current > prev {
                    Some(true)
                } else if current < prev {
                    Some(false)
                } else {
                    // tie: out of the denominator
                    None
                }
            }
            ContractKind::MatchesDiffers => Some(digits[i] == target),
            ContractKind::OverUnder => Some(match (digits[i], target) {
                (Some(d), Some(t)) => d > t,
                _ => false,
            }),
            ContractKind::EvenOdd => Some(digits[i].map_or(false, |d| d % 2 == 0)),
        };

        if let Some(win) = outcome {
            total_count += 1;
            if win {
                win_count += 1;
            }
        }
    }

    let (win_probability, loss_probability) = if total_count == 0 {
        (0.0, 0.0)
    } else {
        let win = win_count as f64 / total_count as f64 * 100.0;
        (win, 100.0 - win)
    };

    Ok(AnalysisResult {
        win_label,
        win_probability,
        loss_label,
        loss_probability,
        win_count,
        total_count,
    })
}

/// Share of each last digit across every tick in the buffer.
pub fn digit_distribution(buffer: &TickBuffer) -> DigitDistribution {
    let mut counts = [0usize; 10];
    let total = buffer.len();

    for digit in buffer.prices().filter_map(last_digit) {
        counts[digit as usize] += 1;
    }

    let mut percentages = [0.0f64; 10];
    if total > 0 {
        for (pct, count) in percentages.iter_mut().zip(counts.iter()) {
            *pct = *count as f64 / total as f64 * 100.0;
        }
    }

    DigitDistribution {
        counts,
        percentages,
        total,
    }
}
