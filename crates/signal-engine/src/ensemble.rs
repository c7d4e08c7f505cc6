use trading_core::SignalType;

use crate::votes::IndicatorVote;

/// Validated ensemble outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleDecision {
    pub signal_type: SignalType,
    pub confidence: f64,
    pub buy_count: usize,
    pub sell_count: usize,
}

/// Weighted mean of the agreeing indicators' strengths, as a percentage.
fn side_confidence(votes: &[IndicatorVote], side: SignalType) -> f64 {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for v in votes.iter().filter(|v| v.vote == side && v.weight > 0.0) {
        weighted += v.strength * v.weight;
        weight_sum += v.weight;
    }
    if weight_sum > 0.0 {
        weighted / weight_sum * 100.0
    } else {
        0.0
    }
}

/// Apply the asymmetric ensemble rules:
/// - BUY needs at least 3 agreeing indicators, 65% confidence and a margin
///   of 2 over the sell side; its confidence then drops 5 points
///   (empirical long-bias correction).
/// - SELL needs at least 2 agreeing indicators, 60% confidence and a simple
///   majority.
pub fn validate_ensemble(votes: &[IndicatorVote]) -> Option<EnsembleDecision> {
    let buy_count = votes.iter().filter(|v| v.vote == SignalType::Buy && v.weight > 0.0).count();
    let sell_count = votes.iter().filter(|v| v.vote == SignalType::Sell && v.weight > 0.0).count();

    let buy_confidence = side_confidence(votes, SignalType::Buy);
    let sell_confidence = side_confidence(votes, SignalType::Sell);

    if buy_count >= 3 && buy_confidence >= 65.0 && buy_count >= sell_count + 2 {
        return Some(EnsembleDecision {
            signal_type: SignalType::Buy,
            confidence: (buy_confidence - 5.0).max(0.0),
            buy_count,
            sell_count,
        });
    }

    if sell_count >= 2 && sell_confidence >= 60.0 && sell_count > buy_count {
        return Some(EnsembleDecision {
            signal_type: SignalType::Sell,
            confidence: sell_confidence,
            buy_count,
            sell_count,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(side: SignalType, strength: f64, weight: f64) -> IndicatorVote {
        IndicatorVote {
            name: "test",
            vote: side,
            strength,
            weight,
        }
    }

    #[test]
    fn buy_needs_three_agreeing_and_margin() {
        // Two strong buys: not enough indicators
        let votes = vec![v(SignalType::Buy, 0.9, 1.0), v(SignalType::Buy, 0.9, 1.0)];
        assert!(validate_ensemble(&votes).is_none());

        // Three buys but one sell each side shrinks the margin below 2
        let votes = vec![
            v(SignalType::Buy, 0.9, 1.0),
            v(SignalType::Buy, 0.9, 1.0),
            v(SignalType::Buy, 0.9, 1.0),
            v(SignalType::Sell, 0.9, 1.0),
            v(SignalType::Sell, 0.9, 1.0),
        ];
        assert!(validate_ensemble(&votes).is_none());

        // Three clean buys pass and pay the 5-point correction
        let votes = vec![
            v(SignalType::Buy, 0.8, 1.0),
            v(SignalType::Buy, 0.8, 1.0),
            v(SignalType::Buy, 0.8, 1.0),
        ];
        let d = validate_ensemble(&votes).unwrap();
        assert_eq!(d.signal_type, SignalType::Buy);
        assert!((d.confidence - 75.0).abs() < 1e-9); // 80 - 5
    }

    #[test]
    fn buy_confidence_floor_is_65() {
        let votes = vec![
            v(SignalType::Buy, 0.6, 1.0),
            v(SignalType::Buy, 0.6, 1.0),
            v(SignalType::Buy, 0.6, 1.0),
        ];
        // 60% < 65% floor
        assert!(validate_ensemble(&votes).is_none());
    }

    #[test]
    fn sell_passes_on_simple_majority() {
        let votes = vec![
            v(SignalType::Sell, 0.7, 1.0),
            v(SignalType::Sell, 0.7, 1.0),
            v(SignalType::Buy, 0.9, 1.0),
        ];
        let d = validate_ensemble(&votes).unwrap();
        assert_eq!(d.signal_type, SignalType::Sell);
        // No bias correction on the sell side
        assert!((d.confidence - 70.0).abs() < 1e-9);
    }

    #[test]
    fn sell_blocked_without_majority() {
        let votes = vec![
            v(SignalType::Sell, 0.9, 1.0),
            v(SignalType::Sell, 0.9, 1.0),
            v(SignalType::Buy, 0.2, 1.0),
            v(SignalType::Buy, 0.2, 1.0),
        ];
        assert!(validate_ensemble(&votes).is_none());
    }

    #[test]
    fn confidence_weighs_by_indicator_weight() {
        let votes = vec![
            v(SignalType::Sell, 1.0, 3.0),
            v(SignalType::Sell, 0.4, 1.0),
        ];
        let d = validate_ensemble(&votes).unwrap();
        // (1.0*3 + 0.4*1) / 4 = 0.85
        assert!((d.confidence - 85.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weight_holds_are_ignored() {
        let votes = vec![
            v(SignalType::Buy, 0.8, 1.0),
            v(SignalType::Buy, 0.8, 1.0),
            v(SignalType::Buy, 0.8, 1.0),
            v(SignalType::Hold, 0.0, 0.0),
            v(SignalType::Hold, 0.0, 0.0),
        ];
        let d = validate_ensemble(&votes).unwrap();
        assert_eq!(d.buy_count, 3);
    }
}
