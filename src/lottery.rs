//! Winner selection.

use crate::protocol::Bet;

/// Number drawn by the national lottery
pub const DEFAULT_WINNING_NUMBER: u32 = 7574;

/// Decides whether a single bet won the draw.
pub trait WinnerPredicate: Send + Sync {
    fn is_winner(&self, bet: &Bet) -> bool;
}

/// A bet wins when its number equals the drawn number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinningNumber(pub u32);

impl Default for WinningNumber {
    fn default() -> Self {
        WinningNumber(DEFAULT_WINNING_NUMBER)
    }
}

impl WinnerPredicate for WinningNumber {
    fn is_winner(&self, bet: &Bet) -> bool {
        bet.number().trim().parse::<u32>().ok() == Some(self.0)
    }
}

impl<F> WinnerPredicate for F
where
    F: Fn(&Bet) -> bool + Send + Sync,
{
    fn is_winner(&self, bet: &Bet) -> bool {
        self(bet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::bet::sample_bet;

    #[test]
    fn test_winning_number() {
        let draw = WinningNumber::default();
        assert!(draw.is_winner(&sample_bet("1", "30904465", "7574")));
        assert!(draw.is_winner(&sample_bet("1", "30904465", "07574")));
        assert!(!draw.is_winner(&sample_bet("1", "30904465", "7575")));
        assert!(!draw.is_winner(&sample_bet("1", "30904465", "seven")));
    }

    #[test]
    fn test_closure_predicate() {
        let even = |bet: &Bet| bet.document().ends_with(['0', '2', '4', '6', '8']);
        assert!(even.is_winner(&sample_bet("1", "10", "1")));
        assert!(!even.is_winner(&sample_bet("1", "11", "1")));
    }
}
