//! Team size targets.

/// How a headcount should be divided between the sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamSplit {
    pub attackers: usize,
    pub defenders: usize,
}

/// Computes the attacker/defender target for `total` players.
///
/// The attacker count is `total × ratio` rounded half away from zero, then
/// clamped to `[1, total - 1]` so neither side is empty. With
/// `force_even` set and `total` a multiple of 10 the ratio is 0.5.
///
/// A single player is an attacker; zero players split as zero.
pub fn team_split(total: usize, ratio: f64, force_even: bool) -> TeamSplit {
    let attackers = match total {
        0 => 0,
        1 => 1,
        _ => {
            let ratio = if force_even && total % 10 == 0 {
                0.5
            } else {
                ratio.clamp(0.0, 1.0)
            };
            let raw = (total as f64 * ratio).round() as usize;
            raw.clamp(1, total - 1)
        }
    };

    TeamSplit {
        attackers,
        defenders: total - attackers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_split_force_even_on_multiple_of_ten() {
        let split = team_split(10, 0.45, true);
        assert_eq!(split, TeamSplit { attackers: 5, defenders: 5 });
    }

    #[test]
    fn test_team_split_without_force_even_uses_ratio() {
        // 4.5 rounds away from zero.
        assert_eq!(team_split(10, 0.45, false).attackers, 5);
        assert_eq!(team_split(9, 0.45, true).attackers, 4);
        assert_eq!(team_split(5, 0.45, true).attackers, 2);
    }

    #[test]
    fn test_team_split_half_rounds_away_from_zero() {
        // 3 × 0.5 = 1.5 → 2
        assert_eq!(team_split(3, 0.5, false).attackers, 2);
    }

    #[test]
    fn test_team_split_never_empties_a_side() {
        assert_eq!(team_split(2, 0.0, false), TeamSplit { attackers: 1, defenders: 1 });
        assert_eq!(team_split(4, 1.0, false), TeamSplit { attackers: 3, defenders: 1 });
    }

    #[test]
    fn test_team_split_tiny_counts() {
        assert_eq!(team_split(0, 0.45, true), TeamSplit { attackers: 0, defenders: 0 });
        assert_eq!(team_split(1, 0.45, true), TeamSplit { attackers: 1, defenders: 0 });
    }
}
