//! Fight forecast.
//!
//! Turns alternate with the character striking first. A fight that is not
//! decided within [`MAX_TURNS`] total turns is a loss.

use super::catalog::MonsterInfo;
use super::character::CharacterState;

pub const MAX_TURNS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FightForecast {
    pub win: bool,
    /// Character turns needed to defeat the monster.
    pub turns: u32,
    /// Character HP left when the fight ends (0 on a loss).
    pub hp_left: i64,
}

fn scaled(base: i64, bonus_pct: i64, resist_pct: i64) -> i64 {
    let boosted = base as f64 * (1.0 + bonus_pct as f64 / 100.0);
    (boosted * (1.0 - resist_pct as f64 / 100.0)).round().max(0.0) as i64
}

fn turns_to_kill(hp: i64, per_turn: i64) -> Option<u32> {
    if per_turn <= 0 {
        return None;
    }
    Some(((hp + per_turn - 1) / per_turn) as u32)
}

/// Forecast a fight between the character (current gear, full HP) and a monster.
pub fn simulate(character: &CharacterState, monster: &MonsterInfo) -> FightForecast {
    let stats = &character.stats;
    let outgoing: i64 = stats
        .attack
        .values()
        .iter()
        .zip(stats.damage.values())
        .zip(monster.resistance.values())
        .map(|((atk, dmg), res)| scaled(*atk, dmg, res))
        .sum();
    let incoming: i64 = monster
        .attack
        .values()
        .iter()
        .zip(stats.resistance.values())
        .map(|(atk, res)| scaled(*atk, 0, res))
        .sum();

    let hp = stats.max_hp.max(character.hp);
    let loss = FightForecast {
        win: false,
        turns: MAX_TURNS,
        hp_left: 0,
    };

    let Some(our_turns) = turns_to_kill(monster.hp, outgoing).map(|t| t.max(1)) else {
        return loss;
    };
    if our_turns * 2 - 1 > MAX_TURNS {
        return loss;
    }
    // Monster swings once less than we do when we land the final blow.
    let taken = incoming * i64::from(our_turns - 1);
    if taken >= hp {
        return loss;
    }
    FightForecast {
        win: true,
        turns: our_turns,
        hp_left: hp - taken,
    }
}
