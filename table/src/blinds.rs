//! Blind schedule construction.
//!
//! When a target game time is configured, the schedule ramps blinds through
//! two phases plus an overtime tail: a linear opening phase, a geometric
//! middle phase that reaches the starting stack, and 1.5x overtime levels
//! until the big blind passes three starting stacks. Every level is snapped
//! to the standard tournament blind set.

/// Significant digits of the standard blind set, times ten.
/// The full set is `{f * 10^d : f in {1, 1.5, 2, 2.5, 3, 4, 5, 6, 8}, d in 0..=5}`.
const FACTORS_X10: [u64; 9] = [10, 15, 20, 25, 30, 40, 50, 60, 80];

/// All integral standard blind values, ascending.
fn standard_values() -> Vec<u32> {
    let mut values = Vec::new();
    for d in 0..=5u32 {
        let scale = 10u64.pow(d);
        for f in FACTORS_X10 {
            let x10 = f * scale;
            if x10 % 10 == 0 {
                values.push((x10 / 10) as u32);
            }
        }
    }
    values.sort_unstable();
    values.dedup();
    values
}

/// Snap `v` to the nearest standard blind value. Equidistant picks the
/// lower value.
pub fn nice_blind(v: u32) -> u32 {
    let values = standard_values();
    let mut best = values[0];
    let mut best_diff = u64::MAX;
    for &candidate in &values {
        let diff = (candidate as i64 - v as i64).unsigned_abs();
        // Strict < keeps the lower candidate on ties (ascending scan).
        if diff < best_diff {
            best = candidate;
            best_diff = diff;
        }
    }
    best
}

/// Smallest standard value strictly above `v`, or `v + 1` past the top of
/// the set.
fn next_standard_above(v: u32) -> u32 {
    standard_values()
        .into_iter()
        .find(|&candidate| candidate > v)
        .unwrap_or(v + 1)
}

fn push_level(schedule: &mut Vec<(u32, u32)>, bb: u32) {
    let sb = (bb / 2).max(1);
    // Drop consecutive duplicates.
    if schedule.last() != Some(&(sb, bb)) {
        schedule.push((sb, bb));
    }
}

/// Build the full blind schedule for a timed game.
///
/// Returns `[(small_blind, big_blind)]`, one entry per level. With
/// `target_hours == 0` or `level_duration_minutes == 0` the schedule is the
/// single opening level (fixed blinds).
pub fn build_schedule(
    starting_chips: u32,
    level_duration_minutes: u32,
    target_hours: u32,
) -> Vec<(u32, u32)> {
    let bb_initial = nice_blind(starting_chips / 100).max(2);
    let mut schedule: Vec<(u32, u32)> = Vec::new();

    if target_hours == 0 || level_duration_minutes == 0 {
        push_level(&mut schedule, bb_initial);
        return schedule;
    }

    let total_minutes = target_hours * 60;
    let n = (total_minutes / level_duration_minutes).max(3) as usize;

    // Phase 1: linear ramp over the first half of the scheduled levels.
    let phase1_count = (n + 1) / 2;
    for i in 0..phase1_count {
        push_level(&mut schedule, nice_blind(bb_initial * (i as u32 + 1)));
    }
    let last_phase1_bb = schedule.last().map(|(_, bb)| *bb).unwrap_or(bb_initial);

    // Phase 2: geometric ramp from the phase-1 endpoint to the starting
    // stack, filling the remaining levels up to n + 2.
    let phase2_count = n + 2 - phase1_count;
    let ratio = if phase2_count > 1 {
        (starting_chips as f64 / last_phase1_bb as f64)
            .powf(1.0 / (phase2_count as f64 - 1.0))
            .max(1.2)
    } else {
        1.5
    };
    for i in 1..=phase2_count {
        let raw = last_phase1_bb as f64 * ratio.powi(i as i32);
        push_level(&mut schedule, nice_blind(raw.round() as u32));
    }

    // Phase 3: overtime. Keep multiplying by 1.5 until the big blind reaches
    // three starting stacks, forcing strict growth where snapping stalls.
    let ceiling = starting_chips.saturating_mul(3);
    loop {
        let last_bb = schedule.last().map(|(_, bb)| *bb).unwrap_or(bb_initial);
        if last_bb >= ceiling {
            break;
        }
        let mut bb = nice_blind(last_bb + last_bb / 2);
        if bb <= last_bb {
            bb = next_standard_above(last_bb);
        }
        push_level(&mut schedule, bb);
    }

    schedule
}

/// Append one more level to a schedule that play has outlived: 1.5x the
/// last big blind, snapped, strictly increasing.
pub fn extend_schedule(schedule: &mut Vec<(u32, u32)>) {
    let last_bb = schedule.last().map(|(_, bb)| *bb).unwrap_or(2);
    let mut bb = nice_blind(last_bb + last_bb / 2);
    if bb <= last_bb {
        bb = next_standard_above(last_bb);
    }
    push_level(schedule, bb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nice_blind_snaps_to_standard_set() {
        assert_eq!(nice_blind(1), 1);
        assert_eq!(nice_blind(7), 6);
        assert_eq!(nice_blind(9), 8);
        assert_eq!(nice_blind(12), 10);
        assert_eq!(nice_blind(13), 15);
        assert_eq!(nice_blind(49), 50);
        assert_eq!(nice_blind(449), 400);
        assert_eq!(nice_blind(1002), 1000);
    }

    #[test]
    fn test_nice_blind_equidistant_picks_lower() {
        // 7 is midway between 6 and 8.
        assert_eq!(nice_blind(7), 6);
        // 70 between 60 and 80.
        assert_eq!(nice_blind(70), 60);
    }

    #[test]
    fn test_schedule_shape_for_four_hour_game() {
        // 5000 chips, 20-minute levels, 4-hour target.
        let schedule = build_schedule(5000, 20, 4);
        assert_eq!(schedule[0].1, 50);
        assert_eq!(schedule[1].1, 100);
        assert_eq!(schedule[2].1, 150);

        let standard = {
            let mut v = standard_values();
            v.sort_unstable();
            v
        };
        let mut prev = 0;
        for &(sb, bb) in &schedule {
            assert!(standard.binary_search(&bb).is_ok(), "{bb} not standard");
            assert_eq!(sb, (bb / 2).max(1));
            assert!(bb > prev, "levels must strictly increase after dedup");
            prev = bb;
        }
        assert!(schedule.last().unwrap().1 >= 15_000);
    }

    #[test]
    fn test_fixed_blind_schedule() {
        let schedule = build_schedule(1000, 0, 0);
        assert_eq!(schedule, vec![(5, 10)]);
    }

    #[test]
    fn test_minimum_big_blind_is_two() {
        let schedule = build_schedule(100, 0, 0);
        assert_eq!(schedule[0], (1, 2));
    }

    #[test]
    fn test_extend_strictly_increases() {
        let mut schedule = build_schedule(5000, 20, 1);
        for _ in 0..10 {
            let before = schedule.last().unwrap().1;
            extend_schedule(&mut schedule);
            assert!(schedule.last().unwrap().1 > before);
        }
    }
}
