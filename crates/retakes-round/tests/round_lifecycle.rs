//! Integration tests for the round state machine lifecycle.

use retakes_model::{Bombsite, EventBus, EventKind, ParticipantId, Side, Subscription, Team};
use retakes_round::{RoundOutcome, RoundPhase, RoundStateMachine};

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> ParticipantId {
    ParticipantId(id)
}

fn live_round(sm: &mut RoundStateMachine) {
    sm.on_round_start(false);
}

// =========================================================================
// Round start and end
// =========================================================================

#[test]
fn test_round_start_counts_and_goes_live() {
    let mut sm = RoundStateMachine::default();
    assert_eq!(sm.phase(), RoundPhase::Warmup);

    live_round(&mut sm);
    assert!(sm.is_live());
    assert_eq!(sm.round_number(), 1);

    sm.on_round_end(RoundOutcome::won_by(Side::Attacker));
    live_round(&mut sm);
    assert_eq!(sm.round_number(), 2);
}

#[test]
fn test_warmup_start_clears_locks_and_keeps_number() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.set_round_participants([(pid(1), Team::Attacker)]);

    sm.on_round_start(true);

    assert_eq!(sm.phase(), RoundPhase::Warmup);
    assert_eq!(sm.round_number(), 1);
    assert_eq!(sm.try_get_locked_team(pid(1)), None);
    assert!(!sm.is_round_participant(pid(1)));
}

#[test]
fn test_round_end_clears_locks_and_live_flag() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.set_round_participants([(pid(1), Team::Defender), (pid(2), Team::Attacker)]);
    sm.begin_team_change_bypass();

    sm.on_round_end(RoundOutcome::won_by(Side::Defender));

    assert!(!sm.is_live());
    assert_eq!(sm.phase(), RoundPhase::RoundOver);
    assert_eq!(sm.participant_count(), 0);
    assert!(!sm.team_change_bypass_enabled());
}

// =========================================================================
// Win streaks
// =========================================================================

#[test]
fn test_streak_grows_then_resets_on_other_winner() {
    let mut sm = RoundStateMachine::default();

    for _ in 0..2 {
        live_round(&mut sm);
        sm.on_round_end(RoundOutcome::won_by(Side::Attacker));
    }
    assert_eq!(sm.consecutive_wins(), 2);
    assert_eq!(sm.last_winner(), Some(Side::Attacker));

    live_round(&mut sm);
    sm.on_round_end(RoundOutcome::won_by(Side::Defender));
    assert_eq!(sm.consecutive_wins(), 1);
    assert_eq!(sm.wins(Side::Attacker), 2);
    assert_eq!(sm.wins(Side::Defender), 1);
}

#[test]
fn test_draw_resets_streak_to_zero() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.on_round_end(RoundOutcome::won_by(Side::Attacker));

    live_round(&mut sm);
    sm.on_round_end(RoundOutcome {
        winner: None,
        reason: 10,
        message: "draw".into(),
    });

    assert_eq!(sm.consecutive_wins(), 0);
    assert_eq!(sm.last_winner(), None);
    assert_eq!(sm.last_win_reason(), 10);
    assert_eq!(sm.last_win_message(), "draw");
}

#[test]
fn test_win_after_draw_starts_new_streak() {
    let mut sm = RoundStateMachine::default();
    sm.on_round_end(RoundOutcome::default());
    sm.on_round_end(RoundOutcome::won_by(Side::Defender));
    assert_eq!(sm.consecutive_wins(), 1);
}

// =========================================================================
// Locks
// =========================================================================

#[test]
fn test_only_playing_teams_are_locked() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.set_round_participants([
        (pid(1), Team::Attacker),
        (pid(2), Team::Spectator),
        (pid(3), Team::Defender),
    ]);

    assert_eq!(sm.try_get_locked_team(pid(1)), Some(Side::Attacker));
    assert_eq!(sm.try_get_locked_team(pid(2)), None);
    assert!(sm.is_round_participant(pid(2)));
    assert_eq!(sm.try_get_locked_team(pid(3)), Some(Side::Defender));
    assert_eq!(sm.try_get_locked_team(pid(99)), None);
}

#[test]
fn test_set_round_participants_replaces_previous_snapshot() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.set_round_participants([(pid(1), Team::Attacker)]);
    sm.set_round_participants([(pid(2), Team::Defender)]);

    assert!(!sm.is_round_participant(pid(1)));
    assert_eq!(sm.participant_count(), 1);
}

#[test]
fn test_lock_violation_reports_locked_side() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.set_round_participants([(pid(1), Team::Attacker)]);

    assert_eq!(sm.lock_violation(pid(1), Team::Defender), Some(Side::Attacker));
    assert_eq!(sm.lock_violation(pid(1), Team::Spectator), Some(Side::Attacker));
    assert_eq!(sm.lock_violation(pid(1), Team::Attacker), None);
    assert_eq!(sm.lock_violation(pid(2), Team::Defender), None);
}

#[test]
fn test_bypass_suppresses_lock_violation() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.set_round_participants([(pid(1), Team::Attacker)]);

    sm.begin_team_change_bypass();
    sm.begin_team_change_bypass();
    sm.end_team_change_bypass();
    assert_eq!(sm.lock_violation(pid(1), Team::Defender), None);

    sm.end_team_change_bypass();
    assert_eq!(sm.lock_violation(pid(1), Team::Defender), Some(Side::Attacker));
}

#[test]
fn test_participant_left_removes_lock_and_joiner() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.set_round_participants([(pid(1), Team::Attacker)]);
    sm.enqueue_joiner(pid(1));

    sm.on_participant_left(pid(1));
    sm.on_participant_left(pid(42));

    assert_eq!(sm.try_get_locked_team(pid(1)), None);
    assert!(sm.drain_pending_joiners().is_empty());
}

// =========================================================================
// Joiners and restart
// =========================================================================

#[test]
fn test_joiners_dedupe_and_drain_once() {
    let mut sm = RoundStateMachine::default();
    sm.enqueue_joiner(pid(3));
    sm.enqueue_joiner(pid(1));
    sm.enqueue_joiner(pid(3));

    assert_eq!(sm.snapshot().pending_joiners, vec![pid(3), pid(1)]);
    assert_eq!(sm.drain_pending_joiners(), vec![pid(3), pid(1)]);
    assert!(sm.drain_pending_joiners().is_empty());
}

#[test]
fn test_restart_claimed_once_per_round() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);

    assert!(sm.try_queue_restart_this_round());
    assert!(!sm.try_queue_restart_this_round());
    assert!(sm.snapshot().restart_queued_this_round);

    sm.on_round_end(RoundOutcome::default());
    live_round(&mut sm);
    assert!(sm.try_queue_restart_this_round());
}

// =========================================================================
// Overrides and reset
// =========================================================================

#[test]
fn test_overrides_survive_round_transitions() {
    let mut sm = RoundStateMachine::default();
    sm.force_bombsite(Bombsite::B);
    sm.force_scenario();
    sm.set_scramble_next_round(true);

    live_round(&mut sm);
    sm.on_round_end(RoundOutcome::won_by(Side::Attacker));

    assert_eq!(sm.overrides().forced_bombsite, Some(Bombsite::B));
    assert!(sm.overrides().forced_scenario);
    assert!(sm.snapshot().scramble_next_round);

    sm.clear_forced_bombsite();
    sm.clear_forced_scenario();
    assert_eq!(sm.snapshot().forced_bombsite, None);
    assert!(!sm.overrides().forced_scenario);
}

#[test]
fn test_reset_match_clears_counters() {
    let mut sm = RoundStateMachine::default();
    live_round(&mut sm);
    sm.on_round_end(RoundOutcome::won_by(Side::Attacker));
    sm.enqueue_joiner(pid(1));
    sm.force_bombsite(Bombsite::A);
    sm.force_scenario();

    sm.reset_match();

    let snap = sm.snapshot();
    assert_eq!(snap.round_number, 0);
    assert_eq!(snap.consecutive_wins, 0);
    assert!(snap.pending_joiners.is_empty());
    assert_eq!(snap.forced_bombsite, Some(Bombsite::A));
    assert!(!sm.overrides().forced_scenario);
    assert_eq!(sm.phase(), RoundPhase::Warmup);
}

// =========================================================================
// Subscriptions
// =========================================================================

#[derive(Default)]
struct RecordingBus {
    next_id: u64,
    live: Vec<(u64, EventKind)>,
}

impl EventBus for RecordingBus {
    fn subscribe(&mut self, kind: EventKind) -> Subscription {
        self.next_id += 1;
        self.live.push((self.next_id, kind));
        Subscription::new(self.next_id, kind)
    }

    fn unsubscribe(&mut self, subscription: Subscription) {
        self.live.retain(|(id, _)| *id != subscription.id());
    }
}

#[test]
fn test_start_subscribes_to_lifecycle_events_once() {
    let mut bus = RecordingBus::default();
    let mut sm = RoundStateMachine::default();

    sm.start(&mut bus);
    sm.start(&mut bus);

    assert!(sm.is_started());
    let kinds: Vec<EventKind> = bus.live.iter().map(|(_, k)| *k).collect();
    assert_eq!(kinds, RoundStateMachine::EVENTS);
    assert!(kinds.contains(&EventKind::RoundEnd));

    sm.stop(&mut bus);
    assert!(!sm.is_started());
    assert!(bus.live.is_empty());
}
