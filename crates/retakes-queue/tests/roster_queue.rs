//! Integration tests for the roster queue against an in-memory host.

use std::collections::{HashMap, HashSet};

use retakes_model::{
    HostError, LivePlayer, LiveRoster, LogConfig, Membership, Notice, ParticipantId,
    PermissionLookup, Side, Team, TeamEffector,
};
use retakes_queue::{Admission, QueueConfig, RosterQueue, TeamChangeRequest};

// =========================================================================
// Fake host
// =========================================================================

#[derive(Default)]
struct FakeHost {
    players: Vec<LivePlayer>,
    warmup: bool,
    permissions: HashMap<ParticipantId, Vec<&'static str>>,
    notices: Vec<(ParticipantId, Notice)>,
    eliminated: Vec<ParticipantId>,
    terminated: Vec<Side>,
    refuse_termination: bool,
}

impl FakeHost {
    fn connect(&mut self, id: u64, team: Team) {
        self.players.push(LivePlayer {
            id: pid(id),
            team,
            alive: team.is_playing(),
            has_avatar: team.is_playing(),
        });
    }

    fn disconnect(&mut self, id: u64) {
        self.players.retain(|p| p.id != pid(id));
    }

    fn grant(&mut self, id: u64, flag: &'static str) {
        self.permissions.entry(pid(id)).or_default().push(flag);
    }

    fn team_of(&self, id: u64) -> Team {
        self.player(pid(id)).map_or(Team::Unassigned, |p| p.team)
    }

    fn kill(&mut self, id: u64) {
        if let Some(p) = self.players.iter_mut().find(|p| p.id == pid(id)) {
            p.alive = false;
        }
    }

    fn notices_for(&self, id: u64) -> Vec<Notice> {
        self.notices
            .iter()
            .filter(|(p, _)| *p == pid(id))
            .map(|(_, n)| n.clone())
            .collect()
    }
}

impl LiveRoster for FakeHost {
    fn players(&self) -> Vec<LivePlayer> {
        self.players.clone()
    }

    fn is_warmup(&self) -> bool {
        self.warmup
    }
}

impl PermissionLookup for FakeHost {
    fn has_permission(&self, id: ParticipantId, flag: &str) -> bool {
        self.permissions
            .get(&id)
            .is_some_and(|flags| flags.iter().any(|f| *f == flag))
    }
}

impl TeamEffector for FakeHost {
    fn change_team(&mut self, id: ParticipantId, team: Team) {
        if let Some(p) = self.players.iter_mut().find(|p| p.id == id) {
            p.team = team;
            p.alive = team.is_playing();
        }
    }

    fn eliminate(&mut self, id: ParticipantId) {
        self.eliminated.push(id);
        if let Some(p) = self.players.iter_mut().find(|p| p.id == id) {
            p.alive = false;
        }
    }

    fn terminate_round(&mut self, winner: Side) -> Result<(), HostError> {
        if self.refuse_termination {
            return Err(HostError::Rejected {
                command: "terminate_round",
                reason: "game rules unavailable".into(),
            });
        }
        self.terminated.push(winner);
        Ok(())
    }

    fn notify(&mut self, id: ParticipantId, notice: Notice) {
        self.notices.push((id, notice));
    }

    fn restart_game(&mut self) {}
}

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> ParticipantId {
    ParticipantId(id)
}

fn request(id: u64, from: Team, to: Team) -> TeamChangeRequest {
    TeamChangeRequest {
        participant: pid(id),
        from,
        to,
    }
}

fn queue_with_capacity(max_players: usize) -> RosterQueue {
    RosterQueue::new(
        QueueConfig {
            max_players,
            ..QueueConfig::default()
        },
        LogConfig::verbose(),
    )
}

/// Connects `ids` alternating attacker/defender and admits them during
/// warmup.
fn admit_in_warmup(queue: &mut RosterQueue, host: &mut FakeHost, ids: std::ops::RangeInclusive<u64>) {
    host.warmup = true;
    for id in ids {
        let team = if id % 2 == 0 { Team::Attacker } else { Team::Defender };
        host.connect(id, team);
        let admission = queue.on_team_change_request(host, request(id, Team::Unassigned, team), false);
        assert_eq!(admission, Admission::Proceed);
    }
    host.warmup = false;
}

fn assert_disjoint(queue: &RosterQueue) {
    let active: HashSet<_> = queue.active_ids().into_iter().collect();
    let queued: HashSet<_> = queue.queued_ids().into_iter().collect();
    assert!(active.is_disjoint(&queued));
}

// =========================================================================
// Admission control
// =========================================================================

#[test]
fn test_initial_spectator_connection_always_proceeds() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    host.connect(1, Team::Unassigned);

    let admission = queue.on_team_change_request(&mut host, request(1, Team::Unassigned, Team::Spectator), false);

    assert_eq!(admission, Admission::Proceed);
    assert_eq!(queue.membership(pid(1)), Membership::Spectator);
}

#[test]
fn test_warmup_admits_directly_until_full() {
    let mut queue = queue_with_capacity(2);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=2);

    host.warmup = true;
    host.connect(3, Team::Defender);
    let admission = queue.on_team_change_request(&mut host, request(3, Team::Unassigned, Team::Defender), false);

    assert_eq!(admission, Admission::Handled);
    assert_eq!(queue.active_count(), 2);
    assert!(queue.is_queued(pid(3)));
    assert_eq!(host.notices_for(3), vec![Notice::QueueAdded]);
}

#[test]
fn test_joining_outside_warmup_goes_to_queue() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=2);

    host.connect(3, Team::Unassigned);
    let admission = queue.on_team_change_request(&mut host, request(3, Team::Unassigned, Team::Attacker), true);

    assert_eq!(admission, Admission::Handled);
    assert!(queue.is_queued(pid(3)));
}

#[test]
fn test_active_to_spectator_leaves_roster() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=4);

    let admission = queue.on_team_change_request(&mut host, request(2, Team::Attacker, Team::Spectator), true);

    assert_eq!(admission, Admission::Proceed);
    assert_eq!(queue.membership(pid(2)), Membership::Spectator);
    assert_eq!(queue.active_count(), 3);

    // Repeating the removal is harmless.
    queue.remove_participant(&mut host, pid(2));
    assert_eq!(queue.active_count(), 3);
}

#[test]
fn test_mid_round_switch_to_other_side_is_rejected() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=4);
    queue.set_round_teams(&host);
    assert_eq!(queue.round_team(pid(2)), Some(Side::Attacker));

    let admission = queue.on_team_change_request(&mut host, request(2, Team::Attacker, Team::Defender), true);

    assert_eq!(admission, Admission::Handled);
    assert!(queue.is_queued(pid(2)));
    assert_eq!(host.eliminated, vec![pid(2)]);
    assert_eq!(host.team_of(2), Team::Spectator);
    assert_disjoint(&queue);
}

#[test]
fn test_mid_round_switch_to_own_side_is_allowed() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=4);
    queue.set_round_teams(&host);

    let admission = queue.on_team_change_request(&mut host, request(2, Team::Spectator, Team::Attacker), true);

    assert_eq!(admission, Admission::Handled);
    assert!(queue.is_active(pid(2)));
    assert!(host.eliminated.is_empty());
}

#[test]
fn test_switch_allowed_when_lock_disabled() {
    let mut queue = RosterQueue::new(
        QueueConfig {
            prevent_team_changes_mid_round: false,
            ..QueueConfig::default()
        },
        LogConfig::default(),
    );
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=4);
    queue.set_round_teams(&host);

    assert_eq!(queue.round_team(pid(2)), None);
    let admission = queue.on_team_change_request(&mut host, request(2, Team::Attacker, Team::Defender), true);
    assert_eq!(admission, Admission::Proceed);
    assert!(queue.is_active(pid(2)));
}

#[test]
fn test_clear_round_teams_drops_snapshot() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=4);
    queue.set_round_teams(&host);

    queue.clear_round_teams();

    assert_eq!(queue.round_team(pid(1)), None);
    let admission = queue.on_team_change_request(&mut host, request(2, Team::Attacker, Team::Defender), true);
    assert_eq!(admission, Admission::Handled);
    assert!(queue.is_active(pid(2)));
}

// =========================================================================
// Reconciliation
// =========================================================================

#[test]
fn test_update_promotes_priority_then_join_order() {
    let mut queue = queue_with_capacity(4);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=2);

    for id in 3..=5 {
        host.connect(id, Team::Spectator);
        queue.on_team_change_request(&mut host, request(id, Team::Spectator, Team::Defender), false);
    }
    host.grant(5, "retakes.vip");

    queue.update(&mut host);

    assert_eq!(queue.active_count(), 4);
    assert!(queue.is_active(pid(5)));
    assert!(queue.is_active(pid(3)));
    assert!(queue.is_queued(pid(4)));
    assert_eq!(host.team_of(5), Team::Defender);
    assert_eq!(host.team_of(3), Team::Defender);
    assert_eq!(
        host.notices_for(4).last(),
        Some(&Notice::QueueWaiting { active: 4, capacity: 4 })
    );
}

#[test]
fn test_priority_participant_swaps_out_newest_ordinary_player() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=9);

    host.connect(10, Team::Spectator);
    host.grant(10, "retakes.vip");
    queue.on_team_change_request(&mut host, request(10, Team::Spectator, Team::Defender), false);

    queue.update(&mut host);

    assert_eq!(queue.active_count(), 9);
    assert!(queue.is_active(pid(10)));
    assert!(queue.is_queued(pid(9)));
    assert_eq!(queue.queued_count(), 1);
    assert_eq!(host.team_of(9), Team::Spectator);
    assert_eq!(host.team_of(10), Team::Defender);
    assert!(host.notices_for(9).contains(&Notice::MovedOut { by: pid(10) }));
    assert!(host.notices_for(10).contains(&Notice::MovedIn { replaced: pid(9) }));
    assert_disjoint(&queue);
}

#[test]
fn test_immune_players_are_never_swapped_out() {
    let mut queue = RosterQueue::new(
        QueueConfig {
            max_players: 2,
            immunity_flags: vec!["retakes.admin".into()],
            ..QueueConfig::default()
        },
        LogConfig::default(),
    );
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=2);
    host.grant(1, "retakes.admin");
    host.grant(2, "retakes.admin");

    host.connect(3, Team::Spectator);
    host.grant(3, "retakes.vip");
    queue.on_team_change_request(&mut host, request(3, Team::Spectator, Team::Defender), false);

    queue.update(&mut host);

    assert!(queue.is_queued(pid(3)));
    assert_eq!(queue.active_ids(), vec![pid(1), pid(2)]);
}

#[test]
fn test_priority_players_protect_each_other_by_default() {
    let mut queue = queue_with_capacity(1);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=1);
    host.grant(1, "retakes.vip");

    host.connect(2, Team::Spectator);
    host.grant(2, "retakes.vip");
    queue.on_team_change_request(&mut host, request(2, Team::Spectator, Team::Defender), false);
    queue.update(&mut host);

    assert!(queue.is_active(pid(1)));
    assert!(queue.is_queued(pid(2)));
}

#[test]
fn test_update_sweeps_disconnected_participants() {
    let mut queue = queue_with_capacity(3);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=3);
    host.connect(4, Team::Spectator);
    queue.on_team_change_request(&mut host, request(4, Team::Spectator, Team::Defender), false);

    host.disconnect(2);
    queue.update(&mut host);

    assert_eq!(queue.membership(pid(2)), Membership::Spectator);
    assert_eq!(queue.active_ids(), vec![pid(1), pid(3), pid(4)]);
    assert_eq!(queue.queued_count(), 0);
}

#[test]
fn test_update_twice_is_stable() {
    let mut queue = queue_with_capacity(2);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=2);
    host.connect(3, Team::Spectator);
    queue.on_team_change_request(&mut host, request(3, Team::Spectator, Team::Defender), false);

    queue.update(&mut host);
    let active = queue.active_ids();
    queue.update(&mut host);

    assert_eq!(queue.active_ids(), active);
    assert_disjoint(&queue);
}

// =========================================================================
// Sizing
// =========================================================================

#[test]
fn test_target_sizes_force_even_at_ten() {
    let mut queue = queue_with_capacity(10);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=10);

    assert_eq!(queue.target_attackers(0.45), 5);
    assert_eq!(queue.target_defenders(0.45), 5);
}

#[test]
fn test_target_sizes_follow_ratio_below_ten() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=9);

    assert_eq!(queue.target_attackers(0.45), 4);
    assert_eq!(queue.target_defenders(0.45), 5);
}

// =========================================================================
// Round completion
// =========================================================================

#[test]
fn test_check_round_done_terminates_when_side_is_dead() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=4);
    host.kill(1);
    host.kill(3);

    assert!(queue.check_round_done(&mut host));
    assert_eq!(host.terminated, vec![Side::Attacker]);
}

#[test]
fn test_check_round_done_falls_back_to_eliminating_survivors() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=4);
    host.refuse_termination = true;
    host.kill(2);
    host.kill(4);

    assert!(queue.check_round_done(&mut host));
    assert!(host.terminated.is_empty());
    let mut eliminated = host.eliminated.clone();
    eliminated.sort();
    assert_eq!(eliminated, vec![pid(1), pid(3)]);
}

#[test]
fn test_check_round_done_ignores_warmup_and_live_sides() {
    let mut queue = queue_with_capacity(9);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=4);

    assert!(!queue.check_round_done(&mut host));

    host.warmup = true;
    host.kill(1);
    host.kill(3);
    assert!(!queue.check_round_done(&mut host));
    assert!(host.terminated.is_empty());
}

// =========================================================================
// Reset and diagnostics
// =========================================================================

#[test]
fn test_reset_and_summary() {
    let mut queue = queue_with_capacity(1);
    let mut host = FakeHost::default();
    admit_in_warmup(&mut queue, &mut host, 1..=1);
    host.connect(2, Team::Spectator);
    queue.on_team_change_request(&mut host, request(2, Team::Spectator, Team::Defender), false);

    assert_eq!(queue.debug_summary(), "Active (1): [P-1] | Queue (1): [P-2]");

    queue.reset();
    assert_eq!(queue.debug_summary(), "Active (0): [] | Queue (0): []");
}
