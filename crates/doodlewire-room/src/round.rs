//! Round state machine.
//!
//! ```text
//!            start_round                 time_out / matched
//!   Idle ───────────────► Active ─────────────────────────► Grace
//!    ▲                      ▲                                 │
//!    │ restart              └──────── grace elapsed ──────────┘
//!    │                                                        │
//!  GameOver ◄──── last round ended ─────────────────── (rounds == max)
//! ```
//!
//! The machine never touches sockets or timers. Every transition returns
//! the [`RoundEffect`]s the room actor must apply, in order.

use std::fmt;
use std::time::Duration;

use doodlewire_protocol::{EndReason, ServerMessage};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::RoomConfig;
use crate::words::pick_word;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// The round currently being played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRound {
    pub drawer: String,
    pub word: String,
    /// Unix millis.
    pub started_at: u64,
}

/// Where a room is in its game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundPhase {
    /// No round running. Waiting for someone to start one.
    Idle,
    /// A round is being drawn; the expiry timer is pending.
    Active(ActiveRound),
    /// Between rounds; the next-round timer is pending.
    Grace,
    /// `max_rounds` reached. Only a restart leaves this phase.
    GameOver,
}

impl RoundPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Self::Idle => PhaseKind::Idle,
            Self::Active(_) => PhaseKind::Active,
            Self::Grace => PhaseKind::Grace,
            Self::GameOver => PhaseKind::GameOver,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind(), f)
    }
}

/// [`RoundPhase`] without the round data, for snapshots and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Idle,
    Active,
    Grace,
    GameOver,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Active => f.write_str("active"),
            Self::Grace => f.write_str("grace"),
            Self::GameOver => f.write_str("game_over"),
        }
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Something the room must do as the result of a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEffect {
    /// Send to every connection in the room.
    Broadcast(ServerMessage),
    /// Replace the room's timer with a round-expiry timer.
    ScheduleExpiry(Duration),
    /// Replace the room's timer with a next-round timer.
    ScheduleNextRound(Duration),
    /// Cancel the room's timer, if any.
    CancelTimer,
}

/// Why `start_round` did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StartRejected {
    #[error("no eligible players")]
    NoEligiblePlayers,
    #[error("cannot start a round while {0}")]
    Busy(PhaseKind),
}

// ---------------------------------------------------------------------------
// RoundMachine
// ---------------------------------------------------------------------------

/// Per-room round progress.
#[derive(Debug, Clone)]
pub struct RoundMachine {
    phase: RoundPhase,
    rounds_played: u32,
    max_rounds: u32,
    round_duration: Duration,
    grace_delay: Duration,
}

impl RoundMachine {
    pub fn new(config: &RoomConfig) -> Self {
        Self {
            phase: RoundPhase::Idle,
            rounds_played: 0,
            max_rounds: config.max_rounds.max(1),
            round_duration: config.round_duration,
            grace_delay: config.grace_delay,
        }
    }

    pub fn phase(&self) -> &RoundPhase {
        &self.phase
    }

    pub fn rounds_played(&self) -> u32 {
        self.rounds_played
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// The round being drawn, if any.
    pub fn current_round(&self) -> Option<&ActiveRound> {
        match &self.phase {
            RoundPhase::Active(round) => Some(round),
            _ => None,
        }
    }

    /// Starts a round from `Idle`.
    ///
    /// The drawer is picked uniformly from `players` and the word
    /// uniformly from the word bank.
    ///
    /// # Errors
    /// [`StartRejected::Busy`] outside `Idle`, and
    /// [`StartRejected::NoEligiblePlayers`] when `players` is empty. The
    /// machine is unchanged in both cases.
    pub fn start_round<R: Rng + ?Sized>(
        &mut self,
        players: &[String],
        rng: &mut R,
        now: u64,
    ) -> Result<Vec<RoundEffect>, StartRejected> {
        if !self.phase.is_idle() {
            return Err(StartRejected::Busy(self.phase.kind()));
        }
        self.begin(players, rng, now)
    }

    /// The room's pending timer fired.
    ///
    /// In `Active` the round ends with `time_out`; in `Grace` the next
    /// round starts, or the room falls back to `Idle` if nobody is left.
    /// Anything else is a late fire and does nothing.
    pub fn on_timer_fired<R: Rng + ?Sized>(
        &mut self,
        players: &[String],
        rng: &mut R,
        now: u64,
    ) -> Vec<RoundEffect> {
        match self.phase {
            RoundPhase::Active(_) => self.end(EndReason::TimeOut, now),
            RoundPhase::Grace => match self.begin(players, rng, now) {
                Ok(effects) => effects,
                Err(_) => {
                    self.phase = RoundPhase::Idle;
                    Vec::new()
                }
            },
            RoundPhase::Idle | RoundPhase::GameOver => Vec::new(),
        }
    }

    /// A recognizer guess arrived.
    ///
    /// The guess is always broadcast. While a round is active, a guess
    /// that contains the word (case-insensitively) ends the round with
    /// `matched`.
    pub fn on_guess(&mut self, guess: &str, now: u64) -> Vec<RoundEffect> {
        let mut effects = vec![RoundEffect::Broadcast(ServerMessage::AiGuess {
            guess: guess.to_string(),
            timestamp: now,
        })];

        let matched = self
            .current_round()
            .is_some_and(|round| guess_matches(guess, &round.word));
        if matched {
            effects.push(RoundEffect::CancelTimer);
            effects.extend(self.end(EndReason::Matched, now));
        }
        effects
    }

    /// Resets a finished game back to `Idle`. No-op in any other phase.
    pub fn restart(&mut self, now: u64) -> Vec<RoundEffect> {
        if self.phase != RoundPhase::GameOver {
            return Vec::new();
        }
        self.phase = RoundPhase::Idle;
        self.rounds_played = 0;
        vec![
            RoundEffect::CancelTimer,
            RoundEffect::Broadcast(ServerMessage::GameReset {
                rounds_played: 0,
                max_rounds: self.max_rounds,
                timestamp: now,
            }),
        ]
    }

    fn begin<R: Rng + ?Sized>(
        &mut self,
        players: &[String],
        rng: &mut R,
        now: u64,
    ) -> Result<Vec<RoundEffect>, StartRejected> {
        if players.is_empty() {
            return Err(StartRejected::NoEligiblePlayers);
        }
        let drawer = players[rng.random_range(0..players.len())].clone();
        let word = pick_word(rng).to_string();

        self.phase = RoundPhase::Active(ActiveRound {
            drawer: drawer.clone(),
            word: word.clone(),
            started_at: now,
        });
        Ok(vec![
            RoundEffect::ScheduleExpiry(self.round_duration),
            RoundEffect::Broadcast(ServerMessage::RoundStarted {
                drawer,
                word,
                timestamp: now,
            }),
        ])
    }

    fn end(&mut self, reason: EndReason, now: u64) -> Vec<RoundEffect> {
        self.rounds_played = (self.rounds_played + 1).min(self.max_rounds);
        let game_over = self.rounds_played >= self.max_rounds;

        let ended = RoundEffect::Broadcast(ServerMessage::RoundEnded {
            reason,
            rounds_played: self.rounds_played,
            max_rounds: self.max_rounds,
            game_over,
            timestamp: now,
        });

        if game_over {
            self.phase = RoundPhase::GameOver;
            vec![RoundEffect::CancelTimer, ended]
        } else {
            self.phase = RoundPhase::Grace;
            vec![ended, RoundEffect::ScheduleNextRound(self.grace_delay)]
        }
    }
}

/// Case-insensitive substring match of the word inside the guess.
fn guess_matches(guess: &str, word: &str) -> bool {
    !word.is_empty() && guess.to_lowercase().contains(&word.to_lowercase())
}
