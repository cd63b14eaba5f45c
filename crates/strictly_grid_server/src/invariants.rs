//! Properties that hold for a session after every transition.
//!
//! Checked in debug builds after join, move and reset, and testable on
//! their own.

use crate::session::Session;
use strictly_grid::{Cell, Outcome, Symbol, evaluate, win_condition_for};
use strum::IntoEnumIterator;

/// A logical property that must hold for a given state.
pub trait Invariant<S> {
    /// Checks if the invariant holds for the given state.
    fn holds(state: &S) -> bool;

    /// Human-readable description of the invariant.
    fn description() -> &'static str;
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub description: String,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// A set of invariants that can be checked together.
///
/// Implementations are provided for tuples.
pub trait InvariantSet<S> {
    /// Checks all invariants in the set, collecting every violation.
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>>;
}

fn check<S, I: Invariant<S>>(state: &S, violations: &mut Vec<InvariantViolation>) {
    if !I::holds(state) {
        violations.push(InvariantViolation::new(I::description()));
    }
}

fn collect(violations: Vec<InvariantViolation>) -> Result<(), Vec<InvariantViolation>> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

impl<S, I1, I2> InvariantSet<S> for (I1, I2)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
{
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>> {
        let mut violations = Vec::new();
        check::<S, I1>(state, &mut violations);
        check::<S, I2>(state, &mut violations);
        collect(violations)
    }
}

impl<S, I1, I2, I3, I4> InvariantSet<S> for (I1, I2, I3, I4)
where
    I1: Invariant<S>,
    I2: Invariant<S>,
    I3: Invariant<S>,
    I4: Invariant<S>,
{
    fn check_all(state: &S) -> Result<(), Vec<InvariantViolation>> {
        let mut violations = Vec::new();
        check::<S, I1>(state, &mut violations);
        check::<S, I2>(state, &mut violations);
        check::<S, I3>(state, &mut violations);
        check::<S, I4>(state, &mut violations);
        collect(violations)
    }
}

/// Invariant: the board has `size²` cells and the win condition is
/// `min(size, 5)`.
pub struct BoardShapeInvariant;

impl Invariant<Session> for BoardShapeInvariant {
    fn holds(session: &Session) -> bool {
        let size = *session.size();
        session.board().size() == size
            && session.board().len() == size * size
            && *session.win_condition() == win_condition_for(size)
    }

    fn description() -> &'static str {
        "Board has size² cells and win condition min(size, 5)"
    }
}

/// Invariant: marks alternate starting with First.
///
/// First has as many marks as Second or one more, and while the round is
/// running the symbol on turn follows from the counts.
pub struct AlternatingMarksInvariant;

impl Invariant<Session> for AlternatingMarksInvariant {
    fn holds(session: &Session) -> bool {
        let count = |symbol: Symbol| {
            session
                .board()
                .cells()
                .iter()
                .filter(|cell| **cell == Cell::Occupied(symbol))
                .count()
        };
        let first = count(Symbol::First);
        let second = count(Symbol::Second);
        if first != second && first != second + 1 {
            return false;
        }
        if !*session.active() {
            return true;
        }
        let expected = if first == second {
            Symbol::First
        } else {
            Symbol::Second
        };
        *session.to_move() == expected
    }

    fn description() -> &'static str {
        "Marks alternate X, O, X, ... and the turn follows the counts"
    }
}

/// Invariant: an active session has both slots and an undecided board.
pub struct ActiveMeansOpenInvariant;

impl Invariant<Session> for ActiveMeansOpenInvariant {
    fn holds(session: &Session) -> bool {
        if !*session.active() {
            return true;
        }
        session.is_full_house()
            && evaluate(session.board(), *session.win_condition()) == Outcome::InProgress
    }

    fn description() -> &'static str {
        "Active session has two players and no decided board"
    }
}

/// Invariant: each slot holds the symbol it is indexed by.
pub struct SlotSymbolInvariant;

impl Invariant<Session> for SlotSymbolInvariant {
    fn holds(session: &Session) -> bool {
        Symbol::iter().all(|symbol| {
            session
                .slot(symbol)
                .is_none_or(|slot| *slot.symbol() == symbol)
        })
    }

    fn description() -> &'static str {
        "Each slot carries its own symbol"
    }
}

/// All session invariants as a composable set.
pub type SessionInvariants = (
    BoardShapeInvariant,
    AlternatingMarksInvariant,
    ActiveMeansOpenInvariant,
    SlotSymbolInvariant,
);
