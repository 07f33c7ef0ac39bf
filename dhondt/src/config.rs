// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The vote total for one party, as aggregated by the caller.
///
/// Totals are expected to be final: the algorithm does not merge duplicate
/// party ids and treats a repeated id as a programming error.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PartyTally {
    pub party_id: String,
    pub votes: u64,
}

// ******** Output data structures *********

/// One awarded seat: the rank of the seat (1-based), the party that won it
/// and the quotient that won it.
#[derive(PartialEq, Debug, Clone)]
pub struct SeatAward {
    pub seat: u32,
    pub party_id: String,
    pub quotient: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AllocationResult {
    /// Sum of all party vote totals that entered the computation.
    pub total_valid_votes: u64,
    /// The electoral threshold: `total_valid_votes / total_seats`, floored.
    pub threshold: u64,
    /// Seats per party, sorted by seat count descending then party id.
    /// Parties below the threshold do not appear. Empty when no party
    /// cleared the threshold.
    pub seats: Vec<(String, u32)>,
    /// The full award trail, in the order the seats were assigned.
    pub awards: Vec<SeatAward>,
}

impl AllocationResult {
    /// The number of seats for one party, zero if it was not awarded any.
    pub fn seats_for(&self, party_id: &str) -> u32 {
        self.seats
            .iter()
            .find(|(pid, _)| pid == party_id)
            .map(|(_, s)| *s)
            .unwrap_or(0)
    }

    pub fn total_allocated(&self) -> u32 {
        self.seats.iter().map(|(_, s)| *s).sum()
    }
}

/// Errors that prevent the algorithm from completing successfully.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AllocationErrors {
    /// The rules do not describe a valid assembly (zero seats).
    InvalidRules,
    /// The same party id was listed more than once in the input tallies.
    DuplicateParty,
}

impl Error for AllocationErrors {}

impl Display for AllocationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationErrors::InvalidRules => write!(f, "AllocationError: invalid rules"),
            AllocationErrors::DuplicateParty => write!(f, "AllocationError: duplicate party id"),
        }
    }
}

// ********* Configuration **********

/// How quotient ties are resolved when two parties produce the exact same
/// quotient for the next seat.
///
/// The reference tabulations relied on incidental collection ordering, which
/// is not reproducible. The only implemented mode orders tied quotients by
/// the lexicographic party id, which is stable across runs and platforms.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakMode {
    LexicographicPartyId,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AllocationRules {
    /// Number of seats in the assembly being filled.
    pub total_seats: u32,
    pub tiebreak_mode: TieBreakMode,
}

impl AllocationRules {
    /// The Dutch Tweede Kamer: 150 seats.
    pub const DEFAULT_RULES: AllocationRules = AllocationRules {
        total_seats: 150,
        tiebreak_mode: TieBreakMode::LexicographicPartyId,
    };

    pub fn with_seats(total_seats: u32) -> AllocationRules {
        AllocationRules {
            total_seats,
            ..AllocationRules::DEFAULT_RULES
        }
    }
}
