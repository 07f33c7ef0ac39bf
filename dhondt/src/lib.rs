mod config;
use log::{debug, info, warn};

use std::cmp::Ordering;
use std::collections::HashSet;

pub use crate::config::*;

// **** Private structures ****

// Index into the sorted party table. Parties are interned in lexicographic
// id order, so comparing PartyRef values compares party ids.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
struct PartyRef(u32);

#[derive(PartialEq, Debug, Clone, Copy)]
struct Quotient {
    party: PartyRef,
    value: f64,
}

/// Runs the D'Hondt highest-averages allocation for the given vote totals.
///
/// Arguments:
/// * `tallies` the final vote total of every participating party
/// * `rules` the rules that govern this allocation
///
/// Parties whose total is strictly below `total_valid_votes / total_seats`
/// (integer floor) are excluded before any quotient is generated. When no
/// party clears that threshold the result carries an empty seat table; this
/// is a valid outcome, not an error.
pub fn run_allocation(
    tallies: &[PartyTally],
    rules: &AllocationRules,
) -> Result<AllocationResult, AllocationErrors> {
    if rules.total_seats == 0 {
        return Err(AllocationErrors::InvalidRules);
    }
    let mut seen: HashSet<&str> = HashSet::new();
    for t in tallies.iter() {
        if !seen.insert(t.party_id.as_str()) {
            return Err(AllocationErrors::DuplicateParty);
        }
    }

    info!(
        "run_allocation: {} parties, {} seats",
        tallies.len(),
        rules.total_seats
    );

    // Intern the parties in lexicographic id order. All later sorting uses
    // PartyRef, which makes the tie-break rule a plain integer comparison.
    let mut parties: Vec<(String, u64)> = tallies
        .iter()
        .map(|t| (t.party_id.clone(), t.votes))
        .collect();
    parties.sort_by(|a, b| a.0.cmp(&b.0));

    let total_valid_votes: u64 = parties.iter().map(|(_, v)| *v).sum();
    let threshold = total_valid_votes / rules.total_seats as u64;
    debug!(
        "run_allocation: total_valid_votes: {} threshold: {}",
        total_valid_votes, threshold
    );

    let eligible: Vec<(PartyRef, &str, u64)> = parties
        .iter()
        .enumerate()
        .filter(|(_, (_, votes))| *votes >= threshold && *votes > 0)
        .map(|(idx, (pid, votes))| (PartyRef(idx as u32), pid.as_str(), *votes))
        .collect();

    if eligible.is_empty() {
        warn!("run_allocation: no party clears the threshold of {} votes", threshold);
        return Ok(AllocationResult {
            total_valid_votes,
            threshold,
            seats: Vec::new(),
            awards: Vec::new(),
        });
    }
    for (pref, pid, votes) in eligible.iter() {
        debug!("run_allocation: eligible party {:?}: {} ({} votes)", pref, pid, votes);
    }

    // One quotient per party per divisor 1..=total_seats. A party can never
    // win more seats than there are divisors, so this table is exhaustive.
    let mut quotients: Vec<Quotient> = Vec::with_capacity(eligible.len() * rules.total_seats as usize);
    for (pref, _, votes) in eligible.iter() {
        for divisor in 1..=rules.total_seats {
            quotients.push(Quotient {
                party: *pref,
                value: *votes as f64 / divisor as f64,
            });
        }
    }

    // Descending by value; ties fall back to the interned (lexicographic)
    // party order. The values are finite by construction so the partial
    // comparison cannot fail.
    quotients.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.party.cmp(&b.party))
    });

    let mut seat_counts: Vec<u32> = vec![0; parties.len()];
    let mut awards: Vec<SeatAward> = Vec::new();
    for (rank, q) in quotients.iter().take(rules.total_seats as usize).enumerate() {
        seat_counts[q.party.0 as usize] += 1;
        awards.push(SeatAward {
            seat: (rank + 1) as u32,
            party_id: parties[q.party.0 as usize].0.clone(),
            quotient: q.value,
        });
    }

    let mut seats: Vec<(String, u32)> = parties
        .iter()
        .zip(seat_counts.iter())
        .filter(|(_, count)| **count > 0)
        .map(|((pid, _), count)| (pid.clone(), *count))
        .collect();
    seats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    for (pid, count) in seats.iter() {
        info!("run_allocation: party {}: {} seats", pid, count);
    }

    Ok(AllocationResult {
        total_valid_votes,
        threshold,
        seats,
        awards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(party_id: &str, votes: u64) -> PartyTally {
        PartyTally {
            party_id: party_id.to_string(),
            votes,
        }
    }

    #[test]
    fn proportional_three_party_scenario() {
        // 1,750,000 total votes over 150 seats: threshold 11,666, all three
        // parties qualify and the seat order must follow the vote order.
        let tallies = vec![
            tally("P1", 1_000_000),
            tally("P2", 500_000),
            tally("P3", 250_000),
        ];
        let res = run_allocation(&tallies, &AllocationRules::DEFAULT_RULES).unwrap();

        assert_eq!(res.total_valid_votes, 1_750_000);
        assert_eq!(res.threshold, 11_666);
        assert_eq!(res.total_allocated(), 150);

        let s1 = res.seats_for("P1");
        let s2 = res.seats_for("P2");
        let s3 = res.seats_for("P3");
        assert!(s1 > s2, "P1 ({}) should outrank P2 ({})", s1, s2);
        assert!(s2 > s3, "P2 ({}) should outrank P3 ({})", s2, s3);
    }

    #[test]
    fn threshold_excludes_small_party() {
        // Total 1,005,000 votes: threshold 6,700. The 5,000-vote party is
        // excluded and the other party takes every seat.
        let tallies = vec![tally("BIG", 1_000_000), tally("SMALL", 5_000)];
        let res = run_allocation(&tallies, &AllocationRules::DEFAULT_RULES).unwrap();

        assert_eq!(res.threshold, 6_700);
        assert_eq!(res.seats_for("BIG"), 150);
        assert_eq!(res.seats_for("SMALL"), 0);
        assert_eq!(res.total_allocated(), 150);
    }

    #[test]
    fn single_party_saturates() {
        let res = run_allocation(&[tally("ONLY", 42)], &AllocationRules::DEFAULT_RULES).unwrap();
        assert_eq!(res.seats, vec![("ONLY".to_string(), 150)]);
    }

    #[test]
    fn no_votes_yields_empty_allocation() {
        let res = run_allocation(&[], &AllocationRules::DEFAULT_RULES).unwrap();
        assert!(res.seats.is_empty());
        assert!(res.awards.is_empty());
        assert_eq!(res.total_valid_votes, 0);
    }

    #[test]
    fn zero_vote_parties_yield_empty_allocation() {
        let tallies = vec![tally("A", 0), tally("B", 0)];
        let res = run_allocation(&tallies, &AllocationRules::DEFAULT_RULES).unwrap();
        assert!(res.seats.is_empty());
        assert_eq!(res.threshold, 0);
    }

    #[test]
    fn exact_four_two_one_ratio() {
        // 4:2:1 over 7 seats allocates exactly 4, 2 and 1 under D'Hondt.
        let tallies = vec![tally("A", 4_000), tally("B", 2_000), tally("C", 1_000)];
        let res = run_allocation(&tallies, &AllocationRules::with_seats(7)).unwrap();
        assert_eq!(res.seats_for("A"), 4);
        assert_eq!(res.seats_for("B"), 2);
        assert_eq!(res.seats_for("C"), 1);
    }

    #[test]
    fn ties_break_by_party_id() {
        // Two identical tallies over an odd seat count: the lexicographically
        // smaller id gets the extra seat.
        let tallies = vec![tally("ZZ", 1_000), tally("AA", 1_000)];
        let res = run_allocation(&tallies, &AllocationRules::with_seats(3)).unwrap();
        assert_eq!(res.seats_for("AA"), 2);
        assert_eq!(res.seats_for("ZZ"), 1);
        assert_eq!(res.awards[0].party_id, "AA");
    }

    #[test]
    fn seat_sum_invariant_random_distributions() {
        let distributions: Vec<Vec<u64>> = vec![
            vec![10_000, 10_000, 10_000],
            vec![987_654, 123_456, 55_555, 44_444],
            vec![1, 2_000_000],
            vec![300_000, 299_999, 299_998],
        ];
        for votes in distributions {
            let tallies: Vec<PartyTally> = votes
                .iter()
                .enumerate()
                .map(|(i, v)| tally(&format!("P{}", i), *v))
                .collect();
            let res = run_allocation(&tallies, &AllocationRules::DEFAULT_RULES).unwrap();
            assert_eq!(res.total_allocated(), 150, "votes: {:?}", votes);
        }
    }

    #[test]
    fn duplicate_party_is_rejected() {
        let tallies = vec![tally("A", 10), tally("A", 20)];
        assert_eq!(
            run_allocation(&tallies, &AllocationRules::DEFAULT_RULES),
            Err(AllocationErrors::DuplicateParty)
        );
    }

    #[test]
    fn zero_seats_is_rejected() {
        assert_eq!(
            run_allocation(&[tally("A", 10)], &AllocationRules::with_seats(0)),
            Err(AllocationErrors::InvalidRules)
        );
    }

    #[test]
    fn award_trail_matches_seat_counts() {
        let tallies = vec![tally("A", 6_000), tally("B", 3_000)];
        let res = run_allocation(&tallies, &AllocationRules::with_seats(9)).unwrap();
        assert_eq!(res.awards.len(), 9);
        let a_awards = res.awards.iter().filter(|a| a.party_id == "A").count();
        assert_eq!(a_awards as u32, res.seats_for("A"));
        // The first seat goes to the highest quotient.
        assert_eq!(res.awards[0].party_id, "A");
        assert_eq!(res.awards[0].quotient, 6_000.0);
    }
}
