// The orchestration layer: runs parse passes over a data folder, keeps the
// resulting aggregates in the TTL cache, and drives the seat allocation.
// Seat totals are always recomputed from the municipality ledgers, never
// read back from previously stored national records.

use log::{info, warn};

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use dhondt::{run_allocation, AllocationResult, AllocationRules, PartyTally};

use crate::eml::cache::ResultCache;
use crate::eml::model::{Election, National, Party, ResultType};
use crate::eml::scanner;
use crate::eml::transformers::{Diagnostics, TransformerSet};

pub struct ElectionService {
    cache: ResultCache,
    set: TransformerSet,
    rules: AllocationRules,
}

impl ElectionService {
    pub fn new() -> ElectionService {
        ElectionService::with_rules(AllocationRules::DEFAULT_RULES)
    }

    pub fn with_rules(rules: AllocationRules) -> ElectionService {
        ElectionService {
            cache: ResultCache::new(),
            set: TransformerSet::new(),
            rules,
        }
    }

    /// The cached aggregate for this election id, if any.
    pub fn election_by_id(&self, election_id: &str) -> Option<Election> {
        self.cache.get(election_id)
    }

    /// Parses all definition and count files of the folder into a fresh
    /// aggregate and caches it. A cached aggregate that already carries
    /// constituencies is reused without touching the filesystem. Fatal
    /// errors (missing folder, malformed XML) are logged and yield `None`.
    pub fn read_results(&self, election_id: &str, folder: &Path) -> Option<Election> {
        let election_id = election_id.trim();
        if let Some(cached) = self.cache.get(election_id) {
            if !cached.constituencies().is_empty() {
                info!("read_results: serving {} from cache", election_id);
                return Some(cached);
            }
        }

        let mut election = Election::new(election_id);
        let mut diags = Diagnostics::default();
        match scanner::parse_results(&mut election, folder, &self.set, &mut diags) {
            Ok(()) => {
                roll_up_party_totals(&mut election);
                if diags.total_dropped() > 0 {
                    warn!(
                        "read_results: {} records dropped for unresolvable references",
                        diags.total_dropped()
                    );
                }
                info!(
                    "read_results: {} parsed: {} constituencies, {} parties, {} national records",
                    election_id,
                    election.constituencies().len(),
                    election.parties().len(),
                    election.national_votes().len()
                );
                self.cache.put(election_id, election.clone());
                Some(election)
            }
            Err(err) => {
                warn!("read_results: parsing {} failed: {}", election_id, err);
                None
            }
        }
    }

    /// Loads the candidate lists (and their national vote totals) into the
    /// aggregate. When the cache already holds candidates for this election
    /// they are copied over instead of re-parsing the files.
    pub fn load_candidate_lists(&self, election: &mut Election, folder: &Path) {
        let election_id = election.id().trim().to_string();
        if let Some(cached) = self.cache.get(&election_id) {
            if !cached.candidates().is_empty() {
                info!(
                    "load_candidate_lists: reusing {} cached candidates for {}",
                    cached.candidates().len(),
                    election_id
                );
                for candidate in cached.candidates() {
                    if !election.has_candidate(&candidate.id) {
                        election.add_candidate(candidate.clone());
                    }
                }
                return;
            }
        }

        let mut diags = Diagnostics::default();
        match scanner::parse_candidate_lists(election, folder, &self.set, &mut diags) {
            Ok(()) => {
                info!(
                    "load_candidate_lists: {} candidates for {}",
                    election.candidates().len(),
                    election_id
                );
                self.cache.put(&election_id, election.clone());
            }
            Err(err) => {
                warn!(
                    "load_candidate_lists: parsing {} failed: {}",
                    election_id, err
                );
            }
        }
    }

    /// Runs the seat allocation over totals recomputed from the
    /// municipality ledgers.
    pub fn allocate(&self, election: &Election) -> Option<AllocationResult> {
        let totals = fresh_party_totals(election);
        let mut tallies: Vec<PartyTally> = totals
            .into_iter()
            .map(|(party_id, votes)| PartyTally { party_id, votes })
            .collect();
        tallies.sort_by(|a, b| a.party_id.cmp(&b.party_id));
        match run_allocation(&tallies, &self.rules) {
            Ok(result) => {
                info!(
                    "allocate: {} valid votes, threshold {}, {} seats assigned",
                    result.total_valid_votes,
                    result.threshold,
                    result.total_allocated()
                );
                Some(result)
            }
            Err(err) => {
                warn!("allocate: {}", err);
                None
            }
        }
    }

    /// The per-party seat counts, empty when no allocation was possible.
    pub fn calculate_seats_dhondt(&self, election: &Election) -> HashMap<String, u32> {
        self.allocate(election)
            .map(|r| r.seats.into_iter().collect())
            .unwrap_or_default()
    }

    /// Folds an allocation back into the aggregate: every party with votes
    /// or seats gets its national record replaced by a copy carrying the
    /// seat count, or a freshly built one when none existed. The updated
    /// aggregate is written back to the cache.
    pub fn update_national_records_with_seats(
        &self,
        election: &mut Election,
        allocations: &HashMap<String, u32>,
    ) {
        let election_id = election.id().to_string();
        let totals = fresh_party_totals(election);
        let names = fresh_party_names(election);

        let party_ids: BTreeSet<String> = totals
            .keys()
            .chain(allocations.keys())
            .cloned()
            .collect();
        for party_id in party_ids {
            let votes = totals.get(&party_id).copied().unwrap_or(0);
            let seats = allocations.get(&party_id).copied().unwrap_or(0);
            if votes == 0 && seats == 0 {
                continue;
            }
            let derived = National::derive_id(&election_id, &party_id, ResultType::PartyVotes);
            let updated = match election.national_votes().iter().find(|n| n.id == derived) {
                Some(existing) => existing.with_seats(seats),
                None => {
                    let name = names
                        .get(&party_id)
                        .cloned()
                        .unwrap_or_else(|| "Unknown Party".to_string());
                    National::new(
                        &election_id,
                        &party_id,
                        &name,
                        votes,
                        0,
                        votes,
                        seats,
                        ResultType::PartyVotes,
                    )
                }
            };
            election.replace_national_vote(&derived, updated);
        }
        election.set_seat_allocations(allocations.clone());
        self.cache.put(&election_id, election.clone());
    }

    /// Read-only view of the allocation: the stored table when present,
    /// otherwise whatever seat counts the national records carry. Never
    /// triggers a computation.
    pub fn seat_allocations(&self, election: &Election) -> HashMap<String, u32> {
        if !election.seat_allocations().is_empty() {
            return election.seat_allocations().clone();
        }
        election
            .national_votes()
            .iter()
            .filter(|n| n.result_type == ResultType::PartyVotes && n.number_of_seats > 0)
            .map(|n| (n.party_id.clone(), n.number_of_seats))
            .collect()
    }
}

impl Default for ElectionService {
    fn default() -> Self {
        ElectionService::new()
    }
}

/// Party vote totals summed over every municipality ledger in the tree.
pub fn fresh_party_totals(election: &Election) -> HashMap<String, u64> {
    let mut totals: HashMap<String, u64> = HashMap::new();
    for municipality in election.all_municipalities() {
        for (party_id, votes) in municipality.party_votes() {
            *totals.entry(party_id.clone()).or_insert(0) += votes;
        }
    }
    totals
}

/// Party names as observed in the ledgers, overridden by the registered
/// names from the definition files where those exist.
fn fresh_party_names(election: &Election) -> HashMap<String, String> {
    let mut names: HashMap<String, String> = HashMap::new();
    for municipality in election.all_municipalities() {
        for party_id in municipality.party_votes().keys() {
            if let Some(name) = municipality.party_name(party_id) {
                names.insert(party_id.clone(), name.to_string());
            }
        }
    }
    for party in election.parties() {
        names.insert(party.id.clone(), party.name.clone());
    }
    names
}

/// Copies the municipality ledgers up into the election-level party list,
/// creating entries for parties that were never formally registered.
fn roll_up_party_totals(election: &mut Election) {
    let totals = fresh_party_totals(election);
    let names = fresh_party_names(election);
    for (party_id, votes) in totals {
        match election.party_by_id(&party_id) {
            Some(party) => party.add_votes(votes),
            None => {
                let name = names
                    .get(&party_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown Party".to_string());
                let mut party = Party::new(&party_id, &name);
                party.add_votes(votes);
                election.add_party(party);
            }
        }
    }
}
