// The hierarchical election aggregate: Election -> Constituency ->
// Municipality -> PollingStation, plus the flat party/candidate/national
// collections. Transformers write into it during a parse run; the seat
// allocation reads the municipality ledgers back out.

use std::collections::HashMap;

/// The kind of data a `National` record carries.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ResultType {
    /// Regular party vote data.
    PartyVotes,
    /// Rejected votes and total counted data.
    RejectedData,
    /// Seat allocation data.
    Seats,
}

impl ResultType {
    pub fn tag(&self) -> &'static str {
        match self {
            ResultType::PartyVotes => "PARTY_VOTES",
            ResultType::RejectedData => "REJECTED_DATA",
            ResultType::Seats => "SEATS",
        }
    }
}

/// A political party, either nationally or locally (per municipality).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Party {
    pub id: String,
    pub name: String,
    votes: u64,
}

impl Party {
    pub fn new(id: &str, name: &str) -> Party {
        Party {
            id: id.to_string(),
            name: name.to_string(),
            votes: 0,
        }
    }

    pub fn votes(&self) -> u64 {
        self.votes
    }

    /// Additive: repeated aggregation from multiple source rows never
    /// overwrites a previous total.
    pub fn add_votes(&mut self, votes: u64) {
        self.votes += votes;
    }
}

/// A candidate on a party list. The composite id is
/// `"{party_id}-{rank}"` since rank numbers repeat across parties.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub initials: String,
    pub residence: String,
    pub party_id: String,
    pub party_name: String,
    /// Position on the party list.
    pub rank: u32,
    /// Set in the vote-aggregation pass, e.g. "JettenRAA".
    pub short_code: Option<String>,
    pub votes: u64,
}

impl Candidate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: &str,
        first_name: &str,
        last_name: &str,
        initials: &str,
        residence: &str,
        party_id: &str,
        party_name: &str,
        rank: u32,
    ) -> Candidate {
        Candidate {
            id: id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            initials: initials.to_string(),
            residence: residence.to_string(),
            party_id: party_id.to_string(),
            party_name: party_name.to_string(),
            rank,
            short_code: None,
            votes: 0,
        }
    }

    pub fn add_votes(&mut self, votes: u64) {
        self.votes += votes;
    }

    /// The short code as used in the totals files: last name plus all
    /// initials with the dots stripped ("R.A.A." -> "RAA").
    pub fn constructed_short_code(&self) -> Option<String> {
        if self.last_name.trim().is_empty() {
            return None;
        }
        let letters: String = self.initials.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.last_name.trim(), letters))
    }
}

/// An immutable national-level record keyed by
/// `(election_id, party_id, result_type)`. Updates are performed by
/// constructing a replacement and swapping it into the election's
/// collection, never by in-place mutation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct National {
    pub id: String,
    pub election_id: String,
    pub party_id: String,
    pub party_name: String,
    pub valid_votes: u64,
    pub rejected_votes: u64,
    pub total_counted: u64,
    pub number_of_seats: u32,
    pub result_type: ResultType,
}

impl National {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        election_id: &str,
        party_id: &str,
        party_name: &str,
        valid_votes: u64,
        rejected_votes: u64,
        total_counted: u64,
        number_of_seats: u32,
        result_type: ResultType,
    ) -> National {
        National {
            id: National::derive_id(election_id, party_id, result_type),
            election_id: election_id.to_string(),
            party_id: party_id.to_string(),
            party_name: party_name.to_string(),
            valid_votes,
            rejected_votes,
            total_counted,
            number_of_seats,
            result_type,
        }
    }

    pub fn derive_id(election_id: &str, party_id: &str, result_type: ResultType) -> String {
        format!("{}-{}-{}", election_id, party_id, result_type.tag())
    }

    /// A copy of this record with a different seat count.
    pub fn with_seats(&self, number_of_seats: u32) -> National {
        National {
            number_of_seats,
            ..self.clone()
        }
    }
}

/// The smallest reporting unit. The raw id carries a 4-digit municipality
/// prefix and an SB suffix, e.g. `0363SB001`.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PollingStation {
    pub id: String,
    pub name: String,
    /// Normalized: uppercase, no spaces ("1011PN").
    pub postal_code: Option<String>,
    valid_votes: u64,
    party_votes: HashMap<String, u64>,
    party_names: HashMap<String, String>,
}

impl PollingStation {
    pub fn new(id: &str, name: &str, postal_code: Option<String>) -> PollingStation {
        PollingStation {
            id: id.to_string(),
            name: name.to_string(),
            postal_code,
            valid_votes: 0,
            party_votes: HashMap::new(),
            party_names: HashMap::new(),
        }
    }

    pub fn add_votes(&mut self, party_id: &str, party_name: &str, votes: u64) {
        *self.party_votes.entry(party_id.to_string()).or_insert(0) += votes;
        self.party_names
            .insert(party_id.to_string(), party_name.to_string());
        self.valid_votes += votes;
    }

    pub fn valid_votes(&self) -> u64 {
        self.valid_votes
    }

    pub fn votes_for(&self, party_id: &str) -> u64 {
        self.party_votes.get(party_id).copied().unwrap_or(0)
    }
}

/// A sub-district grouping polling stations (gemeente).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Municipality {
    pub id: String,
    pub name: String,
    valid_votes: u64,
    party_votes: HashMap<String, u64>,
    party_names: HashMap<String, String>,
    polling_stations: Vec<PollingStation>,
}

impl Municipality {
    pub fn new(id: &str, name: &str, valid_votes: u64) -> Municipality {
        Municipality {
            id: id.to_string(),
            name: name.to_string(),
            valid_votes,
            party_votes: HashMap::new(),
            party_names: HashMap::new(),
            polling_stations: Vec::new(),
        }
    }

    pub fn valid_votes(&self) -> u64 {
        self.valid_votes
    }

    pub fn add_votes_for_party(&mut self, party_id: &str, party_name: &str, votes: u64) {
        *self.party_votes.entry(party_id.to_string()).or_insert(0) += votes;
        self.party_names
            .insert(party_id.to_string(), party_name.to_string());
        self.valid_votes += votes;
    }

    /// The per-party ledger used by the seat-allocation rollup.
    pub fn party_votes(&self) -> &HashMap<String, u64> {
        &self.party_votes
    }

    pub fn party_name(&self, party_id: &str) -> Option<&str> {
        self.party_names.get(party_id).map(|s| s.as_str())
    }

    pub fn add_polling_station(&mut self, station: PollingStation) {
        self.valid_votes += station.valid_votes();
        self.polling_stations.push(station);
    }

    pub fn polling_stations(&self) -> &[PollingStation] {
        &self.polling_stations
    }

    pub fn polling_station_by_id(&mut self, station_id: &str) -> Option<&mut PollingStation> {
        self.polling_stations
            .iter_mut()
            .find(|s| s.id == station_id)
    }
}

/// A top-level electoral district grouping municipalities (kieskring).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Constituency {
    pub id: String,
    pub name: String,
    municipalities: Vec<Municipality>,
    total_votes: u64,
}

impl Constituency {
    pub fn new(id: &str, name: &str) -> Constituency {
        Constituency {
            id: id.to_string(),
            name: name.to_string(),
            municipalities: Vec::new(),
            total_votes: 0,
        }
    }

    pub fn add_municipality(&mut self, m: Municipality) {
        self.total_votes += m.valid_votes();
        self.municipalities.push(m);
    }

    pub fn municipalities(&self) -> &[Municipality] {
        &self.municipalities
    }

    pub fn municipality_by_id(&mut self, municipality_id: &str) -> Option<&mut Municipality> {
        self.municipalities
            .iter_mut()
            .find(|m| m.id == municipality_id)
    }

    pub fn has_municipality(&self, municipality_id: &str) -> bool {
        self.municipalities.iter().any(|m| m.id == municipality_id)
    }

    pub fn total_votes(&self) -> u64 {
        self.total_votes
    }
}

/// The root aggregate for one election run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Election {
    id: String,
    constituencies: Vec<Constituency>,
    parties: Vec<Party>,
    candidates: Vec<Candidate>,
    national_votes: Vec<National>,
    seat_allocations: HashMap<String, u32>,
}

impl Election {
    pub fn new(id: &str) -> Election {
        Election {
            id: id.to_string(),
            constituencies: Vec::new(),
            parties: Vec::new(),
            candidates: Vec::new(),
            national_votes: Vec::new(),
            seat_allocations: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Adds a constituency, merging on id clash: municipalities from the new
    /// constituency are appended to the existing one instead of replacing
    /// it. This is what allows a definitions file and one or more result
    /// files to be parsed independently into the same election without
    /// duplicating top-level entries.
    pub fn add_constituency(&mut self, new: Constituency) {
        match self.constituencies.iter_mut().find(|c| c.id == new.id) {
            Some(existing) => {
                for m in new.municipalities {
                    existing.add_municipality(m);
                }
            }
            None => self.constituencies.push(new),
        }
    }

    pub fn constituencies(&self) -> &[Constituency] {
        &self.constituencies
    }

    pub fn constituency_by_id(&mut self, id: &str) -> Option<&mut Constituency> {
        self.constituencies.iter_mut().find(|c| c.id == id)
    }

    pub fn add_party(&mut self, party: Party) {
        self.parties.push(party);
    }

    pub fn parties(&self) -> &[Party] {
        &self.parties
    }

    pub fn party_by_id(&mut self, party_id: &str) -> Option<&mut Party> {
        self.parties.iter_mut().find(|p| p.id == party_id)
    }

    pub fn has_party(&self, party_id: &str) -> bool {
        self.parties.iter().any(|p| p.id == party_id)
    }

    pub fn add_candidate(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn has_candidate(&self, candidate_id: &str) -> bool {
        self.candidates.iter().any(|c| c.id == candidate_id)
    }

    /// Matches a short code from a totals file against the stored short code
    /// or, failing that, the code constructed from last name and initials.
    pub fn candidate_by_short_code(&mut self, short_code: &str) -> Option<&mut Candidate> {
        let wanted = short_code.trim();
        if wanted.is_empty() {
            return None;
        }
        self.candidates.iter_mut().find(|c| {
            match (&c.short_code, c.constructed_short_code()) {
                (Some(sc), _) if sc.eq_ignore_ascii_case(wanted) => true,
                (_, Some(built)) => built.eq_ignore_ascii_case(wanted),
                _ => false,
            }
        })
    }

    pub fn add_national_votes(&mut self, national: National) {
        self.national_votes.push(national);
    }

    pub fn national_votes(&self) -> &[National] {
        &self.national_votes
    }

    pub fn has_national_record(&self, national_id: &str) -> bool {
        self.national_votes.iter().any(|n| n.id == national_id)
    }

    /// Swaps in a replacement for the record with the same id, appending it
    /// when no such record exists.
    pub fn replace_national_vote(&mut self, national_id: &str, updated: National) {
        match self.national_votes.iter_mut().find(|n| n.id == national_id) {
            Some(slot) => *slot = updated,
            None => self.national_votes.push(updated),
        }
    }

    pub fn set_seat_allocations(&mut self, allocations: HashMap<String, u32>) {
        self.seat_allocations = allocations;
    }

    pub fn seat_allocations(&self) -> &HashMap<String, u32> {
        &self.seat_allocations
    }

    pub fn all_municipalities(&self) -> impl Iterator<Item = &Municipality> {
        self.constituencies.iter().flat_map(|c| c.municipalities().iter())
    }

    /// Walks the whole tree for the municipality with this id.
    pub fn municipality_by_id(&mut self, municipality_id: &str) -> Option<&mut Municipality> {
        self.constituencies
            .iter_mut()
            .find_map(|c| c.municipality_by_id(municipality_id))
    }
}
