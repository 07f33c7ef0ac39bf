// One transformer per semantic category of EML content. Each receives flat
// attribute maps from the scanner and mutates the shared election aggregate.
// Contract for all of them: malformed fields degrade to defaults, unresolved
// references drop the record with a warning, nothing here ever aborts a
// parse run.

use log::{debug, info, warn};

use regex::Regex;

use crate::eml::model::*;
use crate::eml::{num_or_zero, str_or, AttributeMap};

// Tag and attribute names as they appear in the flattened records.
pub const AFFILIATION_ID: &str = "AffiliationIdentifier-Id";
pub const REGISTERED_NAME: &str = "RegisteredName";
pub const CONTEST_ID: &str = "ContestIdentifier-Id";
pub const CONTEST_NAME: &str = "ContestName";
pub const AUTHORITY_ID: &str = "AuthorityIdentifier-Id";
pub const AUTHORITY_NAME: &str = "AuthorityIdentifier";
pub const REPORTING_UNIT_ID: &str = "ReportingUnitIdentifier-Id";
pub const REPORTING_UNIT: &str = "ReportingUnitIdentifier";
pub const VALID_VOTES: &str = "ValidVotes";
pub const CANDIDATE_ID: &str = "CandidateIdentifier-Id";
pub const CANDIDATE_SHORT_CODE: &str = "CandidateIdentifier-ShortCode";
pub const FIRST_NAME: &str = "FirstName";
pub const LAST_NAME: &str = "LastName";
pub const NAME_LINE: &str = "NameLine";
pub const LOCALITY_NAME: &str = "LocalityName";
pub const CAST: &str = "Cast";
pub const COUNT: &str = "Count";

/// Counters for records the pipeline degraded or dropped. Referential
/// misses are ordering bugs on the caller side (definitions must be parsed
/// before votes), so they are observable here without crashing ingestion.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Diagnostics {
    pub skipped_party_registrations: u64,
    pub duplicate_candidates: u64,
    pub dropped_constituency_refs: u64,
    pub dropped_municipality_refs: u64,
    pub dropped_station_rows: u64,
    pub duplicate_national_records: u64,
    pub unmatched_short_codes: u64,
}

impl Diagnostics {
    pub fn total_dropped(&self) -> u64 {
        self.dropped_constituency_refs + self.dropped_municipality_refs + self.dropped_station_rows
    }
}

pub trait DefinitionTransformer {
    fn register_region(&self, election: &mut Election, diags: &mut Diagnostics, data: &AttributeMap);
    fn register_party(&self, election: &mut Election, diags: &mut Diagnostics, data: &AttributeMap);
}

pub trait CandidateTransformer {
    fn register_candidate(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        data: &AttributeMap,
    );
}

pub trait VotesTransformer {
    fn register_party_votes(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        aggregated: bool,
        data: &AttributeMap,
    );
    fn register_candidate_votes(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        aggregated: bool,
        data: &AttributeMap,
    );
    fn register_metadata(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        aggregated: bool,
        data: &AttributeMap,
    );
}

/// Handles region and party definitions.
pub struct DutchDefinitionTransformer;

impl DefinitionTransformer for DutchDefinitionTransformer {
    fn register_region(
        &self,
        _election: &mut Election,
        _diags: &mut Diagnostics,
        data: &AttributeMap,
    ) {
        debug!("register_region: {:?}", data);
    }

    fn register_party(&self, election: &mut Election, diags: &mut Diagnostics, data: &AttributeMap) {
        let party_id = data.get(AFFILIATION_ID).map(|s| s.trim()).unwrap_or("");
        let party_name = data.get(REGISTERED_NAME).map(|s| s.trim()).unwrap_or("");

        if party_id.is_empty() || party_name.is_empty() {
            info!("register_party: missing id or name, skipping: {:?}", data);
            diags.skipped_party_registrations += 1;
            return;
        }
        // Idempotent on re-parse.
        if election.has_party(party_id) {
            return;
        }
        debug!("register_party: {} - {}", party_id, party_name);
        election.add_party(Party::new(party_id, party_name));
    }
}

/// Handles the candidate lists.
pub struct DutchCandidateTransformer;

impl CandidateTransformer for DutchCandidateTransformer {
    fn register_candidate(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        data: &AttributeMap,
    ) {
        let raw_number = str_or(data, CANDIDATE_ID, "unknown");
        let party_id = str_or(data, AFFILIATION_ID, "unknown");
        let party_name = str_or(data, REGISTERED_NAME, "Unknown Party");
        let first_name = str_or(data, FIRST_NAME, "unknown");
        let last_name = str_or(data, LAST_NAME, "unknown");
        let initials = str_or(data, NAME_LINE, "unknown");
        let residence = str_or(data, LOCALITY_NAME, "unknown");

        // Rank numbers repeat across parties, so the id is composite.
        let candidate_id = format!("{}-{}", party_id, raw_number);
        let rank = raw_number.trim().parse::<u32>().unwrap_or(0);

        if election.has_candidate(&candidate_id) {
            debug!("register_candidate: duplicate id {}, skipping", candidate_id);
            diags.duplicate_candidates += 1;
            return;
        }
        debug!(
            "register_candidate: {} ({} {})",
            candidate_id, first_name, last_name
        );
        election.add_candidate(Candidate::new(
            &candidate_id,
            first_name,
            last_name,
            initials,
            residence,
            party_id,
            party_name,
            rank,
        ));
    }
}

/// Creates constituencies and their municipalities from the contest header
/// of a counting file. This must run before any vote row of the same file
/// is processed; vote rows never create regions themselves.
pub struct DutchConstituencyVotesTransformer;

impl VotesTransformer for DutchConstituencyVotesTransformer {
    fn register_party_votes(
        &self,
        _election: &mut Election,
        _diags: &mut Diagnostics,
        _aggregated: bool,
        _data: &AttributeMap,
    ) {
        // Vote rows are handled at municipality level.
    }

    fn register_candidate_votes(
        &self,
        _election: &mut Election,
        _diags: &mut Diagnostics,
        _aggregated: bool,
        _data: &AttributeMap,
    ) {
    }

    fn register_metadata(
        &self,
        election: &mut Election,
        _diags: &mut Diagnostics,
        aggregated: bool,
        data: &AttributeMap,
    ) {
        if !aggregated {
            return;
        }
        let contest_id = match data.get(CONTEST_ID) {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => {
                debug!("constituency metadata without contest id: {:?}", data);
                return;
            }
        };
        let contest_name = str_or(data, CONTEST_NAME, &contest_id).to_string();

        let mut shell = Constituency::new(&contest_id, &contest_name);
        if let Some(municipality_id) = data.get(AUTHORITY_ID).map(|s| s.trim().to_string()) {
            let already_known = election
                .constituencies()
                .iter()
                .find(|c| c.id == contest_id)
                .map(|c| c.has_municipality(&municipality_id))
                .unwrap_or(false);
            if !already_known && !municipality_id.is_empty() {
                let name = str_or(data, AUTHORITY_NAME, &municipality_id);
                let seed = num_or_zero(data, CAST);
                debug!(
                    "register_metadata: municipality {} ({}) in constituency {}",
                    municipality_id, name, contest_id
                );
                shell.add_municipality(Municipality::new(&municipality_id, name, seed));
            }
        }
        // Merge semantics: a second file for the same constituency only
        // appends its municipalities.
        election.add_constituency(shell);
    }
}

/// Handles municipality-level totals. Only aggregated rollup rows are
/// accepted here; raw per-station rows belong to the station transformer.
pub struct DutchMunicipalityVotesTransformer;

impl VotesTransformer for DutchMunicipalityVotesTransformer {
    fn register_party_votes(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        aggregated: bool,
        data: &AttributeMap,
    ) {
        if !aggregated {
            return;
        }
        let party_id = match data.get(AFFILIATION_ID) {
            Some(id) if !id.trim().is_empty() => id.trim(),
            _ => return,
        };
        let contest_id = match data.get(CONTEST_ID) {
            Some(id) if !id.trim().is_empty() => id.trim(),
            _ => return,
        };
        let votes = num_or_zero(data, VALID_VOTES);
        let party_name = str_or(data, REGISTERED_NAME, "Unknown").to_string();
        let municipality_id = str_or(data, AUTHORITY_ID, "").to_string();

        let constituency = match election.constituency_by_id(contest_id) {
            Some(c) => c,
            None => {
                warn!(
                    "register_party_votes: constituency {} not found, dropping record for party {}",
                    contest_id, party_id
                );
                diags.dropped_constituency_refs += 1;
                return;
            }
        };
        match constituency.municipality_by_id(&municipality_id) {
            Some(m) => m.add_votes_for_party(party_id, &party_name, votes),
            None => {
                warn!(
                    "register_party_votes: municipality {:?} not found in constituency {}",
                    municipality_id, contest_id
                );
                diags.dropped_municipality_refs += 1;
            }
        }
    }

    fn register_candidate_votes(
        &self,
        _election: &mut Election,
        _diags: &mut Diagnostics,
        _aggregated: bool,
        data: &AttributeMap,
    ) {
        // Candidate votes only matter at the national level.
        debug!("municipality candidate votes ignored: {:?}", data.get(CANDIDATE_ID));
    }

    fn register_metadata(
        &self,
        _election: &mut Election,
        _diags: &mut Diagnostics,
        _aggregated: bool,
        _data: &AttributeMap,
    ) {
    }
}

/// Handles polling-station (stembureau) rows. Stations are detected by the
/// SB pattern in the reporting-unit id and attached to the municipality
/// whose 4-digit id prefixes the station id.
pub struct DutchPollingStationVotesTransformer {
    station_pattern: Regex,
    municipality_prefix: Regex,
    postal_code: Regex,
}

impl DutchPollingStationVotesTransformer {
    pub fn new() -> DutchPollingStationVotesTransformer {
        DutchPollingStationVotesTransformer {
            station_pattern: Regex::new(r"SB\d+").expect("static regex"),
            municipality_prefix: Regex::new(r"^(\d{4})").expect("static regex"),
            postal_code: Regex::new(r"(?i)\(postcode\s*:\s*([0-9A-Z]{4}\s*[A-Z]{2})\)")
                .expect("static regex"),
        }
    }

    /// Extracts the municipality id from a station id, e.g. "0363SB001"
    /// resolves to "0363".
    fn extract_municipality_id<'a>(&self, station_id: &'a str) -> Option<&'a str> {
        self.municipality_prefix
            .captures(station_id)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Extracts and normalizes an embedded postal code, e.g.
    /// "Stembureau (postcode: 1011 PN)" resolves to "1011PN".
    pub fn extract_postal_code(&self, text: &str) -> Option<String> {
        self.postal_code
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replace(' ', "").to_uppercase())
    }
}

impl Default for DutchPollingStationVotesTransformer {
    fn default() -> Self {
        DutchPollingStationVotesTransformer::new()
    }
}

impl VotesTransformer for DutchPollingStationVotesTransformer {
    fn register_party_votes(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        _aggregated: bool,
        data: &AttributeMap,
    ) {
        let station_id = match data.get(REPORTING_UNIT_ID) {
            Some(id) => id.trim(),
            None => return,
        };
        let station_text = match data.get(REPORTING_UNIT) {
            Some(t) => t.as_str(),
            None => return,
        };
        if !self.station_pattern.is_match(station_id) {
            return;
        }
        let municipality_id = match self.extract_municipality_id(station_id) {
            Some(id) => id.to_string(),
            None => return,
        };
        let party_id = match data.get(AFFILIATION_ID) {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => return,
        };
        let party_name = str_or(data, REGISTERED_NAME, "Unknown").to_string();
        let votes = num_or_zero(data, VALID_VOTES);
        let postal_code = self.extract_postal_code(station_text);
        let station_name = station_text.to_string();
        let station_id = station_id.to_string();

        let municipality = match election.municipality_by_id(&municipality_id) {
            Some(m) => m,
            None => {
                // Unknown prefix: dropped without a warning, stations for
                // municipalities outside this election are expected noise.
                diags.dropped_station_rows += 1;
                return;
            }
        };
        if municipality.polling_station_by_id(&station_id).is_none() {
            municipality
                .add_polling_station(PollingStation::new(&station_id, &station_name, postal_code));
        }
        if let Some(station) = municipality.polling_station_by_id(&station_id) {
            station.add_votes(&party_id, &party_name, votes);
        }
    }

    fn register_candidate_votes(
        &self,
        _election: &mut Election,
        _diags: &mut Diagnostics,
        _aggregated: bool,
        _data: &AttributeMap,
    ) {
        // Station ledgers are per party only.
    }

    fn register_metadata(
        &self,
        _election: &mut Election,
        _diags: &mut Diagnostics,
        _aggregated: bool,
        _data: &AttributeMap,
    ) {
    }
}

/// Handles the national totals file: per-party national records, the
/// rejected-data record composed from the flat numeric fields, and the
/// candidate vote totals matched by short code.
pub struct DutchNationalVotesTransformer;

impl VotesTransformer for DutchNationalVotesTransformer {
    fn register_party_votes(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        aggregated: bool,
        data: &AttributeMap,
    ) {
        if !aggregated {
            return;
        }
        let party_id = match data.get(AFFILIATION_ID) {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => return,
        };
        let party_name = str_or(data, REGISTERED_NAME, "Unknown Party").to_string();
        let votes = num_or_zero(data, VALID_VOTES);

        let derived = National::derive_id(election.id(), &party_id, ResultType::PartyVotes);
        if election.has_national_record(&derived) {
            diags.duplicate_national_records += 1;
            return;
        }
        let election_id = election.id().to_string();
        election.add_national_votes(National::new(
            &election_id,
            &party_id,
            &party_name,
            votes,
            0,
            votes,
            0,
            ResultType::PartyVotes,
        ));
    }

    fn register_candidate_votes(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        aggregated: bool,
        data: &AttributeMap,
    ) {
        // Only the national rollup carries usable candidate totals.
        if !aggregated {
            return;
        }
        let short_code = match data.get(CANDIDATE_SHORT_CODE) {
            Some(sc) if !sc.trim().is_empty() => sc.trim().to_string(),
            _ => {
                debug!("national candidate votes without short code: {:?}", data.get(CANDIDATE_ID));
                return;
            }
        };
        let votes = if data.contains_key(VALID_VOTES) {
            num_or_zero(data, VALID_VOTES)
        } else {
            num_or_zero(data, COUNT)
        };
        match election.candidate_by_short_code(&short_code) {
            Some(candidate) => {
                candidate.add_votes(votes);
                candidate.short_code = Some(short_code.clone());
                debug!("added {} votes to candidate with short code {}", votes, short_code);
            }
            None => {
                warn!(
                    "candidate with short code {:?} not found in candidate list",
                    short_code
                );
                diags.unmatched_short_codes += 1;
            }
        }
    }

    fn register_metadata(
        &self,
        election: &mut Election,
        diags: &mut Diagnostics,
        aggregated: bool,
        data: &AttributeMap,
    ) {
        if !aggregated {
            return;
        }
        // The flat national record: all numeric fields default to 0.
        let party_id = match data.get(AFFILIATION_ID).or_else(|| data.get("id")) {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => return,
        };
        let max_votes = num_or_zero(data, "max_votes");
        let rejected = num_or_zero(data, "uncounted_votes");
        let valid = num_or_zero(data, "valid_votes");
        let total = num_or_zero(data, "total_votes");
        debug!(
            "national metadata: party {} max_votes {} valid {} rejected {} total {}",
            party_id, max_votes, valid, rejected, total
        );

        let derived = National::derive_id(election.id(), &party_id, ResultType::RejectedData);
        if election.has_national_record(&derived) {
            diags.duplicate_national_records += 1;
            return;
        }
        let party_name = str_or(data, REGISTERED_NAME, "Unknown Party").to_string();
        let election_id = election.id().to_string();
        election.add_national_votes(National::new(
            &election_id,
            &party_id,
            &party_name,
            valid,
            rejected,
            total,
            0,
            ResultType::RejectedData,
        ));
    }
}

/// The full set wired into a scan run. Transformers are stateless; the
/// counters travel separately so one set can serve many runs.
pub struct TransformerSet {
    pub definition: DutchDefinitionTransformer,
    pub candidates: DutchCandidateTransformer,
    pub national: DutchNationalVotesTransformer,
    pub constituency: DutchConstituencyVotesTransformer,
    pub municipality: DutchMunicipalityVotesTransformer,
    pub polling_station: DutchPollingStationVotesTransformer,
}

impl TransformerSet {
    pub fn new() -> TransformerSet {
        TransformerSet {
            definition: DutchDefinitionTransformer,
            candidates: DutchCandidateTransformer,
            national: DutchNationalVotesTransformer,
            constituency: DutchConstituencyVotesTransformer,
            municipality: DutchMunicipalityVotesTransformer,
            polling_station: DutchPollingStationVotesTransformer::new(),
        }
    }
}

impl Default for TransformerSet {
    fn default() -> Self {
        TransformerSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn election_with_municipality() -> Election {
        let mut election = Election::new("TK2023");
        let mut c = Constituency::new("9", "Amsterdam");
        c.add_municipality(Municipality::new("0363", "Amsterdam", 0));
        election.add_constituency(c);
        election
    }

    #[test]
    fn party_registration_requires_id_and_name() {
        let t = DutchDefinitionTransformer;
        let mut election = Election::new("TK2023");
        let mut diags = Diagnostics::default();

        t.register_party(&mut election, &mut diags, &map(&[(AFFILIATION_ID, "P1")]));
        t.register_party(&mut election, &mut diags, &map(&[(REGISTERED_NAME, "X")]));
        t.register_party(
            &mut election,
            &mut diags,
            &map(&[(AFFILIATION_ID, "P1"), (REGISTERED_NAME, "  ")]),
        );
        assert!(election.parties().is_empty());
        assert_eq!(diags.skipped_party_registrations, 3);

        t.register_party(
            &mut election,
            &mut diags,
            &map(&[(AFFILIATION_ID, "P1"), (REGISTERED_NAME, "Party One")]),
        );
        // Duplicate ids are silently ignored.
        t.register_party(
            &mut election,
            &mut diags,
            &map(&[(AFFILIATION_ID, "P1"), (REGISTERED_NAME, "Party One Again")]),
        );
        assert_eq!(election.parties().len(), 1);
        assert_eq!(election.parties()[0].name, "Party One");
    }

    #[test]
    fn candidate_registration_defaults_and_composite_id() {
        let t = DutchCandidateTransformer;
        let mut election = Election::new("TK2023");
        let mut diags = Diagnostics::default();

        t.register_candidate(
            &mut election,
            &mut diags,
            &map(&[
                (CANDIDATE_ID, "3"),
                (AFFILIATION_ID, "P1"),
                (REGISTERED_NAME, "Party One"),
                (FIRST_NAME, "Anna"),
                (LAST_NAME, "Visser"),
                (NAME_LINE, "A."),
                (LOCALITY_NAME, "Utrecht"),
            ]),
        );
        assert_eq!(election.candidates().len(), 1);
        let c = &election.candidates()[0];
        assert_eq!(c.id, "P1-3");
        assert_eq!(c.rank, 3);

        // No fields at all: everything defaults, including the rank.
        t.register_candidate(&mut election, &mut diags, &map(&[]));
        assert_eq!(election.candidates().len(), 2);
        let d = &election.candidates()[1];
        assert_eq!(d.id, "unknown-unknown");
        assert_eq!(d.rank, 0);
        assert_eq!(d.first_name, "unknown");
        assert_eq!(d.party_name, "Unknown Party");
    }

    #[test]
    fn duplicate_candidate_is_skipped() {
        let t = DutchCandidateTransformer;
        let mut election = Election::new("TK2023");
        let mut diags = Diagnostics::default();
        let data = map(&[
            (CANDIDATE_ID, "1"),
            (AFFILIATION_ID, "P1"),
            (FIRST_NAME, "Anna"),
        ]);
        t.register_candidate(&mut election, &mut diags, &data);
        t.register_candidate(&mut election, &mut diags, &data);
        assert_eq!(election.candidates().len(), 1);
        assert_eq!(diags.duplicate_candidates, 1);
    }

    #[test]
    fn constituency_metadata_creates_and_merges() {
        let t = DutchConstituencyVotesTransformer;
        let mut election = Election::new("TK2023");
        let mut diags = Diagnostics::default();

        t.register_metadata(
            &mut election,
            &mut diags,
            true,
            &map(&[
                (CONTEST_ID, "9"),
                (CONTEST_NAME, "Amsterdam"),
                (AUTHORITY_ID, "0363"),
                (AUTHORITY_NAME, "Amsterdam"),
            ]),
        );
        t.register_metadata(
            &mut election,
            &mut diags,
            true,
            &map(&[
                (CONTEST_ID, "9"),
                (CONTEST_NAME, "Amsterdam"),
                (AUTHORITY_ID, "0437"),
                (AUTHORITY_NAME, "Ouder-Amstel"),
            ]),
        );
        // Same municipality again: no duplicate entry.
        t.register_metadata(
            &mut election,
            &mut diags,
            true,
            &map(&[(CONTEST_ID, "9"), (AUTHORITY_ID, "0363")]),
        );

        assert_eq!(election.constituencies().len(), 1);
        assert_eq!(election.constituencies()[0].municipalities().len(), 2);
    }

    #[test]
    fn municipality_votes_skip_non_aggregated_rows() {
        let t = DutchMunicipalityVotesTransformer;
        let mut election = election_with_municipality();
        let mut diags = Diagnostics::default();
        let data = map(&[
            (CONTEST_ID, "9"),
            (AUTHORITY_ID, "0363"),
            (AFFILIATION_ID, "P1"),
            (REGISTERED_NAME, "Party One"),
            (VALID_VOTES, "250"),
        ]);

        t.register_party_votes(&mut election, &mut diags, false, &data);
        assert_eq!(election.municipality_by_id("0363").unwrap().valid_votes(), 0);

        t.register_party_votes(&mut election, &mut diags, true, &data);
        let m = election.municipality_by_id("0363").unwrap();
        assert_eq!(m.party_votes().get("P1"), Some(&250));
    }

    #[test]
    fn municipality_votes_drop_unknown_constituency_with_warning() {
        let t = DutchMunicipalityVotesTransformer;
        let mut election = election_with_municipality();
        let mut diags = Diagnostics::default();
        t.register_party_votes(
            &mut election,
            &mut diags,
            true,
            &map(&[
                (CONTEST_ID, "99"),
                (AUTHORITY_ID, "0363"),
                (AFFILIATION_ID, "P1"),
                (VALID_VOTES, "250"),
            ]),
        );
        assert_eq!(diags.dropped_constituency_refs, 1);
        assert_eq!(election.municipality_by_id("0363").unwrap().valid_votes(), 0);
    }

    #[test]
    fn malformed_vote_count_degrades_to_zero() {
        let t = DutchMunicipalityVotesTransformer;
        let mut election = election_with_municipality();
        let mut diags = Diagnostics::default();
        t.register_party_votes(
            &mut election,
            &mut diags,
            true,
            &map(&[
                (CONTEST_ID, "9"),
                (AUTHORITY_ID, "0363"),
                (AFFILIATION_ID, "P1"),
                (VALID_VOTES, "tweehonderd"),
            ]),
        );
        let m = election.municipality_by_id("0363").unwrap();
        assert_eq!(m.party_votes().get("P1"), Some(&0));
    }

    #[test]
    fn polling_station_created_once_and_reused() {
        let t = DutchPollingStationVotesTransformer::new();
        let mut election = election_with_municipality();
        let mut diags = Diagnostics::default();

        let first = map(&[
            (REPORTING_UNIT_ID, "0363SB001"),
            (REPORTING_UNIT, "Stembureau Oost (postcode: 1011 PN)"),
            (AFFILIATION_ID, "P1"),
            (VALID_VOTES, "100"),
        ]);
        let second = map(&[
            (REPORTING_UNIT_ID, "0363SB001"),
            (REPORTING_UNIT, "Stembureau Oost (postcode: 1011 PN)"),
            (AFFILIATION_ID, "P2"),
            (VALID_VOTES, "40"),
        ]);
        t.register_party_votes(&mut election, &mut diags, false, &first);
        t.register_party_votes(&mut election, &mut diags, false, &second);

        let m = election.municipality_by_id("0363").unwrap();
        assert_eq!(m.polling_stations().len(), 1);
        let station = &m.polling_stations()[0];
        assert_eq!(station.postal_code.as_deref(), Some("1011PN"));
        assert_eq!(station.votes_for("P1"), 100);
        assert_eq!(station.votes_for("P2"), 40);
        assert_eq!(station.valid_votes(), 140);
    }

    #[test]
    fn polling_station_rows_without_sb_pattern_are_ignored() {
        let t = DutchPollingStationVotesTransformer::new();
        let mut election = election_with_municipality();
        let mut diags = Diagnostics::default();
        t.register_party_votes(
            &mut election,
            &mut diags,
            false,
            &map(&[
                (REPORTING_UNIT_ID, "0363"),
                (REPORTING_UNIT, "Gemeente Amsterdam"),
                (AFFILIATION_ID, "P1"),
                (VALID_VOTES, "100"),
            ]),
        );
        let m = election.municipality_by_id("0363").unwrap();
        assert!(m.polling_stations().is_empty());
        assert_eq!(diags.dropped_station_rows, 0);
    }

    #[test]
    fn polling_station_with_unknown_prefix_drops_silently() {
        let t = DutchPollingStationVotesTransformer::new();
        let mut election = election_with_municipality();
        let mut diags = Diagnostics::default();
        t.register_party_votes(
            &mut election,
            &mut diags,
            false,
            &map(&[
                (REPORTING_UNIT_ID, "9999SB007"),
                (REPORTING_UNIT, "Stembureau Elders"),
                (AFFILIATION_ID, "P1"),
                (VALID_VOTES, "100"),
            ]),
        );
        assert_eq!(diags.dropped_station_rows, 1);
    }

    #[test]
    fn postal_code_extraction_normalizes() {
        let t = DutchPollingStationVotesTransformer::new();
        assert_eq!(
            t.extract_postal_code("Stembureau (postcode: 1011 PN)"),
            Some("1011PN".to_string())
        );
        assert_eq!(
            t.extract_postal_code("Stembureau (Postcode: 1431bz)"),
            Some("1431BZ".to_string())
        );
        assert_eq!(t.extract_postal_code("Stembureau Oost"), None);
    }

    #[test]
    fn national_metadata_defaults_and_skips_duplicates() {
        let t = DutchNationalVotesTransformer;
        let mut election = Election::new("TK2023");
        let mut diags = Diagnostics::default();
        let data = map(&[
            ("id", "geldige stemmen"),
            ("max_votes", "13000000"),
            ("uncounted_votes", "not-a-number"),
            ("valid_votes", "10400000"),
            ("total_votes", "10500000"),
        ]);
        t.register_metadata(&mut election, &mut diags, true, &data);
        t.register_metadata(&mut election, &mut diags, true, &data);

        assert_eq!(election.national_votes().len(), 1);
        let n = &election.national_votes()[0];
        assert_eq!(n.valid_votes, 10_400_000);
        assert_eq!(n.rejected_votes, 0); // malformed, degraded
        assert_eq!(n.total_counted, 10_500_000);
        assert_eq!(diags.duplicate_national_records, 1);
    }

    #[test]
    fn national_candidate_votes_match_short_code() {
        let t = DutchNationalVotesTransformer;
        let mut election = Election::new("TK2023");
        let mut diags = Diagnostics::default();
        election.add_candidate(Candidate::new(
            "P1-1", "Test", "Tester", "T.", "Amsterdam", "P1", "Test Party", 1,
        ));

        t.register_candidate_votes(
            &mut election,
            &mut diags,
            true,
            &map(&[(CANDIDATE_SHORT_CODE, "TesterT"), (VALID_VOTES, "1234")]),
        );
        assert_eq!(election.candidates()[0].votes, 1234);
        assert_eq!(election.candidates()[0].short_code.as_deref(), Some("TesterT"));

        // Non-aggregated records are skipped.
        t.register_candidate_votes(
            &mut election,
            &mut diags,
            false,
            &map(&[(CANDIDATE_SHORT_CODE, "TesterT"), (VALID_VOTES, "999")]),
        );
        assert_eq!(election.candidates()[0].votes, 1234);

        // Count is the fallback when ValidVotes is absent.
        t.register_candidate_votes(
            &mut election,
            &mut diags,
            true,
            &map(&[(CANDIDATE_SHORT_CODE, "TesterT"), (COUNT, "77")]),
        );
        assert_eq!(election.candidates()[0].votes, 1311);

        t.register_candidate_votes(
            &mut election,
            &mut diags,
            true,
            &map(&[(CANDIDATE_SHORT_CODE, "NobodyX"), (VALID_VOTES, "5")]),
        );
        assert_eq!(diags.unmatched_short_codes, 1);
    }
}
