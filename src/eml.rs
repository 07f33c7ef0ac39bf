use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use serde_json::json;
use serde_json::Value as JSValue;

use text_diff::print_diff;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use dhondt::AllocationRules;

pub mod cache;
pub mod model;
pub mod scanner;
pub mod service;
pub mod transformers;

/// One flattened XML record: element text keyed by element name, attributes
/// keyed by `"{Element}-{Attribute}"` (e.g. `AffiliationIdentifier-Id`).
pub type AttributeMap = HashMap<String, String>;

#[derive(Debug, Snafu)]
pub enum EmlError {
    #[snafu(display("Data folder does not exist: {}", path.display()))]
    MissingDataFolder { path: PathBuf },

    #[snafu(display("Error walking the data folder"))]
    FolderWalk { source: walkdir::Error },

    #[snafu(display("Error reading XML file {path}"))]
    OpeningXml {
        source: quick_xml::Error,
        path: String,
    },

    #[snafu(display("Malformed XML stream in {path}"))]
    XmlSyntax {
        source: quick_xml::Error,
        path: String,
    },

    #[snafu(display(""))]
    OpeningJson { source: std::io::Error },

    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type EmlResult<T> = Result<T, EmlError>;

/// Parse-or-default: a malformed or missing integer attribute degrades to 0.
/// A single bad field must never abort the pipeline.
pub fn num_or_zero(data: &AttributeMap, key: &str) -> u64 {
    match data.get(key).map(|s| s.trim().parse::<u64>()) {
        Some(Ok(x)) => x,
        Some(Err(_)) => {
            debug!("num_or_zero: unparseable value for {}: {:?}", key, data.get(key));
            0
        }
        None => 0,
    }
}

/// The string attribute under `key`, or the given default when it is
/// missing or empty.
pub fn str_or<'a>(data: &'a AttributeMap, key: &str, default: &'a str) -> &'a str {
    match data.get(key) {
        Some(s) if !s.trim().is_empty() => s,
        _ => default,
    }
}

pub mod config_reader {
    use crate::eml::*;
    use serde::{Deserialize, Serialize};
    use snafu::prelude::*;
    use std::fs;

    /// A JSON description of one tabulation run. Command-line flags override
    /// the corresponding fields.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct TallyConfig {
        #[serde(rename = "electionId")]
        pub election_id: String,
        #[serde(rename = "dataFolder")]
        pub data_folder: Option<String>,
        #[serde(rename = "totalSeats")]
        pub total_seats: Option<u32>,
        #[serde(rename = "outputPath")]
        pub output_path: Option<String>,
        #[serde(rename = "referencePath")]
        pub reference_path: Option<String>,
        #[serde(rename = "includeCandidates")]
        pub include_candidates: Option<bool>,
    }

    pub fn read_config(path: &str) -> EmlResult<TallyConfig> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
        let config: TallyConfig =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        debug!("read_config: {:?}", config);
        Ok(config)
    }
}

fn read_summary(path: &str) -> EmlResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("read_summary: {:?}", js);
    Ok(js)
}

fn build_summary_js(
    election: &model::Election,
    result: &dhondt::AllocationResult,
    total_seats: u32,
) -> JSValue {
    let mut seats = result.seats.clone();
    seats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let allocations: Vec<JSValue> = seats
        .iter()
        .map(|(party_id, count)| {
            let name = election
                .parties()
                .iter()
                .find(|p| &p.id == party_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| party_id.clone());
            json!({"party": party_id, "partyName": name, "seats": count})
        })
        .collect();
    json!({
        "config": {
            "election": election.id(),
            "totalSeats": total_seats,
        },
        "results": {
            "constituencies": election.constituencies().len(),
            "municipalities": election.all_municipalities().count(),
            "parties": election.parties().len(),
            "candidates": election.candidates().len(),
            "totalValidVotes": result.total_valid_votes.to_string(),
            "threshold": result.threshold.to_string(),
            "seats": allocations,
        }
    })
}

/// Runs one full tabulation: parse the folder, allocate the seats, fold
/// them back into the national records, emit the summary and optionally
/// compare it against a reference.
pub fn run_tally(
    config: config_reader::TallyConfig,
    check_summary_path: Option<String>,
) -> EmlResult<()> {
    let election_id = config.election_id.trim().to_string();
    let folder = match &config.data_folder {
        Some(f) => PathBuf::from(f),
        None => whatever!("No data folder given for election {}", election_id),
    };
    let rules = match config.total_seats {
        Some(s) => AllocationRules::with_seats(s),
        None => AllocationRules::DEFAULT_RULES,
    };
    let total_seats = rules.total_seats;
    let service = service::ElectionService::with_rules(rules);

    let mut election = match service.read_results(&election_id, &folder) {
        Some(e) => e,
        None => whatever!(
            "Parsing {} produced no results, see the log for details",
            folder.display()
        ),
    };
    if config.include_candidates.unwrap_or(false) {
        service.load_candidate_lists(&mut election, &folder);
    }

    let result = match service.allocate(&election) {
        Some(r) => r,
        None => whatever!("Seat allocation failed for election {}", election_id),
    };
    let allocations: HashMap<String, u32> = result.seats.iter().cloned().collect();
    service.update_national_records_with_seats(&mut election, &allocations);

    let result_js = build_summary_js(&election, &result, total_seats);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    match config.output_path.as_deref() {
        Some("stdout") | None => println!("{}", pretty_js_stats),
        Some(path) => {
            fs::write(path, &pretty_js_stats).context(OpeningJsonSnafu {})?;
            info!("run_tally: summary written to {}", path);
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}
