// Streaming reader for the EML XML exports. Documents are flattened into
// per-element attribute maps: a stack of scope frames mirrors the open
// elements, element text is stored under the element name, attributes under
// "{Element}-{Attribute}". When an element closes, its frame is dispatched
// to the transformers (with all enclosing scopes merged in) and then folded
// into the parent frame, so identifiers naturally stay visible to later
// siblings.

use log::{debug, info};

use quick_xml::events::Event;
use quick_xml::Reader;

use snafu::prelude::*;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::eml::model::Election;
use crate::eml::transformers::{Diagnostics, TransformerSet};
use crate::eml::transformers::{
    CandidateTransformer, DefinitionTransformer, VotesTransformer,
};
use crate::eml::{
    AttributeMap, EmlResult, FolderWalkSnafu, MissingDataFolderSnafu, OpeningXmlSnafu,
    XmlSyntaxSnafu,
};

/// The four kinds of export files, recognized by their filename prefix.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum FileKind {
    /// Verkiezingsdefinitie: region and party definitions.
    Definition,
    /// Kandidatenlijsten: the party candidate lists.
    CandidateList,
    /// Telling: per-constituency counts with municipality and station rows.
    MunicipalityCounts,
    /// Totaaltelling: the national rollup.
    NationalTotals,
}

impl FileKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            FileKind::Definition => "Verkiezingsdefinitie",
            FileKind::CandidateList => "Kandidatenlijsten",
            FileKind::MunicipalityCounts => "Telling",
            FileKind::NationalTotals => "Totaaltelling",
        }
    }
}

/// Parses the definition, count and total files of a folder into the
/// election. Definitions are scanned first: vote rows only attach to
/// regions and parties that already exist.
pub fn parse_results(
    election: &mut Election,
    folder: &Path,
    set: &TransformerSet,
    diags: &mut Diagnostics,
) -> EmlResult<()> {
    scan_folder(
        election,
        folder,
        &[
            FileKind::Definition,
            FileKind::MunicipalityCounts,
            FileKind::NationalTotals,
        ],
        set,
        diags,
    )
}

/// Parses the candidate lists, then the national totals so that candidate
/// vote counts can be matched onto the fresh list by short code.
pub fn parse_candidate_lists(
    election: &mut Election,
    folder: &Path,
    set: &TransformerSet,
    diags: &mut Diagnostics,
) -> EmlResult<()> {
    scan_folder(
        election,
        folder,
        &[FileKind::CandidateList, FileKind::NationalTotals],
        set,
        diags,
    )
}

fn scan_folder(
    election: &mut Election,
    folder: &Path,
    kinds: &[FileKind],
    set: &TransformerSet,
    diags: &mut Diagnostics,
) -> EmlResult<()> {
    ensure!(
        folder.is_dir(),
        MissingDataFolderSnafu {
            path: folder.to_path_buf()
        }
    );
    for kind in kinds {
        for path in files_to_scan(folder, *kind)? {
            info!("scanning {:?} file {}", kind, path.display());
            scan_file(election, &path, *kind, set, diags)?;
        }
    }
    Ok(())
}

/// All `.xml` files under the folder whose name carries the kind's prefix,
/// in a stable order.
pub fn files_to_scan(folder: &Path, kind: FileKind) -> EmlResult<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(folder) {
        let entry = entry.context(FolderWalkSnafu {})?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with(kind.prefix()) && name.ends_with(".xml") {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

struct Frame {
    name: String,
    map: AttributeMap,
}

fn scan_file(
    election: &mut Election,
    path: &Path,
    kind: FileKind,
    set: &TransformerSet,
    diags: &mut Diagnostics,
) -> EmlResult<()> {
    let path_str = path.display().to_string();
    let mut reader = Reader::from_file(path).context(OpeningXmlSnafu {
        path: path_str.as_str(),
    })?;
    reader.trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .context(XmlSyntaxSnafu {
                path: path_str.as_str(),
            })?;
        match event {
            Event::Start(ref e) => {
                let mut frame = Frame {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    map: AttributeMap::new(),
                };
                read_attributes(&mut frame, e);
                stack.push(frame);
            }
            Event::Empty(ref e) => {
                let mut frame = Frame {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    map: AttributeMap::new(),
                };
                read_attributes(&mut frame, e);
                close_frame(election, kind, &mut stack, frame, set, diags);
            }
            Event::Text(ref t) => {
                if let (Some(frame), Ok(text)) = (stack.last_mut(), t.unescape()) {
                    let text = text.trim();
                    if !text.is_empty() {
                        frame.map.insert(frame.name.clone(), text.to_string());
                    }
                }
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    close_frame(election, kind, &mut stack, frame, set, diags);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn read_attributes(frame: &mut Frame, e: &quick_xml::events::BytesStart) {
    for attr in e.attributes().flatten() {
        if let Ok(value) = attr.unescape_value() {
            let key = format!(
                "{}-{}",
                frame.name,
                String::from_utf8_lossy(attr.key.local_name().as_ref())
            );
            frame.map.insert(key, value.into_owned());
        }
    }
}

// Vote counts and flat national fields belong to exactly one record. They
// may travel from their leaf element to the record that owns them, but
// never from a closed record to a later sibling: a Selection missing its
// own ValidVotes must default to 0, not inherit the previous one.
const RECORD_KEYS: [&str; 9] = [
    "ValidVotes",
    "Cast",
    "Count",
    "id",
    "voting_method",
    "max_votes",
    "uncounted_votes",
    "valid_votes",
    "total_votes",
];

/// Dispatches a closing element to the transformers, then folds its map
/// into the parent frame. Identifier keys stay visible to later siblings;
/// per-record values are scrubbed on the way up.
fn close_frame(
    election: &mut Election,
    kind: FileKind,
    stack: &mut Vec<Frame>,
    frame: Frame,
    set: &TransformerSet,
    diags: &mut Diagnostics,
) {
    dispatch(election, kind, stack, &frame, set, diags);
    let Frame { name, mut map } = frame;
    for key in RECORD_KEYS {
        if name != key {
            map.remove(key);
        }
    }
    if let Some(parent) = stack.last_mut() {
        parent.map.extend(map);
    }
}

/// All enclosing scopes merged bottom-up, the closing element's own map
/// winning on key clashes.
fn merged_view(stack: &[Frame], frame: &Frame) -> AttributeMap {
    let mut merged = AttributeMap::new();
    for f in stack {
        merged.extend(f.map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged.extend(frame.map.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn in_scope(stack: &[Frame], name: &str) -> bool {
    stack.iter().any(|f| f.name == name)
}

/// Whether a frame carries a flat national-totals record (leaf children
/// rather than EML identifier elements). Requires the id plus at least one
/// numeric field so that the id leaf itself does not qualify.
fn has_flat_totals(frame: &Frame) -> bool {
    frame.map.contains_key("id")
        && ["max_votes", "uncounted_votes", "valid_votes", "total_votes"]
            .iter()
            .any(|k| frame.map.contains_key(*k))
}

fn has_candidate_keys(frame: &Frame) -> bool {
    frame.map.keys().any(|k| k.starts_with("CandidateIdentifier"))
}

fn dispatch(
    election: &mut Election,
    kind: FileKind,
    stack: &[Frame],
    frame: &Frame,
    set: &TransformerSet,
    diags: &mut Diagnostics,
) {
    // Aggregated rows live under TotalVotes, raw per-station rows under
    // ReportingUnitVotes.
    let aggregated = !in_scope(stack, "ReportingUnitVotes") && in_scope(stack, "TotalVotes");
    match (kind, frame.name.as_str()) {
        (FileKind::Definition, "Region") => {
            set.definition
                .register_region(election, diags, &merged_view(stack, frame));
        }
        (FileKind::Definition, "AffiliationIdentifier")
        | (FileKind::CandidateList, "AffiliationIdentifier") => {
            set.definition
                .register_party(election, diags, &merged_view(stack, frame));
        }
        (FileKind::CandidateList, "Candidate") => {
            set.candidates
                .register_candidate(election, diags, &merged_view(stack, frame));
        }
        (FileKind::MunicipalityCounts, "ContestIdentifier") => {
            set.constituency
                .register_metadata(election, diags, true, &merged_view(stack, frame));
        }
        (FileKind::MunicipalityCounts, "Selection") => {
            let merged = merged_view(stack, frame);
            if has_candidate_keys(frame) {
                set.municipality
                    .register_candidate_votes(election, diags, aggregated, &merged);
            } else {
                set.municipality
                    .register_party_votes(election, diags, aggregated, &merged);
                set.polling_station
                    .register_party_votes(election, diags, aggregated, &merged);
            }
        }
        (FileKind::NationalTotals, "Selection") => {
            let merged = merged_view(stack, frame);
            if has_candidate_keys(frame) {
                set.national
                    .register_candidate_votes(election, diags, aggregated, &merged);
            } else {
                set.national
                    .register_party_votes(election, diags, aggregated, &merged);
            }
        }
        (FileKind::NationalTotals, _) if has_flat_totals(frame) => {
            // Flat records are self-contained: enclosing scopes are not
            // merged in, identifiers leaked from earlier EML rows would
            // mislabel the record.
            set.national.register_metadata(election, diags, true, &frame.map);
        }
        _ => {
            debug!("no dispatch for {} in {:?}", frame.name, kind);
        }
    }
}
