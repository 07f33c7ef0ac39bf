use clap::Parser;

/// This is a tabulation program for Dutch EML election result files.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the tabulation run. Any
    /// command line flag below overrides the corresponding field of the file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (directory) The folder holding the EML XML exports (definition files,
    /// candidate lists, counts and national totals).
    #[clap(short, long, value_parser)]
    pub data_dir: Option<String>,

    /// The election identifier, for example TK2023. Used as the cache key and
    /// stamped into every national record.
    #[clap(short, long, value_parser)]
    pub election_id: Option<String>,

    /// (default 150) The number of seats in the assembly.
    #[clap(short, long, value_parser)]
    pub seats: Option<u32>,

    /// If passed as an argument, the candidate list files will be parsed as
    /// well and candidate vote totals matched by short code.
    #[clap(long, takes_value = false)]
    pub candidates: bool,

    /// (file path, 'stdout' or empty) If specified, the summary of the
    /// tabulation will be written in JSON format to the given location.
    /// Setting this option overrides the path that may be specified with the
    /// --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, the
    /// program will check that the tabulated output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard
    /// output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
