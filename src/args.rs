use clap::Parser;

/// This is a tabulation program for multi-seat approval elections.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file containing the election: the questions, their answers and the
    /// engine settings, in JSON format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference file containing the outcome of an election in JSON format. If provided, bltally will
    /// check that the tabulated output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the election will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) If specified, the votes are read from this file. Setting this option overrides
    /// the votes file that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default csv) The type of the input: csv or json. See documentation for all the input types.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (default Approval) The name of the tally engine. External engines are declared in the configuration.
    #[clap(short, long, value_parser)]
    pub method: Option<String>,

    /// (seconds, default 60) How long a tally engine may run for one question. 0 disables the limit.
    #[clap(long, value_parser)]
    pub timeout: Option<u64>,

    /// (index starting at 0) If specified, only this question is counted.
    #[clap(short, long, value_parser)]
    pub question: Option<usize>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
