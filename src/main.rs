use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use genome_sort::{ChromOrder, Format, GenomeSortBuilder, InputSource, Output};

fn main() {
    let arg_parser = build_arg_parser();

    let sort_args = match arg_parser.subcommand() {
        Some(("sort", sort_args)) => sort_args,
        _ => {
            eprintln!("unknown command, see --help");
            process::exit(2);
        }
    };

    let log_level: LogLevel = sort_args.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let format: FormatArg = sort_args.value_of_t_or_exit("format");
    let chrom_order: ChromOrderArg = sort_args.value_of_t_or_exit("chrom_order");
    let tmp_dir: Option<&str> = sort_args.value_of("tmp_dir");
    let threads: Option<usize> = sort_args
        .is_present("threads")
        .then(|| sort_args.value_of_t_or_exit("threads"));
    let max_records: Option<usize> = sort_args
        .is_present("max_records")
        .then(|| sort_args.value_of_t_or_exit("max_records"));
    let merge_fan_in: Option<usize> = sort_args
        .is_present("merge_fan_in")
        .then(|| sort_args.value_of_t_or_exit("merge_fan_in"));
    let max_mem: Option<ByteSize> = sort_args
        .is_present("max_mem")
        .then(|| sort_args.value_of_t_or_exit("max_mem"));

    let mut sort_builder = GenomeSortBuilder::new()
        .with_stable(sort_args.is_present("stable"))
        .with_unique(sort_args.is_present("unique"))
        .with_compressed_tmp(sort_args.is_present("compress_tmp"))
        .with_chrom_order(match chrom_order {
            ChromOrderArg::Natural => ChromOrder::Natural,
            ChromOrderArg::Lexical => ChromOrder::Lexical,
        });

    match format {
        FormatArg::Auto => {}
        FormatArg::Bed => sort_builder = sort_builder.with_format(Format::Bed),
        FormatArg::Vcf => sort_builder = sort_builder.with_format(Format::Vcf),
    }
    if let Some(threads) = threads {
        sort_builder = sort_builder.with_threads_number(threads);
    }
    if let Some(tmp_dir) = tmp_dir {
        sort_builder = sort_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }
    if let Some(max_records) = max_records {
        sort_builder = sort_builder.with_max_records(max_records);
    }
    if let Some(max_mem) = max_mem {
        sort_builder = sort_builder.with_max_memory(max_mem.as_u64());
    }
    if let Some(merge_fan_in) = merge_fan_in {
        sort_builder = sort_builder.with_merge_fan_in(merge_fan_in);
    }

    let sort = match sort_builder.build() {
        Ok(sort) => sort,
        Err(err) => fail(log_level, &err),
    };

    // empty arguments come from unset shell variables and carry no input
    let inputs: Vec<InputSource> = sort_args
        .values_of("inputs")
        .into_iter()
        .flatten()
        .filter(|input| !input.is_empty())
        .map(InputSource::from)
        .collect();
    let output = sort_args.value_of("output").map(Output::from).unwrap_or_default();

    if let Err(err) = sort.run(&inputs, &output) {
        fail(log_level, &err);
    }
}

/// Reports the error and exits. The error reaches stderr even when logging is off.
fn fail(log_level: LogLevel, err: &genome_sort::Error) -> ! {
    match log_level {
        LogLevel::Off => eprintln!("error: {}", err),
        _ => log::error!("{}", err),
    }
    process::exit(err.exit_code());
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum FormatArg {
    Auto,
    Bed,
    Vcf,
}

impl FormatArg {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        FormatArg::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for FormatArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <FormatArg as clap::ArgEnum>::from_str(s, true)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum ChromOrderArg {
    Natural,
    Lexical,
}

impl ChromOrderArg {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        ChromOrderArg::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for ChromOrderArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <ChromOrderArg as clap::ArgEnum>::from_str(s, false)
    }
}

fn positive_number(value: &str) -> Result<(), String> {
    match value.parse::<usize>() {
        Ok(number) if number > 0 => Ok(()),
        Ok(_) => Err("value must be positive".to_string()),
        Err(err) => Err(format!("number format incorrect: {}", err)),
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("genome-sort")
        .about("genomic sort of BED and VCF files")
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            clap::App::new("sort")
                .about("sorts records by chromosome and position and merges all inputs into one output")
                .arg(
                    clap::Arg::new("inputs")
                        .help("files to be sorted, gzip compressed or not; - reads the standard input")
                        .required(true)
                        .multiple_values(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("result file, the standard output by default")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("stable")
                        .short('s')
                        .long("stable")
                        .help("keep records with equal positions in input order"),
                )
                .arg(
                    clap::Arg::new("unique")
                        .short('u')
                        .long("unique")
                        .help("drop duplicate records"),
                )
                .arg(
                    clap::Arg::new("max_records")
                        .short('M')
                        .long("max-records")
                        .help("number of records held in memory before a chunk is written to disk")
                        .takes_value(true)
                        .validator(positive_number),
                )
                .arg(
                    clap::Arg::new("max_mem")
                        .long("max-mem")
                        .help("memory held by a chunk before it is written to disk, overrides --max-records")
                        .takes_value(true)
                        .validator(|v| match v.parse::<ByteSize>() {
                            Ok(size) if size.as_u64() > 0 => Ok(()),
                            Ok(_) => Err("memory limit must be positive".to_string()),
                            Err(err) => Err(format!("memory size format incorrect: {}", err)),
                        }),
                )
                .arg(
                    clap::Arg::new("tmp_dir")
                        .short('d')
                        .long("tmp-dir")
                        .help("directory to be used to store temporary data")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("threads")
                        .short('t')
                        .long("threads")
                        .help("number of threads to use for parallel sorting")
                        .takes_value(true)
                        .validator(positive_number),
                )
                .arg(
                    clap::Arg::new("format")
                        .short('f')
                        .long("format")
                        .help("input format, detected from file names or content by default")
                        .takes_value(true)
                        .default_value("auto")
                        .possible_values(FormatArg::possible_values()),
                )
                .arg(
                    clap::Arg::new("chrom_order")
                        .long("chrom-order")
                        .help("chromosome name order")
                        .takes_value(true)
                        .default_value("natural")
                        .possible_values(ChromOrderArg::possible_values()),
                )
                .arg(
                    clap::Arg::new("merge_fan_in")
                        .long("merge-fan-in")
                        .help("maximum number of temporary files merged at once")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("compress_tmp")
                        .long("compress-tmp")
                        .help("compress temporary files"),
                )
                .arg(
                    clap::Arg::new("log_level")
                        .short('l')
                        .long("loglevel")
                        .help("logging level")
                        .takes_value(true)
                        .default_value("warn")
                        .possible_values(LogLevel::possible_values()),
                ),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
