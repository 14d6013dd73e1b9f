//! Thin CLI front end over the `whisper` library, mirroring the
//! canonical `whisper-create.py` / `whisper-update.py` /
//! `whisper-fetch.py` / `whisper-info.py` toolset. Just a demonstration
//! of the library surface, not part of the core engine itself.

extern crate docopt;
extern crate env_logger;
extern crate log;
extern crate whisper;

use docopt::Docopt;

use whisper::aggregation::AggregationType;
use whisper::file::CreateOptions;
use whisper::retention::ArchivePolicy;
use whisper::{WhisperError, WhisperFile};

const USAGE: &'static str = "
whisper-cli: create, update, fetch, and inspect whisper time-series files.

Usage:
    whisper-cli create <path> <archive>... [--xff=<xff>] [--agg=<method>] [--sparse] [--overwrite]
    whisper-cli update <path> <timestamp> <value>
    whisper-cli fetch <path> [--from=<from>] [--until=<until>]
    whisper-cli info <path>
    whisper-cli (-h | --help)

Options:
    -h --help          Show this screen.
    --xff=<xff>        x-files-factor for new archives [default: 0.5]
    --agg=<method>     Aggregation method for new archives [default: average]
    --sparse           Create a sparse file instead of a dense one.
    --overwrite        Overwrite an existing file.
    --from=<from>      Fetch window start, unix seconds [default: 0]
    --until=<until>    Fetch window end, unix seconds.
";

fn run(args: &docopt::ArgvMap) -> Result<(), WhisperError> {
    let path = args.get_str("<path>").to_string();

    if args.get_bool("create") {
        let policies: Result<Vec<ArchivePolicy>, WhisperError> = args
            .get_vec("<archive>")
            .iter()
            .map(|spec| ArchivePolicy::from_spec(spec))
            .collect();
        let policies = policies?;

        let xff: f32 = args.get_str("--xff").parse().map_err(|_| {
            WhisperError::ValueError(format!("invalid --xff value '{}'", args.get_str("--xff")))
        })?;

        let options = CreateOptions {
            x_files_factor: xff,
            aggregation_method: AggregationType::from_name(args.get_str("--agg"))?,
            sparse: args.get_bool("--sparse"),
            overwrite: args.get_bool("--overwrite"),
        };
        WhisperFile::create(&path, &policies, options)?;
        println!("created {path}");
    } else if args.get_bool("update") {
        let timestamp: u32 = args.get_str("<timestamp>").parse().map_err(|_| {
            WhisperError::ValueError(format!("invalid timestamp '{}'", args.get_str("<timestamp>")))
        })?;
        let value: f64 = args.get_str("<value>").parse().map_err(|_| {
            WhisperError::ValueError(format!("invalid value '{}'", args.get_str("<value>")))
        })?;
        let mut file = WhisperFile::open(&path, true)?;
        file.update_one(Some(timestamp), value)?;
        println!("updated {path} at {timestamp}");
    } else if args.get_bool("fetch") {
        let from: i64 = args.get_str("--from").parse().map_err(|_| {
            WhisperError::ValueError(format!("invalid --from value '{}'", args.get_str("--from")))
        })?;
        let until = match args.get_str("--until") {
            "" => None,
            s => Some(s.parse().map_err(|_| {
                WhisperError::ValueError(format!("invalid --until value '{s}'"))
            })?),
        };

        let file = WhisperFile::open(&path, false)?;
        let ((from, until_resolved, step), values) = file.fetch(from, until)?;
        println!("from={from} until={until_resolved} step={step}");
        let mut t = from;
        for value in values {
            match value {
                Some(v) => println!("{t}\t{v}"),
                None => println!("{t}\tNone"),
            }
            t += step;
        }
    } else if args.get_bool("info") {
        let file = WhisperFile::open(&path, false)?;
        print!("{:?}", file);
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let args = Docopt::new(USAGE)
        .and_then(|d| d.parse())
        .unwrap_or_else(|e| e.exit());

    if let Err(e) = run(&args) {
        eprintln!("whisper-cli: {e}");
        std::process::exit(1);
    }
}
