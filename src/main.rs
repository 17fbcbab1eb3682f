use miette::{IntoDiagnostic, Result};
use reconvergence::{
    analysis::{isa::IsaKind, Analyzer},
    report::{parse_report, Diagnostics, LocationTable, ReportWriter},
    trace::{self, AddressMap},
    Options,
};
use std::{
    ffi::OsString,
    io::{Read, Write},
};

struct Args {
    mode: Mode,
    input: clio::Input,
    dump: Option<clio::Input>,
    output: OsString,
    options: Options,
}

enum Mode {
    Listing,
    Koopa,
    Locations,
    Resolve,
}

impl Args {
    fn help() -> String {
        let help = r#"_Usage_: *reconvergence* <mode> <input> [-o output] [-v] [--isa isa]
       *reconvergence* -resolve <report> <address-dump> [-o output]

_Arguments_:
    *mode*        Mode of the analyser, can be one of:
                    *-listing*    Analyse a machine listing
                    *-koopa*      Analyse Koopa IR
                    *-locations*  Print the location record of every instruction
                    *-resolve*    Map a report to program counters
                    *-help*       Print this help message
    *input*       Input file, use - for stdin
    *-o output*   Output file, use - or omit for stdout. Reports are appended
    *-v*          Print numbering and dependents to stderr
    *--isa isa*   Instruction set, *x86* (default) or *generic*"#;

        markup(help)
    }

    /// Parse command line arguments, return Err if failed.
    fn try_parse() -> Result<Self, String> {
        let mut args = std::env::args_os();
        args.next(); // skip program name

        // Parse mode
        let mode = args.next().ok_or("missing argument `mode`")?;
        let mode = match mode.to_str() {
            Some("-listing") => Mode::Listing,
            Some("-koopa") => Mode::Koopa,
            Some("-locations") => Mode::Locations,
            Some("-resolve") => Mode::Resolve,
            Some("-help") => {
                // Print help message and exit
                println!("{}", Self::help());
                std::process::exit(0);
            }
            _ => return Err(format!("invalid mode: {}", mode.to_string_lossy())),
        };

        // Parse input
        let input = args.next().ok_or("missing argument `input`")?;
        let input = clio::Input::new(&input).map_err(|err| err.to_string())?;

        // The address dump is a second input
        let dump = match mode {
            Mode::Resolve => {
                let dump = args.next().ok_or("missing argument `address-dump`")?;
                Some(clio::Input::new(&dump).map_err(|err| err.to_string())?)
            }
            _ => None,
        };

        // Parse flags
        let mut output = OsString::from("-");
        let mut options = Options::default();
        while let Some(flag) = args.next() {
            match flag.to_str() {
                Some("-o") => output = args.next().ok_or("missing argument `output`")?,
                Some("-v") => options.verbose = true,
                Some("--isa") => {
                    let isa = args.next().ok_or("missing argument `isa`")?;
                    options.isa = isa.to_string_lossy().parse::<IsaKind>()?;
                }
                _ => return Err(format!("unknown flag: {}", flag.to_string_lossy())),
            }
        }

        Ok(Self {
            mode,
            input,
            dump,
            output,
            options,
        })
    }

    /// Parse command line arguments, print help message and exit if failed.
    fn parse() -> Self {
        Self::try_parse().unwrap_or_else(|err| {
            eprintln!("{}: {}", markup("_Error_"), err);
            eprintln!("{}", Self::help());
            std::process::exit(1);
        })
    }
}

fn read(mut input: clio::Input) -> Result<String> {
    let mut text = String::new();
    input.read_to_string(&mut text).into_diagnostic()?;
    Ok(text)
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let isa = args.options.isa.isa();

    let Args {
        mode,
        input,
        dump,
        output,
        options,
    } = args;

    let module = match (mode, dump) {
        (Mode::Resolve, Some(dump)) => {
            let report = read(input)?;
            let dump = read(dump)?;
            let records = match parse_report(&report) {
                Ok(records) => records,
                Err(err) => Err(miette::Report::new(err).with_source_code(report))?,
            };
            let map = match AddressMap::parse(&dump) {
                Ok(map) => map,
                Err(err) => Err(miette::Report::new(err).with_source_code(dump))?,
            };
            let mut output = clio::Output::new(&output).into_diagnostic()?;
            for branch in trace::resolve(&records, &map) {
                write!(output, "{}", branch).into_diagnostic()?;
            }
            return Ok(());
        }
        (mode, _) => {
            let input = read(input)?;
            let module = match mode {
                Mode::Koopa => reconvergence::parse_koopa(&input),
                _ => reconvergence::parse(&input),
            };
            let module = match module {
                Ok(module) => module,
                Err(diagnostic) => Err(diagnostic.with_source_code(input))?,
            };
            if let Mode::Locations = mode {
                let mut output = clio::Output::new(&output).into_diagnostic()?;
                write!(output, "{}", LocationTable::from_module(&module, isa)).into_diagnostic()?;
                return Ok(());
            }
            module
        }
    };

    let mut analyzer = Analyzer::new(&module, isa);
    let mut report = ReportWriter::append(&output).into_diagnostic()?;
    let mut diagnostics = Diagnostics::new(std::io::stderr());
    let mut failed = 0;
    for (ordinal, func) in module.functions.iter().enumerate() {
        // A broken function is reported and the rest are still analysed.
        let deps = match analyzer.analyze_dependencies(ordinal) {
            Ok(deps) => deps,
            Err(err) => {
                eprintln!("{:?}", err);
                failed += 1;
                continue;
            }
        };
        if options.verbose {
            let numbering = analyzer.analyze_numbering(ordinal)?;
            diagnostics
                .write_function(func, &numbering, &deps)
                .into_diagnostic()?;
        }
        report.write_function(&deps).into_diagnostic()?;
    }

    if failed > 0 {
        miette::bail!("analysis failed for {} function(s)", failed);
    }
    Ok(())
}

/// Simple markup for help message.
///
/// * `_underline_`
/// * `*bold*`
fn markup(s: &str) -> String {
    use owo_colors::OwoColorize;
    use regex::{Captures, Regex};

    let Ok(re) = Regex::new(r"_(?P<underline>.*?)_|\*(?P<bold>.*?)\*") else {
        return s.to_string();
    };
    re.replace_all(s, |caps: &Captures| {
        if let Some(s) = caps.name("bold") {
            return s.as_str().bold().to_string();
        }
        if let Some(s) = caps.name("underline") {
            return s.as_str().bold().underline().to_string();
        }
        caps[0].to_string()
    })
    .into_owned()
}
