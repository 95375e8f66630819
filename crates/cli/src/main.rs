// Generate within-group pairwise ranking constraints from a table of (value, group) samples.
// Input and output may be plain, gzip or tar.gz; enumeration can run on the rayon pool.

use clap::Parser;
use csv::{ReaderBuilder, WriterBuilder};
use flate2::{
    Compression,
    read::{GzDecoder, MultiGzDecoder},
    write::GzEncoder,
};
use std::{
    error::Error,
    fs::File,
    io::{self, Cursor, Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};
use strum_macros::{Display, EnumString};
use tar::{Archive, Builder, Header};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rankpairs_core::{DistanceWindow, PairOutput, UpperBound, get_pairs, get_pairs_par};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
enum OutputFormat {
    #[strum(serialize = "tsv", serialize = "tab", to_string = "tsv")]
    Tsv,
    #[strum(serialize = "csv")]
    Csv,
}

impl OutputFormat {
    /// Format implied by a file name, using the same rule as input tables.
    fn for_path(path: &Path) -> Self {
        if delimiter_for(path) == b',' { Self::Csv } else { Self::Tsv }
    }

    fn delimiter(self) -> u8 {
        match self {
            Self::Tsv => b'\t',
            Self::Csv => b',',
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rankpairs",
    version,
    about = "Generate within-group pairwise ordering constraints"
)]
struct Cli {
    /// Delimited sample table with a header row (.tsv/.csv, optionally .gz or .tar.gz)
    input: PathBuf,

    /// Column holding the target value
    #[arg(long, default_value = "value")]
    value_col: String,

    /// Column holding the group identifier
    #[arg(long, default_value = "group")]
    group_col: String,

    /// Minimum rank distance, inclusive
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    d_lower: i64,

    /// Maximum rank distance, inclusive ("inf" for no limit)
    #[arg(long, default_value_t = UpperBound::Unbounded, allow_hyphen_values = true)]
    d_upper: UpperBound,

    /// Output table format (default: from the --out extension, else tsv)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Output path (.gz or .tar.gz compress); stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,

    /// Number of worker threads (default: all available)
    #[arg(long)]
    threads: Option<usize>,

    /// Rank and enumerate groups on the thread pool
    #[arg(long)]
    parallel: bool,

    /// Log phase timings
    #[arg(long)]
    time: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn output_format(&self) -> OutputFormat {
        self.format.unwrap_or_else(|| {
            self.out
                .as_deref()
                .map_or(OutputFormat::Tsv, OutputFormat::for_path)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Plain,
    Gzip,
    TarGz,
}

impl Container {
    fn of(path: &Path) -> Self {
        let name = path.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".tar.gz") {
            Self::TarGz
        } else if name.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::Plain
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = std::env::var("RANKPAIRS_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .init();
}

fn delimiter_for(path: &Path) -> u8 {
    let name = path.to_string_lossy().to_ascii_lowercase();
    let name = name
        .strip_suffix(".tar.gz")
        .or_else(|| name.strip_suffix(".gz"))
        .unwrap_or(&name);
    if name.ends_with(".csv") { b',' } else { b'\t' }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, Box<dyn Error>> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| format!("Column '{}' not found in header", name).into())
}

fn read_samples<R: Read>(
    reader: R,
    delimiter: u8,
    value_col: &str,
    group_col: &str,
) -> Result<Vec<(f64, String)>, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let value_idx = column_index(&headers, value_col)?;
    let group_idx = column_index(&headers, group_col)?;

    let mut samples = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        let line = idx + 2; // header offset

        let raw_value = record.get(value_idx).unwrap_or("").trim();
        let value: f64 = raw_value
            .parse()
            .map_err(|_| format!("Invalid value '{}' on line {}", raw_value, line))?;

        let group = record.get(group_idx).unwrap_or("").trim();
        if group.is_empty() {
            return Err(format!("Empty group identifier on line {}", line).into());
        }

        samples.push((value, group.to_string()));
    }
    Ok(samples)
}

fn load_samples(
    path: &Path,
    value_col: &str,
    group_col: &str,
) -> Result<Vec<(f64, String)>, Box<dyn Error>> {
    let delimiter = delimiter_for(path);
    let read = |r: &mut dyn Read| read_samples(r, delimiter, value_col, group_col);

    match Container::of(path) {
        Container::TarGz => {
            let mut archive = Archive::new(GzDecoder::new(File::open(path)?));
            for entry in archive.entries()? {
                let mut entry = entry?;
                if entry.header().entry_type().is_file() {
                    return read(&mut entry);
                }
            }
            Err("No readable file found in tar archive".into())
        }
        Container::Gzip => read(&mut MultiGzDecoder::new(File::open(path)?)),
        Container::Plain => read(&mut File::open(path)?),
    }
}

fn write_table<W: Write>(
    writer: W,
    output: &PairOutput<String>,
    format: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_writer(writer);
    wtr.write_record(["i", "j", "sign", "group"])?;
    for c in output.iter() {
        wtr.write_record([
            c.i.to_string().as_str(),
            c.j.to_string().as_str(),
            c.sign.to_string().as_str(),
            c.group.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_output(
    path: Option<&Path>,
    output: &PairOutput<String>,
    format: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    let Some(path) = path else {
        return write_table(io::stdout().lock(), output, format);
    };
    match Container::of(path) {
        Container::TarGz => write_tar_gz(path, output, format),
        Container::Gzip => {
            let mut enc = GzEncoder::new(File::create(path)?, Compression::default());
            write_table(&mut enc, output, format)?;
            enc.finish()?;
            Ok(())
        }
        Container::Plain => write_table(File::create(path)?, output, format),
    }
}

/// Writes the table as the single member of a gzipped tar archive. The member
/// is named after the archive: `pairs.tar.gz` and `pairs.tsv.tar.gz` both hold `pairs.tsv`.
fn write_tar_gz(
    path: &Path,
    output: &PairOutput<String>,
    format: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    let mut buf = Vec::<u8>::new();
    write_table(&mut buf, output, format)?;

    let enc = GzEncoder::new(File::create(path)?, Compression::default());
    let mut tar_builder = Builder::new(enc);
    let mut header = Header::new_gnu();
    header.set_size(buf.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem_len = file_name.len().saturating_sub(".tar.gz".len());
    let base = match file_name.get(..stem_len).unwrap_or("") {
        "" => "pairs",
        stem => stem,
    };
    let ext = format!(".{}", format.to_string().to_lowercase());
    let table_name = if base.to_ascii_lowercase().ends_with(&ext) {
        base.to_string()
    } else {
        format!("{}{}", base, ext)
    };
    tar_builder.append_data(&mut header, table_name, &mut Cursor::new(buf))?;
    tar_builder.into_inner()?.finish()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let window = DistanceWindow::from_signed(
        cli.d_lower,
        match cli.d_upper {
            UpperBound::Unbounded => None,
            UpperBound::AtMost(d) => Some(i64::try_from(d)?),
        },
    )?;

    // Configure thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| format!("Failed to set thread pool: {}", e))?;
        info!(threads, "configured thread pool");
    }
    if cli.threads.is_some() && !cli.parallel {
        warn!("--threads has no effect without --parallel");
    }

    let load_start = Instant::now();
    let samples = load_samples(&cli.input, &cli.value_col, &cli.group_col)?;
    if cli.time {
        info!(seconds = load_start.elapsed().as_secs_f64(), "samples loaded");
    }
    info!(samples = samples.len(), "read input table");

    let calc_start = Instant::now();
    let output = if cli.parallel {
        get_pairs_par(&samples, window)?
    } else {
        get_pairs(&samples, window)?
    };
    if cli.time {
        info!(seconds = calc_start.elapsed().as_secs_f64(), "pairs generated");
    }
    for (group, count) in output.count_by_group() {
        info!(group = %group, pairs = count, "group constraints");
    }
    info!(
        pairs = output.len(),
        d_lower = window.lower(),
        d_upper = %window.upper(),
        "generated constraints"
    );

    let write_start = Instant::now();
    write_output(cli.out.as_deref(), &output, cli.output_format())?;
    if cli.time {
        info!(seconds = write_start.elapsed().as_secs_f64(), "output written");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_bounds() {
        let cli = Cli::try_parse_from([
            "rankpairs", "in.tsv", "--d-lower", "2", "--d-upper", "inf", "--format", "CSV",
        ])
        .unwrap();
        assert_eq!(cli.d_lower, 2);
        assert_eq!(cli.d_upper, UpperBound::Unbounded);
        assert_eq!(cli.output_format(), OutputFormat::Csv);

        let cli = Cli::try_parse_from(["rankpairs", "in.tsv", "--d-upper", "3"]).unwrap();
        assert_eq!(cli.d_upper, UpperBound::AtMost(3));
        assert_eq!(cli.output_format(), OutputFormat::Tsv);

        assert!(Cli::try_parse_from(["rankpairs", "in.tsv", "--d-upper", "x"]).is_err());
    }

    #[test]
    fn negative_lower_bound_reaches_validation() {
        let cli = Cli::try_parse_from(["rankpairs", "in.tsv", "--d-lower", "-1"]).unwrap();
        assert!(DistanceWindow::from_signed(cli.d_lower, None).is_err());
    }

    #[test]
    fn output_format_follows_out_extension() {
        let format_for = |args: &[&str]| {
            let mut argv = vec!["rankpairs", "in.tsv"];
            argv.extend_from_slice(args);
            Cli::try_parse_from(argv).unwrap().output_format()
        };
        assert_eq!(format_for(&["--out", "pairs.csv"]), OutputFormat::Csv);
        assert_eq!(format_for(&["--out", "PAIRS.CSV.GZ"]), OutputFormat::Csv);
        assert_eq!(format_for(&["--out", "pairs.csv.tar.gz"]), OutputFormat::Csv);
        assert_eq!(format_for(&["--out", "pairs.tsv"]), OutputFormat::Tsv);
        assert_eq!(format_for(&["--out", "pairs.txt"]), OutputFormat::Tsv);
        assert_eq!(format_for(&[]), OutputFormat::Tsv);
        assert_eq!(format_for(&["--out", "pairs.csv", "--format", "tsv"]), OutputFormat::Tsv);
    }

    #[test]
    fn container_suffix_ignores_case() {
        assert_eq!(Container::of(Path::new("DATA.CSV.GZ")), Container::Gzip);
        assert_eq!(Container::of(Path::new("data.Tar.Gz")), Container::TarGz);
        assert_eq!(Container::of(Path::new("data.tsv")), Container::Plain);
    }

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(delimiter_for(Path::new("a.csv")), b',');
        assert_eq!(delimiter_for(Path::new("a.csv.gz")), b',');
        assert_eq!(delimiter_for(Path::new("a.tsv.tar.gz")), b'\t');
        assert_eq!(delimiter_for(Path::new("a.txt")), b'\t');
    }

    #[test]
    fn reads_named_columns() {
        let data = "id\tgroup\tvalue\nm1\tA\t2.5\nm2\tB\t1\nm3\tA\t-3\n";
        let samples = read_samples(data.as_bytes(), b'\t', "value", "group").unwrap();
        assert_eq!(
            samples,
            vec![
                (2.5, "A".to_string()),
                (1.0, "B".to_string()),
                (-3.0, "A".to_string())
            ]
        );
    }

    #[test]
    fn rejects_bad_rows() {
        let err = read_samples("value,group\nabc,A\n".as_bytes(), b',', "value", "group")
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value 'abc' on line 2");

        let err = read_samples("value,group\n1,\n".as_bytes(), b',', "value", "group")
            .unwrap_err();
        assert_eq!(err.to_string(), "Empty group identifier on line 2");

        let err = read_samples("rt,ds\n1,A\n".as_bytes(), b',', "value", "group").unwrap_err();
        assert_eq!(err.to_string(), "Column 'value' not found in header");
    }

    #[test]
    fn writes_constraint_table() {
        let samples = vec![
            (2.0, "x".to_string()),
            (3.0, "x".to_string()),
            (1.0, "x".to_string()),
        ];
        let output = get_pairs(&samples, DistanceWindow::default()).unwrap();
        let mut buf = Vec::new();
        write_table(&mut buf, &output, OutputFormat::Csv).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "i,j,sign,group\n0,1,-1,x\n0,2,1,x\n1,2,1,x\n"
        );
    }

    fn sample_pairs() -> PairOutput<String> {
        let samples = vec![
            (2.0, "x".to_string()),
            (3.0, "x".to_string()),
            (1.0, "x".to_string()),
            (5.0, "y".to_string()),
            (4.0, "y".to_string()),
        ];
        get_pairs(&samples, DistanceWindow::default()).unwrap()
    }

    /// Reads a written pair table back through the sample loader, taking
    /// `sign` as the value column.
    fn read_back(path: &Path) -> Vec<(f64, String)> {
        load_samples(path, "sign", "group").unwrap()
    }

    fn expected_rows(output: &PairOutput<String>) -> Vec<(f64, String)> {
        output
            .iter()
            .map(|c| (f64::from(c.sign), c.group.clone()))
            .collect()
    }

    #[test]
    fn compressed_outputs_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let output = sample_pairs();
        let expected = expected_rows(&output);
        assert_eq!(expected.len(), 4);

        for name in ["pairs.tsv.gz", "pairs.tar.gz", "PAIRS.CSV.GZ", "pairs.csv", "pairs.tsv"] {
            let path = dir.path().join(name);
            write_output(Some(&path), &output, OutputFormat::for_path(&path)).unwrap();
            assert_eq!(read_back(&path), expected, "{name}");
        }
    }

    #[test]
    fn tar_member_named_after_archive() {
        let dir = tempfile::tempdir().unwrap();
        let output = sample_pairs();

        for (name, format, member) in [
            ("pairs.tar.gz", OutputFormat::Tsv, "pairs.tsv"),
            ("pairs.csv.tar.gz", OutputFormat::Csv, "pairs.csv"),
            ("Run1.TAR.GZ", OutputFormat::Csv, "Run1.csv"),
        ] {
            let path = dir.path().join(name);
            write_output(Some(&path), &output, format).unwrap();

            let mut archive = Archive::new(GzDecoder::new(File::open(&path).unwrap()));
            let members: Vec<String> = archive
                .entries()
                .unwrap()
                .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
                .collect();
            assert_eq!(members, vec![member.to_string()]);
        }
    }

    #[test]
    fn compressed_sample_tables_load() {
        let dir = tempfile::tempdir().unwrap();
        let table = "value,group\n2.5,A\n1,B\n";

        let gz_path = dir.path().join("SAMPLES.CSV.GZ");
        let mut enc = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
        enc.write_all(table.as_bytes()).unwrap();
        enc.finish().unwrap();

        let tar_path = dir.path().join("samples.csv.tar.gz");
        let enc = GzEncoder::new(File::create(&tar_path).unwrap(), Compression::default());
        let mut builder = Builder::new(enc);
        let mut dir_header = Header::new_gnu();
        dir_header.set_entry_type(tar::EntryType::Directory);
        dir_header.set_size(0);
        dir_header.set_mode(0o755);
        builder
            .append_data(&mut dir_header, "nested/", io::empty())
            .unwrap();
        let mut header = Header::new_gnu();
        header.set_size(table.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "nested/samples.csv", table.as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let expected = vec![(2.5, "A".to_string()), (1.0, "B".to_string())];
        assert_eq!(load_samples(&gz_path, "value", "group").unwrap(), expected);
        assert_eq!(load_samples(&tar_path, "value", "group").unwrap(), expected);
    }

    #[test]
    fn tar_without_regular_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tar.gz");

        let enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut builder = Builder::new(enc);
        let mut header = Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        builder.append_data(&mut header, "only-a-dir/", io::empty()).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = load_samples(&path, "value", "group").unwrap_err();
        assert_eq!(err.to_string(), "No readable file found in tar archive");
    }
}
