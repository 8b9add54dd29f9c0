// Copyright 2025 TreeVec Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `treevec` command line: stream containers into `(x, mask)`
//! batches, inspect trees, and generate synthetic fixtures.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use treevec_common::array::{ArrayImpl, FlatArray, JaggedArrayBuilder};
use treevec_common::{Error, Result};
use treevec_ingest::{
    BatchGenerator, Locator, ReaderOptions, TreeFileBuilder, TreeHandle, DEFAULT_REDIRECTOR,
};

#[derive(Parser)]
#[command(
    name = "treevec",
    version,
    about = "Stream columnar event trees into normalized (x, mask) batches"
)]
pub struct Cli {
    /// Verbosity; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stream batches out of a container, reporting throughput.
    Read(ReadArgs),
    /// Print tree and specs information.
    Info(InfoArgs),
    /// Generate a synthetic container for demos and tests.
    Gen(GenArgs),
}

#[derive(Args)]
pub struct InputArgs {
    /// Input container: a local path or a logical name resolved via
    /// the redirector.
    pub fin: String,

    /// Tree name inside the container.
    #[arg(long, default_value = "Events")]
    pub tree: String,

    /// Comma separated branches to read; a trailing `*` matches by
    /// prefix. Default: all branches.
    #[arg(long, value_delimiter = ',')]
    pub branches: Vec<String>,

    /// Comma separated branches to exclude, or a path to a
    /// newline-separated file of them.
    #[arg(long)]
    pub exclude_branches: Option<String>,

    /// Identifier branches surfaced per event.
    #[arg(long, value_delimiter = ',', default_value = "run,event,luminosityBlock")]
    pub identifier: Vec<String>,

    /// Rows per chunk read from the container.
    #[arg(long, default_value_t = 1000)]
    pub chunk_size: u64,

    /// Number of events to process; -1 reads all.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub nevts: i64,

    /// Sentinel written for NaN and padding.
    #[arg(long, default_value_t = f64::NAN, allow_negative_numbers = true)]
    pub nan: f64,

    /// Prebuilt specs sidecar; inferred when absent.
    #[arg(long)]
    pub specs: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_REDIRECTOR)]
    pub redirector: String,
}

impl InputArgs {
    fn to_options(&self, batch_size: usize, histograms: bool) -> Result<ReaderOptions> {
        Ok(ReaderOptions {
            tree: self.tree.clone(),
            identifiers: self.identifier.clone(),
            selected_branches: self.branches.clone(),
            exclude_branches: resolve_excludes(self.exclude_branches.as_deref())?,
            chunk_size: self.chunk_size,
            batch_size,
            nevts: self.nevts,
            nan: self.nan,
            specs: self.specs.clone(),
            redirector: self.redirector.clone(),
            histograms,
        })
    }
}

#[derive(Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Events per produced batch.
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Write the specs sidecar to this path as well.
    #[arg(long)]
    pub fout: Option<PathBuf>,

    /// Stream the raw little-endian f64 rows of `x` to this file.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Collect per-branch histograms and dump them next to the input.
    #[arg(long)]
    pub hists: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args)]
pub struct GenArgs {
    /// Output container path.
    pub fout: PathBuf,

    #[arg(long, default_value = "Events")]
    pub tree: String,

    #[arg(long, default_value_t = 1000)]
    pub rows: usize,

    /// Number of flat branches besides the identifiers.
    #[arg(long, default_value_t = 3)]
    pub flat: usize,

    /// Number of jagged branches.
    #[arg(long, default_value_t = 2)]
    pub jagged: usize,

    /// Largest inner length of the jagged branches.
    #[arg(long, default_value_t = 5)]
    pub max_inner: usize,

    /// Seed for reproducible output.
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Read(args) => run_read(args),
        Command::Info(args) => run_info(args, cli.verbose),
        Command::Gen(args) => run_gen(args),
    }
}

fn run_read(args: ReadArgs) -> Result<()> {
    let options = args.input.to_options(args.batch_size, args.hists)?;
    let mut generator = BatchGenerator::open(&args.input.fin, options)?;
    let mut writer = match &args.out {
        Some(path) => {
            let file = File::create(path).map_err(|e| Error::io(path, e))?;
            Some((path.clone(), BufWriter::new(file)))
        }
        None => None,
    };
    let mut batches = 0u64;
    while let Some(batch) = generator.next_batch()? {
        if let Some((path, out)) = writer.as_mut() {
            for v in &batch.x {
                out.write_all(&v.to_le_bytes())
                    .map_err(|e| Error::io(&*path, e))?;
            }
        }
        batches += 1;
    }
    if let Some((path, mut out)) = writer {
        out.flush().map_err(|e| Error::io(&path, e))?;
        info!(path = %path.display(), batches, "wrote raw vectors");
    }
    generator.summary();
    info!(
        batches,
        width = generator.width(),
        rows = generator.stream().meter().rows(),
        "read finished"
    );
    if let Some(fout) = &args.fout {
        generator.specs().save(fout)?;
    }
    if args.hists {
        generator.dump_histograms(format!("{}.hists.json", args.input.fin))?;
    }
    Ok(())
}

fn run_info(args: InfoArgs, verbose: u8) -> Result<()> {
    let options = args.input.to_options(1, false)?;
    let generator = BatchGenerator::open(&args.input.fin, options)?;
    let specs = generator.specs();
    println!("Number of events  : {}", generator.rows());
    println!("# flat branches   : {}", specs.fkeys.len());
    if verbose > 0 {
        for key in &specs.fkeys {
            println!(
                "{} values in [{}, {}] range",
                key, specs.minv[key], specs.maxv[key]
            );
        }
    }
    println!("# jagged branches : {}", specs.jkeys.len());
    if verbose > 0 {
        for key in &specs.jkeys {
            println!(
                "{} values in [{}, {}] range, dim={}",
                key, specs.minv[key], specs.maxv[key], specs.jdim[key]
            );
        }
    }
    println!("# output columns  : {}", specs.width());
    Ok(())
}

fn run_gen(args: GenArgs) -> Result<()> {
    let mut rng = match args.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    let rows = args.rows;
    let mut columns: Vec<(String, ArrayImpl)> = vec![
        ("run".to_owned(), FlatArray::from(vec![1.0; rows]).into()),
        (
            "event".to_owned(),
            FlatArray::from((0..rows).map(|i| i as f64).collect::<Vec<_>>()).into(),
        ),
        (
            "luminosityBlock".to_owned(),
            FlatArray::from((0..rows).map(|i| (i / 100) as f64).collect::<Vec<_>>()).into(),
        ),
    ];
    for b in 0..args.flat {
        let values: Vec<f64> = (0..rows).map(|_| rng.gen_range(-100.0..100.0)).collect();
        columns.push((format!("f{}", b), FlatArray::from(values).into()));
    }
    for b in 0..args.jagged {
        let mut builder = JaggedArrayBuilder::with_capacity(rows);
        for _ in 0..rows {
            let len = rng.gen_range(0..=args.max_inner);
            let inner: Vec<f64> = (0..len).map(|_| rng.gen_range(0.0..50.0)).collect();
            builder.append(&inner);
        }
        columns.push((format!("j{}", b), builder.finish().into()));
    }
    let mut builder = TreeFileBuilder::new();
    builder.add_tree(&args.tree, columns)?;
    builder.write_to(&args.fout)?;

    // read the container back to check the checksums end to end
    let mut handle = TreeHandle::open(&Locator::Local(args.fout.clone()), &args.tree)?;
    handle.verify()?;
    info!(
        path = %args.fout.display(),
        rows = handle.row_count(),
        branches = handle.schema().len(),
        "generated container"
    );
    Ok(())
}

/// A comma separated list, or a path to a newline-separated file of
/// branch names.
fn resolve_excludes(spec: Option<&str>) -> Result<Vec<String>> {
    let Some(spec) = spec else {
        return Ok(Vec::new());
    };
    let path = Path::new(spec);
    let names = if path.is_file() {
        let body = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        body.lines().map(str::to_owned).collect::<Vec<_>>()
    } else {
        spec.split(',').map(str::to_owned).collect()
    };
    Ok(names
        .into_iter()
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_excludes_from_comma_list() {
        let names = resolve_excludes(Some("Muon_mass, Jet_pt")).unwrap();
        assert_eq!(names, vec!["Muon_mass".to_owned(), "Jet_pt".to_owned()]);
    }

    #[test]
    fn test_excludes_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Muon_mass").unwrap();
        writeln!(file, "Jet_pt").unwrap();
        writeln!(file).unwrap();
        let names = resolve_excludes(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(names, vec!["Muon_mass".to_owned(), "Jet_pt".to_owned()]);
    }

    #[test]
    fn test_no_excludes() {
        assert!(resolve_excludes(None).unwrap().is_empty());
    }

    #[test]
    fn test_cli_parses_read_defaults() {
        use clap::Parser;
        let cli = Cli::parse_from(["treevec", "read", "events.tvf"]);
        let Command::Read(args) = cli.command else {
            panic!("expected read subcommand");
        };
        assert_eq!(args.batch_size, 256);
        assert_eq!(args.input.chunk_size, 1000);
        assert_eq!(args.input.nevts, -1);
        assert!(args.input.nan.is_nan());
        assert_eq!(
            args.input.identifier,
            vec![
                "run".to_owned(),
                "event".to_owned(),
                "luminosityBlock".to_owned()
            ]
        );
    }

    #[test]
    fn test_gen_then_read_round_trip() {
        use clap::Parser;
        let dir = tempfile::TempDir::new().unwrap();
        let fout = dir.path().join("demo.tvf");
        run_gen(GenArgs {
            fout: fout.clone(),
            tree: "Events".to_owned(),
            rows: 40,
            flat: 2,
            jagged: 1,
            max_inner: 4,
            seed: Some(7),
        })
        .unwrap();

        let cli = Cli::parse_from([
            "treevec",
            "read",
            fout.to_str().unwrap(),
            "--batch-size",
            "8",
            "--chunk-size",
            "16",
        ]);
        let Command::Read(args) = cli.command else {
            panic!("expected read subcommand");
        };
        run_read(args).unwrap();
    }
}
