use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use toponym_regions::reader::{read_toponym_coordinates, read_toponym_regions, read_token_array};
use toponym_regions::{
    CandidacyFilter, Error, ExperimentParameters, ModelType, RegionGrid, RegionModel,
    SphericalRegionModel, TrainingReport,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a region model on a token array and decode toponym regions
    Train(TrainArgs),
    /// Write the default experiment parameters as JSON
    Params {
        #[clap(short, long, help = "File to write to instead of stdout")]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct TrainArgs {
    #[clap(long, help = "Token array: 'word doc toponym stopword [coordinate]' per line")]
    tokens: PathBuf,
    #[clap(long, help = "Toponym-region filter: 'word: r1 r2 ...' per line")]
    filter: Option<PathBuf>,
    #[clap(long, help = "Toponym coordinates: 'word: lat,long lat,long ...' per line")]
    coordinates: Option<PathBuf>,
    #[clap(short, long, help = "JSON experiment parameters; flags below override it")]
    config: Option<PathBuf>,
    #[clap(long, value_enum)]
    model: Option<ModelArg>,
    #[clap(long, help = "Random seed (0 seeds from OS entropy)")]
    seed: Option<u64>,
    #[clap(long)]
    samples: Option<usize>,
    #[clap(long)]
    lag: Option<usize>,
    #[clap(long, help = "Sweeps per temperature step")]
    burn_in: Option<usize>,
    #[clap(long)]
    initial_temperature: Option<f64>,
    #[clap(long)]
    target_temperature: Option<f64>,
    #[clap(long)]
    temperature_decrement: Option<f64>,
    #[clap(long, help = "Let the spherical model open regions as it trains")]
    region_birth: bool,
    #[clap(short, long, help = "Write the JSON report here instead of printing a summary")]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModelArg {
    Rlda,
    Spherical,
}

impl From<ModelArg> for ModelType {
    fn from(model: ModelArg) -> Self {
        match model {
            ModelArg::Rlda => ModelType::Rlda,
            ModelArg::Spherical => ModelType::Spherical,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("toponym_regions=info".parse()?))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Train(train_args) => train(train_args)?,
        Command::Params { output } => {
            let json = ExperimentParameters::default().to_json()?;
            match output {
                Some(path) => std::fs::write(&path, json)?,
                None => println!("{}", json),
            }
        }
    }
    Ok(())
}

fn load_parameters(args: &TrainArgs) -> Result<ExperimentParameters, Error> {
    let mut params = match &args.config {
        Some(path) => ExperimentParameters::from_json_file(path)?,
        None => ExperimentParameters::default(),
    };

    if let Some(model) = args.model {
        params.model = model.into();
    }
    if let Some(seed) = args.seed {
        params.random_seed = seed;
    }
    if let Some(samples) = args.samples {
        params.samples = samples;
    }
    if let Some(lag) = args.lag {
        params.lag = lag;
    }
    if let Some(burn_in) = args.burn_in {
        params.burn_in_iterations = burn_in;
    }
    if let Some(t) = args.initial_temperature {
        params.initial_temperature = t;
    }
    if let Some(t) = args.target_temperature {
        params.target_temperature = t;
    }
    if let Some(t) = args.temperature_decrement {
        params.temperature_decrement = t;
    }
    if args.region_birth {
        params.region_birth = true;
    }

    params.validate()?;
    Ok(params)
}

fn train(args: TrainArgs) -> Result<(), Error> {
    let params = load_parameters(&args)?;
    let started_at = Utc::now();

    let tokens = read_token_array(&args.tokens)?;
    let words = tokens.corpus.vocabulary_size();
    let lexicon = match &args.coordinates {
        Some(path) => Some(read_toponym_coordinates(path, words)?),
        None => None,
    };
    let filter = match &args.filter {
        Some(path) => Some(read_toponym_regions(path, words)?),
        None => None,
    };

    let report = match params.model {
        ModelType::Rlda => {
            let (filter, grid) = match (filter, &lexicon) {
                (Some(filter), _) => (filter, None),
                (None, Some(lexicon)) => {
                    let (grid, filter) =
                        RegionGrid::candidacy_filter(params.degrees_per_region, lexicon, words)?;
                    info!(regions = grid.len(), "derived candidacy filter from coordinates");
                    (filter, Some(grid))
                }
                (None, None) => {
                    return Err(Error::Config(
                        "rlda needs either --filter or --coordinates".to_string(),
                    ));
                }
            };
            let mut model = RegionModel::new(tokens.corpus, filter, &params)?;
            model.train();
            model.decode();
            let report = TrainingReport::from_region_model(&model, &params, started_at);
            match grid {
                Some(grid) => report.with_grid(grid.regions()),
                None => report,
            }
        }
        ModelType::Spherical => {
            let Some(lexicon) = lexicon else {
                return Err(Error::Config("spherical model needs --coordinates".to_string()));
            };
            let mut model = match (params.region_birth, filter) {
                (true, Some(_)) => {
                    return Err(Error::Config("region birth cannot be combined with --filter".to_string()));
                }
                (true, None) => SphericalRegionModel::with_region_birth(
                    tokens.corpus,
                    &lexicon,
                    tokens.coordinate_indices,
                    &params,
                )?,
                (false, filter) => {
                    let filter = filter.unwrap_or_else(|| CandidacyFilter::permissive(words, params.regions));
                    SphericalRegionModel::new(tokens.corpus, filter, &lexicon, tokens.coordinate_indices, &params)?
                }
            };
            model.train();
            model.decode();
            TrainingReport::from_spherical_model(&model, &params, started_at)
        }
    };

    match &args.output {
        Some(path) => {
            report.write_json(path)?;
            info!(path = %path.display(), "wrote training report");
        }
        None => report.print_summary(),
    }
    Ok(())
}
