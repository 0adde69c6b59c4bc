use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bytebraise_conf::ConfData;
use bytebraise_layers::actions::{add_layer, remove_layer, sort_layers};
use bytebraise_layers::{
    find_builddir, Flattener, LayerError, LayerRegistry, LayerResult, RecipeCollection, Resolver,
    DEFAULT_SEARCH_GLOBS,
};

/// Port of bitbake-layers
#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// Enable debug output
    #[clap(short, long, global = true)]
    debug: bool,

    /// Print only errors and warnings
    #[clap(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Build directory containing conf/bblayers.conf (default: search BBPATH and the current
    /// directory's ancestors)
    #[clap(long, global = true)]
    builddir: Option<PathBuf>,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    ShowLayers(ShowLayers),
    AddLayer(AddLayer),
    RemoveLayer(RemoveLayer),
    Flatten(Flatten),
    SortLayers(SortLayers),
    FindLayerByName(FindLayerByName),
    FindLayerWithPath(FindLayerWithPath),
}

/// Show current configured layers
#[derive(Parser)]
struct ShowLayers {}

/// Add a layer to bblayers.conf
#[derive(Parser)]
struct AddLayer {
    /// Layer directory to add
    layerdir: PathBuf,
}

/// Remove a layer from bblayers.conf
#[derive(Parser)]
struct RemoveLayer {
    /// Layer directory to remove (wildcards allowed, enclose in quotes to avoid shell expansion)
    layerdir: String,
}

/// Flatten layer configuration into a separate output directory
///
/// Takes the specified layers (or all layers in the current layer configuration if none are
/// specified) and builds a "flattened" directory containing the contents of all layers, with
/// any overlayed recipes removed and bbappends appended to the corresponding recipes.
#[derive(Parser)]
struct Flatten {
    /// Optional layer(s) to flatten (otherwise all are flattened), followed by the output
    /// directory
    #[clap(required = true, num_args = 1.., value_name = "LAYER... OUTPUTDIR")]
    args: Vec<String>,
}

/// Sort configured layers by layer priority
#[derive(Parser)]
struct SortLayers {}

/// Find the layer(s) for a given layer name, using a specific list of layers/wildcards to search
#[derive(Parser)]
struct FindLayerByName {
    /// Space-separated list of layers to search
    #[clap(short = 'g', long, default_value = DEFAULT_SEARCH_GLOBS)]
    search_globs: String,

    /// Layer names (as specified in layer.conf, in BBFILE_COLLECTIONS)
    #[clap(required = true, value_name = "NAME")]
    names: Vec<String>,
}

/// Find the layers which contain a specified path, using a specific list of layers/wildcards to
/// search
#[derive(Parser)]
struct FindLayerWithPath {
    /// Space-separated list of layers to search
    #[clap(short = 'g', long, default_value = DEFAULT_SEARCH_GLOBS)]
    search_globs: String,

    /// Path to find
    #[clap(required = true, value_name = "PATH")]
    paths: Vec<String>,
}

fn init_tracing(opts: &Opts) {
    let default_level = if opts.debug {
        "debug"
    } else if opts.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn load_registry(builddir: Option<PathBuf>) -> LayerResult<LayerRegistry> {
    LayerRegistry::load(find_builddir(builddir.as_deref())?)
}

/// Layer search works without a build directory; configured layers just don't take part.
fn optional_registry(builddir: Option<PathBuf>) -> LayerResult<Option<LayerRegistry>> {
    match find_builddir(builddir.as_deref()) {
        Ok(dir) => Ok(Some(LayerRegistry::load(dir)?)),
        Err(LayerError::ConfigNotFound) => Ok(None),
        Err(err) => Err(err),
    }
}

fn show_layers(registry: &LayerRegistry) {
    println!("{:<20}  {:<40}  priority", "layer", "path");
    println!("{}", "=".repeat(74));
    for layer in registry.layers() {
        println!(
            "{:<20}  {:<40}  {}",
            layer.name(),
            layer.path.display().to_string(),
            layer.priority()
        );
    }
}

fn run(opts: Opts) -> LayerResult<()> {
    let builddir = opts.builddir;

    match opts.subcmd {
        SubCommand::ShowLayers(_) => {
            let registry = load_registry(builddir)?;
            show_layers(&registry);
        }
        SubCommand::AddLayer(args) => {
            let builddir = find_builddir(builddir.as_deref())?;
            add_layer(&builddir.join("conf").join("bblayers.conf"), &args.layerdir)?;
        }
        SubCommand::RemoveLayer(args) => {
            let builddir = find_builddir(builddir.as_deref())?;
            remove_layer(&builddir.join("conf").join("bblayers.conf"), &args.layerdir)?;
        }
        SubCommand::Flatten(args) => {
            let Some((outputdir, layers)) = args.args.split_last() else {
                return Err(LayerError::InvalidArgument(String::from(
                    "An output directory is required",
                )));
            };

            let registry = load_registry(builddir)?;
            let collection = RecipeCollection::collect(&registry)?;
            let report = Flattener::new(&registry, &collection).flatten(layers, outputdir)?;
            info!(
                "Flattened {} files into {} ({} overlayed files skipped, {} appends applied)",
                report.copied.len(),
                outputdir,
                report.skipped.len(),
                report.applied_appends.len() + report.orphaned_appends.len()
            );
            if !report.failed.is_empty() {
                warn!("{} files could not be copied or appended", report.failed.len());
            }
        }
        SubCommand::SortLayers(_) => {
            let registry = load_registry(builddir)?;
            sort_layers(&registry)?;
        }
        SubCommand::FindLayerByName(args) => {
            let registry = optional_registry(builddir)?;
            let empty = ConfData::new();
            let resolver = match &registry {
                Some(registry) => Resolver::from_registry(registry),
                None => Resolver::new(&empty, vec![]),
            };

            resolver.find_layers_by_name(&args.names, &args.search_globs, |_, layer_dir| {
                println!("{}", layer_dir.display());
            })?;
        }
        SubCommand::FindLayerWithPath(args) => {
            let registry = optional_registry(builddir)?;
            let empty = ConfData::new();
            let resolver = match &registry {
                Some(registry) => Resolver::from_registry(registry),
                None => Resolver::new(&empty, vec![]),
            };

            resolver.find_layer_with_path(&args.paths, &args.search_globs, |_, layer_dir| {
                println!("{}", layer_dir.display());
            })?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    init_tracing(&opts);

    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
