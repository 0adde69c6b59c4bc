use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use indexmap::IndexSet;
use tracing::error;
use tracing_subscriber::EnvFilter;

use bytebraise_conf::{parse_config_file, ConfData};
use bytebraise_recipetool::{
    process_handlers, PythonRecipeHandler, PythonSetupIntrospector,
    PythondepsScanner, RecipeContext, RecipeHandler,
};

/// Create recipes from source trees
#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// Enable debug output
    #[clap(short, long, global = true)]
    debug: bool,

    /// Print only errors and warnings
    #[clap(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    CreatePython(CreatePython),
}

/// Write a recipe for a Python project built with setup.py to stdout
#[derive(Parser)]
struct CreatePython {
    /// Source tree containing setup.py
    srctree: PathBuf,

    /// Configuration file providing PKGDATA_DIR and PYTHON_SITEPACKAGES_DIR
    #[clap(long)]
    conf: Option<PathBuf>,

    /// Package data directory used to map imports to packages (overrides PKGDATA_DIR)
    #[clap(long)]
    pkgdata_dir: Option<PathBuf>,

    /// Target python site-packages directory (overrides PYTHON_SITEPACKAGES_DIR)
    #[clap(long)]
    python_sitedir: Option<PathBuf>,

    /// Interpreter used to run setup.py
    #[clap(long, default_value = "python3")]
    python: String,

    /// pythondeps script used to scan sources for imports (default: search PATH)
    #[clap(long)]
    pythondeps: Option<PathBuf>,
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

fn recipe_context(args: &CreatePython) -> anyhow::Result<RecipeContext> {
    let mut context = match &args.conf {
        Some(conf) => {
            let mut d = ConfData::new();
            parse_config_file(conf, &mut d)
                .with_context(|| format!("unable to parse {}", conf.display()))?;
            RecipeContext::from_conf(&d)?
        }
        None => RecipeContext::new(),
    };

    if let Some(dir) = &args.pkgdata_dir {
        context.pkgdata_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.python_sitedir {
        context.python_sitedir = Some(dir.clone());
    }
    Ok(context)
}

/// Minimal recipe the handlers fill in.
fn recipe_skeleton(srctree: &Path) -> Vec<String> {
    vec![
        String::from("# Recipe created by bytebraise-recipetool"),
        String::from("# This is the basis of a recipe and may need further editing in order to be fully functional."),
        String::from("# (Feel free to remove these comments when editing.)"),
        String::from("#"),
        String::from("# Unable to find any files that looked like license statements. Check the accompanying"),
        String::from("# documentation and source headers and set LICENSE and LIC_FILES_CHKSUM accordingly."),
        String::from("LICENSE = \"Unknown\""),
        String::new(),
        format!("SRC_URI = \"file://{}\"", srctree.display()),
    ]
}

fn create_python(args: CreatePython) -> anyhow::Result<()> {
    let srctree = args
        .srctree
        .canonicalize()
        .with_context(|| format!("source tree {} not found", args.srctree.display()))?;
    let context = recipe_context(&args)?;

    let scanner = match &args.pythondeps {
        Some(program) => PythondepsScanner::new(program),
        None => PythondepsScanner::from_path().unwrap_or_else(|| PythondepsScanner::new("pythondeps")),
    };
    let handlers: Vec<Box<dyn RecipeHandler>> = vec![Box::new(PythonRecipeHandler::new(
        Box::new(PythonSetupIntrospector::new(args.python.clone())),
        Box::new(scanner),
        context,
    ))];

    let mut classes = vec![];
    let mut lines_before = recipe_skeleton(&srctree);
    let mut lines_after = vec![];
    let mut handled = IndexSet::new();
    let handled_any = process_handlers(
        &handlers,
        &srctree,
        &mut classes,
        &mut lines_before,
        &mut lines_after,
        &mut handled,
    )?;
    if !handled_any {
        anyhow::bail!("no setup.py found in {}", srctree.display());
    }

    for line in &lines_before {
        println!("{line}");
    }
    println!();
    println!("inherit {}", classes.join(" "));
    if !lines_after.is_empty() {
        println!();
        for line in &lines_after {
            println!("{line}");
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    init_tracing(&opts);

    let result = match opts.subcmd {
        SubCommand::CreatePython(args) => create_python(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
