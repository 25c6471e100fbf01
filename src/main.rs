use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use tooldrop::commands::{self, services::build_index_client};
use tooldrop::config::{Context, Overrides, Settings};
use tooldrop::delivery::DeliveryRegistry;
use tooldrop::packager::{PackagerRegistry, Services};
use tooldrop::process::{ProcessRunner, RealRunner};
use tooldrop::runtime::{DryRun, RealRuntime, Runtime};

/// tooldrop - install Python CLIs in isolation
///
/// Each package gets its own runtime under <base>/.tooldrop/<name>, and its
/// entry points are delivered into <base>.
///
/// Examples:
///   tooldrop install httpie      # Install the latest httpie
///   tooldrop -n install httpie   # Show what would be done
#[derive(Parser, Debug)]
#[command(author, version = env!("TOOLDROP_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Folder receiving entry points (default: ~/.local/bin)
    #[arg(long, env = "TOOLDROP_BASE", value_name = "PATH", global = true)]
    base: Option<PathBuf>,

    /// Show what would be done, without doing it
    #[arg(short = 'n', long, global = true)]
    dryrun: bool,

    /// Show debug logs
    #[arg(long, global = true)]
    debug: bool,

    /// Package index to use
    #[arg(long, value_name = "URL", global = true)]
    index: Option<String>,

    /// Channel to resolve versions from
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Packager to use (pex, venv)
    #[arg(long, global = true)]
    packager: Option<String>,

    /// Delivery method (symlink, wrap, copy)
    #[arg(long, global = true)]
    delivery: Option<String>,

    /// Python interpreter used to build packages
    #[arg(long, global = true)]
    python: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install packages
    Install(InstallArgs),

    /// Compare installed versions with the desired ones
    Check(CheckArgs),

    /// List installed packages
    List,

    /// Uninstall packages
    Uninstall(NamesArgs),

    /// Build artifacts for a local project without installing them
    Package(PackageArgs),

    /// Upgrade a package if a newer version is available (used by wrappers)
    AutoUpgrade(AutoUpgradeArgs),
}

#[derive(clap::Args, Debug)]
struct InstallArgs {
    /// Reinstall even if the desired version is already installed
    #[arg(short, long)]
    force: bool,

    #[arg(value_name = "NAME", required = true)]
    names: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    /// Show how packages are installed and where versions come from
    #[arg(short, long)]
    verbose: bool,

    /// Packages to check (default: all installed)
    #[arg(value_name = "NAME")]
    names: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct NamesArgs {
    #[arg(value_name = "NAME", required = true)]
    names: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct PackageArgs {
    /// Folder receiving the artifacts
    #[arg(short, long, value_name = "DIR", default_value = "dist")]
    dist: PathBuf,

    name: String,

    /// Project folder, containing setup.py
    folder: PathBuf,
}

#[derive(clap::Args, Debug)]
struct AutoUpgradeArgs {
    name: String,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            index: self.index.clone(),
            channel: self.channel.clone(),
            packager: self.packager.clone(),
            delivery: self.delivery.clone(),
            python: self.python.clone(),
        }
    }
}

async fn run(cli: Cli, runtime: &dyn Runtime, runner: &dyn ProcessRunner) -> Result<()> {
    let settings = Settings::load(runtime, cli.base.clone(), cli.overrides())?;
    let program = std::env::current_exe().context("Could not determine path of this program")?;
    let ctx = Context::new(settings, cli.dryrun, program);

    let index = build_index_client()?;
    let deliveries = DeliveryRegistry::new();
    let packagers = PackagerRegistry::new();
    let services = Services {
        ctx: &ctx,
        runtime,
        runner,
        index: &index,
        deliveries: &deliveries,
    };

    match cli.command {
        Commands::Install(args) => {
            commands::install(services, &packagers, &args.names, args.force).await
        }
        Commands::Check(args) => {
            commands::check(services, &packagers, &args.names, args.verbose).await
        }
        Commands::List => commands::list(services),
        Commands::Uninstall(args) => commands::uninstall(services, &packagers, &args.names).await,
        Commands::Package(args) => {
            commands::package(services, &packagers, &args.name, &args.folder, &args.dist)
        }
        Commands::AutoUpgrade(args) => {
            commands::auto_upgrade(services, &packagers, &args.name).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if cli.dryrun {
        run(cli, &DryRun::new(RealRuntime), &DryRun::new(RealRunner)).await
    } else {
        run(cli, &RealRuntime, &RealRunner).await
    }
}
