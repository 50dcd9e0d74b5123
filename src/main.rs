use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use plugsmith_lib::commands::{self, GlobalOptions};

#[derive(Parser)]
#[command(
    name = "plugsmith",
    version,
    about = "Build Paper server plugins: resolve, compile, reobfuscate, package"
)]
struct Cli {
    /// Data directory for the artifact cache, runtimes and settings
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Project directory containing plugsmith.toml
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    project: PathBuf,
    /// Serve everything from the cache and never provision a JDK
    #[arg(long, global = true)]
    offline: bool,
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and write the plugin jar to build/libs
    Build,
    /// Resolve the dev bundle and dependencies, print the classpath
    Resolve,
    /// Select (or provision) the JDK and print where it lives
    Toolchain {
        /// Java major version (default: the project's toolchain)
        #[arg(long)]
        major: Option<u32>,
    },
    /// Materialize the dev bundle and list its mapping namespaces
    Bundle,
    /// Remove build output
    Clean {
        /// Clear the artifact cache too
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    plugsmith_lib::init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let options = GlobalOptions {
        data_dir: cli.data_dir,
        offline: cli.offline,
    };
    let project = cli.project;

    match cli.command {
        Command::Build => {
            let report = commands::build(&options, &project).await?;
            if let Some(artifact) = &report.artifact {
                println!("{}", artifact.path.display());
                println!("  namespace: {}", artifact.namespace);
                println!("  sha256:    {}", artifact.sha256);
                println!("  size:      {} bytes", artifact.size);
            }
        }
        Command::Resolve => {
            let resolved = commands::resolve(&options, &project).await?;
            for entry in resolved.classpath() {
                println!("{}", entry.display());
            }
        }
        Command::Toolchain { major } => {
            let handle = commands::toolchain(&options, &project, major).await?;
            println!("{} {} ({})", handle.vendor, handle.version, handle.java_home.display());
            if handle.provisioned {
                println!("  provisioned under the plugsmith data directory");
            }
        }
        Command::Bundle => {
            let bundle = commands::bundle(&options, &project).await?;
            println!("dev bundle {} for Minecraft {}", bundle.tag, bundle.config.minecraft_version);
            println!("  compile namespace: {}", bundle.config.compile_namespace);
            println!("  namespaces: {}", bundle.mapping.supported().join(", "));
            let unmapped = bundle.mapping.unmapped();
            if !unmapped.is_empty() {
                println!("  advertised without a table: {}", unmapped.join(", "));
            }
            println!("  artifacts: {}", bundle.artifacts.len());
        }
        Command::Clean { all } => commands::clean(&options, &project, all).await?,
    }
    Ok(())
}
