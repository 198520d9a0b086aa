use std::path::Path;

use anyhow::{Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tracing::Level;

use blazemark::build::{BuildOptions, Site};
use blazemark::config::Config;

fn main() {
    let matches = App::new("blazemark")
        .version(env!("CARGO_PKG_VERSION"))
        .about("An incremental static site generator")
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name("root")
                .long("root")
                .short("C")
                .takes_value(true)
                .value_name("DIR")
                .default_value(".")
                .global(true)
                .help("The project directory"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Increases log verbosity (-v info, -vv debug, -vvv trace)"),
        )
        .subcommand(
            SubCommand::with_name("build")
                .about("Renders changed documents and rebuilds the site (default)")
                .arg(
                    Arg::with_name("force")
                        .long("force")
                        .help("Re-renders every document, drafts included"),
                )
                .arg(
                    Arg::with_name("drafts")
                        .long("drafts")
                        .help("Publishes drafts"),
                ),
        )
        .subcommand(SubCommand::with_name("clean").about("Removes the output directory and the cache"))
        .subcommand(SubCommand::with_name("init").about("Scaffolds a new project"))
        .get_matches();

    init_tracing(matches.occurrences_of("verbose"));

    if let Err(err) = run(&matches) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let (name, sub) = matches.subcommand();
    let sub = sub.unwrap_or(matches);
    let root = Path::new(sub.value_of("root").unwrap_or("."));

    match name {
        "clean" => {
            let mut site = Site::new(load_config(root)?);
            site.clean()?;
            println!("Removed {}", site.config().output_directory.display());
        }
        "init" => {
            let created = blazemark::init::init(root)?;
            for path in &created {
                println!("Created {}", path.display());
            }
            println!("Initialized project in {}", root.display());
        }
        _ => {
            let options = BuildOptions {
                force: sub.is_present("force"),
                include_drafts: sub.is_present("drafts"),
            };
            let mut site = Site::new(load_config(root)?);
            let report = site.build(options)?;
            println!(
                "Published {} documents ({} rendered, {} unchanged, {} failed) in {:.2}s to {}",
                report.published,
                report.rendered.len(),
                report.unchanged.len(),
                report.failed.len(),
                report.elapsed.as_secs_f64(),
                site.config().output_directory.display(),
            );
        }
    }
    Ok(())
}

fn load_config(root: &Path) -> Result<Config> {
    Config::load(root).with_context(|| format!("Loading project at `{}`", root.display()))
}

fn init_tracing(verbose: u64) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
