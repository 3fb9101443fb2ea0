//! `pen-preview` command-line tool

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use pen_preview::instrument::{LoopGuardInstrumenter, ScriptInstrumenter};
use pen_preview::synth::DocumentSynthesizer;
use pen_preview::test_harness::{run_scenario, Scenario};
use pen_preview::{FragmentKind, FragmentSet, Generation};
use pen_workspace::bundle;
use pen_workspace::draft::{DraftStore, FsDraftStore};
use pen_workspace::models::CreatePen;
use pen_workspace::service::{HttpPenService, PenService};
use pen_workspace::Settings;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("pen-preview")
        .version(pen_preview::VERSION)
        .about("Live HTML/CSS/JS preview sandbox")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Settings file (TOML)"),
        )
        .subcommand(
            Command::new("instrument")
                .about("Print a script with loop guards injected")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Print the preview document for fragment files")
                .arg(
                    Arg::new("html")
                        .long("html")
                        .value_parser(value_parser!(PathBuf))
                        .help("Markup file"),
                )
                .arg(
                    Arg::new("css")
                        .long("css")
                        .value_parser(value_parser!(PathBuf))
                        .help("Style file"),
                )
                .arg(
                    Arg::new("js")
                        .long("js")
                        .value_parser(value_parser!(PathBuf))
                        .help("Script file"),
                )
                .arg(
                    Arg::new("generation")
                        .long("generation")
                        .default_value("1")
                        .value_parser(value_parser!(u64))
                        .help("Generation baked into the boot signal"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run liveness scenarios against a simulated frame")
                .arg(
                    Arg::new("scenario")
                        .long("scenario")
                        .help("Scenario name (default: all)"),
                ),
        )
        .subcommand(
            Command::new("draft")
                .about("Inspect the stored draft")
                .subcommand_required(true)
                .subcommand(Command::new("show").about("Print the stored draft"))
                .subcommand(Command::new("clear").about("Remove the stored draft")),
        )
        .subcommand(
            Command::new("import")
                .about("Read .html/.css/.js files into the draft")
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Write the draft as index.html, style.css and script.js")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("save")
                .about("Save the draft as a new pen")
                .arg(Arg::new("title").long("title").required(true))
                .arg(Arg::new("description").long("description"))
                .arg(
                    Arg::new("keep-draft")
                        .long("keep-draft")
                        .action(ArgAction::SetTrue)
                        .help("Do not remove the draft after saving"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let settings = load_settings(matches.get_one::<PathBuf>("config"))?;

    match matches.subcommand() {
        Some(("instrument", args)) => instrument(args, &settings).await,
        Some(("render", args)) => render(args, &settings).await,
        Some(("simulate", args)) => simulate(args, &settings).await,
        Some(("draft", args)) => draft(args, &settings).await,
        Some(("import", args)) => import(args, &settings).await,
        Some(("export", args)) => export(args, &settings).await,
        Some(("save", args)) => save(args, &settings).await,
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::load(path).context("loading settings"),
        None => Ok(Settings::default()),
    }
}

async fn read_optional(path: Option<&PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(String::new()),
    }
}

fn draft_store(settings: &Settings) -> FsDraftStore {
    FsDraftStore::new(&settings.workspace.draft_dir)
}

async fn stored_fragments(store: &FsDraftStore) -> anyhow::Result<FragmentSet> {
    let draft = store
        .load()
        .await?
        .with_context(|| format!("no draft stored in {}", store.dir().display()))?;
    Ok(draft.apply_to(&FragmentSet::default()))
}

async fn instrument(args: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let script = read_optional(args.get_one::<PathBuf>("file")).await?;
    let instrumented =
        LoopGuardInstrumenter::new().instrument(&script, settings.preview.loop_budget());
    tracing::info!("Injected {} loop guard(s)", instrumented.guards());
    println!("{}", instrumented.as_str());
    Ok(())
}

async fn render(args: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let markup = read_optional(args.get_one::<PathBuf>("html")).await?;
    let style = read_optional(args.get_one::<PathBuf>("css")).await?;
    let script = read_optional(args.get_one::<PathBuf>("js")).await?;
    let generation = Generation(args.get_one::<u64>("generation").copied().unwrap_or(1));

    let instrumented =
        LoopGuardInstrumenter::new().instrument(&script, settings.preview.loop_budget());
    let document =
        DocumentSynthesizer::new().synthesize(&markup, &style, &instrumented, generation);
    println!("{}", document.as_str());
    Ok(())
}

async fn simulate(args: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let scenarios = match args.get_one::<String>("scenario") {
        Some(name) => match Scenario::from_name(name) {
            Some(scenario) => vec![scenario],
            None => {
                let known: Vec<_> = Scenario::ALL.iter().map(|s| s.name()).collect();
                bail!("unknown scenario {name}; expected one of {}", known.join(", "));
            }
        },
        None => Scenario::ALL.to_vec(),
    };

    let mut failed = 0;
    for scenario in scenarios {
        let report = run_scenario(scenario, &settings.preview).await?;
        println!("{}", report.generate_text());
        if !report.passed() {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} scenario(s) failed");
    }
    Ok(())
}

async fn draft(args: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let store = draft_store(settings);
    match args.subcommand() {
        Some(("show", _)) => match store.load().await? {
            Some(draft) => {
                for kind in FragmentKind::ALL {
                    println!("--- {} ({})", kind, kind.draft_key());
                    println!("{}", draft.get(kind).unwrap_or("<not stored>"));
                }
            }
            None => println!("No draft stored in {}", store.dir().display()),
        },
        Some(("clear", _)) => {
            store.clear().await?;
            println!("Draft removed");
        }
        _ => bail!("expected `draft show` or `draft clear`"),
    }
    Ok(())
}

async fn import(args: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let paths: Vec<&PathBuf> = args
        .get_many::<PathBuf>("files")
        .map(|values| values.collect())
        .unwrap_or_default();
    let imported = bundle::import(&paths).await?;
    if imported.is_empty() {
        bail!("no .html, .css or .js file among the inputs");
    }

    let store = draft_store(settings);
    for (kind, text) in imported.edits() {
        store.write(kind, text).await?;
        println!("{kind} <- {}", imported.fragments[&kind].0.display());
    }
    Ok(())
}

async fn export(args: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let out = args
        .get_one::<PathBuf>("out")
        .map(PathBuf::as_path)
        .unwrap_or(Path::new("."));
    let fragments = stored_fragments(&draft_store(settings)).await?;
    for path in bundle::export(&fragments, out).await? {
        println!("{}", path.display());
    }
    Ok(())
}

async fn save(args: &ArgMatches, settings: &Settings) -> anyhow::Result<()> {
    let title = args
        .get_one::<String>("title")
        .context("--title is required")?;
    let store = draft_store(settings);
    let fragments = stored_fragments(&store).await?;

    let mut request = CreatePen::from_fragments(&fragments, title);
    request.description = args.get_one::<String>("description").cloned();

    let service = HttpPenService::new(&settings.workspace)?;
    let pen = service.save(request).await?;
    if !args.get_flag("keep-draft") {
        store.clear().await?;
    }
    println!("{}", serde_json::to_string_pretty(&pen)?);
    Ok(())
}
