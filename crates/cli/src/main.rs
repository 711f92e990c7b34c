use std::rc::Rc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use portal_api::{FragmentFetcher, PortalClient, validate_page_url};
use portal_dom::Document;
use portal_engine::{PortalPage, PortalPorts, build_refresh_url};
use portal_types::{QueryParams, Region};
use portal_util::{DEFAULT_PREVIEW_LIMIT, PortalConfig, preview_text};
use tracing::debug;
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = PortalConfig::load().context("load portal configuration")?;
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("url", sub)) => {
            println!("{}", refresh_url(&config, sub)?);
            Ok(())
        }
        Some(("fragment", sub)) => run_fragment(&config, sub).await,
        Some(("rows", sub)) => run_rows(&config, sub),
        _ => bail!("expected one of: url, fragment, rows"),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn region_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("url")
                .long("url")
                .action(ArgAction::Set)
                .help("Dashboard page URL; defaults to the configured base URL"),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .required(true)
                .value_parser(["notification", "request"])
                .help("Region whose fragment is requested"),
        )
        .arg(
            Arg::new("page")
                .long("page")
                .value_parser(value_parser!(u32))
                .help("Page of the target region"),
        )
        .arg(
            Arg::new("param")
                .long("param")
                .action(ArgAction::Append)
                .value_name("KEY=VALUE")
                .help("Search form field, repeatable"),
        )
}

fn build_cli() -> Command {
    Command::new("portal")
        .about("Drive the portal page behaviors from the command line")
        .subcommand_required(true)
        .subcommand(region_args(
            Command::new("url").about("Print the fragment URL a refresh would request"),
        ))
        .subcommand(region_args(
            Command::new("fragment").about("Fetch and print a region fragment"),
        ))
        .subcommand(
            Command::new("rows")
                .about("Add approver rows to a saved request form page")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .short('f')
                        .required(true)
                        .action(ArgAction::Set)
                        .help("Path to the saved page"),
                )
                .arg(
                    Arg::new("add")
                        .long("add")
                        .value_parser(value_parser!(usize))
                        .default_value("0")
                        .help("Number of add clicks to simulate"),
                ),
        )
}

fn refresh_url(config: &PortalConfig, matches: &ArgMatches) -> Result<Url> {
    let location = match matches.get_one::<String>("url") {
        Some(raw) => Url::parse(raw).with_context(|| format!("invalid page URL '{raw}'"))?,
        None => config
            .base_url
            .clone()
            .ok_or_else(|| anyhow!("no --url given and no base URL configured"))?,
    };
    validate_page_url(&location)?;

    let region: Region = matches
        .get_one::<String>("target")
        .context("missing --target")?
        .parse()?;

    let mut params = QueryParams::new();
    for pair in matches.get_many::<String>("param").into_iter().flatten() {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("parameter '{pair}' is not KEY=VALUE"))?;
        params.append(key, value);
    }
    if let Some(page) = matches.get_one::<u32>("page") {
        params.set(region.cursor_key(), page.to_string());
    }

    Ok(build_refresh_url(&location, region, params))
}

async fn run_fragment(config: &PortalConfig, matches: &ArgMatches) -> Result<()> {
    let url = refresh_url(config, matches)?;
    let client = PortalClient::new(config.connect_timeout())?;
    let response = client
        .fetch(&url)
        .await
        .with_context(|| format!("request {url}"))?;

    if !response.is_success() {
        bail!(
            "{url} answered {}: {}",
            response.status,
            preview_text(&response.body, DEFAULT_PREVIEW_LIMIT)
        );
    }
    println!("{}", response.body);
    Ok(())
}

fn run_rows(config: &PortalConfig, matches: &ArgMatches) -> Result<()> {
    let path = matches.get_one::<String>("file").context("missing --file")?;
    let adds = matches.get_one::<usize>("add").copied().unwrap_or_default();
    let markup = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;

    let client = Rc::new(PortalClient::new(config.connect_timeout())?);
    let page = PortalPage::mount_request_form(Document::parse(&markup), config, PortalPorts::with_fetcher(client))
        .with_context(|| format!("mount request form from {path}"))?;
    let editor = page.editor().context("request form has no collection editor")?.clone();

    for _ in 0..adds {
        let _ = page.click(editor.add_trigger());
    }

    let bounds = editor.bounds()?;
    debug!(adds, count = bounds.count, max = bounds.max, "rows simulated");
    println!("{}", page.document().borrow().inner_html(editor.container()));
    println!("approvers: {} of {}", bounds.count, bounds.max);
    Ok(())
}
