use std::sync::Arc;

use alfresco_provider::accounts::StaticAccountRegistry;
use alfresco_provider::config::ProviderConfig;
use alfresco_provider::projection::{
    AlfrescoBackend, Item, ItemIdentifier, ItemKind, ProjectionBackends, ProjectionService,
};
use alfresco_provider::sync::records::SqliteRecordStore;
use alfresco_provider::sync::transfer::TransferClient;
use anyhow::Context;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    List(Option<ItemIdentifier>),
    Show(ItemIdentifier),
    Fetch(ItemIdentifier),
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let mode = match args.next().as_deref() {
        None => CliMode::List(None),
        Some("list") => CliMode::List(args.next().map(ItemIdentifier::from)),
        Some("show") => CliMode::Show(required_identifier(args.next(), "show")?),
        Some("fetch") => CliMode::Fetch(required_identifier(args.next(), "fetch")?),
        Some("--help" | "-h") => CliMode::Help,
        Some(other) => anyhow::bail!("unknown argument: {other}"),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    Ok(mode)
}

fn required_identifier(arg: Option<String>, command: &str) -> anyhow::Result<ItemIdentifier> {
    arg.map(ItemIdentifier::from)
        .with_context(|| format!("`{command}` needs an item identifier"))
}

fn print_usage() {
    println!("Usage: alfresco-provider [list [IDENTIFIER] | show IDENTIFIER | fetch IDENTIFIER]");
    println!("  list [IDENTIFIER]  List the children of an item (default: the root)");
    println!("  show IDENTIFIER    Resolve one item and print its parent chain");
    println!("  fetch IDENTIFIER   Download an item's content into the cache");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ALFRESCO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn describe(item: &Item) -> String {
    let kind = match item.kind() {
        ItemKind::Folder => "dir",
        ItemKind::File => "file",
    };
    let marker = if item.is_downloaded() { "*" } else { " " };
    format!("{kind:<4} {marker} {}\t{}", item.filename(), item.item_identifier())
}

async fn build_service(config: &ProviderConfig) -> anyhow::Result<ProjectionService> {
    let registry = StaticAccountRegistry::load(&config.accounts_file)
        .with_context(|| format!("failed to load {}", config.accounts_file.display()))?;
    let records = SqliteRecordStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    for account in registry.accounts() {
        records.upsert_account_info(&account.info()).await?;
    }

    let transfer = TransferClient::with_config(config.transfer());
    let backend = Arc::new(AlfrescoBackend::from_accounts(
        registry.accounts(),
        transfer,
        config.page_size,
    )?);
    tracing::debug!(accounts = registry.accounts().len(), "projection ready");

    Ok(ProjectionService::new(
        ProjectionBackends {
            accounts: Arc::new(registry),
            repository: backend.clone(),
            sites: backend,
            records: Arc::new(records),
        },
        config.cache_root.clone(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        print_usage();
        return Ok(());
    }
    init_tracing();

    let config = ProviderConfig::from_env()?;
    let service = build_service(&config).await?;
    match mode {
        CliMode::List(parent) => {
            let parent = parent.unwrap_or_else(ItemIdentifier::root);
            for item in service.children(&parent).await? {
                println!("{}", describe(&item));
            }
        }
        CliMode::Show(identifier) => {
            let item = service.item(&identifier).await?;
            println!("{}", describe(&item));
            if let Some(size) = item.size() {
                println!("size: {size}");
            }
            if let Some(modified) = item.modified() {
                println!("modified: {modified}");
            }
            let chain = service.ancestors(&identifier).await?;
            let path: Vec<&str> = chain.iter().rev().map(Item::filename).collect();
            println!("parent: /{}", path.join("/"));
        }
        CliMode::Fetch(identifier) => {
            let fetched = service.fetch_contents(&identifier).await?;
            println!("{}", fetched.path.display());
        }
        CliMode::Help => print_usage(),
    }
    Ok(())
}
