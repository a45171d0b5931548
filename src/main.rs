use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tunebook::{
    BackendKind, CatalogConfig, CatalogError, CatalogStore, CollectionId, CollectionPatch, Item,
    ItemFilters, ItemId, ItemPatch, KNOWLEDGE_LEVEL_FILTER, KnowledgeLevel, LegacyField, NewItem,
    TagPair, open_store,
};

/// tunebook - catalog of tunes you are learning, grouped into collections
#[derive(Parser)]
#[command(name = "tunebook")]
#[command(about = "Organize tunes into collections, tag them and filter by what you know")]
#[command(version)]
struct Cli {
    /// Storage backend (overrides TUNEBOOK_BACKEND)
    #[arg(long, global = true, value_name = "sqlite|json")]
    backend: Option<BackendKind>,

    /// Directory holding the data file (overrides TUNEBOOK_DATA_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Manage collections
    #[command(subcommand)]
    Collection(CollectionCommand),
    /// Manage items
    #[command(subcommand)]
    Item(ItemCommand),
    /// Search and filter a collection's items
    Filter(FilterCommand),
    /// Inspect the tag vocabulary
    #[command(subcommand)]
    Tags(TagsCommand),
    /// Copy items into a collection
    #[command(subcommand)]
    Import(ImportCommand),
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// List collections with their item counts
    List,
    /// Create a collection
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Rename or describe a collection; a blank description clears it
    Update {
        id: CollectionId,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete a collection and all of its items
    Delete { id: CollectionId },
}

#[derive(Subcommand)]
enum ItemCommand {
    /// List the items of a collection
    List { collection: CollectionId },
    /// Show one item with its tags
    Show { id: ItemId },
    /// Add an item to a collection
    Add {
        collection: CollectionId,
        title: String,
        #[command(flatten)]
        fields: ItemFields,
        /// Extra tag as KEY=VALUE (repeatable)
        #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag_arg)]
        tags: Vec<TagPair>,
    },
    /// Change an item; blank field values clear the field
    Update {
        id: ItemId,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: ItemFields,
        /// Replace the item's tags (repeatable)
        #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag_arg)]
        tags: Vec<TagPair>,
        /// Remove all of the item's explicit tags
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },
    /// Delete an item
    Delete { id: ItemId },
}

/// Optional item fields shared by `item add` and `item update`.
#[derive(Args, Default)]
struct ItemFields {
    /// Musical key, e.g. Bb
    #[arg(long = "key", value_name = "KEY")]
    musical_key: Option<String>,
    #[arg(long)]
    composer: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// Link or path to a recording
    #[arg(long = "media")]
    media_ref: Option<String>,
    /// Link or path to a lead sheet
    #[arg(long = "lead-sheet")]
    lead_sheet_ref: Option<String>,
    /// does-not-know, kind-of-knows or knows
    #[arg(long)]
    level: Option<KnowledgeLevel>,
}

#[derive(Parser)]
struct FilterCommand {
    collection: CollectionId,
    /// Case-insensitive text matched against title, key, composer, style and notes
    #[arg(short, long)]
    search: Option<String>,
    /// Required tag as KEY=VALUE; values of one key are alternatives
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag_arg)]
    tags: Vec<TagPair>,
    /// Accepted knowledge level (repeatable)
    #[arg(long = "level")]
    levels: Vec<String>,
}

#[derive(Subcommand)]
enum TagsCommand {
    /// Tag values in use by a collection's items, per key
    Available { collection: CollectionId },
    /// Every tag key in the vocabulary
    Keys,
    /// Every value stored under KEY
    Values { key: String },
    /// Distinct values of a legacy field across all items
    Legacy { field: LegacyField },
}

#[derive(Subcommand)]
enum ImportCommand {
    /// Copy items, with their tags, into TARGET
    Ids {
        target: CollectionId,
        #[arg(required = true)]
        ids: Vec<ItemId>,
    },
    /// Create items from a list of titles, one per line
    Titles {
        target: CollectionId,
        /// Read titles from a file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Lookup misses reported by the CLI.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("collection {0} not found")]
    CollectionNotFound(CollectionId),
    #[error("item {0} not found")]
    ItemNotFound(ItemId),
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = handle(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides the `warn` default.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

/// Maps an error to the process exit code.
///
/// Validation errors and lookup misses exit with 1, everything else with 2.
fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<CliError>().is_some() {
        return 1;
    }
    match error.downcast_ref::<CatalogError>() {
        Some(err) if !err.is_storage_failure() => 1,
        _ => 2,
    }
}

fn handle(cli: Cli) -> Result<()> {
    let mut config = CatalogConfig::from_env().context("Failed to read configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let mut store = open_store(&config)
        .with_context(|| format!("Failed to open catalog at {}", config.data_file().display()))?;

    let mut printer = Printer {
        json: cli.json,
        out: io::stdout().lock(),
    };
    execute(cli.command, store.as_mut(), &mut printer)
}

/// Runs one command against an open store.
///
/// Kept apart from `handle` so tests can drive it with in-memory stores.
fn execute<W: Write>(
    command: Commands,
    store: &mut dyn CatalogStore,
    printer: &mut Printer<W>,
) -> Result<()> {
    match command {
        Commands::Collection(cmd) => execute_collection(cmd, store, printer),
        Commands::Item(cmd) => execute_item(cmd, store, printer),
        Commands::Filter(cmd) => execute_filter(cmd, store, printer),
        Commands::Tags(cmd) => execute_tags(cmd, store, printer),
        Commands::Import(cmd) => execute_import(cmd, store, printer),
    }
}

fn execute_collection<W: Write>(
    command: CollectionCommand,
    store: &mut dyn CatalogStore,
    printer: &mut Printer<W>,
) -> Result<()> {
    match command {
        CollectionCommand::List => {
            let collections = store
                .list_collections()
                .context("Failed to list collections")?;
            printer.render(&collections, |collections| {
                collections
                    .iter()
                    .map(|summary| {
                        format!(
                            "{}\t{}\t{} items",
                            summary.collection.id, summary.collection.name, summary.item_count
                        )
                    })
                    .collect()
            })
        }
        CollectionCommand::Add { name, description } => {
            let collection = store
                .create_collection(&name, description.as_deref())
                .context("Failed to create collection")?;
            printer.render(&collection, |c| {
                vec![format!("Collection created (id: {})", c.id)]
            })
        }
        CollectionCommand::Update {
            id,
            name,
            description,
        } => {
            let patch = CollectionPatch {
                name,
                description: description.map(Some),
            };
            let collection = store
                .update_collection(id, &patch)
                .context("Failed to update collection")?
                .ok_or(CliError::CollectionNotFound(id))?;
            printer.render(&collection, |c| {
                vec![format!("Collection updated (id: {})", c.id)]
            })
        }
        CollectionCommand::Delete { id } => {
            if !store
                .delete_collection(id)
                .context("Failed to delete collection")?
            {
                return Err(CliError::CollectionNotFound(id).into());
            }
            printer.render(&id, |id| vec![format!("Collection deleted (id: {id})")])
        }
    }
}

fn execute_item<W: Write>(
    command: ItemCommand,
    store: &mut dyn CatalogStore,
    printer: &mut Printer<W>,
) -> Result<()> {
    match command {
        ItemCommand::List { collection } => {
            ensure_collection(store, collection)?;
            let items = store
                .list_items(collection)
                .context("Failed to list items")?;
            printer.render(&items, |items| items.iter().map(item_line).collect())
        }
        ItemCommand::Show { id } => {
            let item = store
                .get_item(id)
                .context("Failed to load item")?
                .ok_or(CliError::ItemNotFound(id))?;
            let tags = store
                .item_tags(id)
                .context("Failed to load item tags")?
                .unwrap_or_default();
            let shown = ShownItem { item, tags };
            printer.render(&shown, item_details)
        }
        ItemCommand::Add {
            collection,
            title,
            fields,
            tags,
        } => {
            let item = store
                .create_item(fields.into_new_item(collection, title), &tags)
                .context("Failed to create item")?;
            printer.render(&item, |item| {
                vec![format!("Item created (id: {})", item.id)]
            })
        }
        ItemCommand::Update {
            id,
            title,
            fields,
            tags,
            clear_tags,
        } => {
            let patch = fields.into_patch(title);
            let replacement = (clear_tags || !tags.is_empty()).then_some(tags.as_slice());
            let item = store
                .update_item(id, &patch, replacement)
                .context("Failed to update item")?
                .ok_or(CliError::ItemNotFound(id))?;
            printer.render(&item, |item| {
                vec![format!("Item updated (id: {})", item.id)]
            })
        }
        ItemCommand::Delete { id } => {
            if !store.delete_item(id).context("Failed to delete item")? {
                return Err(CliError::ItemNotFound(id).into());
            }
            printer.render(&id, |id| vec![format!("Item deleted (id: {id})")])
        }
    }
}

fn execute_filter<W: Write>(
    command: FilterCommand,
    store: &mut dyn CatalogStore,
    printer: &mut Printer<W>,
) -> Result<()> {
    ensure_collection(store, command.collection)?;

    let mut filters = ItemFilters::new();
    for tag in command.tags {
        filters.insert(tag.key, tag.value);
    }
    for level in command.levels {
        filters.insert(KNOWLEDGE_LEVEL_FILTER, level);
    }

    let items = store
        .filter_items(command.collection, command.search.as_deref(), &filters)
        .context("Failed to filter items")?;
    printer.render(&items, |items| items.iter().map(item_line).collect())
}

fn execute_tags<W: Write>(
    command: TagsCommand,
    store: &mut dyn CatalogStore,
    printer: &mut Printer<W>,
) -> Result<()> {
    match command {
        TagsCommand::Available { collection } => {
            ensure_collection(store, collection)?;
            let vocabulary = store
                .get_available_tags(collection)
                .context("Failed to collect tags")?;
            printer.render(&vocabulary, |vocabulary| {
                vocabulary
                    .iter()
                    .map(|(key, values)| format!("{key}: {}", values.join(", ")))
                    .collect()
            })
        }
        TagsCommand::Keys => {
            let keys = store.list_tag_keys().context("Failed to list tag keys")?;
            printer.render(&keys, Clone::clone)
        }
        TagsCommand::Values { key } => {
            let values = store
                .list_tag_values(&key)
                .context("Failed to list tag values")?;
            printer.render(&values, Clone::clone)
        }
        TagsCommand::Legacy { field } => {
            let values = store
                .list_legacy_field_values(field)
                .with_context(|| format!("Failed to list {field} values"))?;
            printer.render(&values, Clone::clone)
        }
    }
}

fn execute_import<W: Write>(
    command: ImportCommand,
    store: &mut dyn CatalogStore,
    printer: &mut Printer<W>,
) -> Result<()> {
    match command {
        ImportCommand::Ids { target, ids } => {
            let outcome = store
                .import_items_by_id(target, &ids)
                .context("Failed to import items")?;
            printer.render(&outcome, |outcome| {
                vec![format!("Imported {} items", outcome.count)]
            })
        }
        ImportCommand::Titles { target, file } => {
            let text = match &file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => io::read_to_string(io::stdin()).context("Failed to read stdin")?,
            };
            let lines: Vec<String> = text.lines().map(String::from).collect();
            let outcome = store
                .bulk_import_by_title(target, &lines)
                .context("Failed to import titles")?;
            printer.render(&outcome, |outcome| {
                let mut lines = vec![format!("Imported {} items", outcome.imported.len())];
                lines.extend(outcome.imported.iter().map(|title| format!("  + {title}")));
                if !outcome.duplicates.is_empty() {
                    lines.push(format!("Skipped {} duplicates", outcome.duplicates.len()));
                    lines.extend(outcome.duplicates.iter().map(|line| format!("  = {line}")));
                }
                if outcome.truncated > 0 {
                    lines.push(format!("Ignored {} lines past the limit", outcome.truncated));
                }
                lines
            })
        }
    }
}

fn ensure_collection(store: &dyn CatalogStore, id: CollectionId) -> Result<()> {
    store
        .get_collection(id)
        .context("Failed to load collection")?
        .ok_or(CliError::CollectionNotFound(id))?;
    Ok(())
}

impl ItemFields {
    fn into_new_item(self, collection: CollectionId, title: String) -> NewItem {
        NewItem {
            collection_id: collection,
            title,
            musical_key: self.musical_key,
            composer: self.composer,
            style: self.style,
            notes: self.notes,
            media_ref: self.media_ref,
            lead_sheet_ref: self.lead_sheet_ref,
            knowledge_level: self.level,
        }
    }

    fn into_patch(self, title: Option<String>) -> ItemPatch {
        ItemPatch {
            title,
            musical_key: self.musical_key.map(Some),
            composer: self.composer.map(Some),
            style: self.style.map(Some),
            notes: self.notes.map(Some),
            media_ref: self.media_ref.map(Some),
            lead_sheet_ref: self.lead_sheet_ref.map(Some),
            knowledge_level: self.level.map(Some),
        }
    }
}

/// Parses a `KEY=VALUE` tag argument.
fn parse_tag_arg(text: &str) -> std::result::Result<TagPair, String> {
    TagPair::parse(text)
        .filter(|pair| !pair.is_blank())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{text}'"))
}

#[derive(Serialize)]
struct ShownItem {
    #[serde(flatten)]
    item: Item,
    tags: Vec<TagPair>,
}

fn item_line(item: &Item) -> String {
    format!(
        "{}\t{}\t{}",
        item.id,
        item.title,
        item.effective_knowledge_level()
    )
}

fn item_details(shown: &ShownItem) -> Vec<String> {
    let item = &shown.item;
    let mut lines = vec![
        format!("{} (id: {})", item.title, item.id),
        format!("collection: {}", item.collection_id),
        format!("knowledge level: {}", item.effective_knowledge_level()),
    ];
    let optional = [
        ("key", &item.musical_key),
        ("composer", &item.composer),
        ("style", &item.style),
        ("notes", &item.notes),
        ("media", &item.media_ref),
        ("lead sheet", &item.lead_sheet_ref),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            lines.push(format!("{label}: {value}"));
        }
    }
    if !shown.tags.is_empty() {
        let tags: Vec<String> = shown
            .tags
            .iter()
            .map(|tag| format!("{}={}", tag.key, tag.value))
            .collect();
        lines.push(format!("tags: {}", tags.join(", ")));
    }
    lines
}

/// Writes command results either as pretty JSON or as plain text lines.
struct Printer<W> {
    json: bool,
    out: W,
}

impl<W: Write> Printer<W> {
    fn render<T: Serialize>(&mut self, value: &T, text: impl FnOnce(&T) -> Vec<String>) -> Result<()> {
        if self.json {
            serde_json::to_writer_pretty(&mut self.out, value)
                .context("Failed to write JSON output")?;
            writeln!(self.out)?;
        } else {
            for line in text(value) {
                writeln!(self.out, "{line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunebook::JsonStore;

    fn run(store: &mut dyn CatalogStore, args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("tunebook").chain(args.iter().copied()))?;
        let mut printer = Printer {
            json: cli.json,
            out: Vec::new(),
        };
        execute(cli.command, store, &mut printer)?;
        Ok(String::from_utf8(printer.out)?)
    }

    fn store_with_collection() -> (JsonStore, CollectionId) {
        let mut store = JsonStore::in_memory();
        let collection = store.create_collection("Standards", None).unwrap();
        (store, collection.id)
    }

    #[test]
    fn parse_tag_arg_splits_on_first_equals() {
        let pair = parse_tag_arg("Form=A=B").unwrap();
        assert_eq!(pair, TagPair::new("Form", "A=B"));
    }

    #[test]
    fn parse_tag_arg_rejects_missing_or_blank_parts() {
        assert!(parse_tag_arg("Form").is_err());
        assert!(parse_tag_arg(" =AABA").is_err());
        assert!(parse_tag_arg("Form= ").is_err());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tunebook", "collection", "list", "--backend", "json", "--json",
        ])
        .unwrap();
        assert_eq!(cli.backend, Some(BackendKind::Json));
        assert!(cli.json);
    }

    #[test]
    fn search_help_lists_every_searched_field() {
        use clap::CommandFactory;

        let cli = Cli::command();
        let filter = cli.find_subcommand("filter").unwrap();
        let search = filter
            .get_arguments()
            .find(|arg| arg.get_id() == "search")
            .unwrap();
        let help = search.get_help().unwrap().to_string();

        for field in ["title", "key", "composer", "style", "notes"] {
            assert!(help.contains(field), "{field} missing from '{help}'");
        }
    }

    #[test]
    fn clear_tags_conflicts_with_tag() {
        let result = Cli::try_parse_from([
            "tunebook", "item", "update", "1", "--tag", "Era=Swing", "--clear-tags",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn item_add_then_show_prints_effective_tags() {
        let (mut store, collection) = store_with_collection();
        let id = collection.to_string();

        let created = run(
            &mut store,
            &["item", "add", &id, "Misty", "--key", "Eb", "--tag", "Era=Swing"],
        )
        .unwrap();
        assert_eq!(created.trim(), "Item created (id: 1)");

        let shown = run(&mut store, &["item", "show", "1"]).unwrap();
        assert!(shown.contains("key: Eb"));
        assert!(shown.contains("tags: Key=Eb, Era=Swing"));
    }

    #[test]
    fn item_update_with_clear_tags_removes_explicit_tags() {
        let (mut store, collection) = store_with_collection();
        store
            .create_item(
                NewItem::new(collection, "Misty"),
                &[TagPair::new("Era", "Swing")],
            )
            .unwrap();

        run(&mut store, &["item", "update", "1", "--clear-tags"]).unwrap();

        assert_eq!(store.item_tags(ItemId::new(1)).unwrap(), Some(vec![]));
    }

    #[test]
    fn item_update_without_tag_flags_keeps_tags() {
        let (mut store, collection) = store_with_collection();
        store
            .create_item(
                NewItem::new(collection, "Misty"),
                &[TagPair::new("Era", "Swing")],
            )
            .unwrap();

        run(&mut store, &["item", "update", "1", "--level", "knows"]).unwrap();

        let item = store.get_item(ItemId::new(1)).unwrap().unwrap();
        assert_eq!(item.knowledge_level, Some(KnowledgeLevel::Knows));
        assert_eq!(
            store.item_tags(ItemId::new(1)).unwrap(),
            Some(vec![TagPair::new("Era", "Swing")])
        );
    }

    #[test]
    fn filter_combines_tags_and_levels() {
        let (mut store, collection) = store_with_collection();
        store
            .create_item(
                NewItem::new(collection, "Misty").knowledge_level(KnowledgeLevel::Knows),
                &[TagPair::new("Era", "Swing")],
            )
            .unwrap();
        store
            .create_item(
                NewItem::new(collection, "Autumn Leaves"),
                &[TagPair::new("Era", "Swing")],
            )
            .unwrap();
        let id = collection.to_string();

        let output = run(
            &mut store,
            &["--json", "filter", &id, "--tag", "era=swing", "--level", "knows"],
        )
        .unwrap();

        let items: Vec<Item> = serde_json::from_str(&output).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Misty");
    }

    #[test]
    fn missing_item_is_a_user_error() {
        let mut store = JsonStore::in_memory();

        let err = run(&mut store, &["item", "show", "7"]).unwrap_err();

        assert_eq!(err.to_string(), "item 7 not found");
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn validation_errors_exit_with_one() {
        let mut store = JsonStore::in_memory();

        let err = run(&mut store, &["collection", "add", "   "]).unwrap_err();

        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn storage_errors_exit_with_two() {
        let err = anyhow::Error::from(CatalogError::Io(io::Error::other("disk full")))
            .context("Failed to create item");
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn import_titles_reads_file_and_reports_duplicates() {
        let (mut store, collection) = store_with_collection();
        store
            .create_item(NewItem::new(collection, "Misty"), &[])
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("titles.txt");
        std::fs::write(&file, "☐ Misty\nautumn leaves\n\n").unwrap();
        let id = collection.to_string();

        let output = run(
            &mut store,
            &["import", "titles", &id, "--file", file.to_str().unwrap()],
        )
        .unwrap();

        assert!(output.contains("Imported 1 items"));
        assert!(output.contains("+ Autumn Leaves"));
        assert!(output.contains("= ☐ Misty"));
    }
}
