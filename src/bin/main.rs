use cardsearch::config::{
    DEFAULT_BIND_ADDR, DEFAULT_COLLECTION_NAME, DEFAULT_PERSIST_DIR, DUMB_RESULTS, SMART_RESULTS,
};
use cardsearch::{
    CacheSettings, CardCollection, CardDetail, CardIngestor, CardRecord, CardSearcher, Facet,
    FacetSelection, LocalEmbedder, Settings, SqliteCardCollection, TextEncoder, build_filter,
    result_title,
};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cardsearch")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
}

#[derive(Args, Clone)]
struct StoreArgs {
    /// Directory the card collection is persisted in
    #[clap(long, default_value = DEFAULT_PERSIST_DIR)]
    db_dir: PathBuf,
    /// Name of the card collection
    #[clap(long, default_value = DEFAULT_COLLECTION_NAME)]
    collection: String,
}

#[derive(Args, Clone)]
struct ModelArgs {
    /// Local ONNX embedding model instead of the downloaded default
    #[clap(long, requires = "tokenizer_dir")]
    onnx_model: Option<PathBuf>,
    /// Directory with tokenizer.json, config.json, special_tokens_map.json and tokenizer_config.json
    #[clap(long, requires = "onnx_model")]
    tokenizer_dir: Option<PathBuf>,
    /// Maximum token length for the local model
    #[clap(long)]
    max_length: Option<usize>,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    #[clap(long)]
    set_name: Option<String>,
    #[clap(long)]
    card_type: Option<String>,
    #[clap(long)]
    color: Option<String>,
    #[clap(long)]
    rarity: Option<String>,
    #[clap(long)]
    level: Option<String>,
    #[clap(long)]
    triggers: Option<String>,
}

impl From<FilterArgs> for FacetSelection {
    fn from(args: FilterArgs) -> Self {
        FacetSelection {
            set_name: args.set_name,
            card_type: args.card_type,
            color: args.color,
            rarity: args.rarity,
            level: args.level,
            triggers: args.triggers,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the search page and JSON API
    Serve {
        #[clap(flatten)]
        store: StoreArgs,
        #[clap(flatten)]
        model: ModelArgs,
        /// Address to listen on
        #[clap(long, default_value = DEFAULT_BIND_ADDR)]
        bind: SocketAddr,
        /// Maximum cached facet lists / filtered results
        #[clap(long, default_value = "256")]
        cache_capacity: usize,
        /// Seconds before a cached entry is recomputed (0 keeps entries until refresh)
        #[clap(long, default_value = "600")]
        cache_ttl_secs: u64,
    },
    /// Load card JSON files into the collection
    Ingest {
        /// JSON file, or directory of JSON files, each holding an array of cards
        path: PathBuf,
        #[clap(flatten)]
        store: StoreArgs,
        #[clap(flatten)]
        model: ModelArgs,
    },
    /// Smart search: rank cards by similarity to a text query
    Search {
        query: String,
        #[clap(flatten)]
        store: StoreArgs,
        #[clap(flatten)]
        model: ModelArgs,
        #[clap(flatten)]
        filters: FilterArgs,
        /// Number of results
        #[clap(long, default_value_t = SMART_RESULTS.default)]
        limit: usize,
        /// Output results in pretty format instead of json text
        #[clap(long)]
        pretty: bool,
    },
    /// Dumb search: list cards matching the filters
    Filter {
        #[clap(flatten)]
        store: StoreArgs,
        #[clap(flatten)]
        filters: FilterArgs,
        /// Maximum number of cards
        #[clap(long, default_value_t = DUMB_RESULTS.default)]
        limit: usize,
        #[clap(long)]
        pretty: bool,
    },
    /// List the distinct values of every facet
    Facets {
        #[clap(flatten)]
        store: StoreArgs,
        #[clap(long)]
        pretty: bool,
    },
}

/// Loads the embedding model the first time it is needed.
struct LazyEmbedder {
    args: ModelArgs,
    embedder: OnceLock<LocalEmbedder>,
}

impl LazyEmbedder {
    fn new(args: ModelArgs) -> Self {
        LazyEmbedder {
            args,
            embedder: OnceLock::new(),
        }
    }

    fn get(&self) -> anyhow::Result<&LocalEmbedder> {
        if let Some(embedder) = self.embedder.get() {
            return Ok(embedder);
        }
        let embedder = match (&self.args.onnx_model, &self.args.tokenizer_dir) {
            (Some(onnx), Some(tokenizer_dir)) => LocalEmbedder::new_with_local_model(
                onnx.clone(),
                tokenizer_dir.clone(),
                self.args.max_length,
            )?,
            _ => LocalEmbedder::new_with_default_model()?,
        };
        Ok(self.embedder.get_or_init(|| embedder))
    }
}

impl TextEncoder for LazyEmbedder {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.get()?.encode(text)
    }

    fn encode_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.get()?.encode_batch(texts)
    }
}

fn no_model() -> ModelArgs {
    ModelArgs {
        onnx_model: None,
        tokenizer_dir: None,
        max_length: None,
    }
}

fn open_collection(store: &StoreArgs) -> anyhow::Result<Arc<SqliteCardCollection>> {
    Ok(Arc::new(SqliteCardCollection::open_or_create(
        &store.db_dir,
        &store.collection,
    )?))
}

fn searcher(
    store: &StoreArgs,
    model: ModelArgs,
    cache: CacheSettings,
) -> anyhow::Result<(CardSearcher, Arc<LazyEmbedder>)> {
    let embedder = Arc::new(LazyEmbedder::new(model));
    let searcher = CardSearcher::new(open_collection(store)?, embedder.clone(), cache);
    Ok((searcher, embedder))
}

fn print_results(records: &[CardRecord], pretty: bool, header: &str) -> anyhow::Result<()> {
    if !pretty {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }

    println!("{}", header.green());
    println!();
    for record in records {
        println!("{}", result_title(record).bold());
        let detail = CardDetail::from_metadata(&record.metadata);
        if let Some(image) = &detail.image {
            println!("   {}: {}", "Image".dimmed(), image);
        }
        for (label, value) in detail.fields.iter().filter(|(_, value)| !value.is_empty()) {
            println!("   {}: {}", label.cyan(), value);
        }
        println!();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match cli.command {
        Commands::Serve {
            store,
            model,
            bind,
            cache_capacity,
            cache_ttl_secs,
        } => {
            let settings = Settings {
                persist_dir: store.db_dir.clone(),
                collection_name: store.collection.clone(),
                cache: CacheSettings {
                    capacity: cache_capacity,
                    ttl: (cache_ttl_secs > 0).then(|| Duration::from_secs(cache_ttl_secs)),
                },
                bind,
            };
            let (searcher, embedder) = searcher(&store, model, settings.cache)?;
            // Load the model before accepting requests.
            embedder.get()?;
            println!(
                "Serving '{}' from {} on http://{}",
                settings.collection_name,
                settings.persist_dir.display(),
                settings.bind
            );
            cardsearch::web::start_server(Arc::new(searcher), settings.bind)?;
        }
        Commands::Ingest { path, store, model } => {
            println!(
                "Loading cards from: {} into collection '{}' at {}",
                path.display(),
                store.collection,
                store.db_dir.display()
            );
            let collection = open_collection(&store)?;
            let ingestor = CardIngestor::new(collection, Arc::new(LazyEmbedder::new(model)));
            let result = ingestor.ingest(&path)?;

            if !result.failed_files.is_empty() {
                println!("Failed files:");
                for file_path in &result.failed_files {
                    println!(" - {}", file_path.red());
                }
            }
            println!(
                "Ingestion completed! \nIndexed {} card(s) from {} file(s). Total cards in the collection: {}",
                result.indexed_count, result.file_count, result.total_document_count
            );
        }
        Commands::Search {
            query,
            store,
            model,
            filters,
            limit,
            pretty,
        } => {
            let (searcher, _) = searcher(&store, model, CacheSettings::default())?;
            let filter = build_filter(&filters.into());
            let results = searcher.smart_search(&query, limit, filter.as_ref())?;
            print_results(
                &results,
                pretty,
                &format!("Found {} result(s).", results.len()),
            )?;
        }
        Commands::Filter {
            store,
            filters,
            limit,
            pretty,
        } => {
            let (searcher, _) = searcher(&store, no_model(), CacheSettings::default())?;
            let filter = build_filter(&filters.into());
            let results = searcher.dumb_search(filter.as_ref(), limit)?;
            print_results(
                &results,
                pretty,
                &format!("Showing {} card(s).", results.len()),
            )?;
        }
        Commands::Facets { store, pretty } => {
            let (searcher, _) = searcher(&store, no_model(), CacheSettings::default())?;
            let catalog = searcher.facets()?;
            if !pretty {
                println!("{}", serde_json::to_string_pretty(&catalog.values)?);
                return Ok(());
            }
            println!(
                "Collection '{}' ({} cards)",
                store.collection,
                searcher.collection().count()?
            );
            for facet in Facet::ALL {
                let values = catalog.options(facet);
                println!("{} ({}):", facet.label().bold(), values.len());
                for value in values {
                    println!("   {}", value);
                }
            }
        }
    }
    Ok(())
}
