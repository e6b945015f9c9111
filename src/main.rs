use sanad::api::{App, AskRequest, SearchRequest};
use sanad::cli::{Cli, Commands, ConfigAction, ContentSource};
use sanad::config::Config;
use sanad::error::{Result, SanadError};
use sanad::storage::{Document, DocumentUpdate, StorageStats};
use serde::Serialize;
use std::path::PathBuf;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Add { title, source } => {
            cmd_add(cli.config, &title, source)?;
        }
        Commands::Update { id, title, source } => {
            cmd_update(cli.config, id, title, source)?;
        }
        Commands::Delete { id } => {
            let app = open_app(cli.config)?;
            app.delete_document(id)?;
            println!("✓ Deleted document {}", id);
        }
        Commands::List { json } => {
            cmd_list(cli.config, json)?;
        }
        Commands::Show { id, json } => {
            let app = open_app(cli.config)?;
            let document = app.get_document(id)?;
            if json {
                print_json(&document)?;
            } else {
                print_document(&document);
            }
        }
        Commands::Search { query, limit, json } => {
            cmd_search(cli.config, query, limit, json)?;
        }
        Commands::Ask {
            question,
            documents,
            json,
        } => {
            cmd_ask(cli.config, question, documents, json)?;
        }
        Commands::RebuildIndex => {
            let app = open_app(cli.config)?;
            let response = app.rebuild_index()?;
            println!("✓ Index rebuilt: {} documents", response.documents_indexed);
        }
        Commands::Status => {
            cmd_status(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "sanad=debug" } else { "sanad=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_app(config_path: Option<PathBuf>) -> Result<App> {
    let config = Config::load_or_default(config_path)?;
    App::new(config)
}

fn read_content(source: ContentSource) -> Result<Option<String>> {
    match (source.content, source.file) {
        (Some(content), _) => Ok(Some(content)),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| SanadError::Io {
                source: e,
                context: format!("Failed to read document file: {:?}", path),
            }),
        (None, None) => Ok(None),
    }
}

fn cmd_add(config_path: Option<PathBuf>, title: &str, source: ContentSource) -> Result<()> {
    let content = read_content(source)?
        .ok_or_else(|| SanadError::validation("content", "provide --content or --file"))?;

    let app = open_app(config_path)?;
    let document = app.create_document(title, &content)?;

    println!("✓ Added document {}: {}", document.id, document.title);
    Ok(())
}

fn cmd_update(
    config_path: Option<PathBuf>,
    id: i64,
    title: Option<String>,
    source: ContentSource,
) -> Result<()> {
    let update = DocumentUpdate {
        title,
        content: read_content(source)?,
    };
    if update.title.is_none() && update.content.is_none() {
        println!("Nothing to update. Use --title, --content or --file.");
        return Ok(());
    }

    let app = open_app(config_path)?;
    let document = app.update_document(id, &update)?;

    println!("✓ Updated document {}: {}", document.id, document.title);
    Ok(())
}

fn cmd_list(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let app = open_app(config_path)?;
    let documents = app.list_documents()?;

    if json {
        return print_json(&documents);
    }

    if documents.is_empty() {
        println!("No documents yet. Add one with 'sanad add'.");
        return Ok(());
    }

    println!("Documents ({})", documents.len());
    for doc in &documents {
        println!(
            "  [{}] {} ({})",
            doc.id,
            doc.title,
            doc.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn cmd_search(
    config_path: Option<PathBuf>,
    query: String,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let app = open_app(config_path)?;
    let response = app.search(&SearchRequest { query, limit })?;

    if json {
        return print_json(&response);
    }

    if let Some(warning) = &response.warning {
        println!("⚠ {}", warning);
    }
    println!(
        "{} result(s) for \"{}\" ({} search)",
        response.count,
        response.query,
        response.search_type.as_str()
    );

    for (i, doc) in response.results.iter().enumerate() {
        println!("\n{}. [{}] {}", i + 1, doc.id, doc.title);
        println!("   {}", preview(&doc.content, 160));
    }
    Ok(())
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    question: String,
    documents: Vec<i64>,
    json: bool,
) -> Result<()> {
    let app = open_app(config_path)?;
    let request = AskRequest {
        question,
        document_ids: if documents.is_empty() {
            None
        } else {
            Some(documents)
        },
    };
    let response = app.ask(&request)?;

    if json {
        return print_json(&response);
    }

    println!("{}", response.answer);
    if response.documents_count > 0 {
        println!("\nSources:");
        for doc in &response.relevant_documents {
            println!("  [{}] {}", doc.id, doc.title);
        }
    }
    if !response.llm_used {
        println!("\n(no language model available, answer extracted from documents)");
    }
    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let app = open_app(config_path)?;
    let status = app.status()?;

    println!("Sanad Status");
    println!("============");
    println!("\nDocuments: {}", status.document_count);
    println!(
        "Data directory: {} ({})",
        app.config().storage.data_dir.display(),
        StorageStats::format_size(status.data_dir_size)
    );

    match &status.embedding_model {
        Some(model) if status.semantic_search => {
            println!(
                "\nSemantic search: enabled ({}, {} documents indexed)",
                model, status.indexed_documents
            );
        }
        _ => println!("\nSemantic search: disabled (substring matching only)"),
    }

    match &status.llm_backend {
        Some(backend) => println!("Answer generation: {}", backend),
        None => println!("Answer generation: extractive only"),
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SanadError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| SanadError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn print_document(doc: &Document) {
    println!("[{}] {}", doc.id, doc.title);
    println!(
        "Created: {}  Updated: {}",
        doc.created_at.format("%Y-%m-%d %H:%M:%S"),
        doc.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("\n{}", doc.content);
}

/// Single-line preview of at most `max` characters
fn preview(content: &str, max: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
