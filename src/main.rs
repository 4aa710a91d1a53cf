mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands, EnqueueArgs, ListArgs, ReplayArgs};
use replaybox::config::Config;
use replaybox::entry::{EntryStatus, RequestSnapshot};
use replaybox::ledger::{Ledger, RequestOptions};
use replaybox::observability::init_tracing;
use replaybox::replay::{ProcessOptions, ProcessOutcome};
use server::{AnyError, Runtime};

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    init_tracing();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve => return server::run(config).await,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        command => {
            let runtime = Runtime::build(&config)?;
            let result = dispatch(&runtime.ledger, command).await;
            runtime.shutdown();
            result?;
        }
    }

    Ok(())
}

async fn dispatch(ledger: &Ledger, command: Commands) -> Result<(), AnyError> {
    match command {
        Commands::Enqueue(args) => enqueue(ledger, args).await,
        Commands::List(args) => list(ledger, args).await,
        Commands::Show { id } => match ledger.get(&id).await? {
            Some(entry) => {
                println!("{}", serde_json::to_string_pretty(&entry)?);
                Ok(())
            }
            None => Err(format!("entry {} not found", id).into()),
        },
        Commands::Retry { id } => {
            let entry = ledger.retry(&id).await?;
            println!("{} re-armed (attempts so far: {})", entry.id, entry.attempt_count);
            Ok(())
        }
        Commands::Remove { id } => {
            ledger.remove(&id).await?;
            println!("{} removed", id);
            Ok(())
        }
        Commands::Clear => {
            ledger.clear().await?;
            println!("ledger cleared");
            Ok(())
        }
        Commands::Replay(args) => replay(ledger, args).await,
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&ledger.state().await?)?);
            Ok(())
        }
        Commands::Serve | Commands::Config => Ok(()),
    }
}

async fn enqueue(ledger: &Ledger, args: EnqueueArgs) -> Result<(), AnyError> {
    let mut request = RequestSnapshot::new(args.method.to_uppercase(), args.url);
    for raw in &args.headers {
        let (name, value) =
            cli::parse_header(raw).ok_or_else(|| format!("malformed header '{}'", raw))?;
        request.headers.insert(name, value);
    }
    if let Some(data) = args.data {
        request = request.with_body(data);
    }

    let mut options = RequestOptions::new(request);
    options.id = args.id;
    options.idempotency_key = args.idempotency_key;

    let entry = ledger.enqueue(options).await?;
    println!("{}", entry.id);
    Ok(())
}

async fn list(ledger: &Ledger, args: ListArgs) -> Result<(), AnyError> {
    let status: Option<EntryStatus> = args
        .status
        .map(|s| serde_json::from_value(serde_json::Value::String(s.to_lowercase())))
        .transpose()
        .map_err(|_| "status must be one of: pending, processing, failed")?;

    for entry in ledger.list().await? {
        if status.is_some_and(|s| s != entry.status) {
            continue;
        }
        println!(
            "{}\t{}\t{}\t{} {}",
            entry.id, entry.status, entry.attempt_count, entry.request.method, entry.request.url
        );
    }
    Ok(())
}

async fn replay(ledger: &Ledger, args: ReplayArgs) -> Result<(), AnyError> {
    let mut options = ProcessOptions::new().stop_on_error(args.stop_on_error);
    if let Some(concurrency) = args.concurrency {
        options = options.concurrency(concurrency);
    }

    let options = options
        .on_success(|entry| println!("ok      {} {}", entry.id, entry.request.url))
        .on_failure(|entry, failure| println!("{:<7} {} {}", entry.status.as_str(), entry.id, failure));

    match ledger.process(options).await? {
        ProcessOutcome::Completed(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ProcessOutcome::AlreadyRunning => println!("replay already running"),
    }
    Ok(())
}
