mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{load_config, Session, EXIT_FAILURE};
use rekon_core::{install_signal_handler, CancelToken};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "rekon",
    version,
    about = "Run reconcile chains against a Kubernetes-style resource store"
)]
struct Cli {
    /// Engine config (JSON) with store, retry and owner-walk settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store config (JSON). Overrides the store in --config.
    #[arg(long, global = true)]
    store_config: Option<PathBuf>,

    /// Attempts for commands that retry on error.
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Read one object.
    Get {
        /// Resource type as Kind[.group][/version], e.g. Deployment.apps.
        resource: String,
        /// Object name, or namespace/name.
        key: String,
        /// Namespace for bare names of namespaced types.
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// List objects of a type.
    List {
        /// Resource type as Kind[.group][/version].
        resource: String,
        /// Only this namespace (all namespaces when omitted).
        #[arg(short, long)]
        namespace: Option<String>,
        /// Equality label selector, e.g. app=web,tier=front.
        #[arg(short = 'l', long)]
        selector: Option<String>,
    },
    /// Create an object from a JSON file unless it already exists.
    Ensure {
        /// Path to the object JSON.
        file: PathBuf,
        /// Ask to be run again after this many seconds.
        #[arg(long)]
        requeue_after: Option<u64>,
    },
    /// Delete an object.
    Delete {
        /// Resource type as Kind[.group][/version].
        resource: String,
        /// Object name, or namespace/name.
        key: String,
        #[arg(short, long, default_value = "default")]
        namespace: String,
        /// Foreground, Background or Orphan.
        #[arg(long)]
        propagation: Option<String>,
        /// Treat a missing object as success.
        #[arg(long, default_value_t = false)]
        if_present: bool,
    },
    /// Show who controls an object.
    Owner {
        /// Resource type as Kind[.group][/version].
        resource: String,
        /// Object name, or namespace/name.
        key: String,
        #[arg(short, long, default_value = "default")]
        namespace: String,
        /// Follow controllers up to the topmost one.
        #[arg(long, default_value_t = false)]
        root: bool,
    },
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("REKON_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        command => open_session(
            cli.config.as_deref(),
            cli.store_config.as_deref(),
            cli.retries,
        )
        .and_then(|session| dispatch(&session, command, json_output)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn open_session(
    config: Option<&Path>,
    store_config: Option<&Path>,
    retries: Option<u32>,
) -> Result<Session, String> {
    let config = load_config(config, store_config, retries)?;
    tracing::debug!(
        "store backend {} at '{}', {} attempts",
        config.store.backend,
        config.store.url,
        config.retry.max_attempts()
    );
    let cancel = CancelToken::new();
    install_signal_handler(&cancel).map_err(|e| e.to_string())?;
    Session::open(config, cancel)
}

fn dispatch(session: &Session, command: Commands, json: bool) -> Result<u8, String> {
    tracing::debug!("running {command:?}");
    match command {
        Commands::Get {
            resource,
            key,
            namespace,
        } => commands::get::run(session, &resource, &key, &namespace, json),
        Commands::List {
            resource,
            namespace,
            selector,
        } => commands::list::run(
            session,
            &resource,
            namespace.as_deref(),
            selector.as_deref(),
            json,
        ),
        Commands::Ensure {
            file,
            requeue_after,
        } => commands::ensure::run(session, &file, requeue_after, json),
        Commands::Delete {
            resource,
            key,
            namespace,
            propagation,
            if_present,
        } => commands::delete::run(
            session,
            &resource,
            &key,
            &namespace,
            propagation.as_deref(),
            if_present,
            json,
        ),
        Commands::Owner {
            resource,
            key,
            namespace,
            root,
        } => commands::owner::run(session, &resource, &key, &namespace, root, json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    }
}
