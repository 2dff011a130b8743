use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process;

mod commands;

/// 0 = OK, 2 = input error, 1 = other.
const EXIT_OTHER: i32 = 1;
const EXIT_INPUT: i32 = 2;

#[derive(Parser)]
#[command(name = "fnx", version, about = "Functions CLI: simulate, build requests, manage secrets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script in the local sandbox
    Simulate {
        /// Path to the script source (or - for stdin)
        source: String,
        /// Comma separated script arguments
        #[arg(long, value_delimiter = ',')]
        args: Vec<String>,
        /// Path to a JSON object of string secrets
        #[arg(long)]
        secrets: Option<String>,
        /// HTTP requests the script may make
        #[arg(long, env = "SANDBOX_DEFAULT_MAX_HTTP_QUERIES")]
        quota: Option<u32>,
        /// Largest accepted result, in bytes
        #[arg(long)]
        max_response_bytes: Option<usize>,
        /// Decode the result as uint256, int256, string or Buffer
        #[arg(long)]
        return_type: Option<String>,
    },
    /// Validate a request config and print the request
    BuildRequest {
        /// Path to config JSON file (or - for stdin)
        #[arg(default_value = "-")]
        config: String,
        /// Node addresses to check hosted secrets against
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,
    },
    /// Encrypt a message for a DON public key
    Encrypt {
        /// Message to encrypt
        message: String,
        #[arg(long, env = "DON_PUBLIC_KEY")]
        public_key: String,
        /// Sign the message first with this private key
        #[arg(long, env = "WALLET_PRIVATE_KEY")]
        signer_key: Option<String>,
    },
    /// Build the JSON document to host at a secrets URL
    OffchainSecrets {
        /// Path to a JSON object of string secrets
        secrets: String,
        #[arg(long, env = "WALLET_PRIVATE_KEY")]
        wallet_key: String,
        #[arg(long, env = "DON_PUBLIC_KEY")]
        public_key: String,
    },
    /// Check that hosted secrets are identical and cover every node
    VerifySecrets {
        /// Secrets URLs
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(*fn_config::LOG_FILTER);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if *fn_config::LOG_JSON {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            source,
            args,
            secrets,
            quota,
            max_response_bytes,
            return_type,
        } => commands::simulate(&commands::SimulateArgs {
            source,
            args,
            secrets,
            quota,
            max_response_bytes,
            return_type,
        }),
        Commands::BuildRequest { config, nodes } => commands::build_request(&config, &nodes),
        Commands::Encrypt {
            message,
            public_key,
            signer_key,
        } => commands::encrypt(&message, &public_key, signer_key.as_deref()),
        Commands::OffchainSecrets {
            secrets,
            wallet_key,
            public_key,
        } => commands::offchain_secrets(&secrets, &wallet_key, &public_key),
        Commands::VerifySecrets { urls, nodes } => commands::verify_secrets(&urls, &nodes),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        process::exit(match e {
            commands::CliError::Input(_) => EXIT_INPUT,
            commands::CliError::Other(_) => EXIT_OTHER,
        });
    }
}
