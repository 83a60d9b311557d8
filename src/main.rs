mod config;
mod error;
mod ethereum;
mod server;

use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use config::Config;
use ethereum::{
    abi::{ElementExt, Interface},
    contract::{DeployOptions, Invoker},
    provider::{ChainTransport, HttpTransport},
    signer::{self, AccountSigner},
    utils, value, CallResult,
};
use serde::Serialize;
use serde_json::{json, Value};
use server::{ContractInvokerServer, DefaultInvoker, WritePolicy};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn cli() -> Command {
    let tx_args = [
        Arg::new("value")
            .long("value")
            .value_name("WEI")
            .help("Wei to send with the transaction (decimal or 0x hex)"),
        Arg::new("gas-limit")
            .long("gas-limit")
            .value_name("GAS")
            .value_parser(clap::value_parser!(u64))
            .help("Gas limit; estimated with a 50% margin when omitted"),
        Arg::new("gas-price")
            .long("gas-price")
            .value_name("WEI")
            .help("Priority fee per gas in wei; defaults to the network minimum"),
        Arg::new("timeout")
            .long("timeout")
            .value_name("SECONDS")
            .value_parser(clap::value_parser!(u64))
            .help("How long to wait for the receipt"),
    ];

    Command::new("contract-invoker")
        .version("0.1.0")
        .about("Invoke Ethereum smart contract methods from the command line or over MCP")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .global(true)
                .help("Network to use (ethereum, sepolia, polygon, arbitrum, local)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .global(true)
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("allow-writes")
                .long("allow-writes")
                .global(true)
                .help("Allow write operations (transactions)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("init-config")
                .long("init-config")
                .help("Write the effective configuration to the config file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand(Command::new("serve").about("Run the MCP server on stdio (default)"))
        .subcommand(
            Command::new("call")
                .about("Invoke a contract method")
                .arg(Arg::new("abi").required(true).help("ABI or build artifact file"))
                .arg(Arg::new("address").required(true).help("Contract address"))
                .arg(Arg::new("method").required(true).help("Method name"))
                .arg(Arg::new("args").help("Arguments as a JSON array").default_value("[]"))
                .args(tx_args.clone()),
        )
        .subcommand(
            Command::new("deploy")
                .about("Deploy a contract from a build artifact")
                .arg(Arg::new("artifact").required(true).help("Build artifact with bytecode"))
                .arg(Arg::new("args").help("Constructor arguments as a JSON array").default_value("[]"))
                .args(tx_args),
        )
        .subcommand(
            Command::new("sign")
                .about("Sign a message with the configured key")
                .arg(Arg::new("message").required(true)),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify a message signature")
                .arg(Arg::new("address").required(true))
                .arg(Arg::new("message").required(true))
                .arg(Arg::new("signature").required(true)),
        )
        .subcommand(
            Command::new("balance")
                .about("Show the balance of an address in wei")
                .arg(Arg::new("address").required(true)),
        )
        .subcommand(
            Command::new("nonce")
                .about("Show the pending nonce of an address")
                .arg(Arg::new("address").required(true)),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (important for MCP stdio servers)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = cli().get_matches();

    // Handle special commands first
    if matches.get_flag("generate-config") {
        let sample_config = Config::generate_sample();
        println!("{}", sample_config);
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    // Load configuration, falling back to the default location
    let config_path = match matches.get_one::<String>("config") {
        Some(path) => Some(std::path::PathBuf::from(path)),
        None => Config::default_config_path().ok().filter(|path| path.exists()),
    };
    let mut config = Config::load_or_default(config_path).await;

    // Override with command line arguments
    if let Some(network) = matches.get_one::<String>("network") {
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        if let Some(network_config) = config.networks.get_mut(&config.default_network) {
            network_config.rpc_url = rpc_url.clone();
        }
    }

    if matches.get_flag("allow-writes") {
        config.security.allow_write_operations = true;
    }

    if matches.get_flag("init-config") {
        let path = match matches.get_one::<String>("config") {
            Some(path) => std::path::PathBuf::from(path),
            None => Config::default_config_path()?,
        };
        config.save_to_file(&path).await?;
        info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let result = match matches.subcommand() {
        Some(("call", sub)) => run_call(config, sub).await,
        Some(("deploy", sub)) => run_deploy(config, sub).await,
        Some(("sign", sub)) => run_sign(&config, sub),
        Some(("verify", sub)) => run_verify(sub),
        Some(("balance", sub)) => run_balance(&config, sub).await,
        Some(("nonce", sub)) => run_nonce(&config, sub).await,
        _ => run_server(config).await,
    };

    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

async fn connect(config: &Config) -> Result<DefaultInvoker> {
    let network = config.network(None)?;
    info!("Using network: {}", config.default_network);

    let transport = HttpTransport::connect(&network.rpc_url, config.transport_options())
        .await
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;
    let signer = server::signer_from_key(
        config.private_key().as_deref(),
        config.security.allow_write_operations,
    )?;

    let invoker = Invoker::new(signer, transport)
        .with_gas_policy(network.gas_policy())
        .with_span(tracing::info_span!(
            "invoker",
            network = %config.default_network
        ));

    let chain_id = invoker
        .chain_id()
        .await
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;
    if chain_id != network.chain_id {
        warn!(
            "Node at {} reports chain id {}, configuration expects {}",
            invoker.transport().url(),
            chain_id,
            network.chain_id
        );
    }

    Ok(invoker)
}

async fn run_server(config: Config) -> Result<()> {
    info!("Starting Contract Invoker MCP Server");
    info!(
        "Write operations allowed: {}",
        config.security.allow_write_operations
    );

    let policy = WritePolicy::from_config(&config)?;
    let invoker = connect(&config).await?;
    info!("Signing as {}", invoker.signer().address());

    let server = ContractInvokerServer::new(invoker, policy);
    server.run().await
}

/// Cancelled on Ctrl-C so a pending receipt wait ends cleanly.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, no longer waiting for the receipt");
            trigger.cancel();
        }
    });
    token
}

fn apply_timeout(config: &mut Config, sub: &ArgMatches) {
    if let Some(timeout) = sub.get_one::<u64>("timeout") {
        config.receipt.timeout_secs = *timeout;
    }
}

fn parse_json_args(sub: &ArgMatches) -> Result<Value> {
    let raw = sub.get_one::<String>("args").map(String::as_str).unwrap_or("[]");
    serde_json::from_str(raw).map_err(|e| anyhow!("Arguments must be a JSON array: {}", e))
}

fn log_explorer_link(config: &Config, tx_hash: Option<&str>) {
    let explorer = config
        .network(None)
        .ok()
        .and_then(|network| network.explorer_url.as_deref());
    if let (Some(explorer), Some(hash)) = (explorer, tx_hash) {
        info!("View transaction: {}/tx/{}", explorer.trim_end_matches('/'), hash);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_call(mut config: Config, sub: &ArgMatches) -> Result<()> {
    apply_timeout(&mut config, sub);
    let policy = WritePolicy::from_config(&config)?;

    let abi = sub
        .get_one::<String>("abi")
        .ok_or_else(|| anyhow!("Missing ABI file"))?;
    let interface = Interface::load(abi)
        .await
        .map_err(|e| anyhow!("Failed to load interface from '{}': {}", abi, e))?;
    let address = utils::validate_address(
        sub.get_one::<String>("address")
            .ok_or_else(|| anyhow!("Missing contract address"))?,
    )?;
    let method = sub
        .get_one::<String>("method")
        .ok_or_else(|| anyhow!("Missing method name"))?;

    let (mut request, function) =
        server::build_request(&interface, address, method, &parse_json_args(sub)?)?;
    if function.is_write_operation() {
        request = server::with_write_options(
            request,
            function,
            sub.get_one::<String>("value").map(String::as_str),
            sub.get_one::<u64>("gas-limit").copied(),
            sub.get_one::<String>("gas-price").map(String::as_str),
            &policy,
        )?;
    }

    let invoker = connect(&config).await?;
    let invocation = invoker
        .invoke(&interface, request, &interrupt_token())
        .await
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;
    let result = CallResult::from(&invocation);
    log_explorer_link(&config, result.transaction_hash.as_deref());
    print_json(&result)
}

async fn run_deploy(mut config: Config, sub: &ArgMatches) -> Result<()> {
    apply_timeout(&mut config, sub);
    let policy = WritePolicy::from_config(&config)?;

    let path = sub
        .get_one::<String>("artifact")
        .ok_or_else(|| anyhow!("Missing artifact file"))?;
    let artifact = Interface::load_artifact(path)
        .await
        .map_err(|e| anyhow!("Failed to load artifact from '{}': {}", path, e))?;

    let constructor_inputs = artifact
        .interface
        .constructor()
        .map(|c| c.inputs.clone())
        .unwrap_or_default();
    let args = value::args_from_json(&constructor_inputs, &parse_json_args(sub)?)
        .map_err(|e| anyhow!("Invalid constructor arguments: {}", e))?;

    let options = DeployOptions {
        value: sub
            .get_one::<String>("value")
            .map(|v| utils::parse_amount(v))
            .transpose()?,
        gas_limit: sub.get_one::<u64>("gas-limit").copied().unwrap_or(0),
        gas_price: sub
            .get_one::<String>("gas-price")
            .map(|v| utils::parse_gas_price(v))
            .transpose()?,
    };
    policy.check(options.value)?;

    let invoker = connect(&config).await?;
    let receipt = invoker
        .deploy(&artifact, &args, options, &interrupt_token())
        .await
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;
    let result = CallResult::from(&receipt);
    log_explorer_link(&config, result.transaction_hash.as_deref());
    print_json(&result)
}

fn run_sign(config: &Config, sub: &ArgMatches) -> Result<()> {
    let message = sub
        .get_one::<String>("message")
        .ok_or_else(|| anyhow!("Missing message"))?;
    let signer = server::signer_from_key(config.private_key().as_deref(), true)?;
    let signature = signer
        .sign_message(message)
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;

    print_json(&json!({
        "address": signer.address().to_string(),
        "signature": signature,
    }))
}

fn run_verify(sub: &ArgMatches) -> Result<()> {
    let address = utils::validate_address(
        sub.get_one::<String>("address")
            .ok_or_else(|| anyhow!("Missing address"))?,
    )?;
    let message = sub
        .get_one::<String>("message")
        .ok_or_else(|| anyhow!("Missing message"))?;
    let signature = sub
        .get_one::<String>("signature")
        .ok_or_else(|| anyhow!("Missing signature"))?;

    let (valid, recovered) = signer::verify_message(address, message, signature)
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;
    print_json(&json!({
        "valid": valid,
        "recovered": recovered.to_string(),
    }))
}

async fn run_balance(config: &Config, sub: &ArgMatches) -> Result<()> {
    let address = utils::validate_address(
        sub.get_one::<String>("address")
            .ok_or_else(|| anyhow!("Missing address"))?,
    )?;
    let network = config.network(None)?;
    let transport = HttpTransport::connect(&network.rpc_url, config.transport_options())
        .await
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;

    let balance = transport
        .get_balance(address)
        .await
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;
    print_json(&json!({
        "address": address.to_string(),
        "balance_wei": balance.to_string(),
    }))
}

async fn run_nonce(config: &Config, sub: &ArgMatches) -> Result<()> {
    let address = utils::validate_address(
        sub.get_one::<String>("address")
            .ok_or_else(|| anyhow!("Missing address"))?,
    )?;
    let network = config.network(None)?;
    let transport = HttpTransport::connect(&network.rpc_url, config.transport_options())
        .await
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;

    let nonce = transport
        .get_nonce(address)
        .await
        .map_err(|e| anyhow!(utils::describe_error(&e)))?;
    print_json(&json!({
        "address": address.to_string(),
        "nonce": nonce,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_call_subcommand() {
        let matches = cli()
            .try_get_matches_from([
                "contract-invoker",
                "--network",
                "local",
                "call",
                "Counter.json",
                "0x5FbDB2315678afecb367f032d93F642f64180aa3",
                "increment",
                "--gas-limit",
                "21000",
            ])
            .unwrap();

        assert_eq!(matches.get_one::<String>("network").unwrap(), "local");
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "call");
        assert_eq!(sub.get_one::<String>("method").unwrap(), "increment");
        assert_eq!(sub.get_one::<u64>("gas-limit"), Some(&21000));
        assert_eq!(parse_json_args(sub).unwrap(), json!([]));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = cli()
            .try_get_matches_from(["contract-invoker", "balance", "0x00", "--allow-writes"])
            .unwrap();
        assert!(matches.get_flag("allow-writes"));
    }

    #[test]
    fn test_sign_requires_a_key() {
        let mut config = Config::default();
        config.signer.private_key_env = "CONTRACT_INVOKER_TEST_UNSET_KEY".to_string();
        let matches = cli()
            .try_get_matches_from(["contract-invoker", "sign", "gm"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();

        let err = run_sign(&config, sub).unwrap_err();
        assert!(err.to_string().contains("No private key configured"));
    }

    #[test]
    fn test_init_config_flag() {
        let matches = cli()
            .try_get_matches_from(["contract-invoker", "--init-config", "--network", "local"])
            .unwrap();
        assert!(matches.get_flag("init-config"));
        assert!(matches.subcommand().is_none());
    }

    #[test]
    fn test_defaults_to_server() {
        let matches = cli().try_get_matches_from(["contract-invoker"]).unwrap();
        assert!(matches.subcommand().is_none());
    }
}
