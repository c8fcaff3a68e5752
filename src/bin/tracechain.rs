#![forbid(unsafe_code)]
//! TraceChain command line interface

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use std::path::PathBuf;
use tracechain::blockchain::{ChainKind, Ledger, ProvenanceQuery, SendOutcome};
use tracechain::config::{load_config_from, Config, CONFIG_FILE};
use tracechain::crypto::{address_from_hex, address_to_hex, public_key_from_hex, validate_address};
use tracechain::error::{ChainError, Result};
use tracechain::organisation::{Organisation, Role};
use tracechain::persistence::Database;
use tracechain::wallet::{WalletStore, Wallets};

#[derive(Parser)]
#[command(name = "tracechain", author, version, about, long_about = None)]
struct Cli {
    /// Path of the configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,
    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a ledger whose first organisation is the given Admin
    #[command(name = "createblockchain")]
    CreateBlockchain {
        #[arg(long)]
        name: String,
        /// Hex encoded compressed public key of the founding admin
        #[arg(long)]
        publickey: String,
        #[arg(long)]
        gstin: String,
        #[arg(long)]
        prefix: String,
    },
    /// Generate a new wallet and print its address
    #[command(name = "createwallet")]
    CreateWallet {
        #[arg(long)]
        name: Option<String>,
    },
    /// Register an organisation, signed by an Admin wallet
    #[command(name = "createorg")]
    CreateOrg {
        /// Address of the Admin wallet
        #[arg(long)]
        address: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        publickey: String,
        #[arg(long)]
        gstin: String,
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        role: Role,
    },
    /// List registered organisations
    #[command(name = "listorg")]
    ListOrg,
    /// List the items held by an address
    Inventory {
        #[arg(long)]
        address: String,
    },
    /// List the addresses in the wallet file
    #[command(name = "listaddresses")]
    ListAddresses,
    /// Print the blocks of one chain, or of all three
    #[command(name = "printchain")]
    PrintChain {
        #[arg(long)]
        chain: Option<ChainKind>,
    },
    /// Rebuild the UTXO index from the transaction chain
    #[command(name = "reindexutxo")]
    ReindexUtxo,
    /// Send items from one address to another
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Comma separated item codes
        #[arg(long, value_delimiter = ',', required = true)]
        products: Vec<String>,
        /// Mine the transfer immediately
        #[arg(long)]
        mine: bool,
    },
    /// Define new products for a Manufacturer
    #[command(name = "addproducts")]
    AddProducts {
        #[arg(long)]
        address: String,
        /// Comma separated product names
        #[arg(long, value_delimiter = ',', required = true)]
        names: Vec<String>,
    },
    /// List the products defined by a Manufacturer
    #[command(name = "listproducts")]
    ListProducts {
        #[arg(long)]
        address: String,
    },
    /// Issue new items of existing products
    #[command(name = "produceproducts")]
    ProduceProducts {
        #[arg(long)]
        address: String,
        /// Comma separated product codes
        #[arg(long, value_delimiter = ',', required = true)]
        codes: Vec<u64>,
    },
    /// Show every holder of an item and who holds it now
    #[command(name = "getitemdetails")]
    GetItemDetails {
        #[arg(long)]
        item: String,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            println!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        println!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config_from(&cli.config)?;
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        config.log_level()?
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CreateBlockchain {
            name,
            publickey,
            gstin,
            prefix,
        } => create_blockchain(&config, &name, &publickey, &gstin, &prefix),
        Commands::CreateWallet { name } => create_wallet(&config, name),
        Commands::CreateOrg {
            address,
            name,
            publickey,
            gstin,
            prefix,
            role,
        } => create_org(&config, &address, &name, &publickey, &gstin, &prefix, role),
        Commands::ListOrg => list_orgs(&config),
        Commands::Inventory { address } => inventory(&config, &address),
        Commands::ListAddresses => list_addresses(&config),
        Commands::PrintChain { chain } => print_chain(&config, chain),
        Commands::ReindexUtxo => reindex_utxo(&config),
        Commands::Send {
            from,
            to,
            products,
            mine,
        } => send(&config, &from, &to, &products, mine),
        Commands::AddProducts { address, names } => add_products(&config, &address, &names),
        Commands::ListProducts { address } => list_products(&config, &address),
        Commands::ProduceProducts { address, codes } => produce_products(&config, &address, &codes),
        Commands::GetItemDetails { item } => item_details(&config, &item),
    }
}

fn open_database(config: &Config) -> Result<Database> {
    let path = config.ledger_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Database::open(path)
}

fn open_ledger(config: &Config) -> Result<Ledger> {
    Ledger::open(Box::new(open_database(config)?), config.miner.difficulty)
}

fn open_wallets(config: &Config) -> Result<Wallets> {
    Wallets::open(config.wallet_path())
}

fn require_address(address: &str) -> Result<()> {
    if validate_address(address) {
        Ok(())
    } else {
        Err(ChainError::InvalidAddress(address.to_string()))
    }
}

fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(TableColor::Cyan)),
        );
    table
}

fn short(hex_str: &str) -> String {
    if hex_str.len() > 20 {
        format!("{}...{}", &hex_str[..8], &hex_str[hex_str.len() - 8..])
    } else {
        hex_str.to_string()
    }
}

fn create_blockchain(config: &Config, name: &str, publickey: &str, gstin: &str, prefix: &str) -> Result<()> {
    let pub_key = public_key_from_hex(publickey)?;
    let founder = Organisation::founder(name, pub_key, gstin, prefix)?;
    let ledger = Ledger::create(Box::new(open_database(config)?), founder, config.miner.difficulty)?;
    let genesis = ledger
        .tip(ChainKind::Organisations)?
        .ok_or_else(|| ChainError::BlockNotFound("genesis".to_string()))?;

    println!("{}", "Ledger created".bright_green().bold());
    println!("  Genesis: {}", genesis.hash_hex().bright_white());
    println!("  Store:   {}", config.ledger_path().display());
    Ok(())
}

fn create_wallet(config: &Config, name: Option<String>) -> Result<()> {
    let mut wallets = open_wallets(config)?;
    let address = wallets.create_wallet(name)?;
    let public_key = wallets
        .wallet(&address)
        .map(|w| w.public_key_hex.clone())
        .unwrap_or_default();

    println!("Your new address: {}", address.bright_yellow());
    println!("Public key:       {}", public_key);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn create_org(
    config: &Config,
    address: &str,
    name: &str,
    publickey: &str,
    gstin: &str,
    prefix: &str,
    role: Role,
) -> Result<()> {
    require_address(address)?;
    let admin = open_wallets(config)?.get_wallet(address)?;
    let ledger = open_ledger(config)?;

    let draft = Organisation::new(name, public_key_from_hex(publickey)?, gstin, prefix, role);
    let block = ledger.register_organisation(&admin, draft)?;

    println!("{}", "Organisation registered".bright_green().bold());
    println!("  Block:  {} (height {})", block.hash_hex(), block.height);
    Ok(())
}

fn list_orgs(config: &Config) -> Result<()> {
    let ledger = open_ledger(config)?;
    let mut table = styled_table(&["Name", "GSTIN", "Prefix", "Role", "Public key"]);
    for org in ledger.organisations()? {
        let role_color = match org.role {
            Role::Admin => TableColor::Magenta,
            Role::Manufacturer => TableColor::Green,
            _ => TableColor::White,
        };
        table.add_row(vec![
            Cell::new(&org.name),
            Cell::new(&org.gstin),
            Cell::new(&org.prefix),
            Cell::new(org.role.to_string()).fg(role_color),
            Cell::new(short(&hex::encode(&org.pub_key))),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn inventory(config: &Config, address: &str) -> Result<()> {
    let owner = address_from_hex(address)?;
    let ledger = open_ledger(config)?;
    let items = ledger.utxo_set().find_utxo(&owner)?;

    println!("Inventory of {}:", address.bright_yellow());
    if items.is_empty() {
        println!("{}", "  (empty)".dimmed());
        return Ok(());
    }
    let mut table = styled_table(&["Item"]);
    for out in items {
        table.add_row(vec![Cell::new(out.item)]);
    }
    println!("{table}");
    Ok(())
}

fn list_addresses(config: &Config) -> Result<()> {
    for address in open_wallets(config)?.addresses() {
        println!("{}", address);
    }
    Ok(())
}

fn print_chain(config: &Config, chain: Option<ChainKind>) -> Result<()> {
    let ledger = open_ledger(config)?;
    let chains = match chain {
        Some(chain) => vec![chain],
        None => ChainKind::ALL.to_vec(),
    };

    for chain in chains {
        println!("{}", format!("=== {} chain ===", chain).bright_cyan().bold());
        for block in ledger.iter(chain)? {
            match block {
                Ok(block) => {
                    print!("{}", block);
                    println!("PoW: {}\n", "true".green());
                }
                Err(e @ ChainError::InvalidProofOfWork(_)) => {
                    println!("PoW: {}\n", "false".red());
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

fn reindex_utxo(config: &Config) -> Result<()> {
    let ledger = open_ledger(config)?;
    let utxo = ledger.utxo_set();
    utxo.reindex()?;
    println!(
        "Done! There are {} transactions in the UTXO set.",
        utxo.count_transactions()?
    );
    Ok(())
}

fn send(config: &Config, from: &str, to: &str, products: &[String], mine: bool) -> Result<()> {
    require_address(from)?;
    let recipient = address_from_hex(to)?;
    let sender = open_wallets(config)?.get_wallet(from)?;
    let ledger = open_ledger(config)?;

    let items: Vec<String> = products.iter().map(|p| p.trim().to_string()).collect();
    match ledger.send_items(&sender, &recipient, &items, mine)? {
        SendOutcome::Mined(block) => {
            println!("{}", "Success!".bright_green().bold());
            println!("  Block: {} (height {})", block.hash_hex(), block.height);
        }
        SendOutcome::Pending(tx) => {
            println!("{}", "Transaction created".bright_green().bold());
            println!("  Txid: {} (waiting to be mined)", tx.id_hex());
        }
    }
    Ok(())
}

fn add_products(config: &Config, address: &str, names: &[String]) -> Result<()> {
    require_address(address)?;
    let manufacturer = open_wallets(config)?.get_wallet(address)?;
    let ledger = open_ledger(config)?;

    let block = ledger.add_products(&manufacturer, names)?;
    let mut table = styled_table(&["Code", "Name"]);
    for product in block.payload.products() {
        table.add_row(vec![Cell::new(product.code), Cell::new(&product.name)]);
    }
    println!("{table}");
    Ok(())
}

fn list_products(config: &Config, address: &str) -> Result<()> {
    let owner = address_from_hex(address)?;
    let ledger = open_ledger(config)?;

    let mut table = styled_table(&["Code", "Name", "Id"]);
    for product in ledger.products_of(&owner)? {
        table.add_row(vec![
            Cell::new(product.code),
            Cell::new(&product.name),
            Cell::new(short(&hex::encode(product.id))),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn produce_products(config: &Config, address: &str, codes: &[u64]) -> Result<()> {
    require_address(address)?;
    let manufacturer = open_wallets(config)?.get_wallet(address)?;
    let ledger = open_ledger(config)?;

    let block = ledger.produce_items(&manufacturer, codes)?;
    println!("{}", "Produced:".bright_green().bold());
    for tx in block.payload.transactions() {
        for out in &tx.outputs {
            println!("  {}", out.item.bright_white());
        }
    }
    Ok(())
}

fn item_details(config: &Config, item: &str) -> Result<()> {
    let ledger = open_ledger(config)?;
    let history = ledger.item_history(item)?;
    if history.is_empty() {
        return Err(ChainError::ProductNotFound(item.to_string()));
    }

    println!("History of {} (newest first):", item.bright_yellow());
    for holder in &history {
        println!("  {}", address_to_hex(holder));
    }
    match ledger.current_holder(item) {
        Ok(holder) => println!("Current holder: {}", address_to_hex(&holder).bright_green()),
        Err(e) if e.is_not_found() => println!("{}", "No unspent output holds this item".yellow()),
        Err(e) => return Err(e),
    }
    Ok(())
}
