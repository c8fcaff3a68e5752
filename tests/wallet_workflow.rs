//! Integration tests for wallet files driving ledger workflows

use tempfile::TempDir;
use tracechain::blockchain::{ChainKind, Ledger, ProvenanceQuery};
use tracechain::config::Config;
use tracechain::crypto::address_from_hex;
use tracechain::organisation::{Organisation, Role};
use tracechain::persistence::Database;
use tracechain::wallet::{WalletStore, Wallets};

const DIFFICULTY: u32 = 6;

/// Config rooted in a temporary directory
fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.path = dir.path().display().to_string();
    config.wallet.path = dir.path().display().to_string();
    config.miner.difficulty = DIFFICULTY;
    config
}

#[test]
fn test_wallets_sign_for_the_ledger() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);

    let mut wallets = Wallets::open(config.wallet_path())?;
    let admin_addr = wallets.create_wallet(Some("acme".to_string()))?;
    let maker_addr = wallets.create_wallet(Some("widgets".to_string()))?;
    let shop_addr = wallets.create_wallet(None)?;

    // Reload as the CLI would on the next command.
    let wallets = Wallets::open(config.wallet_path())?;
    let admin = wallets.get_wallet(&admin_addr)?;
    let maker = wallets.get_wallet(&maker_addr)?;
    let shop = wallets.get_wallet(&shop_addr)?;

    let founder = Organisation::founder("Acme", admin.public_key_bytes().to_vec(), "27ACME0001", "ACM")?;
    let ledger = Ledger::create(
        Box::new(Database::open(config.ledger_path())?),
        founder,
        config.miner.difficulty,
    )?;

    for (name, keys, gstin, prefix, role) in [
        ("Widgets Ltd", &maker, "29WID0001", "WID", Role::Manufacturer),
        ("Corner Shop", &shop, "29SHP0001", "SHP", Role::Retailer),
    ] {
        let draft = Organisation::new(name, keys.public_key_bytes().to_vec(), gstin, prefix, role);
        ledger.register_organisation(&admin, draft)?;
    }

    ledger.add_products(&maker, &["Widget".to_string()])?;
    ledger.produce_items(&maker, &[1, 1])?;
    ledger.send_items(&maker, &address_from_hex(&shop_addr)?, &["WID.1.2".to_string()], true)?;

    let utxo = ledger.utxo_set();
    let held: Vec<String> = utxo
        .find_utxo(&maker.address())?
        .into_iter()
        .map(|o| o.item)
        .collect();
    assert_eq!(held, vec!["WID.1.1".to_string()]);
    assert_eq!(ledger.current_holder("WID.1.2")?, shop.address());
    assert_eq!(ledger.best_height(ChainKind::Transactions)?, Some(1));
    assert_eq!(ledger.role_of(&shop.public_key_bytes())?, Role::Retailer);
    Ok(())
}

#[test]
fn test_ledger_and_wallet_files_are_per_node() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let first = test_config(&dir);
    let second = test_config(&dir).with_node_id_override(Some("3001".to_string()));

    assert_ne!(first.ledger_path(), second.ledger_path());
    assert_ne!(first.wallet_path(), second.wallet_path());

    let mut wallets = Wallets::open(first.wallet_path())?;
    wallets.create_wallet(None)?;
    assert_eq!(Wallets::open(second.wallet_path())?.addresses().len(), 0);
    assert_eq!(Wallets::open(first.wallet_path())?.addresses().len(), 1);

    let empty = Database::open(second.ledger_path())?;
    assert!(Ledger::open(Box::new(empty), DIFFICULTY).is_err());
    Ok(())
}
